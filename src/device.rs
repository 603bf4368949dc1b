//! Device identity: the UDN, friendly name, and advertisement set shared by
//! the SSDP responder and the UPnP device description (spec §3, §9).

use std::{net::IpAddr, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:MediaServer:1";
pub const CONTENT_DIRECTORY_TYPE: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";
pub const CONNECTION_MANAGER_TYPE: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

pub const MANUFACTURER: &str = "ZeroConfigDLNA Project";
pub const MODEL_NAME: &str = "ZeroConfigDLNA";
pub const MODEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A single SSDP `(NT, USN)` advertisement tuple (spec §3).
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub nt: String,
    pub usn: String,
}

/// The device's identity, constructed once at startup and immutable for the
/// process lifetime (spec §3, §9 "Global state").
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub udn: String,
    pub friendly_name: String,
    pub base_url: String,
}

impl DeviceIdentity {
    pub fn new(udn: String, friendly_name: String, bind_ip: IpAddr, port: u16) -> Self {
        Self {
            udn,
            friendly_name,
            base_url: format!("http://{bind_ip}:{port}/"),
        }
    }

    pub fn location(&self) -> String {
        format!("{}description.xml", self.base_url)
    }

    /// The fixed list of `(NT, USN)` tuples this device advertises (spec §3).
    pub fn advertisements(&self) -> Vec<Advertisement> {
        let udn = &self.udn;
        vec![
            Advertisement {
                nt: "upnp:rootdevice".to_string(),
                usn: format!("{udn}::upnp:rootdevice"),
            },
            Advertisement {
                nt: udn.clone(),
                usn: udn.clone(),
            },
            Advertisement {
                nt: DEVICE_TYPE.to_string(),
                usn: format!("{udn}::{DEVICE_TYPE}"),
            },
            Advertisement {
                nt: CONTENT_DIRECTORY_TYPE.to_string(),
                usn: format!("{udn}::{CONTENT_DIRECTORY_TYPE}"),
            },
            Advertisement {
                nt: CONNECTION_MANAGER_TYPE.to_string(),
                usn: format!("{udn}::{CONNECTION_MANAGER_TYPE}"),
            },
        ]
    }

    /// Returns the advertisement(s) matching an incoming M-SEARCH `ST` value
    /// (spec §4.4 table).
    pub fn advertisements_for_search_target(&self, st: &str) -> Vec<Advertisement> {
        let all = self.advertisements();
        if st == "ssdp:all" {
            return all;
        }
        if st == self.udn {
            return all.into_iter().filter(|a| a.nt == self.udn).collect();
        }
        all.into_iter().filter(|a| a.nt == st).collect()
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedIdentity {
    udn: String,
}

/// Derives or loads a stable UDN for this (hostname, served-directory) pair.
///
/// Spec §3/§6: the UDN should persist across restarts "if possible", derived
/// from hostname + served path, but losing the persisted file is non-fatal —
/// a new UDN is generated and nothing about that failure is escalated.
pub fn load_or_create_udn(served_dir: &Path) -> String {
    if let Some(path) = udn_file_path() {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if let Ok(persisted) = toml::from_str::<PersistedIdentity>(&contents) {
                debug!("loaded persisted UDN from {}", path.display());
                return persisted.udn;
            }
        }

        let udn = format!("uuid:{}", derive_uuid(served_dir));
        let persisted = PersistedIdentity { udn: udn.clone() };
        if let Ok(toml_text) = toml::to_string(&persisted) {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(&path, toml_text) {
                warn!("could not persist UDN to {}: {e}", path.display());
            }
        }
        return udn;
    }

    warn!("no config directory available; generating a fresh UDN for this run");
    format!("uuid:{}", Uuid::new_v4())
}

fn udn_file_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("zeroconf-dlna").join("identity.toml"))
}

/// Deterministic UUID derived from hostname + served path, so the same
/// directory served from the same host keeps the same UDN across restarts
/// even without a readable identity file (spec §3 "persisted... if possible").
fn derive_uuid(served_dir: &Path) -> Uuid {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    let seed = format!("{host}:{}", served_dir.display());
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
}

/// Default friendly name: `ZeroConfigDLNA on <hostname>` (spec §3).
pub fn default_friendly_name() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    format!("ZeroConfigDLNA on {host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertisements_cover_all_five_tuples() {
        let id = DeviceIdentity::new(
            "uuid:test-udn".to_string(),
            "Test".to_string(),
            "127.0.0.1".parse().unwrap(),
            8200,
        );
        let ads = id.advertisements();
        assert_eq!(ads.len(), 5);
        assert!(ads.iter().any(|a| a.nt == "upnp:rootdevice"));
        assert!(ads.iter().any(|a| a.nt == id.udn));
        assert!(ads.iter().any(|a| a.nt == DEVICE_TYPE));
        assert!(ads.iter().any(|a| a.nt == CONTENT_DIRECTORY_TYPE));
        assert!(ads.iter().any(|a| a.nt == CONNECTION_MANAGER_TYPE));
    }

    #[test]
    fn search_target_ssdp_all_returns_every_tuple() {
        let id = DeviceIdentity::new(
            "uuid:test-udn".to_string(),
            "Test".to_string(),
            "127.0.0.1".parse().unwrap(),
            8200,
        );
        assert_eq!(id.advertisements_for_search_target("ssdp:all").len(), 5);
    }

    #[test]
    fn search_target_unknown_returns_nothing() {
        let id = DeviceIdentity::new(
            "uuid:test-udn".to_string(),
            "Test".to_string(),
            "127.0.0.1".parse().unwrap(),
            8200,
        );
        assert!(id
            .advertisements_for_search_target("urn:schemas-upnp-org:service:Unknown:1")
            .is_empty());
    }

    #[test]
    fn search_target_exact_udn_returns_only_udn_tuple() {
        let id = DeviceIdentity::new(
            "uuid:test-udn".to_string(),
            "Test".to_string(),
            "127.0.0.1".parse().unwrap(),
            8200,
        );
        let matches = id.advertisements_for_search_target("uuid:test-udn");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].usn, "uuid:test-udn");
    }

    #[test]
    fn derive_uuid_is_deterministic_for_same_host_and_path() {
        let a = derive_uuid(Path::new("/srv/media"));
        let b = derive_uuid(Path::new("/srv/media"));
        assert_eq!(a, b);
        let c = derive_uuid(Path::new("/srv/other"));
        assert_ne!(a, c);
    }
}
