//! Command-line configuration (spec §6 "External interfaces").
//!
//! A single `AppConfig` is parsed once at startup and handed around as an
//! `Arc`; nothing here is a process global (spec §9 "Global state").

use std::{net::IpAddr, path::PathBuf};

use clap::Parser;

use crate::error::StartupError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Zero-configuration DLNA/UPnP media server", long_about = None)]
struct Args {
    /// Directory containing media files to serve
    directory: PathBuf,

    /// TCP port for the HTTP server and SOAP control endpoints
    #[arg(short, long, default_value_t = 8200)]
    port: u16,

    /// Enable debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Bind address to advertise; auto-detected via the default route if omitted
    #[arg(long)]
    bind_ip: Option<IpAddr>,

    /// Friendly name advertised to DLNA clients; defaults to "ZeroConfigDLNA on <hostname>"
    #[arg(long)]
    name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub directory: PathBuf,
    pub port: u16,
    pub verbose: bool,
    pub bind_ip: IpAddr,
    pub friendly_name: String,
}

impl AppConfig {
    pub fn from_args() -> Result<Self, StartupError> {
        let args = Args::parse();
        Self::from_parsed(args)
    }

    fn from_parsed(args: Args) -> Result<Self, StartupError> {
        if !args.directory.is_dir() {
            return Err(StartupError::DirectoryMissing(
                args.directory.display().to_string(),
            ));
        }

        let bind_ip = match args.bind_ip {
            Some(ip) => ip,
            None => local_ip().ok_or_else(|| {
                StartupError::InvalidConfig(
                    "could not determine a local IP address; pass --bind-ip explicitly".into(),
                )
            })?,
        };

        let friendly_name = args
            .name
            .unwrap_or_else(crate::device::default_friendly_name);

        Ok(AppConfig {
            directory: args.directory,
            port: args.port,
            verbose: args.verbose,
            bind_ip,
            friendly_name,
        })
    }
}

/// Determines the outbound interface address by connecting a UDP socket to a
/// well-known public address; no packets are actually sent (spec §6).
fn local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_directory_that_does_not_exist() {
        let args = Args {
            directory: PathBuf::from("/nonexistent/path/for/testing"),
            port: 8200,
            verbose: false,
            bind_ip: Some("127.0.0.1".parse().unwrap()),
            name: None,
        };
        let err = AppConfig::from_parsed(args).unwrap_err();
        assert!(matches!(err, StartupError::DirectoryMissing(_)));
    }

    #[test]
    fn accepts_a_real_directory_with_explicit_bind_ip() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args {
            directory: dir.path().to_path_buf(),
            port: 9000,
            verbose: true,
            bind_ip: Some("10.0.0.5".parse().unwrap()),
            name: Some("My Server".to_string()),
        };
        let config = AppConfig::from_parsed(args).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.verbose);
        assert_eq!(config.bind_ip, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(config.friendly_name, "My Server");
    }
}
