pub mod config;
pub mod content;
pub mod device;
pub mod didl;
pub mod error;
pub mod http;
pub mod logging;
pub mod ssdp;

pub mod state {
    use crate::{config::AppConfig, content::ContentIndex, device::DeviceIdentity};
    use std::sync::{atomic::AtomicU32, Arc};

    /// Shared, immutable-by-convention application state handed to the HTTP
    /// router and the SSDP task at construction time. Nothing here is a
    /// process global; every consumer receives its own `Arc` clone.
    #[derive(Clone)]
    pub struct AppState {
        pub config: Arc<AppConfig>,
        pub device: Arc<DeviceIdentity>,
        pub content: Arc<ContentIndex>,
        pub system_update_id: Arc<AtomicU32>,
    }
}
