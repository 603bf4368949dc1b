use std::{net::SocketAddr, process::ExitCode, sync::atomic::AtomicU32, sync::Arc};

use tracing::{error, info};

use zeroconf_dlna::{
    config::AppConfig,
    content::ContentIndex,
    device::{self, DeviceIdentity},
    error::StartupError,
    http, logging, ssdp,
    state::AppState,
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_args()?;
    logging::init(config.verbose);

    info!(directory = %config.directory.display(), "starting zeroconf-dlna");

    let udn = device::load_or_create_udn(&config.directory);
    let device = Arc::new(DeviceIdentity::new(
        udn,
        config.friendly_name.clone(),
        config.bind_ip,
        config.port,
    ));
    info!(udn = %device.udn, base_url = %device.base_url, "device identity ready");

    let content = Arc::new(ContentIndex::new(config.directory.clone()));
    let config = Arc::new(config);

    let state = AppState {
        config: config.clone(),
        device: device.clone(),
        content,
        system_update_id: Arc::new(AtomicU32::new(1)),
    };

    let addr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), config.port);
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            StartupError::PortInUse(config.port)
        } else {
            StartupError::InvalidConfig(e.to_string())
        }
    })?;
    info!("HTTP listening on http://{addr}");

    let app = http::router(state.clone());
    let http_server = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal());

    let ssdp_state = state.clone();
    let ssdp_task = tokio::spawn(async move {
        if let Err(e) = ssdp::run(ssdp_state, shutdown_signal()).await {
            error!(error = %e, "SSDP responder exited with an error");
        }
    });

    if let Err(e) = http_server.await {
        error!(error = %e, "HTTP server exited with an error");
    }
    let _ = ssdp_task.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
