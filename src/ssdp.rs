//! SSDP responder: multicast discovery advertisements and M-SEARCH replies
//! (spec §4.4).

use std::{net::SocketAddr, time::Duration};

use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::{device::Advertisement, state::AppState};

const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";
const SSDP_PORT: u16 = 1900;
const MULTICAST_TTL: u32 = 2;
const MAX_AGE_SECS: u64 = 1800;
const REANNOUNCE_INTERVAL_SECS: u64 = MAX_AGE_SECS / 2;
const STARTUP_ANNOUNCE_SPACING: Duration = Duration::from_millis(200);

fn multicast_socket_addr() -> SocketAddr {
    format!("{SSDP_MULTICAST_ADDR}:{SSDP_PORT}").parse().unwrap()
}

/// Binds `0.0.0.0:1900` with `SO_REUSEADDR`/`SO_REUSEPORT` so this responder
/// can coexist with other SSDP listeners on the same host (spec §4.4
/// "Socket"), then joins the SSDP multicast group.
fn bind_multicast_socket_sync() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from(([0, 0, 0, 0], SSDP_PORT)).into())?;

    let socket = UdpSocket::from_std(socket.into())?;
    socket.join_multicast_v4(SSDP_MULTICAST_ADDR.parse().unwrap(), std::net::Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    Ok(socket)
}

async fn bind_multicast_socket() -> std::io::Result<UdpSocket> {
    bind_multicast_socket_sync()
}

fn notify_message(kind: &str, ad: &Advertisement, location: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}:{SSDP_PORT}\r\n\
         CACHE-CONTROL: max-age={MAX_AGE_SECS}\r\n\
         LOCATION: {location}\r\n\
         NT: {nt}\r\n\
         NTS: {kind}\r\n\
         SERVER: zeroconf-dlna/{version} UPnP/1.0\r\n\
         USN: {usn}\r\n\r\n",
        nt = ad.nt,
        usn = ad.usn,
        version = env!("CARGO_PKG_VERSION"),
    )
}

fn search_response(ad: &Advertisement, location: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age={MAX_AGE_SECS}\r\n\
         DATE: {date}\r\n\
         EXT:\r\n\
         LOCATION: {location}\r\n\
         SERVER: zeroconf-dlna/{version} UPnP/1.0 DLNA/1.50\r\n\
         ST: {st}\r\n\
         USN: {usn}\r\n\r\n",
        date = chrono::Utc::now().to_rfc2822().replace("+0000", "GMT"),
        st = ad.nt,
        usn = ad.usn,
        version = env!("CARGO_PKG_VERSION"),
    )
}

async fn send_announcements(socket: &UdpSocket, state: &AppState, kind: &str) {
    let location = state.device.location();
    for ad in state.device.advertisements() {
        let message = notify_message(kind, &ad, &location);
        if let Err(e) = socket.send_to(message.as_bytes(), multicast_socket_addr()).await {
            warn!(error = %e, nt = %ad.nt, "failed to send SSDP NOTIFY");
        }
    }
}

/// Parses `ST:` and `MX:` out of a raw M-SEARCH datagram. Header matching is
/// case-insensitive and tolerant of stray whitespace, per SSDP's text-based
/// wire format.
fn parse_search(request: &str) -> Option<(String, u64)> {
    let mut lines = request.lines();
    let request_line = lines.next()?;
    if !request_line.starts_with("M-SEARCH") {
        return None;
    }

    let mut man_is_discover = false;
    let mut st = None;
    let mut mx = 3u64;

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_uppercase();
        let value = value.trim();
        match name.as_str() {
            "MAN" => man_is_discover = value.contains("ssdp:discover"),
            "ST" => st = Some(value.to_string()),
            "MX" => mx = value.parse().unwrap_or(3).clamp(1, 5),
            _ => {}
        }
    }

    if !man_is_discover {
        return None;
    }
    st.map(|st| (st, mx))
}

async fn respond_to_search_requests(socket: std::sync::Arc<UdpSocket>, state: AppState) {
    let mut buf = vec![0u8; 2048];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "SSDP recv failed");
                continue;
            }
        };

        let request = String::from_utf8_lossy(&buf[..len]);
        let Some((st, mx)) = parse_search(&request) else {
            continue;
        };

        let matches = state.device.advertisements_for_search_target(&st);
        if matches.is_empty() {
            debug!(%st, %addr, "M-SEARCH target not served, ignoring");
            continue;
        }

        let delay_secs = rand::rng().random_range(0..=mx.min(3));
        let state = state.clone();
        let location = state.device.location();
        tokio::spawn(async move {
            if delay_secs > 0 {
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            }
            for ad in &matches {
                let response = search_response(ad, &location);
                match UdpSocket::bind("0.0.0.0:0").await {
                    Ok(reply_socket) => {
                        if let Err(e) = reply_socket.send_to(response.as_bytes(), addr).await {
                            warn!(error = %e, %addr, "failed to send M-SEARCH reply");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to bind M-SEARCH reply socket"),
                }
            }
        });
    }
}

async fn periodic_reannounce(socket: std::sync::Arc<UdpSocket>, state: AppState) {
    let mut ticker = tokio::time::interval(Duration::from_secs(REANNOUNCE_INTERVAL_SECS));
    ticker.tick().await; // first tick fires immediately
    loop {
        ticker.tick().await;
        send_announcements(&socket, &state, "ssdp:alive").await;
    }
}

/// Runs the SSDP responder until `shutdown` resolves, then sends `ssdp:byebye`
/// for every advertised tuple (spec §4.4 "Shutdown").
pub async fn run(state: AppState, shutdown: impl std::future::Future<Output = ()>) -> std::io::Result<()> {
    let socket = std::sync::Arc::new(bind_multicast_socket().await?);

    info!("starting SSDP responder on {SSDP_MULTICAST_ADDR}:{SSDP_PORT}");

    for _ in 0..3 {
        send_announcements(&socket, &state, "ssdp:alive").await;
        tokio::time::sleep(STARTUP_ANNOUNCE_SPACING).await;
    }

    let search_task = tokio::spawn(respond_to_search_requests(socket.clone(), state.clone()));
    let reannounce_task = tokio::spawn(periodic_reannounce(socket.clone(), state.clone()));

    shutdown.await;

    search_task.abort();
    reannounce_task.abort();

    info!("sending ssdp:byebye");
    send_announcements(&socket, &state, "ssdp:byebye").await;

    Ok(())
}
