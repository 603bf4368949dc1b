//! End-to-end HTTP scenarios: the ContentDirectory SOAP control endpoint and
//! ranged media streaming, run against a real bound `axum::serve` instance.

use std::{fs, net::SocketAddr, sync::atomic::AtomicU32, sync::Arc};

use zeroconf_dlna::{
    config::AppConfig,
    content::ContentIndex,
    device::DeviceIdentity,
    http,
    state::AppState,
};

async fn spawn_server(dir: &std::path::Path) -> String {
    let config = Arc::new(AppConfig {
        directory: dir.to_path_buf(),
        port: 0,
        verbose: false,
        bind_ip: "127.0.0.1".parse().unwrap(),
        friendly_name: "Test Server".to_string(),
    });
    let device = Arc::new(DeviceIdentity::new(
        "uuid:test".to_string(),
        config.friendly_name.clone(),
        config.bind_ip,
        config.port,
    ));
    let content = Arc::new(ContentIndex::new(dir.to_path_buf()));
    let state = AppState {
        config,
        device,
        content,
        system_update_id: Arc::new(AtomicU32::new(1)),
    };

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let app = http::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{addr}")
}

fn browse_envelope(object_id: &str) -> String {
    format!(
        r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1"><ObjectID>{object_id}</ObjectID><BrowseFlag>BrowseDirectChildren</BrowseFlag><StartingIndex>0</StartingIndex><RequestedCount>0</RequestedCount></u:Browse></s:Body></s:Envelope>"#
    )
}

#[tokio::test]
async fn root_browse_lists_served_directory_contents() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("song.mp3"), b"audio-bytes").unwrap();
    let base = spawn_server(dir.path()).await;

    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/ContentDirectory/control"))
        .body(browse_envelope("0"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("song.mp3"));
    assert!(body.contains("<NumberReturned>1</NumberReturned>"));
    assert!(body.contains("<TotalMatches>1</TotalMatches>"));
}

#[tokio::test]
async fn description_xml_advertises_both_services() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let body = reqwest::get(format!("{base}/description.xml"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("urn:schemas-upnp-org:service:ContentDirectory:1"));
    assert!(body.contains("urn:schemas-upnp-org:service:ConnectionManager:1"));
}

#[tokio::test]
async fn ranged_get_returns_partial_content_with_correct_bytes() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("clip.mp4"), b"0123456789abcdef").unwrap();
    let base = spawn_server(dir.path()).await;

    let client = reqwest::Client::new();
    let browse_body = client
        .post(format!("{base}/ContentDirectory/control"))
        .body(browse_envelope("0"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let id_start = browse_body.find("id=&quot;").unwrap() + "id=&quot;".len();
    let id_end = browse_body[id_start..].find("&quot;").unwrap() + id_start;
    let id = &browse_body[id_start..id_end];

    let response = client
        .get(format!("{base}/media/{id}/clip.mp4"))
        .header("Range", "bytes=2-5")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers().get("content-range").unwrap(),
        "bytes 2-5/16"
    );
    let bytes = response.bytes().await.unwrap();
    assert_eq!(&bytes[..], b"2345");
}

#[tokio::test]
async fn ranged_get_beyond_eof_is_unsatisfiable() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("clip.mp3"), b"short").unwrap();
    let base = spawn_server(dir.path()).await;

    let client = reqwest::Client::new();
    client
        .post(format!("{base}/ContentDirectory/control"))
        .body(browse_envelope("0"))
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{base}/media/1/clip.mp3"))
        .header("Range", "bytes=9999-")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers().get("content-range").unwrap(), "bytes */5");
}

#[tokio::test]
async fn unknown_media_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let response = reqwest::get(format!("{base}/media/12345/missing.mp4")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsupported_soap_action_returns_invalid_action_fault() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/ContentDirectory/control"))
        .body(r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:Seek xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1"/></s:Body></s:Envelope>"#)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("<errorCode>401</errorCode>"));
}

#[tokio::test]
async fn browse_with_non_numeric_object_id_returns_invalid_args_fault() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/ContentDirectory/control"))
        .body(browse_envelope("not-a-number"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("<errorCode>402</errorCode>"));
}

#[tokio::test]
async fn browse_with_unknown_browse_flag_returns_invalid_args_fault() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let envelope = r#"<?xml version="1.0"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1"><ObjectID>0</ObjectID><BrowseFlag>BrowseSideways</BrowseFlag><StartingIndex>0</StartingIndex><RequestedCount>0</RequestedCount></u:Browse></s:Body></s:Envelope>"#;
    let client = reqwest::Client::new();
    let body = client
        .post(format!("{base}/ContentDirectory/control"))
        .body(envelope)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("<errorCode>402</errorCode>"));
}

#[tokio::test]
async fn description_xml_advertises_dlna_doc_version() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let body = reqwest::get(format!("{base}/description.xml"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains(r#"xmlns:dlna="urn:schemas-dlna-org:device-1-0""#));
    assert!(body.contains("<dlna:X_DLNADOC>DMS-1.50</dlna:X_DLNADOC>"));
}

#[tokio::test]
async fn connection_manager_scpd_advertises_get_current_connection_info() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_server(dir.path()).await;

    let body = reqwest::get(format!("{base}/ConnectionManager.xml"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("<name>GetCurrentConnectionInfo</name>"));
}

#[tokio::test]
async fn media_response_carries_transfer_mode_and_server_headers() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("song.mp3"), b"audio-bytes").unwrap();
    let base = spawn_server(dir.path()).await;

    let client = reqwest::Client::new();
    client
        .post(format!("{base}/ContentDirectory/control"))
        .body(browse_envelope("0"))
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{base}/media/1/song.mp3"))
        .header("transferMode.dlna.org", "Background")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("transfermode.dlna.org").unwrap(),
        "Background"
    );
    assert!(response
        .headers()
        .get("server")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("DLNA/1.50"));
}
