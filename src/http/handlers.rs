use std::sync::atomic::Ordering;

use axum::{
    body::Body,
    extract::{Path as AxumPath, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use futures_util::StreamExt;
use tokio::{fs::File, io::AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::{
    content::{ContentIndex, ObjectId, Resolved},
    didl::{render_browse_response, render_didl, render_soap_fault},
    error::{HttpError, SoapFault},
    state::AppState,
};

use super::range::{parse_range_header, RangeError};

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

pub async fn description(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        super::xml::description_xml(&state),
    )
}

pub async fn content_directory_scpd() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        super::xml::content_directory_scpd_xml(),
    )
}

pub async fn connection_manager_scpd() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        super::xml::connection_manager_scpd_xml(),
    )
}

fn soap_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}

fn soap_action(body: &str) -> Option<&'static str> {
    if body.contains("u:Browse") {
        Some("Browse")
    } else if body.contains("u:GetSortCapabilities") {
        Some("GetSortCapabilities")
    } else if body.contains("u:GetSearchCapabilities") {
        Some("GetSearchCapabilities")
    } else if body.contains("u:GetSystemUpdateID") {
        Some("GetSystemUpdateID")
    } else {
        None
    }
}

fn soap_response(xml: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XML_CONTENT_TYPE.to_string()),
            (header::HeaderName::from_static("ext"), String::new()),
        ],
        xml,
    )
        .into_response()
}

fn soap_fault_response(fault: SoapFault) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        render_soap_fault(fault),
    )
        .into_response()
}

fn handle_browse(state: &AppState, body: &str) -> Response {
    let object_id: ObjectId = match soap_tag(body, "ObjectID")
        .unwrap_or_else(|| crate::content::ROOT_ID.to_string())
        .parse()
    {
        Ok(id) => id,
        Err(_) => return soap_fault_response(SoapFault::InvalidArgs),
    };
    let browse_flag = soap_tag(body, "BrowseFlag").unwrap_or_else(|| "BrowseDirectChildren".to_string());
    if browse_flag != "BrowseMetadata" && browse_flag != "BrowseDirectChildren" {
        return soap_fault_response(SoapFault::InvalidArgs);
    }
    let starting_index: usize = match soap_tag(body, "StartingIndex").unwrap_or_else(|| "0".to_string()).parse() {
        Ok(n) => n,
        Err(_) => return soap_fault_response(SoapFault::InvalidArgs),
    };
    let requested_count: usize = match soap_tag(body, "RequestedCount").unwrap_or_else(|| "0".to_string()).parse() {
        Ok(n) => n,
        Err(_) => return soap_fault_response(SoapFault::InvalidArgs),
    };

    info!(object_id, browse_flag = %browse_flag, "Browse request");

    let update_id = state.system_update_id.load(Ordering::Relaxed);

    if browse_flag == "BrowseMetadata" {
        return match state.content.metadata(object_id) {
            Ok(obj) => {
                let didl = render_didl(&[obj], &state.device.base_url);
                soap_response(render_browse_response(&didl, 1, 1, update_id))
            }
            Err(_) => soap_fault_response(SoapFault::NoSuchObject),
        };
    }

    match state.content.list(object_id, starting_index, requested_count) {
        Ok((children, total)) => {
            let returned = children.len();
            let didl = render_didl(&children, &state.device.base_url);
            soap_response(render_browse_response(&didl, returned, total, update_id))
        }
        Err(_) => soap_fault_response(SoapFault::NoSuchObject),
    }
}

pub async fn content_directory_control(State(state): State<AppState>, body: String) -> Response {
    match soap_action(&body) {
        Some("Browse") => handle_browse(&state, &body),
        Some("GetSortCapabilities") => soap_response(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:GetSortCapabilitiesResponse xmlns:u="{ty}"><SortCaps></SortCaps></u:GetSortCapabilitiesResponse></s:Body></s:Envelope>"#,
            ty = crate::device::CONTENT_DIRECTORY_TYPE,
        )),
        Some("GetSearchCapabilities") => soap_response(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:GetSearchCapabilitiesResponse xmlns:u="{ty}"><SearchCaps></SearchCaps></u:GetSearchCapabilitiesResponse></s:Body></s:Envelope>"#,
            ty = crate::device::CONTENT_DIRECTORY_TYPE,
        )),
        Some("GetSystemUpdateID") => {
            let update_id = state.system_update_id.load(Ordering::Relaxed);
            soap_response(format!(
                r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:GetSystemUpdateIDResponse xmlns:u="{ty}"><Id>{update_id}</Id></u:GetSystemUpdateIDResponse></s:Body></s:Envelope>"#,
                ty = crate::device::CONTENT_DIRECTORY_TYPE,
            ))
        }
        _ => {
            warn!("unsupported ContentDirectory action");
            soap_fault_response(SoapFault::InvalidAction)
        }
    }
}

pub async fn connection_manager_control(body: String) -> Response {
    if body.contains("u:GetProtocolInfo") {
        soap_response(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:GetProtocolInfoResponse xmlns:u="{ty}"><Source>http-get:*:video/mp4:*,http-get:*:audio/mpeg:*,http-get:*:image/jpeg:*</Source><Sink></Sink></u:GetProtocolInfoResponse></s:Body></s:Envelope>"#,
            ty = crate::device::CONNECTION_MANAGER_TYPE,
        ))
    } else if body.contains("u:GetCurrentConnectionIDs") {
        soap_response(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:GetCurrentConnectionIDsResponse xmlns:u="{ty}"><ConnectionIDs>0</ConnectionIDs></u:GetCurrentConnectionIDsResponse></s:Body></s:Envelope>"#,
            ty = crate::device::CONNECTION_MANAGER_TYPE,
        ))
    } else {
        soap_fault_response(SoapFault::InvalidAction)
    }
}

/// Resolves `id` to a path that still lives under the served root, re-checked
/// by canonicalization on every request so a symlink swapped in after the
/// index was built can't be used to escape the served directory.
async fn resolve_media_path(
    content: &ContentIndex,
    id: ObjectId,
) -> Result<std::path::PathBuf, HttpError> {
    let path = match content.resolve(id).map_err(HttpError::from)? {
        Resolved::Path(path) => path,
        Resolved::Gone => return Err(HttpError::NotFound),
    };

    let canonical = tokio::fs::canonicalize(&path).await.map_err(|_| HttpError::NotFound)?;
    if !canonical.starts_with(content.root()) {
        warn!(id, "resolved media path escaped the served root, refusing");
        return Err(HttpError::NotFound);
    }

    Ok(canonical)
}

pub async fn serve_media_no_title(
    state: State<AppState>,
    AxumPath(id): AxumPath<ObjectId>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    serve_media_by_id(state, id, headers).await
}

pub async fn serve_media(
    state: State<AppState>,
    AxumPath((id, _title)): AxumPath<(ObjectId, String)>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    serve_media_by_id(state, id, headers).await
}

async fn serve_media_by_id(
    State(state): State<AppState>,
    id: ObjectId,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let path = resolve_media_path(&state.content, id).await?;

    let metadata = state.content.metadata(id).map_err(HttpError::from)?;
    let item = metadata
        .item
        .as_ref()
        .ok_or_else(|| HttpError::BadRequest("object is not a media item".to_string()))?;

    let mut file = File::open(&path).await?;
    let file_size = item.size;

    let transfer_mode = match headers
        .get(header::HeaderName::from_static("transfermode.dlna.org"))
        .and_then(|v| v.to_str().ok())
    {
        Some("Interactive") => "Interactive",
        Some("Background") => "Background",
        _ => "Streaming",
    };

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, item.mime_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(
            header::SERVER,
            format!("zeroconf-dlna/{} UPnP/1.0 DLNA/1.50", env!("CARGO_PKG_VERSION")),
        )
        .header(
            header::HeaderName::from_static("transfermode.dlna.org"),
            transfer_mode,
        )
        .header(
            header::HeaderName::from_static("contentfeatures.dlna.org"),
            "DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS=01700000000000000000000000000000",
        );

    let (start, end) = match headers.get(header::RANGE) {
        Some(value) => {
            let range_str = value
                .to_str()
                .map_err(|_| HttpError::BadRequest("invalid Range header".to_string()))?;
            debug!(range = range_str, "ranged media request");
            parse_range_header(range_str, file_size).map_err(|e| match e {
                RangeError::Malformed => HttpError::BadRequest("malformed Range header".to_string()),
                RangeError::Unsatisfiable => HttpError::RangeNotSatisfiable { size: file_size },
            })?
        }
        None => (0, file_size.saturating_sub(1)),
    };

    let len = end - start + 1;
    let status = if len < file_size {
        builder = builder.header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}"));
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    builder = builder.header(header::CONTENT_LENGTH, len);

    file.seek(std::io::SeekFrom::Start(start)).await?;
    let stream = ReaderStream::with_capacity(file, 64 * 1024).take(len as usize);
    let body = Body::from_stream(stream);

    builder
        .status(status)
        .body(body)
        .map_err(|e| HttpError::BadRequest(e.to_string()))
}

/// Optional plain-HTML directory listing for debugging without a DLNA
/// client, not exposed through any UPnP discovery path.
pub async fn browse_debug(State(state): State<AppState>) -> Result<Html<String>, HttpError> {
    let (children, _) = state.content.list(crate::content::ROOT_ID, 0, 0)?;
    let mut rows = String::new();
    for child in children {
        rows.push_str(&format!("<li>{} ({:?})</li>", child.title, child.kind));
    }
    Ok(Html(format!("<html><body><ul>{rows}</ul></body></html>")))
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
