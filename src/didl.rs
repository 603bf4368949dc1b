//! DIDL-Lite encoder: renders Content Index query results as the XML the
//! ContentDirectory `Browse` action returns (spec §4.2).

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::content::{ContentObject, Kind};

/// The exact `DLNA.ORG_FLAGS` literal known to work with Samsung/Sony
/// clients (spec §4.2 "Protocol info" — these literals matter for
/// compatibility and must not be recomputed per-item).
const DLNA_FLAGS: &str = "01700000000000000000000000000000";

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// `parentID="-1"` for the root's own metadata (spec §4.2).
fn parent_id_attr(parent_id: u32) -> String {
    if parent_id == u32::MAX {
        "-1".to_string()
    } else {
        parent_id.to_string()
    }
}

/// Builds `http://<bind-ip>:<port>/media/<id>/<percent-encoded-title>`
/// (spec §4.2 "Resource URL"). The title segment is advisory; the server
/// resolves purely by id.
fn resource_url(base_url: &str, id: u32, title: &str) -> String {
    let encoded_title = utf8_percent_encode(title, NON_ALPHANUMERIC).to_string();
    format!("{}/media/{id}/{encoded_title}", base_url.trim_end_matches('/'))
}

fn container_xml(obj: &ContentObject) -> String {
    format!(
        r#"<container id="{id}" parentID="{parent}" childCount="{count}" restricted="1"><dc:title>{title}</dc:title><upnp:class>object.container</upnp:class></container>"#,
        id = obj.id,
        parent = parent_id_attr(obj.parent_id),
        count = obj.child_count.unwrap_or(0),
        title = xml_escape(&obj.title),
    )
}

fn item_xml(obj: &ContentObject, base_url: &str) -> String {
    let item = obj.item.as_ref().expect("item_xml called on a container");
    let url = resource_url(base_url, obj.id, &obj.title);
    let protocol_info = format!(
        "http-get:*:{mime}:DLNA.ORG_OP=01;DLNA.ORG_CI=0;DLNA.ORG_FLAGS={flags}",
        mime = item.mime_type,
        flags = DLNA_FLAGS,
    );
    format!(
        r#"<item id="{id}" parentID="{parent}" restricted="1"><dc:title>{title}</dc:title><upnp:class>{class}</upnp:class><res protocolInfo="{proto}" size="{size}">{url}</res></item>"#,
        id = obj.id,
        parent = parent_id_attr(obj.parent_id),
        title = xml_escape(&obj.title),
        class = item.upnp_class.as_str(),
        proto = xml_escape(&protocol_info),
        size = item.size,
        url = xml_escape(&url),
    )
}

fn object_xml(obj: &ContentObject, base_url: &str) -> String {
    match obj.kind {
        Kind::Container => container_xml(obj),
        Kind::Item => item_xml(obj, base_url),
    }
}

/// Renders a full `<DIDL-Lite>` document for the given objects (spec §4.2
/// "DIDL-Lite shape").
pub fn render_didl(objects: &[ContentObject], base_url: &str) -> String {
    let mut didl = String::from(
        r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#,
    );
    for obj in objects {
        didl.push_str(&object_xml(obj, base_url));
    }
    didl.push_str("</DIDL-Lite>");
    didl
}

/// Wraps a rendered DIDL-Lite fragment in the SOAP `BrowseResponse` envelope
/// (spec §4.2 "Envelope").
pub fn render_browse_response(
    didl: &str,
    number_returned: usize,
    total_matches: usize,
    update_id: u32,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1"><Result>{didl}</Result><NumberReturned>{returned}</NumberReturned><TotalMatches>{total}</TotalMatches><UpdateID>{update_id}</UpdateID></u:BrowseResponse></s:Body></s:Envelope>"#,
        didl = xml_escape(didl),
        returned = number_returned,
        total = total_matches,
    )
}

/// SOAP fault envelope for unsupported/malformed actions (spec §4.3).
pub fn render_soap_fault(fault: crate::error::SoapFault) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring><detail><UPnPError xmlns="urn:schemas-upnp-org:control-1-0"><errorCode>{code}</errorCode><errorDescription>{desc}</errorDescription></UPnPError></detail></s:Fault></s:Body></s:Envelope>"#,
        code = fault.code(),
        desc = fault.description(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ItemInfo, UpnpClass};
    use std::time::SystemTime;

    fn video_item(id: u32, parent_id: u32, title: &str, size: u64) -> ContentObject {
        ContentObject {
            id,
            parent_id,
            title: title.to_string(),
            kind: Kind::Item,
            item: Some(ItemInfo {
                mime_type: "video/mp4",
                upnp_class: UpnpClass::VideoItem,
                size,
                last_modified: SystemTime::UNIX_EPOCH,
            }),
            child_count: None,
        }
    }

    fn container(id: u32, parent_id: u32, title: &str, count: usize) -> ContentObject {
        ContentObject {
            id,
            parent_id,
            title: title.to_string(),
            kind: Kind::Container,
            item: None,
            child_count: Some(count),
        }
    }

    #[test]
    fn root_metadata_didl_has_single_container_with_parent_sentinel() {
        let root = container(0, u32::MAX, "media", 2);
        let didl = render_didl(&[root], "http://127.0.0.1:8200/");
        assert!(didl.contains(r#"parentID="-1""#));
        assert_eq!(didl.matches("<container").count(), 1);
        assert_eq!(didl.matches("<item").count(), 0);
    }

    #[test]
    fn item_xml_contains_required_protocol_info_literals() {
        let item = video_item(7, 0, "a.mp4", 10);
        let didl = render_didl(&[item], "http://192.168.1.5:8200/");
        assert!(didl.contains("DLNA.ORG_OP=01"));
        assert!(didl.contains("DLNA.ORG_CI=0"));
        assert!(didl.contains(DLNA_FLAGS));
        assert!(didl.contains("http://192.168.1.5:8200/media/7/"));
        assert!(didl.contains(r#"size="10""#));
    }

    #[test]
    fn titles_with_reserved_characters_are_escaped_and_encoded() {
        let item = video_item(3, 0, "a & b <movie>.mp4", 5);
        let didl = render_didl(&[item], "http://127.0.0.1:8200/");
        assert!(didl.contains("a &amp; b &lt;movie&gt;.mp4"));
        // the resource URL segment must not contain a literal '&' or '<'.
        let url_start = didl.find("http://127.0.0.1:8200/media/3/").unwrap();
        let url_fragment = &didl[url_start..url_start + 60];
        assert!(!url_fragment.contains('&'));
        assert!(!url_fragment.contains('<'));
    }

    #[test]
    fn browse_response_reports_counts_and_update_id() {
        let didl = render_didl(&[], "http://127.0.0.1:8200/");
        let envelope = render_browse_response(&didl, 0, 0, 42);
        assert!(envelope.contains("<NumberReturned>0</NumberReturned>"));
        assert!(envelope.contains("<TotalMatches>0</TotalMatches>"));
        assert!(envelope.contains("<UpdateID>42</UpdateID>"));
    }
}
