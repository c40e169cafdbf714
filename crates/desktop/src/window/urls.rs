// URL layout of the embedded server, as seen by windows.

use gristdesk_common::types::DocId;
use percent_encoding::percent_decode_str;
use url::Url;

/// Query parameter carrying the per-process login credential.
pub const AUTH_PARAM: &str = "electron_key";

/// URL of the home view, or of `doc` when given, with the login credential
/// attached when one is configured.
pub fn doc_url(home: &Url, doc: Option<&DocId>, credential: Option<&str>) -> Url {
    let mut url = home.clone();
    if let Some(doc) = doc {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.clear().push("doc").push(doc.as_str());
        }
    }
    if let Some(credential) = credential {
        url.query_pairs_mut().append_pair(AUTH_PARAM, credential);
    }
    url
}

/// The document id or URL alias a page URL points at, if any.
///
/// Recognizes `/doc/<id>/...` and `/o/<org>/doc/<id>/...`.
pub fn doc_ref_from_url(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|segment| !segment.is_empty()).collect();
    let rest = match segments.as_slice() {
        ["o", _org, rest @ ..] => rest,
        rest => rest,
    };
    match rest {
        ["doc", id, ..] => Some(percent_decode(id)),
        _ => None,
    }
}

/// Whether `url` is served by the embedded server rather than the wider web.
pub fn is_app_url(home: &Url, url: &Url) -> bool {
    url.scheme() == home.scheme()
        && url.host_str() == home.host_str()
        && url.port_or_known_default() == home.port_or_known_default()
        && url.path().starts_with(home.path().trim_end_matches('/'))
}

fn percent_decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}
