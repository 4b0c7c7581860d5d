//! Receiving `multipart/form-data` uploads into the upload directory.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use multer::Multipart;
use tokio::io::AsyncWriteExt;

use crate::pages::{NO_INDEX, X_ROBOTS_TAG};
use crate::server::AppState;
use crate::UploadError;

/// Headers proxies and CDNs use to pass on the original client address.
const CLIENT_IP_HEADERS: [&str; 8] = [
    "x-originating-ip",
    "x-remote-ip",
    "x-remote-addr",
    "true-client-ip",
    "x-forwarded-for",
    "client-ip",
    "via",
    "cf-connecting-ip",
];

/// Every distinct client address claimed by the request, header values
/// first, then the socket peer.
pub fn client_ips(headers: &HeaderMap, peer: Option<SocketAddr>) -> Vec<String> {
    let mut ips: Vec<String> = Vec::new();

    let claimed = CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::to_owned);
    let peer = peer.map(|addr| addr.ip().to_string());

    for ip in claimed.chain(peer) {
        if !ip.is_empty() && !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

/// Name an upload is stored under: `<basename>-<millis><extension>`, so the
/// extension stays recognisable for content type lookup on download.
pub fn stored_name(file_name: &str, millis: u128) -> Option<String> {
    let path = Path::new(file_name);
    let base = path.file_name()?.to_str()?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    Some(format!("{base}-{millis}{extension}"))
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

/// Handler for every non-GET request.
pub async fn receive(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let ips = client_ips(&headers, Some(peer));
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    tracing::info!(url = %uri, ?ips, user_agent, "upload");

    match store(&state.dir, &headers, body).await {
        Ok(stored) => {
            tracing::info!(files = stored, "all uploads done");
            let headers = [
                (header::CONNECTION, HeaderValue::from_static("close")),
                (X_ROBOTS_TAG, HeaderValue::from_static(NO_INDEX)),
                (header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=UTF-8")),
            ];
            (StatusCode::OK, headers, "\r\nOK\r\n").into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Streams every named file part to disk, returns how many were stored.
/// Parts without a file name are skipped.
async fn store(dir: &Path, headers: &HeaderMap, body: Body) -> Result<usize, UploadError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let boundary = multer::parse_boundary(content_type)?;
    let mut multipart = Multipart::new(body.into_data_stream(), boundary);

    let mut stored = 0;
    while let Some(mut field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().filter(|name| !name.is_empty()) else {
            continue;
        };
        let Some(name) = stored_name(file_name, now_millis()) else {
            tracing::warn!(file_name, "skipping upload without a usable name");
            continue;
        };
        tracing::info!(field = field.name().unwrap_or_default(), file_name, stored_as = %name, "uploading");

        let mut file = tokio::fs::File::create(dir.join(&name)).await?;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        stored += 1;
    }

    Ok(stored)
}
