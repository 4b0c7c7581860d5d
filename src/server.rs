//! URL surface of the file drop.
//!
//! | Request | Response |
//! |---|---|
//! | `GET /download/<name>` (any `/down…/<name>`) | the file, see [`Transfer`] |
//! | `GET /download` | listing of the upload directory |
//! | `GET /robots.txt` | disallow everything |
//! | `GET /up` | upload form |
//! | other `GET` | 404 page |
//! | anything not `GET` | multipart upload |

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;

use crate::{pages, upload, ByteSource, StoredFile, Transfer, TransferError};

/// Shared, read-only server settings.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dir: Arc<PathBuf>,
    /// Serve a directory listing at `/download`.
    pub list_files: bool,
    /// Allow brotli to be negotiated for downloads.
    pub brotli: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/robots.txt", get(pages::robots).fallback(upload::receive))
        .route("/up", get(pages::upload_form).fallback(upload::receive))
        .fallback(dispatch)
        .with_state(state)
}

/// Serves `router(state)` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

async fn dispatch(
    State(state): State<AppState>,
    peer: ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method != Method::GET {
        return upload::receive(State(state), peer, uri, headers, body).await;
    }

    let path = uri.path();
    if !path.starts_with("/down") {
        return pages::not_found().await;
    }

    match file_segment(path) {
        Some(segment) => match requested_name(segment) {
            Some(name) => download(&state, &name, &headers).await,
            None => TransferError::NotFound.into_response(),
        },
        None if state.list_files => pages::listing(&state.dir).await,
        None => TransferError::NotFound.into_response(),
    }
}

/// Last non-empty segment of a `/down…` path after the first one, if any.
/// Trailing slashes are ignored, so `/download/foo/` names `foo`.
fn file_segment(path: &str) -> Option<&str> {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    trimmed.rsplit_once('/').map(|(_, segment)| segment)
}

/// Percent-decodes the last path segment and reduces it to a base name.
fn requested_name(segment: &str) -> Option<String> {
    let decoded = percent_decode_str(segment).decode_utf8().ok()?;
    let name = Path::new(decoded.as_ref()).file_name()?.to_str()?;
    Some(name.to_owned())
}

/// Download of `name` from the upload directory.
pub async fn download(state: &AppState, name: &str, headers: &HeaderMap) -> Response {
    let file = match StoredFile::resolve(&state.dir, name).await {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(name, "download of unknown file");
            return e.into_response();
        }
    };
    tracing::info!(name, size = file.byte_size(), "download");

    Transfer::for_file(file)
        .headers(headers)
        .brotli(state.brotli)
        .try_respond()
        .await
        .into_response()
}
