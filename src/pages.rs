//! Fixed pages and the upload directory listing.

use std::io;
use std::path::Path;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const X_ROBOTS_TAG: HeaderName = HeaderName::from_static("x-robots-tag");
pub const NO_INDEX: &str = "noindex, nofollow";

const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";
const TEXT_HTML: &str = "text/html; charset=UTF-8";
const META_NO_INDEX: &str = r#"<meta name="robots" content="noindex, nofollow">"#;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const UPLOAD_FIELD: &str = "<input type=file name=f[]><br>";

fn page(status: StatusCode, content_type: &'static str, body: String) -> Response {
    let headers = [
        (X_ROBOTS_TAG, HeaderValue::from_static(NO_INDEX)),
        (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
    ];
    (status, headers, body).into_response()
}

pub async fn robots() -> Response {
    page(StatusCode::OK, TEXT_PLAIN, "User-agent: *\r\nDisallow: /\r\n".to_owned())
}

pub async fn upload_form() -> Response {
    let fields = UPLOAD_FIELD.repeat(7);
    let form = format!(r#"<form method=post enctype="multipart/form-data">{fields}<input type=submit></form>"#);
    page(StatusCode::OK, TEXT_HTML, form)
}

pub async fn not_found() -> Response {
    page(StatusCode::NOT_FOUND, TEXT_HTML, META_NO_INDEX.to_owned())
}

/// Ordered list of everything in `dir`, each entry linking to its download.
pub async fn listing(dir: &Path) -> Response {
    match render_listing(dir).await {
        Ok(body) => {
            let headers = [
                (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
                (header::VARY, HeaderValue::from_static("Accept-Encoding")),
            ];
            (headers, page(StatusCode::OK, TEXT_HTML, body)).into_response()
        }
        Err(e) => {
            tracing::error!("failed to list {}: {e}", dir.display());
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
    }
}

async fn render_listing(dir: &Path) -> io::Result<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut body = format!("{META_NO_INDEX}<ol>");
    for name in &names {
        let href = utf8_percent_encode(name, COMPONENT);
        let text = html_escape::encode_safe(name);
        body.push_str(&format!(r#"<li><a href="/download/{href}">{text}</a></li>"#));
    }
    body.push_str("</ol>");
    Ok(body)
}
