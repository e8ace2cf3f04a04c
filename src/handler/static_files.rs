//! Static file serving module
//!
//! Maps request paths onto the static root, resolves index files and directory
//! listings, and builds cacheable file responses.

use crate::config::StaticFilesConfig;
use crate::handler::listing;
use crate::http::{self, cache, mime, response::FileHeaders, RangeOutcome, ResponseBody};
use crate::logger;
use hyper::body::Bytes;
use hyper::Response;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Request details the static responder needs
pub struct StaticRequest<'a> {
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
    pub range_header: Option<&'a str>,
}

/// Serve a request path from the static root
pub async fn serve(req: &StaticRequest<'_>, cfg: &StaticFilesConfig) -> Response<ResponseBody> {
    let Some(relative) = relative_path(req.path) else {
        logger::log_warning(&format!("Rejected static path: {}", req.path));
        return http::build_404_response();
    };

    let root = match fs::canonicalize(&cfg.root).await {
        Ok(p) => p,
        Err(e) => {
            logger::log_error(&format!(
                "Static directory not found or inaccessible '{}': {e}",
                cfg.root
            ));
            return http::build_404_response();
        }
    };

    let target = match fs::canonicalize(root.join(&relative)).await {
        Ok(p) => p,
        Err(e) => return io_error_response(&e),
    };
    // Symlinks may still point outside the root
    if !target.starts_with(&root) {
        logger::log_warning(&format!(
            "Path traversal attempt blocked: {} -> {}",
            req.path,
            target.display()
        ));
        return http::build_404_response();
    }

    let metadata = match fs::metadata(&target).await {
        Ok(m) => m,
        Err(e) => return io_error_response(&e),
    };

    if metadata.is_dir() {
        serve_directory(req, cfg, &target).await
    } else {
        serve_file(req, &target, cfg.cache_max_age).await
    }
}

/// Decode the URL path and turn it into a root-relative path.
///
/// Returns `None` for undecodable paths, NUL bytes and any `..` component.
fn relative_path(path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(path).ok()?;
    if decoded.contains('\0') {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

async fn serve_directory(
    req: &StaticRequest<'_>,
    cfg: &StaticFilesConfig,
    dir: &Path,
) -> Response<ResponseBody> {
    // Relative links inside the directory only resolve with a trailing slash
    if !req.path.ends_with('/') {
        // A leading `//` would make the Location a network-path reference
        let path = format!("/{}", req.path.trim_start_matches('/'));
        let location = match req.query {
            Some(q) => format!("{path}/?{q}"),
            None => format!("{path}/"),
        };
        return http::build_redirect_response(&location);
    }

    for index in &cfg.index_files {
        let candidate = dir.join(index);
        if fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return serve_file(req, &candidate, cfg.cache_max_age).await;
        }
    }

    if !cfg.directory_listing {
        return http::build_403_response();
    }

    match listing::render(dir, req.path).await {
        Ok(html) => http::response::build_html_response(html, req.is_head),
        Err(e) => {
            logger::log_error(&format!("Failed to list '{}': {e}", dir.display()));
            io_error_response(&e)
        }
    }
}

/// Serve one file with validators, conditional handling and Range support
async fn serve_file(
    req: &StaticRequest<'_>,
    path: &Path,
    cache_max_age: u32,
) -> Response<ResponseBody> {
    let content = match fs::read(path).await {
        Ok(c) => c,
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{}': {e}", path.display()));
            return io_error_response(&e);
        }
    };

    let modified = fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok();
    let last_modified = modified.map(cache::format_http_date);
    let etag = cache::generate_etag(&content);

    // If-None-Match takes precedence over If-Modified-Since
    let not_modified = if req.if_none_match.is_some() {
        cache::check_etag_match(req.if_none_match, &etag)
    } else {
        modified.is_some_and(|m| cache::not_modified_since(m, req.if_modified_since))
    };
    if not_modified {
        return http::response::build_304_response(&etag, last_modified.as_deref());
    }

    let cache_control = cache::CachePolicy::from_max_age(cache_max_age).to_header_value();
    let headers = FileHeaders {
        content_type: mime::content_type_for(path),
        etag: &etag,
        last_modified: last_modified.as_deref(),
        cache_control: &cache_control,
    };

    let total_size = content.len();
    match http::parse_range_header(req.range_header, total_size) {
        RangeOutcome::Partial(range) => {
            let part = Bytes::copy_from_slice(&content[range.start..=range.end]);
            http::response::build_partial_response(
                part,
                &headers,
                range.start,
                range.end,
                total_size,
                req.is_head,
            )
        }
        RangeOutcome::Unsatisfiable => http::response::build_416_response(total_size),
        RangeOutcome::Full => {
            http::response::build_cached_response(Bytes::from(content), &headers, req.is_head)
        }
    }
}

fn io_error_response(err: &io::Error) -> Response<ResponseBody> {
    match err.kind() {
        io::ErrorKind::PermissionDenied => http::build_403_response(),
        // NotFound and anything like "not a directory" read as missing
        _ => http::build_404_response(),
    }
}
