//! Disk-backed static file serving

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Asset directories resolved at startup
#[derive(Debug, Clone)]
pub struct AssetRoots {
    /// Directory the application is served from (dist or public)
    pub root: PathBuf,
    /// Development directory, which always holds 404.html
    pub public: PathBuf,
}

/// Serve `path` from the application root, falling back to the index or
/// not-found document.
///
/// Unmatched paths with a file extension are treated as missing files and
/// answered with the not-found document. Extensionless paths get the index
/// document so the client-side router can handle them.
pub async fn asset_or_fallback(roots: &AssetRoots, path: &str) -> Response {
    let rel = path.trim_start_matches('/');

    if let Some(file) = resolve(&roots.root, rel) {
        return serve_file(&file).await;
    }

    if has_file_extension(rel) {
        return not_found_page(roots).await;
    }

    spa_index(roots).await
}

/// Resolve a request path to a file under `root`
///
/// Rejects traversal segments and anything that canonicalizes outside the
/// root. Returns None for directories and missing files.
fn resolve(root: &Path, rel: &str) -> Option<PathBuf> {
    if rel.is_empty() || rel.contains("..") || rel.starts_with('/') {
        return None;
    }

    let canonical_root = root.canonicalize().ok()?;
    let canonical = canonical_root.join(rel).canonicalize().ok()?;

    if !canonical.starts_with(&canonical_root) {
        return None;
    }

    canonical.is_file().then_some(canonical)
}

/// Whether the final path segment names a file (has an extension)
fn has_file_extension(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rfind('.') {
        Some(idx) => idx + 1 < last.len(),
        None => false,
    }
}

/// Read a file and respond with its guessed content type
async fn serve_file(path: &Path) -> Response {
    let content = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(_) => {
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::from(content))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// The not-found document, served with status 404
async fn not_found_page(roots: &AssetRoots) -> Response {
    match tokio::fs::read(roots.public.join("404.html")).await {
        Ok(content) => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from(content))
            .unwrap_or_else(|_| StatusCode::NOT_FOUND.into_response()),
        Err(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// The application index, served for client-side routes
async fn spa_index(roots: &AssetRoots) -> Response {
    match tokio::fs::read(roots.root.join("index.html")).await {
        Ok(content) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from(content))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_file_extension() {
        assert!(has_file_extension("app.js"));
        assert!(has_file_extension("assets/logo.svg"));
        assert!(has_file_extension(".env"));
        assert!(!has_file_extension("credits"));
        assert!(!has_file_extension("some/route"));
        assert!(!has_file_extension("trailing."));
        assert!(!has_file_extension(""));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hi").unwrap();

        assert!(resolve(dir.path(), "../etc/passwd").is_none());
        assert!(resolve(dir.path(), "/etc/passwd").is_none());
        assert!(resolve(dir.path(), "").is_none());
    }

    #[test]
    fn test_resolve_finds_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "js").unwrap();

        let found = resolve(dir.path(), "assets/app.js").unwrap();
        assert!(found.ends_with("assets/app.js"));
        assert!(resolve(dir.path(), "assets").is_none());
        assert!(resolve(dir.path(), "assets/missing.js").is_none());
    }
}
