// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Serves files from the output directory when no route matches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use quire::{handler, Context, Handler, Response};

/// Builds the kernel fallback that serves files below `output_dir`.
///
/// Only GET and HEAD are served. Anything that does not resolve to a file
/// yields no response, which the kernel turns into its generic 404.
pub fn static_fallback(output_dir: impl Into<PathBuf>) -> Handler {
    let root = Arc::new(output_dir.into());
    handler(move |ctx: &Context| {
        let root = root.clone();
        Box::pin(async move {
            if ctx.method != "GET" && ctx.method != "HEAD" {
                return Ok(None);
            }
            Ok(resolve(&root, &ctx.path).await.map(Response::file))
        })
    })
}

/// Maps a request path to an existing file below `root`.
///
/// `/` serves `index.html`. Paths with an extension must match a file
/// exactly; extensionless paths try `<path>.html` and then
/// `<path>/index.html`. Any `..` segment is refused.
pub async fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;

    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                tracing::debug!(path = %request_path, "Refusing path traversal");
                return None;
            }
            s if s.contains('\\') || s.contains('\0') => return None,
            s => relative.push(s),
        }
    }

    if relative.as_os_str().is_empty() {
        return existing_file(root.join("index.html")).await;
    }

    let direct = root.join(&relative);
    if relative.extension().is_some() {
        return existing_file(direct).await;
    }

    if let Some(found) = existing_file(direct.with_extension("html")).await {
        return Some(found);
    }
    existing_file(direct.join("index.html")).await
}

async fn existing_file(path: PathBuf) -> Option<PathBuf> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Some(path),
        _ => None,
    }
}

/// Content type for a file, by extension.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" | "map" => "application/json; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire::{Kernel, Payload};
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "home").unwrap();
        std::fs::write(dir.path().join("about.html"), "about").unwrap();
        std::fs::create_dir_all(dir.path().join("docs/assets")).unwrap();
        std::fs::write(dir.path().join("docs/index.html"), "docs").unwrap();
        std::fs::write(dir.path().join("docs/assets/site.css"), "body{}").unwrap();
        std::fs::write(dir.path().join("hello world.txt"), "hi").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_resolve() {
        let dir = site();
        let root = dir.path();

        assert_eq!(resolve(root, "/").await, Some(root.join("index.html")));
        assert_eq!(resolve(root, "/about").await, Some(root.join("about.html")));
        assert_eq!(resolve(root, "/about.html").await, Some(root.join("about.html")));
        assert_eq!(resolve(root, "/docs").await, Some(root.join("docs").join("index.html")));
        assert_eq!(resolve(root, "/docs/").await, Some(root.join("docs").join("index.html")));
        assert_eq!(
            resolve(root, "/docs/assets/site.css").await,
            Some(root.join("docs").join("assets").join("site.css"))
        );
        assert_eq!(resolve(root, "/hello%20world.txt").await, Some(root.join("hello world.txt")));
        assert_eq!(resolve(root, "/missing").await, None);
        assert_eq!(resolve(root, "/docs/assets").await, None);
    }

    #[tokio::test]
    async fn test_traversal_is_refused() {
        let dir = site();
        let inner = dir.path().join("docs");

        assert_eq!(resolve(&inner, "/../index.html").await, None);
        assert_eq!(resolve(&inner, "/assets/%2e%2e/../about.html").await, None);
        assert_eq!(resolve(&inner, "/%2e%2e/about.html").await, None);
    }

    #[tokio::test]
    async fn test_fallback_through_kernel() {
        let dir = site();
        let mut kernel = Kernel::new();
        kernel.set_fallback(static_fallback(dir.path()));

        let response = kernel.handle(&mut Context::new("GET", "/about")).await;
        assert_eq!(response.status, 200);
        assert!(matches!(response.body, Payload::File(ref p) if p.ends_with("about.html")));

        let response = kernel.handle(&mut Context::new("HEAD", "/")).await;
        assert_eq!(response.status, 200);

        let response = kernel.handle(&mut Context::new("POST", "/about")).await;
        assert_eq!(response.status, 404);

        let response = kernel.handle(&mut Context::new("GET", "/../secret")).await;
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(mime_type(Path::new("a/site.CSS")), "text/css; charset=utf-8");
        assert_eq!(mime_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(mime_type(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(mime_type(Path::new("Makefile")), "application/octet-stream");
    }
}
