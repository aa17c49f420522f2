use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Reads the logo into a `data:` URI. A missing or unreadable file only
/// means the page renders without a logo.
pub async fn load_logo(path: &Path) -> Option<String> {
    match fs::read(path).await {
        Ok(bytes) => Some(format!("data:{};base64,{}", mime_for(path), STANDARD.encode(bytes))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("logo {} not found, rendering without it", path.display());
            None
        }
        Err(err) => {
            warn!("failed to read logo {}: {err}", path.display());
            None
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("svg") => "image/svg+xml",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_logo_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_logo(&dir.path().join("nope.png")).await.is_none());
    }

    #[tokio::test]
    async fn logo_becomes_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, b"png-bytes").unwrap();

        let uri = load_logo(&path).await.unwrap();
        assert_eq!(uri, format!("data:image/png;base64,{}", STANDARD.encode(b"png-bytes")));
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for(Path::new("a.SVG")), "image/svg+xml");
        assert_eq!(mime_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("a")), "image/png");
    }
}
