//! Make rendered SVG files self-contained by embedding every local image
//! they reference as a `data:` URI.

use base64::Engine as _;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<attr>(?:xlink:)?href)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#).unwrap()
});

pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/vnd.microsoft.icon",
        _ => "application/octet-stream",
    }
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode `%XX` escapes. Malformed escapes are kept literally.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Map an href value to a local file, or None when it should stay as is.
fn local_path(href: &str, svg_dir: &Path) -> Option<PathBuf> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || lower.starts_with("data:")
        || lower.starts_with("http://")
        || lower.starts_with("https://")
        || href.starts_with('#')
    {
        return None;
    }
    let path = if lower.starts_with("file://") {
        // file://host/path keeps only the path part
        let rest = &href["file://".len()..];
        let path = match rest.find('/') {
            Some(i) => &rest[i..],
            None => rest,
        };
        PathBuf::from(percent_decode(path))
    } else {
        let p = PathBuf::from(href);
        if p.is_absolute() {
            p
        } else {
            svg_dir.join(p)
        }
    };
    path.is_file().then_some(path)
}

fn data_uri(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(format!(
            "data:{};base64,{}",
            guess_mime(path),
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not embed image");
            None
        }
    }
}

/// Rewrite local image references in the SVG at `svg_path` into base64
/// data URIs. The file is only written back when something changed.
/// Returns an error message on failure.
pub fn inline_images(svg_path: &Path) -> Option<String> {
    let content = match std::fs::read_to_string(svg_path) {
        Ok(c) => c,
        Err(e) => return Some(format!("Failed to read generated SVG file: {e}")),
    };
    let svg_dir = svg_path.parent().unwrap_or_else(|| Path::new("."));

    let mut embedded = 0usize;
    let rewritten = HREF_RE.replace_all(&content, |caps: &Captures<'_>| {
        let original = caps[0].to_string();
        let (value, quote) = match (caps.name("dq"), caps.name("sq")) {
            (Some(v), _) => (v.as_str(), '"'),
            (None, Some(v)) => (v.as_str(), '\''),
            (None, None) => return original,
        };
        let Some(uri) = local_path(value, svg_dir).and_then(|p| data_uri(&p)) else {
            return original;
        };
        embedded += 1;
        format!("{}={quote}{uri}{quote}", &caps["attr"])
    });

    if embedded == 0 {
        return None;
    }
    if let Err(e) = std::fs::write(svg_path, rewritten.as_bytes()) {
        return Some(format!("Failed to write inlined SVG file: {e}"));
    }
    debug!(path = %svg_path.display(), embedded, "inlined svg images");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    #[test]
    fn local_images_are_embedded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("icons")).unwrap();
        std::fs::write(dir.path().join("icons/a b.png"), PNG).unwrap();
        let absolute = dir.path().join("abs.jpg");
        std::fs::write(&absolute, b"jpg").unwrap();

        let svg = dir.path().join("d.svg");
        std::fs::write(
            &svg,
            format!(
                "<svg><image xlink:href=\"icons/a b.png\"/><image href='file://{}'/></svg>",
                absolute.display().to_string().replace(' ', "%20")
            ),
        )
        .unwrap();

        assert_eq!(inline_images(&svg), None);
        let out = std::fs::read_to_string(&svg).unwrap();
        let png = base64::engine::general_purpose::STANDARD.encode(PNG);
        assert!(out.contains(&format!("xlink:href=\"data:image/png;base64,{png}\"")), "{out}");
        assert!(out.contains("href='data:image/jpeg;base64,anBn'"), "{out}");
    }

    #[test]
    fn remote_fragment_and_missing_refs_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let svg = dir.path().join("d.svg");
        let body = "<svg><a href=\"#n1\"/><image href=\"https://x/y.png\"/><image href=\"data:image/png;base64,AA\"/><image href=\"missing.png\"/></svg>";
        std::fs::write(&svg, body).unwrap();
        let before = std::fs::metadata(&svg).unwrap().modified().unwrap();

        assert_eq!(inline_images(&svg), None);
        assert_eq!(std::fs::read_to_string(&svg).unwrap(), body);
        assert_eq!(std::fs::metadata(&svg).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn unreadable_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let msg = inline_images(&dir.path().join("nope.svg")).unwrap();
        assert!(msg.starts_with("Failed to read generated SVG file: "));
    }

    #[test]
    fn mime_table() {
        assert_eq!(guess_mime(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(guess_mime(Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(percent_decode("/a%20b/c%2"), "/a b/c%2");
    }
}
