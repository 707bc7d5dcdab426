use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

/// Media types worth running through charset canonicalization.
pub fn is_text_media(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            ct.starts_with("text/")
                || ct.contains("xhtml+xml")
                || ct.contains("application/xml")
                || ct.contains("javascript")
                || ct.contains("json")
        }
        // No header at all: servers that omit it usually serve HTML.
        None => true,
    }
}

fn encoding_from_header(content_type: &str) -> Option<&'static Encoding> {
    let lower = content_type.to_ascii_lowercase();
    let idx = lower.find("charset=")?;
    let label = lower[idx + "charset=".len()..]
        .split(';')
        .next()?
        .trim()
        .trim_matches('"');
    Encoding::for_label(label.as_bytes())
}

/// Decode a body to UTF-8. The declared charset wins; otherwise the bytes are
/// sniffed. Bodies that are already valid UTF-8 come back unchanged.
pub fn canonicalize_utf8(body: Vec<u8>, content_type: Option<&str>) -> Vec<u8> {
    let encoding = content_type
        .and_then(encoding_from_header)
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(&body, true);
            detector.guess(None, true)
        });

    if encoding == UTF_8 && std::str::from_utf8(&body).is_ok() {
        return body;
    }

    let (decoded, _, _) = encoding.decode(&body);
    decoded.into_owned().into_bytes()
}
