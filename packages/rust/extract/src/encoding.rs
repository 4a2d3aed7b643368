//! Character encoding resolution and decoding for raw page bytes.
//!
//! Raw content is persisted as undecoded bytes, so the extractor must
//! determine the correct encoding itself: HTTP header first, then a
//! declared meta charset, then byte-pattern detection. Naive fixed-
//! encoding decoding corrupts non-ASCII letters (Norwegian æ/ø/å turn
//! into multi-byte mojibake), and the repair must happen before any
//! text-based boilerplate matching.

use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::Regex;

use sourcebank_shared::{ExtractionError, Result};

/// How many leading bytes are scanned for a `<meta charset>` declaration.
const META_SNIFF_BYTES: usize = 1024;

/// Fraction of U+FFFD replacement characters above which a decode is
/// considered unrecoverable.
const MAX_REPLACEMENT_RATIO: f64 = 0.10;

/// `charset=` value inside an HTTP Content-Type header.
static HEADER_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*"?([a-zA-Z0-9._-]+)"#).expect("valid regex")
});

/// `<meta charset="...">` or `<meta http-equiv="Content-Type" content="...; charset=...">`.
static META_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9._-]+)"#).expect("valid regex")
});

/// Decode raw HTML bytes into a string, resolving the encoding from the
/// HTTP header, a declared meta charset, or byte-pattern detection.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> Result<String> {
    let encoding = resolve_encoding(bytes, content_type);

    let (text, used, had_errors) = encoding.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }

    // The declared encoding produced errors; try the byte-pattern
    // fallback before giving up.
    let fallback = sniff_by_bytes(bytes);
    if fallback != used {
        let (text, _, had_errors) = fallback.decode(bytes);
        if !had_errors {
            return Ok(text.into_owned());
        }
    }

    // Last resort: accept a lossy decode unless it is mostly garbage.
    let lossy = text.into_owned();
    let replacements = lossy.chars().filter(|c| *c == '\u{FFFD}').count();
    let total = lossy.chars().count().max(1);
    if (replacements as f64) / (total as f64) > MAX_REPLACEMENT_RATIO {
        return Err(ExtractionError::Encoding {
            message: format!(
                "{replacements}/{total} replacement chars after decoding as {}",
                used.name()
            ),
        }
        .into());
    }

    Ok(lossy)
}

/// Resolve the encoding to decode with, in priority order.
fn resolve_encoding(bytes: &[u8], content_type: Option<&str>) -> &'static Encoding {
    if let Some(ct) = content_type {
        if let Some(enc) = charset_from_header(ct) {
            return enc;
        }
    }

    if let Some(enc) = charset_from_meta(bytes) {
        return enc;
    }

    if let Some((enc, _bom_len)) = Encoding::for_bom(bytes) {
        return enc;
    }

    sniff_by_bytes(bytes)
}

/// Parse `charset=` out of a Content-Type header value.
fn charset_from_header(content_type: &str) -> Option<&'static Encoding> {
    let label = HEADER_CHARSET_RE.captures(content_type)?.get(1)?.as_str();
    Encoding::for_label(label.as_bytes())
}

/// Sniff a `<meta charset>` declaration from the leading bytes.
///
/// The prefix is decoded as ASCII-compatible Latin-1 purely for pattern
/// matching; charset labels themselves are always ASCII.
fn charset_from_meta(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(META_SNIFF_BYTES)];
    let head_text: String = head.iter().map(|&b| b as char).collect();
    let label = META_CHARSET_RE.captures(&head_text)?.get(1)?.as_str();
    Encoding::for_label(label.as_bytes())
}

/// Byte-pattern heuristic: valid UTF-8 is UTF-8, anything else is
/// treated as windows-1252 (the superset legacy web default).
fn sniff_by_bytes(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}
