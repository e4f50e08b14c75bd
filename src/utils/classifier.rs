// Pure PDF signal classification over URLs and response headers.
// Nothing in here may fail: malformed input is simply "not a PDF".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Schemes that can carry a document we are willing to intercept.
const ACCEPTED_SCHEMES: &[&str] = &["http", "https", "file", "ftp"];

/// Media types treated as PDF after normalization.
const PDF_MEDIA_TYPES: &[&str] = &[
    "application/pdf",
    "application/x-pdf",
    "application/acrobat",
    "applications/vnd.pdf",
    "text/pdf",
    "text/x-pdf",
];

// `.pdf` followed by end-of-string, `?` or `#`
static PDF_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.pdf(?:$|[?#])").expect("valid PDF suffix regex"));

static DISPOSITION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\*?\s*=\s*(?:[\w-]+'[\w-]*')?(?:"([^"]*)"|([^;]*))"#)
        .expect("valid content-disposition regex")
});

/// A single response header as delivered by the host (`{name, value}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl ResponseHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Returns true if the URL shape points at a PDF document.
///
/// Structural parsing runs first so that `.pdf` substrings in unrelated URL
/// parts (host names, `.pdf.html` paths) do not count. Strings that do not
/// parse as absolute URLs are matched with the raw suffix pattern instead.
pub fn classify_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            if !ACCEPTED_SCHEMES.contains(&parsed.scheme()) {
                return false;
            }

            let query = parsed.query().map(|q| format!("?{}", q));
            let fragment = parsed.fragment().map(|f| format!("#{}", f));

            std::iter::once(Some(parsed.path().to_string()))
                .chain([query, fragment])
                .flatten()
                .any(|part| PDF_SUFFIX.is_match(&part))
        }
        Err(_) => PDF_SUFFIX.is_match(url),
    }
}

/// Returns true if the response headers identify the body as a PDF.
pub fn classify_headers(headers: &[ResponseHeader]) -> bool {
    if let Some(content_type) = header_value(headers, "content-type") {
        if is_pdf_media_type(&content_type) {
            return true;
        }
    }

    header_value(headers, "content-disposition")
        .and_then(|disposition| disposition_filename(&disposition))
        .map(|name| name.to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

/// Normalizes a media type (`Application/PDF; charset=binary` -> `application/pdf`)
/// and checks it against the PDF media types.
pub fn is_pdf_media_type(content_type: &str) -> bool {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    PDF_MEDIA_TYPES.contains(&normalized.as_str())
}

/// True when the body carries the `%PDF-` magic header.
pub fn looks_like_pdf(head: &[u8]) -> bool {
    head.starts_with(b"%PDF-")
}

/// Case-insensitive header lookup; repeated headers are joined with a comma.
fn header_value(headers: &[ResponseHeader], name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

fn disposition_filename(disposition: &str) -> Option<String> {
    let captures = DISPOSITION_FILENAME.captures(disposition)?;
    let raw = captures.get(1).or_else(|| captures.get(2))?.as_str().trim();
    if raw.is_empty() {
        return None;
    }

    // filename*=UTF-8''report%20final.pdf
    let decoded = urlencoding::decode(raw)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    Some(decoded)
}
