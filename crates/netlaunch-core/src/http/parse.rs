//! Response header parsing.

/// Headers the tracker cares about, plus the final status code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u32,
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub location: Option<String>,
    /// `x-java-jnlp-version-id`: the version the server actually sent.
    pub version_id: Option<String>,
}

impl ResponseMeta {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        super::REDIRECT_CODES.contains(&self.status)
    }
}

/// Parses `HTTP/1.1 302 Found` into 302.
pub(super) fn status_code(line: &str) -> Option<u32> {
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Parse collected header lines. Only the last response block counts.
pub fn parse_headers(lines: &[String]) -> ResponseMeta {
    let mut meta = ResponseMeta::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(code) = status_code(line) {
            meta = ResponseMeta {
                status: code,
                ..ResponseMeta::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            meta.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("content-encoding") {
            meta.content_encoding = Some(value.to_ascii_lowercase());
        } else if name.eq_ignore_ascii_case("last-modified") {
            meta.last_modified = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("etag") {
            meta.etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("location") {
            meta.location = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("x-java-jnlp-version-id") {
            meta.version_id = Some(value.to_string());
        }
    }

    meta
}
