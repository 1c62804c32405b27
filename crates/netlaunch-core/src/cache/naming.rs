//! Slot file naming derived from resource URLs.

/// Last path segment of a URL, used as the cached file name.
pub fn filename_from_url_path(url: &url::Url) -> Option<String> {
    let segment = url.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Makes a name safe as a single path component.
///
/// Separators, NUL and control characters become `_` (collapsed), leading and
/// trailing dots/spaces/underscores are trimmed, and the result is capped at
/// 255 bytes.
pub fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let c = if c == '\0' || c == '/' || c == '\\' || c == ':' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_segment() {
        let u = url::Url::parse("https://example.com/lib/app.jar?version-id=1.0").unwrap();
        assert_eq!(filename_from_url_path(&u).as_deref(), Some("app.jar"));
        let root = url::Url::parse("https://example.com/").unwrap();
        assert_eq!(filename_from_url_path(&root), None);
    }

    #[test]
    fn sanitizes_separators_and_trims() {
        assert_eq!(sanitize_filename("a/b\\c.jar"), "a_b_c.jar");
        assert_eq!(sanitize_filename("  ..app.jar.. "), "app.jar");
        assert_eq!(sanitize_filename("x:\ty.jar"), "x_y.jar");
    }
}
