//! Comparing a signed `JNLP-INF` copy with the launching descriptor.

/// Collapses whitespace runs to one space and drops whitespace between tags.
pub fn normalize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace("> <", "><")
}

/// Exact match after normalization.
pub fn matches_exact(signed: &str, actual: &str) -> bool {
    normalize(signed) == normalize(actual)
}

/// Template match after normalization; `*` in the template matches any run
/// of characters, including none.
pub fn matches_template(template: &str, actual: &str) -> bool {
    let pattern: Vec<char> = normalize(template).chars().collect();
    let text: Vec<char> = normalize(actual).chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_not_significant() {
        let signed = "<jnlp spec=\"1.0\">\n  <information>\n    <title>Demo</title>\n  </information>\n</jnlp>";
        let actual = "<jnlp spec=\"1.0\"><information> <title>Demo</title></information></jnlp>\n";
        assert!(matches_exact(signed, actual));
        assert!(!matches_exact(signed, &actual.replace("Demo", "Evil")));
    }

    #[test]
    fn template_wildcards() {
        let template = "<jnlp codebase=\"*\"><title>Demo</title><arg>*</arg></jnlp>";
        assert!(matches_template(
            template,
            "<jnlp codebase=\"https://a.example.com/\"><title>Demo</title><arg>--fast</arg></jnlp>"
        ));
        assert!(matches_template(template, "<jnlp codebase=\"\"><title>Demo</title><arg></arg></jnlp>"));
        assert!(!matches_template(
            template,
            "<jnlp codebase=\"x\"><title>Other</title><arg>a</arg></jnlp>"
        ));
    }
}
