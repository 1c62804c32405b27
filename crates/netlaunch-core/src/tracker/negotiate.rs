//! Best-URL negotiation: candidate generation, HEAD-then-GET probing and the
//! redirect policy.

use url::Url;

use crate::descriptor::{DownloadOptions, VersionString};
use crate::http::{HttpClient, Method, ResponseMeta};
use crate::retry::{classify_http_status, run_with_retry, ErrorKind, FetchError, RetryPolicy};

/// Upper bound on candidates, including those added by followed redirects.
const MAX_CANDIDATES: usize = 16;

/// Outcome of a successful negotiation.
#[derive(Debug, Clone)]
pub struct Negotiated {
    pub url: Url,
    pub meta: ResponseMeta,
}

/// Candidate URLs for a resource in priority order, without duplicates.
///
/// Pack200 variants are only produced when the caller can unpack them.
pub fn candidate_urls(
    location: &Url,
    version: Option<&VersionString>,
    options: DownloadOptions,
    pack200: bool,
) -> Vec<Url> {
    let mut out: Vec<Url> = Vec::new();
    let mut push = |u: Option<Url>| {
        if let Some(u) = u {
            if !out.contains(&u) {
                out.push(u);
            }
        }
    };
    let version = version.map(VersionString::as_str);
    let use_pack = options.use_pack && pack200;
    let use_version = options.use_version && version.is_some();

    if use_pack && use_version {
        push(with_file_name(location, |stem| {
            format!("{}__V{}.jar.pack.gz", stem, version.unwrap_or_default())
        }));
    }
    if use_version {
        push(with_file_name(location, |stem| {
            format!("{}__V{}.jar", stem, version.unwrap_or_default())
        }));
    }
    if use_pack {
        push(with_file_name(location, |stem| format!("{}.jar.pack.gz", stem)));
    }
    if options.use_pack {
        push(with_file_name(location, |stem| format!("{}.jar.gz", stem)));
    }
    if let Some(v) = version {
        let mut u = location.clone();
        u.query_pairs_mut().append_pair("version-id", v);
        push(Some(u));
    }
    push(Some(location.clone()));
    out
}

/// Rewrites the last path segment of a `.jar` location; other resources
/// have no file-name variants.
fn with_file_name(location: &Url, name: impl Fn(&str) -> String) -> Option<Url> {
    let file = location.path_segments()?.last()?;
    let stem = file.strip_suffix(".jar")?;
    if stem.is_empty() {
        return None;
    }
    let mut u = location.clone();
    u.path_segments_mut().ok()?.pop().push(&name(stem));
    u.set_query(None);
    Some(u)
}

/// Probes `candidates` in order and returns the first that answers with a
/// success status. Per-candidate failures are logged and skipped; `Ok(None)`
/// means every candidate was exhausted.
pub fn negotiate(
    http: &HttpClient,
    retry: &RetryPolicy,
    allow_redirects: bool,
    mut candidates: Vec<Url>,
) -> Result<Option<Negotiated>, FetchError> {
    let mut i = 0;
    while i < candidates.len() {
        let url = candidates[i].clone();
        i += 1;
        for method in [Method::Head, Method::Get] {
            let meta = match probe(http, retry, &url, method) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(%url, method = method.as_str(), "candidate failed: {}", e);
                    continue;
                }
            };
            if meta.is_redirect() {
                let Some(target) = meta.location.as_deref().and_then(|l| url.join(l).ok()) else {
                    tracing::debug!(%url, status = meta.status, "redirect without usable Location");
                    break;
                };
                if !allow_redirects {
                    return Err(FetchError::RedirectDisallowed {
                        from: url.to_string(),
                        to: target.to_string(),
                        status: meta.status,
                    });
                }
                tracing::debug!(%url, %target, status = meta.status, "following redirect");
                if !candidates.contains(&target) && candidates.len() < MAX_CANDIDATES {
                    candidates.insert(i, target);
                }
                break;
            }
            if meta.is_success() {
                return Ok(Some(Negotiated { url, meta }));
            }
            tracing::debug!(%url, method = method.as_str(), status = meta.status, "candidate rejected");
        }
    }
    Ok(None)
}

/// One probe with transient statuses (429, 5xx) retried per `retry`.
fn probe(
    http: &HttpClient,
    retry: &RetryPolicy,
    url: &Url,
    method: Method,
) -> Result<ResponseMeta, FetchError> {
    run_with_retry(retry, || {
        let meta = http.probe(url, method)?;
        match classify_http_status(meta.status) {
            ErrorKind::Throttled | ErrorKind::Http5xx(_) => Err(FetchError::Http(meta.status)),
            _ => Ok(meta),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn strs(v: &[Url]) -> Vec<String> {
        v.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn plain_location_only_by_default() {
        let c = candidate_urls(&url("http://h/lib/app.jar"), None, DownloadOptions::default(), true);
        assert_eq!(strs(&c), ["http://h/lib/app.jar"]);
    }

    #[test]
    fn full_priority_order() {
        let v = VersionString::parse("1.2").unwrap();
        let opts = DownloadOptions {
            use_pack: true,
            use_version: true,
        };
        let c = candidate_urls(&url("http://h/lib/app.jar"), Some(&v), opts, true);
        assert_eq!(
            strs(&c),
            [
                "http://h/lib/app__V1.2.jar.pack.gz",
                "http://h/lib/app__V1.2.jar",
                "http://h/lib/app.jar.pack.gz",
                "http://h/lib/app.jar.gz",
                "http://h/lib/app.jar?version-id=1.2",
                "http://h/lib/app.jar",
            ]
        );
    }

    #[test]
    fn pack_variants_need_an_unpacker() {
        let opts = DownloadOptions {
            use_pack: true,
            use_version: false,
        };
        let c = candidate_urls(&url("http://h/app.jar"), None, opts, false);
        assert_eq!(strs(&c), ["http://h/app.jar.gz", "http://h/app.jar"]);
    }

    #[test]
    fn non_jar_resources_keep_their_name() {
        let v = VersionString::parse("2").unwrap();
        let opts = DownloadOptions {
            use_pack: true,
            use_version: true,
        };
        let c = candidate_urls(&url("http://h/app.jnlp"), Some(&v), opts, true);
        assert_eq!(
            strs(&c),
            ["http://h/app.jnlp?version-id=2", "http://h/app.jnlp"]
        );
    }
}
