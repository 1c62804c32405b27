//! Map HTTP status codes and curl errors onto retry error kinds.

use super::error::FetchError;
use super::policy::ErrorKind;

pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

pub fn classify(e: &FetchError) -> ErrorKind {
    match e {
        FetchError::Curl(ce) => classify_curl_error(ce),
        FetchError::Http(code) => classify_http_status(*code),
        FetchError::PartialTransfer { .. } => ErrorKind::Connection,
        FetchError::RedirectDisallowed { .. }
        | FetchError::VersionMismatch { .. }
        | FetchError::Storage(_)
        | FetchError::Decode(_) => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_statuses() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn server_errors_retryable() {
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn client_errors_and_redirects_are_final() {
        assert_eq!(classify_http_status(404), ErrorKind::Other);
        let redirect = FetchError::RedirectDisallowed {
            from: "http://a/x.jar".into(),
            to: "http://b/x.jar".into(),
            status: 302,
        };
        assert_eq!(classify(&redirect), ErrorKind::Other);
        let partial = FetchError::PartialTransfer {
            expected: 10,
            received: 4,
        };
        assert_eq!(classify(&partial), ErrorKind::Connection);
    }
}
