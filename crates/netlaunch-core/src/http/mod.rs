//! HTTP HEAD/GET exchanges over libcurl.
//!
//! Redirects are never followed by curl itself: the negotiation layer sees
//! the 3xx status and `Location` and applies the global redirect policy.
//! Everything here blocks the calling thread.

mod parse;

pub use parse::{parse_headers, ResponseMeta};

use std::cell::{Cell, RefCell};
use std::str;
use std::time::Duration;

use url::Url;

use crate::retry::FetchError;

/// Status codes treated as redirects during negotiation.
pub const REDIRECT_CODES: [u32; 5] = [301, 302, 303, 307, 308];

/// Request methods tried in order when negotiating a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Head,
    Get,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
        }
    }
}

/// Shared request settings for every exchange a tracker performs.
#[derive(Debug, Clone)]
pub struct HttpClient {
    connect_timeout: Duration,
    transfer_timeout: Duration,
    accept_encoding: String,
}

impl HttpClient {
    pub fn new(connect_timeout: Duration, transfer_timeout: Duration, pack200: bool) -> Self {
        let accept_encoding = if pack200 {
            "pack200-gzip, gzip".to_string()
        } else {
            "gzip".to_string()
        };
        Self {
            connect_timeout,
            transfer_timeout,
            accept_encoding,
        }
    }

    pub fn accept_encoding(&self) -> &str {
        &self.accept_encoding
    }

    fn easy(&self, url: &Url) -> Result<curl::easy::Easy, FetchError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url.as_str())?;
        easy.follow_location(false)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.transfer_timeout)?;
        let mut list = curl::easy::List::new();
        list.append(&format!("Accept-Encoding: {}", self.accept_encoding))?;
        easy.http_headers(list)?;
        Ok(easy)
    }

    /// Sends `method` to `url` and returns the status and headers without
    /// reading the body. A GET probe aborts the transfer at the first body byte.
    pub fn probe(&self, url: &Url, method: Method) -> Result<ResponseMeta, FetchError> {
        let mut easy = self.easy(url)?;
        if method == Method::Head {
            easy.nobody(true)?;
        }
        let headers = RefCell::new(Vec::<String>::new());
        let result = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    headers.borrow_mut().push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|_| Ok(0))?;
            transfer.perform()
        };
        if let Err(e) = result {
            // Aborting a GET at the first body chunk is expected.
            if !(method == Method::Get && e.is_write_error()) {
                return Err(FetchError::Curl(e));
            }
        }
        let status = easy.response_code()?;
        let mut meta = parse_headers(&headers.into_inner());
        meta.status = status;
        Ok(meta)
    }

    /// GETs `url`, handing each body chunk of a 2xx response to `sink`.
    /// `sink` returning an error aborts the transfer with that error.
    pub fn get<F>(&self, url: &Url, mut sink: F) -> Result<ResponseMeta, FetchError>
    where
        F: FnMut(&[u8]) -> std::io::Result<()>,
    {
        let mut easy = self.easy(url)?;
        let headers = RefCell::new(Vec::<String>::new());
        let status = Cell::new(0u32);
        let sink_error: RefCell<Option<std::io::Error>> = RefCell::new(None);
        let result = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    let line = s.trim_end();
                    if let Some(code) = parse::status_code(line) {
                        status.set(code);
                        headers.borrow_mut().clear();
                    }
                    headers.borrow_mut().push(line.to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                if !(200..300).contains(&status.get()) {
                    return Ok(data.len());
                }
                match sink(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        *sink_error.borrow_mut() = Some(e);
                        Ok(0)
                    }
                }
            })?;
            transfer.perform()
        };
        if let Some(e) = sink_error.into_inner() {
            return Err(FetchError::Storage(e));
        }
        result?;
        let code = easy.response_code()?;
        let mut meta = parse_headers(&headers.into_inner());
        meta.status = code;
        if !meta.is_success() {
            return Err(FetchError::Http(code));
        }
        Ok(meta)
    }

    /// GETs `url` into memory. Used by the codebase fallback loader.
    pub fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        self.get(url, |chunk| {
            body.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(body)
    }
}
