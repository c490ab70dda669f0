//! Request line validation
//!
//! Turns the bytes of a single read into either a dispatchable request, an
//! error status, or a silent drop. The checks run in a fixed order and stop
//! at the first failure.

use super::{Status, VirtualHostTable, DEFAULT_PORT, MAX_REQUEST_LEN};
use crate::content::clean_path;
use url::Url;

const INVALID_REQUEST: &str = "Invalid Request";

/// Validated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiRequest {
    /// Lowercase host name, without IPv6 brackets
    pub host: String,
    /// Host and explicit port as written, for building absolute links
    pub authority: String,
    pub port: u16,
    /// Cleaned path: `""` or `/seg/...`
    pub path: String,
}

impl GeminiRequest {
    /// `gemini://<authority>`
    pub fn origin(&self) -> String {
        format!("gemini://{}", self.authority)
    }
}

/// What to do with a connection after reading its request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Close without writing anything
    Drop,
    /// Write a header with no body and close
    Respond(Status, &'static str),
    Dispatch(GeminiRequest),
}

fn bad_request() -> Outcome {
    Outcome::Respond(Status::BadRequest, INVALID_REQUEST)
}

/// Path component of the request line as sent, before any normalization
fn raw_path(line: &str) -> &str {
    let Some((_, rest)) = line.split_once("://") else {
        return "";
    };
    let start = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let rest = &rest[start..];
    let end = rest
        .find(|c: char| matches!(c, '?' | '#'))
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Validate one request read
pub fn parse_request(raw: &[u8], hosts: &VirtualHostTable) -> Outcome {
    let Ok(text) = std::str::from_utf8(raw) else {
        // an unterminated request gets no answer
        return if raw.ends_with(b"\r\n") {
            bad_request()
        } else {
            Outcome::Drop
        };
    };

    let Some(crlf) = text.find("\r\n") else {
        return Outcome::Drop;
    };
    if crlf != text.len() - 2 {
        return Outcome::Drop;
    }
    if crlf > MAX_REQUEST_LEN {
        return bad_request();
    }

    let line = &text[..crlf];
    if line.starts_with('\u{FEFF}') {
        return bad_request();
    }

    let Ok(url) = Url::parse(line) else {
        return bad_request();
    };
    let Some(authority_host) = url.host_str().filter(|h| !h.is_empty()) else {
        return bad_request();
    };
    if url.scheme().is_empty() {
        return bad_request();
    }

    let Some(path) = clean_path(raw_path(line)) else {
        return bad_request();
    };

    if !url.scheme().eq_ignore_ascii_case("gemini") {
        return Outcome::Respond(Status::ProxyRequestRefused, "Invalid Scheme");
    }

    let host = authority_host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();
    let Some(expected_port) = hosts.port_for(&host) else {
        return Outcome::Respond(Status::ProxyRequestRefused, "Invalid Host");
    };

    let port = url.port().unwrap_or(DEFAULT_PORT);
    if port != expected_port {
        return Outcome::Respond(Status::ProxyRequestRefused, "Invalid Port");
    }

    let authority = match url.port() {
        Some(port) => format!("{}:{}", authority_host, port),
        None => authority_host.to_string(),
    };

    Outcome::Dispatch(GeminiRequest {
        host,
        authority,
        port,
        path,
    })
}
