//! Mutable HTTP response built up during a request and finalized before transport.

use smallvec::SmallVec;
use std::sync::Arc;

/// Headers that fit inline before the header list spills to the heap.
pub const MAX_INLINE_HEADERS: usize = 8;

/// Ordered header multimap. Names keep the casing they were set with; lookups ignore case.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Value of the `X-Powered-By` header every response starts with.
pub const POWERED_BY: &str = concat!("brisk/", env!("CARGO_PKG_VERSION"));

/// Response under construction.
///
/// Starts as `200 OK`, `Content-Type: text/html` with an empty body. Handlers mutate it
/// through the request context; [`Response::finalize`] produces what is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: HeaderVec,
    body: String,
}

impl Default for Response {
    fn default() -> Self {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("Content-Type"), "text/html".to_string()));
        headers.push((Arc::from("X-Powered-By"), POWERED_BY.to_string()));
        Self {
            status: 200,
            headers,
            body: String::new(),
        }
    }
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// First value of a header, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value set for a header, in insertion order.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Replace every value of `name` with a single one.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((Arc::from(name), value.into()));
    }

    /// Add another value for `name`, keeping the existing ones (e.g. `Set-Cookie`).
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((Arc::from(name), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    /// Append to the body.
    pub fn write(&mut self, chunk: &str) {
        self.body.push_str(chunk);
    }

    /// Body length in bytes.
    #[must_use]
    pub fn length(&self) -> usize {
        self.body.len()
    }

    /// Set `Location` and a redirect status.
    pub fn redirect(&mut self, url: &str, status: u16) {
        self.set_status(status);
        self.set_header("Location", url);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.status, 201 | 204 | 304)
    }

    #[must_use]
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    #[must_use]
    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.status)
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Status line without the protocol, e.g. `404 Not Found`.
    #[must_use]
    pub fn status_text(&self) -> String {
        match reason_phrase(self.status) {
            Some(reason) => format!("{} {reason}", self.status),
            None => self.status.to_string(),
        }
    }

    /// Freeze the response for transport.
    ///
    /// `204` and `304` lose their body together with `Content-Type` and `Content-Length`.
    #[must_use]
    pub fn finalize(&self) -> FinalizedResponse {
        let mut headers = self.headers.clone();
        let mut body = self.body.clone();
        if matches!(self.status, 204 | 304) {
            headers.retain(|(k, _)| {
                !k.eq_ignore_ascii_case("Content-Type") && !k.eq_ignore_ascii_case("Content-Length")
            });
            body.clear();
        }
        FinalizedResponse {
            status: self.status,
            headers,
            body,
        }
    }
}

/// Canonical reason phrase for a status code.
#[must_use]
pub fn reason_phrase(status: u16) -> Option<&'static str> {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
}

/// The `(status, headers, body)` triple handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: String,
}

impl FinalizedResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// `HTTP/<version> <code> <reason>`.
    #[must_use]
    pub fn status_line(&self, http_version: &str) -> String {
        match reason_phrase(self.status) {
            Some(reason) => format!("HTTP/{http_version} {} {reason}", self.status),
            None => format!("HTTP/{http_version} {}", self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let res = Response::new();
        assert_eq!(res.status(), 200);
        assert_eq!(res.header("content-type"), Some("text/html"));
        assert_eq!(res.header("X-Powered-By"), Some(POWERED_BY));
        assert_eq!(res.body(), "");
    }

    #[test]
    fn test_set_header_replaces_append_keeps() {
        let mut res = Response::new();
        res.set_header("content-type", "application/json");
        assert_eq!(res.header_values("Content-Type"), vec!["application/json"]);
        res.append_header("Set-Cookie", "a=1");
        res.append_header("Set-Cookie", "b=2");
        assert_eq!(res.header_values("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_write_appends() {
        let mut res = Response::new();
        res.write("Hello");
        res.write(", world");
        assert_eq!(res.body(), "Hello, world");
        assert_eq!(res.length(), 12);
        res.set_body("reset");
        assert_eq!(res.body(), "reset");
    }

    #[test]
    fn test_finalize_strips_no_content() {
        for status in [204, 304] {
            let mut res = Response::new();
            res.set_status(status);
            res.set_header("Content-Length", "5");
            res.write("hello");
            let done = res.finalize();
            assert_eq!(done.body, "");
            assert!(done.header("Content-Type").is_none());
            assert!(done.header("Content-Length").is_none());
            assert!(done.header("X-Powered-By").is_some());
        }
    }

    #[test]
    fn test_status_text_and_predicates() {
        let mut res = Response::new();
        res.redirect("/login", 302);
        assert!(res.is_redirect());
        assert!(res.is_redirection());
        assert_eq!(res.header("Location"), Some("/login"));
        assert_eq!(res.status_text(), "302 Found");
        res.set_status(404);
        assert!(res.is_not_found());
        assert!(res.is_client_error());
        assert_eq!(res.finalize().status_line("1.1"), "HTTP/1.1 404 Not Found");
    }
}
