//! Request environment: everything the framework knows about the incoming request.
//!
//! An [`Environment`] is built once per request by the transport (or by
//! [`Environment::mock`] in tests) and then owned by the request context. It replaces
//! process-global request state: method overrides, parsed query/form data and
//! arbitrary per-request attributes all live here.

use serde_json::Value;
use std::collections::HashMap;

/// How the application was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interface {
    /// Served over HTTP; sessions are started.
    #[default]
    Http,
    /// Invoked from the command line or a test harness; sessions are skipped.
    Console,
}

/// Content types that carry url-encoded form bodies.
const FORM_CONTENT_TYPES: [&str; 2] = ["application/x-www-form-urlencoded", "multipart/form-data"];

/// Request-scoped environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    method: String,
    original_method: Option<String>,
    script_name: String,
    path_info: String,
    query_string: String,
    server_name: String,
    server_port: u16,
    scheme: String,
    remote_addr: Option<String>,
    /// Lowercased names, original values, insertion order.
    headers: Vec<(String, String)>,
    body: String,
    interface: Interface,
    attributes: HashMap<String, Value>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            original_method: None,
            script_name: String::new(),
            path_info: "/".to_string(),
            query_string: String::new(),
            server_name: "localhost".to_string(),
            server_port: 80,
            scheme: "http".to_string(),
            remote_addr: Some("127.0.0.1".to_string()),
            headers: Vec::new(),
            body: String::new(),
            interface: Interface::Http,
            attributes: HashMap::new(),
        }
    }
}

impl Environment {
    /// Build an environment for `method` and a request target such as `/posts?page=2`.
    #[must_use]
    pub fn mock(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        let path = if path.is_empty() { "/" } else { path };
        Self {
            method: method.to_ascii_uppercase(),
            path_info: path.to_string(),
            query_string: query.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Shorthand for a url-encoded form body.
    #[must_use]
    pub fn with_form(self, pairs: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        self.with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(body)
    }

    /// Mount the application below a base path (e.g. `/app`).
    #[must_use]
    pub fn with_script_name(mut self, script_name: &str) -> Self {
        self.script_name = script_name.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_server(mut self, name: &str, port: u16) -> Self {
        self.server_name = name.to_string();
        self.server_port = port;
        self
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_ascii_lowercase();
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: Option<String>) -> Self {
        self.remote_addr = addr;
        self
    }

    #[must_use]
    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    #[must_use]
    pub fn interface(&self) -> Interface {
        self.interface
    }

    // ----- method -----

    /// Effective method, after any override.
    #[must_use]
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The method the client actually sent when an override was applied.
    #[must_use]
    pub fn original_method(&self) -> Option<&str> {
        self.original_method.as_deref()
    }

    /// Replace the effective method, remembering the first original.
    pub fn override_method(&mut self, method: &str) {
        let method = method.trim().to_ascii_uppercase();
        if method.is_empty() || method == self.method {
            return;
        }
        if self.original_method.is_none() {
            self.original_method = Some(std::mem::replace(&mut self.method, method));
        } else {
            self.method = method;
        }
    }

    #[must_use]
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    #[must_use]
    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }

    #[must_use]
    pub fn is_put(&self) -> bool {
        self.method == "PUT"
    }

    #[must_use]
    pub fn is_patch(&self) -> bool {
        self.method == "PATCH"
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.method == "DELETE"
    }

    #[must_use]
    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    #[must_use]
    pub fn is_options(&self) -> bool {
        self.method == "OPTIONS"
    }

    /// `X-Requested-With: XMLHttpRequest` or a truthy `isajax` parameter.
    #[must_use]
    pub fn is_ajax(&self) -> bool {
        if self.param("isajax").is_some_and(|v| !v.is_empty() && v != "0") {
            return true;
        }
        self.header("X-Requested-With") == Some("XMLHttpRequest")
    }

    // ----- headers -----

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    // ----- parameters -----

    /// Decoded query string pairs.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query_string.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Decoded form body pairs; empty unless the body is form data.
    #[must_use]
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        if !self.is_form_data() {
            return Vec::new();
        }
        url::form_urlencoded::parse(self.body.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Query string value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Form body value.
    #[must_use]
    pub fn post(&self, key: &str) -> Option<String> {
        self.form_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Form value if present, otherwise query value.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<String> {
        self.post(key).or_else(|| self.get(key))
    }

    /// Query and form merged; form wins on conflicts.
    #[must_use]
    pub fn params(&self) -> HashMap<String, String> {
        let mut merged: HashMap<String, String> = HashMap::new();
        for (k, v) in self.query_pairs() {
            merged.entry(k).or_insert(v);
        }
        for (k, v) in self.form_pairs() {
            merged.insert(k, v);
        }
        merged
    }

    /// POST without a content type, or any url-encoded / multipart body.
    #[must_use]
    pub fn is_form_data(&self) -> bool {
        let method = self.original_method().unwrap_or(&self.method);
        match self.media_type() {
            None => method == "POST",
            Some(media) => FORM_CONTENT_TYPES.contains(&media.as_str()),
        }
    }

    // ----- body / content -----

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Content type without parameters, lowercased.
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        self.content_type().map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Parameters of the content type, keys lowercased.
    #[must_use]
    pub fn media_type_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(ct) = self.content_type() {
            for part in ct.split(';').skip(1) {
                if let Some((k, v)) = part.split_once('=') {
                    params.insert(
                        k.trim().to_ascii_lowercase(),
                        v.trim().trim_matches('"').to_string(),
                    );
                }
            }
        }
        params
    }

    #[must_use]
    pub fn content_charset(&self) -> Option<String> {
        self.media_type_params().remove("charset")
    }

    #[must_use]
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.body.len())
    }

    // ----- host / url -----

    /// Host without port, from the `Host` header or the server name.
    #[must_use]
    pub fn host(&self) -> &str {
        match self.header("Host") {
            Some(host) => strip_port(host),
            None => &self.server_name,
        }
    }

    #[must_use]
    pub fn host_with_port(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.header("Host")
            .and_then(|h| h.rsplit_once(':'))
            .and_then(|(_, p)| p.parse().ok())
            .unwrap_or(self.server_port)
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Base path the application is mounted at (`SCRIPT_NAME`).
    #[must_use]
    pub fn root_uri(&self) -> &str {
        &self.script_name
    }

    /// Path relative to the application root (`PATH_INFO`).
    #[must_use]
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    /// Path the router matches against.
    #[must_use]
    pub fn resource_uri(&self) -> &str {
        &self.path_info
    }

    /// Full request path including the root.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}{}", self.script_name, self.path_info)
    }

    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Scheme, host and non-default port.
    #[must_use]
    pub fn url(&self) -> String {
        let port = self.port();
        let default_port = matches!((self.scheme.as_str(), port), ("https", 443) | ("http", 80));
        if default_port {
            format!("{}://{}", self.scheme, self.host())
        } else {
            format!("{}://{}:{}", self.scheme, self.host(), port)
        }
    }

    /// Client address: first `X-Forwarded-For` hop, `Client-Ip`, then the socket peer.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        if let Some(forwarded) = self.header("X-Forwarded-For") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return Some(first);
            }
        }
        self.header("Client-Ip").or(self.remote_addr.as_deref())
    }

    #[must_use]
    pub fn referrer(&self) -> Option<&str> {
        self.header("Referer")
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.header("User-Agent")
    }

    // ----- attributes -----

    /// Arbitrary per-request slot shared by hooks, middleware and actions.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }
}

fn strip_port(host: &str) -> &str {
    // bracketed IPv6 literal
    if host.starts_with('[') {
        return host.split_once(']').map_or(host, |(h, _)| &host[..=h.len()]);
    }
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_splits_query() {
        let env = Environment::mock("get", "/posts?page=2&tag=rust%20lang");
        assert_eq!(env.method(), "GET");
        assert_eq!(env.resource_uri(), "/posts");
        assert_eq!(env.get("page").as_deref(), Some("2"));
        assert_eq!(env.get("tag").as_deref(), Some("rust lang"));
    }

    #[test]
    fn test_form_params_win_over_query() {
        let env = Environment::mock("POST", "/x?name=query").with_form(&[("name", "form")]);
        assert!(env.is_form_data());
        assert_eq!(env.param("name").as_deref(), Some("form"));
        assert_eq!(env.params().get("name").map(String::as_str), Some("form"));
    }

    #[test]
    fn test_json_body_is_not_form_data() {
        let env = Environment::mock("POST", "/x")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body("{\"a\":1}");
        assert!(!env.is_form_data());
        assert_eq!(env.media_type().as_deref(), Some("application/json"));
        assert_eq!(env.content_charset().as_deref(), Some("utf-8"));
        assert!(env.form_pairs().is_empty());
    }

    #[test]
    fn test_override_keeps_first_original() {
        let mut env = Environment::mock("POST", "/");
        env.override_method("put");
        env.override_method("DELETE");
        assert_eq!(env.method(), "DELETE");
        assert_eq!(env.original_method(), Some("POST"));
    }

    #[test]
    fn test_host_and_url() {
        let env = Environment::mock("GET", "/").with_header("Host", "example.com:8080");
        assert_eq!(env.host(), "example.com");
        assert_eq!(env.port(), 8080);
        assert_eq!(env.url(), "http://example.com:8080");

        let env = Environment::mock("GET", "/").with_header("Host", "[::1]:3000");
        assert_eq!(env.host(), "[::1]");

        let env = Environment::mock("GET", "/").with_server("api.local", 80);
        assert_eq!(env.url(), "http://api.local");
    }

    #[test]
    fn test_ip_prefers_forwarded() {
        let env = Environment::mock("GET", "/")
            .with_header("X-Forwarded-For", "10.0.0.1, 10.0.0.2");
        assert_eq!(env.ip(), Some("10.0.0.1"));
        let env = Environment::mock("GET", "/").with_remote_addr(Some("192.168.1.9".into()));
        assert_eq!(env.ip(), Some("192.168.1.9"));
    }

    #[test]
    fn test_ajax_detection() {
        let env = Environment::mock("GET", "/").with_header("X-Requested-With", "XMLHttpRequest");
        assert!(env.is_ajax());
        assert!(Environment::mock("GET", "/?isajax=1").is_ajax());
        assert!(!Environment::mock("GET", "/").is_ajax());
    }

    #[test]
    fn test_script_name_prefixes_path() {
        let env = Environment::mock("GET", "/users").with_script_name("/app/");
        assert_eq!(env.root_uri(), "/app");
        assert_eq!(env.path(), "/app/users");
    }
}
