//! Request cookies in, `Set-Cookie` headers out.
//!
//! The jar is seeded from the request's `Cookie` header and records every change the
//! application makes. At finalize time [`CookieJar::set_cookie_headers`] renders the
//! pending changes, one header per cookie.
//!
//! With `cookies.encrypt` enabled values are signed (not encrypted) as
//! `expires|base64(value)|mac`; a value whose signature or expiry does not check out
//! is dropped when the jar is built.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::CookieSettings;

type HmacSha256 = Hmac<Sha256>;

/// Per-cookie overrides for [`CookieJar::set_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    /// Lifetime in seconds from now. `Some(0)` means a browser-session cookie,
    /// `None` uses `cookies.expires`.
    pub expires: Option<i64>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: Option<bool>,
    pub httponly: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingCookie {
    name: String,
    value: String,
    /// Unix timestamp; `None` for browser-session cookies.
    expires_at: Option<i64>,
    path: String,
    domain: Option<String>,
    secure: bool,
    httponly: bool,
}

/// Cookies for the current request.
#[derive(Debug, Clone)]
pub struct CookieJar {
    settings: CookieSettings,
    incoming: BTreeMap<String, String>,
    pending: Vec<PendingCookie>,
}

impl CookieJar {
    /// Build a jar from a raw `Cookie` header.
    #[must_use]
    pub fn from_header(header: Option<&str>, settings: CookieSettings) -> Self {
        let now = chrono::Utc::now().timestamp();
        let mut incoming = BTreeMap::new();
        for (name, raw) in parse_cookie_header(header.unwrap_or_default()) {
            let value = if settings.encrypt {
                match decode_signed(&raw, settings.secret_key.as_bytes(), now) {
                    Some(v) => v,
                    None => {
                        debug!(cookie = %name, "Dropping cookie with bad signature or expired");
                        continue;
                    }
                }
            } else {
                raw
            };
            incoming.insert(name, value);
        }
        Self {
            settings,
            incoming,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.incoming.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.incoming.contains_key(name)
    }

    /// All cookies visible to this request, including ones set during it.
    #[must_use]
    pub fn all(&self) -> &BTreeMap<String, String> {
        &self.incoming
    }

    /// Set a cookie with the configured defaults.
    pub fn set(&mut self, name: &str, value: &str) {
        self.set_with(name, value, CookieOptions::default());
    }

    pub fn set_with(&mut self, name: &str, value: &str, options: CookieOptions) {
        let now = chrono::Utc::now().timestamp();
        let lifetime = options.expires.unwrap_or(self.settings.expires);
        let expires_at =
            (lifetime != 0).then(|| now.saturating_add(lifetime).min(LATEST_EXPIRY));
        self.push_pending(PendingCookie {
            name: name.to_string(),
            value: value.to_string(),
            expires_at,
            path: options.path.unwrap_or_else(|| self.settings.path.clone()),
            domain: options.domain.or_else(|| self.settings.domain.clone()),
            secure: options.secure.unwrap_or(self.settings.secure),
            httponly: options.httponly.unwrap_or(self.settings.httponly),
        });
        self.incoming.insert(name.to_string(), value.to_string());
    }

    /// Expire a cookie on the client and forget it for the rest of the request.
    pub fn remove(&mut self, name: &str) {
        self.push_pending(PendingCookie {
            name: name.to_string(),
            value: String::new(),
            expires_at: Some(0),
            path: self.settings.path.clone(),
            domain: self.settings.domain.clone(),
            secure: self.settings.secure,
            httponly: self.settings.httponly,
        });
        self.incoming.remove(name);
    }

    /// Remove every cookie whose name starts with `prefix` (case-insensitive).
    ///
    /// `None` uses `cookies.prefix`; an empty prefix removes nothing.
    pub fn clear(&mut self, prefix: Option<&str>) {
        let prefix = prefix
            .unwrap_or(&self.settings.prefix)
            .to_ascii_lowercase();
        if prefix.is_empty() {
            return;
        }
        let doomed: Vec<String> = self
            .incoming
            .keys()
            .filter(|k| k.to_ascii_lowercase().starts_with(&prefix))
            .cloned()
            .collect();
        for name in doomed {
            self.remove(&name);
        }
    }

    fn push_pending(&mut self, cookie: PendingCookie) {
        self.pending.retain(|c| c.name != cookie.name);
        self.pending.push(cookie);
    }

    /// Render pending changes as `Set-Cookie` header values.
    #[must_use]
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.pending
            .iter()
            .map(|cookie| {
                let value = if self.settings.encrypt && !cookie.value.is_empty() {
                    encode_signed(
                        &cookie.value,
                        cookie.expires_at.unwrap_or(0),
                        self.settings.secret_key.as_bytes(),
                    )
                } else {
                    cookie.value.clone()
                };
                render_set_cookie(cookie, &value)
            })
            .collect()
    }
}

fn render_set_cookie(cookie: &PendingCookie, value: &str) -> String {
    let mut out = format!(
        "{}={}",
        urlencoding::encode(&cookie.name),
        urlencoding::encode(value)
    );
    if let Some(domain) = cookie.domain.as_deref().filter(|d| !d.is_empty()) {
        out.push_str("; domain=");
        out.push_str(domain);
    }
    if !cookie.path.is_empty() {
        out.push_str("; path=");
        out.push_str(&cookie.path);
    }
    if let Some(at) = cookie.expires_at {
        out.push_str("; expires=");
        out.push_str(&http_date(at));
    }
    if cookie.secure {
        out.push_str("; secure");
    }
    if cookie.httponly {
        out.push_str("; HttpOnly");
    }
    out
}

/// RFC 7231 IMF-fixdate.
#[must_use]
/// `Fri, 31 Dec 9999 23:59:59 GMT`, the latest date an `expires` attribute can carry.
const LATEST_EXPIRY: i64 = 253_402_300_799;

pub fn http_date(unix: i64) -> String {
    chrono::DateTime::from_timestamp(unix, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Split a `Cookie` header on `;` and `,`, URL-decoding names and values.
///
/// When a name repeats, the first occurrence wins.
#[must_use]
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut seen = BTreeMap::new();
    let mut out = Vec::new();
    for pair in header.split([';', ',']) {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = decode(name.trim());
        if name.is_empty() || seen.contains_key(&name) {
            continue;
        }
        let value = decode(value.trim());
        seen.insert(name.clone(), ());
        out.push((name, value));
    }
    out
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn mac_for(value: &str, expires: i64, secret: &[u8]) -> Option<HmacSha256> {
    let mut keyed = HmacSha256::new_from_slice(secret).ok()?;
    keyed.update(expires.to_string().as_bytes());
    let key = keyed.finalize().into_bytes();
    let mut mac = HmacSha256::new_from_slice(&key).ok()?;
    mac.update(expires.to_string().as_bytes());
    mac.update(value.as_bytes());
    Some(mac)
}

/// Sign `value` as `expires|base64(value)|mac`.
#[must_use]
pub fn encode_signed(value: &str, expires: i64, secret: &[u8]) -> String {
    let tag = mac_for(value, expires, secret)
        .map(|mac| URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{expires}|{}|{tag}", STANDARD.encode(value))
}

/// Verify a signed cookie value.
///
/// Values that are not three `|`-separated parts are returned unchanged. Expired
/// (non-zero `expires` in the past) or tampered values yield `None`.
#[must_use]
pub fn decode_signed(raw: &str, secret: &[u8], now: i64) -> Option<String> {
    let parts: Vec<&str> = raw.split('|').collect();
    let [expires, payload, tag] = parts.as_slice() else {
        return Some(raw.to_string());
    };
    let expires: i64 = expires.parse().ok()?;
    if expires != 0 && expires < now {
        return None;
    }
    let value = String::from_utf8(STANDARD.decode(payload).ok()?).ok()?;
    let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
    mac_for(&value, expires, secret)?.verify_slice(&tag).ok()?;
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn test_parse_first_wins_and_decodes() {
        let parsed = parse_cookie_header("a=1; b=hello%20world, a=2;broken; c=");
        assert_eq!(
            parsed,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "hello world".to_string()),
                ("c".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_signed_round_trip() {
        let signed = encode_signed("user=42", 0, SECRET);
        assert_eq!(signed.split('|').count(), 3);
        assert_eq!(decode_signed(&signed, SECRET, 1_000).as_deref(), Some("user=42"));
    }

    #[test]
    fn test_signed_rejects_tampering_and_expiry() {
        let signed = encode_signed("admin=0", 2_000, SECRET);
        let forged = signed.replacen(&STANDARD.encode("admin=0"), &STANDARD.encode("admin=1"), 1);
        assert_eq!(decode_signed(&forged, SECRET, 1_000), None);
        assert_eq!(decode_signed(&signed, b"other-secret", 1_000), None);
        assert_eq!(decode_signed(&signed, SECRET, 3_000), None);
        assert_eq!(decode_signed("plain", SECRET, 0).as_deref(), Some("plain"));
    }

    #[test]
    fn test_jar_set_remove_clear() {
        let mut jar = CookieJar::from_header(
            Some("brisk_a=1; brisk_b=2; other=3"),
            CookieSettings::default(),
        );
        jar.set("theme", "dark");
        assert_eq!(jar.get("theme"), Some("dark"));
        jar.clear(None);
        assert!(!jar.has("brisk_a"));
        assert!(jar.has("other"));

        let headers = jar.set_cookie_headers();
        assert_eq!(headers.len(), 3);
        assert!(headers.iter().any(|h| h.starts_with("theme=dark; path=/")));
        assert!(headers
            .iter()
            .any(|h| h.starts_with("brisk_a=;") && h.contains("expires=Thu, 01 Jan 1970")));
    }

    #[test]
    fn test_encrypted_jar_signs_outgoing_and_drops_forged() {
        let settings = CookieSettings {
            encrypt: true,
            secret_key: "s3cret".into(),
            ..CookieSettings::default()
        };
        let mut jar = CookieJar::from_header(Some("token=0|Zm9v|bogus"), settings.clone());
        assert!(!jar.has("token"));
        jar.set("token", "foo");
        let header = jar.set_cookie_headers().remove(0);
        let raw = header
            .split(';')
            .next()
            .and_then(|kv| kv.split_once('='))
            .map(|(_, v)| v.to_string())
            .unwrap();
        let incoming = CookieJar::from_header(Some(&format!("token={raw}")), settings);
        assert_eq!(incoming.get("token"), Some("foo"));
    }
}
