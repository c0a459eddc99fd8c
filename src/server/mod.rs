//! # Server Module
//!
//! Request and response types plus the HTTP transport.
//!
//! - [`Environment`] - everything known about the incoming request
//! - [`Response`] - status, header multimap and body under construction;
//!   [`FinalizedResponse`] is what the transport writes
//! - [`CookieJar`] - request cookies and pending `Set-Cookie` headers, optionally signed
//! - [`HttpServer`] - synchronous `tiny_http` transport feeding
//!   [`Application::run`](crate::app::Application::run)

mod cookies;
mod http_server;
mod request;
mod response;

pub use cookies::{
    decode_signed, encode_signed, http_date, parse_cookie_header, CookieJar, CookieOptions,
};
pub use http_server::{HttpServer, ServerHandle};
pub use request::{Environment, Interface};
pub use response::{
    reason_phrase, FinalizedResponse, HeaderVec, Response, MAX_INLINE_HEADERS, POWERED_BY,
};
