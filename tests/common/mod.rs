#![allow(dead_code)]

use brisk::app::Application;
use brisk::config::{AppConfig, LogHandler};
use brisk::server::{Environment, FinalizedResponse, Interface};

/// Defaults, with the framework logger forwarding to `tracing` instead of files.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.log.handler = LogHandler::Tracing;
    config
}

pub fn test_app() -> Application {
    Application::new(test_config())
}

/// A request that skips session handling.
pub fn console(method: &str, target: &str) -> Environment {
    Environment::mock(method, target).with_interface(Interface::Console)
}

/// `Cookie` header value echoing every `Set-Cookie` of `response`.
pub fn cookie_header(response: &FinalizedResponse) -> String {
    response
        .header_values("Set-Cookie")
        .iter()
        .filter_map(|c| c.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}
