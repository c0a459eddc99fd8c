//! # CLI Module
//!
//! The `brisk` binary: a small demo application plus commands to serve it and to
//! inspect its routes.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! ```bash
//! brisk serve --addr 127.0.0.1:8080 --config config/app.yaml
//! ```
//!
//! Options:
//! - `--addr <ADDR>` - listen address (default `127.0.0.1:8080`, env `BRISK_ADDR`)
//! - `--config <FILE>` - YAML or TOML configuration, patched by `BRISK_*` variables
//! - `--max-requests <N>` - exit after serving `N` requests
//!
//! ### `routes`
//!
//! ```bash
//! brisk routes
//! ```
//!
//! Prints one line per route: methods, pattern, name and target.

mod commands;


pub use commands::{demo_application, load_config, run, run_cli, Cli, Commands};
