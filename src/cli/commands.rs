use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::app::{Application, Context};
use crate::config::AppConfig;
use crate::dispatcher::{route_middleware, Flow};
use crate::logging::{init_logging, LogConfig};
use crate::middleware::TracingMiddleware;
use crate::router::{GroupSpec, Route};
use crate::server::HttpServer;
use crate::view::MemoryTemplates;

/// Command-line interface for brisk.
#[derive(Parser, Debug)]
#[command(name = "brisk")]
#[command(about = "brisk web framework demo", long_about = None, version)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the demo application over HTTP
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080", env = "BRISK_ADDR")]
        addr: String,

        /// Configuration file (.yaml, .yml or .toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Exit after this many requests
        #[arg(long)]
        max_requests: Option<usize>,
    },
    /// Print the demo application's route table
    Routes {
        /// Configuration file (.yaml, .yml or .toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Configuration from `path` (if any), then the environment.
///
/// # Errors
///
/// Unreadable or malformed configuration files.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => AppConfig::default(),
    };
    Ok(config.apply_env())
}

const HOME_TEMPLATE: &str = "<h1>{{ title }}</h1>{% if flash %}\
{% for key, message in flash|items %}<p class=\"{{ key }}\">{{ message }}</p>{% endfor %}\
{% endif %}";

/// The application behind `brisk serve`.
///
/// # Errors
///
/// Route registration failures.
pub fn demo_application(config: AppConfig) -> Result<Application> {
    let views = MemoryTemplates::new().with("home", HOME_TEMPLATE);
    let mut app = Application::new(config).with_view(views);
    app.view_data_mut().set("title", "brisk");
    app.add_middleware(Arc::new(TracingMiddleware))?;

    app.get("/", |ctx: &mut Context<'_>| ctx.render("home", json!({})))?
        .name("home")?;
    app.get("/hello/:name", |ctx: &mut Context<'_>| {
        let name = ctx.param("name").unwrap_or("world").to_string();
        ctx.content_type("text/plain");
        ctx.response_mut().write(&format!("Hello, {name}!"));
        Ok(())
    })?
    .name("hello")?;
    app.get("/posts(/:id)", |ctx: &mut Context<'_>| {
        let body = match ctx.param("id") {
            Some(id) => format!("post {id}"),
            None => "all posts".to_string(),
        };
        ctx.response_mut().write(&body);
        Ok(())
    })?
    .conditions([("id", r"\d+")])?
    .name("posts")?;
    app.get("/files/:path+", |ctx: &mut Context<'_>| {
        let segments = ctx.param_segments("path").join(" / ");
        ctx.response_mut().write(&segments);
        Ok(())
    })?;
    app.post("/flash", |ctx: &mut Context<'_>| -> Flow {
        let message = ctx.env().post("message").unwrap_or_else(|| "Saved".to_string());
        ctx.flash("info", message);
        ctx.redirect_to("home", &[], 302)
    })?;

    let require_token = route_middleware(|ctx: &mut Context<'_>, _route: &Route| {
        if ctx.env().header("X-Admin-Token").is_none() {
            return ctx.halt(403, "forbidden");
        }
        Ok(())
    });
    app.group(GroupSpec::prefix("/admin"), vec![require_token], |router| {
        router
            .get("/stats", |ctx: &mut Context<'_>| {
                let routes = ctx.app().router().len();
                ctx.content_type("application/json");
                ctx.response_mut().write(&json!({ "routes": routes }).to_string());
                Ok(())
            })?
            .name("admin.stats")?;
        Ok(())
    })?;

    info!(routes = app.router().len(), "Demo application ready");
    Ok(app)
}

/// Entry point for the `brisk` binary.
///
/// # Errors
///
/// Configuration, logging and bind failures.
pub fn run_cli() -> Result<()> {
    run(Cli::parse())
}

/// Execute an already parsed command line.
///
/// # Errors
///
/// Configuration, logging and bind failures.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            addr,
            config,
            max_requests,
        } => {
            let _guard = init_logging(&LogConfig::from_env())?;
            let app = demo_application(load_config(config.as_deref())?)?;
            let server = HttpServer::bind(addr.as_str())?;
            println!("brisk listening on http://{}", server.local_addr());
            match max_requests {
                Some(count) => server.serve_n(&app, count)?,
                None => server.serve(&app),
            }
            Ok(())
        }
        Commands::Routes { config } => {
            let app = demo_application(load_config(config.as_deref())?)?;
            for line in app.router().route_table() {
                println!("{line}");
            }
            Ok(())
        }
    }
}
