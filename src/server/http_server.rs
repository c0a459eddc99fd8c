use anyhow::{anyhow, Context as _, Result};
use std::io::{self, Cursor};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Environment, FinalizedResponse};
use crate::app::Application;

/// Synchronous HTTP/1.1 transport on top of `tiny_http`.
///
/// Requests are served one at a time; each gets a fresh [`Environment`] and runs
/// through [`Application::run`].
pub struct HttpServer {
    server: Arc<tiny_http::Server>,
    addr: SocketAddr,
}

/// Handle to a server running on a background thread.
///
/// Provides methods for waiting until the server accepts connections and for stopping
/// it again.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<tiny_http::Server>,
    handle: thread::JoinHandle<()>,
}

impl ServerHandle {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the listening socket until a connection succeeds.
    ///
    /// # Errors
    ///
    /// When the server is not reachable within roughly two seconds.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..200 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("server at {} did not become ready", self.addr),
        ))
    }

    /// Stop accepting requests and wait for the serving thread.
    pub fn stop(self) {
        self.server.unblock();
        if self.handle.join().is_err() {
            warn!(addr = %self.addr, "Server thread panicked");
        }
    }
}

impl HttpServer {
    /// Listen on `addr` (`127.0.0.1:0` picks a free port).
    ///
    /// # Errors
    ///
    /// Address resolution and bind failures.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let addr = addr
            .to_socket_addrs()
            .context("invalid listen address")?
            .next()
            .ok_or_else(|| anyhow!("listen address resolved to nothing"))?;
        let server = tiny_http::Server::http(addr).map_err(|e| anyhow!("bind {addr}: {e}"))?;
        let addr = server.server_addr().to_ip().unwrap_or(addr);
        info!(addr = %addr, "HTTP server listening");
        Ok(Self {
            server: Arc::new(server),
            addr,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the listener is closed.
    pub fn serve(&self, app: &Application) {
        for request in self.server.incoming_requests() {
            self.handle(app, request);
        }
        info!(addr = %self.addr, "HTTP server stopped");
    }

    /// Serve exactly `count` requests, then return.
    ///
    /// # Errors
    ///
    /// When the listener fails before `count` requests arrived.
    pub fn serve_n(&self, app: &Application, count: usize) -> Result<()> {
        for _ in 0..count {
            let request = self.server.recv().context("failed to receive request")?;
            self.handle(app, request);
        }
        Ok(())
    }

    /// Serve on a background thread.
    #[must_use]
    pub fn spawn(self, app: Arc<Application>) -> ServerHandle {
        let server = Arc::clone(&self.server);
        let addr = self.addr;
        let handle = thread::spawn(move || self.serve(&app));
        ServerHandle {
            addr,
            server,
            handle,
        }
    }

    fn handle(&self, app: &Application, mut request: tiny_http::Request) {
        let env = match self.environment(&mut request) {
            Ok(env) => env,
            Err(err) => {
                warn!(error = %err, "Failed to read request");
                if let Err(err) = request.respond(tiny_http::Response::empty(400)) {
                    debug!(error = %err, "Failed to send 400");
                }
                return;
            }
        };
        let response = app.run(env);
        if let Err(err) = request.respond(to_tiny_response(&response)) {
            debug!(error = %err, "Client went away before the response was sent");
        }
    }

    fn environment(&self, request: &mut tiny_http::Request) -> io::Result<Environment> {
        let mut env = Environment::mock(&request.method().to_string(), request.url())
            .with_server(&self.addr.ip().to_string(), self.addr.port())
            .with_remote_addr(request.remote_addr().map(|a| a.ip().to_string()));
        for header in request.headers() {
            env = env.with_header(header.field.as_str().as_str(), header.value.as_str());
        }
        let mut body = Vec::new();
        request.as_reader().read_to_end(&mut body)?;
        Ok(env.with_body(String::from_utf8_lossy(&body).into_owned()))
    }
}

fn to_tiny_response(response: &FinalizedResponse) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let headers = response
        .headers
        .iter()
        .filter_map(|(name, value)| {
            tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
        })
        .collect();
    let body = response.body.as_bytes().to_vec();
    let length = body.len();
    tiny_http::Response::new(
        tiny_http::StatusCode(response.status),
        headers,
        Cursor::new(body),
        Some(length),
        None,
    )
}
