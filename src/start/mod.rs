//! Server bootstrap: binds a [`Router`] to a TCP listener and drives it with hyper's
//! `Http` connection builder and a tokio multi-thread runtime.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use hyper::server::conn::Http;
use log::info;
use tokio::net::TcpListener;

use crate::router::Router;
use crate::service::WaypointService;

/// Starts a waypoint application on the default multi-threaded tokio runtime, blocking until
/// the listener loop exits (which in practice means until the process is killed — there is no
/// graceful-shutdown signal wired in).
pub fn start<A>(addr: A, router: Router)
where
    A: ToSocketAddrs,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("waypoint-worker")
        .build()
        .expect("failed to build tokio runtime");
    runtime.block_on(run(addr, router));
}

/// Runs the listener loop on the current tokio runtime; use this instead of [`start`] when the
/// caller already owns a runtime (e.g. inside a `#[tokio::main]` binary or a test).
pub async fn run<A>(addr: A, router: Router)
where
    A: ToSocketAddrs,
{
    let addr = resolve(addr);
    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("unable to bind to {}: {}", addr, e));

    info!("waypoint listening on http://{}", addr);

    let router = Arc::new(router);
    let protocol = Arc::new(Http::new());

    loop {
        let (stream, client_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("failed to accept connection: {}", e);
                continue;
            }
        };

        let service = WaypointService::new(router.clone(), client_addr);
        let protocol = protocol.clone();
        tokio::spawn(async move {
            if let Err(e) = protocol.serve_connection(stream, service).await {
                log::warn!("connection error from {}: {}", client_addr, e);
            }
        });
    }
}

fn resolve<A: ToSocketAddrs>(addr: A) -> SocketAddr {
    addr.to_socket_addrs()
        .ok()
        .and_then(|mut i| i.next())
        .unwrap_or_else(|| panic!("unable to resolve listener address"))
}
