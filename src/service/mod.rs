//! Wraps a [`Router`] as a `hyper::service::Service`, binding one instance per accepted
//! connection.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper::service::Service;
use hyper::{Body, Request, Response};

use crate::router::Router;

/// Binds a [`Router`] to hyper's per-connection `Service` contract.
///
/// Each accepted connection gets its own `WaypointService`, cheaply cloned from a shared `Arc`;
/// `Router::serve` already traps panics internally, so this layer only has to satisfy hyper's
/// type-level `Service` contract.
pub struct WaypointService {
    router: Arc<Router>,
    client_addr: SocketAddr,
}

impl WaypointService {
    pub(crate) fn new(router: Arc<Router>, client_addr: SocketAddr) -> Self {
        WaypointService { router, client_addr }
    }

    /// The peer address hyper assigned this connection, available to handlers via request
    /// extensions if they need it (hyper's `Service` trait itself has no hook to forward it).
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }
}

impl Service<Request<Body>> for WaypointService {
    type Response = Response<Body>;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let router = self.router.clone();
        Box::pin(async move { Ok(router.serve(req).await) })
    }
}

/// Produces a fresh [`WaypointService`] bound to each connection accepted on a listener, the
/// `MakeService`-shaped factory hyper's server builder expects.
pub(crate) struct MakeWaypointService {
    router: Arc<Router>,
}

impl MakeWaypointService {
    pub(crate) fn new(router: Arc<Router>) -> Self {
        MakeWaypointService { router }
    }
}

impl<'a> Service<&'a hyper::server::conn::AddrStream> for MakeWaypointService {
    type Response = WaypointService;
    type Error = std::convert::Infallible;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, conn: &'a hyper::server::conn::AddrStream) -> Self::Future {
        let router = self.router.clone();
        let client_addr = conn.remote_addr();
        Box::pin(async move { Ok(WaypointService::new(router, client_addr)) })
    }
}
