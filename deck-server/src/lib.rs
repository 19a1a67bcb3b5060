mod actions;
mod connection;
mod context;
mod dispatch;
mod errors;
mod http;
mod schemas;
mod serialized;
mod socket;

use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use deck_collab::Collab;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use connection::{Connection, Lifecycle, ProtocolError};
pub use context::*;
pub use dispatch::Request;
pub use errors::*;
pub use socket::AUTH_COOKIE;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Builds the router of every endpoint
pub fn router(context: ServerContext) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(socket::router())
        .merge(http::router())
        .layer(cors)
        .with_state(context)
}

/// Starts the deck server
pub async fn run_server(collab: Arc<Collab>, port: u16) -> std::io::Result<()> {
    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        router(ServerContext::new(collab)).into_make_service(),
    )
    .await
}
