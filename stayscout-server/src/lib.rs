use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    thread,
};

use axum::routing::get;
use log::info;
use stayscout_collab::{Collab, EventReceiver};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod context;
mod docs;
mod errors;
mod fetch;
mod groups;
mod members;
mod schemas;
mod serialized;
mod sse;

pub use context::ServerContext;

use sse::ServerSentEvents;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Starts the stayscout server
pub async fn run_server(collab: Arc<Collab>, events: EventReceiver) {
    let port = env::var("STAYSCOUT_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let context = ServerContext {
        collab,
        sse: ServerSentEvents::new(),
    };

    spawn_event_pump(context.clone(), events);

    let version_one_router = Router::new()
        .nest("/groups", groups::router().merge(sse::router()))
        .nest("/members", members::router())
        .nest("/fetch", fetch::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}

/// Routes collab events to the subscribers of the group they concern
fn spawn_event_pump(context: ServerContext, receiver: EventReceiver) {
    thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            let group_id = event.group_id();

            context.sse.broadcast(group_id, event.into());
        }
    });
}
