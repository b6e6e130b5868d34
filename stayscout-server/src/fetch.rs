use axum::{response::IntoResponse, routing::get, Json};

use crate::{
    context::ServerContext,
    serialized::{ToSerialized, TransportIdentity},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/fetch/transport",
    tag = "fetch",
    responses(
        (status = 200, body = Vec<TransportIdentity>)
    )
)]
pub(crate) async fn transport_status(context: ServerContext) -> impl IntoResponse {
    let identities: Vec<TransportIdentity> =
        context.collab.fetch.transport_status().to_serialized();

    Json(identities)
}

pub fn router() -> Router {
    Router::new().route("/transport", get(transport_status))
}
