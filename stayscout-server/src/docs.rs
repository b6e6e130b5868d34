use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;
use utoipauto::utoipauto;

#[utoipauto(paths = "./stayscout-server/src")]
#[derive(OpenApi)]
#[openapi(info(
    description = "stayscout-server exposes endpoints to interact with this stayscout instance"
))]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
