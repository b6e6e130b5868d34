use axum::{
    extract::{Path, Query},
    routing::{get, post},
    Json,
};
use stayscout_collab::{NewGroup, NewMember};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewGroupSchema, NewMemberSchema, TriggerFetchQuery, ValidatedJson},
    serialized::{FetchDispatch, FetchStatus, Group, LeaderboardEntry, Member, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/groups",
    tag = "groups",
    request_body = NewGroupSchema,
    responses(
        (status = 200, body = Group)
    )
)]
pub(crate) async fn create_group(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<NewGroupSchema>,
) -> ServerResult<Json<Group>> {
    let group = context
        .collab
        .groups
        .create_group(NewGroup {
            name: body.name,
            adults: body.adults,
            children: body.children,
            infants: body.infants,
            pets: body.pets,
            check_in: body.check_in,
            check_out: body.check_out,
            price_min: body.price_min,
            price_max: body.price_max,
            destinations: body.destinations,
        })
        .await?;

    Ok(Json(group.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/groups/{id}",
    tag = "groups",
    responses(
        (status = 200, body = Group)
    )
)]
pub(crate) async fn group(
    context: ServerContext,
    Path(group_id): Path<i32>,
) -> ServerResult<Json<Group>> {
    let group = context.collab.groups.group_by_id(group_id).await?;

    Ok(Json(group.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/groups/{id}/members",
    tag = "groups",
    request_body = NewMemberSchema,
    responses(
        (status = 200, body = Member)
    )
)]
pub(crate) async fn join_group(
    context: ServerContext,
    Path(group_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewMemberSchema>,
) -> ServerResult<Json<Member>> {
    let member = context
        .collab
        .groups
        .join(NewMember {
            group_id,
            nickname: body.nickname,
            avatar: body.avatar,
        })
        .await?;

    Ok(Json(member.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/groups/{id}/leaderboard",
    tag = "groups",
    responses(
        (status = 200, body = Vec<LeaderboardEntry>)
    )
)]
pub(crate) async fn leaderboard(
    context: ServerContext,
    Path(group_id): Path<i32>,
) -> ServerResult<Json<Vec<LeaderboardEntry>>> {
    context.collab.groups.group_by_id(group_id).await?;

    let entries = context.collab.leaderboard(group_id).await?;

    Ok(Json(entries.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/groups/{id}/fetch",
    tag = "fetch",
    params(TriggerFetchQuery),
    responses(
        (status = 200, body = Vec<FetchDispatch>)
    )
)]
pub(crate) async fn trigger_fetch(
    context: ServerContext,
    Path(group_id): Path<i32>,
    Query(query): Query<TriggerFetchQuery>,
) -> ServerResult<Json<Vec<FetchDispatch>>> {
    let dispatches = context
        .collab
        .fetch
        .request_fetch(group_id, None, query.force)
        .await?;

    Ok(Json(dispatches.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/groups/{id}/fetch",
    tag = "fetch",
    responses(
        (status = 200, body = FetchStatus)
    )
)]
pub(crate) async fn fetch_status(
    context: ServerContext,
    Path(group_id): Path<i32>,
) -> ServerResult<Json<FetchStatus>> {
    let status = context.collab.fetch.status(group_id).await?;

    Ok(Json(status.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_group))
        .route("/:id", get(group))
        .route("/:id/members", post(join_group))
        .route("/:id/leaderboard", get(leaderboard))
        .route("/:id/fetch", post(trigger_fetch))
        .route("/:id/fetch", get(fetch_status))
}
