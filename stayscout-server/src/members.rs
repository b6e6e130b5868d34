use axum::{
    extract::{Path, Query},
    routing::{delete, get, post, put},
    Json,
};
use stayscout_collab::{NewMemberFilters, VoteSubmission};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{FiltersSchema, NextQuery, ValidatedJson, VoteSchema},
    serialized::{MemberFilters, Recommendation, ToSerialized, VoteResult},
    Router,
};

#[utoipa::path(
    delete,
    path = "/v1/members/{id}",
    tag = "members",
    responses(
        (status = 200, description = "Member left. A group loses itself along with its last member.")
    )
)]
pub(crate) async fn leave_group(
    context: ServerContext,
    Path(member_id): Path<i32>,
) -> ServerResult<()> {
    context.collab.groups.leave(member_id).await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/members/{id}/votes",
    tag = "members",
    request_body = VoteSchema,
    responses(
        (status = 200, body = VoteResult)
    )
)]
pub(crate) async fn submit_vote(
    context: ServerContext,
    Path(member_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<VoteResult>> {
    let vote = context
        .collab
        .votes
        .submit(VoteSubmission {
            member_id,
            source_id: body.source_id,
            value: body.value,
            reason: body.reason,
        })
        .await?;

    let next = context.collab.votes.next_to_vote(member_id, &[], 1).await?;

    Ok(Json(VoteResult {
        vote: vote.to_serialized(),
        next: next.to_serialized(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/members/{id}/next",
    tag = "members",
    params(NextQuery),
    responses(
        (status = 200, body = Recommendation)
    )
)]
pub(crate) async fn next_to_vote(
    context: ServerContext,
    Path(member_id): Path<i32>,
    Query(query): Query<NextQuery>,
) -> ServerResult<Json<Recommendation>> {
    let exclude_ids: Vec<String> = query
        .exclude
        .map(|raw| {
            raw.split(',')
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let count = query.count.unwrap_or(1);

    let recommendation = context
        .collab
        .votes
        .next_to_vote(member_id, &exclude_ids, count)
        .await?;

    Ok(Json(recommendation.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/members/{id}/filters",
    tag = "members",
    responses(
        (status = 200, body = MemberFilters)
    )
)]
pub(crate) async fn filters(
    context: ServerContext,
    Path(member_id): Path<i32>,
) -> ServerResult<Json<MemberFilters>> {
    let filters = context.collab.filters.filters_for(member_id).await?;

    Ok(Json(filters.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/members/{id}/filters",
    tag = "members",
    request_body = FiltersSchema,
    responses(
        (status = 200, body = MemberFilters)
    )
)]
pub(crate) async fn set_filters(
    context: ServerContext,
    Path(member_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<FiltersSchema>,
) -> ServerResult<Json<MemberFilters>> {
    let saved = context
        .collab
        .filters
        .set_filters(NewMemberFilters {
            member_id,
            price_min: body.price_min,
            price_max: body.price_max,
            min_bedrooms: body.min_bedrooms,
            min_beds: body.min_beds,
            min_bathrooms: body.min_bathrooms,
            property_type: body.property_type,
            amenity_ids: body.amenity_ids,
        })
        .await?;

    Ok(Json(saved.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/:id", delete(leave_group))
        .route("/:id/votes", post(submit_vote))
        .route("/:id/next", get(next_to_vote))
        .route("/:id/filters", get(filters))
        .route("/:id/filters", put(set_filters))
}
