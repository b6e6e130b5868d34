use log::error;
use std::collections::HashMap;

use crate::{
    scoring, CollabContext, CollabEvent, DatabaseError, ListingData, MemberFiltersData,
    PrimaryKey, ScoringWeights, VoteData,
};

/// One ranked listing with the signals that produced its rank
#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub listing: ListingData,
    pub score: i64,
    pub match_count: i64,
    /// The votes cast on this listing, attributed to their members
    pub votes: Vec<VoteData>,
}

/// Ranks a group's listings: score descending, ties broken by ascending
/// source id so equal scores never jitter between pushes.
pub fn rank(
    listings: Vec<ListingData>,
    filters: &[MemberFiltersData],
    votes: Vec<VoteData>,
    weights: &ScoringWeights,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let mut votes_by_listing: HashMap<String, Vec<VoteData>> = HashMap::new();

    for vote in votes {
        votes_by_listing
            .entry(vote.source_id.clone())
            .or_default()
            .push(vote);
    }

    let mut entries: Vec<_> = listings
        .into_iter()
        .map(|listing| {
            let votes = votes_by_listing
                .remove(&listing.source_id)
                .unwrap_or_default();

            let score = scoring::score(&listing, filters, &votes, weights);
            let match_count = scoring::match_count(&listing, filters);

            LeaderboardEntry {
                listing,
                score,
                match_count,
                votes,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.listing.source_id.cmp(&b.listing.source_id))
    });

    entries.truncate(limit);
    entries
}

/// Computes the current ranked snapshot for a group
pub async fn snapshot(
    context: &CollabContext,
    group_id: PrimaryKey,
) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
    let listings = context.database.listings_by_group(group_id).await?;
    let filters = context.database.filters_by_group(group_id).await?;
    let votes = context.database.votes_by_group(group_id).await?;
    let weights = context.database.scoring_weights().await?;

    Ok(rank(
        listings,
        &filters,
        votes,
        &weights,
        context.config.leaderboard_limit,
    ))
}

/// Recomputes the ranking and pushes the full list to subscribers. Runs
/// after every vote write, filter write, and completed fetch run.
pub async fn refresh(context: &CollabContext, group_id: PrimaryKey) {
    match snapshot(context, group_id).await {
        Ok(entries) => context.emit(CollabEvent::LeaderboardUpdated { group_id, entries }),
        Err(error) => error!(
            "Failed to refresh leaderboard for group {}: {}",
            group_id, error
        ),
    }
}
