use std::collections::HashSet;

use crate::{ListingData, VoteData};

/// What a member should look at next, along with the signals the client
/// needs to tell "still searching" apart from "all caught up"
#[derive(Debug)]
pub struct Recommendation {
    /// Up to the requested amount of unvoted listings, in discovery order
    pub listings: Vec<ListingData>,
    /// Every listing the group has, voted or not
    pub total_listings: usize,
    /// Listings the member hasn't voted on, ignoring exclusions
    pub total_remaining: usize,
}

impl Recommendation {
    pub fn has_listing(&self) -> bool {
        !self.listings.is_empty()
    }
}

/// Picks the next listings for a member to vote on. Stateless: exclusions
/// are per-call and never persisted, so the same state always yields the
/// same head. Discovery order is (first_seen_at, source_id).
pub fn next_unvoted(
    mut listings: Vec<ListingData>,
    votes: &[VoteData],
    exclude_ids: &[String],
    count: usize,
) -> Recommendation {
    listings.sort_by(|a, b| {
        (a.first_seen_at, &a.source_id).cmp(&(b.first_seen_at, &b.source_id))
    });

    let voted: HashSet<&str> = votes.iter().map(|v| v.source_id.as_str()).collect();
    let total_listings = listings.len();

    let unvoted: Vec<_> = listings
        .into_iter()
        .filter(|l| !voted.contains(l.source_id.as_str()))
        .collect();

    let total_remaining = unvoted.len();

    let listings = unvoted
        .into_iter()
        .filter(|l| !exclude_ids.contains(&l.source_id))
        .take(count)
        .collect();

    Recommendation {
        listings,
        total_listings,
        total_remaining,
    }
}
