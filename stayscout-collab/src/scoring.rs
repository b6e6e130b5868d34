use crate::{ListingData, MemberFiltersData, ScoringWeights, VoteData};

/// Whether a listing satisfies every constraint a member has set.
/// Unset constraints always pass, and so do unknown listing attributes,
/// since absence of data is not a mismatch.
pub fn filter_matches(listing: &ListingData, filters: &MemberFiltersData) -> bool {
    within_bounds(listing.price_per_night, filters.price_min, filters.price_max)
        && meets_minimum(listing.bedrooms, filters.min_bedrooms)
        && meets_minimum(listing.beds, filters.min_beds)
        && enough_bathrooms(listing.bathrooms, filters.min_bathrooms)
        && property_type_matches(&listing.property_type, &filters.property_type)
}

/// How many of the given filter rows the listing satisfies
pub fn match_count(listing: &ListingData, filters: &[MemberFiltersData]) -> i64 {
    filters
        .iter()
        .filter(|f| filter_matches(listing, f))
        .count() as i64
}

/// Scores a listing from the group's filter rows and the votes cast on it.
/// A pure fold: match count times the match weight, plus the weight of every
/// vote. Veto dominance comes entirely from the configured veto weight.
pub fn score(
    listing: &ListingData,
    filters: &[MemberFiltersData],
    votes: &[VoteData],
    weights: &ScoringWeights,
) -> i64 {
    let vote_total: i64 = votes
        .iter()
        .filter_map(|v| v.value())
        .map(|value| weights.vote_weight(value))
        .sum();

    match_count(listing, filters) * weights.filter_match + vote_total
}

fn within_bounds(value: Option<f64>, min: Option<i32>, max: Option<i32>) -> bool {
    match value {
        Some(value) => {
            min.map_or(true, |m| value >= m as f64) && max.map_or(true, |m| value <= m as f64)
        }
        None => true,
    }
}

fn meets_minimum(value: Option<i32>, minimum: Option<i32>) -> bool {
    match (value, minimum) {
        (Some(value), Some(minimum)) => value >= minimum,
        _ => true,
    }
}

fn enough_bathrooms(value: Option<f64>, minimum: Option<i32>) -> bool {
    match (value, minimum) {
        (Some(value), Some(minimum)) => value >= minimum as f64,
        _ => true,
    }
}

fn property_type_matches(value: &Option<String>, wanted: &Option<String>) -> bool {
    match (value, wanted) {
        (Some(value), Some(wanted)) => value.eq_ignore_ascii_case(wanted),
        _ => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::VoteValue;
    use chrono::Utc;

    fn listing() -> ListingData {
        ListingData {
            group_id: 1,
            source_id: "111".to_string(),
            destination_id: 2,
            url: "https://stays.example/rooms/111".to_string(),
            title: Some("Sunny flat".to_string()),
            description: None,
            price_per_night: Some(120.0),
            price_total: Some(840.0),
            currency: Some("EUR".to_string()),
            rating: Some(4.8),
            review_count: Some(31),
            bedrooms: Some(3),
            beds: Some(4),
            bathrooms: Some(1.5),
            property_type: Some("Entire home".to_string()),
            latitude: None,
            longitude: None,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            images: vec![],
            amenities: vec![],
        }
    }

    fn vote(member_id: i32, value: VoteValue) -> VoteData {
        VoteData::new(
            member_id,
            1,
            "111".to_string(),
            value,
            None,
            Utc::now(),
            Utc::now(),
        )
    }

    #[test]
    fn score_combines_matches_and_votes() {
        let filters = vec![
            // Matches: price within bounds
            MemberFiltersData {
                member_id: 1,
                price_max: Some(150),
                ..Default::default()
            },
            // Matches: no constraints at all
            MemberFiltersData {
                member_id: 2,
                ..Default::default()
            },
            // Doesn't match: wants more bedrooms
            MemberFiltersData {
                member_id: 3,
                min_bedrooms: Some(4),
                ..Default::default()
            },
        ];

        let votes = vec![vote(1, VoteValue::Ok), vote(2, VoteValue::Love)];
        let weights = ScoringWeights::default();

        // 2 matches * 10 + 10 + 40
        assert_eq!(score(&listing(), &filters, &votes, &weights), 70);
        // Deterministic for fixed inputs
        assert_eq!(score(&listing(), &filters, &votes, &weights), 70);
    }

    #[test]
    fn unknown_attributes_pass_set_constraints() {
        let bare = ListingData {
            bedrooms: None,
            price_per_night: None,
            property_type: None,
            ..listing()
        };

        let picky = MemberFiltersData {
            member_id: 1,
            price_min: Some(50),
            price_max: Some(100),
            min_bedrooms: Some(2),
            property_type: Some("Entire home".to_string()),
            ..Default::default()
        };

        assert!(filter_matches(&bare, &picky));
    }

    #[test]
    fn set_constraints_reject_out_of_range_listings() {
        let filters = MemberFiltersData {
            member_id: 1,
            price_max: Some(100),
            ..Default::default()
        };

        assert!(!filter_matches(&listing(), &filters));

        let cheaper = ListingData {
            price_per_night: Some(95.0),
            ..listing()
        };

        assert!(filter_matches(&cheaper, &filters));
    }

    #[test]
    fn one_veto_outweighs_every_positive_vote() {
        let votes = vec![
            vote(1, VoteValue::SuperLove),
            vote(2, VoteValue::SuperLove),
            vote(3, VoteValue::SuperLove),
            vote(4, VoteValue::Veto),
        ];

        let weights = ScoringWeights::default();

        // 3 * 60 - 500, negative with no veto-specific branch
        assert_eq!(score(&listing(), &[], &votes, &weights), -320);
    }

    #[test]
    fn no_votes_and_no_matches_scores_zero() {
        let nobody = vec![MemberFiltersData {
            member_id: 1,
            min_bedrooms: Some(12),
            ..Default::default()
        }];

        assert_eq!(
            score(&listing(), &nobody, &[], &ScoringWeights::default()),
            0
        );
    }
}
