//! All schemas that are exposed from endpoints are defined here
//! along with the conversion impls

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use stayscout_collab::{
    DestinationData, DestinationDispatch, DestinationFetchStatus, GroupData, GroupFetchStatus,
    LeaderboardEntry as CollabLeaderboardEntry, ListingAmenityData, ListingData, MemberData,
    MemberFiltersData, Recommendation as CollabRecommendation, VoteData,
};
use stayscout_core::IdentityStatus;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    id: i32,
    name: String,
    adults: i32,
    children: i32,
    infants: i32,
    pets: i32,
    check_in: NaiveDate,
    check_out: NaiveDate,
    price_min: Option<i32>,
    price_max: Option<i32>,
    created_at: DateTime<Utc>,
    destinations: Vec<Destination>,
    members: Vec<Member>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    id: i32,
    name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    id: i32,
    group_id: i32,
    nickname: String,
    avatar: Option<String>,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberFilters {
    price_min: Option<i32>,
    price_max: Option<i32>,
    min_bedrooms: Option<i32>,
    min_beds: Option<i32>,
    min_bathrooms: Option<i32>,
    property_type: Option<String>,
    amenity_ids: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    source_id: String,
    destination_id: i32,
    url: String,
    title: Option<String>,
    description: Option<String>,
    price_per_night: Option<f64>,
    price_total: Option<f64>,
    currency: Option<String>,
    rating: Option<f64>,
    review_count: Option<i32>,
    bedrooms: Option<i32>,
    beds: Option<i32>,
    bathrooms: Option<f64>,
    property_type: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    first_seen_at: DateTime<Utc>,
    images: Vec<String>,
    amenities: Vec<Amenity>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Amenity {
    name: String,
    available: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    member_id: i32,
    source_id: String,
    /// 0 is veto, 1 is ok, 2 is love, 3 is super love
    value: i16,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A stored vote together with what the member should look at next,
/// so casting a vote is a single round trip
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    pub vote: Vote,
    pub next: Recommendation,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    listings: Vec<Listing>,
    has_listing: bool,
    /// Every listing the group has, voted or not
    total_listings: usize,
    /// Listings the member hasn't voted on, ignoring exclusions
    total_remaining: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    listing: Listing,
    score: i64,
    match_count: i64,
    votes: Vec<Vote>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatus {
    total_listings: usize,
    destinations: Vec<DestinationStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DestinationStatus {
    destination_id: i32,
    name: String,
    pages_fetched: i32,
    pages_total: i32,
    completed: bool,
    running: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchDispatch {
    destination_id: i32,
    name: String,
    /// False when a run was already in flight
    started: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportIdentity {
    label: String,
    usable: bool,
    failures: u32,
    cooldown_remaining_secs: u64,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Group> for GroupData {
    fn to_serialized(&self) -> Group {
        Group {
            id: self.id,
            name: self.name.clone(),
            adults: self.adults,
            children: self.children,
            infants: self.infants,
            pets: self.pets,
            check_in: self.check_in,
            check_out: self.check_out,
            price_min: self.price_min,
            price_max: self.price_max,
            created_at: self.created_at,
            destinations: self.destinations.to_serialized(),
            members: self.members.to_serialized(),
        }
    }
}

impl ToSerialized<Destination> for DestinationData {
    fn to_serialized(&self) -> Destination {
        Destination {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

impl ToSerialized<Member> for MemberData {
    fn to_serialized(&self) -> Member {
        Member {
            id: self.id,
            group_id: self.group_id,
            nickname: self.nickname.clone(),
            avatar: self.avatar.clone(),
            joined_at: self.joined_at,
        }
    }
}

impl ToSerialized<MemberFilters> for MemberFiltersData {
    fn to_serialized(&self) -> MemberFilters {
        MemberFilters {
            price_min: self.price_min,
            price_max: self.price_max,
            min_bedrooms: self.min_bedrooms,
            min_beds: self.min_beds,
            min_bathrooms: self.min_bathrooms,
            property_type: self.property_type.clone(),
            amenity_ids: self.amenity_ids.clone(),
        }
    }
}

impl ToSerialized<Listing> for ListingData {
    fn to_serialized(&self) -> Listing {
        Listing {
            source_id: self.source_id.clone(),
            destination_id: self.destination_id,
            url: self.url.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            price_per_night: self.price_per_night,
            price_total: self.price_total,
            currency: self.currency.clone(),
            rating: self.rating,
            review_count: self.review_count,
            bedrooms: self.bedrooms,
            beds: self.beds,
            bathrooms: self.bathrooms,
            property_type: self.property_type.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            first_seen_at: self.first_seen_at,
            images: self.images.clone(),
            amenities: self.amenities.to_serialized(),
        }
    }
}

impl ToSerialized<Amenity> for ListingAmenityData {
    fn to_serialized(&self) -> Amenity {
        Amenity {
            name: self.name.clone(),
            available: self.available,
        }
    }
}

impl ToSerialized<Vote> for VoteData {
    fn to_serialized(&self) -> Vote {
        Vote {
            member_id: self.member_id,
            source_id: self.source_id.clone(),
            value: self.raw_value(),
            reason: self.reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ToSerialized<Recommendation> for CollabRecommendation {
    fn to_serialized(&self) -> Recommendation {
        Recommendation {
            listings: self.listings.to_serialized(),
            has_listing: self.has_listing(),
            total_listings: self.total_listings,
            total_remaining: self.total_remaining,
        }
    }
}

impl ToSerialized<LeaderboardEntry> for CollabLeaderboardEntry {
    fn to_serialized(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            listing: self.listing.to_serialized(),
            score: self.score,
            match_count: self.match_count,
            votes: self.votes.to_serialized(),
        }
    }
}

impl ToSerialized<FetchStatus> for GroupFetchStatus {
    fn to_serialized(&self) -> FetchStatus {
        FetchStatus {
            total_listings: self.total_listings,
            destinations: self.destinations.to_serialized(),
        }
    }
}

impl ToSerialized<DestinationStatus> for DestinationFetchStatus {
    fn to_serialized(&self) -> DestinationStatus {
        DestinationStatus {
            destination_id: self.destination_id,
            name: self.name.clone(),
            pages_fetched: self.pages_fetched,
            pages_total: self.pages_total,
            completed: self.completed,
            running: self.running,
        }
    }
}

impl ToSerialized<FetchDispatch> for DestinationDispatch {
    fn to_serialized(&self) -> FetchDispatch {
        FetchDispatch {
            destination_id: self.destination_id,
            name: self.name.clone(),
            started: self.started,
        }
    }
}

impl ToSerialized<TransportIdentity> for IdentityStatus {
    fn to_serialized(&self) -> TransportIdentity {
        TransportIdentity {
            label: self.label.clone(),
            usable: self.usable,
            failures: self.failures,
            cooldown_remaining_secs: self.cooldown_remaining.as_secs(),
        }
    }
}
