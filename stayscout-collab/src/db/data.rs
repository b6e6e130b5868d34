use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A trip-planning group
#[derive(Debug, Clone)]
pub struct GroupData {
    pub id: PrimaryKey,
    pub name: String,
    /// Party composition, used verbatim in upstream searches
    pub adults: i32,
    pub children: i32,
    pub infants: i32,
    pub pets: i32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    /// Optional nightly price bounds applied to upstream searches
    pub price_min: Option<i32>,
    pub price_max: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub destinations: Vec<DestinationData>,
    pub members: Vec<MemberData>,
}

/// A location the group considers staying at
#[derive(Debug, Clone, FromRow)]
pub struct DestinationData {
    pub id: PrimaryKey,
    pub group_id: PrimaryKey,
    pub name: String,
}

/// A person in a group
#[derive(Debug, Clone, FromRow)]
pub struct MemberData {
    pub id: PrimaryKey,
    pub group_id: PrimaryKey,
    pub nickname: String,
    pub avatar: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// A member's stay preferences. An unset field means "no constraint".
#[derive(Debug, Clone, Default, FromRow)]
pub struct MemberFiltersData {
    pub member_id: PrimaryKey,
    pub price_min: Option<i32>,
    pub price_max: Option<i32>,
    pub min_bedrooms: Option<i32>,
    pub min_beds: Option<i32>,
    pub min_bathrooms: Option<i32>,
    pub property_type: Option<String>,
    /// Required amenities, fetched separately from the 1:1 filter row
    #[sqlx(default)]
    pub amenity_ids: Vec<i32>,
}

/// A stay listing discovered for a group. Identity is (group_id, source_id),
/// so the same upstream listing is a separate row per group.
#[derive(Debug, Clone)]
pub struct ListingData {
    pub group_id: PrimaryKey,
    /// The upstream id of the listing
    pub source_id: String,
    /// The destination whose fetch run first discovered this listing
    pub destination_id: PrimaryKey,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_per_night: Option<f64>,
    pub price_total: Option<f64>,
    pub currency: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub bedrooms: Option<i32>,
    pub beds: Option<i32>,
    pub bathrooms: Option<f64>,
    pub property_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub images: Vec<String>,
    pub amenities: Vec<ListingAmenityData>,
}

/// An amenity reported on a listing's detail page
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ListingAmenityData {
    pub name: String,
    pub available: bool,
}

/// A member's vote on a listing
#[derive(Debug, Clone, FromRow)]
pub struct VoteData {
    pub member_id: PrimaryKey,
    pub group_id: PrimaryKey,
    pub source_id: String,
    value: i16,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VoteData {
    pub fn new(
        member_id: PrimaryKey,
        group_id: PrimaryKey,
        source_id: String,
        value: VoteValue,
        reason: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            member_id,
            group_id,
            source_id,
            value: value.as_i16(),
            reason,
            created_at,
            updated_at,
        }
    }

    /// The decoded vote value. Rows are checked on write, so this only
    /// returns None if the table was tampered with out-of-band.
    pub fn value(&self) -> Option<VoteValue> {
        VoteValue::from_i16(self.value)
    }

    /// The wire value as stored, for surfaces that send it back out
    pub fn raw_value(&self) -> i16 {
        self.value
    }
}

/// The closed set of vote values, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteValue {
    Veto,
    Ok,
    Love,
    SuperLove,
}

impl VoteValue {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Veto),
            1 => Some(Self::Ok),
            2 => Some(Self::Love),
            3 => Some(Self::SuperLove),
            _ => None,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            Self::Veto => 0,
            Self::Ok => 1,
            Self::Love => 2,
            Self::SuperLove => 3,
        }
    }
}

/// The resumable state of one destination's fetch run
#[derive(Debug, Clone, FromRow)]
pub struct FetchProgressData {
    pub destination_id: PrimaryKey,
    pub group_id: PrimaryKey,
    pub pages_fetched: i32,
    pub pages_total: i32,
    /// Upstream pagination cursor for the next page
    pub next_page: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FetchProgressData {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// The weight table driving the scoring engine, loaded from the
/// scoring_config table per invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringWeights {
    pub filter_match: i64,
    pub vote_veto: i64,
    pub vote_ok: i64,
    pub vote_love: i64,
    pub vote_super_love: i64,
}

impl ScoringWeights {
    pub fn vote_weight(&self, value: VoteValue) -> i64 {
        match value {
            VoteValue::Veto => self.vote_veto,
            VoteValue::Ok => self.vote_ok,
            VoteValue::Love => self.vote_love,
            VoteValue::SuperLove => self.vote_super_love,
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            filter_match: 10,
            vote_veto: -500,
            vote_ok: 10,
            vote_love: 40,
            vote_super_love: 60,
        }
    }
}
