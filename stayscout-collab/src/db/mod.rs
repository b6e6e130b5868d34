use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use stayscout_core::{ListingDetail, ListingDraft};
use thiserror::Error;

mod data;
pub use data::*;

mod pg;
pub use pg::*;

#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type SharedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound { .. } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Represents a type that can store and fetch stayscout data
#[async_trait]
pub trait Database: Send + Sync {
    async fn create_group(&self, new_group: NewGroup) -> Result<GroupData>;
    async fn group_by_id(&self, group_id: PrimaryKey) -> Result<GroupData>;
    async fn delete_group(&self, group_id: PrimaryKey) -> Result<()>;
    async fn destination_by_id(&self, destination_id: PrimaryKey) -> Result<DestinationData>;

    async fn create_member(&self, new_member: NewMember) -> Result<MemberData>;
    async fn member_by_id(&self, member_id: PrimaryKey) -> Result<MemberData>;
    async fn delete_member(&self, member_id: PrimaryKey) -> Result<()>;

    async fn filters_by_member(&self, member_id: PrimaryKey)
        -> Result<Option<MemberFiltersData>>;
    async fn filters_by_group(&self, group_id: PrimaryKey) -> Result<Vec<MemberFiltersData>>;
    async fn upsert_filters(&self, filters: NewMemberFilters) -> Result<MemberFiltersData>;

    async fn upsert_listing(&self, new_listing: NewListing) -> Result<()>;
    async fn apply_listing_detail(&self, update: ListingDetailUpdate) -> Result<()>;
    async fn listing(&self, group_id: PrimaryKey, source_id: &str) -> Result<ListingData>;
    async fn listings_by_group(&self, group_id: PrimaryKey) -> Result<Vec<ListingData>>;
    async fn listings_missing_detail(
        &self,
        group_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<String>>;
    async fn count_listings(&self, group_id: PrimaryKey) -> Result<usize>;

    async fn upsert_vote(&self, new_vote: NewVote) -> Result<VoteData>;
    async fn votes_by_group(&self, group_id: PrimaryKey) -> Result<Vec<VoteData>>;
    async fn votes_by_member(&self, member_id: PrimaryKey) -> Result<Vec<VoteData>>;

    async fn progress_by_destination(
        &self,
        destination_id: PrimaryKey,
    ) -> Result<Option<FetchProgressData>>;
    async fn progress_by_group(&self, group_id: PrimaryKey) -> Result<Vec<FetchProgressData>>;
    async fn save_progress(&self, progress: FetchProgressData) -> Result<()>;

    async fn scoring_weights(&self) -> Result<ScoringWeights>;
}

#[derive(Debug)]
pub struct NewGroup {
    pub name: String,
    pub adults: i32,
    pub children: i32,
    pub infants: i32,
    pub pets: i32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub price_min: Option<i32>,
    pub price_max: Option<i32>,
    /// Locations to create destinations for, unique per group
    pub destinations: Vec<String>,
}

#[derive(Debug)]
pub struct NewMember {
    pub group_id: PrimaryKey,
    pub nickname: String,
    pub avatar: Option<String>,
}

/// Full-row replacement for a member's filters
#[derive(Debug)]
pub struct NewMemberFilters {
    pub member_id: PrimaryKey,
    pub price_min: Option<i32>,
    pub price_max: Option<i32>,
    pub min_bedrooms: Option<i32>,
    pub min_beds: Option<i32>,
    pub min_bathrooms: Option<i32>,
    pub property_type: Option<String>,
    pub amenity_ids: Vec<i32>,
}

/// A draft headed for the store, scoped to the group whose fetch run
/// discovered it
#[derive(Debug)]
pub struct NewListing {
    pub group_id: PrimaryKey,
    pub destination_id: PrimaryKey,
    pub draft: ListingDraft,
}

/// A detail record to merge into an already stored listing
#[derive(Debug)]
pub struct ListingDetailUpdate {
    pub group_id: PrimaryKey,
    pub detail: ListingDetail,
}

#[derive(Debug)]
pub struct NewVote {
    pub member_id: PrimaryKey,
    pub group_id: PrimaryKey,
    pub source_id: String,
    pub value: VoteValue,
    pub reason: Option<String>,
}
