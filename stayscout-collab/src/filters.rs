use std::sync::Arc;

use log::warn;
use thiserror::Error;

use crate::{
    leaderboard, CollabContext, DatabaseError, FetchManager, MemberFiltersData, NewMemberFilters,
    PrimaryKey,
};

pub struct FilterManager {
    context: CollabContext,
    fetch: Arc<FetchManager>,
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Price bounds must be non-negative and in order")]
    InvalidPriceBounds,
    #[error("Minimum room counts cannot be negative")]
    NegativeRoomCount,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl FilterManager {
    pub fn new(context: &CollabContext, fetch: &Arc<FetchManager>) -> Self {
        Self {
            context: context.clone(),
            fetch: fetch.clone(),
        }
    }

    /// A member's filters. Members who never saved any read as a row of
    /// unset fields, meaning "no constraints".
    pub async fn filters_for(&self, member_id: PrimaryKey) -> Result<MemberFiltersData, DatabaseError> {
        let member = self.context.database.member_by_id(member_id).await?;

        let filters = self
            .context
            .database
            .filters_by_member(member.id)
            .await?
            .unwrap_or(MemberFiltersData {
                member_id: member.id,
                ..Default::default()
            });

        Ok(filters)
    }

    /// Replaces a member's filters as a whole row, reranks the group, and
    /// kicks a fetch run when the group is short on listings.
    pub async fn set_filters(
        &self,
        filters: NewMemberFilters,
    ) -> Result<MemberFiltersData, FilterError> {
        validate(&filters)?;

        let member = self
            .context
            .database
            .member_by_id(filters.member_id)
            .await
            .map_err(FilterError::Db)?;

        let saved = self
            .context
            .database
            .upsert_filters(filters)
            .await
            .map_err(FilterError::Db)?;

        leaderboard::refresh(&self.context, member.group_id).await;

        // The save stands on its own, a failed trigger only loses the run
        if let Err(error) = self.fetch.fetch_if_low(member.group_id, Some(&saved)).await {
            warn!("Fetch trigger after a filter save failed: {}", error);
        }

        Ok(saved)
    }
}

fn validate(filters: &NewMemberFilters) -> Result<(), FilterError> {
    if filters.price_min.map_or(false, |min| min < 0)
        || filters.price_max.map_or(false, |max| max < 0)
    {
        return Err(FilterError::InvalidPriceBounds);
    }

    if let (Some(min), Some(max)) = (filters.price_min, filters.price_max) {
        if min > max {
            return Err(FilterError::InvalidPriceBounds);
        }
    }

    let rooms = [
        filters.min_bedrooms,
        filters.min_beds,
        filters.min_bathrooms,
    ];

    if rooms.iter().flatten().any(|minimum| *minimum < 0) {
        return Err(FilterError::NegativeRoomCount);
    }

    Ok(())
}
