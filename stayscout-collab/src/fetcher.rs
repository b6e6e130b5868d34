use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use stayscout_core::{
    DestinationId, EventSender, FetchOrchestrator, FetchPlan, FetchProgress, IdentityStatus,
    ListingDetail, ListingDraft, ListingSink, PageToken, ProgressStore, SearchQuery, StoreError,
    Transport, TransportError,
};
use thiserror::Error;

use crate::{
    source::AirbnbSource, CollabContext, DatabaseError, DestinationData, FetchProgressData,
    GroupData, ListingDetailUpdate, MemberFiltersData, NewListing, PrimaryKey, SharedDatabase,
};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// What dispatching a group's fetch did for one destination
#[derive(Debug, Clone)]
pub struct DestinationDispatch {
    pub destination_id: PrimaryKey,
    pub name: String,
    /// False when a run was already in flight
    pub started: bool,
}

/// Saved progress joined with the live in-flight state
#[derive(Debug, Clone)]
pub struct DestinationFetchStatus {
    pub destination_id: PrimaryKey,
    pub name: String,
    pub pages_fetched: i32,
    pub pages_total: i32,
    pub completed: bool,
    pub running: bool,
}

/// A group's fetch state as a whole
#[derive(Debug, Clone)]
pub struct GroupFetchStatus {
    /// How many listings the group has accumulated so far
    pub total_listings: usize,
    pub destinations: Vec<DestinationFetchStatus>,
}

/// Owns the transport pool and the orchestrator, and turns groups into
/// destination runs.
pub struct FetchManager {
    context: CollabContext,
    transport: Arc<Transport>,
    orchestrator: Arc<FetchOrchestrator<AirbnbSource>>,
}

impl FetchManager {
    pub fn new(context: &CollabContext, events: EventSender) -> Result<Self, FetchError> {
        let transport = Arc::new(Transport::new(&context.config, events.clone())?);
        let source = Arc::new(AirbnbSource::new(transport.clone()));

        let progress = Arc::new(DbProgressStore::new(&context.database));
        let sink = Arc::new(DbListingSink::new(&context.database));

        let orchestrator = FetchOrchestrator::new(&context.config, source, progress, sink, events);

        Ok(Self {
            context: context.clone(),
            transport,
            orchestrator,
        })
    }

    /// Dispatches a run for every destination of the group, carrying the
    /// triggering member's filters as search hints when there are any.
    pub async fn request_fetch(
        &self,
        group_id: PrimaryKey,
        hints: Option<&MemberFiltersData>,
        force: bool,
    ) -> Result<Vec<DestinationDispatch>, FetchError> {
        let group = self.context.database.group_by_id(group_id).await?;

        let dispatches = group
            .destinations
            .iter()
            .map(|destination| {
                let plan = FetchPlan {
                    destination_id: destination.id,
                    query: build_query(&group, destination, hints),
                };

                DestinationDispatch {
                    destination_id: destination.id,
                    name: destination.name.clone(),
                    started: self.orchestrator.dispatch(plan, force),
                }
            })
            .collect();

        Ok(dispatches)
    }

    /// Kicks a run when the group's stock of listings has fallen below the
    /// configured threshold. Returns whether anything was started.
    pub async fn fetch_if_low(
        &self,
        group_id: PrimaryKey,
        hints: Option<&MemberFiltersData>,
    ) -> Result<bool, FetchError> {
        let count = self.context.database.count_listings(group_id).await?;

        if count >= self.context.config.fetch_trigger_threshold {
            return Ok(false);
        }

        let dispatches = self.request_fetch(group_id, hints, false).await?;

        Ok(dispatches.iter().any(|dispatch| dispatch.started))
    }

    pub async fn status(&self, group_id: PrimaryKey) -> Result<GroupFetchStatus, FetchError> {
        let group = self.context.database.group_by_id(group_id).await?;
        let total_listings = self.context.database.count_listings(group_id).await?;

        let mut destinations = Vec::new();

        for destination in &group.destinations {
            let progress = self
                .context
                .database
                .progress_by_destination(destination.id)
                .await?;

            destinations.push(DestinationFetchStatus {
                destination_id: destination.id,
                name: destination.name.clone(),
                pages_fetched: progress.as_ref().map(|p| p.pages_fetched).unwrap_or(0),
                pages_total: progress
                    .as_ref()
                    .map(|p| p.pages_total)
                    .unwrap_or(self.context.config.pages_per_destination as i32),
                completed: progress.as_ref().map(|p| p.is_completed()).unwrap_or(false),
                running: self.orchestrator.is_running(destination.id),
            });
        }

        Ok(GroupFetchStatus {
            total_listings,
            destinations,
        })
    }

    /// Per-identity state of the transport pool
    pub fn transport_status(&self) -> Vec<IdentityStatus> {
        self.transport.status()
    }
}

fn build_query(
    group: &GroupData,
    destination: &DestinationData,
    hints: Option<&MemberFiltersData>,
) -> SearchQuery {
    let mut query = SearchQuery {
        location: destination.name.clone(),
        check_in: group.check_in,
        check_out: group.check_out,
        adults: group.adults as u32,
        children: group.children as u32,
        infants: group.infants as u32,
        pets: group.pets as u32,
        price_min: group.price_min.map(|min| min as u32),
        price_max: group.price_max.map(|max| max as u32),
        min_bedrooms: None,
        min_beds: None,
        min_bathrooms: None,
        amenity_ids: Vec::new(),
    };

    if let Some(filters) = hints {
        query.min_bedrooms = filters.min_bedrooms.map(|n| n as u32);
        query.min_beds = filters.min_beds.map(|n| n as u32);
        query.min_bathrooms = filters.min_bathrooms.map(|n| n as u32);
        query.amenity_ids = filters.amenity_ids.iter().map(|id| *id as u32).collect();
    }

    query
}

fn store_err(error: DatabaseError) -> StoreError {
    StoreError(error.to_string())
}

/// Run progress persisted through the database
pub struct DbProgressStore {
    database: SharedDatabase,
}

impl DbProgressStore {
    pub fn new(database: &SharedDatabase) -> Self {
        Self {
            database: database.clone(),
        }
    }
}

#[async_trait]
impl ProgressStore for DbProgressStore {
    async fn load(
        &self,
        destination_id: DestinationId,
    ) -> Result<Option<FetchProgress>, StoreError> {
        let saved = self
            .database
            .progress_by_destination(destination_id)
            .await
            .map_err(store_err)?;

        Ok(saved.map(|data| FetchProgress {
            destination_id: data.destination_id,
            pages_fetched: data.pages_fetched as usize,
            pages_total: data.pages_total as usize,
            next_page: data.next_page.clone().map(PageToken),
            completed: data.is_completed(),
        }))
    }

    async fn save(&self, progress: &FetchProgress) -> Result<(), StoreError> {
        let destination = self
            .database
            .destination_by_id(progress.destination_id)
            .await
            .map_err(store_err)?;

        let data = FetchProgressData {
            destination_id: progress.destination_id,
            group_id: destination.group_id,
            pages_fetched: progress.pages_fetched as i32,
            pages_total: progress.pages_total as i32,
            next_page: progress.next_page.as_ref().map(|token| token.0.clone()),
            completed_at: progress.completed.then(Utc::now),
        };

        self.database.save_progress(data).await.map_err(store_err)
    }
}

/// Stores fetched pages and detail records under the destination's group
pub struct DbListingSink {
    database: SharedDatabase,
}

impl DbListingSink {
    pub fn new(database: &SharedDatabase) -> Self {
        Self {
            database: database.clone(),
        }
    }
}

#[async_trait]
impl ListingSink for DbListingSink {
    async fn accept_page(
        &self,
        destination_id: DestinationId,
        drafts: Vec<ListingDraft>,
    ) -> Result<usize, StoreError> {
        let destination = self
            .database
            .destination_by_id(destination_id)
            .await
            .map_err(store_err)?;

        let stored = drafts.len();

        for draft in drafts {
            self.database
                .upsert_listing(NewListing {
                    group_id: destination.group_id,
                    destination_id,
                    draft,
                })
                .await
                .map_err(store_err)?;
        }

        Ok(stored)
    }

    async fn pending_details(
        &self,
        destination_id: DestinationId,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let destination = self
            .database
            .destination_by_id(destination_id)
            .await
            .map_err(store_err)?;

        self.database
            .listings_missing_detail(destination.group_id, limit)
            .await
            .map_err(store_err)
    }

    async fn accept_detail(
        &self,
        destination_id: DestinationId,
        detail: ListingDetail,
    ) -> Result<(), StoreError> {
        let destination = self
            .database
            .destination_by_id(destination_id)
            .await
            .map_err(store_err)?;

        self.database
            .apply_listing_detail(ListingDetailUpdate {
                group_id: destination.group_id,
                detail,
            })
            .await
            .map_err(store_err)
    }
}
