use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::{
    Config, EventSender, FetchEvent, ListingDetail, ListingDraft, ListingSource, PageToken,
    SearchQuery, SourceError,
};

/// The id of the destination a run fetches listings for
pub type DestinationId = i32;

/// A failure reported by the persistence side of a run
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Why a run stopped before completing
#[derive(Debug, Error)]
enum StallReason {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a run keeps its resumable progress between pages and restarts
#[async_trait]
pub trait ProgressStore: Send + Sync + 'static {
    async fn load(&self, destination_id: DestinationId)
        -> Result<Option<FetchProgress>, StoreError>;

    async fn save(&self, progress: &FetchProgress) -> Result<(), StoreError>;
}

/// Where a run hands off what it fetched
#[async_trait]
pub trait ListingSink: Send + Sync + 'static {
    /// Persists one page of drafts, returning how many were stored
    async fn accept_page(
        &self,
        destination_id: DestinationId,
        drafts: Vec<ListingDraft>,
    ) -> Result<usize, StoreError>;

    /// Source ids of stored listings that still lack detail data
    async fn pending_details(
        &self,
        destination_id: DestinationId,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Applies a fetched detail record to its stored listing
    async fn accept_detail(
        &self,
        destination_id: DestinationId,
        detail: ListingDetail,
    ) -> Result<(), StoreError>;
}

/// The resumable state of one destination's run
#[derive(Debug, Clone, PartialEq)]
pub struct FetchProgress {
    pub destination_id: DestinationId,
    pub pages_fetched: usize,
    pub pages_total: usize,
    /// Cursor for the next page, carried across restarts
    pub next_page: Option<PageToken>,
    pub completed: bool,
}

impl FetchProgress {
    fn fresh(destination_id: DestinationId, pages_total: usize) -> Self {
        Self {
            destination_id,
            pages_fetched: 0,
            pages_total,
            next_page: None,
            completed: false,
        }
    }
}

/// Everything a single destination run needs to know
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub destination_id: DestinationId,
    pub query: SearchQuery,
}

/// Drives paginated search runs per destination: budgeted, resumable,
/// and never more than one in flight per destination.
pub struct FetchOrchestrator<S> {
    config: Config,
    source: Arc<S>,
    progress: Arc<dyn ProgressStore>,
    sink: Arc<dyn ListingSink>,
    events: EventSender,
    /// Destinations with a run currently in flight
    running: DashMap<DestinationId, ()>,
}

/// Clears the in-flight marker when a run ends, however it ends
struct RunGuard<S> {
    orchestrator: Arc<FetchOrchestrator<S>>,
    destination_id: DestinationId,
}

impl<S> Drop for RunGuard<S> {
    fn drop(&mut self) {
        self.orchestrator.running.remove(&self.destination_id);
    }
}

impl<S> FetchOrchestrator<S>
where
    S: ListingSource,
{
    pub fn new(
        config: &Config,
        source: Arc<S>,
        progress: Arc<dyn ProgressStore>,
        sink: Arc<dyn ListingSink>,
        events: EventSender,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: config.clone(),
            source,
            progress,
            sink,
            events,
            running: Default::default(),
        })
    }

    /// Spawns a run for the plan's destination unless one is already in
    /// flight. Returns whether a run was started. With `force`, completed
    /// progress is discarded and the destination starts over.
    pub fn dispatch(self: &Arc<Self>, plan: FetchPlan, force: bool) -> bool {
        let destination_id = plan.destination_id;

        match self.running.entry(destination_id) {
            Entry::Occupied(_) => {
                debug!("Destination {} already has a run in flight", destination_id);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(());

                let this = self.clone();

                tokio::spawn(async move {
                    let _guard = RunGuard {
                        orchestrator: this.clone(),
                        destination_id,
                    };

                    this.run(plan, force).await;
                });

                true
            }
        }
    }

    pub fn is_running(&self, destination_id: DestinationId) -> bool {
        self.running.contains_key(&destination_id)
    }

    async fn run(&self, plan: FetchPlan, force: bool) {
        let destination_id = plan.destination_id;

        info!(
            "Fetching {:?} for destination {} via {}",
            plan.query.location,
            destination_id,
            self.source.name()
        );

        match self.page_loop(&plan, force).await {
            Ok(Some(progress)) => {
                if let Err(error) = self.enrich(destination_id).await {
                    warn!(
                        "Detail enrichment for destination {} stopped early: {}",
                        destination_id, error
                    );
                }

                let _ = self.events.send(FetchEvent::DestinationCompleted {
                    destination_id,
                    pages_fetched: progress.pages_fetched,
                });

                info!(
                    "Destination {} completed after {} of {} pages",
                    destination_id, progress.pages_fetched, progress.pages_total
                );
            }
            Ok(None) => {
                debug!("Destination {} is already fully fetched", destination_id);
            }
            Err(error) => {
                warn!(
                    "Run for destination {} stalled, will resume on the next trigger: {}",
                    destination_id, error
                );

                let _ = self.events.send(FetchEvent::DestinationStalled {
                    destination_id,
                    error: error.to_string(),
                });
            }
        }
    }

    /// Fetches pages until the budget or upstream is exhausted, persisting
    /// progress after every page so an interrupted run resumes where it was.
    /// Returns None when there was nothing left to do.
    async fn page_loop(
        &self,
        plan: &FetchPlan,
        force: bool,
    ) -> Result<Option<FetchProgress>, StallReason> {
        let destination_id = plan.destination_id;

        let mut progress = match self.progress.load(destination_id).await? {
            Some(existing) if !force => existing,
            _ => FetchProgress::fresh(destination_id, self.config.pages_per_destination),
        };

        if progress.completed {
            return Ok(None);
        }

        while progress.pages_fetched < progress.pages_total {
            let page = self
                .source
                .search(&plan.query, progress.next_page.as_ref())
                .await?;

            let stored = self.sink.accept_page(destination_id, page.drafts).await?;

            if page.skipped > 0 {
                warn!(
                    "Skipped {} malformed records on page {} of destination {}",
                    page.skipped,
                    progress.pages_fetched + 1,
                    destination_id
                );
            }

            progress.pages_fetched += 1;
            progress.next_page = page.next_page;
            progress.completed =
                progress.next_page.is_none() || progress.pages_fetched >= progress.pages_total;

            self.progress.save(&progress).await?;

            let _ = self.events.send(FetchEvent::PageCompleted {
                destination_id,
                page: progress.pages_fetched,
                stored,
                skipped: page.skipped,
            });

            if progress.completed {
                break;
            }

            tokio::time::sleep(self.config.page_delay()).await;
        }

        Ok(Some(progress))
    }

    /// Fetches detail records for listings still missing them, up to the
    /// per-run budget. One broken listing doesn't stop the pass, but
    /// transport trouble does, since the pool is likely struggling.
    async fn enrich(&self, destination_id: DestinationId) -> Result<(), StallReason> {
        let pending = self
            .sink
            .pending_details(destination_id, self.config.detail_budget_per_run)
            .await?;

        for source_id in pending {
            match self.source.detail(&source_id).await {
                Ok(detail) => {
                    self.sink.accept_detail(destination_id, detail).await?;
                }
                Err(SourceError::Transport(error)) => {
                    return Err(StallReason::Source(SourceError::Transport(error)));
                }
                Err(error) => {
                    warn!("Detail fetch for listing {} failed: {}", source_id, error);
                    continue;
                }
            }

            tokio::time::sleep(self.config.page_delay()).await;
        }

        Ok(())
    }
}
