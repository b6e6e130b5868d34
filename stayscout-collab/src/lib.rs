mod db;
mod events;
mod fetcher;
mod filters;
mod groups;
mod source;
mod votes;

pub mod leaderboard;
pub mod recommend;
pub mod scoring;

use std::sync::Arc;
use std::thread;

use log::{debug, error};
use stayscout_core::{Config, FetchEvent};
use tokio::runtime::Handle;

pub use db::*;
pub use events::*;
pub use fetcher::*;
pub use filters::*;
pub use groups::*;
pub use leaderboard::LeaderboardEntry;
pub use recommend::Recommendation;
pub use source::*;
pub use votes::*;

/// The stayscout collab system, facilitating groups, filters, votes,
/// fetch runs, and ranking.
pub struct Collab {
    context: CollabContext,

    pub groups: GroupManager,
    pub filters: FilterManager,
    pub votes: VoteManager,
    pub fetch: Arc<FetchManager>,
}

/// A type passed to the components of the collab system, to access the
/// store, read the config, and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub database: SharedDatabase,
    pub config: Config,
    pub emitter: EventSender,
}

impl CollabContext {
    /// Sends an event to whoever holds the receiving end
    pub fn emit(&self, event: CollabEvent) {
        let _ = self.emitter.send(event);
    }
}

impl Collab {
    /// Creates the collab system and starts the fetch event pump.
    /// Returns the system along with the receiving end of its events.
    ///
    /// Must be called from within a tokio runtime, since fetch runs and
    /// event handling are spawned onto it.
    pub fn new(database: SharedDatabase, config: Config) -> std::result::Result<(Self, EventReceiver), FetchError> {
        let (emitter, receiver) = event_channel();
        let (fetch_emitter, fetch_receiver) = stayscout_core::event_channel();

        let context = CollabContext {
            database,
            config,
            emitter,
        };

        let fetch = Arc::new(FetchManager::new(&context, fetch_emitter)?);

        spawn_fetch_event_pump(context.clone(), fetch_receiver);

        let collab = Self {
            groups: GroupManager::new(&context),
            filters: FilterManager::new(&context, &fetch),
            votes: VoteManager::new(&context),
            fetch,
            context,
        };

        Ok((collab, receiver))
    }

    /// A ranked snapshot of a group's listings, as the live feed sends it
    pub async fn leaderboard(&self, group_id: PrimaryKey) -> std::result::Result<Vec<LeaderboardEntry>, DatabaseError> {
        leaderboard::snapshot(&self.context, group_id).await
    }
}

/// Bridges fetch events from the pipeline's channel into async handling
fn spawn_fetch_event_pump(context: CollabContext, receiver: stayscout_core::EventReceiver) {
    let handle = Handle::current();

    thread::spawn(move || {
        while let Ok(event) = receiver.recv() {
            handle.block_on(handle_fetch_event(&context, event));
        }
    });
}

async fn handle_fetch_event(context: &CollabContext, event: FetchEvent) {
    match event {
        FetchEvent::PageCompleted {
            destination_id,
            page,
            stored,
            ..
        } => match context.database.destination_by_id(destination_id).await {
            Ok(destination) => {
                context.emit(CollabEvent::FetchProgressed {
                    group_id: destination.group_id,
                    destination_id,
                    page,
                    stored,
                });
            }
            Err(error) => error!(
                "Could not resolve destination {} for a page event: {}",
                destination_id, error
            ),
        },
        FetchEvent::DestinationCompleted { destination_id, .. } => {
            match context.database.destination_by_id(destination_id).await {
                Ok(destination) => {
                    context.emit(CollabEvent::FetchCompleted {
                        group_id: destination.group_id,
                        destination_id,
                    });

                    leaderboard::refresh(context, destination.group_id).await;
                }
                Err(error) => error!(
                    "Could not resolve destination {} for a completion event: {}",
                    destination_id, error
                ),
            }
        }
        // Stalls are already logged where they happen and are operator-facing
        FetchEvent::DestinationStalled { .. } => {}
        FetchEvent::IdentityQuarantined {
            label,
            failures,
            cooldown_secs,
        } => {
            debug!(
                "Identity {} benched for {}s after {} failures",
                label, cooldown_secs, failures
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    fn collab() -> (Collab, EventReceiver) {
        let database: SharedDatabase = Arc::new(MemoryDatabase::new());

        Collab::new(
            database,
            Config {
                fetch_trigger_threshold: 0,
                ..Default::default()
            },
        )
        .expect("collab builds")
    }

    #[tokio::test]
    async fn completed_destinations_rerank_their_group() {
        let (collab, receiver) = collab();

        let group = collab
            .groups
            .create_group(NewGroup {
                name: "Summer trip".to_string(),
                adults: 2,
                children: 0,
                infants: 0,
                pets: 0,
                check_in: NaiveDate::from_ymd_opt(2026, 7, 10).unwrap(),
                check_out: NaiveDate::from_ymd_opt(2026, 7, 17).unwrap(),
                price_min: None,
                price_max: None,
                destinations: vec!["Luzern".to_string()],
            })
            .await
            .expect("group is created");

        let destination_id = group.destinations[0].id;

        handle_fetch_event(
            &collab.context,
            FetchEvent::DestinationCompleted {
                destination_id,
                pages_fetched: 4,
            },
        )
        .await;

        let events: Vec<_> = receiver.try_iter().collect();

        assert!(events
            .iter()
            .any(|event| matches!(event, CollabEvent::FetchCompleted { group_id, .. } if *group_id == group.id)));
        assert!(events
            .iter()
            .any(|event| matches!(event, CollabEvent::LeaderboardUpdated { .. })));
    }

    #[tokio::test]
    async fn page_events_resolve_to_their_group() {
        let (collab, receiver) = collab();

        let group = collab
            .groups
            .create_group(NewGroup {
                name: "City hop".to_string(),
                adults: 2,
                children: 0,
                infants: 0,
                pets: 0,
                check_in: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                check_out: NaiveDate::from_ymd_opt(2026, 9, 5).unwrap(),
                price_min: None,
                price_max: None,
                destinations: vec!["Basel".to_string()],
            })
            .await
            .expect("group is created");

        handle_fetch_event(
            &collab.context,
            FetchEvent::PageCompleted {
                destination_id: group.destinations[0].id,
                page: 1,
                stored: 18,
                skipped: 0,
            },
        )
        .await;

        let event = receiver.try_recv().expect("an event was emitted");

        match event {
            CollabEvent::FetchProgressed {
                group_id,
                page,
                stored,
                ..
            } => {
                assert_eq!(group_id, group.id);
                assert_eq!(page, 1);
                assert_eq!(stored, 18);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
