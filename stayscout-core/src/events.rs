use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::DestinationId;

pub type EventSender = Sender<FetchEvent>;
pub type EventReceiver = Receiver<FetchEvent>;

/// Creates the channel the fetch pipeline emits events on
pub fn event_channel() -> (EventSender, EventReceiver) {
    unbounded()
}

/// Describes the events that can be emitted by the fetch pipeline.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    /// A result page was fetched and handed to the sink.
    PageCompleted {
        destination_id: DestinationId,
        /// The page number that completed, starting at 1.
        page: usize,
        /// How many drafts the page produced.
        stored: usize,
        /// How many records on the page were malformed and skipped.
        skipped: usize,
    },
    /// A destination's run finished, either by exhausting its budget or upstream's pages.
    DestinationCompleted {
        destination_id: DestinationId,
        pages_fetched: usize,
    },
    /// A destination's run stopped early and can be resumed later.
    DestinationStalled {
        destination_id: DestinationId,
        /// The error that stopped the run.
        error: String,
    },
    /// An identity was put on cooldown after upstream pushback.
    IdentityQuarantined {
        /// The identity's label, such as "direct" or a proxy host.
        label: String,
        failures: u32,
        cooldown_secs: u64,
    },
}
