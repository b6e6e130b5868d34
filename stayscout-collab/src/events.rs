use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::{LeaderboardEntry, MemberData, PrimaryKey};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Creates the channel collab events travel through
pub fn event_channel() -> (EventSender, EventReceiver) {
    unbounded()
}

/// Events emitted by the collab system, consumed by the live feed
#[derive(Debug)]
pub enum CollabEvent {
    /// A group's ranked listing list changed. Carries the full current
    /// list, never a delta.
    LeaderboardUpdated {
        group_id: PrimaryKey,
        entries: Vec<LeaderboardEntry>,
    },
    /// A fetch run stored another page of listings for a group
    FetchProgressed {
        group_id: PrimaryKey,
        destination_id: PrimaryKey,
        page: usize,
        stored: usize,
    },
    /// A destination's fetch run finished
    FetchCompleted {
        group_id: PrimaryKey,
        destination_id: PrimaryKey,
    },
    /// Someone joined a group
    MemberJoined {
        group_id: PrimaryKey,
        new_member: MemberData,
    },
    /// Someone left a group
    MemberLeft {
        group_id: PrimaryKey,
        member_id: PrimaryKey,
    },
}

impl CollabEvent {
    /// The group this event belongs to, used to route it to the right
    /// subscribers
    pub fn group_id(&self) -> PrimaryKey {
        match self {
            Self::LeaderboardUpdated { group_id, .. } => *group_id,
            Self::FetchProgressed { group_id, .. } => *group_id,
            Self::FetchCompleted { group_id, .. } => *group_id,
            Self::MemberJoined { group_id, .. } => *group_id,
            Self::MemberLeft { group_id, .. } => *group_id,
        }
    }
}
