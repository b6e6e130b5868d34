use thiserror::Error;

use crate::{
    leaderboard, recommend, CollabContext, DatabaseError, NewVote, PrimaryKey, Recommendation,
    VoteData, VoteValue,
};

pub struct VoteManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Vote value must be between 0 and 3")]
    UnknownValue,
    #[error("A veto needs a reason")]
    VetoNeedsReason,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl VoteManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Stores a member's vote on a listing, replacing any earlier vote on
    /// the same listing, and reranks the group.
    pub async fn submit(&self, submission: VoteSubmission) -> Result<VoteData, VoteError> {
        let value = VoteValue::from_i16(submission.value).ok_or(VoteError::UnknownValue)?;

        let has_reason = submission
            .reason
            .as_ref()
            .map_or(false, |reason| !reason.trim().is_empty());

        if value == VoteValue::Veto && !has_reason {
            return Err(VoteError::VetoNeedsReason);
        }

        let member = self
            .context
            .database
            .member_by_id(submission.member_id)
            .await
            .map_err(VoteError::Db)?;

        // The vote has to point at a listing the group actually has
        self.context
            .database
            .listing(member.group_id, &submission.source_id)
            .await
            .map_err(VoteError::Db)?;

        let vote = self
            .context
            .database
            .upsert_vote(NewVote {
                member_id: member.id,
                group_id: member.group_id,
                source_id: submission.source_id,
                value,
                reason: submission.reason,
            })
            .await
            .map_err(VoteError::Db)?;

        leaderboard::refresh(&self.context, member.group_id).await;

        Ok(vote)
    }

    /// The next listings for a member to vote on, in discovery order.
    /// Exclusions are per-call state for cards the client already shows.
    pub async fn next_to_vote(
        &self,
        member_id: PrimaryKey,
        exclude_ids: &[String],
        count: usize,
    ) -> Result<Recommendation, DatabaseError> {
        let member = self.context.database.member_by_id(member_id).await?;

        let listings = self
            .context
            .database
            .listings_by_group(member.group_id)
            .await?;

        let votes = self.context.database.votes_by_member(member.id).await?;

        Ok(recommend::next_unvoted(listings, &votes, exclude_ids, count))
    }
}

/// A vote as it arrives from the outside, value still undecoded
#[derive(Debug)]
pub struct VoteSubmission {
    pub member_id: PrimaryKey,
    pub source_id: String,
    pub value: i16,
    pub reason: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        event_channel, CollabEvent, EventReceiver, MemoryDatabase, NewGroup, NewListing, NewMember,
    };
    use chrono::NaiveDate;
    use stayscout_core::{Config, ListingDraft};
    use std::sync::Arc;

    fn context() -> (CollabContext, EventReceiver) {
        let (emitter, receiver) = event_channel();

        let context = CollabContext {
            database: Arc::new(MemoryDatabase::new()),
            config: Config::default(),
            emitter,
        };

        (context, receiver)
    }

    async fn member_with_listings(context: &CollabContext, source_ids: &[&str]) -> PrimaryKey {
        let group = context
            .database
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

        for source_id in source_ids {
            context
                .database
                .upsert_listing(NewListing {
                    group_id: group.id,
                    destination_id: group.destinations[0].id,
                    draft: ListingDraft {
                        source_id: source_id.to_string(),
                        url: format!("https://example.com/rooms/{}", source_id),
                        ..Default::default()
                    },
                })
                .await
                .expect("listing is stored");
        }

        context
            .database
            .create_member(NewMember {
                group_id: group.id,
                nickname: "ana".to_string(),
                avatar: None,
            })
            .await
            .expect("member is created")
            .id
    }

    fn vote(member_id: PrimaryKey, source_id: &str, value: i16) -> VoteSubmission {
        VoteSubmission {
            member_id,
            source_id: source_id.to_string(),
            value,
            reason: None,
        }
    }

    #[tokio::test]
    async fn votes_store_and_rerank() {
        let (context, receiver) = context();
        let manager = VoteManager::new(&context);
        let member_id = member_with_listings(&context, &["a", "b"]).await;

        let stored = manager
            .submit(vote(member_id, "a", 2))
            .await
            .expect("vote is stored");

        assert_eq!(stored.value(), Some(VoteValue::Love));

        let reranked = receiver
            .try_iter()
            .any(|event| matches!(event, CollabEvent::LeaderboardUpdated { .. }));

        assert!(reranked);
    }

    #[tokio::test]
    async fn a_veto_without_a_reason_is_rejected() {
        let (context, _receiver) = context();
        let manager = VoteManager::new(&context);
        let member_id = member_with_listings(&context, &["a"]).await;

        let bare = manager.submit(vote(member_id, "a", 0)).await;
        assert!(matches!(bare, Err(VoteError::VetoNeedsReason)));

        let blank = manager
            .submit(VoteSubmission {
                reason: Some("   ".to_string()),
                ..vote(member_id, "a", 0)
            })
            .await;
        assert!(matches!(blank, Err(VoteError::VetoNeedsReason)));

        let reasoned = manager
            .submit(VoteSubmission {
                reason: Some("Too far from the slopes".to_string()),
                ..vote(member_id, "a", 0)
            })
            .await;
        assert!(reasoned.is_ok());
    }

    #[tokio::test]
    async fn out_of_range_values_are_rejected() {
        let (context, _receiver) = context();
        let manager = VoteManager::new(&context);
        let member_id = member_with_listings(&context, &["a"]).await;

        let result = manager.submit(vote(member_id, "a", 4)).await;

        assert!(matches!(result, Err(VoteError::UnknownValue)));
    }

    #[tokio::test]
    async fn votes_on_unknown_listings_are_rejected() {
        let (context, _receiver) = context();
        let manager = VoteManager::new(&context);
        let member_id = member_with_listings(&context, &["a"]).await;

        let result = manager.submit(vote(member_id, "nope", 1)).await;

        assert!(matches!(
            result,
            Err(VoteError::Db(DatabaseError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn voting_shrinks_the_queue() {
        let (context, _receiver) = context();
        let manager = VoteManager::new(&context);
        let member_id = member_with_listings(&context, &["a", "b"]).await;

        let before = manager
            .next_to_vote(member_id, &[], 1)
            .await
            .expect("selection runs");
        assert_eq!(before.total_remaining, 2);

        manager
            .submit(vote(member_id, "a", 1))
            .await
            .expect("vote is stored");

        let after = manager
            .next_to_vote(member_id, &[], 1)
            .await
            .expect("selection runs");

        assert_eq!(after.total_remaining, 1);
        assert_eq!(after.listings[0].source_id, "b");
    }
}
