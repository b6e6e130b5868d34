use log::info;
use thiserror::Error;

use crate::{
    CollabContext, CollabEvent, DatabaseError, GroupData, MemberData, NewGroup, NewMember,
    PrimaryKey,
};

pub struct GroupManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("Check-out must be after check-in")]
    DatesNotInOrder,
    #[error("Party counts cannot be negative")]
    NegativePartyCount,
    #[error("Price bounds must be non-negative and in order")]
    InvalidPriceBounds,
    #[error("A group needs at least one destination")]
    NoDestinations,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl GroupManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a group along with its destinations
    pub async fn create_group(&self, new_group: NewGroup) -> Result<GroupData, GroupError> {
        if new_group.check_in >= new_group.check_out {
            return Err(GroupError::DatesNotInOrder);
        }

        let party = [
            new_group.adults,
            new_group.children,
            new_group.infants,
            new_group.pets,
        ];

        if party.iter().any(|count| *count < 0) {
            return Err(GroupError::NegativePartyCount);
        }

        if new_group.price_min.map_or(false, |min| min < 0)
            || new_group.price_max.map_or(false, |max| max < 0)
        {
            return Err(GroupError::InvalidPriceBounds);
        }

        if let (Some(min), Some(max)) = (new_group.price_min, new_group.price_max) {
            if min > max {
                return Err(GroupError::InvalidPriceBounds);
            }
        }

        if new_group.destinations.is_empty() {
            return Err(GroupError::NoDestinations);
        }

        self.context
            .database
            .create_group(new_group)
            .await
            .map_err(GroupError::Db)
    }

    /// Returns a group with its destinations and members
    pub async fn group_by_id(&self, group_id: PrimaryKey) -> Result<GroupData, DatabaseError> {
        self.context.database.group_by_id(group_id).await
    }

    /// Adds a member to a group
    pub async fn join(&self, new_member: NewMember) -> Result<MemberData, DatabaseError> {
        let member = self.context.database.create_member(new_member).await?;

        self.context.emit(CollabEvent::MemberJoined {
            group_id: member.group_id,
            new_member: member.clone(),
        });

        Ok(member)
    }

    /// Removes a member from their group. The last member out takes the
    /// group and everything under it with them.
    pub async fn leave(&self, member_id: PrimaryKey) -> Result<(), DatabaseError> {
        let member = self.context.database.member_by_id(member_id).await?;

        self.context.database.delete_member(member_id).await?;

        self.context.emit(CollabEvent::MemberLeft {
            group_id: member.group_id,
            member_id,
        });

        let group = self.context.database.group_by_id(member.group_id).await?;

        if group.members.is_empty() {
            self.context.database.delete_group(group.id).await?;

            info!("Group {} lost its last member and was removed", group.id);
        }

        Ok(())
    }
}
