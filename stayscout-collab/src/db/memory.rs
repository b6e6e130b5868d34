use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::{
    Database, DatabaseError, DestinationData, FetchProgressData, GroupData, ListingAmenityData,
    ListingData, ListingDetailUpdate, MemberData, MemberFiltersData, NewGroup, NewListing,
    NewMember, NewMemberFilters, NewVote, PrimaryKey, Result, ScoringWeights, VoteData,
};

/// An in-memory database with the same observable semantics as the
/// postgres implementation. Backs tests and nothing else.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    last_id: PrimaryKey,
    groups: HashMap<PrimaryKey, GroupData>,
    destinations: HashMap<PrimaryKey, DestinationData>,
    members: HashMap<PrimaryKey, MemberData>,
    filters: HashMap<PrimaryKey, MemberFiltersData>,
    /// Kept in insertion order, which doubles as first_seen_at order
    listings: Vec<ListingData>,
    votes: Vec<VoteData>,
    progress: HashMap<PrimaryKey, FetchProgressData>,
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn assemble_group(&self, group_id: PrimaryKey) -> Result<GroupData> {
        let mut group = self
            .groups
            .get(&group_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "group",
                identifier: "id",
            })?;

        group.destinations = self
            .destinations
            .values()
            .filter(|d| d.group_id == group_id)
            .cloned()
            .collect();
        group.destinations.sort_by_key(|d| d.id);

        group.members = self
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        group.members.sort_by_key(|m| m.id);

        Ok(group)
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn create_group(&self, new_group: NewGroup) -> Result<GroupData> {
        let mut state = self.state.lock();
        let group_id = state.next_id();

        state.groups.insert(
            group_id,
            GroupData {
                id: group_id,
                name: new_group.name,
                adults: new_group.adults,
                children: new_group.children,
                infants: new_group.infants,
                pets: new_group.pets,
                check_in: new_group.check_in,
                check_out: new_group.check_out,
                price_min: new_group.price_min,
                price_max: new_group.price_max,
                created_at: Utc::now(),
                destinations: vec![],
                members: vec![],
            },
        );

        for name in new_group.destinations {
            let taken = state
                .destinations
                .values()
                .any(|d| d.group_id == group_id && d.name == name);

            if taken {
                return Err(DatabaseError::Conflict {
                    resource: "destination",
                    field: "name",
                    value: name,
                });
            }

            let destination_id = state.next_id();
            state.destinations.insert(
                destination_id,
                DestinationData {
                    id: destination_id,
                    group_id,
                    name,
                },
            );
        }

        state.assemble_group(group_id)
    }

    async fn group_by_id(&self, group_id: PrimaryKey) -> Result<GroupData> {
        self.state.lock().assemble_group(group_id)
    }

    async fn delete_group(&self, group_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        state
            .groups
            .remove(&group_id)
            .ok_or(DatabaseError::NotFound {
                resource: "group",
                identifier: "id",
            })?;

        let members: Vec<_> = state
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .map(|m| m.id)
            .collect();

        for member_id in members {
            state.members.remove(&member_id);
            state.filters.remove(&member_id);
        }

        state.destinations.retain(|_, d| d.group_id != group_id);
        state.listings.retain(|l| l.group_id != group_id);
        state.votes.retain(|v| v.group_id != group_id);
        state.progress.retain(|_, p| p.group_id != group_id);

        Ok(())
    }

    async fn destination_by_id(&self, destination_id: PrimaryKey) -> Result<DestinationData> {
        self.state
            .lock()
            .destinations
            .get(&destination_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "destination",
                identifier: "id",
            })
    }

    async fn create_member(&self, new_member: NewMember) -> Result<MemberData> {
        let mut state = self.state.lock();

        if !state.groups.contains_key(&new_member.group_id) {
            return Err(DatabaseError::NotFound {
                resource: "group",
                identifier: "id",
            });
        }

        let member_id = state.next_id();
        let member = MemberData {
            id: member_id,
            group_id: new_member.group_id,
            nickname: new_member.nickname,
            avatar: new_member.avatar,
            joined_at: Utc::now(),
        };

        state.members.insert(member_id, member.clone());

        Ok(member)
    }

    async fn member_by_id(&self, member_id: PrimaryKey) -> Result<MemberData> {
        self.state
            .lock()
            .members
            .get(&member_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "member",
                identifier: "id",
            })
    }

    async fn delete_member(&self, member_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        state
            .members
            .remove(&member_id)
            .ok_or(DatabaseError::NotFound {
                resource: "member",
                identifier: "id",
            })?;

        state.filters.remove(&member_id);
        state.votes.retain(|v| v.member_id != member_id);

        Ok(())
    }

    async fn filters_by_member(
        &self,
        member_id: PrimaryKey,
    ) -> Result<Option<MemberFiltersData>> {
        Ok(self.state.lock().filters.get(&member_id).cloned())
    }

    async fn filters_by_group(&self, group_id: PrimaryKey) -> Result<Vec<MemberFiltersData>> {
        let state = self.state.lock();

        let mut rows: Vec<_> = state
            .filters
            .values()
            .filter(|f| {
                state
                    .members
                    .get(&f.member_id)
                    .map(|m| m.group_id == group_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        rows.sort_by_key(|f| f.member_id);

        Ok(rows)
    }

    async fn upsert_filters(&self, filters: NewMemberFilters) -> Result<MemberFiltersData> {
        let mut state = self.state.lock();

        if !state.members.contains_key(&filters.member_id) {
            return Err(DatabaseError::NotFound {
                resource: "member",
                identifier: "id",
            });
        }

        let mut amenity_ids = filters.amenity_ids;
        amenity_ids.sort_unstable();
        amenity_ids.dedup();

        let row = MemberFiltersData {
            member_id: filters.member_id,
            price_min: filters.price_min,
            price_max: filters.price_max,
            min_bedrooms: filters.min_bedrooms,
            min_beds: filters.min_beds,
            min_bathrooms: filters.min_bathrooms,
            property_type: filters.property_type,
            amenity_ids,
        };

        state.filters.insert(filters.member_id, row.clone());

        Ok(row)
    }

    async fn upsert_listing(&self, new_listing: NewListing) -> Result<()> {
        let mut state = self.state.lock();
        let draft = new_listing.draft;
        let now = Utc::now();

        let existing = state
            .listings
            .iter_mut()
            .find(|l| l.group_id == new_listing.group_id && l.source_id == draft.source_id);

        match existing {
            Some(listing) => {
                listing.url = draft.url;
                listing.title = draft.title.or(listing.title.take());
                listing.price_per_night = draft.price_per_night.or(listing.price_per_night);
                listing.price_total = draft.price_total.or(listing.price_total);
                listing.currency = draft.currency.or(listing.currency.take());
                listing.rating = draft.rating.or(listing.rating);
                listing.review_count =
                    draft.review_count.map(|v| v as i32).or(listing.review_count);
                listing.bedrooms = draft.bedrooms.map(|v| v as i32).or(listing.bedrooms);
                listing.beds = draft.beds.map(|v| v as i32).or(listing.beds);
                listing.bathrooms = draft.bathrooms.or(listing.bathrooms);
                listing.property_type = draft.property_type.or(listing.property_type.take());
                listing.latitude = draft.latitude.or(listing.latitude);
                listing.longitude = draft.longitude.or(listing.longitude);
                listing.last_seen_at = now;

                if !draft.images.is_empty() {
                    listing.images = draft.images;
                }
            }
            None => state.listings.push(ListingData {
                group_id: new_listing.group_id,
                source_id: draft.source_id,
                destination_id: new_listing.destination_id,
                url: draft.url,
                title: draft.title,
                description: None,
                price_per_night: draft.price_per_night,
                price_total: draft.price_total,
                currency: draft.currency,
                rating: draft.rating,
                review_count: draft.review_count.map(|v| v as i32),
                bedrooms: draft.bedrooms.map(|v| v as i32),
                beds: draft.beds.map(|v| v as i32),
                bathrooms: draft.bathrooms,
                property_type: draft.property_type,
                latitude: draft.latitude,
                longitude: draft.longitude,
                first_seen_at: now,
                last_seen_at: now,
                images: draft.images,
                amenities: vec![],
            }),
        }

        Ok(())
    }

    async fn apply_listing_detail(&self, update: ListingDetailUpdate) -> Result<()> {
        let mut state = self.state.lock();
        let detail = update.detail;

        let listing = state
            .listings
            .iter_mut()
            .find(|l| l.group_id == update.group_id && l.source_id == detail.source_id)
            .ok_or(DatabaseError::NotFound {
                resource: "listing",
                identifier: "group_id:source_id",
            })?;

        listing.title = detail.title.or(listing.title.take());
        listing.description = detail.description.or(listing.description.take());
        listing.property_type = detail.property_type.or(listing.property_type.take());
        listing.latitude = detail.latitude.or(listing.latitude);
        listing.longitude = detail.longitude.or(listing.longitude);

        if !detail.images.is_empty() {
            listing.images = detail.images;
        }

        listing.amenities = detail
            .amenities
            .into_iter()
            .map(|a| ListingAmenityData {
                name: a.name,
                available: a.available,
            })
            .collect();

        Ok(())
    }

    async fn listing(&self, group_id: PrimaryKey, source_id: &str) -> Result<ListingData> {
        self.state
            .lock()
            .listings
            .iter()
            .find(|l| l.group_id == group_id && l.source_id == source_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "listing",
                identifier: "group_id:source_id",
            })
    }

    async fn listings_by_group(&self, group_id: PrimaryKey) -> Result<Vec<ListingData>> {
        let mut listings: Vec<_> = self
            .state
            .lock()
            .listings
            .iter()
            .filter(|l| l.group_id == group_id)
            .cloned()
            .collect();

        listings.sort_by(|a, b| {
            (a.first_seen_at, &a.source_id).cmp(&(b.first_seen_at, &b.source_id))
        });

        Ok(listings)
    }

    async fn listings_missing_detail(
        &self,
        group_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<String>> {
        let listings = self.listings_by_group(group_id).await?;

        Ok(listings
            .into_iter()
            .filter(|l| l.description.is_none())
            .take(limit)
            .map(|l| l.source_id)
            .collect())
    }

    async fn count_listings(&self, group_id: PrimaryKey) -> Result<usize> {
        Ok(self
            .state
            .lock()
            .listings
            .iter()
            .filter(|l| l.group_id == group_id)
            .count())
    }

    async fn upsert_vote(&self, new_vote: NewVote) -> Result<VoteData> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let existing = state.votes.iter_mut().find(|v| {
            v.member_id == new_vote.member_id
                && v.group_id == new_vote.group_id
                && v.source_id == new_vote.source_id
        });

        let vote = match existing {
            Some(vote) => {
                *vote = VoteData::new(
                    new_vote.member_id,
                    new_vote.group_id,
                    new_vote.source_id,
                    new_vote.value,
                    new_vote.reason,
                    vote.created_at,
                    now,
                );
                vote.clone()
            }
            None => {
                let vote = VoteData::new(
                    new_vote.member_id,
                    new_vote.group_id,
                    new_vote.source_id,
                    new_vote.value,
                    new_vote.reason,
                    now,
                    now,
                );
                state.votes.push(vote.clone());
                vote
            }
        };

        Ok(vote)
    }

    async fn votes_by_group(&self, group_id: PrimaryKey) -> Result<Vec<VoteData>> {
        let mut votes: Vec<_> = self
            .state
            .lock()
            .votes
            .iter()
            .filter(|v| v.group_id == group_id)
            .cloned()
            .collect();

        votes.sort_by(|a, b| (a.member_id, &a.source_id).cmp(&(b.member_id, &b.source_id)));

        Ok(votes)
    }

    async fn votes_by_member(&self, member_id: PrimaryKey) -> Result<Vec<VoteData>> {
        let mut votes: Vec<_> = self
            .state
            .lock()
            .votes
            .iter()
            .filter(|v| v.member_id == member_id)
            .cloned()
            .collect();

        votes.sort_by(|a, b| a.source_id.cmp(&b.source_id));

        Ok(votes)
    }

    async fn progress_by_destination(
        &self,
        destination_id: PrimaryKey,
    ) -> Result<Option<FetchProgressData>> {
        Ok(self.state.lock().progress.get(&destination_id).cloned())
    }

    async fn progress_by_group(&self, group_id: PrimaryKey) -> Result<Vec<FetchProgressData>> {
        let mut rows: Vec<_> = self
            .state
            .lock()
            .progress
            .values()
            .filter(|p| p.group_id == group_id)
            .cloned()
            .collect();

        rows.sort_by_key(|p| p.destination_id);

        Ok(rows)
    }

    async fn save_progress(&self, progress: FetchProgressData) -> Result<()> {
        self.state
            .lock()
            .progress
            .insert(progress.destination_id, progress);

        Ok(())
    }

    async fn scoring_weights(&self) -> Result<ScoringWeights> {
        Ok(ScoringWeights::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::VoteValue;
    use chrono::NaiveDate;
    use futures_util::future::join_all;
    use std::sync::Arc;
    use stayscout_core::{AmenityDraft, ListingDetail, ListingDraft};

    async fn group_with_destination(db: &MemoryDatabase) -> (PrimaryKey, PrimaryKey) {
        let group = db
            .create_group(NewGroup {
                name: "Summer trip".to_string(),
                adults: 4,
                children: 0,
                infants: 0,
                pets: 0,
                check_in: NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date"),
                check_out: NaiveDate::from_ymd_opt(2024, 7, 8).expect("valid date"),
                price_min: None,
                price_max: None,
                destinations: vec!["Lisbon".to_string()],
            })
            .await
            .expect("group created");

        (group.id, group.destinations[0].id)
    }

    fn draft(source_id: &str) -> ListingDraft {
        ListingDraft {
            source_id: source_id.to_string(),
            url: format!("https://stays.example/rooms/{}", source_id),
            title: Some("Sunny flat".to_string()),
            price_per_night: Some(120.0),
            rating: Some(4.8),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upserting_the_same_draft_twice_keeps_one_row() {
        let db = MemoryDatabase::new();
        let (group_id, destination_id) = group_with_destination(&db).await;

        for _ in 0..2 {
            db.upsert_listing(NewListing {
                group_id,
                destination_id,
                draft: draft("111"),
            })
            .await
            .expect("upsert succeeds");
        }

        assert_eq!(db.count_listings(group_id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn absent_fields_never_erase_known_values() {
        let db = MemoryDatabase::new();
        let (group_id, destination_id) = group_with_destination(&db).await;

        db.upsert_listing(NewListing {
            group_id,
            destination_id,
            draft: draft("111"),
        })
        .await
        .expect("upsert succeeds");

        // A sparser re-discovery of the same listing
        db.upsert_listing(NewListing {
            group_id,
            destination_id,
            draft: ListingDraft {
                source_id: "111".to_string(),
                url: "https://stays.example/rooms/111".to_string(),
                price_per_night: Some(130.0),
                ..Default::default()
            },
        })
        .await
        .expect("upsert succeeds");

        let listing = db.listing(group_id, "111").await.expect("listing exists");

        assert_eq!(listing.title.as_deref(), Some("Sunny flat"));
        assert_eq!(listing.rating, Some(4.8));
        // Present fields overwrite
        assert_eq!(listing.price_per_night, Some(130.0));
        assert!(listing.last_seen_at >= listing.first_seen_at);
    }

    #[tokio::test]
    async fn concurrent_upserts_for_one_key_leave_one_row() {
        let db = Arc::new(MemoryDatabase::new());
        let (group_id, destination_id) = group_with_destination(&db).await;

        let tasks = (0..16).map(|n| {
            let db = db.clone();

            tokio::spawn(async move {
                db.upsert_listing(NewListing {
                    group_id,
                    destination_id,
                    draft: ListingDraft {
                        price_per_night: Some(100.0 + n as f64),
                        ..draft("111")
                    },
                })
                .await
                .expect("upsert succeeds");
            })
        });

        for task in join_all(tasks).await {
            task.expect("task completes");
        }

        assert_eq!(db.count_listings(group_id).await.expect("count"), 1);

        let listing = db.listing(group_id, "111").await.expect("listing exists");
        let night = listing.price_per_night.expect("price set");
        assert!((100.0..116.0).contains(&night));
    }

    #[tokio::test]
    async fn detail_replaces_amenities_wholesale() {
        let db = MemoryDatabase::new();
        let (group_id, destination_id) = group_with_destination(&db).await;

        db.upsert_listing(NewListing {
            group_id,
            destination_id,
            draft: draft("111"),
        })
        .await
        .expect("upsert succeeds");

        let detail = |names: &[&str]| ListingDetail {
            source_id: "111".to_string(),
            description: Some("By the beach".to_string()),
            amenities: names
                .iter()
                .map(|n| AmenityDraft {
                    name: n.to_string(),
                    available: true,
                })
                .collect(),
            ..Default::default()
        };

        db.apply_listing_detail(ListingDetailUpdate {
            group_id,
            detail: detail(&["Wifi", "Kitchen"]),
        })
        .await
        .expect("detail applies");

        db.apply_listing_detail(ListingDetailUpdate {
            group_id,
            detail: detail(&["Pool"]),
        })
        .await
        .expect("detail applies");

        let listing = db.listing(group_id, "111").await.expect("listing exists");
        let names: Vec<_> = listing.amenities.iter().map(|a| a.name.as_str()).collect();

        assert_eq!(names, vec!["Pool"]);
        assert_eq!(listing.description.as_deref(), Some("By the beach"));
    }

    #[tokio::test]
    async fn a_second_vote_replaces_the_first() {
        let db = MemoryDatabase::new();
        let (group_id, destination_id) = group_with_destination(&db).await;

        let member = db
            .create_member(NewMember {
                group_id,
                nickname: "ada".to_string(),
                avatar: None,
            })
            .await
            .expect("member created");

        db.upsert_listing(NewListing {
            group_id,
            destination_id,
            draft: draft("111"),
        })
        .await
        .expect("upsert succeeds");

        let vote = |value, reason: Option<&str>| NewVote {
            member_id: member.id,
            group_id,
            source_id: "111".to_string(),
            value,
            reason: reason.map(str::to_string),
        };

        db.upsert_vote(vote(VoteValue::Love, None))
            .await
            .expect("vote stored");
        db.upsert_vote(vote(VoteValue::Veto, Some("too far out")))
            .await
            .expect("vote stored");

        let votes = db.votes_by_group(group_id).await.expect("votes");

        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].value(), Some(VoteValue::Veto));
        assert_eq!(votes[0].reason.as_deref(), Some("too far out"));
    }

    #[tokio::test]
    async fn duplicate_destination_names_conflict() {
        let db = MemoryDatabase::new();

        let result = db
            .create_group(NewGroup {
                name: "Summer trip".to_string(),
                adults: 2,
                children: 0,
                infants: 0,
                pets: 0,
                check_in: NaiveDate::from_ymd_opt(2024, 7, 1).expect("valid date"),
                check_out: NaiveDate::from_ymd_opt(2024, 7, 8).expect("valid date"),
                price_min: None,
                price_max: None,
                destinations: vec!["Lisbon".to_string(), "Lisbon".to_string()],
            })
            .await;

        assert!(matches!(result, Err(DatabaseError::Conflict { .. })));
    }

    #[tokio::test]
    async fn deleting_a_member_drops_their_filters_and_votes() {
        let db = MemoryDatabase::new();
        let (group_id, destination_id) = group_with_destination(&db).await;

        let member = db
            .create_member(NewMember {
                group_id,
                nickname: "ada".to_string(),
                avatar: None,
            })
            .await
            .expect("member created");

        db.upsert_filters(NewMemberFilters {
            member_id: member.id,
            price_min: None,
            price_max: Some(200),
            min_bedrooms: None,
            min_beds: None,
            min_bathrooms: None,
            property_type: None,
            amenity_ids: vec![4],
        })
        .await
        .expect("filters stored");

        db.upsert_listing(NewListing {
            group_id,
            destination_id,
            draft: draft("111"),
        })
        .await
        .expect("upsert succeeds");

        db.upsert_vote(NewVote {
            member_id: member.id,
            group_id,
            source_id: "111".to_string(),
            value: VoteValue::Ok,
            reason: None,
        })
        .await
        .expect("vote stored");

        db.delete_member(member.id).await.expect("member deleted");

        assert!(db
            .filters_by_member(member.id)
            .await
            .expect("query succeeds")
            .is_none());
        assert!(db.votes_by_group(group_id).await.expect("votes").is_empty());
    }
}
