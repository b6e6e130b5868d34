use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, query_scalar, Error as SqlxError, FromRow, PgPool};

use crate::{
    Database, DatabaseError, DatabaseResult, DestinationData, FetchProgressData, GroupData,
    IntoDatabaseError, ListingAmenityData, ListingData, ListingDetailUpdate, MemberData,
    MemberFiltersData, NewGroup, NewListing, NewMember, NewMemberFilters, NewVote, PrimaryKey,
    Result, ScoringWeights, VoteData,
};

/// A postgres database implementation for stayscout
pub struct PgDatabase {
    pool: PgPool,
}

/// The raw shape of a listings row, before child sets are attached
#[derive(FromRow)]
struct ListingRow {
    group_id: PrimaryKey,
    source_id: String,
    destination_id: PrimaryKey,
    url: String,
    title: Option<String>,
    description: Option<String>,
    price_per_night: Option<f64>,
    price_total: Option<f64>,
    currency: Option<String>,
    rating: Option<f64>,
    review_count: Option<i32>,
    bedrooms: Option<i32>,
    beds: Option<i32>,
    bathrooms: Option<f64>,
    property_type: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl ListingRow {
    fn into_data(self, images: Vec<String>, amenities: Vec<ListingAmenityData>) -> ListingData {
        ListingData {
            group_id: self.group_id,
            source_id: self.source_id,
            destination_id: self.destination_id,
            url: self.url,
            title: self.title,
            description: self.description,
            price_per_night: self.price_per_night,
            price_total: self.price_total,
            currency: self.currency,
            rating: self.rating,
            review_count: self.review_count,
            bedrooms: self.bedrooms,
            beds: self.beds,
            bathrooms: self.bathrooms,
            property_type: self.property_type,
            latitude: self.latitude,
            longitude: self.longitude,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            images,
            amenities,
        }
    }
}

#[derive(FromRow)]
struct GroupRow {
    id: PrimaryKey,
    name: String,
    adults: i32,
    children: i32,
    infants: i32,
    pets: i32,
    check_in: chrono::NaiveDate,
    check_out: chrono::NaiveDate,
    price_min: Option<i32>,
    price_max: Option<i32>,
    created_at: DateTime<Utc>,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    /// Applies pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }

    async fn group_members(&self, group_id: PrimaryKey) -> Result<Vec<MemberData>> {
        query_as::<_, MemberData>(
            "SELECT * FROM members WHERE group_id = $1 ORDER BY joined_at, id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn group_destinations(&self, group_id: PrimaryKey) -> Result<Vec<DestinationData>> {
        query_as::<_, DestinationData>(
            "SELECT * FROM destinations WHERE group_id = $1 ORDER BY id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn listing_children(
        &self,
        group_id: PrimaryKey,
        source_id: &str,
    ) -> Result<(Vec<String>, Vec<ListingAmenityData>)> {
        let images = query_scalar::<_, String>(
            "SELECT url FROM listing_images
             WHERE group_id = $1 AND source_id = $2
             ORDER BY position",
        )
        .bind(group_id)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let amenities = query_as::<_, ListingAmenityData>(
            "SELECT name, available FROM listing_amenities
             WHERE group_id = $1 AND source_id = $2
             ORDER BY name",
        )
        .bind(group_id)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok((images, amenities))
    }

    async fn replace_images(
        &self,
        group_id: PrimaryKey,
        source_id: &str,
        images: &[String],
    ) -> Result<()> {
        query("DELETE FROM listing_images WHERE group_id = $1 AND source_id = $2")
            .bind(group_id)
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        for (position, url) in images.iter().enumerate() {
            query(
                "INSERT INTO listing_images (group_id, source_id, position, url)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(group_id)
            .bind(source_id)
            .bind(position as i32)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;
        }

        Ok(())
    }

    async fn filter_amenities(&self, member_id: PrimaryKey) -> Result<Vec<i32>> {
        query_scalar::<_, i32>(
            "SELECT amenity_id FROM filter_amenities WHERE member_id = $1 ORDER BY amenity_id",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn create_group(&self, new_group: NewGroup) -> Result<GroupData> {
        let group_id = query_scalar::<_, PrimaryKey>(
            "INSERT INTO groups
                (name, adults, children, infants, pets,
                 check_in, check_out, price_min, price_max)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
        )
        .bind(&new_group.name)
        .bind(new_group.adults)
        .bind(new_group.children)
        .bind(new_group.infants)
        .bind(new_group.pets)
        .bind(new_group.check_in)
        .bind(new_group.check_out)
        .bind(new_group.price_min)
        .bind(new_group.price_max)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        for name in &new_group.destinations {
            // Ensure the name isn't taken within this group already
            query("SELECT id FROM destinations WHERE group_id = $1 AND name = $2")
                .bind(group_id)
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| e.not_found_or("", ""))
                .conflict_or_ok("destination", "name", name)?;

            query("INSERT INTO destinations (group_id, name) VALUES ($1, $2)")
                .bind(group_id)
                .bind(name)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;
        }

        self.group_by_id(group_id).await
    }

    async fn group_by_id(&self, group_id: PrimaryKey) -> Result<GroupData> {
        let row = query_as::<_, GroupRow>("SELECT * FROM groups WHERE id = $1")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("group", "id"))?;

        let destinations = self.group_destinations(group_id).await?;
        let members = self.group_members(group_id).await?;

        Ok(GroupData {
            id: row.id,
            name: row.name,
            adults: row.adults,
            children: row.children,
            infants: row.infants,
            pets: row.pets,
            check_in: row.check_in,
            check_out: row.check_out,
            price_min: row.price_min,
            price_max: row.price_max,
            created_at: row.created_at,
            destinations,
            members,
        })
    }

    async fn delete_group(&self, group_id: PrimaryKey) -> Result<()> {
        // Ensure group exists
        query("SELECT id FROM groups WHERE id = $1")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("group", "id"))?;

        query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn destination_by_id(&self, destination_id: PrimaryKey) -> Result<DestinationData> {
        query_as::<_, DestinationData>("SELECT * FROM destinations WHERE id = $1")
            .bind(destination_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("destination", "id"))
    }

    async fn create_member(&self, new_member: NewMember) -> Result<MemberData> {
        // Ensure the group exists before joining it
        query("SELECT id FROM groups WHERE id = $1")
            .bind(new_member.group_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("group", "id"))?;

        let member_id = query_scalar::<_, PrimaryKey>(
            "INSERT INTO members (group_id, nickname, avatar)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(new_member.group_id)
        .bind(&new_member.nickname)
        .bind(&new_member.avatar)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.member_by_id(member_id).await
    }

    async fn member_by_id(&self, member_id: PrimaryKey) -> Result<MemberData> {
        query_as::<_, MemberData>("SELECT * FROM members WHERE id = $1")
            .bind(member_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("member", "id"))
    }

    async fn delete_member(&self, member_id: PrimaryKey) -> Result<()> {
        // Ensure member exists
        let _ = self.member_by_id(member_id).await?;

        query("DELETE FROM members WHERE id = $1")
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn filters_by_member(
        &self,
        member_id: PrimaryKey,
    ) -> Result<Option<MemberFiltersData>> {
        let filters =
            query_as::<_, MemberFiltersData>("SELECT * FROM member_filters WHERE member_id = $1")
                .bind(member_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| e.any())?;

        match filters {
            Some(mut filters) => {
                filters.amenity_ids = self.filter_amenities(member_id).await?;
                Ok(Some(filters))
            }
            None => Ok(None),
        }
    }

    async fn filters_by_group(&self, group_id: PrimaryKey) -> Result<Vec<MemberFiltersData>> {
        let mut rows = query_as::<_, MemberFiltersData>(
            "SELECT member_filters.* FROM member_filters
                INNER JOIN members ON member_filters.member_id = members.id
             WHERE members.group_id = $1
             ORDER BY member_filters.member_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        for filters in rows.iter_mut() {
            filters.amenity_ids = self.filter_amenities(filters.member_id).await?;
        }

        Ok(rows)
    }

    async fn upsert_filters(&self, filters: NewMemberFilters) -> Result<MemberFiltersData> {
        // Ensure member exists
        let _ = self.member_by_id(filters.member_id).await?;

        query(
            "INSERT INTO member_filters
                (member_id, price_min, price_max, min_bedrooms,
                 min_beds, min_bathrooms, property_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (member_id) DO UPDATE SET
                price_min = EXCLUDED.price_min,
                price_max = EXCLUDED.price_max,
                min_bedrooms = EXCLUDED.min_bedrooms,
                min_beds = EXCLUDED.min_beds,
                min_bathrooms = EXCLUDED.min_bathrooms,
                property_type = EXCLUDED.property_type",
        )
        .bind(filters.member_id)
        .bind(filters.price_min)
        .bind(filters.price_max)
        .bind(filters.min_bedrooms)
        .bind(filters.min_beds)
        .bind(filters.min_bathrooms)
        .bind(&filters.property_type)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        query("DELETE FROM filter_amenities WHERE member_id = $1")
            .bind(filters.member_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        for amenity_id in &filters.amenity_ids {
            query(
                "INSERT INTO filter_amenities (member_id, amenity_id)
                 VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(filters.member_id)
            .bind(amenity_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;
        }

        self.filters_by_member(filters.member_id)
            .await?
            .ok_or(DatabaseError::NotFound {
                resource: "member filters",
                identifier: "member_id",
            })
    }

    async fn upsert_listing(&self, new_listing: NewListing) -> Result<()> {
        let draft = new_listing.draft;

        query(
            "INSERT INTO listings
                (group_id, source_id, destination_id, url, title,
                 price_per_night, price_total, currency, rating, review_count,
                 bedrooms, beds, bathrooms, property_type, latitude, longitude)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                     $11, $12, $13, $14, $15, $16)
             ON CONFLICT (group_id, source_id) DO UPDATE SET
                url = EXCLUDED.url,
                title = COALESCE(EXCLUDED.title, listings.title),
                price_per_night =
                    COALESCE(EXCLUDED.price_per_night, listings.price_per_night),
                price_total = COALESCE(EXCLUDED.price_total, listings.price_total),
                currency = COALESCE(EXCLUDED.currency, listings.currency),
                rating = COALESCE(EXCLUDED.rating, listings.rating),
                review_count = COALESCE(EXCLUDED.review_count, listings.review_count),
                bedrooms = COALESCE(EXCLUDED.bedrooms, listings.bedrooms),
                beds = COALESCE(EXCLUDED.beds, listings.beds),
                bathrooms = COALESCE(EXCLUDED.bathrooms, listings.bathrooms),
                property_type = COALESCE(EXCLUDED.property_type, listings.property_type),
                latitude = COALESCE(EXCLUDED.latitude, listings.latitude),
                longitude = COALESCE(EXCLUDED.longitude, listings.longitude),
                last_seen_at = now()",
        )
        .bind(new_listing.group_id)
        .bind(&draft.source_id)
        .bind(new_listing.destination_id)
        .bind(&draft.url)
        .bind(&draft.title)
        .bind(draft.price_per_night)
        .bind(draft.price_total)
        .bind(&draft.currency)
        .bind(draft.rating)
        .bind(draft.review_count.map(|v| v as i32))
        .bind(draft.bedrooms.map(|v| v as i32))
        .bind(draft.beds.map(|v| v as i32))
        .bind(draft.bathrooms)
        .bind(&draft.property_type)
        .bind(draft.latitude)
        .bind(draft.longitude)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        // An empty image set means the page didn't carry any, not that the
        // listing lost them
        if !draft.images.is_empty() {
            self.replace_images(new_listing.group_id, &draft.source_id, &draft.images)
                .await?;
        }

        Ok(())
    }

    async fn apply_listing_detail(&self, update: ListingDetailUpdate) -> Result<()> {
        let detail = update.detail;

        let result = query(
            "UPDATE listings SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                property_type = COALESCE($5, property_type),
                latitude = COALESCE($6, latitude),
                longitude = COALESCE($7, longitude)
             WHERE group_id = $1 AND source_id = $2",
        )
        .bind(update.group_id)
        .bind(&detail.source_id)
        .bind(&detail.title)
        .bind(&detail.description)
        .bind(&detail.property_type)
        .bind(detail.latitude)
        .bind(detail.longitude)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "listing",
                identifier: "group_id:source_id",
            });
        }

        if !detail.images.is_empty() {
            self.replace_images(update.group_id, &detail.source_id, &detail.images)
                .await?;
        }

        query("DELETE FROM listing_amenities WHERE group_id = $1 AND source_id = $2")
            .bind(update.group_id)
            .bind(&detail.source_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        for amenity in &detail.amenities {
            query(
                "INSERT INTO listing_amenities (group_id, source_id, name, available)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT DO NOTHING",
            )
            .bind(update.group_id)
            .bind(&detail.source_id)
            .bind(&amenity.name)
            .bind(amenity.available)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;
        }

        Ok(())
    }

    async fn listing(&self, group_id: PrimaryKey, source_id: &str) -> Result<ListingData> {
        let row = query_as::<_, ListingRow>(
            "SELECT * FROM listings WHERE group_id = $1 AND source_id = $2",
        )
        .bind(group_id)
        .bind(source_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("listing", "group_id:source_id"))?;

        let (images, amenities) = self.listing_children(group_id, source_id).await?;

        Ok(row.into_data(images, amenities))
    }

    async fn listings_by_group(&self, group_id: PrimaryKey) -> Result<Vec<ListingData>> {
        let rows = query_as::<_, ListingRow>(
            "SELECT * FROM listings
             WHERE group_id = $1
             ORDER BY first_seen_at, source_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let mut listings = Vec::with_capacity(rows.len());

        for row in rows {
            let (images, amenities) = self.listing_children(group_id, &row.source_id).await?;
            listings.push(row.into_data(images, amenities));
        }

        Ok(listings)
    }

    async fn listings_missing_detail(
        &self,
        group_id: PrimaryKey,
        limit: usize,
    ) -> Result<Vec<String>> {
        query_scalar::<_, String>(
            "SELECT source_id FROM listings
             WHERE group_id = $1 AND description IS NULL
             ORDER BY first_seen_at, source_id
             LIMIT $2",
        )
        .bind(group_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn count_listings(&self, group_id: PrimaryKey) -> Result<usize> {
        query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE group_id = $1")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await
            .map(|count| count as usize)
            .map_err(|e| e.any())
    }

    async fn upsert_vote(&self, new_vote: NewVote) -> Result<VoteData> {
        query(
            "INSERT INTO votes (member_id, group_id, source_id, value, reason)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (member_id, group_id, source_id) DO UPDATE SET
                value = EXCLUDED.value,
                reason = EXCLUDED.reason,
                updated_at = now()",
        )
        .bind(new_vote.member_id)
        .bind(new_vote.group_id)
        .bind(&new_vote.source_id)
        .bind(new_vote.value.as_i16())
        .bind(&new_vote.reason)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        query_as::<_, VoteData>(
            "SELECT * FROM votes
             WHERE member_id = $1 AND group_id = $2 AND source_id = $3",
        )
        .bind(new_vote.member_id)
        .bind(new_vote.group_id)
        .bind(&new_vote.source_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn votes_by_group(&self, group_id: PrimaryKey) -> Result<Vec<VoteData>> {
        query_as::<_, VoteData>(
            "SELECT * FROM votes WHERE group_id = $1 ORDER BY member_id, source_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn votes_by_member(&self, member_id: PrimaryKey) -> Result<Vec<VoteData>> {
        query_as::<_, VoteData>("SELECT * FROM votes WHERE member_id = $1 ORDER BY source_id")
            .bind(member_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn progress_by_destination(
        &self,
        destination_id: PrimaryKey,
    ) -> Result<Option<FetchProgressData>> {
        query_as::<_, FetchProgressData>(
            "SELECT * FROM fetch_progress WHERE destination_id = $1",
        )
        .bind(destination_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn progress_by_group(&self, group_id: PrimaryKey) -> Result<Vec<FetchProgressData>> {
        query_as::<_, FetchProgressData>(
            "SELECT * FROM fetch_progress WHERE group_id = $1 ORDER BY destination_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn save_progress(&self, progress: FetchProgressData) -> Result<()> {
        query(
            "INSERT INTO fetch_progress
                (destination_id, group_id, pages_fetched, pages_total,
                 next_page, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (destination_id) DO UPDATE SET
                pages_fetched = EXCLUDED.pages_fetched,
                pages_total = EXCLUDED.pages_total,
                next_page = EXCLUDED.next_page,
                completed_at = EXCLUDED.completed_at",
        )
        .bind(progress.destination_id)
        .bind(progress.group_id)
        .bind(progress.pages_fetched)
        .bind(progress.pages_total)
        .bind(&progress.next_page)
        .bind(progress.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn scoring_weights(&self) -> Result<ScoringWeights> {
        let rows = query_as::<_, (String, i64)>("SELECT key, value FROM scoring_config")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        let mut weights = ScoringWeights::default();

        for (key, value) in rows {
            match key.as_str() {
                "filter_match" => weights.filter_match = value,
                "vote_veto" => weights.vote_veto = value,
                "vote_ok" => weights.vote_ok = value,
                "vote_love" => weights.vote_love = value,
                "vote_super_love" => weights.vote_super_love = value,
                _ => {}
            }
        }

        Ok(weights)
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
