use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::TransportError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Upstream response did not have the expected shape: {0}")]
    UnexpectedShape(String),

    #[error("Listing was not found upstream")]
    NotFound,
}

/// An opaque pagination cursor handed back by the upstream site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// The search a destination run asks the source to perform
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Free-text location, as the destination names it
    pub location: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,

    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub pets: u32,

    /// Nightly price bounds, when the group carries them
    pub price_min: Option<u32>,
    pub price_max: Option<u32>,

    /// Broadening hints from the member whose filter save kicked the run.
    /// Filters are evaluated per member downstream, so these only shape the
    /// search, they never exclude listings on their own.
    pub min_bedrooms: Option<u32>,
    pub min_beds: Option<u32>,
    pub min_bathrooms: Option<u32>,
    pub amenity_ids: Vec<u32>,
}

/// A normalized listing record before persistence.
/// Everything upstream is allowed to omit is optional here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingDraft {
    pub source_id: String,
    pub url: String,

    pub title: Option<String>,
    pub price_per_night: Option<f64>,
    pub price_total: Option<f64>,
    pub currency: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub bedrooms: Option<u32>,
    pub beds: Option<u32>,
    pub bathrooms: Option<f64>,
    pub property_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub images: Vec<String>,
}

/// One amenity as reported by a listing's detail page
#[derive(Debug, Clone, PartialEq)]
pub struct AmenityDraft {
    pub name: String,
    pub available: bool,
}

/// The full record a detail page yields for one listing
#[derive(Debug, Clone, Default)]
pub struct ListingDetail {
    pub source_id: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub images: Vec<String>,
    pub amenities: Vec<AmenityDraft>,
}

/// One fetched page of search results
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub drafts: Vec<ListingDraft>,
    /// The cursor for the page after this one, if upstream reports one
    pub next_page: Option<PageToken>,
    /// How many records on the page could not be normalized and were skipped
    pub skipped: usize,
}

impl SearchPage {
    pub fn has_next(&self) -> bool {
        self.next_page.is_some()
    }
}

/// Represents an upstream listings site the pipeline can fetch from
#[async_trait]
pub trait ListingSource: Send + Sync + 'static {
    /// The name of the site, used for logging
    fn name(&self) -> &'static str;

    /// Fetches one page of search results.
    /// A malformed record is skipped and counted, never an error for the page.
    async fn search(
        &self,
        query: &SearchQuery,
        page: Option<&PageToken>,
    ) -> Result<SearchPage, SourceError>;

    /// Fetches the full detail record of a single listing.
    async fn detail(&self, source_id: &str) -> Result<ListingDetail, SourceError>;
}
