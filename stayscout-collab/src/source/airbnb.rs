use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use stayscout_core::{
    AmenityDraft, ListingDetail, ListingDraft, ListingSource, PageToken, SearchPage, SearchQuery,
    SourceError, Transport,
};
use url::Url;

const SEARCH_BASE: &str = "https://www.airbnb.ch/s/homes";
const ROOMS_BASE: &str = "https://www.airbnb.ch/rooms";

lazy_static! {
    /// Both search and detail pages embed their state as JSON in this tag
    static ref STATE_SCRIPT: Selector =
        Selector::parse("script#data-deferred-state-0").unwrap();
    /// Localized rating text, like "4.85 (20)"
    static ref RATING_REGEX: Regex = Regex::new(r"(\d+\.?\d*)\s*\((\d+)\)?").unwrap();
    /// A number in localized price text, group separators included
    static ref PRICE_REGEX: Regex = Regex::new(r"\d[\d'’.,]*").unwrap();
    /// A currency code in localized price text
    static ref CURRENCY_REGEX: Regex = Regex::new(r"[A-Z]{2,3}").unwrap();
}

/// Searches and listing details scraped from Airbnb's public pages
pub struct AirbnbSource {
    transport: Arc<Transport>,
}

impl AirbnbSource {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ListingSource for AirbnbSource {
    fn name(&self) -> &'static str {
        "airbnb"
    }

    async fn search(
        &self,
        query: &SearchQuery,
        page: Option<&PageToken>,
    ) -> Result<SearchPage, SourceError> {
        let url = build_search_url(query, page);
        let body = self.transport.fetch(&url).await?;

        parse_search_page(&body)
    }

    async fn detail(&self, source_id: &str) -> Result<ListingDetail, SourceError> {
        let url = Url::parse(&format!("{}/{}", ROOMS_BASE, source_id))
            .map_err(|e| SourceError::UnexpectedShape(format!("id does not form a url: {}", e)))?;

        let body = self.transport.fetch(&url).await?;

        parse_detail_page(source_id, &body)
    }
}

fn build_search_url(query: &SearchQuery, page: Option<&PageToken>) -> Url {
    let mut url = Url::parse(SEARCH_BASE).expect("base url is valid");
    let nights = (query.check_out - query.check_in).num_days();

    {
        let mut pairs = url.query_pairs_mut();

        pairs
            .append_pair("refinement_paths[]", "/homes")
            .append_pair("date_picker_type", "calendar")
            .append_pair("checkin", &query.check_in.format("%Y-%m-%d").to_string())
            .append_pair("checkout", &query.check_out.format("%Y-%m-%d").to_string())
            .append_pair("adults", &query.adults.to_string())
            .append_pair("children", &query.children.to_string())
            .append_pair("infants", &query.infants.to_string())
            .append_pair("pets", &query.pets.to_string())
            .append_pair("query", &sanitize_location(&query.location));

        // The site expects every active filter mirrored in this ordered list
        let mut filter_order: Vec<String> = Vec::new();

        if query.price_min.is_some() || query.price_max.is_some() {
            pairs
                .append_pair("price_filter_input_type", "2")
                .append_pair("channel", "EXPLORE");

            if nights > 0 {
                pairs.append_pair("price_filter_num_nights", &nights.to_string());
            }

            if let Some(min) = query.price_min {
                pairs.append_pair("price_min", &min.to_string());
                filter_order.push(format!("price_min:{}", min));
            }

            if let Some(max) = query.price_max {
                pairs.append_pair("price_max", &max.to_string());
                filter_order.push(format!("price_max:{}", max));
            }
        }

        for amenity in &query.amenity_ids {
            pairs.append_pair("amenities[]", &amenity.to_string());
            filter_order.push(format!("amenities:{}", amenity));
        }

        if let Some(bedrooms) = query.min_bedrooms {
            pairs.append_pair("min_bedrooms", &bedrooms.to_string());
            filter_order.push(format!("min_bedrooms:{}", bedrooms));
        }

        if let Some(beds) = query.min_beds {
            pairs.append_pair("min_beds", &beds.to_string());
            filter_order.push(format!("min_beds:{}", beds));
        }

        if let Some(bathrooms) = query.min_bathrooms {
            pairs.append_pair("min_bathrooms", &bathrooms.to_string());
            filter_order.push(format!("min_bathrooms:{}", bathrooms));
        }

        if filter_order.is_empty() {
            pairs.append_pair("search_type", "search_query");
        } else {
            let update = if filter_order.len() > 1 {
                "true"
            } else {
                "false"
            };

            pairs
                .append_pair("search_type", "filter_change")
                .append_pair("search_mode", "regular_search")
                .append_pair("update_selected_filters", update);

            for entry in &filter_order {
                pairs.append_pair("selected_filter_order[]", entry);
            }
        }

        if let Some(token) = page {
            pairs
                .append_pair("pagination_search", "true")
                .append_pair("cursor", &token.0);
        }
    }

    url
}

/// The search endpoint mangles umlauts, so they are transliterated
fn sanitize_location(location: &str) -> String {
    let mut sanitized = String::with_capacity(location.len());

    for c in location.chars() {
        match c {
            'ä' => sanitized.push('a'),
            'Ä' => sanitized.push('A'),
            'ö' => sanitized.push('o'),
            'Ö' => sanitized.push('O'),
            'ü' => sanitized.push('u'),
            'Ü' => sanitized.push('U'),
            'ß' => sanitized.push_str("ss"),
            other => sanitized.push(other),
        }
    }

    sanitized
}

fn extract_state_json(body: &str) -> Result<Value, SourceError> {
    let document = Html::parse_document(body);

    let script = document
        .select(&STATE_SCRIPT)
        .next()
        .ok_or_else(|| SourceError::UnexpectedShape("state script tag is missing".to_string()))?;

    let text: String = script.text().collect();

    serde_json::from_str(&text)
        .map_err(|e| SourceError::UnexpectedShape(format!("state is not valid json: {}", e)))
}

fn parse_search_page(body: &str) -> Result<SearchPage, SourceError> {
    let state = extract_state_json(body)?;

    let entries = state
        .get("niobeClientData")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::UnexpectedShape("niobeClientData is missing".to_string()))?;

    // The client cache holds one entry per query the page ran. Only one of
    // them carries stay results, the rest are empty shells.
    let mut records: &[Value] = &[];
    let mut next_page = None;
    let mut saw_results = false;

    for entry in entries {
        let results = entry
            .get(1)
            .and_then(|v| v.get("data"))
            .and_then(|v| v.get("presentation"))
            .and_then(|v| v.get("staysSearch"))
            .and_then(|v| v.get("results"));

        let results = match results {
            Some(results) => results,
            None => continue,
        };

        saw_results = true;

        next_page = results
            .get("paginationInfo")
            .and_then(|v| v.get("nextPageCursor"))
            .and_then(Value::as_str)
            .map(|cursor| PageToken(cursor.to_string()));

        if let Some(found) = results.get("searchResults").and_then(Value::as_array) {
            if !found.is_empty() {
                records = found;
                break;
            }
        }
    }

    if !saw_results {
        return Err(SourceError::UnexpectedShape(
            "no stay results in state".to_string(),
        ));
    }

    let mut drafts = Vec::new();
    let mut skipped = 0;

    for record in records {
        if record.get("__typename").and_then(Value::as_str) != Some("StaySearchResult") {
            continue;
        }

        match serde_json::from_value::<SearchResultRecord>(record.clone()) {
            Ok(parsed) => match parsed.into_draft() {
                Some(draft) => drafts.push(draft),
                None => skipped += 1,
            },
            Err(_) => skipped += 1,
        }
    }

    Ok(SearchPage {
        drafts,
        next_page,
        skipped,
    })
}

fn parse_detail_page(source_id: &str, body: &str) -> Result<ListingDetail, SourceError> {
    let state = extract_state_json(body)?;

    let entries = state
        .get("niobeClientData")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::UnexpectedShape("niobeClientData is missing".to_string()))?;

    let pdp = entries
        .iter()
        .find_map(|entry| {
            entry
                .get(1)
                .and_then(|v| v.get("data"))
                .and_then(|v| v.get("presentation"))
                .and_then(|v| v.get("stayProductDetailPage"))
        })
        // A page that renders without detail data means the listing is gone
        .ok_or(SourceError::NotFound)?;

    let sections = pdp
        .get("sections")
        .and_then(|v| v.get("sections"))
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::UnexpectedShape("detail sections are missing".to_string()))?;

    let mut detail = ListingDetail {
        source_id: source_id.to_string(),
        ..Default::default()
    };

    for section in sections {
        let id = section
            .get("sectionId")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let data = match section.get("section") {
            Some(data) if !data.is_null() => data,
            _ => continue,
        };

        match id {
            "TITLE_DEFAULT" => {
                detail.title = string_at(data, &["title"]);
                detail.property_type = string_at(data, &["sharingConfig", "propertyType"]);
            }
            "DESCRIPTION_DEFAULT" => {
                detail.description = string_at(data, &["htmlDescription", "htmlText"]);
            }
            "PHOTO_TOUR_SCROLLABLE_MODAL" => {
                if let Some(items) = data.get("mediaItems").and_then(Value::as_array) {
                    detail.images = items
                        .iter()
                        .filter_map(|item| item.get("baseUrl").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect();
                }
            }
            "AMENITIES_DEFAULT" => {
                detail.amenities = parse_amenity_groups(data);
            }
            "LOCATION_DEFAULT" => {
                detail.latitude = data.get("lat").and_then(Value::as_f64);
                detail.longitude = data.get("lng").and_then(Value::as_f64);
            }
            _ => {}
        }
    }

    Ok(detail)
}

fn parse_amenity_groups(data: &Value) -> Vec<AmenityDraft> {
    let groups = match data.get("seeAllAmenitiesGroups").and_then(Value::as_array) {
        Some(groups) => groups,
        None => return Vec::new(),
    };

    let mut amenities = Vec::new();

    for group in groups {
        let items = match group.get("amenities").and_then(Value::as_array) {
            Some(items) => items,
            None => continue,
        };

        for item in items {
            if let Some(name) = item.get("title").and_then(Value::as_str) {
                amenities.push(AmenityDraft {
                    name: name.to_string(),
                    available: item
                        .get("available")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                });
            }
        }
    }

    amenities
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;

    for key in path {
        current = current.get(key)?;
    }

    current.as_str().map(str::to_string)
}

/// One stay record inside the embedded search state
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultRecord {
    demand_stay_listing: Option<DemandStayListing>,
    name_localized: Option<NameLocalized>,
    listing: Option<ListingSummary>,
    structured_display_price: Option<StructuredDisplayPrice>,
    avg_rating_localized: Option<String>,
    #[serde(default)]
    contextual_pictures: Vec<ContextualPicture>,
}

#[derive(Debug, Deserialize)]
struct DemandStayListing {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameLocalized {
    localized_string_with_translation_preference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingSummary {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredDisplayPrice {
    primary_line: Option<PrimaryPriceLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryPriceLine {
    price: Option<String>,
    discounted_price: Option<String>,
    accessibility_label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContextualPicture {
    picture: Option<String>,
}

impl SearchResultRecord {
    /// A record without a usable id cannot be keyed and yields nothing
    fn into_draft(self) -> Option<ListingDraft> {
        let encoded = self.demand_stay_listing.and_then(|listing| listing.id)?;
        let source_id = decode_listing_id(&encoded);

        let title = self
            .name_localized
            .and_then(|name| name.localized_string_with_translation_preference)
            .or_else(|| self.listing.and_then(|listing| listing.name));

        let line = self
            .structured_display_price
            .and_then(|price| price.primary_line);

        let (price_text, total_label) = match line {
            Some(line) => (line.price.or(line.discounted_price), line.accessibility_label),
            None => (None, None),
        };

        let currency = price_text.as_deref().and_then(parse_currency);
        let price_per_night = price_text.as_deref().and_then(parse_price_text);
        let price_total = total_label.as_deref().and_then(parse_total_price);

        let (rating, review_count) = self
            .avg_rating_localized
            .as_deref()
            .map(parse_rating)
            .unwrap_or((None, None));

        let images = self
            .contextual_pictures
            .into_iter()
            .filter_map(|contextual| contextual.picture)
            .collect();

        Some(ListingDraft {
            url: format!("{}/{}", ROOMS_BASE, source_id),
            source_id,
            title,
            price_per_night,
            price_total,
            currency,
            rating,
            review_count,
            images,
            ..Default::default()
        })
    }
}

/// Ids come base64 encoded as "StayListing:<id>".
/// A value that does not decode is kept as-is.
fn decode_listing_id(encoded: &str) -> String {
    STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| text.rsplit(':').next().map(str::to_string))
        .unwrap_or_else(|| encoded.to_string())
}

/// Unrated listings read "N/A", "New" or "Neu" and yield nothing
fn parse_rating(text: &str) -> (Option<f64>, Option<u32>) {
    let trimmed = text.trim();

    if trimmed.is_empty() || matches!(trimmed, "N/A" | "New" | "Neu") {
        return (None, None);
    }

    if let Some(captures) = RATING_REGEX.captures(trimmed) {
        let rating = captures.get(1).and_then(|m| m.as_str().parse().ok());
        let count = captures.get(2).and_then(|m| m.as_str().parse().ok());

        return (rating, count);
    }

    (trimmed.parse().ok(), None)
}

fn parse_price_text(text: &str) -> Option<f64> {
    PRICE_REGEX.find(text).and_then(|m| parse_amount(m.as_str()))
}

/// The accessibility label spells out the stay total after the nightly
/// rate, so the last number in it is the one that matters
fn parse_total_price(label: &str) -> Option<f64> {
    PRICE_REGEX
        .find_iter(label)
        .last()
        .and_then(|m| parse_amount(m.as_str()))
}

fn parse_currency(text: &str) -> Option<String> {
    CURRENCY_REGEX.find(text).map(|m| m.as_str().to_string())
}

fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    const SEARCH_FIXTURE: &str = r#"<html><body><script id="data-deferred-state-0">{
        "niobeClientData": [
            ["StaysSearch.metadata", {"data": {"presentation": {}}}],
            ["StaysSearch.results", {"data": {"presentation": {"staysSearch": {"results": {
                "searchResults": [
                    {
                        "__typename": "StaySearchResult",
                        "demandStayListing": {"id": "U3RheUxpc3Rpbmc6MTIzNDU="},
                        "nameLocalized": {"localizedStringWithTranslationPreference": "Chalet am See"},
                        "structuredDisplayPrice": {"primaryLine": {
                            "price": "CHF 1'208",
                            "accessibilityLabel": "CHF 1'411 total"
                        }},
                        "avgRatingLocalized": "4.85 (20)",
                        "contextualPictures": [
                            {"picture": "https://img.example.com/a.jpg"},
                            {"picture": "https://img.example.com/b.jpg"}
                        ]
                    },
                    {
                        "__typename": "StaySearchResult",
                        "demandStayListing": {"id": "U3RheUxpc3Rpbmc6Njc4OTA="},
                        "listing": {"name": "Studio Zentrum"},
                        "structuredDisplayPrice": {"primaryLine": {"discountedPrice": "CHF 95"}},
                        "avgRatingLocalized": "Neu",
                        "contextualPictures": []
                    },
                    {
                        "__typename": "StaySearchResult",
                        "nameLocalized": {"localizedStringWithTranslationPreference": "No id at all"}
                    },
                    {"__typename": "StaysSearchSectionWrapper"}
                ],
                "paginationInfo": {"nextPageCursor": "eyJvZmZzZXQiOjE4fQ=="}
            }}}}}]
        ]
    }</script></body></html>"#;

    const DETAIL_FIXTURE: &str = r#"<html><body><script id="data-deferred-state-0">{
        "niobeClientData": [
            ["StaysPdpSections", {"data": {"presentation": {"stayProductDetailPage": {"sections": {"sections": [
                {"sectionId": "TITLE_DEFAULT", "section": {
                    "title": "Chalet am See",
                    "sharingConfig": {"propertyType": "Entire cabin"}
                }},
                {"sectionId": "DESCRIPTION_DEFAULT", "section": {
                    "htmlDescription": {"htmlText": "Cozy cabin right by the lake."}
                }},
                {"sectionId": "PHOTO_TOUR_SCROLLABLE_MODAL", "section": {
                    "mediaItems": [
                        {"baseUrl": "https://img.example.com/1.jpg"},
                        {"baseUrl": "https://img.example.com/2.jpg"}
                    ]
                }},
                {"sectionId": "AMENITIES_DEFAULT", "section": {
                    "seeAllAmenitiesGroups": [
                        {"title": "Essentials", "amenities": [
                            {"title": "Wifi", "available": true},
                            {"title": "Washer", "available": false}
                        ]},
                        {"title": "Outdoors", "amenities": [
                            {"title": "BBQ grill", "available": true}
                        ]}
                    ]
                }},
                {"sectionId": "LOCATION_DEFAULT", "section": {
                    "subtitle": "Brienz, Switzerland",
                    "lat": 46.75,
                    "lng": 8.03
                }},
                {"sectionId": "REVIEWS_DEFAULT", "section": null},
                {"sectionId": "MEET_YOUR_HOST", "section": {"cardData": {"name": "Anna"}}}
            ]}}}}}]
        ]
    }</script></body></html>"#;

    fn query() -> SearchQuery {
        SearchQuery {
            location: "Zürich".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 7, 10).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 7, 17).unwrap(),
            adults: 4,
            children: 1,
            infants: 0,
            pets: 0,
            price_min: None,
            price_max: None,
            min_bedrooms: None,
            min_beds: None,
            min_bathrooms: None,
            amenity_ids: vec![],
        }
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    fn query_values(url: &Url, key: &str) -> Vec<String> {
        url.query_pairs()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
            .collect()
    }

    #[test]
    fn search_urls_carry_dates_party_and_location() {
        let url = build_search_url(&query(), None);

        assert_eq!(query_value(&url, "checkin").as_deref(), Some("2026-07-10"));
        assert_eq!(query_value(&url, "checkout").as_deref(), Some("2026-07-17"));
        assert_eq!(query_value(&url, "adults").as_deref(), Some("4"));
        assert_eq!(query_value(&url, "children").as_deref(), Some("1"));
        assert_eq!(query_value(&url, "query").as_deref(), Some("Zurich"));
        assert_eq!(
            query_value(&url, "search_type").as_deref(),
            Some("search_query")
        );
        assert_eq!(query_value(&url, "cursor"), None);
    }

    #[test]
    fn filters_switch_the_url_into_filter_change_mode() {
        let query = SearchQuery {
            price_min: Some(100),
            price_max: Some(300),
            min_bedrooms: Some(2),
            amenity_ids: vec![4, 8],
            ..query()
        };

        let url = build_search_url(&query, None);

        assert_eq!(
            query_value(&url, "search_type").as_deref(),
            Some("filter_change")
        );
        assert_eq!(
            query_value(&url, "search_mode").as_deref(),
            Some("regular_search")
        );
        assert_eq!(
            query_value(&url, "update_selected_filters").as_deref(),
            Some("true")
        );
        assert_eq!(
            query_value(&url, "price_filter_num_nights").as_deref(),
            Some("7")
        );
        assert_eq!(query_values(&url, "amenities[]"), vec!["4", "8"]);
        assert_eq!(
            query_values(&url, "selected_filter_order[]"),
            vec![
                "price_min:100",
                "price_max:300",
                "amenities:4",
                "amenities:8",
                "min_bedrooms:2"
            ]
        );
    }

    #[test]
    fn a_single_filter_does_not_update_selected_filters() {
        let query = SearchQuery {
            min_beds: Some(3),
            ..query()
        };

        let url = build_search_url(&query, None);

        assert_eq!(
            query_value(&url, "update_selected_filters").as_deref(),
            Some("false")
        );
        assert_eq!(
            query_values(&url, "selected_filter_order[]"),
            vec!["min_beds:3"]
        );
    }

    #[test]
    fn the_cursor_rides_along_on_follow_up_pages() {
        let token = PageToken("eyJvZmZzZXQiOjE4fQ==".to_string());
        let url = build_search_url(&query(), Some(&token));

        assert_eq!(
            query_value(&url, "pagination_search").as_deref(),
            Some("true")
        );
        assert_eq!(
            query_value(&url, "cursor").as_deref(),
            Some("eyJvZmZzZXQiOjE4fQ==")
        );
    }

    #[test]
    fn search_results_parse_into_drafts() {
        let page = parse_search_page(SEARCH_FIXTURE).expect("fixture parses");

        assert_eq!(page.drafts.len(), 2);
        assert_eq!(page.skipped, 1);
        assert_eq!(
            page.next_page,
            Some(PageToken("eyJvZmZzZXQiOjE4fQ==".to_string()))
        );

        let first = &page.drafts[0];
        assert_eq!(first.source_id, "12345");
        assert_eq!(first.url, "https://www.airbnb.ch/rooms/12345");
        assert_eq!(first.title.as_deref(), Some("Chalet am See"));
        assert_eq!(first.price_per_night, Some(1208.0));
        assert_eq!(first.price_total, Some(1411.0));
        assert_eq!(first.currency.as_deref(), Some("CHF"));
        assert_eq!(first.rating, Some(4.85));
        assert_eq!(first.review_count, Some(20));
        assert_eq!(first.images.len(), 2);
    }

    #[test]
    fn unrated_listings_fall_back_to_the_plain_name() {
        let page = parse_search_page(SEARCH_FIXTURE).expect("fixture parses");

        let second = &page.drafts[1];
        assert_eq!(second.source_id, "67890");
        assert_eq!(second.title.as_deref(), Some("Studio Zentrum"));
        assert_eq!(second.price_per_night, Some(95.0));
        assert_eq!(second.rating, None);
        assert_eq!(second.review_count, None);
    }

    #[test]
    fn a_page_with_no_results_ends_pagination() {
        let body = r#"<html><body><script id="data-deferred-state-0">{
            "niobeClientData": [
                ["StaysSearch.results", {"data": {"presentation": {"staysSearch": {"results": {
                    "searchResults": [],
                    "paginationInfo": {}
                }}}}}]
            ]
        }</script></body></html>"#;

        let page = parse_search_page(body).expect("empty page parses");

        assert!(page.drafts.is_empty());
        assert_eq!(page.next_page, None);
        assert_eq!(page.skipped, 0);
    }

    #[test]
    fn a_page_without_the_state_script_is_an_error() {
        let result = parse_search_page("<html><body>nothing here</body></html>");

        assert!(matches!(result, Err(SourceError::UnexpectedShape(_))));
    }

    #[test]
    fn detail_pages_parse_sections() {
        let detail = parse_detail_page("12345", DETAIL_FIXTURE).expect("fixture parses");

        assert_eq!(detail.source_id, "12345");
        assert_eq!(detail.title.as_deref(), Some("Chalet am See"));
        assert_eq!(detail.property_type.as_deref(), Some("Entire cabin"));
        assert_eq!(
            detail.description.as_deref(),
            Some("Cozy cabin right by the lake.")
        );
        assert_eq!(detail.images.len(), 2);
        assert_eq!(detail.latitude, Some(46.75));
        assert_eq!(detail.longitude, Some(8.03));

        assert_eq!(detail.amenities.len(), 3);
        assert_eq!(detail.amenities[0].name, "Wifi");
        assert!(detail.amenities[0].available);
        assert_eq!(detail.amenities[1].name, "Washer");
        assert!(!detail.amenities[1].available);
    }

    #[test]
    fn a_page_without_detail_data_reads_as_not_found() {
        let body = r#"<html><body><script id="data-deferred-state-0">{
            "niobeClientData": [["Other", {"data": {"presentation": {}}}]]
        }</script></body></html>"#;

        let result = parse_detail_page("12345", body);

        assert!(matches!(result, Err(SourceError::NotFound)));
    }

    #[test]
    fn ids_decode_from_their_base64_wrapper() {
        assert_eq!(decode_listing_id("U3RheUxpc3Rpbmc6MTIzNDU="), "12345");
        assert_eq!(decode_listing_id("not base64 at all"), "not base64 at all");
    }

    #[test]
    fn ratings_parse_from_localized_text() {
        assert_eq!(parse_rating("4.85 (20)"), (Some(4.85), Some(20)));
        assert_eq!(parse_rating("5.0 (3)"), (Some(5.0), Some(3)));
        assert_eq!(parse_rating("4.5"), (Some(4.5), None));
        assert_eq!(parse_rating("N/A"), (None, None));
        assert_eq!(parse_rating("Neu"), (None, None));
        assert_eq!(parse_rating("New"), (None, None));
    }

    #[test]
    fn prices_parse_from_localized_text() {
        assert_eq!(parse_price_text("CHF 1'208"), Some(1208.0));
        assert_eq!(parse_price_text("CHF 95"), Some(95.0));
        assert_eq!(parse_price_text("N/A"), None);
        assert_eq!(
            parse_total_price("CHF 141 per night, CHF 1'411 total"),
            Some(1411.0)
        );
        assert_eq!(parse_currency("CHF 95"), Some("CHF".to_string()));
        assert_eq!(parse_currency("95"), None);
    }

    #[test]
    fn umlauts_are_transliterated_for_the_query() {
        assert_eq!(sanitize_location("Zürich"), "Zurich");
        assert_eq!(sanitize_location("Müllheim an der Straße"), "Mullheim an der Strasse");
        assert_eq!(sanitize_location("Génève"), "Génève");
    }
}
