use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewGroupSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub adults: i32,
    #[serde(default)]
    pub children: i32,
    #[serde(default)]
    pub infants: i32,
    #[serde(default)]
    pub pets: i32,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub price_min: Option<i32>,
    pub price_max: Option<i32>,
    #[validate(length(min = 1))]
    pub destinations: Vec<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewMemberSchema {
    #[validate(length(min = 1, max = 64))]
    pub nickname: String,
    #[validate(length(max = 256))]
    pub avatar: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteSchema {
    #[validate(length(min = 1, max = 64))]
    pub source_id: String,
    /// 0 is veto, 1 is ok, 2 is love, 3 is super love
    pub value: i16,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FiltersSchema {
    pub price_min: Option<i32>,
    pub price_max: Option<i32>,
    pub min_bedrooms: Option<i32>,
    pub min_beds: Option<i32>,
    pub min_bathrooms: Option<i32>,
    #[validate(length(max = 64))]
    pub property_type: Option<String>,
    #[serde(default)]
    pub amenity_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TriggerFetchQuery {
    /// Restart runs from the first page even if they already completed
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct NextQuery {
    /// Comma-separated source ids the client already shows
    pub exclude: Option<String>,
    /// How many listings to return, defaults to one
    pub count: Option<usize>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
