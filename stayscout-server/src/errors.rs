use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use stayscout_collab::{DatabaseError, FetchError, FilterError, GroupError, VoteError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    Rejected(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Conflict {
                resource: _,
                field: _,
                value: _,
            } => StatusCode::CONFLICT,
            Self::NotFound {
                resource: _,
                identifier: _,
            } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<GroupError> for ServerError {
    fn from(value: GroupError) -> Self {
        match value {
            GroupError::Db(e) => e.into(),
            e => Self::Rejected(e.to_string()),
        }
    }
}

impl From<VoteError> for ServerError {
    fn from(value: VoteError) -> Self {
        match value {
            VoteError::Db(e) => e.into(),
            e => Self::Rejected(e.to_string()),
        }
    }
}

impl From<FilterError> for ServerError {
    fn from(value: FilterError) -> Self {
        match value {
            FilterError::Db(e) => e.into(),
            e => Self::Rejected(e.to_string()),
        }
    }
}

impl From<FetchError> for ServerError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Database(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}
