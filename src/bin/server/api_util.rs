use crate::state_actor::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{error::Error, fmt::Display};
use upwatch::sla::InvalidWindowError;

#[derive(Debug, Clone, Copy)]
pub enum ApiError {
    Store(StoreError),
    InvalidWindow(InvalidWindowError),
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<InvalidWindowError> for ApiError {
    fn from(value: InvalidWindowError) -> Self {
        Self::InvalidWindow(value)
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => e.fmt(f),
            Self::InvalidWindow(e) => e.fmt(f),
        }
    }
}

impl Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Conflict) => StatusCode::CONFLICT,
            Self::InvalidWindow(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}
