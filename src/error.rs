// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::token::TokenError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// What a caller of the addon endpoints can see. Site-level failures never
/// surface here; they only shrink the result list.
#[derive(Debug, Error)]
pub enum AddonError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported content type '{0}'")]
    UnsupportedType(String),
    #[error("invalid configuration token: {0}")]
    BadToken(#[from] TokenError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AddonError {
    pub fn status(&self) -> StatusCode {
        match self {
            AddonError::NotFound(_) | AddonError::UnsupportedType(_) => StatusCode::NOT_FOUND,
            AddonError::BadToken(_) | AddonError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AddonError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AddonError {
    fn into_response(self) -> Response {
        if let AddonError::Internal(e) = &self {
            error!("Internal error: {:#}", e);
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type AddonResult<T> = Result<T, AddonError>;
