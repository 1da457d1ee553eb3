use std::time::Duration;

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::APIResponse;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by the item store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("producto {0} not found")]
    NotFound(i64),

    #[error("{0}")]
    Validation(String),

    #[error("database error")]
    Unavailable(#[from] libsql::Error),

    #[error("timed out after {0:?} waiting for a database connection")]
    PoolTimeout(Duration),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("statement returned no row: {0}")]
    MissingRow(&'static str),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}

/// A batch that could not be applied. Nothing from the batch was persisted.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync failed at item {index}")]
    Item {
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("sync failed")]
    Transaction(#[source] StoreError),
}

impl SyncError {
    pub fn store_error(&self) -> &StoreError {
        match self {
            SyncError::Item { source, .. } => source,
            SyncError::Transaction(source) => source,
        }
    }

    /// Position of the offending item, when the fault came from applying one.
    pub fn index(&self) -> Option<usize> {
        match self {
            SyncError::Item { index, .. } => Some(*index),
            SyncError::Transaction(_) => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        SyncError::Transaction(error)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::BadRequest(msg) => crate::bad_request(APIResponse::error(msg)),
            ApiError::Store(StoreError::Validation(msg)) => crate::bad_request(APIResponse::error(msg)),
            ApiError::Store(StoreError::NotFound(_)) => crate::not_found(APIResponse::error("Producto no encontrado")),
            _ => {
                let msg = crate::unpack_error(&self);
                tracing::error!(error = %msg, "request failed");
                crate::server_error(APIResponse::error(&msg))
            }
        }
    }
}
