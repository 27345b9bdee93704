pub use std::sync::Arc;

pub(crate) use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

pub(crate) use crate::protocol::{ApiResponse, CameraSummary, HubStatus};
pub(crate) use crate::server::AppState;
pub(crate) use tracing::{debug, instrument};
