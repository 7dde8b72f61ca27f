//! API Routes
//!
//! Route handlers organized by functionality.

pub mod health;
pub mod metrics;
pub mod rooms;

use std::time::Duration;

use super::error::ApiError;
use super::state::AppState;
use crate::hub::RegistrySnapshot;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(1);

/// Ask the hub for a snapshot, giving up after a second
async fn hub_snapshot(state: &AppState) -> Result<RegistrySnapshot, ApiError> {
    match tokio::time::timeout(SNAPSHOT_TIMEOUT, state.hub.snapshot()).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ApiError::ServiceUnavailable(
            "hub did not answer in time".to_string(),
        )),
    }
}
