//! Data Transfer Objects
//!
//! Response types for the API endpoints, serialized to JSON.

use serde::Serialize;

use crate::fanout::BridgeStatus;
use crate::hub::{HubStatsSnapshot, RegistrySnapshot};
use crate::presence::RoomPresence;

// ============================================
// ROOM DTOs
// ============================================

/// One room on this instance
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoomSummary {
    pub name: String,
    pub members: usize,
}

/// Room listing
#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    /// Rooms with members on this instance
    pub rooms: Vec<RoomSummary>,
    /// Connections registered on this instance
    pub clients: usize,
    /// Rooms active across all instances, when presence is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<Vec<RoomPresence>>,
}

impl RoomsResponse {
    pub fn from_snapshot(snapshot: RegistrySnapshot, presence: Option<Vec<RoomPresence>>) -> Self {
        Self {
            rooms: snapshot
                .rooms
                .into_iter()
                .map(|(name, members)| RoomSummary { name, members })
                .collect(),
            clients: snapshot.clients,
            presence,
        }
    }
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,
    pub hub: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub instance_id: String,
    pub stats: HubStatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeStatus>,
}
