//! Binary frame snapshots of the vehicle set

use serde::{Deserialize, Serialize};

use crate::traffic::vehicle::VehicleSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Every live vehicle after a tick, in id order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub vehicles: Vec<VehicleSnapshot>,
}

impl FrameSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let (snapshot, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(snapshot)
    }
}
