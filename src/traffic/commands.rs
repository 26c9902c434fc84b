//! Deferred structural changes
//!
//! Parallel stages only record creates and destroys. The owner flushes the
//! buffer once per tick, outside any parallel region, in a fixed order: destroys
//! by ascending id, then creates by ascending spawner index.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::traffic::road::RoadNetwork;
use crate::traffic::vehicle::{Vehicle, VehicleSpawn};

#[derive(Debug, Clone)]
pub enum TrafficCommand {
    Create { spawner: usize, spawn: VehicleSpawn },
    Destroy(u32),
}

/// Counts of what a flush actually applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    pub created: usize,
    pub destroyed: usize,
    /// Creates dropped by the vehicle budget or a same-tick lane clash
    pub rejected: usize,
}

/// Command buffer shared by the parallel stages of one tick
#[derive(Debug)]
pub struct CommandBuffer {
    sender: Sender<TrafficCommand>,
    receiver: Receiver<TrafficCommand>,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    #[inline]
    pub fn record(&self, command: TrafficCommand) {
        // The receiver lives as long as self, so this can't fail
        let _ = self.sender.send(command);
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Apply every recorded command to the vehicle list.
    ///
    /// `vehicles` stays sorted by id: new ids come from `next_id`, which only
    /// grows. At most `max_cars` vehicles are live after the flush.
    pub fn flush(
        &self,
        vehicles: &mut Vec<Vehicle>,
        roads: &RoadNetwork,
        next_id: &mut u32,
        max_cars: usize,
    ) -> FlushResult {
        let mut destroys = Vec::new();
        let mut creates = Vec::new();
        for command in self.receiver.try_iter() {
            match command {
                TrafficCommand::Destroy(id) => destroys.push(id),
                TrafficCommand::Create { spawner, spawn } => creates.push((spawner, spawn)),
            }
        }

        let mut result = FlushResult::default();

        if !destroys.is_empty() {
            destroys.sort_unstable();
            destroys.dedup();
            let before = vehicles.len();
            vehicles.retain(|v| destroys.binary_search(&v.id).is_err());
            result.destroyed = before - vehicles.len();
        }

        creates.sort_by_key(|(spawner, _)| *spawner);
        let mut claimed: Vec<(usize, usize)> = Vec::with_capacity(creates.len());
        for (_, spawn) in creates {
            let entry = (spawn.segment, spawn.lane);
            if vehicles.len() >= max_cars || claimed.contains(&entry) {
                result.rejected += 1;
                continue;
            }
            claimed.push(entry);
            vehicles.push(Vehicle::new(*next_id, &spawn, roads));
            *next_id += 1;
            result.created += 1;
        }

        if result.created > 0 || result.destroyed > 0 {
            tracing::trace!(
                created = result.created,
                destroyed = result.destroyed,
                rejected = result.rejected,
                live = vehicles.len(),
                "Flushed traffic commands"
            );
        }

        result
    }
}
