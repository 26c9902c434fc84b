pub mod commands;
pub mod constants;
pub mod occupancy;
pub mod road;
pub mod simulation;
pub mod snapshot;
pub mod spatial;
pub mod systems;
pub mod vehicle;

pub use road::{RingLayout, RoadNetwork, RoadSegment, SegmentProfile};
pub use simulation::{PlayerState, SimulationError, TickReport, TrafficSimulation};
pub use systems::spawn::SpawnPoint;
pub use systems::transform::VehicleTransform;
pub use vehicle::{VehicleSpawn, VehicleType};
