pub mod avoidance;
pub mod lane;
pub mod path;
pub mod spawn;
pub mod speed;
pub mod transform;
