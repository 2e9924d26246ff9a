//! Persistence layer for the spray planning server.
//!
//! SQLite-backed storage for surveys, dose references, compliance layers and
//! spray plans with their zone and mission records.

pub mod compliance_layers;
pub mod db;
pub mod doses;
pub mod plans;
pub mod surveys;

pub use db::{init_database, Database};
pub use plans::MissionRecord;
pub use surveys::Project;
