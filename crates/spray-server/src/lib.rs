//! Spray planning service: persistence, collaborators, orchestrator, worker and API.

pub mod api;
pub mod collaborators;
pub mod config;
pub mod forecast;
pub mod loops;
pub mod orchestrator;
pub mod persistence;
pub mod state;
