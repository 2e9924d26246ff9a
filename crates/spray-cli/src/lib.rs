//! Spray CLI - command line tools for the spray planning engine.
//!
//! - plan_offline: run the full engine against a JSON survey fixture
//! - submit_plan: create a plan on a running server and wait for it

pub mod client;
pub mod fixture;

pub use client::PlanClient;
pub use fixture::{load_forecast, load_survey, plan_survey, routes_document, SurveyFixture};
