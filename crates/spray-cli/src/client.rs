//! Blocking HTTP client for the spray plan server.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use spray_core::SprayPlanRequest;

/// Response to a plan submission.
#[derive(Debug, Deserialize)]
pub struct PlanAccepted {
    pub plan_id: String,
    pub status: String,
}

pub struct PlanClient {
    client: Client,
    base_url: String,
}

impl PlanClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn submit(&self, project_id: &str, request: &SprayPlanRequest) -> Result<PlanAccepted> {
        let url = format!("{}/v1/projects/{}/spray-plans", self.base_url, project_id);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("plan submission failed ({status}): {body}");
        }
        response.json().context("decoding plan submission response")
    }

    /// Fetch a plan, or one of its `zones`/`missions` collections.
    pub fn fetch(&self, plan_id: &str, collection: Option<&str>) -> Result<Value> {
        let url = match collection {
            Some(name) => format!("{}/v1/spray-plans/{}/{}", self.base_url, plan_id, name),
            None => format!("{}/v1/spray-plans/{}", self.base_url, plan_id),
        };
        let response = self.client.get(&url).send().with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {url} returned {status}");
        }
        response.json().with_context(|| format!("decoding {url}"))
    }
}
