//! # Planning Collaborator
//!
//! Natural-language plan generation lives outside this crate. The execution
//! agent only needs to look a stored plan request up by id; [`PlanProvider`]
//! is that seam.

use crate::models::Plan;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A planned query: the original text plus the step graph produced for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub id: String,
    pub query: String,
    pub plan: Plan,
}

impl PlanRequest {
    pub fn new(id: impl Into<String>, query: impl Into<String>, plan: Plan) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            plan,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Plan lookup failed: {0}")]
pub struct PlanLookupError(pub String);

#[async_trait]
pub trait PlanProvider: Send + Sync {
    /// `Ok(None)` when no plan request exists under `plan_request_id`
    async fn get_plan_request(
        &self,
        plan_request_id: &str,
    ) -> Result<Option<PlanRequest>, PlanLookupError>;
}

/// Plan requests held in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlanProvider {
    requests: Arc<DashMap<String, PlanRequest>>,
}

impl InMemoryPlanProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: PlanRequest) {
        self.requests.insert(request.id.clone(), request);
    }

    pub fn remove(&self, plan_request_id: &str) -> Option<PlanRequest> {
        self.requests
            .remove(plan_request_id)
            .map(|(_, request)| request)
    }
}

#[async_trait]
impl PlanProvider for InMemoryPlanProvider {
    async fn get_plan_request(
        &self,
        plan_request_id: &str,
    ) -> Result<Option<PlanRequest>, PlanLookupError> {
        Ok(self
            .requests
            .get(plan_request_id)
            .map(|entry| entry.value().clone()))
    }
}
