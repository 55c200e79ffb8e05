//! # Orchestration Types
//!
//! Strategy and complexity types shared by the complexity analyzer, the
//! orchestrator and the execution agent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling policy for one execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Simple,
    Parallel,
    Batched,
    Complex,
}

impl StrategyKind {
    /// Complex and batched runs partition ready steps into bounded batches
    pub fn uses_intelligent_batching(&self) -> bool {
        matches!(self, Self::Complex | Self::Batched)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Parallel => "parallel",
            Self::Batched => "batched",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStrategy {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    /// Advisory concurrency hint; batch sizes are bounded by the execution config
    pub max_parallel: usize,
    pub reasoning: String,
}

impl ExecutionStrategy {
    pub fn simple() -> Self {
        Self {
            kind: StrategyKind::Simple,
            max_parallel: 1,
            reasoning: "Low complexity query, executing steps as declared".to_string(),
        }
    }
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self::simple()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    /// Several `_list` tools with no data flowing between them
    IndependentQueries,
    /// Several `_get` lookups that can be issued together
    BatchOperations,
    /// Several filter-style tools
    ParallelFilters,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IndependentQueries => "independent_queries",
            Self::BatchOperations => "batch_operations",
            Self::ParallelFilters => "parallel_filters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelizationOpportunity {
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
    pub tools: Vec<String>,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub description: String,
}

/// Output of the complexity analyzer for one `(query, tools)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryComplexity {
    /// Clamped to `[0, 1]`
    pub score: f64,
    pub is_complex: bool,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub aggregation_needed: bool,
    pub time_based_filtering: bool,
    pub pagination_required: bool,
    pub parallelization_opportunities: Vec<ParallelizationOpportunity>,
    pub risk_factors: Vec<String>,
    pub strategy: ExecutionStrategy,
}

impl QueryComplexity {
    pub fn has_opportunity(&self, kind: OpportunityKind) -> bool {
        self.parallelization_opportunities
            .iter()
            .any(|opportunity| opportunity.kind == kind)
    }
}
