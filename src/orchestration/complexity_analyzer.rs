//! # Complexity Analyzer
//!
//! Pure scoring of a query and its selected tools. The score drives the
//! execution strategy; risk factors are advisory and only logged.

use super::types::{
    ExecutionStrategy, OpportunityKind, ParallelizationOpportunity, QueryComplexity, StrategyKind,
};
use std::collections::BTreeSet;
use tracing::debug;

const RELATIONSHIP_KEYWORDS: &[&str] = &["with", "and", "between", "across", "related", "linked"];
const AGGREGATION_KEYWORDS: &[&str] = &[
    "total", "sum", "count", "average", "aggregate", "summary", "report",
];
const TEMPORAL_KEYWORDS: &[&str] = &[
    "today", "yesterday", "recent", "recently", "since", "before", "after", "date", "week",
    "month", "year", "last",
];
const PAGINATION_KEYWORDS: &[&str] = &["all", "every", "page", "first", "top", "list"];
const CROSS_REFERENCE_KEYWORDS: &[&str] = &["analyze", "compare", "correlate", "merge", "join"];
const ENTITY_KEYWORDS: &[&str] = &["facility", "shipment", "client", "contract", "carrier"];

const ENTITY_WEIGHT: f64 = 0.05;
const RELATIONSHIP_WEIGHT: f64 = 0.1;
const AGGREGATION_WEIGHT: f64 = 0.2;
const CROSS_REFERENCE_WEIGHT: f64 = 0.25;
const MANY_TOOLS_WEIGHT: f64 = 0.2;
const SEVERAL_TOOLS_WEIGHT: f64 = 0.1;

const COMPLEX_THRESHOLD: f64 = 0.6;
const HIGHLY_COMPLEX_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &str, selected_tools: &[String]) -> QueryComplexity {
        let words = tokenize(query);
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| words.contains(*k));

        let entity_count = count_entities(&words, selected_tools);
        let relationship_count = RELATIONSHIP_KEYWORDS
            .iter()
            .filter(|k| words.contains(**k))
            .count();
        let aggregation_needed = has_any(AGGREGATION_KEYWORDS);
        let time_based_filtering = has_any(TEMPORAL_KEYWORDS);
        let pagination_required = has_any(PAGINATION_KEYWORDS);
        let cross_reference = has_any(CROSS_REFERENCE_KEYWORDS);

        let mut score = entity_count as f64 * ENTITY_WEIGHT
            + relationship_count as f64 * RELATIONSHIP_WEIGHT;
        if aggregation_needed {
            score += AGGREGATION_WEIGHT;
        }
        if cross_reference {
            score += CROSS_REFERENCE_WEIGHT;
        }
        if selected_tools.len() > 5 {
            score += MANY_TOOLS_WEIGHT;
        } else if selected_tools.len() > 3 {
            score += SEVERAL_TOOLS_WEIGHT;
        }
        let score = score.clamp(0.0, 1.0);
        let is_complex = score > COMPLEX_THRESHOLD;

        let parallelization_opportunities = self.find_parallelization_opportunities(selected_tools);
        let risk_factors = self.identify_risk_factors(selected_tools);
        let strategy = self.select_strategy(is_complex, score, parallelization_opportunities.len());

        debug!(
            score = score,
            is_complex = is_complex,
            entity_count = entity_count,
            relationship_count = relationship_count,
            opportunities = parallelization_opportunities.len(),
            strategy = %strategy.kind,
            "Analyzed query complexity"
        );

        QueryComplexity {
            score,
            is_complex,
            entity_count,
            relationship_count,
            aggregation_needed,
            time_based_filtering,
            pagination_required,
            parallelization_opportunities,
            risk_factors,
            strategy,
        }
    }

    /// Structural opportunities derived from tool naming alone
    pub fn find_parallelization_opportunities(
        &self,
        selected_tools: &[String],
    ) -> Vec<ParallelizationOpportunity> {
        let list_tools: Vec<String> = selected_tools
            .iter()
            .filter(|tool| tool.ends_with("_list"))
            .cloned()
            .collect();
        let get_tools: Vec<String> = selected_tools
            .iter()
            .filter(|tool| tool.ends_with("_get"))
            .cloned()
            .collect();
        let filter_tools: Vec<String> = selected_tools
            .iter()
            .filter(|tool| {
                !tool.ends_with("_create") && !tool.ends_with("_list") && !tool.ends_with("_get")
            })
            .cloned()
            .collect();

        let mut opportunities = Vec::new();
        if list_tools.len() > 1 {
            opportunities.push(ParallelizationOpportunity {
                kind: OpportunityKind::IndependentQueries,
                description: format!("{} list queries can run independently", list_tools.len()),
                tools: list_tools,
                confidence: 0.9,
            });
        }
        if get_tools.len() > 1 {
            opportunities.push(ParallelizationOpportunity {
                kind: OpportunityKind::BatchOperations,
                description: format!("{} lookups can be batched", get_tools.len()),
                tools: get_tools,
                confidence: 0.8,
            });
        }
        if filter_tools.len() > 1 {
            opportunities.push(ParallelizationOpportunity {
                kind: OpportunityKind::ParallelFilters,
                description: format!("{} filters can be applied in parallel", filter_tools.len()),
                tools: filter_tools,
                confidence: 0.6,
            });
        }
        opportunities
    }

    pub fn identify_risk_factors(&self, selected_tools: &[String]) -> Vec<String> {
        let mut risks = Vec::new();

        let has_create = selected_tools.iter().any(|t| t.ends_with("_create"));
        let has_get = selected_tools.iter().any(|t| t.ends_with("_get"));
        if has_create && has_get {
            risks.push(
                "Mixed create and get operations may form a circular dependency".to_string(),
            );
        }
        if selected_tools.len() > 8 {
            risks.push(format!(
                "{} tools selected; long plans risk tool timeouts",
                selected_tools.len()
            ));
        }
        risks
    }

    pub fn select_strategy(
        &self,
        is_complex: bool,
        score: f64,
        opportunity_count: usize,
    ) -> ExecutionStrategy {
        if !is_complex {
            return ExecutionStrategy::simple();
        }

        if score > HIGHLY_COMPLEX_THRESHOLD {
            ExecutionStrategy {
                kind: StrategyKind::Complex,
                max_parallel: opportunity_count.min(5),
                reasoning: format!("Highly complex query (score {score:.2}), batching ready steps"),
            }
        } else if opportunity_count > 2 {
            ExecutionStrategy {
                kind: StrategyKind::Parallel,
                max_parallel: opportunity_count.min(3),
                reasoning: format!(
                    "{opportunity_count} parallelization opportunities, running independent steps together"
                ),
            }
        } else {
            ExecutionStrategy {
                kind: StrategyKind::Batched,
                max_parallel: 2,
                reasoning: format!("Complex query (score {score:.2}) with few parallel opportunities"),
            }
        }
    }
}

fn tokenize(query: &str) -> BTreeSet<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Distinct entities named by the tools (`shipments_list` -> `shipment`) or the query
fn count_entities(words: &BTreeSet<String>, selected_tools: &[String]) -> usize {
    let mut entities: BTreeSet<String> = selected_tools
        .iter()
        .filter_map(|tool| tool.rsplit_once('_').map(|(entity, _)| singular(entity)))
        .collect();

    for word in words {
        let word = singular(word);
        if ENTITY_KEYWORDS.contains(&word.as_str()) {
            entities.insert(word);
        }
    }
    entities.len()
}

fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{stem}y")
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_string()
    } else {
        word.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_simple_query_uses_simple_strategy() {
        let analyzer = ComplexityAnalyzer::new();
        let complexity = analyzer.analyze("show shipments", &tools(&["shipments_list"]));

        assert!(!complexity.is_complex);
        assert_eq!(complexity.strategy.kind, StrategyKind::Simple);
        assert_eq!(complexity.strategy.max_parallel, 1);
        assert!(complexity.parallelization_opportunities.is_empty());
    }

    #[test]
    fn test_independent_list_queries_detected() {
        let analyzer = ComplexityAnalyzer::new();
        let complexity = analyzer.analyze(
            "list facilities, shipments and clients",
            &tools(&["facilities_list", "shipments_list", "clients_list"]),
        );

        assert!(complexity.has_opportunity(OpportunityKind::IndependentQueries));
        let opportunity = &complexity.parallelization_opportunities[0];
        assert_eq!(opportunity.tools.len(), 3);
        assert!((opportunity.confidence - 0.9).abs() < f64::EPSILON);
        assert!(complexity.pagination_required);
    }

    #[test]
    fn test_score_is_clamped_and_complex_queries_batch() {
        let analyzer = ComplexityAnalyzer::new();
        let complexity = analyzer.analyze(
            "analyze and compare the total shipments with contracts between facilities across clients related to carriers",
            &tools(&[
                "shipments_list",
                "contracts_list",
                "facilities_list",
                "clients_list",
                "carriers_list",
                "shipment_get",
            ]),
        );

        assert!(complexity.score <= 1.0);
        assert!(complexity.is_complex);
        assert!(complexity.aggregation_needed);
        assert_eq!(complexity.strategy.kind, StrategyKind::Complex);
        assert!(complexity.strategy.max_parallel <= 5);
    }

    #[test]
    fn test_strategy_decision_table() {
        let analyzer = ComplexityAnalyzer::new();
        assert_eq!(
            analyzer.select_strategy(false, 0.3, 4).kind,
            StrategyKind::Simple
        );

        let complex = analyzer.select_strategy(true, 0.9, 7);
        assert_eq!(complex.kind, StrategyKind::Complex);
        assert_eq!(complex.max_parallel, 5);

        let unstructured = analyzer.select_strategy(true, 0.9, 0);
        assert_eq!(unstructured.kind, StrategyKind::Complex);
        assert_eq!(unstructured.max_parallel, 0);

        let parallel = analyzer.select_strategy(true, 0.7, 3);
        assert_eq!(parallel.kind, StrategyKind::Parallel);
        assert_eq!(parallel.max_parallel, 3);

        let batched = analyzer.select_strategy(true, 0.7, 2);
        assert_eq!(batched.kind, StrategyKind::Batched);
        assert_eq!(batched.max_parallel, 2);
    }

    #[test]
    fn test_risk_factors_are_advisory() {
        let analyzer = ComplexityAnalyzer::new();
        let risks = analyzer.identify_risk_factors(&tools(&["facility_create", "facility_get"]));
        assert_eq!(risks.len(), 1);
        assert!(risks[0].contains("circular"));

        let many: Vec<String> = (0..9).map(|i| format!("entity{i}_list")).collect();
        assert!(analyzer
            .identify_risk_factors(&many)
            .iter()
            .any(|risk| risk.contains("timeout")));
    }

    #[test]
    fn test_get_and_filter_opportunities() {
        let analyzer = ComplexityAnalyzer::new();
        let opportunities = analyzer.find_parallelization_opportunities(&tools(&[
            "facility_get",
            "client_get",
            "shipments_filter_by_status",
            "shipments_filter_by_date",
        ]));
        let kinds: Vec<OpportunityKind> = opportunities.iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![OpportunityKind::BatchOperations, OpportunityKind::ParallelFilters]
        );
    }
}
