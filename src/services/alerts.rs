//! Threshold alert evaluation

use crate::types::{AirtrackError, AlertResult, AlertRule, Reading, Result};
use serde::Serialize;

/// Flag each record against an OR-combined rule set. One result per record,
/// input order preserved. An empty rule set is an error, distinct from
/// "rules given but nothing triggered".
pub fn evaluate_alerts<'a>(records: &'a [Reading], rules: &[AlertRule]) -> Result<Vec<AlertResult<'a>>> {
    if rules.is_empty() {
        return Err(AirtrackError::InvalidRule("no alert rules selected".into()));
    }

    Ok(records
        .iter()
        .map(|record| {
            let triggered: Vec<String> = rules
                .iter()
                .filter(|rule| rule.triggers(record))
                .map(|rule| rule.metric.clone())
                .collect();
            AlertResult {
                record,
                flagged: !triggered.is_empty(),
                triggered,
            }
        })
        .collect())
}

/// Hit count for one rule
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleHits {
    pub rule: AlertRule,
    pub hits: usize,
}

/// Summary counts over a set of alert results
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertReport {
    pub total: usize,
    pub flagged: usize,
    pub per_rule: Vec<RuleHits>,
}

impl AlertReport {
    pub fn from_results(results: &[AlertResult<'_>], rules: &[AlertRule]) -> Self {
        let per_rule = rules
            .iter()
            .map(|rule| RuleHits {
                rule: rule.clone(),
                hits: results.iter().filter(|r| rule.triggers(r.record)).count(),
            })
            .collect();

        Self {
            total: results.len(),
            flagged: results.iter().filter(|r| r.flagged).count(),
            per_rule,
        }
    }
}
