//! Confidence rollup and human-review flags.

use crate::rules::REQUIRED_LINE_ITEM;
use crate::schema::{
    CanonicalLineItem, ClassifiedPage, ConfidenceSummary, FindingStatus, MatchTier,
    NormalizedValue, ReviewFlag, ReviewReason, Severity, ValidationFinding,
};
use crate::taxonomy::Thresholds;
use crate::utils::{mean, round_confidence};
use std::collections::BTreeSet;

/// Raises review flags for one statement instance.
///
/// `normalized_values` are values read for the instance outside its line
/// items (the period header); line-item values are taken from `mappings`.
/// Flags are additive: one per high finding, one per weakly classified page,
/// and a single flag listing every field under the confidence floor.
pub fn aggregate(
    scope: &str,
    normalized_values: &[&NormalizedValue],
    classification: &[ClassifiedPage],
    mappings: &[CanonicalLineItem],
    findings: &[ValidationFinding],
    thresholds: &Thresholds,
) -> Vec<ReviewFlag> {
    let mut flags = Vec::new();

    if classification.is_empty() {
        flags.push(no_statement_content(scope, classification));
    }

    for page in classification
        .iter()
        .filter(|p| p.classification_confidence < thresholds.classification_min_confidence)
    {
        let candidate = page
            .signals
            .iter()
            .find_map(|s| s.strip_prefix("low_confidence_candidate:"))
            .unwrap_or("none");
        flags.push(ReviewFlag {
            reason: ReviewReason::LowClassificationConfidence,
            severity: Severity::High,
            scope: format!("page:{}", page.page_id),
            detail: format!(
                "classification confidence {:.2} below {:.2} (best candidate: {})",
                page.classification_confidence, thresholds.classification_min_confidence, candidate
            ),
            triggering_findings: BTreeSet::new(),
            triggering_fields: BTreeSet::from([format!("page:{}", page.page_id)]),
        });
    }

    for finding in findings.iter().filter(|f| f.severity == Severity::High) {
        let reason = if finding.rule_id == REQUIRED_LINE_ITEM {
            ReviewReason::UnmappedRequiredKey
        } else if finding.status == FindingStatus::MissingInput {
            ReviewReason::MissingRuleInput
        } else {
            ReviewReason::RuleViolation
        };
        flags.push(ReviewFlag {
            reason,
            severity: finding.severity,
            scope: scope.to_string(),
            detail: finding.message.clone(),
            triggering_findings: BTreeSet::from([finding.rule_id.clone()]),
            triggering_fields: finding.involved_keys.clone(),
        });
    }

    let floor = thresholds.field_confidence_floor;
    let mut weak_fields = BTreeSet::new();
    let mut weakest = f64::INFINITY;
    for item in mappings {
        let confidence = item.field_confidence();
        if confidence < floor {
            weak_fields.insert(item.field_ref());
            weakest = weakest.min(confidence);
        }
    }
    for value in normalized_values {
        if value.normalization_confidence < floor {
            weak_fields.insert(format!("raw:{}@page:{}", value.raw.raw, value.raw.page));
            weakest = weakest.min(value.normalization_confidence);
        }
    }
    if !weak_fields.is_empty() {
        flags.push(ReviewFlag {
            reason: ReviewReason::LowFieldConfidence,
            severity: Severity::Warn,
            scope: scope.to_string(),
            detail: format!(
                "{} field(s) below confidence floor {:.2} (lowest {:.2})",
                weak_fields.len(),
                floor,
                weakest
            ),
            triggering_findings: BTreeSet::new(),
            triggering_fields: weak_fields,
        });
    }

    flags
}

/// Raised when none of `pages` (possibly none at all) could be attributed
/// to a statement.
pub fn no_statement_content(scope: &str, pages: &[ClassifiedPage]) -> ReviewFlag {
    let detail = if pages.is_empty() {
        "document has no pages".to_string()
    } else {
        format!(
            "none of {} page(s) could be attributed to a statement",
            pages.len()
        )
    };
    ReviewFlag {
        reason: ReviewReason::NoStatementContent,
        severity: Severity::High,
        scope: scope.to_string(),
        detail,
        triggering_findings: BTreeSet::new(),
        triggering_fields: pages
            .iter()
            .map(|p| format!("page:{}", p.page_id))
            .collect(),
    }
}

/// Component confidences for a record or a whole document. `None` where a
/// component has nothing to score.
pub fn confidence_summary(
    pages: &[ClassifiedPage],
    items: &[CanonicalLineItem],
    findings: &[ValidationFinding],
) -> ConfidenceSummary {
    let classification: Vec<f64> = pages.iter().map(|p| p.classification_confidence).collect();
    let normalization: Vec<f64> = items
        .iter()
        .map(|i| i.value.normalization_confidence)
        .collect();
    let mapping: Vec<f64> = items
        .iter()
        .map(|i| match i.match_tier {
            MatchTier::Unmapped => 0.0,
            _ => i.mapping_confidence,
        })
        .collect();

    let graded: Vec<&ValidationFinding> = findings
        .iter()
        .filter(|f| f.status != FindingStatus::NotApplicable)
        .collect();
    let validation = if graded.is_empty() {
        None
    } else {
        let passed = graded
            .iter()
            .filter(|f| f.status == FindingStatus::Passed)
            .count();
        Some(passed as f64 / graded.len() as f64)
    };

    let classification = mean(&classification).map(round_confidence);
    let normalization = mean(&normalization).map(round_confidence);
    let mapping = mean(&mapping).map(round_confidence);
    let validation = validation.map(round_confidence);

    let components: Vec<f64> = [classification, normalization, mapping, validation]
        .into_iter()
        .flatten()
        .collect();

    ConfidenceSummary {
        overall: mean(&components).map(round_confidence),
        classification,
        normalization,
        mapping,
        validation,
    }
}
