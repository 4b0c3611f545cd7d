//! Accounting checks over a canonical record.
//!
//! Findings report what the figures say; nothing is corrected. Every
//! configured rule yields a finding whether it passes or fails, and a missing
//! input is reported as such rather than skipping the rule.

use crate::schema::{
    CanonicalLineItem, CanonicalRecord, FindingStatus, NormalizationNote, Severity,
    ValidationFinding, ValidationStatus, ValidationSummary,
};
use crate::taxonomy::{StatementTaxonomy, Thresholds};
use log::debug;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const REQUIRED_LINE_ITEM: &str = "required_line_item";
pub const DUPLICATE_CANONICAL_KEY: &str = "duplicate_canonical_key";
pub const UNMAPPED_LINE_ITEM: &str = "unmapped_line_item";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TermSign {
    #[default]
    Plus,
    Minus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RuleTerm {
    pub key: String,
    #[serde(default)]
    pub sign: TermSign,
}

impl RuleTerm {
    pub fn plus(key: &str) -> Self {
        Self {
            key: key.to_string(),
            sign: TermSign::Plus,
        }
    }

    pub fn minus(key: &str) -> Self {
        Self {
            key: key.to_string(),
            sign: TermSign::Minus,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    #[schemars(description = "Signed sum of lhs equals signed sum of rhs")]
    Identity {
        lhs: Vec<RuleTerm>,
        rhs: Vec<RuleTerm>,
    },
    #[schemars(
        description = "Total equals the sum of the components present. Not applicable when the total or every component is absent."
    )]
    Crossfoot {
        total: String,
        components: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RuleDescriptor {
    pub rule_id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Severity of a violation. Identities default to high, crossfoots to warn.")]
    pub severity: Option<Severity>,

    #[serde(flatten)]
    pub kind: RuleKind,
}

impl RuleDescriptor {
    pub fn violation_severity(&self) -> Severity {
        self.severity.unwrap_or(match self.kind {
            RuleKind::Identity { .. } => Severity::High,
            RuleKind::Crossfoot { .. } => Severity::Warn,
        })
    }

    /// Every canonical key the rule reads, in declaration order.
    pub fn keys(&self) -> Vec<&str> {
        match &self.kind {
            RuleKind::Identity { lhs, rhs } => {
                lhs.iter().chain(rhs.iter()).map(|t| t.key.as_str()).collect()
            }
            RuleKind::Crossfoot { total, components } => std::iter::once(total.as_str())
                .chain(components.iter().map(String::as_str))
                .collect(),
        }
    }
}

fn finding(rule_id: &str, status: FindingStatus, severity: Severity, message: String) -> ValidationFinding {
    ValidationFinding {
        rule_id: rule_id.to_string(),
        status,
        severity,
        message,
        involved_keys: BTreeSet::new(),
        expected: None,
        actual: None,
        variance: None,
        tolerance: None,
    }
}

enum Input<'r> {
    Present(Decimal, &'r CanonicalLineItem),
    Absent,
    NotNumeric,
}

pub struct FinancialRulesValidator<'a> {
    taxonomy: &'a StatementTaxonomy,
    thresholds: &'a Thresholds,
}

impl<'a> FinancialRulesValidator<'a> {
    pub fn new(taxonomy: &'a StatementTaxonomy, thresholds: &'a Thresholds) -> Self {
        Self {
            taxonomy,
            thresholds,
        }
    }

    pub fn validate(&self, record: &CanonicalRecord) -> Vec<ValidationFinding> {
        self.validate_items(&record.line_items)
    }

    pub fn validate_items(&self, items: &[CanonicalLineItem]) -> Vec<ValidationFinding> {
        // first occurrence in document order wins
        let mut by_key: BTreeMap<&str, &CanonicalLineItem> = BTreeMap::new();
        let mut occurrences: BTreeMap<&str, usize> = BTreeMap::new();
        for item in items {
            if let Some(key) = item.canonical_key.as_deref() {
                by_key.entry(key).or_insert(item);
                *occurrences.entry(key).or_insert(0) += 1;
            }
        }

        let mut findings = Vec::new();

        for key in self.taxonomy.required_keys() {
            if !by_key.contains_key(key) {
                let mut f = finding(
                    REQUIRED_LINE_ITEM,
                    FindingStatus::MissingInput,
                    Severity::High,
                    format!("required line item '{}' not found", key),
                );
                f.involved_keys.insert(key.to_string());
                findings.push(f);
            }
        }

        for (key, count) in occurrences.iter().filter(|(_, count)| **count > 1) {
            let mut f = finding(
                DUPLICATE_CANONICAL_KEY,
                FindingStatus::Failed,
                Severity::Warn,
                format!("'{}' mapped {} times; the first occurrence is used", key, count),
            );
            f.involved_keys.insert(key.to_string());
            findings.push(f);
        }

        for item in items.iter().filter(|item| item.canonical_key.is_none()) {
            let mut f = finding(
                UNMAPPED_LINE_ITEM,
                FindingStatus::Failed,
                Severity::Warn,
                format!("line item '{}' did not map to a canonical key", item.source_label),
            );
            f.involved_keys.insert(item.field_ref());
            findings.push(f);
        }

        for rule in &self.taxonomy.rules {
            findings.push(self.evaluate(rule, &by_key));
        }

        debug!(
            "{}: {} findings from {} rules",
            self.taxonomy.statement_type,
            findings.len(),
            self.taxonomy.rules.len()
        );
        findings
    }

    fn evaluate(
        &self,
        rule: &RuleDescriptor,
        by_key: &BTreeMap<&str, &CanonicalLineItem>,
    ) -> ValidationFinding {
        match &rule.kind {
            RuleKind::Identity { lhs, rhs } => self.evaluate_identity(rule, lhs, rhs, by_key),
            RuleKind::Crossfoot { total, components } => {
                self.evaluate_crossfoot(rule, total, components, by_key)
            }
        }
    }

    fn evaluate_identity(
        &self,
        rule: &RuleDescriptor,
        lhs: &[RuleTerm],
        rhs: &[RuleTerm],
        by_key: &BTreeMap<&str, &CanonicalLineItem>,
    ) -> ValidationFinding {
        let mut missing = Vec::new();
        let mut involved = Vec::new();
        let mut overflowed = false;
        let mut sum = |terms: &[RuleTerm]| {
            let mut total = Decimal::ZERO;
            for term in terms {
                match input(by_key, &term.key) {
                    Input::Present(value, item) => {
                        involved.push(item);
                        let next = match term.sign {
                            TermSign::Plus => total.checked_add(value),
                            TermSign::Minus => total.checked_sub(value),
                        };
                        match next {
                            Some(next) => total = next,
                            None => overflowed = true,
                        }
                    }
                    Input::Absent | Input::NotNumeric => missing.push(term.key.clone()),
                }
            }
            total
        };
        let expected = sum(lhs);
        let actual = sum(rhs);

        let keys: BTreeSet<String> = rule.keys().into_iter().map(str::to_string).collect();
        if !missing.is_empty() {
            return self.missing_input(rule, keys, &missing);
        }
        if overflowed {
            return self.out_of_range(rule, keys);
        }
        self.grade(rule, keys, expected, actual, &involved)
    }

    fn evaluate_crossfoot(
        &self,
        rule: &RuleDescriptor,
        total: &str,
        components: &[String],
        by_key: &BTreeMap<&str, &CanonicalLineItem>,
    ) -> ValidationFinding {
        let keys: BTreeSet<String> = rule.keys().into_iter().map(str::to_string).collect();

        let (expected, total_item) = match input(by_key, total) {
            Input::Present(value, item) => (value, item),
            Input::NotNumeric => return self.missing_input(rule, keys, &[total.to_string()]),
            Input::Absent => return self.not_applicable(rule, keys, "total not reported"),
        };

        let mut involved = vec![total_item];
        let mut actual = Decimal::ZERO;
        let mut overflowed = false;
        let mut unreadable = Vec::new();
        for key in components {
            match input(by_key, key) {
                Input::Present(value, item) => {
                    involved.push(item);
                    match actual.checked_add(value) {
                        Some(sum) => actual = sum,
                        None => overflowed = true,
                    }
                }
                Input::NotNumeric => unreadable.push(key.clone()),
                Input::Absent => {}
            }
        }

        if !unreadable.is_empty() {
            return self.missing_input(rule, keys, &unreadable);
        }
        if involved.len() == 1 {
            return self.not_applicable(rule, keys, "no component reported");
        }
        if overflowed {
            return self.out_of_range(rule, keys);
        }
        self.grade(rule, keys, expected, actual, &involved)
    }

    fn grade(
        &self,
        rule: &RuleDescriptor,
        keys: BTreeSet<String>,
        expected: Decimal,
        actual: Decimal,
        involved: &[&CanonicalLineItem],
    ) -> ValidationFinding {
        let Some(variance) = expected.checked_sub(actual) else {
            return self.out_of_range(rule, keys);
        };
        let tolerance = self.thresholds.tolerance_absolute;
        let magnitude = variance.abs();

        let (status, severity, message) = if magnitude <= tolerance {
            (
                FindingStatus::Passed,
                Severity::Info,
                format!("{} holds (variance {})", rule.rule_id, variance),
            )
        } else if magnitude <= self.thresholds.secondary_tolerance {
            (
                FindingStatus::Failed,
                Severity::Info,
                format!(
                    "{}: variance {} exceeds tolerance {} but is within {}",
                    rule.rule_id, variance, tolerance, self.thresholds.secondary_tolerance
                ),
            )
        } else if involved
            .iter()
            .any(|item| item.value.has_note(NormalizationNote::AmbiguousSign))
        {
            (
                FindingStatus::Failed,
                Severity::Warn,
                format!(
                    "{}: expected {} got {}; an involved value has an unresolved sign",
                    rule.rule_id, expected, actual
                ),
            )
        } else {
            (
                FindingStatus::Failed,
                rule.violation_severity(),
                format!(
                    "{}: expected {} got {} (variance {})",
                    rule.rule_id, expected, actual, variance
                ),
            )
        };

        ValidationFinding {
            rule_id: rule.rule_id.clone(),
            status,
            severity,
            message,
            involved_keys: keys,
            expected: Some(expected),
            actual: Some(actual),
            variance: Some(variance),
            tolerance: Some(tolerance),
        }
    }

    fn missing_input(
        &self,
        rule: &RuleDescriptor,
        keys: BTreeSet<String>,
        missing: &[String],
    ) -> ValidationFinding {
        let mut f = finding(
            &rule.rule_id,
            FindingStatus::MissingInput,
            Severity::High,
            format!("{}: missing or non-numeric inputs: {}", rule.rule_id, missing.join(", ")),
        );
        f.involved_keys = keys;
        f.tolerance = Some(self.thresholds.tolerance_absolute);
        f
    }

    /// Inputs are present but their sum or difference leaves the decimal
    /// range, so the rule cannot be graded.
    fn out_of_range(&self, rule: &RuleDescriptor, keys: BTreeSet<String>) -> ValidationFinding {
        let mut f = finding(
            &rule.rule_id,
            FindingStatus::MissingInput,
            Severity::High,
            format!("{}: inputs are too large to evaluate", rule.rule_id),
        );
        f.involved_keys = keys;
        f.tolerance = Some(self.thresholds.tolerance_absolute);
        f
    }

    fn not_applicable(
        &self,
        rule: &RuleDescriptor,
        keys: BTreeSet<String>,
        reason: &str,
    ) -> ValidationFinding {
        let mut f = finding(
            &rule.rule_id,
            FindingStatus::NotApplicable,
            Severity::Info,
            format!("{}: not applicable, {}", rule.rule_id, reason),
        );
        f.involved_keys = keys;
        f
    }
}

fn input<'r>(by_key: &BTreeMap<&str, &'r CanonicalLineItem>, key: &str) -> Input<'r> {
    match by_key.get(key).copied() {
        None => Input::Absent,
        Some(item) => match item.value.amount() {
            Some(value) => Input::Present(value, item),
            None => Input::NotNumeric,
        },
    }
}

/// Validates a record against its statement taxonomy.
pub fn validate(
    record: &CanonicalRecord,
    taxonomy: &StatementTaxonomy,
    thresholds: &Thresholds,
) -> Vec<ValidationFinding> {
    FinancialRulesValidator::new(taxonomy, thresholds).validate(record)
}

pub fn summarize_findings(findings: &[ValidationFinding]) -> ValidationSummary {
    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
    let failed_rules: Vec<String> = findings
        .iter()
        .filter(|f| f.is_failure())
        .map(|f| f.rule_id.clone())
        .collect();

    ValidationSummary {
        validation_status: if failed_rules.is_empty() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        },
        findings_evaluated: findings.len(),
        info_count: count(Severity::Info),
        warn_count: count(Severity::Warn),
        high_count: count(Severity::High),
        failed_rules,
    }
}
