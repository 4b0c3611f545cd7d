use crate::classifier::{ClassificationRule, SignalRule};
use crate::error::{DigitizationError, Result};
use crate::rules::{RuleDescriptor, RuleKind};
use crate::schema::{LocaleHint, StatementType};
use crate::utils::collapse_whitespace;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const DEFAULT_MUNICIPAL_TAXONOMY: &str = include_str!("../data/default_taxonomy.json");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FuzzyAlgorithm {
    #[default]
    #[schemars(description = "1 - edit distance / longer length")]
    Levenshtein,
    JaroWinkler,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct Thresholds {
    #[schemars(description = "Pages whose vote margin is below this are classified as unknown")]
    pub classification_min_confidence: f64,

    #[schemars(description = "Minimum similarity for a fuzzy label match to be accepted")]
    pub fuzzy_acceptance: f64,

    pub fuzzy_algorithm: FuzzyAlgorithm,

    #[schemars(description = "Confidence assigned to normalized-text matches. Must be below 1.0.")]
    pub normalized_tier_confidence: f64,

    #[schemars(description = "A record with any field below this confidence is flagged for review")]
    pub field_confidence_floor: f64,

    #[schemars(description = "Confidence lost per normalization heuristic applied")]
    pub heuristic_penalty: f64,

    #[schemars(description = "Absolute difference tolerated by equation checks")]
    pub tolerance_absolute: Decimal,

    #[schemars(
        description = "Differences above the tolerance but within this bound are reported as info"
    )]
    pub secondary_tolerance: Decimal,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            classification_min_confidence: 0.75,
            fuzzy_acceptance: 0.85,
            fuzzy_algorithm: FuzzyAlgorithm::Levenshtein,
            normalized_tier_confidence: 0.95,
            field_confidence_floor: 0.6,
            heuristic_penalty: 0.1,
            tolerance_absolute: Decimal::ONE,
            secondary_tolerance: Decimal::ONE_HUNDRED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CanonicalKeySpec {
    #[schemars(description = "snake_case key, unique within the statement")]
    pub key: String,

    #[serde(default)]
    #[schemars(description = "Missing required keys are high-severity findings")]
    pub required: bool,

    #[serde(default)]
    #[schemars(description = "Labels known to mean this key. The key itself (underscores as spaces) is always implied.")]
    pub synonyms: Vec<String>,
}

/// Canonical keys for one statement type. Key order is the taxonomy
/// priority used to break fuzzy-match ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct StatementTaxonomy {
    pub statement_type: StatementType,
    pub keys: Vec<CanonicalKeySpec>,
    #[serde(default)]
    pub rules: Vec<RuleDescriptor>,
}

impl StatementTaxonomy {
    pub fn empty(statement_type: StatementType) -> Self {
        Self {
            statement_type,
            keys: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.keys
            .iter()
            .filter(|k| k.required)
            .map(|k| k.key.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k.key == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    pub locale: LocaleHint,

    #[serde(default)]
    pub thresholds: Thresholds,

    pub statements: Vec<StatementTaxonomy>,

    #[serde(default)]
    pub classification_rules: Vec<ClassificationRule>,
}

impl PipelineConfig {
    /// Statement types whose taxonomy must be present for a job to run.
    pub const REQUIRED_STATEMENTS: [StatementType; 3] = [
        StatementType::BalanceSheet,
        StatementType::IncomeExpenditure,
        StatementType::CashFlow,
    ];

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Taxonomy for Indian municipal (ULB) financial statements bundled with
    /// the crate.
    pub fn default_municipal() -> Result<Self> {
        Self::from_json_str(DEFAULT_MUNICIPAL_TAXONOMY)
    }

    pub fn statement(&self, statement_type: StatementType) -> Option<&StatementTaxonomy> {
        self.statements
            .iter()
            .find(|s| s.statement_type == statement_type)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_thresholds()?;

        if !(1..=12).contains(&self.locale.fiscal_year_start_month) {
            return Err(invalid_threshold(
                "locale.fiscal_year_start_month",
                self.locale.fiscal_year_start_month,
                "must be between 1 and 12",
            ));
        }

        let mut seen = BTreeSet::new();
        for taxonomy in &self.statements {
            if taxonomy.statement_type == StatementType::Unknown {
                return Err(DigitizationError::InvalidTaxonomy {
                    statement: taxonomy.statement_type.to_string(),
                    details: "the unknown statement type cannot carry a taxonomy".to_string(),
                });
            }
            if !seen.insert(taxonomy.statement_type) {
                return Err(DigitizationError::InvalidTaxonomy {
                    statement: taxonomy.statement_type.to_string(),
                    details: "declared more than once".to_string(),
                });
            }
            validate_taxonomy(taxonomy)?;
        }

        for required in Self::REQUIRED_STATEMENTS {
            if !seen.contains(&required) {
                return Err(DigitizationError::MissingConfiguration(format!(
                    "no taxonomy for {}",
                    required
                )));
            }
        }

        if self.classification_rules.is_empty() {
            return Err(DigitizationError::MissingConfiguration(
                "classification_rules is empty".to_string(),
            ));
        }
        for (idx, rule) in self.classification_rules.iter().enumerate() {
            validate_classification_rule(idx, rule)?;
        }

        Ok(())
    }

    fn validate_thresholds(&self) -> Result<()> {
        let t = &self.thresholds;
        let unit_interval = [
            ("classification_min_confidence", t.classification_min_confidence),
            ("fuzzy_acceptance", t.fuzzy_acceptance),
            ("field_confidence_floor", t.field_confidence_floor),
        ];
        for (name, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid_threshold(name, value, "must be between 0.0 and 1.0"));
            }
        }

        if !(t.normalized_tier_confidence > 0.0 && t.normalized_tier_confidence < 1.0) {
            return Err(invalid_threshold(
                "normalized_tier_confidence",
                t.normalized_tier_confidence,
                "must be above 0.0 and below the exact tier's 1.0",
            ));
        }
        if !(t.heuristic_penalty > 0.0 && t.heuristic_penalty <= 1.0) {
            return Err(invalid_threshold(
                "heuristic_penalty",
                t.heuristic_penalty,
                "must be in (0.0, 1.0]",
            ));
        }
        if t.tolerance_absolute.is_sign_negative() {
            return Err(invalid_threshold(
                "tolerance_absolute",
                t.tolerance_absolute,
                "must not be negative",
            ));
        }
        if t.secondary_tolerance < t.tolerance_absolute {
            return Err(invalid_threshold(
                "secondary_tolerance",
                t.secondary_tolerance,
                "must not be below tolerance_absolute",
            ));
        }
        Ok(())
    }
}

fn invalid_threshold(name: &str, value: impl ToString, reason: &str) -> DigitizationError {
    DigitizationError::InvalidThreshold {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_taxonomy(taxonomy: &StatementTaxonomy) -> Result<()> {
    let statement = taxonomy.statement_type.to_string();
    let invalid = |details: String| DigitizationError::InvalidTaxonomy {
        statement: statement.clone(),
        details,
    };

    let mut keys = BTreeSet::new();
    // exact-tier form -> owning key
    let mut synonyms: BTreeMap<String, &str> = BTreeMap::new();

    for spec in &taxonomy.keys {
        let well_formed = !spec.key.is_empty()
            && spec
                .key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !well_formed {
            return Err(invalid(format!(
                "key '{}' must be non-empty snake_case",
                spec.key
            )));
        }
        if !keys.insert(spec.key.as_str()) {
            return Err(invalid(format!("key '{}' declared twice", spec.key)));
        }

        let implied = spec.key.replace('_', " ");
        for synonym in std::iter::once(&implied).chain(spec.synonyms.iter()) {
            let form = collapse_whitespace(synonym);
            if form.is_empty() {
                return Err(invalid(format!("key '{}' has an empty synonym", spec.key)));
            }
            match synonyms.get(&form) {
                Some(owner) if *owner != spec.key => {
                    return Err(DigitizationError::DuplicateSynonym {
                        statement: statement.clone(),
                        synonym: synonym.clone(),
                        first: owner.to_string(),
                        second: spec.key.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    synonyms.insert(form, spec.key.as_str());
                }
            }
        }
    }

    let mut rule_ids = BTreeSet::new();
    for rule in &taxonomy.rules {
        if rule.rule_id.is_empty() || !rule_ids.insert(rule.rule_id.as_str()) {
            return Err(invalid(format!(
                "rule id '{}' is empty or declared twice",
                rule.rule_id
            )));
        }
        let empty_side = match &rule.kind {
            RuleKind::Identity { lhs, rhs } => lhs.is_empty() || rhs.is_empty(),
            RuleKind::Crossfoot { components, .. } => components.is_empty(),
        };
        if empty_side {
            return Err(invalid(format!("rule '{}' has no terms", rule.rule_id)));
        }
        for key in rule.keys() {
            if !taxonomy.contains_key(key) {
                return Err(DigitizationError::UnknownRuleKey {
                    rule_id: rule.rule_id.clone(),
                    statement: statement.clone(),
                    key: key.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn validate_classification_rule(idx: usize, rule: &ClassificationRule) -> Result<()> {
    let invalid = |details: &str| DigitizationError::InvalidTaxonomy {
        statement: rule.statement_type.to_string(),
        details: format!("classification rule #{}: {}", idx, details),
    };

    if rule.statement_type == StatementType::Unknown {
        return Err(invalid("cannot vote for unknown"));
    }
    if !(rule.weight.is_finite() && rule.weight > 0.0) {
        return Err(invalid("weight must be positive"));
    }
    match &rule.signal {
        SignalRule::HeaderKeyword { keyword } | SignalRule::BodyKeyword { keyword }
            if keyword.trim().is_empty() =>
        {
            Err(invalid("keyword is empty"))
        }
        SignalRule::LineItemDensity { min_ratio } if !(0.0..=1.0).contains(min_ratio) => {
            Err(invalid("min_ratio must be between 0.0 and 1.0"))
        }
        _ => Ok(()),
    }
}
