use crate::utils::fiscal_year_label;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[schemars(description = "Text layer embedded in the PDF")]
    PdfText,
    #[schemars(description = "Text recognised from a scanned image")]
    Ocr,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// One piece of text as produced by the extraction layer. Never modified by
/// the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RawField {
    #[schemars(description = "Text exactly as extracted")]
    pub raw: String,
    #[schemars(description = "1-based page number")]
    pub page: u32,
    pub bbox: BoundingBox,
    pub source: SourceKind,
}

impl RawField {
    pub fn new(raw: impl Into<String>, page: u32, source: SourceKind) -> Self {
        Self {
            raw: raw.into(),
            page,
            bbox: BoundingBox::default(),
            source,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    /// A field carved out of this one (e.g. an amount detached from a label
    /// cell). Keeps the page, box and source of its parent.
    pub fn derive(&self, raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            page: self.page,
            bbox: self.bbox,
            source: self.source,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DigitGrouping {
    #[default]
    #[schemars(description = "Lakh/crore grouping: 1,23,45,678")]
    Indian,
    #[schemars(description = "Thousands grouping: 12,345,678")]
    Western,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportedUnit {
    #[default]
    Units,
    Thousands,
    Lakhs,
    Millions,
    Crores,
}

impl ReportedUnit {
    pub fn multiplier(&self) -> Decimal {
        match self {
            ReportedUnit::Units => Decimal::ONE,
            ReportedUnit::Thousands => Decimal::from(1_000),
            ReportedUnit::Lakhs => Decimal::from(100_000),
            ReportedUnit::Millions => Decimal::from(1_000_000),
            ReportedUnit::Crores => Decimal::from(10_000_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct LocaleHint {
    #[serde(default)]
    pub grouping: DigitGrouping,

    #[serde(default)]
    pub date_order: DateOrder,

    #[serde(default = "default_currency")]
    #[schemars(description = "ISO currency code recorded in the envelope")]
    pub currency: String,

    #[serde(default)]
    #[schemars(description = "Unit amounts are reported in. Values are scaled to units.")]
    pub reported_unit: ReportedUnit,

    #[serde(default)]
    #[schemars(
        description = "True when the document itself states the unit (e.g. '(Rs. in Lakhs)'). Scaling by an undeclared unit counts as a heuristic."
    )]
    pub unit_declared: bool,

    #[serde(default = "default_fiscal_year_start_month")]
    #[schemars(description = "First month of the fiscal year (4 = April)")]
    pub fiscal_year_start_month: u32,
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_fiscal_year_start_month() -> u32 {
    4
}

impl Default for LocaleHint {
    fn default() -> Self {
        Self {
            grouping: DigitGrouping::Indian,
            date_order: DateOrder::DayFirst,
            currency: default_currency(),
            reported_unit: ReportedUnit::Units,
            unit_declared: false,
            fiscal_year_start_month: default_fiscal_year_start_month(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    PointInTime,
    Duration,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FiscalPeriod {
    #[schemars(description = "A balance date (balance sheet)")]
    PointInTime { as_of: NaiveDate },
    #[schemars(description = "A reporting period (income & expenditure, cash flow)")]
    Duration { start: NaiveDate, end: NaiveDate },
}

impl FiscalPeriod {
    pub fn kind(&self) -> PeriodKind {
        match self {
            FiscalPeriod::PointInTime { .. } => PeriodKind::PointInTime,
            FiscalPeriod::Duration { .. } => PeriodKind::Duration,
        }
    }

    pub fn end_date(&self) -> NaiveDate {
        match self {
            FiscalPeriod::PointInTime { as_of } => *as_of,
            FiscalPeriod::Duration { end, .. } => *end,
        }
    }

    pub fn label(&self, fiscal_year_start_month: u32) -> String {
        fiscal_year_label(self.end_date(), fiscal_year_start_month)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParsedValue {
    Amount(Decimal),
    Period(FiscalPeriod),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizationNote {
    Blank,
    FootnoteMarkerRemoved,
    CurrencyMarkerRemoved,
    ParenthesizedNegative,
    LeadingMinus,
    TrailingSignMarker,
    DebitCreditMarker,
    UnitScaled,
    UnitAssumed,
    NonLocaleGrouping,
    IrregularGrouping,
    OcrDigitSubstitution,
    AmbiguousSign,
    DateOrderAssumed,
    TwoDigitYear,
    FiscalYearEndAssumed,
    InconsistentFiscalYear,
    InvalidCalendarDate,
    /// The scaled amount does not fit a 96-bit decimal.
    OutOfRange,
    Unparseable,
}

impl NormalizationNote {
    /// Notes that record a disambiguation guess. Each one costs confidence.
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            NormalizationNote::UnitAssumed
                | NormalizationNote::NonLocaleGrouping
                | NormalizationNote::OcrDigitSubstitution
                | NormalizationNote::AmbiguousSign
                | NormalizationNote::DateOrderAssumed
                | NormalizationNote::TwoDigitYear
                | NormalizationNote::FiscalYearEndAssumed
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct NormalizedValue {
    #[schemars(description = "The extracted field, kept even when no value could be parsed")]
    pub raw: RawField,
    pub value: Option<ParsedValue>,
    #[schemars(description = "1.0 for unambiguous input, lowered per heuristic applied")]
    pub normalization_confidence: f64,
    pub normalization_notes: Vec<NormalizationNote>,
}

impl NormalizedValue {
    pub fn amount(&self) -> Option<Decimal> {
        match self.value {
            Some(ParsedValue::Amount(amount)) => Some(amount),
            _ => None,
        }
    }

    pub fn period(&self) -> Option<FiscalPeriod> {
        match self.value {
            Some(ParsedValue::Period(period)) => Some(period),
            _ => None,
        }
    }

    pub fn has_note(&self, note: NormalizationNote) -> bool {
        self.normalization_notes.contains(&note)
    }
}

/// Declaration order is the classifier's tie-break priority.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    BalanceSheet,
    IncomeExpenditure,
    CashFlow,
    Schedule,
    AuditorReport,
    Unknown,
}

impl StatementType {
    pub const PRIORITY: [StatementType; 6] = [
        StatementType::BalanceSheet,
        StatementType::IncomeExpenditure,
        StatementType::CashFlow,
        StatementType::Schedule,
        StatementType::AuditorReport,
        StatementType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementType::BalanceSheet => "balance_sheet",
            StatementType::IncomeExpenditure => "income_expenditure",
            StatementType::CashFlow => "cash_flow",
            StatementType::Schedule => "schedule",
            StatementType::AuditorReport => "auditor_report",
            StatementType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StatementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ClassifiedPage {
    pub page_id: u32,
    pub statement_type: StatementType,
    #[schemars(description = "Normalised margin between the winning and runner-up vote")]
    pub classification_confidence: f64,
    #[schemars(description = "Rules that fired for the winning statement type")]
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Normalized,
    Fuzzy,
    Unmapped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CanonicalLineItem {
    #[schemars(description = "Taxonomy key, null when the label could not be mapped")]
    pub canonical_key: Option<String>,
    #[schemars(description = "Label text as it appeared on the page")]
    pub source_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Schedule or note reference printed next to the label")]
    pub reference: Option<String>,
    pub match_tier: MatchTier,
    pub mapping_confidence: f64,
    pub value: NormalizedValue,
}

impl CanonicalLineItem {
    /// The weaker of the normalization and mapping confidences. Unmapped
    /// items only contribute their normalization confidence; the mapping
    /// failure is reported through findings instead.
    pub fn field_confidence(&self) -> f64 {
        match self.match_tier {
            MatchTier::Unmapped => self.value.normalization_confidence,
            _ => self
                .value
                .normalization_confidence
                .min(self.mapping_confidence),
        }
    }

    pub fn field_ref(&self) -> String {
        match &self.canonical_key {
            Some(key) => key.clone(),
            None => format!("unmapped:{}", self.source_label),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Passed,
    Failed,
    MissingInput,
    NotApplicable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ValidationFinding {
    pub rule_id: String,
    pub status: FindingStatus,
    pub severity: Severity,
    pub message: String,
    pub involved_keys: BTreeSet<String>,
    pub expected: Option<Decimal>,
    pub actual: Option<Decimal>,
    pub variance: Option<Decimal>,
    pub tolerance: Option<Decimal>,
}

impl ValidationFinding {
    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            FindingStatus::Failed | FindingStatus::MissingInput
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ValidationSummary {
    pub validation_status: ValidationStatus,
    pub findings_evaluated: usize,
    pub info_count: usize,
    pub warn_count: usize,
    pub high_count: usize,
    #[schemars(description = "Rule ids of failed findings, in evaluation order")]
    pub failed_rules: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewReason {
    RuleViolation,
    MissingRuleInput,
    UnmappedRequiredKey,
    LowClassificationConfidence,
    LowFieldConfidence,
    NoStatementContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReviewFlag {
    pub reason: ReviewReason,
    pub severity: Severity,
    #[schemars(description = "Statement instance or page the flag belongs to")]
    pub scope: String,
    pub detail: String,
    pub triggering_findings: BTreeSet<String>,
    pub triggering_fields: BTreeSet<String>,
}

impl ReviewReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewReason::RuleViolation => "RULE_VIOLATION",
            ReviewReason::MissingRuleInput => "MISSING_RULE_INPUT",
            ReviewReason::UnmappedRequiredKey => "UNMAPPED_REQUIRED_KEY",
            ReviewReason::LowClassificationConfidence => "LOW_CLASSIFICATION_CONFIDENCE",
            ReviewReason::LowFieldConfidence => "LOW_FIELD_CONFIDENCE",
            ReviewReason::NoStatementContent => "NO_STATEMENT_CONTENT",
        }
    }
}

impl ReviewFlag {
    /// "LOW_CLASSIFICATION_CONFIDENCE:page:3" style code for the envelope's
    /// flat reason list.
    pub fn reason_code(&self) -> String {
        format!("{}:{}", self.reason.as_str(), self.scope)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
pub struct ConfidenceSummary {
    #[schemars(description = "Mean of the available component scores")]
    pub overall: Option<f64>,
    pub classification: Option<f64>,
    pub normalization: Option<f64>,
    pub mapping: Option<f64>,
    #[schemars(description = "Share of findings that passed")]
    pub validation: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct EvidenceRef {
    pub source_label: String,
    pub page: u32,
    pub bbox: BoundingBox,
    pub raw_value: String,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CanonicalRecord {
    pub statement_type: StatementType,
    pub period: Option<FiscalPeriod>,
    #[schemars(description = "FY label of the period, or the column position when no period header was found")]
    pub period_label: String,
    pub pages: Vec<ClassifiedPage>,
    pub line_items: Vec<CanonicalLineItem>,
    pub findings: Vec<ValidationFinding>,
    pub validation: ValidationSummary,
    pub review_flags: Vec<ReviewFlag>,
    pub requires_manual_review: bool,
    pub confidence: ConfidenceSummary,
    #[schemars(description = "Field reference to every place on the page it was read from")]
    pub evidence_index: BTreeMap<String, Vec<EvidenceRef>>,
}

impl CanonicalRecord {
    pub fn scope(&self) -> String {
        format!("{}/{}", self.statement_type, self.period_label)
    }

    pub fn line_item(&self, key: &str) -> Option<&CanonicalLineItem> {
        self.line_items
            .iter()
            .find(|item| item.canonical_key.as_deref() == Some(key))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SourceUnits {
    pub currency: String,
    pub reported_unit: ReportedUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct DigitizationEnvelope {
    pub schema_version: String,
    pub document_id: String,
    pub source_units: SourceUnits,
    pub page_map: Vec<ClassifiedPage>,
    pub records: Vec<CanonicalRecord>,
    pub confidence: ConfidenceSummary,
    #[schemars(description = "Findings of every record taken together")]
    pub validation: ValidationSummary,
    pub requires_manual_review: bool,
    pub review_flags: Vec<ReviewFlag>,
    pub review_reasons: Vec<String>,
}

impl DigitizationEnvelope {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(DigitizationEnvelope)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn records_of(&self, statement_type: StatementType) -> impl Iterator<Item = &CanonicalRecord> {
        self.records
            .iter()
            .filter(move |record| record.statement_type == statement_type)
    }
}

/// One page as handed over by the extraction layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExtractedPage {
    pub page_id: u32,
    #[serde(default)]
    #[schemars(description = "Free text lines in reading order (titles, notes, narrative)")]
    pub text: Vec<RawField>,
    #[serde(default)]
    #[schemars(description = "Table rows, each a list of cells in column order")]
    pub rows: Vec<Vec<RawField>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExtractedDocument {
    pub document_id: String,
    pub pages: Vec<ExtractedPage>,
}
