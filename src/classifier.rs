//! Rule-vote page classification.
//!
//! Each configured rule inspects a page's signals and, when it fires, adds its
//! weight to one statement type. The highest total wins; confidence is the
//! normalized margin over the runner-up.

use crate::layout::PageLayout;
use crate::mapper::SemanticMapper;
use crate::schema::{ClassifiedPage, NormalizedValue, PeriodKind, StatementType};
use crate::taxonomy::PipelineConfig;
use crate::utils::{collapse_whitespace, round_confidence};
use log::{debug, warn};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of leading text lines treated as the page header.
pub const HEADER_LINES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SignalRule {
    #[schemars(description = "Keyword found in the first text lines of the page")]
    HeaderKeyword { keyword: String },

    #[schemars(description = "Keyword found anywhere in the page text or row labels")]
    BodyKeyword { keyword: String },

    #[schemars(
        description = "Share of row labels that hit the statement's synonym dictionary without fuzzy matching"
    )]
    LineItemDensity { min_ratio: f64 },

    #[schemars(description = "A header period of this kind was parsed on the page")]
    PeriodKind { period: PeriodKind },

    #[schemars(description = "Page carries a table at least this large")]
    TableShape {
        min_rows: usize,
        min_amount_columns: usize,
    },
}

impl SignalRule {
    fn describe(&self) -> String {
        match self {
            SignalRule::HeaderKeyword { keyword } => format!("header_keyword:{}", keyword),
            SignalRule::BodyKeyword { keyword } => format!("body_keyword:{}", keyword),
            SignalRule::LineItemDensity { min_ratio } => format!("line_item_density:{}", min_ratio),
            SignalRule::PeriodKind { period } => match period {
                PeriodKind::PointInTime => "period_kind:point_in_time".to_string(),
                PeriodKind::Duration => "period_kind:duration".to_string(),
            },
            SignalRule::TableShape {
                min_rows,
                min_amount_columns,
            } => format!("table_shape:{}x{}", min_rows, min_amount_columns),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ClassificationRule {
    pub statement_type: StatementType,
    pub weight: f64,
    #[serde(flatten)]
    pub signal: SignalRule,
}

/// What the classifier sees of a page. Text is lowercased and
/// whitespace-collapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSignals {
    pub page_id: u32,
    pub header_text: String,
    pub body_text: String,
    pub row_labels: Vec<String>,
    pub period_kinds: Vec<PeriodKind>,
    pub table_rows: usize,
    pub amount_columns: usize,
}

impl PageSignals {
    /// `header_periods` are the normalized title lines and column headers of
    /// the page; only the ones that parsed as periods contribute.
    pub fn from_layout(
        text_lines: &[String],
        layout: &PageLayout,
        header_periods: &[NormalizedValue],
    ) -> Self {
        let header_text = text_lines
            .iter()
            .take(HEADER_LINES)
            .map(|line| collapse_whitespace(line))
            .collect::<Vec<_>>()
            .join(" | ");

        let row_labels: Vec<String> = layout
            .items
            .iter()
            .map(|item| item.source_label.clone())
            .collect();

        let body_text = text_lines
            .iter()
            .map(String::as_str)
            .chain(layout.headings.iter().map(|h| h.raw.as_str()))
            .chain(row_labels.iter().map(String::as_str))
            .map(collapse_whitespace)
            .collect::<Vec<_>>()
            .join(" | ");

        let mut period_kinds = Vec::new();
        for kind in header_periods.iter().filter_map(|v| v.period()).map(|p| p.kind()) {
            if !period_kinds.contains(&kind) {
                period_kinds.push(kind);
            }
        }

        Self {
            page_id: layout.page_id,
            header_text,
            body_text,
            row_labels,
            period_kinds,
            table_rows: layout.items.len(),
            amount_columns: layout.column_count(),
        }
    }
}

pub struct PageClassifier<'a> {
    rules: &'a [ClassificationRule],
    min_confidence: f64,
    mappers: &'a BTreeMap<StatementType, SemanticMapper>,
}

impl<'a> PageClassifier<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        mappers: &'a BTreeMap<StatementType, SemanticMapper>,
    ) -> Self {
        Self {
            rules: &config.classification_rules,
            min_confidence: config.thresholds.classification_min_confidence,
            mappers,
        }
    }

    pub fn classify(&self, signals: &PageSignals) -> ClassifiedPage {
        let mut votes: BTreeMap<StatementType, f64> = BTreeMap::new();
        let mut fired: BTreeMap<StatementType, Vec<String>> = BTreeMap::new();

        for rule in self.rules {
            if self.fires(rule, signals) {
                *votes.entry(rule.statement_type).or_insert(0.0) += rule.weight;
                fired
                    .entry(rule.statement_type)
                    .or_default()
                    .push(rule.signal.describe());
            }
        }

        let mut winner: Option<(StatementType, f64)> = None;
        for statement_type in StatementType::PRIORITY {
            // zero or negative weights only reach here through unvalidated configs
            let Some(&vote) = votes.get(&statement_type).filter(|v| **v > 0.0) else {
                continue;
            };
            if winner.map_or(true, |(_, best)| vote > best) {
                winner = Some((statement_type, vote));
            }
        }

        let Some((statement_type, vote)) = winner else {
            debug!("page {}: no positive classification vote", signals.page_id);
            return ClassifiedPage {
                page_id: signals.page_id,
                statement_type: StatementType::Unknown,
                classification_confidence: 0.0,
                signals: Vec::new(),
            };
        };

        let runner_up = votes
            .iter()
            .filter(|(t, _)| **t != statement_type)
            .map(|(_, v)| *v)
            .fold(0.0, f64::max);
        let confidence = round_confidence((vote - runner_up) / vote);
        let mut page_signals = fired.remove(&statement_type).unwrap_or_default();

        if confidence < self.min_confidence {
            warn!(
                "page {}: {} won with margin {:.2}, classifying as unknown",
                signals.page_id, statement_type, confidence
            );
            page_signals.push(format!("low_confidence_candidate:{}", statement_type));
            return ClassifiedPage {
                page_id: signals.page_id,
                statement_type: StatementType::Unknown,
                classification_confidence: confidence,
                signals: page_signals,
            };
        }

        debug!(
            "page {}: {} ({:.2})",
            signals.page_id, statement_type, confidence
        );
        ClassifiedPage {
            page_id: signals.page_id,
            statement_type,
            classification_confidence: confidence,
            signals: page_signals,
        }
    }

    /// Classifies every page in parallel; output order matches input.
    pub fn classify_pages(&self, pages: &[PageSignals]) -> Vec<ClassifiedPage> {
        pages.par_iter().map(|page| self.classify(page)).collect()
    }

    fn fires(&self, rule: &ClassificationRule, signals: &PageSignals) -> bool {
        match &rule.signal {
            SignalRule::HeaderKeyword { keyword } => {
                signals.header_text.contains(&collapse_whitespace(keyword))
            }
            SignalRule::BodyKeyword { keyword } => {
                signals.body_text.contains(&collapse_whitespace(keyword))
            }
            SignalRule::LineItemDensity { min_ratio } => {
                let Some(mapper) = self.mappers.get(&rule.statement_type) else {
                    return false;
                };
                if signals.row_labels.is_empty() {
                    return false;
                }
                let hits = signals
                    .row_labels
                    .iter()
                    .filter(|label| mapper.has_dictionary_hit(label))
                    .count();
                hits > 0 && hits as f64 / signals.row_labels.len() as f64 >= *min_ratio
            }
            SignalRule::PeriodKind { period } => signals.period_kinds.contains(period),
            SignalRule::TableShape {
                min_rows,
                min_amount_columns,
            } => signals.table_rows >= *min_rows && signals.amount_columns >= *min_amount_columns,
        }
    }
}

/// Classifies one page against a validated configuration.
pub fn classify(signals: &PageSignals, config: &PipelineConfig) -> ClassifiedPage {
    let mappers = build_mappers(config);
    PageClassifier::new(config, &mappers).classify(signals)
}

pub fn build_mappers(config: &PipelineConfig) -> BTreeMap<StatementType, SemanticMapper> {
    config
        .statements
        .iter()
        .map(|taxonomy| {
            (
                taxonomy.statement_type,
                SemanticMapper::new(taxonomy, &config.thresholds),
            )
        })
        .collect()
}
