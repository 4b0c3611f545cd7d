//! # Financial Statement Digitizer
//!
//! Turns text and table cells extracted from scanned or digital financial
//! statements (Indian municipal annual accounts in particular) into canonical,
//! validated records with confidence scores and review flags.
//!
//! ## Core Concepts
//!
//! - **Normalization**: locale-aware parsing of amounts (`₹1,23,45,678`,
//!   `(1,234)`, `1,500 Dr`) and periods (`FY 2022-23`, `As at 31st March 2023`)
//! - **Classification**: rule votes decide whether a page is a balance sheet,
//!   income & expenditure account, cash flow statement, schedule or auditor's
//!   report
//! - **Mapping**: printed labels are matched to canonical keys through exact,
//!   normalized and fuzzy tiers
//! - **Validation**: accounting identities are checked, never corrected
//! - **Review**: anything uncertain is flagged for a human instead of guessed
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_statement_digitizer::*;
//!
//! let config = PipelineConfig::default_municipal()?;
//! let document = ExtractedDocument {
//!     document_id: "ulb-annual-accounts-2023".to_string(),
//!     pages: vec![ExtractedPage {
//!         page_id: 1,
//!         text: vec![RawField::new("Balance Sheet as at 31st March 2023", 1, SourceKind::PdfText)],
//!         rows: vec![
//!             vec![
//!                 RawField::new("Total Assets", 1, SourceKind::PdfText),
//!                 RawField::new("₹1,23,45,678", 1, SourceKind::PdfText),
//!             ],
//!         ],
//!     }],
//! };
//!
//! let envelope = digitize_document(&document, &config)?;
//! for flag in &envelope.review_flags {
//!     println!("{}: {}", flag.reason_code(), flag.detail);
//! }
//! ```

pub mod classifier;
pub mod error;
pub mod layout;
pub mod mapper;
pub mod normalizer;
pub mod pipeline;
pub mod review;
pub mod rules;
pub mod schema;
pub mod taxonomy;
pub mod utils;

pub use classifier::{classify, ClassificationRule, PageClassifier, PageSignals, SignalRule};
pub use error::{DigitizationError, Result};
pub use layout::{layout_page, PageLayout, SourceLineItem};
pub use mapper::{map_line_item, normalize_label, LabelMatch, SemanticMapper};
pub use normalizer::{detect_reported_unit, normalize, Normalizer};
pub use pipeline::DigitizationPipeline;
pub use review::{aggregate, confidence_summary};
pub use rules::{
    summarize_findings, validate, FinancialRulesValidator, RuleDescriptor, RuleKind, RuleTerm,
    TermSign,
};
pub use schema::*;
pub use taxonomy::{CanonicalKeySpec, FuzzyAlgorithm, PipelineConfig, StatementTaxonomy, Thresholds};

use log::{debug, info};

pub struct StatementDigitizer;

impl StatementDigitizer {
    pub fn process(
        document: &ExtractedDocument,
        config: &PipelineConfig,
    ) -> Result<DigitizationEnvelope> {
        let pipeline = DigitizationPipeline::new(config)?;

        info!(
            "Processing document {} with {} statement taxonomies",
            document.document_id,
            config.statements.len()
        );
        debug!(
            "Configuration carries {} classification rules",
            config.classification_rules.len()
        );

        let envelope = pipeline.digitize(document);

        if envelope.requires_manual_review {
            for reason in &envelope.review_reasons {
                debug!("Review required: {}", reason);
            }
        }

        Ok(envelope)
    }

    /// Processes a document and serializes the envelope. Identical input
    /// gives byte-identical output.
    pub fn process_to_json(document: &ExtractedDocument, config: &PipelineConfig) -> Result<String> {
        let envelope = Self::process(document, config)?;
        Ok(serde_json::to_string_pretty(&envelope)?)
    }
}

pub fn digitize_document(
    document: &ExtractedDocument,
    config: &PipelineConfig,
) -> Result<DigitizationEnvelope> {
    StatementDigitizer::process(document, config)
}

pub fn digitize_document_json(
    document: &ExtractedDocument,
    config: &PipelineConfig,
) -> Result<String> {
    StatementDigitizer::process_to_json(document, config)
}
