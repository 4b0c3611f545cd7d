use crate::classifier::{build_mappers, PageClassifier, PageSignals, HEADER_LINES};
use crate::error::Result;
use crate::layout::{layout_page, PageLayout, SourceLineItem};
use crate::mapper::SemanticMapper;
use crate::normalizer::{detect_reported_unit, Normalizer};
use crate::review::{aggregate, confidence_summary, no_statement_content};
use crate::rules::{summarize_findings, FinancialRulesValidator};
use crate::schema::{
    CanonicalRecord, ClassifiedPage, DigitizationEnvelope, EvidenceRef, ExtractedDocument,
    ExtractedPage, FiscalPeriod, LocaleHint, NormalizedValue, ReviewFlag, SourceUnits,
    StatementType, SCHEMA_VERSION,
};
use crate::taxonomy::{PipelineConfig, StatementTaxonomy};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// A page after layout recovery, ready for classification.
struct PreparedPage {
    layout: PageLayout,
    normalizer: Normalizer,
    unit_declared: bool,
    column_periods: Vec<NormalizedValue>,
    title_period: Option<FiscalPeriod>,
    signals: PageSignals,
}

/// One statement type for one period column.
struct InstancePlan<'p> {
    statement_type: StatementType,
    column: usize,
    pages: Vec<(&'p PreparedPage, ClassifiedPage)>,
}

pub struct DigitizationPipeline<'a> {
    config: &'a PipelineConfig,
    mappers: BTreeMap<StatementType, SemanticMapper>,
    fallback_taxonomies: BTreeMap<StatementType, StatementTaxonomy>,
}

impl<'a> DigitizationPipeline<'a> {
    /// Validates the configuration. A pipeline that was built never fails on
    /// document content.
    pub fn new(config: &'a PipelineConfig) -> Result<Self> {
        config.validate()?;

        let mut mappers = build_mappers(config);
        let mut fallback_taxonomies = BTreeMap::new();
        for statement_type in StatementType::PRIORITY {
            if config.statement(statement_type).is_none() {
                let taxonomy = StatementTaxonomy::empty(statement_type);
                mappers.insert(
                    statement_type,
                    SemanticMapper::new(&taxonomy, &config.thresholds),
                );
                fallback_taxonomies.insert(statement_type, taxonomy);
            }
        }

        Ok(Self {
            config,
            mappers,
            fallback_taxonomies,
        })
    }

    pub fn digitize(&self, document: &ExtractedDocument) -> DigitizationEnvelope {
        info!(
            "Digitizing document {} ({} pages)",
            document.document_id,
            document.pages.len()
        );

        let prepared: Vec<PreparedPage> = document
            .pages
            .par_iter()
            .map(|page| self.prepare_page(page))
            .collect();

        let signals: Vec<PageSignals> = prepared.iter().map(|p| p.signals.clone()).collect();
        let classifier = PageClassifier::new(self.config, &self.mappers);
        let page_map = classifier.classify_pages(&signals);
        debug!(
            "Classified {} pages: {:?}",
            page_map.len(),
            page_map.iter().map(|p| p.statement_type).collect::<Vec<_>>()
        );

        let plans = self.plan_instances(&prepared, &page_map);
        let mut records: Vec<CanonicalRecord> = plans
            .par_iter()
            .map(|plan| self.build_record(plan))
            .collect();

        let unknown_pages: Vec<ClassifiedPage> = page_map
            .iter()
            .filter(|p| p.statement_type == StatementType::Unknown)
            .cloned()
            .collect();

        if records.is_empty() {
            warn!(
                "Document {}: no page classified, emitting an unknown record",
                document.document_id
            );
            records.push(self.unknown_record(unknown_pages.clone()));
        }

        let mut review_flags: Vec<ReviewFlag> = Vec::new();
        let page_flags = if unknown_pages.is_empty() {
            Vec::new()
        } else {
            aggregate(
                "document",
                &[],
                &unknown_pages,
                &[],
                &[],
                &self.config.thresholds,
            )
        };
        for flag in records
            .iter()
            .flat_map(|r| r.review_flags.iter())
            .chain(page_flags.iter())
        {
            if !review_flags.contains(flag) {
                review_flags.push(flag.clone());
            }
        }

        let mut review_reasons: Vec<String> = Vec::new();
        for code in review_flags.iter().map(ReviewFlag::reason_code) {
            if !review_reasons.contains(&code) {
                review_reasons.push(code);
            }
        }

        let all_items: Vec<_> = records
            .iter()
            .flat_map(|r| r.line_items.iter().cloned())
            .collect();
        let all_findings: Vec<_> = records
            .iter()
            .flat_map(|r| r.findings.iter().cloned())
            .collect();
        let confidence = confidence_summary(&page_map, &all_items, &all_findings);
        let validation = summarize_findings(&all_findings);

        let reported_unit = prepared
            .iter()
            .find(|p| p.unit_declared)
            .map(|p| p.normalizer.locale().reported_unit)
            .unwrap_or(self.config.locale.reported_unit);

        info!(
            "Document {}: {} records, {} review flags",
            document.document_id,
            records.len(),
            review_flags.len()
        );

        DigitizationEnvelope {
            schema_version: SCHEMA_VERSION.to_string(),
            document_id: document.document_id.clone(),
            source_units: SourceUnits {
                currency: self.config.locale.currency.clone(),
                reported_unit,
            },
            page_map,
            records,
            confidence,
            validation,
            requires_manual_review: !review_flags.is_empty(),
            review_flags,
            review_reasons,
        }
    }

    fn prepare_page(&self, page: &ExtractedPage) -> PreparedPage {
        let layout = layout_page(page);

        let mut text_lines: Vec<String> = page.text.iter().map(|f| f.raw.clone()).collect();
        if text_lines.is_empty() {
            text_lines = layout.headings.iter().map(|h| h.raw.clone()).collect();
        }

        let declared = text_lines
            .iter()
            .chain(layout.headings.iter().map(|h| &h.raw))
            .chain(layout.column_headers.iter().map(|h| &h.raw))
            .find_map(|line| detect_reported_unit(line));
        let locale = match declared {
            Some(unit) => LocaleHint {
                reported_unit: unit,
                unit_declared: true,
                ..self.config.locale.clone()
            },
            None => self.config.locale.clone(),
        };
        let normalizer = Normalizer::new(locale, &self.config.thresholds);

        let header_fields: Vec<_> = page
            .text
            .iter()
            .chain(layout.headings.iter())
            .take(HEADER_LINES)
            .collect();
        let title_periods: Vec<NormalizedValue> = header_fields
            .iter()
            .map(|f| normalizer.normalize_period(f))
            .collect();
        let column_periods: Vec<NormalizedValue> = layout
            .column_headers
            .iter()
            .map(|f| normalizer.normalize_period(f))
            .collect();
        let title_period = title_periods.iter().find_map(NormalizedValue::period);

        let header_periods: Vec<NormalizedValue> = title_periods
            .into_iter()
            .chain(column_periods.iter().cloned())
            .collect();
        let signals = PageSignals::from_layout(&text_lines, &layout, &header_periods);

        debug!(
            "Page {}: {} line items, {} columns, unit declared: {}",
            page.page_id,
            layout.items.len(),
            layout.column_count(),
            declared.is_some()
        );

        PreparedPage {
            layout,
            normalizer,
            unit_declared: declared.is_some(),
            column_periods,
            title_period,
            signals,
        }
    }

    fn plan_instances<'p>(
        &self,
        prepared: &'p [PreparedPage],
        page_map: &[ClassifiedPage],
    ) -> Vec<InstancePlan<'p>> {
        let mut groups: BTreeMap<StatementType, Vec<(&'p PreparedPage, ClassifiedPage)>> =
            BTreeMap::new();
        for (page, classified) in prepared.iter().zip(page_map) {
            if classified.statement_type != StatementType::Unknown {
                groups
                    .entry(classified.statement_type)
                    .or_default()
                    .push((page, classified.clone()));
            }
        }

        let mut plans = Vec::new();
        for (statement_type, pages) in groups {
            let columns = pages
                .iter()
                .map(|(page, _)| page.layout.column_count())
                .max()
                .unwrap_or(0)
                .max(1);
            for column in 0..columns {
                plans.push(InstancePlan {
                    statement_type,
                    column,
                    pages: pages.clone(),
                });
            }
        }
        plans
    }

    fn taxonomy(&self, statement_type: StatementType) -> &StatementTaxonomy {
        self.config
            .statement(statement_type)
            .or_else(|| self.fallback_taxonomies.get(&statement_type))
            .unwrap_or(&EMPTY_TAXONOMY)
    }

    fn build_record(&self, plan: &InstancePlan<'_>) -> CanonicalRecord {
        let thresholds = &self.config.thresholds;
        let fy_start_month = self.config.locale.fiscal_year_start_month;
        let taxonomy = self.taxonomy(plan.statement_type);

        let header = plan
            .pages
            .iter()
            .find_map(|(page, _)| page.column_periods.get(plan.column));
        let period = header.and_then(NormalizedValue::period).or_else(|| {
            if plan.column == 0 {
                plan.pages.iter().find_map(|(page, _)| page.title_period)
            } else {
                None
            }
        });
        let period_label = match period {
            Some(period) => period.label(fy_start_month),
            None => format!("column-{}", plan.column + 1),
        };

        let mut sources: Vec<(&SourceLineItem, NormalizedValue)> = Vec::new();
        for (page, _) in &plan.pages {
            for item in &page.layout.items {
                let raw = item
                    .amounts
                    .get(plan.column)
                    .cloned()
                    .unwrap_or_else(|| item.label.derive(""));
                sources.push((item, page.normalizer.normalize_amount(&raw)));
            }
        }
        let labels: Vec<String> = sources.iter().map(|(item, _)| item.source_label.clone()).collect();

        let line_items = match self.mappers.get(&plan.statement_type) {
            Some(mapper) => mapper.map_statement(sources),
            None => SemanticMapper::new(taxonomy, thresholds).map_statement(sources),
        };

        let findings = FinancialRulesValidator::new(taxonomy, thresholds).validate_items(&line_items);
        let validation = summarize_findings(&findings);

        let pages: Vec<ClassifiedPage> = plan.pages.iter().map(|(_, c)| c.clone()).collect();
        let scope = format!("{}/{}", plan.statement_type, period_label);
        let header_values: Vec<&NormalizedValue> = header.into_iter().collect();
        let review_flags = aggregate(
            &scope,
            &header_values,
            &pages,
            &line_items,
            &findings,
            thresholds,
        );
        let confidence = confidence_summary(&pages, &line_items, &findings);

        let mut evidence_index: BTreeMap<String, Vec<EvidenceRef>> = BTreeMap::new();
        for (item, label) in line_items.iter().zip(labels) {
            let raw = &item.value.raw;
            evidence_index
                .entry(item.field_ref())
                .or_default()
                .push(EvidenceRef {
                    source_label: label,
                    page: raw.page,
                    bbox: raw.bbox,
                    raw_value: raw.raw.clone(),
                    source: raw.source,
                });
        }

        debug!(
            "{}: {} line items, {} findings, {} flags",
            scope,
            line_items.len(),
            findings.len(),
            review_flags.len()
        );

        CanonicalRecord {
            statement_type: plan.statement_type,
            period,
            period_label,
            pages,
            line_items,
            findings,
            validation,
            requires_manual_review: !review_flags.is_empty(),
            review_flags,
            confidence,
            evidence_index,
        }
    }

    fn unknown_record(&self, pages: Vec<ClassifiedPage>) -> CanonicalRecord {
        let scope = format!("{}/document", StatementType::Unknown);
        let mut review_flags = aggregate(&scope, &[], &pages, &[], &[], &self.config.thresholds);
        if !pages.is_empty() {
            review_flags.insert(0, no_statement_content(&scope, &pages));
        }
        CanonicalRecord {
            statement_type: StatementType::Unknown,
            period: None,
            period_label: "document".to_string(),
            confidence: confidence_summary(&pages, &[], &[]),
            pages,
            line_items: Vec::new(),
            findings: Vec::new(),
            validation: summarize_findings(&[]),
            requires_manual_review: !review_flags.is_empty(),
            review_flags,
            evidence_index: BTreeMap::new(),
        }
    }
}

static EMPTY_TAXONOMY: StatementTaxonomy = StatementTaxonomy {
    statement_type: StatementType::Unknown,
    keys: Vec::new(),
    rules: Vec::new(),
};
