use financial_statement_digitizer::*;
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Write;

fn field(text: &str, page: u32) -> RawField {
    RawField::new(text, page, SourceKind::PdfText)
}

fn page(page_id: u32, titles: &[&str], rows: &[&[&str]]) -> ExtractedPage {
    ExtractedPage {
        page_id,
        text: titles.iter().map(|t| field(t, page_id)).collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|cell| field(cell, page_id)).collect())
            .collect(),
    }
}

fn document(id: &str, pages: Vec<ExtractedPage>) -> ExtractedDocument {
    ExtractedDocument {
        document_id: id.to_string(),
        pages,
    }
}

fn balance_sheet_page(page_id: u32, assets: &str, liabilities: &str, equity: &str) -> ExtractedPage {
    page(
        page_id,
        &["XYZ Municipal Corporation", "Balance Sheet as at 31st March 2023"],
        &[
            &["Particulars", "Schedule", "As at 31.03.2023"],
            &["LIABILITIES"],
            &["Total Liabilities", "B-1", liabilities],
            &["Total Equity", "B-2", equity],
            &["ASSETS"],
            &["Total Assets", "B-3", assets],
        ],
    )
}

fn export_envelope(envelope: &DigitizationEnvelope, filename: &str) -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(filename);
    let mut file = File::create(&path)?;
    writeln!(file, "{}", serde_json::to_string_pretty(envelope)?)?;
    println!("Envelope written to {}", path.display());
    Ok(())
}

fn high_findings(envelope: &DigitizationEnvelope) -> Vec<&ValidationFinding> {
    envelope
        .records
        .iter()
        .flat_map(|r| r.findings.iter())
        .filter(|f| f.severity == Severity::High)
        .collect()
}

#[test]
fn test_municipal_balance_sheet_end_to_end() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "xyz-mc-2023",
        vec![balance_sheet_page(1, "₹1,23,45,678", "₹1,00,00,000", "₹23,45,678")],
    );

    let envelope = digitize_document(&doc, &config)?;
    export_envelope(&envelope, "xyz_mc_2023_envelope.json")?;

    assert_eq!(envelope.schema_version, SCHEMA_VERSION);
    assert_eq!(envelope.source_units.currency, "INR");
    assert_eq!(envelope.page_map.len(), 1);
    assert_eq!(envelope.page_map[0].statement_type, StatementType::BalanceSheet);

    let record = envelope
        .records_of(StatementType::BalanceSheet)
        .next()
        .expect("balance sheet record");
    assert_eq!(record.period_label, "FY2022-23");
    assert_eq!(record.scope(), "balance_sheet/FY2022-23");

    let assets = record.line_item("total_assets").expect("total assets");
    assert_eq!(assets.match_tier, MatchTier::Exact);
    assert_eq!(assets.mapping_confidence, 1.0);
    assert_eq!(assets.value.amount(), Some(Decimal::from(12_345_678)));
    assert_eq!(assets.value.normalization_confidence, 1.0);
    assert!(assets
        .value
        .has_note(NormalizationNote::CurrencyMarkerRemoved));
    assert_eq!(assets.reference.as_deref(), Some("B-3"));

    let identity = record
        .findings
        .iter()
        .find(|f| f.rule_id == "balance_sheet_identity")
        .expect("identity finding");
    assert_eq!(identity.status, FindingStatus::Passed);

    assert!(record.review_flags.is_empty());
    assert!(!envelope.requires_manual_review);
    assert!(envelope.review_reasons.is_empty());
    assert_eq!(envelope.confidence.classification, Some(1.0));

    Ok(())
}

#[test]
fn test_identity_violation_yields_one_finding_and_one_flag() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "broken",
        vec![balance_sheet_page(1, "1,23,45,678", "1,00,00,000", "20,00,000")],
    );

    let envelope = digitize_document(&doc, &config)?;
    let high = high_findings(&envelope);
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].rule_id, "balance_sheet_identity");
    assert_eq!(high[0].status, FindingStatus::Failed);
    assert_eq!(high[0].variance, Some(Decimal::from(345_678)));

    assert_eq!(envelope.review_flags.len(), 1);
    let flag = &envelope.review_flags[0];
    assert_eq!(flag.reason, ReviewReason::RuleViolation);
    assert!(flag.triggering_findings.contains("balance_sheet_identity"));
    assert!(flag.triggering_fields.contains("total_assets"));
    assert!(envelope.requires_manual_review);
    assert_eq!(
        envelope.review_reasons,
        vec!["RULE_VIOLATION:balance_sheet/FY2022-23".to_string()]
    );

    let record = &envelope.records[0];
    assert_eq!(record.validation.validation_status, ValidationStatus::Failed);
    assert!(record.requires_manual_review);
    assert_eq!(envelope.validation.failed_rules, record.validation.failed_rules);

    Ok(())
}

#[test]
fn test_misspelt_label_maps_through_fuzzy_tier() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "typo",
        vec![page(
            1,
            &["Balance Sheet as at 31st March 2023"],
            &[
                &["Total Liabilities", "600"],
                &["Total Equity", "400"],
                &["Total Asets", "1,000"],
            ],
        )],
    );

    let envelope = digitize_document(&doc, &config)?;
    let record = &envelope.records[0];
    let assets = record.line_item("total_assets").expect("fuzzy match");
    assert_eq!(assets.match_tier, MatchTier::Fuzzy);
    assert_eq!(assets.mapping_confidence, 0.92);
    assert_eq!(assets.source_label, "Total Asets");
    assert!(!envelope.requires_manual_review);

    Ok(())
}

#[test]
fn test_identical_input_serializes_identically() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "repeat",
        vec![
            balance_sheet_page(1, "1,000", "600", "400"),
            page(
                2,
                &["Cash Flow Statement for the year ended 31 March 2023"],
                &[
                    &["Particulars", "2022-23"],
                    &["Opening Balance", "300"],
                    &["Net Increase in Cash", "200"],
                    &["Closing Balance", "500"],
                ],
            ),
            page(3, &["Notes forming part of accounts"], &[]),
        ],
    );

    let first = digitize_document_json(&doc, &config)?;
    let second = digitize_document_json(&doc, &config)?;
    assert_eq!(first, second);

    let envelope: DigitizationEnvelope = serde_json::from_str(&first)?;
    assert_eq!(envelope.page_map.len(), 3);
    assert_eq!(envelope.page_map[1].statement_type, StatementType::CashFlow);

    Ok(())
}

#[test]
fn test_unclassifiable_page_is_flagged_at_envelope_level() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "mixed",
        vec![
            balance_sheet_page(1, "1,000", "600", "400"),
            page(2, &["Message from the Commissioner"], &[]),
        ],
    );

    let envelope = digitize_document(&doc, &config)?;
    assert_eq!(envelope.page_map[1].statement_type, StatementType::Unknown);
    assert_eq!(envelope.records.len(), 1);
    assert_eq!(envelope.records[0].statement_type, StatementType::BalanceSheet);

    let flag = envelope
        .review_flags
        .iter()
        .find(|f| f.reason == ReviewReason::LowClassificationConfidence)
        .expect("page flag");
    assert_eq!(flag.scope, "page:2");
    assert!(envelope.requires_manual_review);
    assert!(envelope
        .review_reasons
        .contains(&"LOW_CLASSIFICATION_CONFIDENCE:page:2".to_string()));

    Ok(())
}

#[test]
fn test_document_with_only_unclassifiable_pages_reports_no_content() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "foreword",
        vec![page(1, &["Message from the Commissioner"], &[])],
    );

    let envelope = digitize_document(&doc, &config)?;
    assert_eq!(envelope.records.len(), 1);
    let record = &envelope.records[0];
    assert_eq!(record.statement_type, StatementType::Unknown);

    let flag = record
        .review_flags
        .iter()
        .find(|f| f.reason == ReviewReason::NoStatementContent)
        .expect("no content flag");
    assert!(flag.triggering_fields.contains("page:1"));
    assert!(envelope
        .review_reasons
        .iter()
        .any(|r| r.starts_with("NO_STATEMENT_CONTENT")));
    assert!(envelope
        .review_reasons
        .contains(&"LOW_CLASSIFICATION_CONFIDENCE:page:1".to_string()));

    Ok(())
}

#[test]
fn test_blank_current_year_cell_stays_in_its_period() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "comparative",
        vec![page(
            1,
            &["Balance Sheet as at 31st March 2023"],
            &[
                &["Particulars", "Schedule", "31.03.2023", "31.03.2022"],
                &["Total Liabilities", "B-1", "600", "500"],
                &["Total Equity", "", "", "400"],
                &["Total Assets", "B-3", "1,000", "900"],
            ],
        )],
    );

    let envelope = digitize_document(&doc, &config)?;
    let record_for = |label: &str| {
        envelope
            .records_of(StatementType::BalanceSheet)
            .find(|r| r.period_label == label)
    };

    let current = record_for("FY2022-23").expect("current year record");
    let equity = current.line_item("total_equity").expect("current equity");
    assert_eq!(equity.value.raw.raw, "");
    assert!(equity.value.value.is_none());
    assert!(equity.value.has_note(NormalizationNote::Blank));
    let identity = current
        .findings
        .iter()
        .find(|f| f.rule_id == "balance_sheet_identity")
        .expect("identity finding");
    assert_eq!(identity.status, FindingStatus::MissingInput);

    let prior = record_for("FY2021-22").expect("prior year record");
    let equity = prior.line_item("total_equity").expect("prior equity");
    assert_eq!(equity.value.amount(), Some(Decimal::from(400)));
    let identity = prior
        .findings
        .iter()
        .find(|f| f.rule_id == "balance_sheet_identity")
        .expect("identity finding");
    assert_eq!(identity.status, FindingStatus::Passed);

    Ok(())
}

#[test]
fn test_amounts_past_decimal_range_still_yield_a_record() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let huge = "50000000000000000000000000000";
    let doc = document("overflow", vec![balance_sheet_page(1, "1,000", huge, huge)]);

    let envelope = digitize_document(&doc, &config)?;
    let record = envelope
        .records_of(StatementType::BalanceSheet)
        .next()
        .expect("balance sheet record");
    let identity = record
        .findings
        .iter()
        .find(|f| f.rule_id == "balance_sheet_identity")
        .expect("identity finding");
    assert_eq!(identity.status, FindingStatus::MissingInput);
    assert_eq!(identity.severity, Severity::High);
    assert!(envelope.requires_manual_review);

    let mut crores = config.clone();
    crores.locale.reported_unit = ReportedUnit::Crores;
    let doc = document(
        "overflow-scaled",
        vec![balance_sheet_page(1, "1234567890123456789012345", "600", "400")],
    );
    let envelope = digitize_document(&doc, &crores)?;
    let record = envelope
        .records_of(StatementType::BalanceSheet)
        .next()
        .expect("balance sheet record");
    let assets = record.line_item("total_assets").expect("total assets");
    assert!(assets.value.value.is_none());
    assert!(assets.value.has_note(NormalizationNote::OutOfRange));

    Ok(())
}

#[test]
fn test_empty_document_yields_unknown_record() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let envelope = digitize_document(&document("empty", Vec::new()), &config)?;

    assert_eq!(envelope.records.len(), 1);
    let record = &envelope.records[0];
    assert_eq!(record.statement_type, StatementType::Unknown);
    assert!(record.line_items.is_empty());
    assert_eq!(record.review_flags[0].reason, ReviewReason::NoStatementContent);
    assert!(envelope.requires_manual_review);
    assert_eq!(envelope.confidence, ConfidenceSummary::default());

    Ok(())
}

#[test]
fn test_missing_required_key_is_flagged_specifically() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "partial",
        vec![page(
            1,
            &["Balance Sheet as at 31st March 2023"],
            &[&["Total Assets", "1,000"], &["Total Liabilities", "1,000"]],
        )],
    );

    let envelope = digitize_document(&doc, &config)?;
    let reasons: Vec<ReviewReason> = envelope.review_flags.iter().map(|f| f.reason).collect();
    assert!(reasons.contains(&ReviewReason::UnmappedRequiredKey));
    assert!(reasons.contains(&ReviewReason::MissingRuleInput));

    let missing = envelope
        .review_flags
        .iter()
        .find(|f| f.reason == ReviewReason::UnmappedRequiredKey)
        .expect("required key flag");
    assert!(missing.triggering_fields.contains("total_equity"));

    Ok(())
}

#[test]
fn test_unresolved_sign_downgrades_violation() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let doc = document(
        "receipts",
        vec![page(
            1,
            &["Cash Flow Statement for the year ended 31 March 2023"],
            &[
                &["Particulars", "2022-23"],
                &["Opening Balance", "600"],
                &["Net Increase in Cash", "100 Cr"],
                &["Closing Balance", "1,000"],
            ],
        )],
    );

    let envelope = digitize_document(&doc, &config)?;
    let record = envelope
        .records_of(StatementType::CashFlow)
        .next()
        .expect("cash flow record");

    let net = record.line_item("net_cash_flow").expect("net cash flow");
    assert!(net.value.has_note(NormalizationNote::AmbiguousSign));
    assert_eq!(net.value.normalization_confidence, 0.9);

    let reconciliation = record
        .findings
        .iter()
        .find(|f| f.rule_id == "cash_flow_reconciliation")
        .expect("reconciliation finding");
    assert_eq!(reconciliation.status, FindingStatus::Failed);
    assert_eq!(reconciliation.severity, Severity::Warn);

    let crossfoot = record
        .findings
        .iter()
        .find(|f| f.rule_id == "cash_flow_activity_crossfoot")
        .expect("crossfoot finding");
    assert_eq!(crossfoot.status, FindingStatus::NotApplicable);

    assert!(high_findings(&envelope).is_empty());
    assert!(record.review_flags.is_empty());

    Ok(())
}

#[test]
fn test_every_high_finding_has_a_flag() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let docs = vec![
        document("a", vec![balance_sheet_page(1, "1,000", "900", "400")]),
        document("b", vec![balance_sheet_page(1, "1,000", "see note", "")]),
        document(
            "c",
            vec![page(
                1,
                &["Income and Expenditure Account for the year ended 31st March 2023"],
                &[&["Total Income", "500"], &["Total Expenditure", "700"], &["Surplus/(Deficit)", "200"]],
            )],
        ),
    ];

    for doc in &docs {
        let envelope = digitize_document(doc, &config)?;
        for record in &envelope.records {
            for finding in record.findings.iter().filter(|f| f.severity == Severity::High) {
                assert!(
                    record
                        .review_flags
                        .iter()
                        .any(|flag| flag.triggering_findings.contains(&finding.rule_id)),
                    "{}: unflagged high finding {}",
                    doc.document_id,
                    finding.rule_id
                );
            }
            if record.findings.iter().all(|f| !f.is_failure())
                && record
                    .line_items
                    .iter()
                    .all(|i| i.field_confidence() >= config.thresholds.field_confidence_floor)
                && record.pages.iter().all(|p| {
                    p.classification_confidence >= config.thresholds.classification_min_confidence
                })
            {
                assert!(record.review_flags.is_empty());
            }
        }
        assert!(!high_findings(&envelope).is_empty());
        assert!(envelope.requires_manual_review);
    }

    Ok(())
}

#[test]
fn test_config_round_trips_through_file() -> anyhow::Result<()> {
    let config = PipelineConfig::default_municipal()?;
    let path = std::env::temp_dir().join("financial_statement_digitizer_config.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;

    let loaded = PipelineConfig::from_path(&path)?;
    assert_eq!(loaded, config);

    let missing = PipelineConfig::from_path(std::env::temp_dir().join("does-not-exist.json"));
    assert!(matches!(missing, Err(DigitizationError::IoError(_))));

    Ok(())
}

#[test]
fn test_schema_generation() {
    let envelope_schema = DigitizationEnvelope::schema_as_json().unwrap();
    assert!(envelope_schema.contains("review_reasons"));
    assert!(envelope_schema.contains("normalization_notes"));

    let config_schema = PipelineConfig::schema_as_json().unwrap();
    assert!(config_schema.contains("statement_type"));
}
