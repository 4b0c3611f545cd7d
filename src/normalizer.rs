//! Locale-aware parsing of amounts and reporting periods.
//!
//! Every input produces a [`NormalizedValue`]. Input that cannot be resolved
//! comes back with `value: None`, confidence 0.0 and a note saying why; it is
//! never an error.

use crate::schema::{
    DateOrder, DigitGrouping, FiscalPeriod, LocaleHint, NormalizationNote, NormalizedValue,
    ParsedValue, RawField, ReportedUnit,
};
use crate::taxonomy::Thresholds;
use crate::utils::{
    collapse_whitespace, expand_two_digit_year, fiscal_year_bounds, month_from_name,
    round_confidence, year_ending_start,
};
use chrono::NaiveDate;
use log::trace;
use rayon::prelude::*;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

const BLANK_MARKERS: &[&str] = &["", "-", "–", "—", "nil", "n.a.", "na", "--"];
const MINUS_SIGNS: &[char] = &['-', '–', '—', '−'];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid"))
}

fn footnote_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\s*[*#†]+$")
}

fn debit_credit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)^(.*?[0-9)])\s*(dr|cr)\.?$")
}

fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)₹|\brs\.|\brs\b|\binr\b")
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b((?:19|20)\d{2})-(\d{1,2})-(\d{1,2})\b")
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})\b")
}

fn day_month_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"\b(\d{1,2})(?:st|nd|rd|th)?[\s\-/]*([a-z]{3,9})\.?[\s,\-/]*(\d{4}|\d{2})\b",
    )
}

fn month_name_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s*(\d{4})\b")
}

fn fiscal_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\b((?:19|20)\d{2})\s*[-/–]\s*(\d{4}|\d{2})\b")
}

fn fiscal_single_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\bf\.?y\.?\s*'?(\d{4}|\d{2})\b")
}

fn duration_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"\b(?:year|period|months?)\s+(?:ended|ending)\b|\bfor the year\b",
    )
}

fn reported_unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)\bin\s+(lakhs?|lacs?|crores?|thousands?|millions?|'?000s?)\b",
    )
}

/// Looks for a unit declaration such as "(Rs. in Lakhs)" in page text.
pub fn detect_reported_unit(text: &str) -> Option<ReportedUnit> {
    let caps = reported_unit_re().captures(text)?;
    let unit = caps[1].to_lowercase();
    let unit = if unit.starts_with("lakh") || unit.starts_with("lac") {
        ReportedUnit::Lakhs
    } else if unit.starts_with("crore") {
        ReportedUnit::Crores
    } else if unit.starts_with("million") {
        ReportedUnit::Millions
    } else {
        ReportedUnit::Thousands
    };
    Some(unit)
}

pub fn is_blank_marker(text: &str) -> bool {
    BLANK_MARKERS.contains(&text.trim().to_lowercase().as_str())
}

type Parsed<T> = std::result::Result<(T, Vec<NormalizationNote>), Vec<NormalizationNote>>;

#[derive(Debug, Clone)]
pub struct Normalizer {
    locale: LocaleHint,
    heuristic_penalty: f64,
}

impl Normalizer {
    pub fn new(locale: LocaleHint, thresholds: &Thresholds) -> Self {
        Self {
            locale,
            heuristic_penalty: thresholds.heuristic_penalty,
        }
    }

    pub fn locale(&self) -> &LocaleHint {
        &self.locale
    }

    /// Same policy, different locale (e.g. a page that declares its own unit).
    pub fn with_locale(&self, locale: LocaleHint) -> Self {
        Self {
            locale,
            heuristic_penalty: self.heuristic_penalty,
        }
    }

    /// Amount first, then period. Whichever parses wins; if neither does the
    /// amount parser's diagnosis is kept.
    pub fn normalize(&self, field: &RawField) -> NormalizedValue {
        if is_blank_marker(&field.raw) {
            return self.blank(field);
        }

        match self.parse_amount(&field.raw) {
            Ok((amount, notes)) => self.finish(field, Some(ParsedValue::Amount(amount)), notes),
            Err(amount_notes) => match self.parse_period(&field.raw) {
                Ok((period, notes)) => {
                    self.finish(field, Some(ParsedValue::Period(period)), notes)
                }
                Err(_) => self.finish(field, None, amount_notes),
            },
        }
    }

    pub fn normalize_amount(&self, field: &RawField) -> NormalizedValue {
        if is_blank_marker(&field.raw) {
            return self.blank(field);
        }
        match self.parse_amount(&field.raw) {
            Ok((amount, notes)) => self.finish(field, Some(ParsedValue::Amount(amount)), notes),
            Err(notes) => self.finish(field, None, notes),
        }
    }

    pub fn normalize_period(&self, field: &RawField) -> NormalizedValue {
        if is_blank_marker(&field.raw) {
            return self.blank(field);
        }
        match self.parse_period(&field.raw) {
            Ok((period, notes)) => self.finish(field, Some(ParsedValue::Period(period)), notes),
            Err(notes) => self.finish(field, None, notes),
        }
    }

    /// Normalizes independent fields in parallel; output order matches input.
    pub fn normalize_all(&self, fields: &[RawField]) -> Vec<NormalizedValue> {
        fields.par_iter().map(|f| self.normalize(f)).collect()
    }

    fn blank(&self, field: &RawField) -> NormalizedValue {
        NormalizedValue {
            raw: field.clone(),
            value: None,
            normalization_confidence: 1.0,
            normalization_notes: vec![NormalizationNote::Blank],
        }
    }

    fn finish(
        &self,
        field: &RawField,
        value: Option<ParsedValue>,
        mut notes: Vec<NormalizationNote>,
    ) -> NormalizedValue {
        let confidence = match value {
            Some(_) => {
                let heuristics = notes.iter().filter(|n| n.is_heuristic()).count();
                round_confidence(1.0 - self.heuristic_penalty * heuristics as f64)
            }
            None => {
                if !notes.iter().any(|n| {
                    matches!(
                        n,
                        NormalizationNote::Unparseable
                            | NormalizationNote::IrregularGrouping
                            | NormalizationNote::InconsistentFiscalYear
                            | NormalizationNote::InvalidCalendarDate
                            | NormalizationNote::OutOfRange
                    )
                }) {
                    notes.push(NormalizationNote::Unparseable);
                }
                0.0
            }
        };

        trace!(
            "normalized '{}' on page {} -> {:?} ({:.2})",
            field.raw,
            field.page,
            value,
            confidence
        );

        NormalizedValue {
            raw: field.clone(),
            value,
            normalization_confidence: confidence,
            normalization_notes: notes,
        }
    }

    fn parse_amount(&self, raw: &str) -> Parsed<Decimal> {
        let mut notes = Vec::new();
        let mut text = raw.trim().to_string();

        let stripped = footnote_re().replace(&text, "").to_string();
        if stripped != text {
            notes.push(NormalizationNote::FootnoteMarkerRemoved);
            text = stripped;
        }

        if let Some(caps) = debit_credit_re().captures(&text) {
            let body = caps[1].trim().to_string();
            notes.push(NormalizationNote::DebitCreditMarker);
            notes.push(NormalizationNote::AmbiguousSign);
            text = body;
        }

        let without_currency = currency_re().replace_all(&text, "").trim().to_string();
        if without_currency != text {
            notes.push(NormalizationNote::CurrencyMarkerRemoved);
            text = without_currency;
        }

        let mut sign_markers = 0;
        if let Some(rest) = text.strip_prefix(MINUS_SIGNS) {
            notes.push(NormalizationNote::LeadingMinus);
            sign_markers += 1;
            text = rest.trim().to_string();
        }
        if let Some(rest) = text.strip_suffix(MINUS_SIGNS) {
            notes.push(NormalizationNote::TrailingSignMarker);
            sign_markers += 1;
            text = rest.trim().to_string();
        }
        if text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
            notes.push(NormalizationNote::ParenthesizedNegative);
            sign_markers += 1;
            text = text[1..text.len() - 1].trim().to_string();
            if let Some(rest) = text.strip_prefix(MINUS_SIGNS) {
                notes.push(NormalizationNote::LeadingMinus);
                sign_markers += 1;
                text = rest.trim().to_string();
            }
        }
        if let Some(rest) = text.strip_prefix('+') {
            text = rest.trim().to_string();
        }
        if sign_markers > 1 {
            notes.push(NormalizationNote::AmbiguousSign);
        }

        text = text.replace(", ", ",");

        if text.chars().any(|c| c.is_ascii_digit()) {
            if let Some(substituted) = substitute_ocr_digits(&text) {
                notes.push(NormalizationNote::OcrDigitSubstitution);
                text = substituted;
            }
        }

        let (integer, fraction) = match text.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (text.as_str(), None),
        };

        let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if let Some(fraction) = fraction {
            if !all_digits(fraction) {
                notes.push(NormalizationNote::Unparseable);
                return Err(notes);
            }
        }

        let groups: Vec<&str> = integer.split(',').collect();
        if !groups.iter().all(|g| all_digits(g)) {
            notes.push(NormalizationNote::Unparseable);
            return Err(notes);
        }

        if groups.len() > 1 {
            let indian = matches_indian_grouping(&groups);
            let western = matches_western_grouping(&groups);
            let locale_ok = match self.locale.grouping {
                DigitGrouping::Indian => indian,
                DigitGrouping::Western => western,
            };
            if !indian && !western {
                notes.push(NormalizationNote::IrregularGrouping);
                return Err(notes);
            }
            if !locale_ok {
                notes.push(NormalizationNote::NonLocaleGrouping);
            }
        }

        let mut canonical = groups.concat();
        if let Some(fraction) = fraction {
            canonical.push('.');
            canonical.push_str(fraction);
        }

        let mut value = match Decimal::from_str(&canonical) {
            Ok(value) => value,
            Err(_) => {
                notes.push(NormalizationNote::Unparseable);
                return Err(notes);
            }
        };

        if sign_markers > 0 {
            value = -value;
        }

        if self.locale.reported_unit != ReportedUnit::Units {
            value = match value.checked_mul(self.locale.reported_unit.multiplier()) {
                Some(scaled) => scaled,
                None => {
                    notes.push(NormalizationNote::OutOfRange);
                    return Err(notes);
                }
            };
            notes.push(NormalizationNote::UnitScaled);
            if !self.locale.unit_declared {
                notes.push(NormalizationNote::UnitAssumed);
            }
        }

        Ok((value, notes))
    }

    fn parse_period(&self, raw: &str) -> Parsed<FiscalPeriod> {
        let text = collapse_whitespace(raw);
        let mut notes = Vec::new();

        let date = if let Some(caps) = iso_date_re().captures(&text) {
            let year: i32 = caps[1].parse().unwrap_or_default();
            let month: u32 = caps[2].parse().unwrap_or_default();
            let day: u32 = caps[3].parse().unwrap_or_default();
            Some(NaiveDate::from_ymd_opt(year, month, day))
        } else if let Some(caps) = numeric_date_re().captures(&text) {
            let first: u32 = caps[1].parse().unwrap_or_default();
            let second: u32 = caps[2].parse().unwrap_or_default();
            let year = self.parse_year(&caps[3], &mut notes);
            let (day, month) = if first > 12 && second <= 12 {
                (first, second)
            } else if second > 12 && first <= 12 {
                (second, first)
            } else {
                if first != second {
                    notes.push(NormalizationNote::DateOrderAssumed);
                }
                match self.locale.date_order {
                    DateOrder::DayFirst => (first, second),
                    DateOrder::MonthFirst => (second, first),
                }
            };
            Some(NaiveDate::from_ymd_opt(year, month, day))
        } else if let Some((day, month, year)) = day_month_name_re()
            .captures_iter(&text)
            .find_map(|caps| {
                month_from_name(&caps[2]).map(|m| (caps[1].to_string(), m, caps[3].to_string()))
            })
        {
            let day: u32 = day.parse().unwrap_or_default();
            let year = self.parse_year(&year, &mut notes);
            Some(NaiveDate::from_ymd_opt(year, month, day))
        } else if let Some((month, day, year)) = month_name_day_re()
            .captures_iter(&text)
            .find_map(|caps| {
                month_from_name(&caps[1]).map(|m| (m, caps[2].to_string(), caps[3].to_string()))
            })
        {
            let day: u32 = day.parse().unwrap_or_default();
            let year: i32 = year.parse().unwrap_or_default();
            Some(NaiveDate::from_ymd_opt(year, month, day))
        } else {
            None
        };

        if let Some(date) = date {
            let Some(date) = date else {
                notes.push(NormalizationNote::InvalidCalendarDate);
                return Err(notes);
            };
            let period = if duration_phrase_re().is_match(&text) {
                match year_ending_start(date) {
                    Some(start) => FiscalPeriod::Duration { start, end: date },
                    None => {
                        notes.push(NormalizationNote::InvalidCalendarDate);
                        return Err(notes);
                    }
                }
            } else {
                FiscalPeriod::PointInTime { as_of: date }
            };
            return Ok((period, notes));
        }

        let start_month = self.locale.fiscal_year_start_month;

        if let Some(caps) = fiscal_range_re().captures(&text) {
            let first: i32 = caps[1].parse().unwrap_or_default();
            let second: i32 = caps[2].parse().unwrap_or_default();
            let consistent = if caps[2].len() == 4 {
                second == first + 1
            } else {
                second == (first + 1).rem_euclid(100)
            };
            if !consistent {
                notes.push(NormalizationNote::InconsistentFiscalYear);
                return Err(notes);
            }
            return match fiscal_year_bounds(first, start_month) {
                Some((start, end)) => Ok((FiscalPeriod::Duration { start, end }, notes)),
                None => {
                    notes.push(NormalizationNote::InvalidCalendarDate);
                    Err(notes)
                }
            };
        }

        if let Some(caps) = fiscal_single_re().captures(&text) {
            let end_year = self.parse_year(&caps[1], &mut notes);
            notes.push(NormalizationNote::FiscalYearEndAssumed);
            let start_year = if start_month == 1 { end_year } else { end_year - 1 };
            return match fiscal_year_bounds(start_year, start_month) {
                Some((start, end)) => Ok((FiscalPeriod::Duration { start, end }, notes)),
                None => {
                    notes.push(NormalizationNote::InvalidCalendarDate);
                    Err(notes)
                }
            };
        }

        notes.push(NormalizationNote::Unparseable);
        Err(notes)
    }

    fn parse_year(&self, text: &str, notes: &mut Vec<NormalizationNote>) -> i32 {
        let year: u32 = text.parse().unwrap_or_default();
        if text.len() == 2 {
            notes.push(NormalizationNote::TwoDigitYear);
        }
        expand_two_digit_year(year)
    }
}

/// Convenience wrapper for one-off calls.
pub fn normalize(field: &RawField, locale: &LocaleHint, thresholds: &Thresholds) -> NormalizedValue {
    Normalizer::new(locale.clone(), thresholds).normalize(field)
}

/// 1,23,45,678: a 3-digit tail, 2-digit middle groups, 1-2 digit head.
fn matches_indian_grouping(groups: &[&str]) -> bool {
    let Some((last, rest)) = groups.split_last() else {
        return false;
    };
    let Some((first, middle)) = rest.split_first() else {
        return false;
    };
    last.len() == 3 && (1..=2).contains(&first.len()) && middle.iter().all(|g| g.len() == 2)
}

/// 12,345,678: 3-digit groups after a 1-3 digit head.
fn matches_western_grouping(groups: &[&str]) -> bool {
    let Some((first, rest)) = groups.split_first() else {
        return false;
    };
    !rest.is_empty() && (1..=3).contains(&first.len()) && rest.iter().all(|g| g.len() == 3)
}

/// Replaces letters OCR commonly confuses with digits. Returns `None` when
/// nothing was replaced or when the result still isn't numeric.
fn substitute_ocr_digits(text: &str) -> Option<String> {
    let mut replaced = false;
    let substituted: String = text
        .chars()
        .map(|c| {
            let digit = match c {
                'O' | 'o' => Some('0'),
                'l' | 'I' | '|' => Some('1'),
                'S' | 's' => Some('5'),
                'B' => Some('8'),
                _ => None,
            };
            match digit {
                Some(d) => {
                    replaced = true;
                    d
                }
                None => c,
            }
        })
        .collect();

    let numeric = substituted
        .chars()
        .all(|c| c.is_ascii_digit() || c == ',' || c == '.');
    (replaced && numeric).then_some(substituted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SourceKind;

    fn normalizer() -> Normalizer {
        Normalizer::new(LocaleHint::default(), &Thresholds::default())
    }

    fn field(raw: &str) -> RawField {
        RawField::new(raw, 1, SourceKind::PdfText)
    }

    fn amount(raw: &str) -> NormalizedValue {
        normalizer().normalize_amount(&field(raw))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_indian_grouping_with_currency() {
        let value = amount("₹1,23,45,678");
        assert_eq!(value.amount(), Some(Decimal::from(12_345_678)));
        assert_eq!(value.normalization_confidence, 1.0);
        assert!(value.has_note(NormalizationNote::CurrencyMarkerRemoved));
    }

    #[test]
    fn test_parenthesized_negative() {
        let value = amount("(1,234)");
        assert_eq!(value.amount(), Some(Decimal::from(-1234)));
        assert_eq!(value.normalization_confidence, 1.0);
    }

    #[test]
    fn test_trailing_sign_marker() {
        let value = amount("4,366,215,311.00-");
        assert_eq!(
            value.amount(),
            Some(Decimal::from_str("-4366215311.00").unwrap())
        );
        assert!(value.has_note(NormalizationNote::TrailingSignMarker));
        // western grouping under an Indian locale is one heuristic
        assert!(value.has_note(NormalizationNote::NonLocaleGrouping));
        assert_eq!(value.normalization_confidence, 0.9);
    }

    #[test]
    fn test_conflicting_sign_markers_are_ambiguous() {
        let value = amount("(1,234)-");
        assert_eq!(value.amount(), Some(Decimal::from(-1234)));
        assert!(value.has_note(NormalizationNote::AmbiguousSign));
        assert!(value.normalization_confidence < 1.0);
    }

    #[test]
    fn test_footnote_marker_removed() {
        let value = amount("123*");
        assert_eq!(value.amount(), Some(Decimal::from(123)));
        assert!(value.has_note(NormalizationNote::FootnoteMarkerRemoved));
        assert_eq!(value.normalization_confidence, 1.0);
    }

    #[test]
    fn test_debit_credit_marker_is_ambiguous() {
        let value = amount("1,500 Dr");
        assert_eq!(value.amount(), Some(Decimal::from(1500)));
        assert!(value.has_note(NormalizationNote::DebitCreditMarker));
        assert!(value.has_note(NormalizationNote::AmbiguousSign));
    }

    #[test]
    fn test_blank_cells() {
        for raw in ["", "-", "–", "Nil"] {
            let value = amount(raw);
            assert!(value.value.is_none());
            assert_eq!(value.normalization_confidence, 1.0);
            assert_eq!(value.normalization_notes, vec![NormalizationNote::Blank]);
        }
    }

    #[test]
    fn test_unparseable_keeps_raw() {
        let value = amount("see note 4");
        assert!(value.value.is_none());
        assert_eq!(value.raw.raw, "see note 4");
        assert_eq!(value.normalization_confidence, 0.0);
        assert!(value.has_note(NormalizationNote::Unparseable));
    }

    #[test]
    fn test_irregular_grouping_is_rejected() {
        let value = amount("1,2345");
        assert!(value.value.is_none());
        assert!(value.has_note(NormalizationNote::IrregularGrouping));
    }

    #[test]
    fn test_ocr_substitution_lowers_confidence() {
        let value = amount("1,O5l");
        assert_eq!(value.amount(), Some(Decimal::from(1051)));
        assert!(value.has_note(NormalizationNote::OcrDigitSubstitution));
        assert_eq!(value.normalization_confidence, 0.9);
    }

    #[test]
    fn test_assumed_unit_scaling() {
        let locale = LocaleHint {
            reported_unit: ReportedUnit::Lakhs,
            ..LocaleHint::default()
        };
        let assumed = Normalizer::new(locale.clone(), &Thresholds::default())
            .normalize_amount(&field("12.5"));
        assert_eq!(assumed.amount(), Some(Decimal::from(1_250_000)));
        assert!(assumed.has_note(NormalizationNote::UnitAssumed));
        assert_eq!(assumed.normalization_confidence, 0.9);

        let declared = Normalizer::new(
            LocaleHint {
                unit_declared: true,
                ..locale
            },
            &Thresholds::default(),
        )
        .normalize_amount(&field("12.5"));
        assert_eq!(declared.normalization_confidence, 1.0);
        assert!(declared.has_note(NormalizationNote::UnitScaled));
    }

    #[test]
    fn test_scaling_past_decimal_range_is_not_fatal() {
        let locale = LocaleHint {
            reported_unit: ReportedUnit::Crores,
            unit_declared: true,
            ..LocaleHint::default()
        };
        let value = Normalizer::new(locale, &Thresholds::default())
            .normalize_amount(&field("1234567890123456789012345"));
        assert!(value.value.is_none());
        assert_eq!(value.normalization_confidence, 0.0);
        assert_eq!(value.raw.raw, "1234567890123456789012345");
        assert!(value.has_note(NormalizationNote::OutOfRange));
        assert!(!value.has_note(NormalizationNote::Unparseable));
    }

    #[test]
    fn test_clean_numbers_recover_exactly() {
        let cases = [
            ("0", "0"),
            ("7", "7"),
            ("999", "999"),
            ("1,000", "1000"),
            ("12,345", "12345"),
            ("1,23,456", "123456"),
            ("12,34,56,789.05", "123456789.05"),
            ("-98,76,543.21", "-9876543.21"),
        ];
        for (raw, expected) in cases {
            let value = amount(raw);
            assert_eq!(
                value.amount(),
                Some(Decimal::from_str(expected).unwrap()),
                "{}",
                raw
            );
            assert_eq!(value.normalization_confidence, 1.0, "{}", raw);
        }
    }

    fn group_digits(digits: &str, grouping: DigitGrouping) -> String {
        if digits.len() <= 3 {
            return digits.to_string();
        }
        let (head, last) = digits.split_at(digits.len() - 3);
        let width = match grouping {
            DigitGrouping::Indian => 2,
            DigitGrouping::Western => 3,
        };
        let mut groups = vec![last.to_string()];
        let mut rest = head;
        while !rest.is_empty() {
            let split = rest.len().saturating_sub(width);
            groups.push(rest[split..].to_string());
            rest = &rest[..split];
        }
        groups.reverse();
        groups.join(",")
    }

    #[test]
    fn test_generated_decimals_recover_exactly_in_both_groupings() {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        for i in 0..400u32 {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let digits = 1 + (state >> 60) as u32 % 15;
            let mantissa = (state >> 8) % 10u64.pow(digits);
            let scale = i % 3;
            let negative = i % 4 == 0 && mantissa != 0;

            let padded = format!("{:0width$}", mantissa, width = scale as usize + 1);
            let (integer, fraction) = padded.split_at(padded.len() - scale as usize);

            let mut expected = Decimal::new(mantissa as i64, scale);
            if negative {
                expected = -expected;
            }

            for grouping in [DigitGrouping::Indian, DigitGrouping::Western] {
                let mut text = group_digits(integer, grouping);
                if !fraction.is_empty() {
                    text = format!("{}.{}", text, fraction);
                }
                if negative {
                    text = format!("-{}", text);
                }

                let locale = LocaleHint {
                    grouping,
                    ..LocaleHint::default()
                };
                let value =
                    Normalizer::new(locale, &Thresholds::default()).normalize_amount(&field(&text));
                assert_eq!(value.amount(), Some(expected), "{}", text);
                assert_eq!(value.normalization_confidence, 1.0, "{}", text);
            }
        }
    }

    #[test]
    fn test_fiscal_year_range() {
        let value = normalizer().normalize_period(&field("FY 2022-23"));
        assert_eq!(
            value.period(),
            Some(FiscalPeriod::Duration {
                start: date(2022, 4, 1),
                end: date(2023, 3, 31),
            })
        );
        assert_eq!(value.normalization_confidence, 1.0);

        let value = normalizer().normalize(&field("2022-2023"));
        assert_eq!(value.period().map(|p| p.end_date()), Some(date(2023, 3, 31)));
    }

    #[test]
    fn test_inconsistent_fiscal_year() {
        let value = normalizer().normalize_period(&field("FY 2022-25"));
        assert!(value.value.is_none());
        assert!(value.has_note(NormalizationNote::InconsistentFiscalYear));
    }

    #[test]
    fn test_balance_date_is_point_in_time() {
        let value = normalizer().normalize_period(&field("As at 31st March 2023"));
        assert_eq!(
            value.period(),
            Some(FiscalPeriod::PointInTime {
                as_of: date(2023, 3, 31)
            })
        );
        assert_eq!(value.normalization_confidence, 1.0);
    }

    #[test]
    fn test_year_ended_is_duration() {
        let value = normalizer().normalize(&field("For the year ended 31 March 2024"));
        let period = value.period().unwrap();
        assert_eq!(
            period,
            FiscalPeriod::Duration {
                start: date(2023, 4, 1),
                end: date(2024, 3, 31),
            }
        );
        assert_eq!(period.label(4), "FY2023-24");
    }

    #[test]
    fn test_numeric_date_order() {
        let unambiguous = normalizer().normalize_period(&field("31/03/2023"));
        assert_eq!(unambiguous.period().map(|p| p.end_date()), Some(date(2023, 3, 31)));
        assert_eq!(unambiguous.normalization_confidence, 1.0);

        let assumed = normalizer().normalize_period(&field("01/04/2023"));
        assert_eq!(assumed.period().map(|p| p.end_date()), Some(date(2023, 4, 1)));
        assert!(assumed.has_note(NormalizationNote::DateOrderAssumed));
        assert_eq!(assumed.normalization_confidence, 0.9);
    }

    #[test]
    fn test_month_name_first() {
        let value = normalizer().normalize_period(&field("March 31, 2023"));
        assert_eq!(value.period().map(|p| p.end_date()), Some(date(2023, 3, 31)));
    }

    #[test]
    fn test_invalid_calendar_date() {
        let value = normalizer().normalize_period(&field("31st February 2023"));
        assert!(value.value.is_none());
        assert!(value.has_note(NormalizationNote::InvalidCalendarDate));
    }

    #[test]
    fn test_single_fiscal_year_is_a_guess() {
        let value = normalizer().normalize_period(&field("FY23"));
        assert_eq!(value.period().map(|p| p.end_date()), Some(date(2023, 3, 31)));
        assert!(value.has_note(NormalizationNote::TwoDigitYear));
        assert!(value.has_note(NormalizationNote::FiscalYearEndAssumed));
        assert_eq!(value.normalization_confidence, 0.8);
    }

    #[test]
    fn test_detect_reported_unit() {
        assert_eq!(detect_reported_unit("(Rs. in Lakhs)"), Some(ReportedUnit::Lakhs));
        assert_eq!(detect_reported_unit("Amount in Crores"), Some(ReportedUnit::Crores));
        assert_eq!(detect_reported_unit("Balance Sheet"), None);
    }

    #[test]
    fn test_normalize_all_preserves_order() {
        let fields: Vec<RawField> = ["1", "2", "3", "4"].iter().map(|r| field(r)).collect();
        let values = normalizer().normalize_all(&fields);
        let amounts: Vec<_> = values.iter().filter_map(|v| v.amount()).collect();
        assert_eq!(amounts, vec![1.into(), 2.into(), 3.into(), 4.into()]);
    }
}
