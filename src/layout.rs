//! Recovers label/amount structure from extracted table rows.
//!
//! Extraction layers are inconsistent about cell boundaries: an amount may
//! share a cell with its label, a schedule reference may sit in its own
//! column, and account codes are often glued to the front of the label.

use crate::normalizer::is_blank_marker;
use crate::schema::{ExtractedPage, RawField};
use regex::Regex;
use std::sync::OnceLock;

const HEADER_SCAN_ROWS: usize = 3;
const HEADER_LABEL_WORDS: &[&str] = &["particular", "description", "head", "items"];

fn amount_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:₹|rs\.?|inr)?\s*\(?[-–]?\d[\d,]*(?:\.\d+)?[-–]?\)?[-–]?\s*(?:dr|cr)?\.?\s*[*#]*$")
            .expect("static pattern is valid")
    })
}

fn trailing_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)\s+(\(?[-–]?\d[\d,]*(?:\.\d+)?[-–]?\)?)$").expect("static pattern is valid")
    })
}

fn reference_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:schedule|sch\.?|note|notes|annexure)(?:\s*no\.?)?$")
            .expect("static pattern is valid")
    })
}

fn account_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d{6,12})\s+(.+)$").expect("static pattern is valid"))
}

fn period_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:19|20)\d{2}|\bfy\s*\d{2}|\bas (?:at|on)\b|\byear ended\b")
            .expect("static pattern is valid")
    })
}

/// A table row split into its label and the amount cells that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLineItem {
    /// The cell the label was read from.
    pub label: RawField,
    pub source_label: String,
    pub account_code: Option<String>,
    pub reference: Option<String>,
    /// One cell per period column, in column order.
    pub amounts: Vec<RawField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub page_id: u32,
    /// Period headers of the amount columns, when a header row was found.
    pub column_headers: Vec<RawField>,
    pub items: Vec<SourceLineItem>,
    /// Label-only rows such as "LIABILITIES" or "Current Assets".
    pub headings: Vec<RawField>,
}

impl PageLayout {
    pub fn column_count(&self) -> usize {
        self.items
            .iter()
            .map(|item| item.amounts.len())
            .max()
            .unwrap_or(0)
            .max(self.column_headers.len())
    }
}

/// Column roles read from a header row. Empty when the page has no header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableColumns {
    /// Schedule/note columns.
    pub reference: Vec<usize>,
    /// Period columns, in header order.
    pub amount: Vec<usize>,
    /// Cell count of the header row.
    pub width: usize,
}

impl TableColumns {
    fn from_header(row: &[RawField]) -> (Self, Vec<RawField>) {
        let mut columns = TableColumns {
            width: row.len(),
            ..Default::default()
        };
        let mut headers = Vec::new();
        for (col, cell) in row.iter().enumerate().skip(1) {
            let text = cell.raw.trim();
            if text.is_empty() {
                continue;
            }
            if is_reference_header(text) {
                columns.reference.push(col);
            } else {
                columns.amount.push(col);
                headers.push(cell.clone());
            }
        }
        (columns, headers)
    }

    /// A row is read by column index only when it spans the whole header.
    /// Shorter rows come from merged cells and are read by position.
    fn aligned(&self, row: &[RawField]) -> bool {
        !self.amount.is_empty() && row.len() >= self.width
    }
}

pub fn layout_page(page: &ExtractedPage) -> PageLayout {
    let header_idx = page
        .rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| is_header_row(row));

    let (columns, column_headers) = match header_idx {
        Some(idx) => TableColumns::from_header(&page.rows[idx]),
        None => (TableColumns::default(), Vec::new()),
    };

    let data_start = header_idx.map_or(0, |idx| idx + 1);
    let mut items = Vec::new();
    let mut headings = Vec::new();
    for row in &page.rows[data_start..] {
        match split_row(row, &columns) {
            Some(item) if item.amounts.is_empty() => headings.push(item.label),
            Some(item) => items.push(item),
            None => {}
        }
    }

    PageLayout {
        page_id: page.page_id,
        column_headers,
        items,
        headings,
    }
}

/// Splits one row into label and amounts. Returns `None` for rows with no
/// text at all.
///
/// In a row aligned with the header every period column yields exactly one
/// amount cell, empty cells included, so a blank current-year cell never
/// pulls the prior-year figure forward. Amounts found outside the period
/// columns follow them.
pub fn split_row(row: &[RawField], columns: &TableColumns) -> Option<SourceLineItem> {
    let (label_col, label_cell) = row
        .iter()
        .enumerate()
        .find(|(_, cell)| !cell.raw.trim().is_empty())?;

    let aligned = columns.aligned(row);
    let mut slots: Vec<Option<RawField>> = vec![None; columns.amount.len()];
    let mut particulars = vec![label_cell.raw.trim().to_string()];
    let mut reference = None;
    let mut stray = Vec::new();
    for (col, cell) in row.iter().enumerate().skip(label_col + 1) {
        let text = cell.raw.trim();
        let slot = columns.amount.iter().position(|c| *c == col);
        if aligned {
            if let Some(slot) = slot {
                if text.is_empty() || is_amount_cell(text) {
                    slots[slot] = Some(cell.clone());
                    continue;
                }
            }
        }
        if text.is_empty() {
            continue;
        }
        if columns.reference.contains(&col) {
            reference = Some(text.to_string());
        } else if is_amount_cell(text) {
            stray.push(cell.clone());
        } else {
            particulars.push(text.to_string());
        }
    }

    let mut label = particulars.join(" ");
    let mut detached = Vec::new();
    while let Some((rest, token)) = pop_trailing_amount(&label) {
        detached.insert(0, label_cell.derive(token));
        label = rest;
    }

    let amounts = if aligned {
        let filled = slots.iter().flatten().any(|cell| !cell.raw.trim().is_empty());
        let mut amounts = Vec::new();
        if filled || !detached.is_empty() || !stray.is_empty() {
            amounts.extend(
                slots
                    .into_iter()
                    .map(|cell| cell.unwrap_or_else(|| label_cell.derive(""))),
            );
        }
        amounts.extend(detached);
        amounts.extend(stray);
        amounts
    } else {
        detached.extend(stray);
        detached
    };

    let (account_code, label) = match account_code_re().captures(&label) {
        Some(caps) => (Some(caps[1].to_string()), caps[2].trim().to_string()),
        None => (None, label),
    };

    Some(SourceLineItem {
        label: label_cell.clone(),
        source_label: label,
        account_code,
        reference,
        amounts,
    })
}

/// A cell holding nothing but an amount, or a blank placeholder for one.
pub fn is_amount_cell(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if is_blank_marker(text) {
        return true;
    }
    amount_cell_re().is_match(text) && looks_like_amount(text)
}

/// Rejects bare four-digit years, which share the amount pattern.
fn looks_like_amount(token: &str) -> bool {
    let digits: String = token.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return false;
    }
    let decorated = token
        .chars()
        .any(|c| matches!(c, ',' | '.' | '(' | '-' | '–'));
    if decorated {
        return true;
    }
    match digits.parse::<u32>() {
        Ok(year) if digits.len() == 4 => !(1900..=2099).contains(&year),
        _ => true,
    }
}

fn pop_trailing_amount(label: &str) -> Option<(String, String)> {
    let caps = trailing_amount_re().captures(label.trim())?;
    let rest = caps[1].trim();
    let token = &caps[2];
    if rest.is_empty() || !looks_like_amount(token) || reference_word_re().is_match(rest) {
        return None;
    }
    Some((rest.to_string(), token.to_string()))
}

fn is_reference_header(text: &str) -> bool {
    let lower = text.trim().trim_end_matches('.').to_lowercase();
    matches!(
        lower.as_str(),
        "schedule" | "sch" | "schedule no" | "note" | "notes" | "note no" | "annexure" | "ref"
    )
}

fn is_header_row(row: &[RawField]) -> bool {
    let mut cells = row.iter().filter(|cell| !cell.raw.trim().is_empty());
    let Some(first) = cells.next() else {
        return false;
    };
    let first = first.raw.trim().to_lowercase();
    if HEADER_LABEL_WORDS.iter().any(|word| first.starts_with(word)) {
        return true;
    }
    cells.any(|cell| !is_amount_cell(&cell.raw) && period_header_re().is_match(&cell.raw))
}
