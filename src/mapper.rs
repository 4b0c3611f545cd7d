//! Maps printed line-item labels onto a statement's canonical keys.
//!
//! Three tiers are tried in order: exact (case and whitespace folded),
//! normalized (punctuation, list markers and schedule references stripped)
//! and fuzzy (string similarity over the normalized dictionary). A label that
//! clears none of them stays in the record as unmapped.

use crate::layout::SourceLineItem;
use crate::schema::{CanonicalLineItem, MatchTier, NormalizedValue, StatementType};
use crate::taxonomy::{FuzzyAlgorithm, StatementTaxonomy, Thresholds};
use crate::utils::collapse_whitespace;
use log::debug;
use rayon::prelude::*;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

fn boilerplate_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:less|add|of which|including)\s*:\s*").expect("static pattern is valid")
    })
}

fn list_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:\(\s*(?:[a-z]|[ivx]+|\d+)\s*\)|(?:[a-z]|[ivx]+|\d+(?:\.\d+)*)[.)])\s*")
            .expect("static pattern is valid")
    })
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\(?\s*(?:as per|refer(?:\s+to)?|see)?\s*\b(?:schedule|sch\.?|annexure|note)\s*(?:no\.?)?\s*[a-z]?[-\s]?\d+[a-z0-9\-()]*\s*\)?",
        )
        .expect("static pattern is valid")
    })
}

fn ordinal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+(?:st|nd|rd|th)\b").expect("static pattern is valid"))
}

/// Folds a label to the form compared by the normalized and fuzzy tiers.
///
/// # Examples
/// - "Less: (a) Depreciation" -> "depreciation"
/// - "Plant & Machinery (as per Schedule 4)" -> "plant and machinery"
pub fn normalize_label(label: &str) -> String {
    let mut text = label.to_lowercase().replace('&', " and ");
    text = boilerplate_prefix_re().replace(&text, "").into_owned();
    text = list_marker_re().replace(&text, "").into_owned();
    text = reference_re().replace_all(&text, " ").into_owned();
    text = ordinal_re().replace_all(&text, " ").into_owned();

    let stripped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    collapse_whitespace(&stripped)
}

#[derive(Debug, Clone)]
struct DictionaryEntry {
    canonical_key: String,
    normalized_form: String,
    normalized_len: usize,
    key_priority: usize,
    synonym_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatch {
    pub canonical_key: Option<String>,
    pub match_tier: MatchTier,
    pub mapping_confidence: f64,
}

impl LabelMatch {
    fn unmapped() -> Self {
        Self {
            canonical_key: None,
            match_tier: MatchTier::Unmapped,
            mapping_confidence: 0.0,
        }
    }
}

struct Candidate<'a> {
    entry: &'a DictionaryEntry,
    score: f64,
}

/// Higher score first, then the shorter dictionary entry, then key
/// priority, then synonym declaration order.
fn compare_candidates(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.entry.normalized_len.cmp(&b.entry.normalized_len))
        .then_with(|| a.entry.key_priority.cmp(&b.entry.key_priority))
        .then_with(|| a.entry.synonym_index.cmp(&b.entry.synonym_index))
}

#[derive(Debug, Clone)]
pub struct SemanticMapper {
    statement_type: StatementType,
    entries: Vec<DictionaryEntry>,
    exact: HashMap<String, usize>,
    normalized: HashMap<String, usize>,
    fuzzy_algorithm: FuzzyAlgorithm,
    fuzzy_acceptance: f64,
    normalized_tier_confidence: f64,
}

impl SemanticMapper {
    pub fn new(taxonomy: &StatementTaxonomy, thresholds: &Thresholds) -> Self {
        let mut entries = Vec::new();
        let mut exact = HashMap::new();
        let mut normalized = HashMap::new();

        for (key_priority, spec) in taxonomy.keys.iter().enumerate() {
            let implied = spec.key.replace('_', " ");
            for (synonym_index, synonym) in std::iter::once(&implied)
                .chain(spec.synonyms.iter())
                .enumerate()
            {
                let normalized_form = normalize_label(synonym);
                let idx = entries.len();
                exact.entry(collapse_whitespace(synonym)).or_insert(idx);
                if !normalized_form.is_empty() {
                    normalized.entry(normalized_form.clone()).or_insert(idx);
                }
                entries.push(DictionaryEntry {
                    canonical_key: spec.key.clone(),
                    normalized_len: normalized_form.chars().count(),
                    normalized_form,
                    key_priority,
                    synonym_index,
                });
            }
        }

        Self {
            statement_type: taxonomy.statement_type,
            entries,
            exact,
            normalized,
            fuzzy_algorithm: thresholds.fuzzy_algorithm,
            fuzzy_acceptance: thresholds.fuzzy_acceptance,
            normalized_tier_confidence: thresholds.normalized_tier_confidence,
        }
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn resolve(&self, label: &str) -> LabelMatch {
        if let Some(&idx) = self.exact.get(&collapse_whitespace(label)) {
            return LabelMatch {
                canonical_key: Some(self.entries[idx].canonical_key.clone()),
                match_tier: MatchTier::Exact,
                mapping_confidence: 1.0,
            };
        }

        let folded = normalize_label(label);
        if folded.is_empty() {
            return LabelMatch::unmapped();
        }
        if let Some(&idx) = self.normalized.get(&folded) {
            return LabelMatch {
                canonical_key: Some(self.entries[idx].canonical_key.clone()),
                match_tier: MatchTier::Normalized,
                mapping_confidence: self.normalized_tier_confidence,
            };
        }

        let best = self
            .entries
            .iter()
            .filter(|entry| !entry.normalized_form.is_empty())
            .map(|entry| Candidate {
                entry,
                score: self.similarity(&folded, &entry.normalized_form),
            })
            .min_by(compare_candidates);

        match best {
            Some(candidate) if candidate.score >= self.fuzzy_acceptance => {
                debug!(
                    "{}: fuzzy '{}' -> {} ({:.3})",
                    self.statement_type, label, candidate.entry.canonical_key, candidate.score
                );
                LabelMatch {
                    canonical_key: Some(candidate.entry.canonical_key.clone()),
                    match_tier: MatchTier::Fuzzy,
                    mapping_confidence: (candidate.score * 100.0).round() / 100.0,
                }
            }
            _ => {
                debug!("{}: no mapping for '{}'", self.statement_type, label);
                LabelMatch::unmapped()
            }
        }
    }

    /// True when the label resolves without fuzzy matching.
    pub fn has_dictionary_hit(&self, label: &str) -> bool {
        if self.exact.contains_key(&collapse_whitespace(label)) {
            return true;
        }
        let folded = normalize_label(label);
        !folded.is_empty() && self.normalized.contains_key(&folded)
    }

    pub fn map_line_item(&self, item: &SourceLineItem, value: NormalizedValue) -> CanonicalLineItem {
        let resolved = self.resolve(&item.source_label);
        CanonicalLineItem {
            canonical_key: resolved.canonical_key,
            source_label: item.source_label.clone(),
            account_code: item.account_code.clone(),
            reference: item.reference.clone(),
            match_tier: resolved.match_tier,
            mapping_confidence: resolved.mapping_confidence,
            value,
        }
    }

    /// Maps a statement instance's items, keeping document order.
    pub fn map_statement(&self, items: Vec<(&SourceLineItem, NormalizedValue)>) -> Vec<CanonicalLineItem> {
        items
            .into_par_iter()
            .map(|(item, value)| self.map_line_item(item, value))
            .collect()
    }

    fn similarity(&self, a: &str, b: &str) -> f64 {
        match self.fuzzy_algorithm {
            FuzzyAlgorithm::Levenshtein => strsim::normalized_levenshtein(a, b),
            FuzzyAlgorithm::JaroWinkler => strsim::jaro_winkler(a, b),
        }
    }
}

pub fn map_line_item(
    source_label: &str,
    taxonomy: &StatementTaxonomy,
    thresholds: &Thresholds,
) -> LabelMatch {
    SemanticMapper::new(taxonomy, thresholds).resolve(source_label)
}
