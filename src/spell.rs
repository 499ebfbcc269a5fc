//! Query spell correction.
//!
//! Two-stage, vocabulary-driven: an exact reverse lookup over a curated
//! misspelling table, then a fuzzy pass against the domain vocabulary using
//! normalized edit similarity. Words already in the vocabulary are never
//! touched, and a fuzzy match below the configured threshold leaves the word
//! alone — an uncorrected query is always preferable to a wrong correction.

use std::collections::HashMap;

use crate::models::Correction;

/// Domain vocabulary: terms retrieval is expected to see in queries.
const VOCABULARY: &[&str] = &[
    "invoice",
    "report",
    "budget",
    "contract",
    "policy",
    "project",
    "meeting",
    "summary",
    "analysis",
    "presentation",
    "finance",
    "marketing",
    "engineering",
    "documentation",
    "tutorial",
    "guide",
    "deployment",
    "database",
    "server",
    "python",
    "javascript",
    "function",
    "variable",
    "algorithm",
    "security",
    "network",
    "revenue",
    "expense",
    "quarterly",
    "annual",
    "schedule",
    "deadline",
    "customer",
    "product",
    "release",
    "version",
    "install",
    "configure",
    "error",
    "exception",
    "cyber",
    "machine",
    "learning",
    "neural",
    "encryption",
    "document",
    "architecture",
    "optimization",
    "classification",
    "processing",
    "medical",
    "healthcare",
    "diagnosis",
    "treatment",
    "patient",
    "business",
    "management",
    "research",
    "experiment",
    "hypothesis",
    "methodology",
    "programming",
    "software",
    "development",
    "framework",
    "library",
    "debugging",
    "system",
    "performance",
    "quality",
    "maintenance",
];

/// Known misspellings mapped to their canonical terms. Checked before the
/// fuzzy pass, so these always win.
const KNOWN_MISSPELLINGS: &[(&str, &str)] = &[
    ("invoce", "invoice"),
    ("invioce", "invoice"),
    ("reprot", "report"),
    ("budjet", "budget"),
    ("contrat", "contract"),
    ("polcy", "policy"),
    ("projet", "project"),
    ("meetng", "meeting"),
    ("sumary", "summary"),
    ("anlysis", "analysis"),
    ("documention", "documentation"),
    ("databse", "database"),
    ("pyton", "python"),
    ("javascrip", "javascript"),
    ("funtion", "function"),
    ("algoritm", "algorithm"),
    ("secuirty", "security"),
    ("reveune", "revenue"),
    ("quaterly", "quarterly"),
    ("scheduel", "schedule"),
    ("instal", "install"),
    ("configre", "configure"),
    ("ciber", "cyber"),
    ("cybr", "cyber"),
    ("cybe", "cyber"),
    ("securty", "security"),
    ("secrity", "security"),
    ("securuty", "security"),
    ("machne", "machine"),
    ("machin", "machine"),
    ("mashcine", "machine"),
    ("lerning", "learning"),
    ("learnng", "learning"),
    ("learing", "learning"),
    ("neoral", "neural"),
    ("nueral", "neural"),
    ("netork", "network"),
    ("netwrok", "network"),
    ("netwrk", "network"),
    ("datbase", "database"),
    ("databas", "database"),
    ("algorithn", "algorithm"),
    ("algortithm", "algorithm"),
    ("encrypton", "encryption"),
    ("encription", "encryption"),
    ("encrypion", "encryption"),
    ("docment", "document"),
    ("documnt", "document"),
    ("documet", "document"),
    ("architecure", "architecture"),
    ("arquitecture", "architecture"),
    ("architeure", "architecture"),
    ("optimzation", "optimization"),
    ("optimisation", "optimization"),
    ("optimztion", "optimization"),
    ("clasification", "classification"),
    ("classificaion", "classification"),
    ("clasiffication", "classification"),
    ("procesing", "processing"),
    ("proceessing", "processing"),
    ("medicl", "medical"),
    ("medcal", "medical"),
    ("medicail", "medical"),
    ("helathcare", "healthcare"),
    ("healthcaree", "healthcare"),
    ("healthecare", "healthcare"),
    ("diagnsis", "diagnosis"),
    ("diagnois", "diagnosis"),
    ("treatmnt", "treatment"),
    ("treament", "treatment"),
    ("treatement", "treatment"),
    ("paitent", "patient"),
    ("patinet", "patient"),
    ("patiuent", "patient"),
    ("bussiness", "business"),
    ("bussines", "business"),
    ("bisness", "business"),
    ("finace", "finance"),
    ("finnance", "finance"),
    ("finannce", "finance"),
    ("managmnet", "management"),
    ("managemetn", "management"),
    ("managment", "management"),
    ("analisis", "analysis"),
    ("analisys", "analysis"),
    ("analysys", "analysis"),
    ("reserch", "research"),
    ("reseach", "research"),
    ("reserarch", "research"),
    ("experment", "experiment"),
    ("experiement", "experiment"),
    ("experimet", "experiment"),
    ("hypothsis", "hypothesis"),
    ("hypothess", "hypothesis"),
    ("hipothesis", "hypothesis"),
    ("metodology", "methodology"),
    ("methodolgy", "methodology"),
    ("metholodogy", "methodology"),
    ("programing", "programming"),
    ("programm", "programming"),
    ("programmin", "programming"),
    ("sofware", "software"),
    ("softwar", "software"),
    ("softwre", "software"),
    ("developmnt", "development"),
    ("developement", "development"),
    ("develpment", "development"),
    ("framwork", "framework"),
    ("framewrok", "framework"),
    ("framwework", "framework"),
    ("libary", "library"),
    ("libray", "library"),
    ("libarary", "library"),
    ("debuging", "debugging"),
    ("debuggng", "debugging"),
    ("debuggin", "debugging"),
    ("systm", "system"),
    ("sytem", "system"),
    ("systrm", "system"),
    ("perfomance", "performance"),
    ("performence", "performance"),
    ("qualiy", "quality"),
    ("qualty", "quality"),
    ("qualitty", "quality"),
    ("maintenence", "maintenance"),
    ("maintanence", "maintenance"),
];

pub struct SpellCorrector {
    vocabulary: Vec<String>,
    misspellings: HashMap<String, String>,
    threshold: f64,
}

/// A corrected query plus the per-word corrections that produced it.
#[derive(Debug)]
pub struct CorrectedQuery {
    pub text: String,
    pub corrections: Vec<Correction>,
}

impl SpellCorrector {
    pub fn new(threshold: f64) -> Self {
        Self {
            vocabulary: VOCABULARY.iter().map(|s| s.to_string()).collect(),
            misspellings: KNOWN_MISSPELLINGS
                .iter()
                .map(|(bad, good)| (bad.to_string(), good.to_string()))
                .collect(),
            threshold,
        }
    }

    /// Extend the vocabulary at runtime, e.g. with category names.
    pub fn add_terms<I: IntoIterator<Item = String>>(&mut self, terms: I) {
        for term in terms {
            let lower = term.to_lowercase();
            if !self.vocabulary.contains(&lower) {
                self.vocabulary.push(lower);
            }
        }
    }

    pub fn correct(&self, query: &str) -> CorrectedQuery {
        let mut corrections = Vec::new();
        let words: Vec<String> = query
            .split_whitespace()
            .map(|word| self.correct_word(word, &mut corrections))
            .collect();
        CorrectedQuery {
            text: words.join(" "),
            corrections,
        }
    }

    fn correct_word(&self, word: &str, corrections: &mut Vec<Correction>) -> String {
        // Leading and trailing punctuation travels with the word through
        // tokenization; strip it for matching and reattach afterwards.
        let leading: String = word.chars().take_while(|c| !c.is_alphanumeric()).collect();
        if leading.len() == word.len() {
            return word.to_string();
        }
        let trailing: String = word
            .chars()
            .rev()
            .take_while(|c| !c.is_alphanumeric())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let core = &word[leading.len()..word.len() - trailing.len()];
        if core.is_empty() {
            return word.to_string();
        }

        let lower = core.to_lowercase();
        if self.vocabulary.iter().any(|v| v == &lower) {
            return word.to_string();
        }

        let (replacement, confidence) = match self.misspellings.get(&lower) {
            Some(canonical) => (canonical.clone(), 1.0),
            None => match self.fuzzy_match(&lower) {
                Some(hit) => hit,
                None => return word.to_string(),
            },
        };

        let cased = match_case(core, &replacement);
        corrections.push(Correction {
            original: core.to_string(),
            corrected: cased.clone(),
            confidence,
        });
        format!("{}{}{}", leading, cased, trailing)
    }

    fn fuzzy_match(&self, word: &str) -> Option<(String, f64)> {
        let mut best: Option<(String, f64)> = None;
        for term in &self.vocabulary {
            let score = strsim::normalized_levenshtein(word, term);
            if score >= self.threshold && best.as_ref().is_none_or(|(_, s)| score > *s) {
                best = Some((term.clone(), score));
            }
        }
        best
    }
}

/// Carry the original word's leading capitalization into the replacement.
fn match_case(original: &str, replacement: &str) -> String {
    let first_upper = original.chars().next().is_some_and(|c| c.is_uppercase());
    if !first_upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrector() -> SpellCorrector {
        SpellCorrector::new(0.80)
    }

    #[test]
    fn known_misspelling_is_fixed() {
        let result = corrector().correct("show me the invoce");
        assert_eq!(result.text, "show me the invoice");
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.corrections[0].original, "invoce");
        assert_eq!(result.corrections[0].corrected, "invoice");
        assert!((result.corrections[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn misspelled_security_query_is_corrected() {
        let result = corrector().correct("ciber security");
        assert_eq!(result.text, "cyber security");
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.corrections[0].original, "ciber");
        assert_eq!(result.corrections[0].corrected, "cyber");
    }

    #[test]
    fn fuzzy_match_above_threshold() {
        // "databaze" vs "database": one substitution in 8 chars, 0.875.
        let result = corrector().correct("databaze setup");
        assert_eq!(result.text, "database setup");
        assert_eq!(result.corrections.len(), 1);
        assert!(result.corrections[0].confidence >= 0.80);
    }

    #[test]
    fn below_threshold_left_alone() {
        let result = corrector().correct("xyzzy");
        assert_eq!(result.text, "xyzzy");
        assert!(result.corrections.is_empty());
    }

    #[test]
    fn vocabulary_word_never_corrected() {
        let result = corrector().correct("budget report analysis");
        assert_eq!(result.text, "budget report analysis");
        assert!(result.corrections.is_empty());
    }

    #[test]
    fn punctuation_survives_correction() {
        let result = corrector().correct("where is the reprot?");
        assert_eq!(result.text, "where is the report?");
        assert_eq!(result.corrections[0].corrected, "report");
    }

    #[test]
    fn capitalization_preserved() {
        let result = corrector().correct("Reprot for Q3");
        assert_eq!(result.text, "Report for Q3");
        assert_eq!(result.corrections[0].corrected, "Report");
    }

    #[test]
    fn added_terms_join_vocabulary() {
        let mut c = corrector();
        c.add_terms(["Kubernetes".to_string()]);
        let result = c.correct("kubernetes upgrade");
        assert!(result.corrections.is_empty());
    }
}
