//! Keyword-profile document classifier.

use std::collections::BTreeSet;

use regex::Regex;
use tracing::debug;

use crate::error::{ComplianceError, Result};
use crate::taxonomy::Category;
use crate::types::Classification;

const MAX_KEY_PHRASES: usize = 5;
const MAX_KEY_PHRASE_CHARS: usize = 300;

/// Assigns a regulation document to exactly one category.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<Classification>;
}

struct Term {
    phrase: &'static str,
    re: Regex,
}

struct Profile {
    category: Category,
    keywords: Vec<Term>,
    subcategories: Vec<(&'static str, Vec<Regex>)>,
}

/// Counts whole-word keyword hits per category. The category with the most
/// hits wins; ties go to the earlier category in [`Category::ALL`]; no hits
/// at all yields [`Category::Other`].
pub struct KeywordClassifier {
    profiles: Vec<Profile>,
    obligation: Regex,
}

fn word_regex(phrase: &str) -> Result<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase)))
        .map_err(|e| ComplianceError::Config(format!("keyword {phrase:?}: {e}")))
}

impl KeywordClassifier {
    pub fn new() -> Result<Self> {
        let mut profiles = Vec::new();
        for category in Category::ALL {
            let p = category.profile();
            let keywords = p
                .keywords
                .iter()
                .map(|k| Ok(Term { phrase: k, re: word_regex(k)? }))
                .collect::<Result<Vec<_>>>()?;
            let subcategories = p
                .subcategories
                .iter()
                .map(|(name, terms)| {
                    let res = terms.iter().map(|t| word_regex(t)).collect::<Result<Vec<_>>>()?;
                    Ok((*name, res))
                })
                .collect::<Result<Vec<_>>>()?;
            profiles.push(Profile { category, keywords, subcategories });
        }
        let obligation = Regex::new(
            r"(?i)\b(must|shall|required|prohibited|penalty|penalties|violation|violations)\b",
        )
        .map_err(|e| ComplianceError::Config(e.to_string()))?;
        Ok(Self { profiles, obligation })
    }

    fn key_phrases(&self, text: &str) -> Vec<String> {
        text.split(|c| matches!(c, '.' | '!' | '?' | ';' | '\n'))
            .map(str::trim)
            .filter(|s| !s.is_empty() && self.obligation.is_match(s))
            .take(MAX_KEY_PHRASES)
            .map(|s| s.chars().take(MAX_KEY_PHRASE_CHARS).collect())
            .collect()
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Result<Classification> {
        if text.trim().is_empty() {
            return Err(ComplianceError::Validation("document text is empty".into()));
        }

        let mut total = 0usize;
        let mut best: Option<(usize, &Profile, BTreeSet<String>)> = None;
        for profile in &self.profiles {
            let mut hits = 0usize;
            let mut found = BTreeSet::new();
            for term in &profile.keywords {
                let n = term.re.find_iter(text).count();
                if n > 0 {
                    hits += n;
                    found.insert(term.phrase.to_string());
                }
            }
            total += hits;
            // Strict comparison keeps the earlier category on ties.
            if hits > 0 && best.as_ref().is_none_or(|(h, _, _)| hits > *h) {
                best = Some((hits, profile, found));
            }
        }

        let key_phrases = self.key_phrases(text);
        let Some((hits, profile, keywords)) = best else {
            debug!("classifier: no keyword hits, falling back to other");
            return Ok(Classification {
                category: Category::Other,
                subcategories: Vec::new(),
                keywords: BTreeSet::new(),
                key_phrases,
                confidence: 0.0,
                overridden: false,
            });
        };

        let subcategories = profile
            .subcategories
            .iter()
            .filter(|(_, res)| res.iter().any(|re| re.is_match(text)))
            .map(|(name, _)| name.to_string())
            .collect();

        Ok(Classification {
            category: profile.category,
            subcategories,
            keywords,
            key_phrases,
            confidence: hits as f32 / total as f32,
            overridden: false,
        })
    }
}

/// Normalizes document text: control characters dropped, runs of blanks
/// collapsed, at most one empty line between paragraphs.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let cleaned: String = line
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let words: Vec<&str> = cleaned.split_whitespace().collect();
        if words.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(&words.join(" "));
    }
    out
}

/// Classifies a document, enforcing the size ceiling and the manual
/// override rule. An override is trusted verbatim and skips the classifier.
pub fn classify_document(
    classifier: &dyn Classifier,
    text: &str,
    override_category: Option<Category>,
    max_chars: usize,
) -> Result<Classification> {
    let size = text.chars().count();
    if size > max_chars {
        return Err(ComplianceError::DocumentTooLarge { size, limit: max_chars });
    }
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Err(ComplianceError::Validation("document text is empty".into()));
    }
    if let Some(category) = override_category {
        return Ok(Classification {
            category,
            subcategories: Vec::new(),
            keywords: BTreeSet::new(),
            key_phrases: Vec::new(),
            confidence: 1.0,
            overridden: true,
        });
    }
    classifier.classify(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_securities_document() {
        let c = KeywordClassifier::new().unwrap();
        let text = "SEC Rule 10b-5. It shall be unlawful to trade securities on the basis of \
                    material non-public information. Insider trading and tipping are prohibited.";
        let got = c.classify(text).unwrap();
        assert_eq!(got.category, Category::Securities);
        assert!(got.keywords.contains("insider trading"));
        assert!(got.subcategories.contains(&"insider trading".to_string()));
        assert!(!got.key_phrases.is_empty());
        assert!(got.confidence > 0.5 && got.confidence <= 1.0);
        assert!(!got.overridden);
    }

    #[test]
    fn test_whole_word_only() {
        let c = KeywordClassifier::new().unwrap();
        // "secondary" must not count as "sec".
        let got = c.classify("A secondary note about lunch.").unwrap();
        assert_eq!(got.category, Category::Other);
        assert_eq!(got.confidence, 0.0);
    }

    #[test]
    fn test_no_hits_is_other() {
        let c = KeywordClassifier::new().unwrap();
        let got = c.classify("The weather was pleasant all week.").unwrap();
        assert_eq!(got.category, Category::Other);
        assert!(got.keywords.is_empty());
    }

    #[test]
    fn test_key_phrases_capped() {
        let c = KeywordClassifier::new().unwrap();
        let text = (0..8)
            .map(|i| format!("Clause {i}: the controller must keep records"))
            .collect::<Vec<_>>()
            .join(". ");
        let got = c.classify(&text).unwrap();
        assert_eq!(got.key_phrases.len(), MAX_KEY_PHRASES);
    }

    #[test]
    fn test_override_skips_classifier() {
        let c = KeywordClassifier::new().unwrap();
        let got = classify_document(
            &c,
            "Insider trading is prohibited.",
            Some(Category::Ethics),
            1000,
        )
        .unwrap();
        assert_eq!(got.category, Category::Ethics);
        assert!(got.overridden);
        assert!(got.keywords.is_empty());
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        let c = KeywordClassifier::new().unwrap();
        let err = classify_document(&c, " \n\t ", None, 1000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = classify_document(&c, &"x".repeat(11), None, 10).unwrap_err();
        assert!(matches!(err, ComplianceError::DocumentTooLarge { size: 11, limit: 10 }));
    }

    #[test]
    fn test_normalize_text() {
        let got = normalize_text("  Title \t here \n\n\n\nBody\u{0007} line\nnext  ");
        assert_eq!(got, "Title here\n\nBody line\nnext");
    }
}
