use std::sync::LazyLock;

use regex::Regex;

use crate::text::NormalizedText;

/// Slices shorter than this are table-of-contents hits, not the narrative.
pub const MIN_SECTION_CHARS: usize = 200;

/// A start-of-section marker. Rules are tried in ascending `priority`; the
/// first rule that matches anywhere supplies every candidate start.
pub struct AnchorRule {
    pub name: &'static str,
    pub priority: u8,
    pub pattern: Regex,
}

static START_RULES: LazyLock<Vec<AnchorRule>> = LazyLock::new(|| {
    vec![
        AnchorRule {
            name: "item1_business",
            priority: 0,
            // ITEM 1. BUSINESS / ITEM 1 – BUSINESS / ITEM 1 BUSINESS / Item 1: Business
            pattern: Regex::new(r"(?i)ITEM\s*1\s*(?:[.:\u{2013}\u{2014}-]\s*)?BUSINESS").unwrap(),
        },
        AnchorRule {
            name: "item1_bare",
            priority: 1,
            pattern: Regex::new(r"(?i)ITEM\s*1\b").unwrap(),
        },
    ]
});

static END_ANCHORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)ITEM\s*1A", r"(?i)ITEM\s*1B", r"(?i)ITEM\s*2", r"(?i)RISK\s*FACTORS"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Half-open byte range `[start, end)` into the text it was extracted from,
/// already trimmed of surrounding whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionMatch {
    pub start: usize,
    pub end: usize,
    pub chars: usize,
}

impl SectionMatch {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

#[derive(Debug, Clone)]
pub struct SectionExtractor {
    min_chars: usize,
}

impl Default for SectionExtractor {
    fn default() -> Self {
        SectionExtractor {
            min_chars: MIN_SECTION_CHARS,
        }
    }
}

impl SectionExtractor {
    pub fn new(min_chars: usize) -> Self {
        SectionExtractor { min_chars }
    }

    /// Locate the Item 1 / Business narrative. `None` is a clean miss: no
    /// anchor at all, or every anchor only produced a short TOC slice.
    pub fn extract(&self, text: &NormalizedText) -> Option<SectionMatch> {
        let text = text.as_str();
        let candidates: Vec<SectionMatch> = anchor_starts(text)
            .into_iter()
            .filter_map(|start| candidate_from(text, start))
            .collect();
        select_longest(&candidates, self.min_chars)
    }

    #[cfg(test)]
    pub fn extract_text(&self, text: &NormalizedText) -> Option<String> {
        self.extract(text).map(|m| m.slice(text.as_str()).to_string())
    }
}

/// Positions just past each anchor occurrence, from the highest-priority
/// rule that matches at all.
fn anchor_starts(text: &str) -> Vec<usize> {
    let mut rules: Vec<&AnchorRule> = START_RULES.iter().collect();
    rules.sort_by_key(|r| r.priority);

    for rule in rules {
        let starts: Vec<usize> = rule.pattern.find_iter(text).map(|m| m.end()).collect();
        if !starts.is_empty() {
            tracing::trace!(rule = rule.name, hits = starts.len(), "anchor rule matched");
            return starts;
        }
    }
    Vec::new()
}

/// Earliest end anchor at or after `start`, or end of text.
fn nearest_end(text: &str, start: usize) -> usize {
    END_ANCHORS
        .iter()
        .filter_map(|re| re.find_at(text, start).map(|m| m.start()))
        .min()
        .unwrap_or(text.len())
}

fn candidate_from(text: &str, start: usize) -> Option<SectionMatch> {
    let end = nearest_end(text, start);
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = raw.len() - raw.trim_start().len();
    let start = start + lead;
    Some(SectionMatch {
        start,
        end: start + trimmed.len(),
        chars: trimmed.chars().count(),
    })
}

/// Drop candidates below `min_chars` and keep the longest survivor. TOC
/// entries are short because the next item follows immediately, so the
/// narrative is the longest slice. Ties keep the earliest candidate.
pub fn select_longest(candidates: &[SectionMatch], min_chars: usize) -> Option<SectionMatch> {
    candidates
        .iter()
        .filter(|c| c.chars >= min_chars)
        .fold(None, |best: Option<SectionMatch>, c| match best {
            Some(b) if b.chars >= c.chars => Some(b),
            _ => Some(*c),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(n: usize) -> String {
        let sentence = "We operate a mobile banking platform across three markets. ";
        sentence.repeat(n)
    }

    fn extract(raw: &str) -> Option<String> {
        SectionExtractor::default().extract_text(&NormalizedText::from_raw(raw))
    }

    #[test]
    fn returns_body_between_business_and_1a() {
        let narrative = body(6);
        let raw = format!("Cover page. ITEM 1. BUSINESS {} ITEM 1A. RISK FACTORS Our risks.", narrative);
        assert_eq!(extract(&raw).as_deref(), Some(narrative.trim()));
    }

    #[test]
    fn skips_table_of_contents_hits() {
        let narrative = body(8);
        let raw = format!(
            "TABLE OF CONTENTS Item 1. Business 3 Item 1A. Risk Factors 12 Item 2. Properties 30 \
             PART I Item 1. Business {} Item 1A. Risk Factors The following risks.",
            narrative
        );
        assert_eq!(extract(&raw).as_deref(), Some(narrative.trim()));
    }

    #[test]
    fn only_toc_hits_is_a_miss() {
        let raw = "Item 1. Business 3 Item 1A. Risk Factors 12 Item 1B. Unresolved Staff Comments 20 \
                   Item 2. Properties 21";
        assert_eq!(extract(raw), None);
    }

    #[test]
    fn no_anchor_is_a_miss() {
        assert_eq!(extract(&body(20)), None);
        assert_eq!(extract(""), None);
    }

    #[test]
    fn falls_back_to_bare_item_1() {
        let narrative = body(5);
        let raw = format!("ITEM 1 {} ITEM 2. PROPERTIES", narrative);
        assert_eq!(extract(&raw).as_deref(), Some(narrative.trim()));
    }

    #[test]
    fn bare_anchor_ignores_item_10_and_1a() {
        let raw = format!("ITEM 10. DIRECTORS {} ITEM 1A. RISKS {}", body(5), body(5));
        assert_eq!(extract(&raw), None);
    }

    #[test]
    fn accepts_dash_and_colon_separators() {
        let narrative = body(5);
        for anchor in ["Item 1 \u{2013} Business", "ITEM 1: BUSINESS", "Item 1 Business", "ITEM1.BUSINESS"] {
            let raw = format!("{} {} Item 2. Properties", anchor, narrative);
            assert_eq!(extract(&raw).as_deref(), Some(narrative.trim()), "anchor {anchor:?}");
        }
    }

    #[test]
    fn runs_to_end_of_text_without_end_anchor() {
        let narrative = body(5);
        let raw = format!("ITEM 1. BUSINESS {}", narrative);
        assert_eq!(extract(&raw).as_deref(), Some(narrative.trim()));
    }

    #[test]
    fn risk_factors_phrase_ends_the_section() {
        let narrative = body(5);
        let raw = format!("ITEM 1. BUSINESS {} See Risk Factors below. more text", narrative);
        assert_eq!(extract(&raw).as_deref(), Some(format!("{} See", narrative.trim()).as_str()));
    }

    #[test]
    fn match_offsets_are_trimmed() {
        let text = NormalizedText::from_raw(&format!("ITEM 1. BUSINESS {} ITEM 2", body(5)));
        let m = SectionExtractor::default().extract(&text).unwrap();
        let slice = m.slice(text.as_str());
        assert!(m.end > m.start);
        assert_eq!(slice, slice.trim());
        assert_eq!(m.chars, slice.chars().count());
    }

    #[test]
    fn longest_policy() {
        let c = |start: usize, chars: usize| SectionMatch {
            start,
            end: start + chars,
            chars,
        };
        assert_eq!(select_longest(&[], 200), None);
        assert_eq!(select_longest(&[c(0, 150), c(500, 199)], 200), None);
        assert_eq!(select_longest(&[c(0, 300), c(500, 900), c(2000, 400)], 200), Some(c(500, 900)));
        assert_eq!(select_longest(&[c(0, 300), c(500, 300)], 200), Some(c(0, 300)));
        assert_eq!(select_longest(&[c(0, 200)], 200), Some(c(0, 200)));
    }

    #[test]
    fn configurable_threshold() {
        let raw = "ITEM 1. BUSINESS Short but real. ITEM 1A. RISK FACTORS";
        let text = NormalizedText::from_raw(raw);
        assert_eq!(SectionExtractor::default().extract(&text), None);
        assert_eq!(
            SectionExtractor::new(10).extract_text(&text).as_deref(),
            Some("Short but real.")
        );
    }

    #[test]
    fn fixture_filing() {
        let raw = std::fs::read_to_string("tests/fixtures/acme_10k.txt").unwrap();
        let section = extract(&raw).unwrap();
        assert!(section.starts_with("Overview Acme Financial Holdings"));
        assert!(section.contains("digital wallet"));
        assert!(!section.contains("Unresolved Staff Comments"));
        assert!(!section.to_lowercase().contains("risk factors"));
    }
}
