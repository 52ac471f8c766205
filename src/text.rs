/// Document text with every whitespace run (NBSP included) collapsed to a
/// single ASCII space and both ends trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedText {
    text: String,
}

impl NormalizedText {
    pub fn from_raw(raw: &str) -> Self {
        NormalizedText {
            text: normalize(raw),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Leading excerpt of at most `max_chars` characters, cut on a word boundary.
    pub fn sample(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for word in self.text.split(' ') {
            let extra = if out.is_empty() { 0 } else { 1 };
            if out.chars().count() + extra + word.chars().count() > max_chars {
                break;
            }
            if extra == 1 {
                out.push(' ');
            }
            out.push_str(word);
        }
        out
    }
}

/// NBSP -> space, collapse whitespace runs to one space, trim.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for word in raw
        .split(|c: char| c == '\u{00A0}' || c.is_whitespace())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn collapses_mixed_whitespace() {
        let raw = "  ITEM 1.\u{00A0}\u{00A0}BUSINESS\r\n\n\tWe  operate\u{2003}banks  ";
        assert_eq!(normalize(raw), "ITEM 1. BUSINESS We operate banks");
    }

    #[test]
    fn empty_and_blank_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t\u{00A0} "), "");
        assert!(NormalizedText::from_raw("\n\n").is_empty());
    }

    #[test]
    fn sample_cuts_on_words() {
        let text = NormalizedText::from_raw("alpha beta gamma delta");
        assert_eq!(text.sample(11), "alpha beta");
        assert_eq!(text.sample(100), "alpha beta gamma delta");
        assert_eq!(text.sample(3), "");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[a-zA-Z0-9 .,\\t\\n\\r\u{00A0}\u{2003}]{0,200}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn normalized_text_has_only_single_spaces(raw in "\\PC{0,200}") {
            let once = normalize(&raw);
            prop_assert!(!once.contains("  "));
            prop_assert!(once.chars().all(|c| c == ' ' || !c.is_whitespace()));
            prop_assert_eq!(once.trim(), once.as_str());
        }
    }
}
