use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_MAX_SENTENCES: usize = 5;
pub const DEFAULT_MAX_CHARS: usize = 2000;

static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Split on `.`, `!` or `?` followed by whitespace. The punctuation stays
/// with its sentence; pieces are trimmed and may be empty.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut from = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        let cut = m.start() + 1;
        out.push(text[from..cut].trim());
        from = m.end();
    }
    out.push(text[from..].trim());
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 1-based position within the document.
    pub index: usize,
    pub text: String,
    pub sentences: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    max_sentences: usize,
    max_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Chunker {
            max_sentences: DEFAULT_MAX_SENTENCES,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

impl Chunker {
    pub fn new(max_sentences: usize, max_chars: usize) -> Self {
        Chunker {
            max_sentences: max_sentences.max(1),
            max_chars: max_chars.max(1),
        }
    }

    /// Group sentences into chunks, closing one as soon as it holds
    /// `max_sentences` sentences or its running length (sentence plus one
    /// separator each) reaches `max_chars`. Blank sentences are skipped.
    pub fn chunk(&self, section: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut running = 0usize;

        for sentence in split_sentences(section) {
            if sentence.is_empty() {
                continue;
            }
            current.push(sentence);
            running += sentence.chars().count() + 1;

            if current.len() >= self.max_sentences || running >= self.max_chars {
                push_chunk(&mut chunks, &mut current);
                running = 0;
            }
        }
        if !current.is_empty() {
            push_chunk(&mut chunks, &mut current);
        }
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, current: &mut Vec<&str>) {
    chunks.push(Chunk {
        index: chunks.len() + 1,
        text: current.join(" "),
        sentences: current.len(),
    });
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let s = split_sentences("We grew. Did we? Yes!  Revenue was $4.5 billion. End");
        assert_eq!(s, vec!["We grew.", "Did we?", "Yes!", "Revenue was $4.5 billion.", "End"]);
    }

    #[test]
    fn punctuation_without_space_does_not_split() {
        assert_eq!(split_sentences("See www.acme.com for details."), vec!["See www.acme.com for details."]);
    }

    #[test]
    fn five_sentences_per_chunk_by_default() {
        let text = (1..=12).map(|i| format!("Sentence {i}.")).collect::<Vec<_>>().join(" ");
        let chunks = Chunker::default().chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "Sentence 1. Sentence 2. Sentence 3. Sentence 4. Sentence 5.");
        assert_eq!(chunks[2].text, "Sentence 11. Sentence 12.");
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(chunks[2].sentences, 2);
    }

    #[test]
    fn char_ceiling_closes_early() {
        let long = format!("{}.", "x".repeat(1200));
        let text = format!("{long} {long} Short one.");
        let chunks = Chunker::default().chunk(&text);
        // 1201 + 1 < 2000, then 2404 >= 2000 closes after the second sentence
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].sentences, 2);
        assert_eq!(chunks[1].text, "Short one.");
    }

    #[test]
    fn empty_section_yields_no_chunks() {
        assert!(Chunker::default().chunk("").is_empty());
        assert!(Chunker::default().chunk("   ").is_empty());
    }

    #[test]
    fn whitespace_between_sentences_is_collapsed() {
        let chunks = Chunker::new(2, 2000).chunk("One.\n\n  Two.\tThree.");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "One. Two.");
        assert_eq!(chunks[1].text, "Three.");
    }

    proptest! {
        #[test]
        fn chunks_cover_every_sentence_in_order(
            words in proptest::collection::vec("[a-z]{1,12}[.!?]?", 0..200),
            max_sentences in 1usize..8,
            max_chars in 20usize..400,
        ) {
            let text = words.join(" ");
            let chunks = Chunker::new(max_sentences, max_chars).chunk(&text);

            let expected: Vec<&str> = split_sentences(&text).into_iter().filter(|s| !s.is_empty()).collect();
            let joined: Vec<&str> = chunks.iter().flat_map(|c| split_sentences(&c.text)).collect();
            prop_assert_eq!(joined, expected);

            for (i, c) in chunks.iter().enumerate() {
                prop_assert_eq!(c.index, i + 1);
                prop_assert!(c.sentences >= 1);
                prop_assert!(c.sentences <= max_sentences);
            }
        }

        #[test]
        fn closed_chunks_hit_a_threshold(
            words in proptest::collection::vec("[a-z]{1,30}[.]?", 1..300),
        ) {
            let text = words.join(" ");
            let chunks = Chunker::default().chunk(&text);
            let last = chunks.len().saturating_sub(1);
            for c in &chunks[..last] {
                let len: usize = split_sentences(&c.text).iter().map(|s| s.chars().count() + 1).sum();
                prop_assert!(c.sentences == DEFAULT_MAX_SENTENCES || len >= DEFAULT_MAX_CHARS);
            }
        }
    }
}
