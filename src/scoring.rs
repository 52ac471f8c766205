use crate::chunker::split_sentences;
use crate::lexicon::{tokenize, Lexicon};

/// Scaling applied to the raw match ratio. A sentence lands in
/// `0..=sentence_scale`; document scope multiplies each sentence score by
/// `document_rescale` before averaging (50 x 2 = 0..100).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    pub sentence_scale: f64,
    pub document_rescale: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy {
            sentence_scale: 50.0,
            document_rescale: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentenceScore {
    pub sentence: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentScore {
    /// Mean of the rescaled sentence scores; 0.0 with no sentences.
    pub score: f64,
    pub sentences: Vec<SentenceScore>,
}

impl DocumentScore {
    pub fn hits(&self) -> impl Iterator<Item = &SentenceScore> {
        self.sentences.iter().filter(|s| s.score > 0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LexiconScorer<'a> {
    lexicon: &'a Lexicon,
    policy: ScoringPolicy,
}

impl<'a> LexiconScorer<'a> {
    pub fn new(lexicon: &'a Lexicon, policy: ScoringPolicy) -> Self {
        LexiconScorer { lexicon, policy }
    }

    /// Density of lexicon hits in one sentence or chunk, in
    /// `0..=sentence_scale`. The denominator is `token_count - 1`, kept for
    /// compatibility with previously scored datasets; units with fewer than
    /// two tokens score 0.0.
    pub fn score_unit(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        if tokens.len() < 2 {
            return 0.0;
        }
        let matches = self.lexicon.count_matches(&tokens);
        let ratio = matches as f64 / (tokens.len() - 1) as f64;
        (ratio * self.policy.sentence_scale).clamp(0.0, self.policy.sentence_scale)
    }

    /// Score every sentence at document scope and average them.
    pub fn score_document(&self, text: &str) -> DocumentScore {
        let sentences: Vec<SentenceScore> = split_sentences(text)
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| SentenceScore {
                sentence: s.to_string(),
                score: self.score_unit(s) * self.policy.document_rescale,
            })
            .collect();

        let score = if sentences.is_empty() {
            0.0
        } else {
            sentences.iter().map(|s| s.score).sum::<f64>() / sentences.len() as f64
        };
        DocumentScore { score, sentences }
    }
}
