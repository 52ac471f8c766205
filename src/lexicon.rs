use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;

use crate::error::LexiconError;

/// Longest term in the built-in vocabulary ("central bank digital currency").
pub const MAX_TERM_TOKENS: usize = 4;

/// Words keep inner hyphens, apostrophes and dots ("e-wallet", "u.s.");
/// any other non-space symbol is a token of its own.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:[-'\u{2019}.]\w+)*|[^\w\s]").unwrap());

const POSSESSIVE_SUFFIXES: [&str; 2] = ["'s", "\u{2019}s"];

/// Lowercased word and punctuation tokens. A possessive `'s` is split off
/// as its own token ("fintech's" -> "fintech", "'s").
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens = Vec::new();
    for m in TOKEN_RE.find_iter(&lower) {
        let word = m.as_str();
        match split_possessive(word) {
            Some((stem, clitic)) => {
                tokens.push(stem.to_string());
                tokens.push(clitic.to_string());
            }
            None => tokens.push(word.to_string()),
        }
    }
    tokens
}

fn split_possessive(word: &str) -> Option<(&str, &str)> {
    POSSESSIVE_SUFFIXES.iter().find_map(|suffix| {
        let stem = word.strip_suffix(*suffix)?;
        if stem.is_empty() {
            None
        } else {
            Some((stem, &word[stem.len()..]))
        }
    })
}

const DIGITAL_FINANCE_TERMS: &[&str] = &[
    // core
    "digital finance", "fintech", "financial technology", "digital banking", "neo-bank",
    "online banking", "mobile banking", "internet banking", "e-banking", "virtual bank",
    "challenger bank", "open banking", "embedded finance", "banking-as-a-service",
    "digital wallet", "e-wallet", "mobile wallet", "virtual wallet",
    "digital payment", "mobile payment", "contactless payment", "qr code payment",
    "online payment", "peer-to-peer payment", "p2p lending", "digital lending",
    "crowdfunding", "crowdlending", "microfinance platform",
    // ledgers and assets
    "blockchain", "distributed ledger", "dlt", "cryptocurrency",
    "bitcoin", "ethereum", "stablecoin", "central bank digital currency", "cbdc",
    "tokenization", "smart contracts", "decentralized finance", "defi",
    "robo-advisor", "digital wealth management", "automated investment",
    "algorithmic trading", "high-frequency trading", "digital brokerage",
    "insurtech", "digital insurance", "parametric insurance",
    "regtech", "regulatory technology", "suptech", "supervisory technology",
    // identity and security
    "digital identity", "e-kyc", "electronic know your customer", "digital onboarding",
    "biometric authentication", "two-factor authentication",
    "cybersecurity", "fraud detection", "anti-money laundering", "aml",
    "know your customer", "kyc", "transaction monitoring",
    // payments and credit
    "digital remittance", "cross-border payment", "instant payment",
    "buy now pay later", "bnpl", "digital credit", "virtual credit card",
    "open api", "api banking", "api integration", "cloud banking",
    // analytics and automation
    "artificial intelligence", "machine learning", "natural language processing",
    "chatbot", "conversational banking",
    "digital financial inclusion", "financial inclusion platform",
    "digital microfinance", "agent banking",
    "big data analytics", "predictive analytics", "real-time analytics",
    "token economy", "digital asset", "digital securities",
    "robo-underwriting", "digital mortgage", "online loan application",
    "virtual advisory", "remote financial advisory",
    "instant settlement", "real-time gross settlement", "rtgs",
    "payment gateway", "merchant acquiring", "digital point-of-sale", "pos system",
    // platforms
    "digital ecosystem", "super app", "platform banking", "software-as-a-service", "saas",
    "banking-as-a-service", "b2b fintech", "b2c fintech", "b2b2c fintech",
    "fintech partnership", "fintech collaboration", "fintech innovation", "digital transformation",
    "financial cloud", "cloud computing", "edge computing", "5g banking",
    "quantum computing", "quantum-safe encryption", "digital twin",
    "sustainable finance", "green fintech", "esg investing", "environmental social governance",
    // reporting and compliance
    "digital reporting", "xbrl", "e-invoicing", "digital audit", "continuous auditing",
    "digital tax", "e-tax filing", "digital compliance", "regtech solution",
    "digital currency exchange", "crypto exchange", "decentralized exchange", "dex",
    "non-fungible token", "nft", "nft marketplace", "digital collectible",
    "digital rights management", "drm", "smart property", "digital contract",
    "digital trust", "digital notary", "e-notary", "digital signature", "e-signature",
    "digital banking platform", "core banking system", "software solutions",
];

/// One domain term as a sequence of lowercase tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LexiconEntry(Vec<String>);

impl LexiconEntry {
    pub fn parse(term: &str) -> Result<Self, LexiconError> {
        let tokens: Vec<String> = term.split_whitespace().map(|t| t.to_lowercase()).collect();
        if tokens.is_empty() {
            return Err(LexiconError::EmptyTerm);
        }
        if tokens.len() > MAX_TERM_TOKENS {
            return Err(LexiconError::TermTooLong {
                term: term.to_string(),
                max: MAX_TERM_TOKENS,
            });
        }
        Ok(LexiconEntry(tokens))
    }

    #[cfg(test)]
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Immutable vocabulary, built once before any scoring starts. Entries are
/// indexed by token length so matching slides one window size at a time.
#[derive(Debug, Clone)]
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    by_len: BTreeMap<usize, HashSet<Vec<String>>>,
}

impl Lexicon {
    pub fn new<I, S>(terms: I) -> Result<Self, LexiconError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<LexiconEntry> = terms
            .into_iter()
            .map(|t| LexiconEntry::parse(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .unique()
            .collect();
        if entries.is_empty() {
            return Err(LexiconError::Empty);
        }

        let mut by_len: BTreeMap<usize, HashSet<Vec<String>>> = BTreeMap::new();
        for entry in &entries {
            by_len.entry(entry.len()).or_default().insert(entry.0.clone());
        }
        Ok(Lexicon { entries, by_len })
    }

    /// The digital-finance vocabulary shipped with the scorer.
    pub fn builtin() -> Self {
        Lexicon::new(DIGITAL_FINANCE_TERMS.iter().copied())
            .expect("built-in lexicon terms are non-empty and within MAX_TERM_TOKENS")
    }

    /// One term per line; blank lines and `#` comments are ignored.
    pub fn from_file(path: &Path) -> Result<Self, LexiconError> {
        let content = fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Lexicon::new(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Contiguous exact matches of every entry over `tokens`. Overlapping
    /// hits of different entries each count ("digital banking platform"
    /// also scores "digital banking").
    pub fn count_matches(&self, tokens: &[String]) -> usize {
        self.by_len
            .iter()
            .filter(|(n, _)| **n <= tokens.len())
            .map(|(n, terms)| {
                tokens
                    .windows(*n)
                    .filter(|w| terms.contains(*w))
                    .count()
            })
            .sum()
    }
}
