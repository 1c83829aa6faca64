//! Query Router
//!
//! Classifies a normalized query into one of:
//! - MarketData: quotes, ratios, valuation ("What is AAPL's P/E ratio?")
//! - DocumentQuery: filings and reports ("Summarize risk factors in the latest 10-K")
//! - Mixed: both signals present
//! - Unknown: no signal; executed like Mixed

use crate::models::{RouteDecision, RouteKind};

/// Single-word market terms, matched against whole words
const MARKET_WORDS: &[&str] = &[
    "price", "prices", "priced", "quote", "quotes", "p/e", "pe", "valuation",
    "volume", "stock", "stocks", "share", "shares", "trading", "traded",
    "dividend", "dividends", "eps", "ticker", "performing", "performance",
];

/// Multi-word market phrases, matched as substrings
const MARKET_PHRASES: &[&str] = &[
    "market cap", "market data", "market value", "pe ratio", "p/e ratio",
    "52-week", "earnings per share", "stock price",
];

const FILING_WORDS: &[&str] = &[
    "10-k", "10-q", "8-k", "20-f", "filing", "filings", "filed", "summarize",
    "summarise", "disclosure", "disclosures", "prospectus", "transcript",
    "report", "reports", "md&a", "proxy", "sec",
];

const FILING_PHRASES: &[&str] = &[
    "annual report", "quarterly report", "risk factor", "earnings call",
    "management discussion",
];

/// Uppercase tokens that look like tickers but are not
const NON_TICKER_ACRONYMS: &[&str] = &[
    "I", "A", "SEC", "CEO", "CFO", "CTO", "GDP", "US", "USA", "UK", "EU", "AI",
    "ETF", "IPO", "ESG", "FAQ", "EPS", "PE", "NYSE", "OK", "TTM", "YOY", "QOQ",
];

/// Well-known company names resolved to a listing symbol
const COMPANY_TICKERS: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("tesla", "TSLA"),
    ("alphabet", "GOOGL"),
    ("google", "GOOGL"),
    ("amazon", "AMZN"),
    ("nvidia", "NVDA"),
    ("meta", "META"),
    ("netflix", "NFLX"),
    ("tsmc", "TSM"),
    ("samsung", "005930.KS"),
];

/// Keyword/entity router. Stateless and side-effect free.
pub struct QueryRouter;

impl QueryRouter {
    /// Route a normalized query. Total: every input maps to exactly one decision.
    pub fn route(query_text: &str) -> RouteDecision {
        let lowered = query_text.to_lowercase();
        let words: Vec<String> = query_text.split_whitespace().map(normalize_word).collect();
        let lowered_words: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

        let ticker = find_ticker(query_text, &words);

        let market_score = score(&lowered, &lowered_words, MARKET_WORDS, MARKET_PHRASES);
        let filing_score = score(&lowered, &lowered_words, FILING_WORDS, FILING_PHRASES);

        let market_signal = ticker.is_some() || market_score > 0;
        let document_signal = filing_score > 0;

        let kind = match (market_signal, document_signal) {
            (true, true) => RouteKind::Mixed,
            (true, false) => RouteKind::MarketData,
            (false, true) => RouteKind::DocumentQuery,
            (false, false) => RouteKind::Unknown,
        };

        let instrument = ticker.or_else(|| resolve_company(&lowered_words));

        RouteDecision { kind, instrument }
    }
}

fn score(lowered: &str, words: &[String], singles: &[&str], phrases: &[&str]) -> usize {
    let word_hits = singles
        .iter()
        .filter(|kw| words.iter().any(|w| w == *kw))
        .count();
    let phrase_hits = phrases.iter().filter(|p| lowered.contains(**p)).count();
    word_hits + phrase_hits
}

/// Strip surrounding punctuation, a leading `$` and a possessive suffix
fn normalize_word(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| !(c.is_alphanumeric() || c == '$' || c == '&'));
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_suffix("'s")
        .or_else(|| trimmed.strip_suffix("\u{2019}s"))
        .unwrap_or(trimmed);
    trimmed
        .trim_matches(|c: char| !(c.is_alphanumeric() || c == '&'))
        .to_string()
}

/// Pick the instrument symbol written in the query.
///
/// A `$`-prefixed or possessive token wins over a bare one. In an all-caps
/// query casing says nothing, so bare tokens only count when they are a
/// known listing symbol.
fn find_ticker(query_text: &str, words: &[String]) -> Option<String> {
    let raw_words: Vec<&str> = query_text.split_whitespace().collect();

    let marked = raw_words
        .iter()
        .zip(words)
        .find(|(raw, word)| is_marked(raw) && is_ticker_like(word))
        .map(|(_, word)| word.clone());
    if marked.is_some() {
        return marked;
    }

    if is_shouted(query_text) {
        words
            .iter()
            .find(|w| is_ticker_like(w) && is_known_symbol(w))
            .cloned()
    } else {
        words.iter().find(|w| is_ticker_like(w)).cloned()
    }
}

fn is_marked(raw: &str) -> bool {
    let trimmed = raw.trim_matches(|c: char| {
        !(c.is_alphanumeric() || c == '$' || c == '\'' || c == '\u{2019}')
    });
    trimmed.starts_with('$') || trimmed.ends_with("'s") || trimmed.ends_with("\u{2019}s")
}

/// Every letter uppercase, with enough letters to be more than a bare symbol
fn is_shouted(query_text: &str) -> bool {
    let mut letters = query_text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some()
        && query_text.split_whitespace().count() > 2
        && letters.all(|c| c.is_uppercase())
}

fn is_known_symbol(word: &str) -> bool {
    COMPANY_TICKERS.iter().any(|(_, ticker)| *ticker == word)
}

fn is_ticker_like(word: &str) -> bool {
    (1..=5).contains(&word.len())
        && word.chars().all(|c| c.is_ascii_uppercase())
        && !NON_TICKER_ACRONYMS.contains(&word)
}

fn resolve_company(words: &[String]) -> Option<String> {
    words.iter().find_map(|w| {
        COMPANY_TICKERS
            .iter()
            .find(|(name, _)| w == name)
            .map(|(_, ticker)| ticker.to_string())
    })
}
