//! Deterministic analysis over market data and retrieved excerpts
//!
//! No LLM here: facts are extracted, not generated.

use crate::agents::AnalysisAgent;
use crate::error::OrchestrationError;
use crate::models::{AnalysisResult, MarketData, RetrievalResult};
use crate::Result;
use async_trait::async_trait;

/// Excerpts quoted as supporting facts
const MAX_EXCERPT_FACTS: usize = 3;
/// Characters kept from each excerpt
const EXCERPT_CHARS: usize = 280;

/// Confidence when every headline quote field is present
const FULL_QUOTE_CONFIDENCE: f64 = 0.9;

/// Headline fields, in reporting order, with their labels
const MARKET_FACTS: &[(&str, &str)] = &[
    ("price", "Last price"),
    ("change", "Change"),
    ("change_percent", "Change %"),
    ("previous_close", "Previous close"),
    ("volume", "Volume"),
    ("pe_ratio", "P/E ratio"),
    ("eps", "EPS"),
    ("market_cap", "Market cap"),
    ("dividend_yield", "Dividend yield"),
    ("week52_high", "52-week high"),
    ("week52_low", "52-week low"),
];

pub struct RuleBasedAnalysisAgent;

#[async_trait]
impl AnalysisAgent for RuleBasedAnalysisAgent {
    async fn analyze(
        &self,
        market_data: Option<&MarketData>,
        retrieval: Option<&RetrievalResult>,
    ) -> Result<AnalysisResult> {
        if market_data.is_none() && retrieval.is_none() {
            return Err(OrchestrationError::InsufficientInput(
                "analysis needs market data or retrieved documents".to_string(),
            ));
        }

        let mut summary_parts = Vec::new();
        let mut supporting_facts = Vec::new();
        let mut confidences = Vec::new();

        if let Some(data) = market_data {
            summary_parts.push(market_summary(data));
            supporting_facts.extend(market_facts(data));
            confidences.push(market_confidence(data));
        }

        if let Some(result) = retrieval {
            summary_parts.push(retrieval_summary(result));
            supporting_facts.extend(
                result
                    .excerpts
                    .iter()
                    .take(MAX_EXCERPT_FACTS)
                    .map(|e| format!("[{}] {}", e.source_id, truncate(&e.text, EXCERPT_CHARS))),
            );
            confidences.push(result.aggregate_confidence);
        }

        let confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;

        Ok(AnalysisResult {
            summary_text: summary_parts.join(" "),
            supporting_facts,
            confidence,
        })
    }
}

fn market_summary(data: &MarketData) -> String {
    let symbol = &data.instrument_id;
    let name = data
        .fields
        .get("name")
        .and_then(|v| v.as_str())
        .map(|n| format!("{} ({})", n, symbol))
        .unwrap_or_else(|| symbol.clone());

    let mut summary = match data.number("price") {
        Some(price) => format!("{} last traded at {:.2}", name, price),
        None => format!("{} has no current price", name),
    };

    if let (Some(change), Some(pct)) = (data.number("change"), data.number("change_percent")) {
        let direction = if change >= 0.0 { "up" } else { "down" };
        summary.push_str(&format!(", {} {:.2} ({:+.2}%)", direction, change.abs(), pct));
    }
    if let Some(pe) = data.number("pe_ratio") {
        summary.push_str(&format!(", with a P/E ratio of {:.2}", pe));
    }
    summary.push('.');
    summary
}

fn market_facts(data: &MarketData) -> Vec<String> {
    MARKET_FACTS
        .iter()
        .filter_map(|(field, label)| {
            data.number(field)
                .map(|value| format!("{}: {}", label, format_number(value)))
        })
        .collect()
}

fn market_confidence(data: &MarketData) -> f64 {
    let headline = ["price", "change", "change_percent", "previous_close"];
    let present = headline.iter().filter(|f| data.number(f).is_some()).count();
    FULL_QUOTE_CONFIDENCE * present as f64 / headline.len() as f64
}

fn retrieval_summary(result: &RetrievalResult) -> String {
    let sources: Vec<&str> = {
        let mut seen = Vec::new();
        for excerpt in &result.excerpts {
            if !seen.contains(&excerpt.source_id.as_str()) {
                seen.push(excerpt.source_id.as_str());
            }
        }
        seen
    };

    match sources.len() {
        0 => "No supporting documents were found.".to_string(),
        _ => format!(
            "{} relevant passage(s) from {} ({:.0}% match confidence).",
            result.excerpts.len(),
            sources.join(", "),
            result.aggregate_confidence * 100.0
        ),
    }
}

fn format_number(value: f64) -> String {
    if value.abs() >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if value.abs() >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else {
        format!("{:.2}", value)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
