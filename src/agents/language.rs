//! Language agents: turn an analysis into the final answer text
//!
//! `compose` never fails. The Gemini agent falls back to the template on
//! any generation error.

use crate::agents::LanguageAgent;
use crate::gemini::GeminiClient;
use crate::models::AnalysisResult;
use async_trait::async_trait;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = r#"You are a financial analyst providing a concise market brief.

Guidelines:
- Use only the analysis and facts provided; do not invent figures
- No more than 200 words
- Neutral tone, but highlight notable risks or positive developments
- Plain prose suitable for being read aloud"#;

/// Deterministic templated summary
pub fn template_summary(analysis: &AnalysisResult) -> String {
    let mut out = String::new();

    let summary = analysis.summary_text.trim();
    if summary.is_empty() {
        out.push_str("Here is what I found.");
    } else {
        out.push_str(summary);
    }

    if !analysis.supporting_facts.is_empty() {
        out.push_str("\n\nKey facts:\n");
        for fact in &analysis.supporting_facts {
            out.push_str(&format!("- {}\n", fact));
        }
    }

    out.trim_end().to_string()
}

pub struct TemplateLanguageAgent;

#[async_trait]
impl LanguageAgent for TemplateLanguageAgent {
    async fn compose(&self, analysis: &AnalysisResult) -> String {
        template_summary(analysis)
    }
}

pub struct GeminiLanguageAgent {
    client: GeminiClient,
}

impl GeminiLanguageAgent {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageAgent for GeminiLanguageAgent {
    async fn compose(&self, analysis: &AnalysisResult) -> String {
        if !self.client.is_configured() {
            return template_summary(analysis);
        }

        let prompt = build_prompt(analysis);

        match self.client.generate(SYSTEM_PROMPT, &prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), "Language agent composed response");
                text
            }
            Ok(_) => {
                warn!("Language model returned empty text, using template");
                template_summary(analysis)
            }
            Err(e) => {
                warn!(error = %e, "Language model failed, using template");
                template_summary(analysis)
            }
        }
    }
}

fn build_prompt(analysis: &AnalysisResult) -> String {
    let mut prompt = format!(
        "Analysis (confidence {:.2}):\n{}\n",
        analysis.confidence, analysis.summary_text
    );
    if !analysis.supporting_facts.is_empty() {
        prompt.push_str("\nSupporting facts:\n- ");
        prompt.push_str(&analysis.supporting_facts.join("\n- "));
        prompt.push('\n');
    }
    prompt.push_str("\nWrite the market brief.");
    prompt
}
