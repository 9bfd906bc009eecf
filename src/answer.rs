//! Retrieval-augmented answering.
//!
//! The read path: embed the question, pull the top-k most similar documents
//! from the index, assemble a grounded prompt (role framing, recent
//! conversation, retrieved context, question, answer instructions — in that
//! fixed order), and run one generation call. Retrieval and generation
//! failures are distinct error variants so callers know which stage to
//! re-run; there is no retry inside the pipeline.

use thiserror::Error;

use crate::app::AppContext;
use crate::embedding;
use crate::index;
use crate::llm;
use crate::models::{ConversationTurn, ScoredDocument, SourceRef};

/// Only the most recent 3 exchanges (6 turns) are rendered into the prompt.
pub const HISTORY_WINDOW: usize = 6;

/// Length of the source preview excerpt, in characters.
pub const PREVIEW_CHARS: usize = 150;

/// A failure in the answer pipeline, tagged by stage.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] anyhow::Error),
    #[error("generation failed: {0}")]
    Generation(#[source] anyhow::Error),
}

impl AnswerError {
    /// Stage name for structured error reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            AnswerError::Retrieval(_) => "retrieval",
            AnswerError::Generation(_) => "generation",
        }
    }
}

/// A generated answer with its supporting sources.
#[derive(Debug)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Top-k documents for a free-text query. Shared by the answer pipeline and
/// the plain search surface.
pub async fn retrieve(
    ctx: &AppContext,
    query: &str,
    k: usize,
) -> anyhow::Result<Vec<ScoredDocument>> {
    let query_vec =
        embedding::embed_query(ctx.embedder.as_ref(), &ctx.config.embedding, query).await?;
    index::similarity_query(&ctx.pool, &query_vec, k).await
}

/// Answer a question grounded in the indexed records.
pub async fn answer(
    ctx: &AppContext,
    question: &str,
    history: &[ConversationTurn],
    k: usize,
) -> Result<Answer, AnswerError> {
    let retrieved = retrieve(ctx, question, k)
        .await
        .map_err(AnswerError::Retrieval)?;

    let sources: Vec<SourceRef> = retrieved.iter().map(|s| source_ref(s)).collect();

    let mut context_text = String::new();
    for scored in &retrieved {
        context_text.push_str(&scored.doc.body);
        context_text.push_str("\n\n");
    }

    let prompt = build_prompt(&render_history(history), &context_text, question);

    let generated = llm::generate(&ctx.config.llm, &prompt)
        .await
        .map_err(AnswerError::Generation)?;

    Ok(Answer {
        answer: generated,
        sources,
    })
}

/// Render the bounded history suffix as `Role: content` lines.
pub fn render_history(history: &[ConversationTurn]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut rendered = String::new();

    for turn in &history[start..] {
        rendered.push_str(&capitalize(&turn.role));
        rendered.push_str(": ");
        rendered.push_str(&turn.content);
        rendered.push_str("\n\n");
    }

    rendered
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Assemble the grounded prompt. Section order is part of the contract:
/// role framing, prior conversation, retrieved context, the question, then
/// the answer instructions.
pub fn build_prompt(history_block: &str, context: &str, question: &str) -> String {
    format!(
        "You are a cybersecurity expert assistant specializing in vulnerability analysis.\n\
         \n\
         Previous conversation:\n\
         {}\n\
         Current context from CVE database:\n\
         {}\n\
         Current question: {}\n\
         \n\
         Provide a clear, accurate, and helpful answer. Consider the conversation history \
         when answering. If referring to something from earlier in the conversation, \
         acknowledge it naturally. If the information isn't in the context, say so.\n\
         \n\
         Answer:",
        history_block, context, question
    )
}

/// Build the display reference for one retrieved document.
pub fn source_ref(scored: &ScoredDocument) -> SourceRef {
    let doc = &scored.doc;
    SourceRef {
        cve_id: doc.cve_id.clone(),
        severity: doc.severity.clone(),
        score: doc.score.clone(),
        status: doc.status.clone(),
        published: date_portion(&doc.published),
        year: doc.year.clone(),
        description_preview: preview(&doc.body),
    }
}

/// Date portion (first 10 characters) of a feed timestamp.
pub fn date_portion(timestamp: &str) -> String {
    timestamp.chars().take(10).collect()
}

fn preview(body: &str) -> String {
    let mut p: String = body.chars().take(PREVIEW_CHARS).collect();
    p.push_str("...");
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn turn(role: &str, content: &str) -> ConversationTurn {
        ConversationTurn {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    fn scored(cve_id: &str, body: &str) -> ScoredDocument {
        ScoredDocument {
            doc: Document {
                cve_id: cve_id.to_string(),
                body: body.to_string(),
                published: "2024-03-15T10:00:00.000".to_string(),
                last_modified: "2024-04-01T08:30:00.000".to_string(),
                status: "Analyzed".to_string(),
                score: "9.8".to_string(),
                severity: "CRITICAL".to_string(),
                source: "NVD".to_string(),
                year: "2024".to_string(),
            },
            similarity: 0.9,
        }
    }

    #[test]
    fn test_history_window_keeps_last_six() {
        let history: Vec<ConversationTurn> = (0..10)
            .map(|i| turn(if i % 2 == 0 { "user" } else { "assistant" }, &format!("turn {}", i)))
            .collect();

        let rendered = render_history(&history);
        assert!(!rendered.contains("turn 3"));
        assert!(rendered.contains("turn 4"));
        assert!(rendered.contains("turn 9"));
        assert_eq!(rendered.matches(": turn").count(), 6);
    }

    #[test]
    fn test_history_roles_capitalized() {
        let rendered = render_history(&[turn("user", "hi"), turn("assistant", "hello")]);
        assert!(rendered.contains("User: hi"));
        assert!(rendered.contains("Assistant: hello"));
    }

    #[test]
    fn test_prompt_section_order() {
        let prompt = build_prompt("User: earlier question\n\n", "CVE ID: CVE-2024-1\n\n", "what now?");

        let framing = prompt.find("cybersecurity expert assistant").unwrap();
        let history = prompt.find("Previous conversation:").unwrap();
        let context = prompt.find("Current context from CVE database:").unwrap();
        let question = prompt.find("Current question: what now?").unwrap();
        let instructions = prompt.find("Provide a clear, accurate").unwrap();

        assert!(framing < history);
        assert!(history < context);
        assert!(context < question);
        assert!(question < instructions);
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_prompt_mentions_acknowledging_history() {
        let prompt = build_prompt("", "", "q");
        assert!(prompt.contains("acknowledge it naturally"));
    }

    #[test]
    fn test_source_ref_truncates_published_date() {
        let s = source_ref(&scored("CVE-2024-0001", "body"));
        assert_eq!(s.published, "2024-03-15");
        assert_eq!(s.year, "2024");
    }

    #[test]
    fn test_preview_caps_at_150_chars() {
        let long_body = "x".repeat(400);
        let s = source_ref(&scored("CVE-2024-0001", &long_body));
        assert_eq!(s.description_preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(s.description_preview.ends_with("..."));
    }

    #[test]
    fn test_preview_is_char_safe() {
        let body = "é".repeat(200);
        let s = source_ref(&scored("CVE-2024-0001", &body));
        assert!(s.description_preview.starts_with('é'));
        assert_eq!(s.description_preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_error_stage_names() {
        let r = AnswerError::Retrieval(anyhow::anyhow!("no index"));
        let g = AnswerError::Generation(anyhow::anyhow!("no model"));
        assert_eq!(r.stage(), "retrieval");
        assert_eq!(g.stage(), "generation");
    }
}
