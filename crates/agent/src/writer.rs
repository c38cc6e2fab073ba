use tracing::warn;

use crate::llm::{CompletionError, CompletionStep};
use crate::prompts::{PromptRenderer, WriteBriefing};

#[derive(Clone, Debug, PartialEq)]
pub enum DraftOutcome {
    Drafted(String),
    Fallback { text: String, error: CompletionError },
}

impl DraftOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Drafted(text) | Self::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Write step: drafts the hook/fact/question reply.
pub struct Writer {
    step: CompletionStep,
}

impl Writer {
    pub fn new(step: CompletionStep) -> Self {
        Self { step }
    }

    pub async fn draft(
        &self,
        prompts: &PromptRenderer,
        briefing: &WriteBriefing<'_>,
        fallback_question: &str,
    ) -> DraftOutcome {
        let result = match prompts.write_messages(briefing) {
            Ok(messages) => self.step.run(messages, false).await,
            Err(error) => Err(CompletionError::Configuration(error.to_string())),
        };

        match result.map(|text| clean_draft(&text)) {
            Ok(text) if !text.is_empty() => DraftOutcome::Drafted(text),
            Ok(_) => self.fallback(briefing, fallback_question, CompletionError::EmptyResponse),
            Err(error) => self.fallback(briefing, fallback_question, error),
        }
    }

    fn fallback(
        &self,
        briefing: &WriteBriefing<'_>,
        fallback_question: &str,
        error: CompletionError,
    ) -> DraftOutcome {
        warn!(
            event_name = "engine.write.fallback",
            phase = briefing.phase.phase.as_str(),
            error = %error,
            "write step degraded to canned question"
        );
        DraftOutcome::Fallback { text: fallback_question.to_string(), error }
    }
}

/// Drops wrapping quotes and speaker labels some models add around the reply.
pub fn clean_draft(raw: &str) -> String {
    let mut text = raw.trim();
    for label in ["Reply:", "Assistant:", "Message:"] {
        if let Some(rest) = text.strip_prefix(label) {
            text = rest.trim_start();
        }
    }
    let text = text
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text);
    text.trim().to_string()
}
