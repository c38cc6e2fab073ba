use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use leadflow_core::style::{StyleIssue, StyleRules, SupportIssue, SupportStyleRules};

use crate::llm::{CompletionError, CompletionStep};
use crate::prompts::PromptRenderer;
use crate::writer::clean_draft;

/// Deterministic reply rules: a checker plus a cheap local fix.
pub trait ReplyRules {
    type Issue: fmt::Display + Clone + fmt::Debug;

    fn check(&self, draft: &str) -> Vec<Self::Issue>;
    fn local_fix(&self, draft: &str) -> String;
}

impl ReplyRules for StyleRules {
    type Issue = StyleIssue;

    fn check(&self, draft: &str) -> Vec<StyleIssue> {
        StyleRules::check(self, draft)
    }

    fn local_fix(&self, draft: &str) -> String {
        self.strip_fixes(draft)
    }
}

impl ReplyRules for SupportStyleRules {
    type Issue = SupportIssue;

    fn check(&self, draft: &str) -> Vec<SupportIssue> {
        SupportStyleRules::check(self, draft)
    }

    fn local_fix(&self, draft: &str) -> String {
        self.truncate(draft)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPath {
    /// Draft passed the check untouched.
    Clean,
    /// Local fixes were enough.
    Fixed,
    /// One regeneration call produced a passing reply.
    Regenerated,
    /// Nothing passed; the safe question was used.
    Fallback,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuardOutcome<I> {
    pub text: String,
    pub path: RepairPath,
    /// Issues found on the original draft.
    pub issues: Vec<I>,
    pub regeneration_error: Option<CompletionError>,
}

impl<I> GuardOutcome<I> {
    pub fn degraded(&self) -> bool {
        self.path == RepairPath::Fallback
    }
}

/// Check and Repair steps. At most one regeneration call per review.
pub struct ReplyGuard {
    step: CompletionStep,
}

impl ReplyGuard {
    pub fn new(step: CompletionStep) -> Self {
        Self { step }
    }

    pub async fn review<R: ReplyRules>(
        &self,
        rules: &R,
        prompts: &PromptRenderer,
        draft: &str,
        safe_reply: &str,
    ) -> GuardOutcome<R::Issue> {
        let issues = rules.check(draft);
        if issues.is_empty() {
            return GuardOutcome {
                text: draft.trim().to_string(),
                path: RepairPath::Clean,
                issues,
                regeneration_error: None,
            };
        }
        debug!(event_name = "engine.check.failed", issue_count = issues.len(), "draft failed check");

        let fixed = rules.local_fix(draft);
        let remaining = rules.check(&fixed);
        if remaining.is_empty() {
            return GuardOutcome { text: fixed, path: RepairPath::Fixed, issues, regeneration_error: None };
        }

        let instructions = remaining.iter().map(ToString::to_string).collect::<Vec<_>>();
        let regenerated = match prompts.repair_messages(&fixed, &instructions) {
            Ok(messages) => self.step.run(messages, false).await,
            Err(error) => Err(CompletionError::Configuration(error.to_string())),
        };

        let regeneration_error = match regenerated {
            Ok(text) => {
                let candidate = rules.local_fix(&clean_draft(&text));
                let still_failing = rules.check(&candidate);
                if still_failing.is_empty() {
                    return GuardOutcome {
                        text: candidate,
                        path: RepairPath::Regenerated,
                        issues,
                        regeneration_error: None,
                    };
                }
                CompletionError::Malformed(format!(
                    "regenerated reply still failed {} check(s)",
                    still_failing.len()
                ))
            }
            Err(error) => error,
        };

        warn!(
            event_name = "engine.repair.fallback",
            error = %regeneration_error,
            "repair exhausted; using safe reply"
        );
        GuardOutcome {
            text: safe_reply.to_string(),
            path: RepairPath::Fallback,
            issues,
            regeneration_error: Some(regeneration_error),
        }
    }
}
