//! Support agent: Analyze, Respond, Check and Repair over the support state machine.
//!
//! Shares the completion plumbing and reply guard with the qualification engine, but keeps
//! its own snapshot kind and never touches lead scoring.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use leadflow_core::domain::conversation::{SupportCategory, SupportPriority, SupportSnapshot};
use leadflow_core::domain::stage_data::contains_phrase;
use leadflow_core::domain::turn::TurnRole;
use leadflow_core::errors::DomainError;
use leadflow_core::flows::{FlowContext, FlowEngine, SupportEvent, SupportFlow, SupportState};
use leadflow_core::profile::AgentProfile;
use leadflow_core::store::SnapshotStore;

use crate::error::{validate_key, validate_message, EngineError};
use crate::guardrails::{RepairPath, ReplyGuard};
use crate::llm::{CompletionClient, CompletionError, CompletionStep};
use crate::locks::KeyedLocks;
use crate::planner::Sentiment;
use crate::prompts::{PromptRenderer, SupportAnalyzeBriefing, SupportRespondBriefing};
use crate::runtime::EngineSettings;
use crate::writer::clean_draft;

const ACTOR: &str = "support-agent";
const SUMMARY_MAX_CHARS: usize = 160;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStep {
    Analyze,
    Respond,
    Repair,
}

impl SupportStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Respond => "respond",
            Self::Repair => "repair",
        }
    }
}

/// Classification of one customer message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportAnalysis {
    pub category: SupportCategory,
    pub priority: SupportPriority,
    pub sentiment: Sentiment,
    pub resolved: bool,
    pub needs_clarification: bool,
    pub summary: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupportOutcome {
    pub conversation_key: String,
    pub correlation_id: String,
    pub reply: String,
    pub state: SupportState,
    pub category: SupportCategory,
    pub priority: SupportPriority,
    pub sentiment: Sentiment,
    pub issue_summary: Option<String>,
    pub turn_count: u32,
    pub escalated: bool,
    pub resolved: bool,
    pub repair: RepairPath,
    pub degraded: Vec<SupportStep>,
}

pub struct SupportAgent {
    profile: Arc<AgentProfile>,
    store: Arc<dyn SnapshotStore<SupportSnapshot>>,
    audit: Arc<dyn AuditSink>,
    prompts: PromptRenderer,
    analyze: CompletionStep,
    respond: CompletionStep,
    guard: ReplyGuard,
    flow: FlowEngine<SupportFlow>,
    locks: KeyedLocks,
    settings: EngineSettings,
}

impl SupportAgent {
    pub fn new(
        profile: Arc<AgentProfile>,
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn SnapshotStore<SupportSnapshot>>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        profile
            .validate()
            .map_err(|error| DomainError::InvariantViolation(error.to_string()))?;

        let models = &profile.models;
        let analyze_model =
            models.plan_model.clone().unwrap_or_else(|| settings.default_model.clone());
        let respond_model =
            models.write_model.clone().unwrap_or_else(|| settings.default_model.clone());
        let timeout = settings.completion_timeout;
        let analyze =
            CompletionStep::new(client.clone(), analyze_model, models.plan_temperature, timeout);
        let respond = CompletionStep::new(client, respond_model, models.write_temperature, timeout);

        Ok(Self {
            store,
            audit: Arc::new(TracingAuditSink),
            prompts: PromptRenderer::new()?,
            guard: ReplyGuard::new(respond.clone()),
            analyze,
            respond,
            flow: FlowEngine::default(),
            locks: KeyedLocks::default(),
            settings,
            profile,
        })
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub async fn process_turn(&self, key: &str, message: &str) -> Result<SupportOutcome, EngineError> {
        let key = validate_key(key)?;
        let message = validate_message(message)?;
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(Some(key.to_string()), correlation_id.clone(), ACTOR);

        let _guard = self.locks.acquire(key).await;
        let now = Utc::now();
        let mut snapshot = match self.store.load(key).await? {
            Some(snapshot) => snapshot,
            None => SupportSnapshot::new(key, self.settings.turn_window, now),
        };
        snapshot.turns.set_capacity(self.settings.turn_window);
        snapshot.turn_count += 1;
        snapshot.turns.push(TurnRole::User, message);

        let mut degraded = Vec::new();

        // Analyze
        let analysis = match self.run_analysis(&snapshot, message).await {
            Ok(analysis) => analysis,
            Err(error) => {
                warn!(
                    event_name = "support.analyze.fallback",
                    conversation_key = key,
                    error = %error,
                    "analyze step degraded to keyword triage"
                );
                degraded.push(SupportStep::Analyze);
                keyword_analysis(message)
            }
        };
        if analysis.category != SupportCategory::General || snapshot.category == SupportCategory::General {
            snapshot.category = analysis.category;
        }
        snapshot.priority = snapshot.priority.max(analysis.priority);
        if let Some(summary) = analysis.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            snapshot.issue_summary = Some(summary.to_string());
        }

        self.advance_state(&mut snapshot, &analysis, &audit)?;

        // Respond
        let goal = reply_goal(snapshot.state);
        let safe_reply = safe_reply(snapshot.state);
        let draft = match self.run_respond(&snapshot, goal).await {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    event_name = "support.respond.fallback",
                    conversation_key = key,
                    state = snapshot.state.as_str(),
                    error = %error,
                    "respond step degraded to canned reply"
                );
                degraded.push(SupportStep::Respond);
                safe_reply.to_string()
            }
        };

        // Check and Repair
        let review =
            self.guard.review(&self.profile.support.style, &self.prompts, &draft, safe_reply).await;
        if review.degraded() {
            degraded.push(SupportStep::Repair);
        }

        if snapshot.state == SupportState::Resolving {
            self.transition(&mut snapshot, SupportEvent::SolutionOffered, &audit)?;
        }
        snapshot.turns.push(TurnRole::Assistant, review.text.clone());
        snapshot.updated_at = now;

        let outcome = SupportOutcome {
            conversation_key: key.to_string(),
            correlation_id,
            reply: review.text,
            state: snapshot.state,
            category: snapshot.category,
            priority: snapshot.priority,
            sentiment: analysis.sentiment,
            issue_summary: snapshot.issue_summary.clone(),
            turn_count: snapshot.turn_count,
            escalated: snapshot.escalated,
            resolved: snapshot.resolved,
            repair: review.path,
            degraded,
        };

        self.store.save(key, &snapshot).await?;

        for step in &outcome.degraded {
            self.audit.emit(
                AuditEvent::from_context(
                    &audit,
                    "completion.step_degraded",
                    AuditCategory::Completion,
                    AuditOutcome::Degraded,
                )
                .with_metadata("step", step.as_str()),
            );
        }
        info!(
            event_name = "support.turn.completed",
            conversation_key = key,
            correlation_id = %outcome.correlation_id,
            state = outcome.state.as_str(),
            turn_count = outcome.turn_count,
            escalated = outcome.escalated,
            degraded_steps = outcome.degraded.len(),
            "support turn processed"
        );
        Ok(outcome)
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<SupportSnapshot>, EngineError> {
        let key = validate_key(key)?;
        Ok(self.store.load(key).await?)
    }

    /// Escalation wins over normal progress; a resolved escalation still closes.
    pub fn should_escalate(&self, snapshot: &SupportSnapshot, analysis: &SupportAnalysis) -> bool {
        snapshot.escalated
            || analysis.priority == SupportPriority::Urgent
            || snapshot.category == SupportCategory::Cancellation
            || (snapshot.turn_count >= self.profile.support.escalation_turns && !analysis.resolved)
    }

    fn advance_state(
        &self,
        snapshot: &mut SupportSnapshot,
        analysis: &SupportAnalysis,
        audit: &AuditContext,
    ) -> Result<(), DomainError> {
        if matches!(snapshot.state, SupportState::Greeting | SupportState::Closing) {
            snapshot.resolved = false;
            self.transition(snapshot, SupportEvent::CustomerMessage, audit)?;
        }

        if snapshot.state == SupportState::Escalating && analysis.resolved {
            snapshot.resolved = true;
            return self.transition(snapshot, SupportEvent::ResolutionConfirmed, audit);
        }

        if self.should_escalate(snapshot, analysis) {
            let first_time = !snapshot.escalated;
            snapshot.escalated = true;
            self.transition(snapshot, SupportEvent::EscalationRequired, audit)?;
            if first_time {
                info!(
                    event_name = "support.escalated",
                    conversation_key = snapshot.key.as_str(),
                    category = ?snapshot.category,
                    priority = ?snapshot.priority,
                    turn_count = snapshot.turn_count,
                    "conversation handed to a human"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        audit,
                        "support.escalated",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("turn_count", snapshot.turn_count.to_string()),
                );
            }
            return Ok(());
        }

        let event = match snapshot.state {
            SupportState::IdentifyingIssue | SupportState::Clarifying | SupportState::Resolving
                if analysis.needs_clarification =>
            {
                Some(SupportEvent::IssueUnclear)
            }
            SupportState::IdentifyingIssue | SupportState::Clarifying => {
                Some(SupportEvent::IssueIdentified)
            }
            SupportState::Confirming if analysis.resolved => {
                snapshot.resolved = true;
                Some(SupportEvent::ResolutionConfirmed)
            }
            SupportState::Confirming => Some(SupportEvent::IssueReopened),
            _ => None,
        };
        match event {
            Some(event) => self.transition(snapshot, event, audit),
            None => Ok(()),
        }
    }

    fn transition(
        &self,
        snapshot: &mut SupportSnapshot,
        event: SupportEvent,
        audit: &AuditContext,
    ) -> Result<(), DomainError> {
        let outcome = self
            .flow
            .apply_with_audit(&snapshot.state, &event, &FlowContext::default(), self.audit.as_ref(), audit)
            .map_err(DomainError::from)?;
        snapshot.state = outcome.to;
        Ok(())
    }

    async fn run_analysis(
        &self,
        snapshot: &SupportSnapshot,
        message: &str,
    ) -> Result<SupportAnalysis, CompletionError> {
        let category = category_label(snapshot.category);
        let priority = priority_label(snapshot.priority);
        let briefing = SupportAnalyzeBriefing {
            business: &self.profile.business,
            state: snapshot.state.as_str(),
            category,
            priority,
            summary: snapshot.issue_summary.as_deref(),
            history: snapshot.turns.iter().collect(),
            message,
        };
        let messages = self
            .prompts
            .support_analyze_messages(&briefing)
            .map_err(|error| CompletionError::Configuration(error.to_string()))?;
        let raw = self.analyze.run(messages, true).await?;
        parse_analysis(&raw)
    }

    async fn run_respond(
        &self,
        snapshot: &SupportSnapshot,
        goal: &str,
    ) -> Result<String, CompletionError> {
        let briefing = SupportRespondBriefing {
            business: &self.profile.business,
            state: snapshot.state.as_str(),
            category: category_label(snapshot.category),
            summary: snapshot.issue_summary.as_deref(),
            goal,
            max_chars: self.profile.support.style.max_chars,
            history: snapshot.turns.iter().collect(),
        };
        let messages = self
            .prompts
            .support_respond_messages(&briefing)
            .map_err(|error| CompletionError::Configuration(error.to_string()))?;
        let text = clean_draft(&self.respond.run(messages, false).await?);
        if text.is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(text)
    }
}

pub fn parse_analysis(raw: &str) -> Result<SupportAnalysis, CompletionError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let slice = match (start, end) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => return Err(CompletionError::Malformed("analysis contained no JSON object".to_string())),
    };
    serde_json::from_str(slice).map_err(|error| CompletionError::Malformed(error.to_string()))
}

const CANCELLATION_CUES: &[&str] =
    &["cancel", "cancellation", "unsubscribe", "close my account", "terminate", "stop my subscription"];
const BILLING_CUES: &[&str] =
    &["invoice", "charged", "charge", "refund", "payment", "billing", "bill", "receipt"];
const TECHNICAL_CUES: &[&str] =
    &["error", "bug", "crash", "crashes", "not working", "broken", "doesn't work", "won't load"];
const ACCOUNT_CUES: &[&str] =
    &["password", "log in", "login", "account", "username", "two factor", "locked out"];
const URGENT_CUES: &[&str] = &["urgent", "asap", "emergency", "immediately", "right now"];
const HIGH_CUES: &[&str] = &["again", "still", "days", "frustrated", "angry"];
const LOW_CUES: &[&str] = &["no rush", "whenever", "when you get a chance"];
const NEGATIVE_CUES: &[&str] =
    &["frustrated", "angry", "terrible", "annoyed", "ridiculous", "awful", "unacceptable"];
const POSITIVE_CUES: &[&str] = &["thanks", "thank you", "great", "perfect", "awesome"];
const RESOLVED_CUES: &[&str] = &[
    "that worked",
    "works now",
    "working now",
    "all good",
    "fixed",
    "solved",
    "resolved",
    "sorted",
];

/// Deterministic triage used when the Analyze completion is unavailable.
pub fn keyword_analysis(message: &str) -> SupportAnalysis {
    let lowered = message.to_lowercase().replace('’', "'");
    let has = |cues: &[&str]| cues.iter().any(|cue| contains_phrase(&lowered, cue));

    let category = if has(CANCELLATION_CUES) {
        SupportCategory::Cancellation
    } else if has(BILLING_CUES) {
        SupportCategory::Billing
    } else if has(TECHNICAL_CUES) {
        SupportCategory::Technical
    } else if has(ACCOUNT_CUES) {
        SupportCategory::Account
    } else {
        SupportCategory::General
    };
    let priority = if has(URGENT_CUES) {
        SupportPriority::Urgent
    } else if has(HIGH_CUES) {
        SupportPriority::High
    } else if has(LOW_CUES) {
        SupportPriority::Low
    } else {
        SupportPriority::Normal
    };
    let sentiment = if has(NEGATIVE_CUES) {
        Sentiment::Negative
    } else if has(POSITIVE_CUES) {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    };
    let resolved = has(RESOLVED_CUES);
    let summary = (category != SupportCategory::General)
        .then(|| message.trim().chars().take(SUMMARY_MAX_CHARS).collect::<String>());

    SupportAnalysis {
        category,
        priority,
        sentiment,
        resolved,
        needs_clarification: category == SupportCategory::General && !resolved,
        summary,
    }
}

fn reply_goal(state: SupportState) -> &'static str {
    match state {
        SupportState::Greeting => "greet the customer and ask how you can help",
        SupportState::IdentifyingIssue | SupportState::Clarifying => {
            "ask one specific question that pins down the issue"
        }
        SupportState::Resolving => "propose one concrete next step that solves the issue",
        SupportState::Confirming => "check whether the proposed fix worked",
        SupportState::Escalating => {
            "tell the customer a teammate is taking over and what happens next"
        }
        SupportState::Closing => "thank the customer and close warmly",
    }
}

/// Canned replies that pass the default support checks.
pub fn safe_reply(state: SupportState) -> &'static str {
    match state {
        SupportState::Greeting | SupportState::IdentifyingIssue => {
            "Thanks for reaching out. Could you tell me what is going wrong and when it started?"
        }
        SupportState::Clarifying => {
            "I want to get this right for you. Could you share a few more details, like any error message you see?"
        }
        SupportState::Resolving => {
            "Thanks for the details. I'm looking into this now and will walk you through the fix step by step."
        }
        SupportState::Confirming => "Could you check whether that solved it on your side?",
        SupportState::Escalating => {
            "I'm handing this to a teammate who can take it from here. They will follow up with you shortly."
        }
        SupportState::Closing => "Glad that is sorted. Thanks for your patience, and reach out anytime.",
    }
}

fn category_label(category: SupportCategory) -> &'static str {
    match category {
        SupportCategory::Billing => "billing",
        SupportCategory::Technical => "technical",
        SupportCategory::Account => "account",
        SupportCategory::Cancellation => "cancellation",
        SupportCategory::General => "general",
    }
}

fn priority_label(priority: SupportPriority) -> &'static str {
    match priority {
        SupportPriority::Low => "low",
        SupportPriority::Normal => "normal",
        SupportPriority::High => "high",
        SupportPriority::Urgent => "urgent",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use leadflow_core::audit::InMemoryAuditSink;
    use leadflow_core::domain::conversation::{SupportCategory, SupportPriority, SupportSnapshot};
    use leadflow_core::flows::SupportState;
    use leadflow_core::profile::AgentProfile;
    use leadflow_core::style::SupportStyleRules;
    use leadflow_db::InMemorySnapshotStore;

    use super::{keyword_analysis, parse_analysis, safe_reply, SupportAgent, SupportStep};
    use crate::guardrails::RepairPath;
    use crate::llm::CompletionClient;
    use crate::planner::Sentiment;
    use crate::runtime::EngineSettings;
    use crate::scripted::{OfflineCompletionClient, ScriptedCompletionClient};

    fn settings() -> EngineSettings {
        EngineSettings { completion_timeout: Duration::from_millis(500), ..EngineSettings::default() }
    }

    fn agent(
        client: Arc<dyn CompletionClient>,
        store: Arc<InMemorySnapshotStore<SupportSnapshot>>,
    ) -> SupportAgent {
        SupportAgent::new(Arc::new(AgentProfile::default()), client, store, settings())
            .expect("default profile is valid")
    }

    #[test]
    fn keyword_triage_prefers_cancellation_over_billing() {
        let analysis = keyword_analysis("I want to cancel, you charged me twice");
        assert_eq!(analysis.category, SupportCategory::Cancellation);
        assert!(!analysis.needs_clarification);
        assert!(analysis.summary.is_some());

        let vague = keyword_analysis("hello there");
        assert_eq!(vague.category, SupportCategory::General);
        assert!(vague.needs_clarification);
        assert_eq!(vague.summary, None);

        let urgent = keyword_analysis("Login is broken and I need it fixed ASAP, this is terrible");
        assert_eq!(urgent.priority, SupportPriority::Urgent);
        assert_eq!(urgent.sentiment, Sentiment::Negative);
    }

    #[test]
    fn analysis_parses_model_json() {
        let analysis = parse_analysis(
            r#"Sure: {"category":"billing","priority":"high","sentiment":"negative","resolved":false,"needs_clarification":false,"summary":"Double charge on March invoice"}"#,
        )
        .expect("valid analysis");
        assert_eq!(analysis.category, SupportCategory::Billing);
        assert_eq!(analysis.priority, SupportPriority::High);
        assert_eq!(analysis.summary.as_deref(), Some("Double charge on March invoice"));

        assert!(parse_analysis("no json").is_err());
        assert!(parse_analysis(r#"{"category":"sales"}"#).is_err());
    }

    #[test]
    fn canned_replies_pass_default_checks() {
        let rules = SupportStyleRules::default();
        for state in [
            SupportState::Greeting,
            SupportState::IdentifyingIssue,
            SupportState::Clarifying,
            SupportState::Resolving,
            SupportState::Escalating,
            SupportState::Confirming,
            SupportState::Closing,
        ] {
            assert!(rules.check(safe_reply(state)).is_empty(), "{state} reply fails checks");
        }
    }

    #[tokio::test]
    async fn scripted_conversation_runs_to_closing() {
        let client = Arc::new(ScriptedCompletionClient::new([
            Ok(r#"{"category":"billing","priority":"normal","sentiment":"negative","resolved":false,"needs_clarification":false,"summary":"Charged twice in March"}"#.to_string()),
            Ok("I'm sorry about the double charge. I've flagged the second payment for a refund within three days.".to_string()),
            Ok(r#"{"category":"billing","priority":"normal","sentiment":"positive","resolved":true,"needs_clarification":false}"#.to_string()),
            Ok("Happy to help. Thanks for your patience with this!".to_string()),
        ]));
        let store = Arc::new(InMemorySnapshotStore::default());
        let agent = agent(client.clone(), store.clone());

        let first = agent.process_turn("chat-9", "You charged me twice in March").await.expect("turn");
        assert_eq!(first.state, SupportState::Confirming);
        assert_eq!(first.category, SupportCategory::Billing);
        assert_eq!(first.repair, RepairPath::Clean);
        assert!(first.degraded.is_empty());

        let second = agent.process_turn("chat-9", "Refund arrived, that worked").await.expect("turn");
        assert_eq!(second.state, SupportState::Closing);
        assert!(second.resolved);
        assert_eq!(second.issue_summary.as_deref(), Some("Charged twice in March"));
        assert_eq!(client.call_count(), 4);

        let stored = agent.get_state("chat-9").await.expect("load").expect("stored");
        assert_eq!(stored.turn_count, 2);
        assert_eq!(stored.turns.len(), 4);
    }

    #[tokio::test]
    async fn offline_client_degrades_to_keyword_triage_and_canned_reply() {
        let store = Arc::new(InMemorySnapshotStore::default());
        let agent = agent(Arc::new(OfflineCompletionClient), store);

        let outcome = agent.process_turn("chat-1", "hi").await.expect("turn");

        assert_eq!(outcome.state, SupportState::Clarifying);
        assert_eq!(outcome.reply, safe_reply(SupportState::Clarifying));
        assert_eq!(outcome.degraded, vec![SupportStep::Analyze, SupportStep::Respond]);
    }

    #[tokio::test]
    async fn cancellation_escalates_once_and_audits() {
        let store = Arc::new(InMemorySnapshotStore::default());
        let sink = Arc::new(InMemoryAuditSink::default());
        let agent = agent(Arc::new(OfflineCompletionClient), store).with_audit_sink(sink.clone());

        let first = agent.process_turn("chat-2", "Please cancel my subscription").await.expect("turn");
        assert_eq!(first.state, SupportState::Escalating);
        assert!(first.escalated);
        assert_eq!(first.reply, safe_reply(SupportState::Escalating));

        let second = agent.process_turn("chat-2", "Any update?").await.expect("turn");
        assert_eq!(second.state, SupportState::Escalating);

        let escalations = sink
            .events()
            .into_iter()
            .filter(|event| event.event_type == "support.escalated")
            .count();
        assert_eq!(escalations, 1);
    }

    #[tokio::test]
    async fn long_unresolved_conversation_escalates_at_turn_limit() {
        let store = Arc::new(InMemorySnapshotStore::default());
        let agent = agent(Arc::new(OfflineCompletionClient), store);
        let limit = AgentProfile::default().support.escalation_turns;

        let mut last = None;
        for _ in 0..limit {
            last = Some(agent.process_turn("chat-3", "the export is broken").await.expect("turn"));
        }
        let last = last.expect("at least one turn");
        assert_eq!(last.turn_count, limit);
        assert!(last.escalated);
        assert_eq!(last.state, SupportState::Escalating);
    }

    #[tokio::test]
    async fn rejects_empty_message() {
        let store = Arc::new(InMemorySnapshotStore::default());
        let agent = agent(Arc::new(OfflineCompletionClient), store.clone());

        assert!(agent.process_turn("chat-4", "   ").await.is_err());
        assert!(store.is_empty().await);
    }
}
