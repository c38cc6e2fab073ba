//! Qualification engine: runs one Plan, Extract, Write, Check and Repair turn per inbound
//! message and commits the resulting snapshot in a single save.
//!
//! Turns for the same conversation key are serialized through [`KeyedLocks`]; distinct keys
//! run fully in parallel. A turn mutates a private copy of the snapshot, so a turn that is
//! abandoned before the final save leaves the stored state untouched.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_core::archetype::{Archetype, ArchetypeClassifier};
use leadflow_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use leadflow_core::config::AppConfig;
use leadflow_core::domain::bant::BantSnapshot;
use leadflow_core::domain::conversation::ConversationSnapshot;
use leadflow_core::domain::lead::Lead;
use leadflow_core::domain::stage::SalesStage;
use leadflow_core::domain::stage_data::StageData;
use leadflow_core::domain::turn::TurnRole;
use leadflow_core::errors::DomainError;
use leadflow_core::flows::{FlowContext, FlowEngine, PhaseAction, PhaseEvent, SpinFlow, SpinPhase};
use leadflow_core::profile::{AgentProfile, PhaseConfig};
use leadflow_core::qualification::policy::METADATA_DISQUALIFY_REASON;
use leadflow_core::qualification::{
    process_and_advance, process_stage, ready_for_handoff, reevaluate_lead, snapshot_progress,
    DisqualifyAdvice, QualificationPolicy, RiskAssessment,
};
use leadflow_core::store::SnapshotStore;

use crate::conversation::SignalExtractor;
use crate::error::{validate_key, validate_message, EngineError};
use crate::guardrails::{RepairPath, ReplyGuard};
use crate::llm::{CompletionClient, CompletionStep};
use crate::locks::KeyedLocks;
use crate::planner::{Planner, TurnPlan};
use crate::prompts::{PlanBriefing, PromptRenderer, WriteBriefing};
use crate::writer::Writer;

const ACTOR: &str = "qualification-engine";

#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub turn_window: usize,
    pub inactivity_days: u32,
    pub completion_timeout: Duration,
    pub default_model: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            turn_window: 20,
            inactivity_days: 14,
            completion_timeout: Duration::from_secs(20),
            default_model: "llama3.1".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            turn_window: config.engine.turn_window,
            inactivity_days: config.engine.inactivity_days,
            completion_timeout: Duration::from_secs(config.engine.completion_timeout_secs),
            default_model: config.llm.model.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Plan,
    Write,
    Repair,
}

impl PipelineStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Write => "write",
            Self::Repair => "repair",
        }
    }
}

/// Result of one processed turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    pub conversation_key: String,
    pub correlation_id: String,
    pub reply: String,
    pub phase: SpinPhase,
    pub stage: SalesStage,
    pub score: u8,
    pub progress: u8,
    pub bant: BantSnapshot,
    pub archetype: Archetype,
    pub ready_for_handoff: bool,
    pub advanced_to: Option<SpinPhase>,
    pub advance_refusal: Option<String>,
    pub extracted_fields: Vec<String>,
    pub objection: Option<String>,
    pub regression_signals: Vec<String>,
    pub can_qualify: bool,
    pub disqualify_advice: DisqualifyAdvice,
    pub risk: RiskAssessment,
    pub repair: RepairPath,
    pub degraded: Vec<PipelineStep>,
}

impl TurnOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

struct Advancement {
    advanced_to: Option<SpinPhase>,
    refusal: Option<String>,
}

pub struct QualificationEngine {
    profile: Arc<AgentProfile>,
    store: Arc<dyn SnapshotStore<ConversationSnapshot>>,
    audit: Arc<dyn AuditSink>,
    prompts: PromptRenderer,
    planner: Planner,
    writer: Writer,
    guard: ReplyGuard,
    extractor: SignalExtractor,
    classifier: ArchetypeClassifier,
    policy: QualificationPolicy,
    flow: FlowEngine<SpinFlow>,
    locks: KeyedLocks,
    settings: EngineSettings,
}

impl QualificationEngine {
    pub fn new(
        profile: Arc<AgentProfile>,
        client: Arc<dyn CompletionClient>,
        store: Arc<dyn SnapshotStore<ConversationSnapshot>>,
        settings: EngineSettings,
    ) -> Result<Self, EngineError> {
        profile
            .validate()
            .map_err(|error| DomainError::InvariantViolation(error.to_string()))?;

        let models = &profile.models;
        let plan_model = models.plan_model.clone().unwrap_or_else(|| settings.default_model.clone());
        let write_model =
            models.write_model.clone().unwrap_or_else(|| settings.default_model.clone());
        let timeout = settings.completion_timeout;
        let plan_step =
            CompletionStep::new(client.clone(), plan_model, models.plan_temperature, timeout);
        let write_step = CompletionStep::new(client, write_model, models.write_temperature, timeout);

        Ok(Self {
            store,
            audit: Arc::new(TracingAuditSink),
            prompts: PromptRenderer::new()?,
            planner: Planner::new(plan_step),
            writer: Writer::new(write_step.clone()),
            guard: ReplyGuard::new(write_step),
            extractor: SignalExtractor::new(),
            classifier: ArchetypeClassifier,
            policy: QualificationPolicy::new(settings.inactivity_days),
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

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Processes one inbound message for `key` and returns the reply plus the updated view.
    pub async fn process_turn(&self, key: &str, message: &str) -> Result<TurnOutcome, EngineError> {
        let key = validate_key(key)?;
        let message = validate_message(message)?;
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(Some(key.to_string()), correlation_id.clone(), ACTOR);

        let _guard = self.locks.acquire(key).await;
        let now = Utc::now();
        let mut snapshot = match self.store.load(key).await? {
            Some(snapshot) => snapshot,
            None => ConversationSnapshot::new(key, self.settings.turn_window, now),
        };
        snapshot.turns.set_capacity(self.settings.turn_window);
        snapshot.lead.record_interaction(now);
        snapshot.turns.push(TurnRole::User, message);

        let selection = self.classifier.classify(message, snapshot.archetype);
        snapshot.archetype = selection.archetype;
        let archetype = snapshot.archetype.profile();

        let mut degraded = Vec::new();

        // Plan
        let bant_before = BantSnapshot::build(&self.profile.bant_fields, &snapshot.bant);
        let phase_before = self.phase_config(snapshot.phase)?;
        let plan_outcome = {
            let briefing = PlanBriefing {
                business: &self.profile.business,
                phase: phase_before,
                outstanding: bant_before.missing_for_phase(snapshot.phase),
                collected: bant_before.fields.iter().filter(|field| field.collected()).collect(),
                field_keys: self.profile.bant_fields.iter().map(|field| field.key.as_str()).collect(),
                objection_categories: self
                    .profile
                    .objections
                    .iter()
                    .map(|objection| objection.category.as_str())
                    .collect(),
                archetype: &archetype,
                history: snapshot.turns.iter().collect(),
                message,
            };
            self.planner.plan(&self.prompts, &briefing, &phase_before.fallback_question).await
        };
        if plan_outcome.is_fallback() {
            degraded.push(PipelineStep::Plan);
        }
        let plan = plan_outcome.into_plan();

        // Extract
        let mut extracted_fields = snapshot.bant.merge(&plan.extracted);
        let signals = self.extractor.extract(message);
        extracted_fields.extend(snapshot.bant.fill_missing(signals.pairs()));

        let regression_signals = phase_before.matched_regression_signals(message);
        if !regression_signals.is_empty() {
            info!(
                event_name = "engine.phase.regression_signal",
                conversation_key = key,
                phase = snapshot.phase.as_str(),
                signals = ?regression_signals,
                "regression signals detected; phase held"
            );
        }

        // Score and advance
        let advancement = self.score_and_advance(&mut snapshot, plan.should_advance, now, &audit)?;

        let objection = plan
            .objection
            .as_deref()
            .and_then(|category| self.profile.find_objection(category))
            .or_else(|| self.profile.detect_objection(message));

        // Write
        let phase_config = self.phase_config(snapshot.phase)?;
        let bant = BantSnapshot::build(&self.profile.bant_fields, &snapshot.bant);
        let safe_question = self.safe_question(&plan, phase_config);
        let draft = {
            let avoid = archetype
                .avoid
                .iter()
                .chain(plan.instructions.avoid.iter())
                .map(String::as_str)
                .collect();
            let briefing = WriteBriefing {
                business: &self.profile.business,
                phase: phase_config,
                archetype: &archetype,
                avoid,
                instructions: &plan.instructions,
                objection,
                target_field: bant.next_missing(snapshot.phase),
                max_lines: self.profile.style.max_lines,
                banned_openers: &self.profile.style.banned_openers,
                banned_phrases: &self.profile.style.banned_phrases,
                history: snapshot.turns.iter().collect(),
            };
            self.writer.draft(&self.prompts, &briefing, &safe_question).await
        };
        if draft.is_fallback() {
            degraded.push(PipelineStep::Write);
        }

        // Check and Repair
        let review = self
            .guard
            .review(&self.profile.style, &self.prompts, draft.text(), &phase_config.fallback_question)
            .await;
        if review.degraded() {
            degraded.push(PipelineStep::Repair);
        }

        snapshot.turns.push(TurnRole::Assistant, review.text.clone());
        snapshot.updated_at = now;

        let progress = snapshot_progress(&bant, snapshot.phase);
        let outcome = TurnOutcome {
            conversation_key: key.to_string(),
            correlation_id,
            reply: review.text,
            phase: snapshot.phase,
            stage: snapshot.lead.stage,
            score: snapshot.lead.score.value(),
            progress,
            ready_for_handoff: ready_for_handoff(snapshot.phase, progress),
            bant,
            archetype: snapshot.archetype,
            advanced_to: advancement.advanced_to,
            advance_refusal: advancement.refusal,
            extracted_fields,
            objection: objection.map(|reframe| reframe.category.clone()),
            regression_signals,
            can_qualify: self.policy.can_qualify(&snapshot.lead),
            disqualify_advice: self.policy.should_disqualify(&snapshot.lead, now),
            risk: self.policy.risk(&snapshot.lead, now),
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
            event_name = "engine.turn.completed",
            conversation_key = key,
            correlation_id = %outcome.correlation_id,
            phase = outcome.phase.as_str(),
            stage = outcome.stage.as_str(),
            score = outcome.score,
            progress = outcome.progress,
            archetype = outcome.archetype.as_str(),
            degraded_steps = outcome.degraded.len(),
            "turn processed"
        );
        Ok(outcome)
    }

    /// Serializable snapshot for `key`, if one was stored.
    pub async fn get_state(&self, key: &str) -> Result<Option<ConversationSnapshot>, EngineError> {
        let key = validate_key(key)?;
        Ok(self.store.load(key).await?)
    }

    /// Replaces the stored state for `key`. The snapshot is re-keyed and checked for consistency:
    /// stage records are re-derived from their data, so completion flags and score deltas in the
    /// payload are never trusted.
    pub async fn restore_state(
        &self,
        key: &str,
        mut snapshot: ConversationSnapshot,
    ) -> Result<ConversationSnapshot, EngineError> {
        let key = validate_key(key)?;
        if let Some(expected) = SpinPhase::from_stage(snapshot.lead.stage) {
            if expected != snapshot.phase {
                return Err(DomainError::InvariantViolation(format!(
                    "phase `{}` does not match lead stage `{}`",
                    snapshot.phase, snapshot.lead.stage
                ))
                .into());
            }
        }

        reevaluate_lead(&self.profile.scoring, &mut snapshot.lead)?;
        self.policy.verify_terminal(&snapshot.lead)?;

        let _guard = self.locks.acquire(key).await;
        snapshot.key = key.to_string();
        snapshot.lead.id.0 = key.to_string();
        snapshot.turns.set_capacity(self.settings.turn_window);
        self.store.save(key, &snapshot).await?;

        info!(event_name = "engine.state.restored", conversation_key = key, "conversation restored");
        Ok(snapshot)
    }

    /// Moves the lead to `qualified` when the policy allows it.
    pub async fn qualify(&self, key: &str) -> Result<Lead, EngineError> {
        let key = validate_key(key)?;
        let audit = AuditContext::new(Some(key.to_string()), Uuid::new_v4().to_string(), ACTOR);
        let _guard = self.locks.acquire(key).await;
        let mut snapshot = self.load_existing(key).await?;
        let now = Utc::now();

        if let Err(error) = self.policy.qualify(&mut snapshot.lead, now) {
            info!(
                event_name = "qualification.rejected",
                conversation_key = key,
                error = %error,
                "qualification refused"
            );
            self.audit.emit(
                AuditEvent::from_context(
                    &audit,
                    "qualification.rejected",
                    AuditCategory::Qualification,
                    AuditOutcome::Rejected,
                )
                .with_metadata("reason", error.to_string()),
            );
            return Err(error.into());
        }

        snapshot.updated_at = now;
        self.store.save(key, &snapshot).await?;
        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                "qualification.qualified",
                AuditCategory::Qualification,
                AuditOutcome::Success,
            )
            .with_metadata("score", snapshot.lead.score.value().to_string()),
        );
        info!(event_name = "qualification.qualified", conversation_key = key, "lead qualified");
        Ok(snapshot.lead)
    }

    /// Moves the lead to `disqualified`, recording `reason`.
    pub async fn disqualify(&self, key: &str, reason: &str) -> Result<Lead, EngineError> {
        let key = validate_key(key)?;
        let audit = AuditContext::new(Some(key.to_string()), Uuid::new_v4().to_string(), ACTOR);
        let _guard = self.locks.acquire(key).await;
        let mut snapshot = self.load_existing(key).await?;
        let now = Utc::now();

        self.policy.disqualify(&mut snapshot.lead, reason, now)?;
        snapshot.updated_at = now;
        self.store.save(key, &snapshot).await?;

        let recorded_reason = snapshot
            .lead
            .metadata
            .get(METADATA_DISQUALIFY_REASON)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.audit.emit(
            AuditEvent::from_context(
                &audit,
                "qualification.disqualified",
                AuditCategory::Qualification,
                AuditOutcome::Success,
            )
            .with_metadata("reason", recorded_reason),
        );
        info!(event_name = "qualification.disqualified", conversation_key = key, "lead disqualified");
        Ok(snapshot.lead)
    }

    async fn load_existing(&self, key: &str) -> Result<ConversationSnapshot, EngineError> {
        self.store
            .load(key)
            .await?
            .ok_or_else(|| EngineError::UnknownConversation(key.to_string()))
    }

    fn phase_config(&self, phase: SpinPhase) -> Result<&PhaseConfig, DomainError> {
        self.profile
            .phase(phase)
            .ok_or_else(|| DomainError::InvariantViolation(format!("phase `{phase}` not configured")))
    }

    /// The planner's question when it passes the style check, else the phase fallback.
    fn safe_question(&self, plan: &TurnPlan, phase: &PhaseConfig) -> String {
        let question = plan.instructions.question.trim();
        if !question.is_empty() && self.profile.style.is_valid(question) {
            question.to_string()
        } else {
            phase.fallback_question.clone()
        }
    }

    /// Re-evaluates every stage up to the current one from collected answers, then asks the
    /// phase machine to advance when the planner requested it.
    fn score_and_advance(
        &self,
        snapshot: &mut ConversationSnapshot,
        should_advance: bool,
        now: DateTime<Utc>,
        audit: &AuditContext,
    ) -> Result<Advancement, DomainError> {
        let rules = &self.profile.scoring;
        let lead = &mut snapshot.lead;
        let Some(current_ordinal) = lead.stage.ordinal() else {
            return Ok(Advancement { advanced_to: None, refusal: None });
        };

        for stage in SalesStage::ORDINAL.iter().take(current_ordinal as usize) {
            process_stage(rules, lead, StageData::from_bant(*stage, &snapshot.bant)?, now)?;
        }

        let current = StageData::from_bant(lead.stage, &snapshot.bant)?;
        let outcome = process_and_advance(rules, lead, current, should_advance, now)?;

        if let Some(refusal) = outcome.refusal {
            info!(
                event_name = "engine.stage.advance_refused",
                conversation_key = snapshot.key.as_str(),
                stage = lead.stage.as_str(),
                reason = %refusal,
                "advance requested but refused"
            );
            self.audit.emit(
                AuditEvent::from_context(
                    audit,
                    "qualification.advance_refused",
                    AuditCategory::Qualification,
                    AuditOutcome::Rejected,
                )
                .with_metadata("stage", lead.stage.as_str())
                .with_metadata("reason", refusal.to_string()),
            );
            return Ok(Advancement { advanced_to: None, refusal: Some(refusal.to_string()) });
        }

        let Some(next_stage) = outcome.advanced_to else {
            return Ok(Advancement { advanced_to: None, refusal: None });
        };

        let context = FlowContext { missing_required_fields: outcome.evaluation.missing_fields };
        let transition = self
            .flow
            .apply_with_audit(&snapshot.phase, &PhaseEvent::Advance, &context, self.audit.as_ref(), audit)
            .map_err(DomainError::from)?;
        snapshot.phase = transition.to;

        if SpinPhase::from_stage(next_stage) != Some(snapshot.phase) {
            warn!(
                event_name = "engine.phase.stage_mismatch",
                conversation_key = snapshot.key.as_str(),
                phase = snapshot.phase.as_str(),
                stage = next_stage.as_str(),
                "phase and stage diverged after advance"
            );
        }
        if transition.actions.contains(&PhaseAction::OfferHandoff) {
            info!(
                event_name = "engine.phase.handoff_offered",
                conversation_key = snapshot.key.as_str(),
                "closing phase reached"
            );
        }

        // answers collected ahead of time count toward the new stage right away
        process_stage(rules, lead, StageData::from_bant(next_stage, &snapshot.bant)?, now)?;
        Ok(Advancement { advanced_to: Some(snapshot.phase), refusal: None })
    }
}
