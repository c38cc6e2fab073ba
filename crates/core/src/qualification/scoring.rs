//! Per-stage scoring rules.
//!
//! Every ordinal stage maps its typed data to a completion flag and a signed score delta.
//! Evaluation is pure: the same data always yields the same outcome, and the caller stores the
//! result keyed by stage so repeated evaluations replace each other.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::lead::{Lead, StageRecord};
use crate::domain::stage::SalesStage;
use crate::domain::stage_data::{
    AuthorityData, AuthorityLevel, BudgetData, BudgetStatus, DiscoveryData, NeedData, NeedFit,
    StageData, TimelineData, TimelineHorizon, Urgency,
};
use crate::errors::DomainError;

pub const PAIN_IDENTIFIED_POINTS: i64 = 15;
pub const CRITICAL_URGENCY_BONUS: i64 = 10;
pub const LOW_URGENCY_PENALTY: i64 = -5;
pub const BUDGET_CONFIRMED_POINTS: i64 = 20;
pub const BUDGET_ESTIMATED_POINTS: i64 = 10;
pub const NO_BUDGET_PENALTY: i64 = -15;
pub const DECISION_MAKER_POINTS: i64 = 25;
pub const INFLUENCER_POINTS: i64 = 12;
pub const TECHNICAL_AUTHORITY_POINTS: i64 = 8;
pub const NO_AUTHORITY_PENALTY: i64 = -15;
pub const STRONG_NEED_POINTS: i64 = 20;
pub const PARTIAL_NEED_POINTS: i64 = 10;
pub const WEAK_NEED_PENALTY: i64 = -5;
pub const IMMEDIATE_TIMELINE_POINTS: i64 = 20;
pub const QUARTER_TIMELINE_POINTS: i64 = 15;
pub const YEAR_TIMELINE_POINTS: i64 = 5;
pub const NO_TIMELINE_PENALTY: i64 = -10;

/// Point table used by [`ScoringRules::evaluate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub pain_identified: i64,
    pub critical_urgency_bonus: i64,
    pub low_urgency_penalty: i64,
    pub budget_confirmed: i64,
    pub budget_estimated: i64,
    pub no_budget: i64,
    pub decision_maker: i64,
    pub influencer: i64,
    pub technical: i64,
    pub no_authority: i64,
    pub strong_need: i64,
    pub partial_need: i64,
    pub weak_need: i64,
    pub immediate_timeline: i64,
    pub quarter_timeline: i64,
    pub year_timeline: i64,
    pub no_timeline: i64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            pain_identified: PAIN_IDENTIFIED_POINTS,
            critical_urgency_bonus: CRITICAL_URGENCY_BONUS,
            low_urgency_penalty: LOW_URGENCY_PENALTY,
            budget_confirmed: BUDGET_CONFIRMED_POINTS,
            budget_estimated: BUDGET_ESTIMATED_POINTS,
            no_budget: NO_BUDGET_PENALTY,
            decision_maker: DECISION_MAKER_POINTS,
            influencer: INFLUENCER_POINTS,
            technical: TECHNICAL_AUTHORITY_POINTS,
            no_authority: NO_AUTHORITY_PENALTY,
            strong_need: STRONG_NEED_POINTS,
            partial_need: PARTIAL_NEED_POINTS,
            weak_need: WEAK_NEED_PENALTY,
            immediate_timeline: IMMEDIATE_TIMELINE_POINTS,
            quarter_timeline: QUARTER_TIMELINE_POINTS,
            year_timeline: YEAR_TIMELINE_POINTS,
            no_timeline: NO_TIMELINE_PENALTY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvaluation {
    pub stage: SalesStage,
    pub completed: bool,
    pub score_delta: i64,
    pub reasons: Vec<String>,
    pub missing_fields: Vec<String>,
}

#[derive(Default)]
struct Tally {
    delta: i64,
    reasons: Vec<String>,
    missing: Vec<String>,
}

impl Tally {
    fn award(&mut self, points: i64, reason: &str) {
        self.delta += points;
        self.reasons.push(format!("{reason} ({points:+})"));
    }

    fn require<T>(&mut self, value: &Option<T>, field: &str) {
        if value.is_none() {
            self.missing.push(field.to_string());
        }
    }
}

impl ScoringRules {
    /// Evaluates typed data for `stage`. The data must belong to that stage.
    pub fn evaluate(
        &self,
        stage: SalesStage,
        data: &StageData,
    ) -> Result<StageEvaluation, DomainError> {
        if stage.is_terminal() {
            return Err(DomainError::UnknownStage(stage.as_str().to_string()));
        }
        if data.stage() != stage {
            return Err(DomainError::MalformedStageData {
                stage: stage.as_str().to_string(),
                detail: format!("received data for stage `{}`", data.stage()),
            });
        }

        let tally = match data {
            StageData::Discovery(data) => self.discovery(data),
            StageData::Budget(data) => self.budget(data),
            StageData::Authority(data) => self.authority(data),
            StageData::Need(data) => self.need(data),
            StageData::Timeline(data) => self.timeline(data),
        };

        Ok(StageEvaluation {
            stage,
            completed: tally.missing.is_empty(),
            score_delta: tally.delta,
            reasons: tally.reasons,
            missing_fields: tally.missing,
        })
    }

    /// Evaluates raw JSON fields keyed by a stage name, validating both.
    pub fn evaluate_raw(
        &self,
        stage_key: &str,
        fields: Value,
    ) -> Result<StageEvaluation, DomainError> {
        let stage = stage_key.parse::<SalesStage>()?;
        let data = StageData::from_json(stage, fields)?;
        self.evaluate(stage, &data)
    }

    fn discovery(&self, data: &DiscoveryData) -> Tally {
        let mut tally = Tally::default();
        tally.require(&data.pain_point, "pain_point");
        tally.require(&data.urgency, "urgency");

        if data.pain_point.is_some() {
            tally.award(self.pain_identified, "pain point identified");
            match data.urgency {
                Some(Urgency::Critical) => {
                    tally.award(self.critical_urgency_bonus, "critical urgency")
                }
                Some(Urgency::Low) => tally.award(self.low_urgency_penalty, "low urgency"),
                _ => {}
            }
        }
        tally
    }

    fn budget(&self, data: &BudgetData) -> Tally {
        let mut tally = Tally::default();
        tally.require(&data.status, "budget_status");
        match data.status {
            Some(BudgetStatus::Confirmed) => tally.award(self.budget_confirmed, "budget confirmed"),
            Some(BudgetStatus::Estimated) => tally.award(self.budget_estimated, "budget estimated"),
            Some(BudgetStatus::NoBudget) => tally.award(self.no_budget, "no budget"),
            None => {}
        }
        tally
    }

    fn authority(&self, data: &AuthorityData) -> Tally {
        let mut tally = Tally::default();
        tally.require(&data.level, "authority_level");
        match data.level {
            Some(AuthorityLevel::DecisionMaker) => {
                tally.award(self.decision_maker, "talking to the decision maker")
            }
            Some(AuthorityLevel::Influencer) => tally.award(self.influencer, "influences the decision"),
            Some(AuthorityLevel::Technical) => tally.award(self.technical, "technical evaluator"),
            Some(AuthorityLevel::NoAuthority) => tally.award(self.no_authority, "no decision authority"),
            None => {}
        }
        tally
    }

    fn need(&self, data: &NeedData) -> Tally {
        let mut tally = Tally::default();
        tally.require(&data.need, "need");
        if data.need.is_some() {
            match data.fit.unwrap_or(NeedFit::Partial) {
                NeedFit::Strong => tally.award(self.strong_need, "strong need fit"),
                NeedFit::Partial => tally.award(self.partial_need, "partial need fit"),
                NeedFit::Weak => tally.award(self.weak_need, "weak need fit"),
            }
        }
        tally
    }

    fn timeline(&self, data: &TimelineData) -> Tally {
        let mut tally = Tally::default();
        tally.require(&data.horizon, "timeline_horizon");
        match data.horizon {
            Some(TimelineHorizon::Immediate) => {
                tally.award(self.immediate_timeline, "buying immediately")
            }
            Some(TimelineHorizon::ThisQuarter) => {
                tally.award(self.quarter_timeline, "buying this quarter")
            }
            Some(TimelineHorizon::ThisYear) => tally.award(self.year_timeline, "buying this year"),
            Some(TimelineHorizon::NoTimeline) => tally.award(self.no_timeline, "no timeline"),
            None => {}
        }
        tally
    }
}

/// Evaluates `data` and writes the result onto the lead, replacing any earlier record for that
/// stage. The lead is left untouched when evaluation fails.
pub fn process_stage(
    rules: &ScoringRules,
    lead: &mut Lead,
    data: StageData,
    now: DateTime<Utc>,
) -> Result<StageEvaluation, DomainError> {
    if lead.is_terminal() {
        return Err(DomainError::AlreadyTerminal { stage: lead.stage });
    }
    let evaluation = rules.evaluate(data.stage(), &data)?;
    lead.store_stage_record(StageRecord {
        data,
        completed: evaluation.completed,
        score_delta: evaluation.score_delta,
        reasons: evaluation.reasons.clone(),
        missing_fields: evaluation.missing_fields.clone(),
        evaluated_at: now,
    });
    Ok(evaluation)
}

/// Re-derives every stage record of `lead` from its data, discarding the stored completion
/// flags and deltas, then checks that each ordinal stage behind the current one is completed.
/// The lead is left untouched on error.
pub fn reevaluate_lead(rules: &ScoringRules, lead: &mut Lead) -> Result<(), DomainError> {
    let mut records = BTreeMap::new();
    for (key, record) in &lead.stages {
        let stage = record.data.stage();
        if key.as_str() != stage.as_str() {
            return Err(DomainError::MalformedStageData {
                stage: key.clone(),
                detail: format!("record holds data for stage `{stage}`"),
            });
        }
        let evaluation = rules.evaluate(stage, &record.data)?;
        records.insert(
            key.clone(),
            StageRecord {
                data: record.data.clone(),
                completed: evaluation.completed,
                score_delta: evaluation.score_delta,
                reasons: evaluation.reasons,
                missing_fields: evaluation.missing_fields,
                evaluated_at: record.evaluated_at,
            },
        );
    }

    if let Some(current) = lead.stage.ordinal() {
        let skipped = SalesStage::ORDINAL[..usize::from(current)]
            .iter()
            .find(|stage| !records.get(stage.as_str()).is_some_and(|record| record.completed));
        if let Some(stage) = skipped {
            return Err(DomainError::InvariantViolation(format!(
                "lead is at stage `{}` but stage `{stage}` is not completed",
                lead.stage
            )));
        }
    }

    lead.stages = records;
    lead.rescore();
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvanceOutcome {
    pub evaluation: StageEvaluation,
    pub advanced_to: Option<SalesStage>,
    pub refusal: Option<DomainError>,
}

/// Processes data for the lead's current stage, then attempts to advance when asked to.
/// A refused advancement is reported in the outcome, not as an error.
pub fn process_and_advance(
    rules: &ScoringRules,
    lead: &mut Lead,
    data: StageData,
    should_advance: bool,
    now: DateTime<Utc>,
) -> Result<AdvanceOutcome, DomainError> {
    if data.stage() != lead.stage {
        return Err(DomainError::MalformedStageData {
            stage: lead.stage.as_str().to_string(),
            detail: format!("received data for stage `{}`", data.stage()),
        });
    }
    let evaluation = process_stage(rules, lead, data, now)?;
    if !should_advance {
        return Ok(AdvanceOutcome { evaluation, advanced_to: None, refusal: None });
    }

    match lead.advance(now) {
        Ok(next) => Ok(AdvanceOutcome { evaluation, advanced_to: Some(next), refusal: None }),
        Err(refusal) => Ok(AdvanceOutcome { evaluation, advanced_to: None, refusal: Some(refusal) }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{
        process_and_advance, process_stage, reevaluate_lead, ScoringRules,
        BUDGET_CONFIRMED_POINTS, CRITICAL_URGENCY_BONUS, NO_BUDGET_PENALTY,
        PAIN_IDENTIFIED_POINTS,
    };
    use crate::domain::lead::{Lead, LeadId, StageRecord};
    use crate::domain::stage::SalesStage;
    use crate::domain::stage_data::{
        BudgetData, BudgetStatus, DiscoveryData, StageData, TimelineData, TimelineHorizon, Urgency,
    };
    use crate::errors::{DomainError, ErrorKind};

    fn lead() -> Lead {
        Lead::new(LeadId("+15550100".to_owned()), Utc::now())
    }

    #[test]
    fn confirmed_budget_completes_stage_with_confirmed_weight() {
        let evaluation = ScoringRules::default()
            .evaluate_raw("budget", json!({ "status": "confirmed" }))
            .expect("valid budget data");

        assert!(evaluation.completed);
        assert_eq!(evaluation.score_delta, BUDGET_CONFIRMED_POINTS);
        assert!(evaluation.score_delta > 0);
    }

    #[test]
    fn no_budget_completes_with_negative_delta() {
        let evaluation = ScoringRules::default()
            .evaluate(
                SalesStage::Budget,
                &StageData::Budget(BudgetData { status: Some(BudgetStatus::NoBudget), amount: None }),
            )
            .expect("valid");
        assert!(evaluation.completed);
        assert_eq!(evaluation.score_delta, NO_BUDGET_PENALTY);
    }

    #[test]
    fn pain_without_urgency_scores_but_does_not_complete() {
        let evaluation = ScoringRules::default()
            .evaluate(
                SalesStage::Discovery,
                &StageData::Discovery(DiscoveryData {
                    pain_point: Some("manual data entry".to_owned()),
                    urgency: None,
                    current_solution: None,
                }),
            )
            .expect("valid");

        assert!(!evaluation.completed);
        assert_eq!(evaluation.score_delta, PAIN_IDENTIFIED_POINTS);
        assert_eq!(evaluation.missing_fields, vec!["urgency".to_owned()]);
    }

    #[test]
    fn critical_urgency_adds_bonus() {
        let evaluation = ScoringRules::default()
            .evaluate(
                SalesStage::Discovery,
                &StageData::Discovery(DiscoveryData {
                    pain_point: Some("losing deals".to_owned()),
                    urgency: Some(Urgency::Critical),
                    current_solution: None,
                }),
            )
            .expect("valid");
        assert!(evaluation.completed);
        assert_eq!(evaluation.score_delta, PAIN_IDENTIFIED_POINTS + CRITICAL_URGENCY_BONUS);
    }

    #[test]
    fn unknown_stage_is_a_validation_error() {
        let error = ScoringRules::default()
            .evaluate_raw("negotiation", json!({}))
            .expect_err("unknown stage");
        assert!(matches!(error, DomainError::UnknownStage(_)));
        assert_eq!(error.kind(), ErrorKind::Validation);

        let error = ScoringRules::default()
            .evaluate_raw("qualified", json!({}))
            .expect_err("terminal stage has no data");
        assert!(matches!(error, DomainError::UnknownStage(_)));
    }

    #[test]
    fn mismatched_stage_data_is_rejected() {
        let error = ScoringRules::default()
            .evaluate(SalesStage::Timeline, &StageData::Budget(BudgetData::default()))
            .expect_err("mismatch");
        assert!(matches!(error, DomainError::MalformedStageData { .. }));
    }

    #[test]
    fn replaying_identical_stage_data_is_idempotent() {
        let rules = ScoringRules::default();
        let mut lead = lead();
        let data = StageData::Discovery(DiscoveryData {
            pain_point: Some("no follow-up".to_owned()),
            urgency: Some(Urgency::Critical),
            current_solution: None,
        });

        process_stage(&rules, &mut lead, data.clone(), Utc::now()).expect("first");
        let after_first = lead.score;
        process_stage(&rules, &mut lead, data, Utc::now()).expect("replay");

        assert_eq!(lead.score, after_first);
        assert_eq!(lead.score.value(), 25);
    }

    #[test]
    fn advance_is_refused_when_stage_incomplete_even_if_requested() {
        let rules = ScoringRules::default();
        let mut lead = lead();
        let outcome = process_and_advance(
            &rules,
            &mut lead,
            StageData::Discovery(DiscoveryData {
                pain_point: Some("spreadsheets everywhere".to_owned()),
                urgency: None,
                current_solution: None,
            }),
            true,
            Utc::now(),
        )
        .expect("processing succeeds");

        assert_eq!(outcome.advanced_to, None);
        assert!(matches!(outcome.refusal, Some(DomainError::StageNotCompleted { .. })));
        assert_eq!(lead.stage, SalesStage::Discovery);
    }

    #[test]
    fn completed_stage_advances_when_requested() {
        let rules = ScoringRules::default();
        let mut lead = lead();
        let outcome = process_and_advance(
            &rules,
            &mut lead,
            StageData::Discovery(DiscoveryData {
                pain_point: Some("slow replies".to_owned()),
                urgency: Some(Urgency::High),
                current_solution: None,
            }),
            true,
            Utc::now(),
        )
        .expect("processing succeeds");

        assert_eq!(outcome.advanced_to, Some(SalesStage::Budget));
        assert_eq!(lead.stage, SalesStage::Budget);
    }

    #[test]
    fn reevaluation_discards_forged_completion_and_deltas() {
        let mut lead = lead();
        lead.stages.insert(
            "discovery".to_owned(),
            StageRecord {
                data: StageData::Discovery(DiscoveryData::default()),
                completed: true,
                score_delta: 90,
                reasons: Vec::new(),
                missing_fields: Vec::new(),
                evaluated_at: Utc::now(),
            },
        );
        lead.rescore();
        assert_eq!(lead.score.value(), 90);

        reevaluate_lead(&ScoringRules::default(), &mut lead).expect("consistent");
        let record = lead.stage_record(SalesStage::Discovery).expect("kept");
        assert!(!record.completed);
        assert_eq!(record.score_delta, 0);
        assert_eq!(lead.score.value(), 0);
    }

    #[test]
    fn reevaluation_rejects_records_filed_under_another_stage() {
        let mut lead = lead();
        lead.stages.insert(
            "budget".to_owned(),
            StageRecord {
                data: StageData::Discovery(DiscoveryData::default()),
                completed: false,
                score_delta: 0,
                reasons: Vec::new(),
                missing_fields: Vec::new(),
                evaluated_at: Utc::now(),
            },
        );

        let error = reevaluate_lead(&ScoringRules::default(), &mut lead).expect_err("misfiled");
        assert!(matches!(error, DomainError::MalformedStageData { ref stage, .. } if stage == "budget"));
        assert!(lead.stages.contains_key("budget"));
    }

    #[test]
    fn reevaluation_rejects_stage_past_incomplete_predecessors() {
        let mut lead = lead();
        lead.stage = SalesStage::Authority;
        process_stage(
            &ScoringRules::default(),
            &mut lead,
            StageData::Discovery(DiscoveryData {
                pain_point: Some("manual data entry".to_owned()),
                urgency: Some(Urgency::High),
                current_solution: None,
            }),
            Utc::now(),
        )
        .expect("processed");

        let error = reevaluate_lead(&ScoringRules::default(), &mut lead).expect_err("budget skipped");
        assert!(matches!(error, DomainError::InvariantViolation(ref detail) if detail.contains("budget")));
    }

    #[test]
    fn data_for_another_stage_is_rejected_before_mutation() {
        let rules = ScoringRules::default();
        let mut lead = lead();
        let error = process_and_advance(
            &rules,
            &mut lead,
            StageData::Timeline(TimelineData {
                horizon: Some(TimelineHorizon::Immediate),
                target: None,
            }),
            true,
            Utc::now(),
        )
        .expect_err("lead is in discovery");

        assert!(matches!(error, DomainError::MalformedStageData { .. }));
        assert!(lead.stages.is_empty());
        assert_eq!(lead.score.value(), 0);
    }
}
