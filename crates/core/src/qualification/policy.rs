use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::lead::Lead;
use crate::domain::score::QUALIFIED_THRESHOLD;
use crate::domain::stage::SalesStage;
use crate::domain::stage_data::{AuthorityLevel, BudgetStatus, StageData, TimelineHorizon};
use crate::errors::DomainError;

pub const KEY_STAGES: [SalesStage; 3] =
    [SalesStage::Discovery, SalesStage::Budget, SalesStage::Authority];
pub const CRITICAL_SCORE: u8 = 20;
pub const LOW_RISK_SCORE: u8 = 40;
pub const MIN_INTERACTIONS: u32 = 3;
pub const DISQUALIFY_FACTOR_THRESHOLD: usize = 2;
pub const DEFAULT_INACTIVITY_DAYS: u32 = 14;

pub const METADATA_DISQUALIFY_REASON: &str = "disqualify_reason";
pub const METADATA_DISQUALIFIED_AT: &str = "disqualified_at";
pub const METADATA_QUALIFIED_AT: &str = "qualified_at";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisqualifyFactor {
    CriticallyLowScore,
    NoBudget,
    NoAuthority,
    NoTimeline,
    Inactive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisqualifyAdvice {
    pub recommended: bool,
    pub factors: Vec<DisqualifyFactor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

/// Qualification decision rules. All checks are pure over the lead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QualificationPolicy {
    pub inactivity_days: u32,
}

impl Default for QualificationPolicy {
    fn default() -> Self {
        Self { inactivity_days: DEFAULT_INACTIVITY_DAYS }
    }
}

impl QualificationPolicy {
    pub fn new(inactivity_days: u32) -> Self {
        Self { inactivity_days }
    }

    pub fn unmet_conditions(&self, lead: &Lead) -> Vec<String> {
        let mut unmet = Vec::new();
        if !lead.score.is_qualified() {
            unmet.push(format!("score {} is below {QUALIFIED_THRESHOLD}", lead.score));
        }
        for stage in KEY_STAGES {
            if !lead.is_stage_completed(stage) {
                unmet.push(format!("stage {stage} is not completed"));
            }
        }
        unmet
    }

    pub fn can_qualify(&self, lead: &Lead) -> bool {
        self.unmet_conditions(lead).is_empty()
    }

    pub fn qualify(&self, lead: &mut Lead, now: DateTime<Utc>) -> Result<(), DomainError> {
        if lead.is_terminal() {
            return Err(DomainError::AlreadyTerminal { stage: lead.stage });
        }
        let unmet = self.unmet_conditions(lead);
        if !unmet.is_empty() {
            return Err(DomainError::QualificationRejected { unmet });
        }
        lead.metadata.insert(METADATA_QUALIFIED_AT.to_string(), Value::String(now.to_rfc3339()));
        lead.enter_terminal(SalesStage::Qualified, now);
        Ok(())
    }

    /// Moves the lead to `disqualified` from any stage. The reason is required.
    pub fn disqualify(
        &self,
        lead: &mut Lead,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::InvalidDisqualifyReason);
        }
        lead.metadata
            .insert(METADATA_DISQUALIFY_REASON.to_string(), Value::String(reason.to_string()));
        lead.metadata
            .insert(METADATA_DISQUALIFIED_AT.to_string(), Value::String(now.to_rfc3339()));
        lead.enter_terminal(SalesStage::Disqualified, now);
        Ok(())
    }

    /// Checks that a terminal stage carried by restored state could have been reached here:
    /// `qualified` must still meet every condition, `disqualified` must carry its reason.
    pub fn verify_terminal(&self, lead: &Lead) -> Result<(), DomainError> {
        match lead.stage {
            SalesStage::Qualified => {
                let unmet = self.unmet_conditions(lead);
                if unmet.is_empty() {
                    Ok(())
                } else {
                    Err(DomainError::QualificationRejected { unmet })
                }
            }
            SalesStage::Disqualified => {
                let has_reason = lead
                    .metadata
                    .get(METADATA_DISQUALIFY_REASON)
                    .and_then(Value::as_str)
                    .is_some_and(|reason| !reason.trim().is_empty());
                if has_reason {
                    Ok(())
                } else {
                    Err(DomainError::InvalidDisqualifyReason)
                }
            }
            _ => Ok(()),
        }
    }

    /// Advisory "two strikes" check. Never changes the lead.
    pub fn should_disqualify(&self, lead: &Lead, now: DateTime<Utc>) -> DisqualifyAdvice {
        let mut factors = Vec::new();
        if lead.score.value() < CRITICAL_SCORE {
            factors.push(DisqualifyFactor::CriticallyLowScore);
        }
        if budget_status(lead) == Some(BudgetStatus::NoBudget) {
            factors.push(DisqualifyFactor::NoBudget);
        }
        if authority_level(lead) == Some(AuthorityLevel::NoAuthority) {
            factors.push(DisqualifyFactor::NoAuthority);
        }
        if timeline_horizon(lead) == Some(TimelineHorizon::NoTimeline) {
            factors.push(DisqualifyFactor::NoTimeline);
        }
        if self.is_inactive(lead, now) {
            factors.push(DisqualifyFactor::Inactive);
        }

        DisqualifyAdvice { recommended: factors.len() >= DISQUALIFY_FACTOR_THRESHOLD, factors }
    }

    pub fn risk(&self, lead: &Lead, now: DateTime<Utc>) -> RiskAssessment {
        let mut score: u8 = 0;
        let mut reasons = Vec::new();

        if lead.score.value() < LOW_RISK_SCORE {
            score += 30;
            reasons.push(format!("score {} is below {LOW_RISK_SCORE}", lead.score));
        }
        let completed = KEY_STAGES.iter().filter(|stage| lead.is_stage_completed(**stage)).count();
        if completed < 2 {
            score += 25;
            reasons.push(format!("only {completed} of 3 key stages completed"));
        }
        if lead.interaction_count < MIN_INTERACTIONS {
            score += 20;
            reasons.push(format!("only {} interactions", lead.interaction_count));
        }
        if self.is_inactive(lead, now) {
            score += 25;
            reasons.push(format!("inactive for {} days", lead.days_inactive(now)));
        }

        let level = match score {
            0..=29 => RiskLevel::Low,
            30..=59 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        RiskAssessment { score, level, reasons }
    }

    fn is_inactive(&self, lead: &Lead, now: DateTime<Utc>) -> bool {
        lead.days_inactive(now) > i64::from(self.inactivity_days)
    }
}

fn budget_status(lead: &Lead) -> Option<BudgetStatus> {
    match lead.stage_record(SalesStage::Budget).map(|record| &record.data) {
        Some(StageData::Budget(data)) => data.status,
        _ => None,
    }
}

fn authority_level(lead: &Lead) -> Option<AuthorityLevel> {
    match lead.stage_record(SalesStage::Authority).map(|record| &record.data) {
        Some(StageData::Authority(data)) => data.level,
        _ => None,
    }
}

fn timeline_horizon(lead: &Lead) -> Option<TimelineHorizon> {
    match lead.stage_record(SalesStage::Timeline).map(|record| &record.data) {
        Some(StageData::Timeline(data)) => data.horizon,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{
        DisqualifyFactor, QualificationPolicy, RiskLevel, KEY_STAGES, METADATA_DISQUALIFY_REASON,
    };
    use crate::domain::lead::{Lead, LeadId, StageRecord};
    use crate::domain::score::QualificationScore;
    use crate::domain::stage::SalesStage;
    use crate::domain::stage_data::{
        AuthorityData, AuthorityLevel, BudgetData, BudgetStatus, DiscoveryData, StageData,
    };
    use crate::errors::DomainError;

    fn empty_data(stage: SalesStage) -> StageData {
        match stage {
            SalesStage::Discovery => StageData::Discovery(DiscoveryData::default()),
            SalesStage::Budget => StageData::Budget(BudgetData::default()),
            _ => StageData::Authority(AuthorityData::default()),
        }
    }

    fn record(data: StageData, completed: bool) -> StageRecord {
        StageRecord {
            data,
            completed,
            score_delta: 0,
            reasons: Vec::new(),
            missing_fields: Vec::new(),
            evaluated_at: Utc::now(),
        }
    }

    fn lead_with(score: u8, completed: [bool; 3]) -> Lead {
        let mut lead = Lead::new(LeadId("lead".to_owned()), Utc::now());
        for (stage, done) in KEY_STAGES.iter().zip(completed) {
            lead.store_stage_record(record(empty_data(*stage), done));
        }
        lead.score = QualificationScore::new(i64::from(score));
        lead
    }

    #[test]
    fn can_qualify_requires_score_and_every_key_stage() {
        let policy = QualificationPolicy::default();
        for score in [0u8, 59, 60, 65, 100] {
            for mask in 0u8..8 {
                let completed = [mask & 1 != 0, mask & 2 != 0, mask & 4 != 0];
                let lead = lead_with(score, completed);
                let expected = score >= 60 && completed.iter().all(|done| *done);
                assert_eq!(policy.can_qualify(&lead), expected, "score {score} mask {mask:03b}");
            }
        }
    }

    #[test]
    fn qualify_succeeds_once_then_reports_already_terminal() {
        let policy = QualificationPolicy::default();
        let mut lead = lead_with(65, [true, true, true]);

        policy.qualify(&mut lead, Utc::now()).expect("policy holds");
        assert_eq!(lead.stage, SalesStage::Qualified);

        let error = policy.qualify(&mut lead, Utc::now()).expect_err("already qualified");
        assert!(matches!(error, DomainError::AlreadyTerminal { stage: SalesStage::Qualified }));
    }

    #[test]
    fn qualify_reports_unmet_conditions_without_mutation() {
        let policy = QualificationPolicy::default();
        let mut lead = lead_with(45, [true, false, true]);

        let error = policy.qualify(&mut lead, Utc::now()).expect_err("policy fails");
        match error {
            DomainError::QualificationRejected { unmet } => {
                assert_eq!(unmet.len(), 2);
                assert!(unmet[0].contains("45"));
                assert!(unmet[1].contains("budget"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(lead.stage, SalesStage::Discovery);
    }

    #[test]
    fn disqualify_requires_reason_and_records_it() {
        let policy = QualificationPolicy::default();
        let mut lead = lead_with(10, [false, false, false]);

        assert_eq!(
            policy.disqualify(&mut lead, "   ", Utc::now()),
            Err(DomainError::InvalidDisqualifyReason)
        );
        assert_eq!(lead.stage, SalesStage::Discovery);

        policy.disqualify(&mut lead, "student project", Utc::now()).expect("valid reason");
        assert_eq!(lead.stage, SalesStage::Disqualified);
        assert_eq!(
            lead.metadata.get(METADATA_DISQUALIFY_REASON).and_then(|value| value.as_str()),
            Some("student project")
        );
        assert!(lead.metadata.contains_key(super::METADATA_DISQUALIFIED_AT));
    }

    #[test]
    fn terminal_stage_must_be_reachable() {
        let policy = QualificationPolicy::default();

        let mut forged = lead_with(30, [true, true, false]);
        forged.stage = SalesStage::Qualified;
        assert!(matches!(
            policy.verify_terminal(&forged),
            Err(DomainError::QualificationRejected { .. })
        ));

        let mut earned = lead_with(65, [true, true, true]);
        policy.qualify(&mut earned, Utc::now()).expect("policy holds");
        assert_eq!(policy.verify_terminal(&earned), Ok(()));

        let mut silent = lead_with(10, [false, false, false]);
        silent.stage = SalesStage::Disqualified;
        assert_eq!(policy.verify_terminal(&silent), Err(DomainError::InvalidDisqualifyReason));

        policy.disqualify(&mut silent, "went with a competitor", Utc::now()).expect("reason");
        assert_eq!(policy.verify_terminal(&silent), Ok(()));
    }

    #[test]
    fn two_factors_recommend_disqualification_one_does_not() {
        let policy = QualificationPolicy::default();
        let mut lead = lead_with(50, [true, false, false]);
        lead.store_stage_record(record(
            StageData::Budget(BudgetData { status: Some(BudgetStatus::NoBudget), amount: None }),
            true,
        ));
        lead.score = QualificationScore::new(50);

        let advice = policy.should_disqualify(&lead, Utc::now());
        assert_eq!(advice.factors, vec![DisqualifyFactor::NoBudget]);
        assert!(!advice.recommended);

        lead.store_stage_record(record(
            StageData::Authority(AuthorityData {
                level: Some(AuthorityLevel::NoAuthority),
                decision_process: None,
            }),
            true,
        ));
        lead.score = QualificationScore::new(50);
        let advice = policy.should_disqualify(&lead, Utc::now());
        assert_eq!(advice.factors, vec![DisqualifyFactor::NoBudget, DisqualifyFactor::NoAuthority]);
        assert!(advice.recommended);
        assert_eq!(lead.stage, SalesStage::Discovery);
    }

    #[test]
    fn inactivity_counts_as_a_factor() {
        let policy = QualificationPolicy::new(7);
        let now = Utc::now();
        let mut lead = lead_with(10, [false, false, false]);
        lead.last_interaction_at = now - Duration::days(8);

        let advice = policy.should_disqualify(&lead, now);
        assert_eq!(advice.factors, vec![DisqualifyFactor::CriticallyLowScore, DisqualifyFactor::Inactive]);
        assert!(advice.recommended);
    }

    #[test]
    fn risk_buckets_accumulate_penalties() {
        let policy = QualificationPolicy::default();
        let now = Utc::now();

        let mut healthy = lead_with(70, [true, true, false]);
        healthy.interaction_count = 5;
        let risk = policy.risk(&healthy, now);
        assert_eq!(risk.score, 0);
        assert_eq!(risk.level, RiskLevel::Low);

        let fresh = lead_with(0, [false, false, false]);
        let risk = policy.risk(&fresh, now);
        assert_eq!(risk.score, 75);
        assert_eq!(risk.level, RiskLevel::High);

        let mut stale = lead_with(70, [true, true, true]);
        stale.interaction_count = 2;
        stale.last_interaction_at = now - Duration::days(30);
        let risk = policy.risk(&stale, now);
        assert_eq!(risk.score, 45);
        assert_eq!(risk.level, RiskLevel::Medium);
    }
}
