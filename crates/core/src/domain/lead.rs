use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::score::QualificationScore;
use crate::domain::stage::SalesStage;
use crate::domain::stage_data::StageData;
use crate::errors::DomainError;

/// Stable conversation key (phone number, contact id, chat id).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub data: StageData,
    pub completed: bool,
    pub score_delta: i64,
    pub reasons: Vec<String>,
    pub missing_fields: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub stage: SalesStage,
    pub score: QualificationScore,
    pub stages: BTreeMap<String, StageRecord>,
    pub interaction_count: u32,
    pub message_count: u32,
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_interaction_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(id: LeadId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            stage: SalesStage::Discovery,
            score: QualificationScore::ZERO,
            stages: BTreeMap::new(),
            interaction_count: 0,
            message_count: 0,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            last_interaction_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn stage_record(&self, stage: SalesStage) -> Option<&StageRecord> {
        self.stages.get(stage.as_str())
    }

    pub fn is_stage_completed(&self, stage: SalesStage) -> bool {
        self.stage_record(stage).is_some_and(|record| record.completed)
    }

    /// Counts one inbound user message and one full turn.
    pub fn record_interaction(&mut self, now: DateTime<Utc>) {
        self.interaction_count = self.interaction_count.saturating_add(1);
        self.message_count = self.message_count.saturating_add(1);
        self.last_interaction_at = now;
        self.updated_at = now;
    }

    /// Writes the record for its stage, replacing any earlier evaluation, and rescoring.
    pub fn store_stage_record(&mut self, record: StageRecord) {
        self.updated_at = record.evaluated_at;
        self.stages.insert(record.data.stage().as_str().to_string(), record);
        self.rescore();
    }

    /// Recomputes the score from zero over every stage record in stage order.
    pub fn rescore(&mut self) {
        self.score = SalesStage::ORDINAL
            .iter()
            .filter_map(|stage| self.stage_record(*stage))
            .fold(QualificationScore::ZERO, |score, record| score.apply(record.score_delta));
    }

    /// Moves to the next ordinal stage once the current one is completed.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<SalesStage, DomainError> {
        if self.is_terminal() {
            return Err(DomainError::AlreadyTerminal { stage: self.stage });
        }

        let current = self.stage;
        if !self.is_stage_completed(current) {
            let missing_fields = self
                .stage_record(current)
                .map(|record| record.missing_fields.clone())
                .unwrap_or_else(|| vec!["stage has not been evaluated".to_string()]);
            return Err(DomainError::StageNotCompleted { stage: current, missing_fields });
        }

        let next = current
            .next()
            .ok_or(DomainError::InvalidStageTransition { from: current, to: None })?;
        self.stage = next;
        self.updated_at = now;
        Ok(next)
    }

    pub(crate) fn enter_terminal(&mut self, stage: SalesStage, now: DateTime<Utc>) {
        self.stage = stage;
        self.updated_at = now;
    }

    pub fn days_inactive(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_interaction_at).num_days().max(0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Lead, LeadId, StageRecord};
    use crate::domain::stage::SalesStage;
    use crate::domain::stage_data::{BudgetData, BudgetStatus, DiscoveryData, StageData, Urgency};
    use crate::errors::DomainError;

    fn record(data: StageData, completed: bool, score_delta: i64) -> StageRecord {
        StageRecord {
            data,
            completed,
            score_delta,
            reasons: Vec::new(),
            missing_fields: if completed { Vec::new() } else { vec!["urgency".to_string()] },
            evaluated_at: Utc::now(),
        }
    }

    fn discovery() -> StageData {
        StageData::Discovery(DiscoveryData {
            pain_point: Some("slow follow-up".to_string()),
            urgency: Some(Urgency::High),
            current_solution: None,
        })
    }

    #[test]
    fn new_lead_starts_in_discovery_with_zero_score() {
        let lead = Lead::new(LeadId("+15550001".to_string()), Utc::now());
        assert_eq!(lead.stage, SalesStage::Discovery);
        assert_eq!(lead.score.value(), 0);
        assert!(lead.stages.is_empty());
    }

    #[test]
    fn storing_the_same_record_twice_does_not_inflate_score() {
        let mut lead = Lead::new(LeadId("lead-1".to_string()), Utc::now());
        lead.store_stage_record(record(discovery(), true, 15));
        lead.store_stage_record(record(discovery(), true, 15));

        assert_eq!(lead.score.value(), 15);
        assert_eq!(lead.stages.len(), 1);
    }

    #[test]
    fn rescore_clamps_in_stage_order() {
        let mut lead = Lead::new(LeadId("lead-2".to_string()), Utc::now());
        lead.store_stage_record(record(discovery(), true, -10));
        lead.store_stage_record(record(
            StageData::Budget(BudgetData { status: Some(BudgetStatus::Confirmed), amount: None }),
            true,
            20,
        ));

        assert_eq!(lead.score.value(), 20);
    }

    #[test]
    fn advance_requires_completed_current_stage() {
        let mut lead = Lead::new(LeadId("lead-3".to_string()), Utc::now());
        let error = lead.advance(Utc::now()).expect_err("no evaluation yet");
        assert!(matches!(error, DomainError::StageNotCompleted { stage: SalesStage::Discovery, .. }));

        lead.store_stage_record(record(discovery(), false, 15));
        let error = lead.advance(Utc::now()).expect_err("evaluated but incomplete");
        assert!(matches!(
            error,
            DomainError::StageNotCompleted { ref missing_fields, .. } if missing_fields == &vec!["urgency".to_string()]
        ));

        lead.store_stage_record(record(discovery(), true, 15));
        assert_eq!(lead.advance(Utc::now()), Ok(SalesStage::Budget));
    }

    #[test]
    fn terminal_leads_reject_advancement() {
        let mut lead = Lead::new(LeadId("lead-4".to_string()), Utc::now());
        lead.store_stage_record(record(discovery(), true, 15));
        lead.enter_terminal(SalesStage::Disqualified, Utc::now());

        let error = lead.advance(Utc::now()).expect_err("terminal");
        assert!(matches!(error, DomainError::AlreadyTerminal { .. }));
    }

    #[test]
    fn days_inactive_counts_whole_days() {
        let now = Utc::now();
        let mut lead = Lead::new(LeadId("lead-5".to_string()), now - Duration::days(10));
        lead.last_interaction_at = now - Duration::days(3);
        assert_eq!(lead.days_inactive(now), 3);
    }
}
