use crate::domain::bant::BantSnapshot;
use crate::flows::states::SpinPhase;

pub const DATA_PROGRESS_WEIGHT: f64 = 80.0;
pub const PHASE_PROGRESS_STEP: u32 = 10;
pub const HANDOFF_PROGRESS: u8 = 70;

/// `min(100, round(collected / total * 80) + phase_ordinal * 10)`.
///
/// With no configured weight the data share is zero.
pub fn conversation_progress(collected_weight: u32, total_weight: u32, phase: SpinPhase) -> u8 {
    let data_share = if total_weight == 0 {
        0
    } else {
        let ratio = f64::from(collected_weight.min(total_weight)) / f64::from(total_weight);
        (ratio * DATA_PROGRESS_WEIGHT).round() as u32
    };
    let phase_share = u32::from(phase.ordinal()) * PHASE_PROGRESS_STEP;
    (data_share + phase_share).min(100) as u8
}

pub fn snapshot_progress(snapshot: &BantSnapshot, phase: SpinPhase) -> u8 {
    conversation_progress(snapshot.collected_weight, snapshot.total_weight, phase)
}

pub fn ready_for_handoff(phase: SpinPhase, progress: u8) -> bool {
    phase == SpinPhase::Closing && progress >= HANDOFF_PROGRESS
}

#[cfg(test)]
mod tests {
    use super::{conversation_progress, ready_for_handoff};
    use crate::flows::states::SpinPhase;

    #[test]
    fn progress_is_monotonic_in_phase_for_fixed_data() {
        for collected in [0u32, 10, 45, 80, 100] {
            let mut previous = 0;
            for phase in SpinPhase::ALL {
                let progress = conversation_progress(collected, 100, phase);
                assert!(progress >= previous, "collected {collected} phase {phase}");
                assert!(progress <= 100);
                previous = progress;
            }
        }
    }

    #[test]
    fn progress_blends_data_and_phase() {
        assert_eq!(conversation_progress(0, 100, SpinPhase::Situation), 0);
        assert_eq!(conversation_progress(45, 100, SpinPhase::Problem), 46);
        assert_eq!(conversation_progress(100, 100, SpinPhase::Closing), 100);
        assert_eq!(conversation_progress(50, 0, SpinPhase::Implication), 20);
    }

    #[test]
    fn handoff_requires_closing_and_seventy_percent() {
        assert!(ready_for_handoff(SpinPhase::Closing, 70));
        assert!(!ready_for_handoff(SpinPhase::Closing, 69));
        assert!(!ready_for_handoff(SpinPhase::NeedPayoff, 95));
    }
}
