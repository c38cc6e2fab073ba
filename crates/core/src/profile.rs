//! Per-agent configuration: business context, BANT fields, phase playbook, objection reframes,
//! style rules and model settings.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{interpolate_env_vars, ConfigError};
use crate::domain::bant::{default_bant_fields, keys, BantFieldDescriptor};
use crate::domain::stage_data::contains_phrase;
use crate::flows::states::SpinPhase;
use crate::qualification::scoring::ScoringRules;
use crate::style::{StyleRules, SupportStyleRules};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub business: BusinessProfile,
    pub bant_fields: Vec<BantFieldDescriptor>,
    pub phases: Vec<PhaseConfig>,
    pub objections: Vec<ObjectionReframe>,
    pub style: StyleRules,
    pub models: ModelSettings,
    pub scoring: ScoringRules,
    pub support: SupportRules,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessProfile {
    pub name: String,
    pub agent_name: String,
    pub description: String,
    pub value_proposition: String,
    pub offerings: Vec<String>,
    pub cta: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub phase: SpinPhase,
    pub objective: String,
    pub tone: String,
    pub technique: String,
    #[serde(default)]
    pub advance_signals: Vec<String>,
    #[serde(default)]
    pub regression_signals: Vec<String>,
    pub fallback_question: String,
}

impl PhaseConfig {
    pub fn matched_advance_signals(&self, message: &str) -> Vec<String> {
        matched(&self.advance_signals, message)
    }

    pub fn matched_regression_signals(&self, message: &str) -> Vec<String> {
        matched(&self.regression_signals, message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectionReframe {
    pub category: String,
    pub keywords: Vec<String>,
    pub reframe: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Falls back to `llm.model` when unset.
    pub plan_model: Option<String>,
    pub plan_temperature: f32,
    pub write_model: Option<String>,
    pub write_temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self { plan_model: None, plan_temperature: 0.2, write_model: None, write_temperature: 0.7 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportRules {
    pub escalation_turns: u32,
    pub style: SupportStyleRules,
}

impl Default for SupportRules {
    fn default() -> Self {
        Self { escalation_turns: 8, style: SupportStyleRules::default() }
    }
}

impl Default for BusinessProfile {
    fn default() -> Self {
        Self {
            name: "Leadflow".to_string(),
            agent_name: "Ava".to_string(),
            description: "Conversational follow-up for inbound sales leads".to_string(),
            value_proposition: "Every inbound lead gets a reply in under a minute, day or night"
                .to_string(),
            offerings: vec![
                "Instant chat follow-up".to_string(),
                "Lead qualification".to_string(),
                "Meeting handoff to your sales team".to_string(),
            ],
            cta: "a 20 minute call with a specialist".to_string(),
        }
    }
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            business: BusinessProfile::default(),
            bant_fields: default_bant_fields(),
            phases: default_phases(),
            objections: default_objections(),
            style: StyleRules::default(),
            models: ModelSettings::default(),
            scoring: ScoringRules::default(),
            support: SupportRules::default(),
        }
    }
}

impl AgentProfile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        let interpolated = interpolate_env_vars(&raw)?;
        let profile = toml::from_str::<Self>(&interpolated)
            .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;
        profile.validate()?;
        Ok(profile)
    }

    /// Loads `path` when given, otherwise the built-in profile.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn phase(&self, phase: SpinPhase) -> Option<&PhaseConfig> {
        self.phases.iter().find(|config| config.phase == phase)
    }

    pub fn fallback_question(&self, phase: SpinPhase) -> &str {
        self.phase(phase)
            .map(|config| config.fallback_question.as_str())
            .unwrap_or("What would you most like to improve right now?")
    }

    pub fn fields_for_phase(&self, phase: SpinPhase) -> Vec<&BantFieldDescriptor> {
        self.bant_fields.iter().filter(|field| field.source_phase == phase).collect()
    }

    pub fn find_objection(&self, category: &str) -> Option<&ObjectionReframe> {
        let category = category.trim();
        self.objections.iter().find(|objection| objection.category.eq_ignore_ascii_case(category))
    }

    /// Keyword match against configured objection reframes.
    pub fn detect_objection(&self, message: &str) -> Option<&ObjectionReframe> {
        let lowered = message.to_lowercase();
        self.objections.iter().find(|objection| {
            objection.keywords.iter().any(|keyword| contains_phrase(&lowered, &keyword.to_lowercase()))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.business.name.trim().is_empty() {
            return Err(ConfigError::Validation("profile.business.name must not be empty".into()));
        }

        let mut seen = BTreeSet::new();
        for field in &self.bant_fields {
            if field.key.trim().is_empty() {
                return Err(ConfigError::Validation("profile.bant_fields keys must not be empty".into()));
            }
            if !seen.insert(field.key.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "profile.bant_fields contains duplicate key `{}`",
                    field.key
                )));
            }
        }

        // Stage data is parsed from these keys; the current solution stays optional.
        for required in
            [keys::PAIN_POINT, keys::URGENCY, keys::BUDGET, keys::AUTHORITY, keys::NEED, keys::TIMELINE]
        {
            if !seen.contains(required) {
                return Err(ConfigError::Validation(format!(
                    "profile.bant_fields must configure the `{required}` key"
                )));
            }
        }

        for phase in SpinPhase::ALL {
            let matching = self.phases.iter().filter(|config| config.phase == phase).count();
            if matching != 1 {
                return Err(ConfigError::Validation(format!(
                    "profile.phases must configure `{phase}` exactly once (found {matching})"
                )));
            }
        }

        for config in &self.phases {
            let issues = self.style.check(&config.fallback_question);
            if !issues.is_empty() {
                let issues = issues.iter().map(ToString::to_string).collect::<Vec<_>>();
                return Err(ConfigError::Validation(format!(
                    "fallback question for `{}` breaks the style rules: {}",
                    config.phase,
                    issues.join("; ")
                )));
            }
        }

        for (name, temperature) in
            [("plan", self.models.plan_temperature), ("write", self.models.write_temperature)]
        {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::Validation(format!(
                    "profile.models.{name}_temperature must be in range 0.0..=2.0"
                )));
            }
        }

        if self.style.max_lines == 0 {
            return Err(ConfigError::Validation("profile.style.max_lines must be greater than zero".into()));
        }
        if self.support.escalation_turns == 0 {
            return Err(ConfigError::Validation(
                "profile.support.escalation_turns must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

fn matched(signals: &[String], message: &str) -> Vec<String> {
    let lowered = message.to_lowercase();
    signals
        .iter()
        .filter(|signal| contains_phrase(&lowered, &signal.to_lowercase()))
        .cloned()
        .collect()
}

fn phase(
    phase: SpinPhase,
    objective: &str,
    tone: &str,
    technique: &str,
    advance_signals: &[&str],
    regression_signals: &[&str],
    fallback_question: &str,
) -> PhaseConfig {
    PhaseConfig {
        phase,
        objective: objective.to_string(),
        tone: tone.to_string(),
        technique: technique.to_string(),
        advance_signals: advance_signals.iter().map(|item| (*item).to_string()).collect(),
        regression_signals: regression_signals.iter().map(|item| (*item).to_string()).collect(),
        fallback_question: fallback_question.to_string(),
    }
}

fn default_phases() -> Vec<PhaseConfig> {
    let resistance = ["not interested", "stop messaging", "leave me alone", "unsubscribe"];
    vec![
        phase(
            SpinPhase::Situation,
            "Understand how the lead works today and the main pain behind the inquiry",
            "curious and light",
            "mirroring",
            &["problem", "struggle", "issue", "losing", "frustrated", "too slow"],
            &resistance,
            "What is the biggest challenge with following up on leads right now?",
        ),
        phase(
            SpinPhase::Problem,
            "Size the problem and learn whether money is set aside to fix it",
            "calm and specific",
            "labeling",
            &["budget", "spend", "cost", "invest", "paying"],
            &["no problem", "works fine", "all good"],
            "Have you set aside a budget to fix this?",
        ),
        phase(
            SpinPhase::Implication,
            "Explore what the problem costs if nothing changes and who decides on a fix",
            "serious and empathetic",
            "consequence framing",
            &["i decide", "my call", "my boss", "the team decides", "approval"],
            &resistance,
            "Who else would be involved in choosing a solution like this?",
        ),
        phase(
            SpinPhase::NeedPayoff,
            "Let the lead describe the value of solving the problem in their own words",
            "optimistic",
            "future pacing",
            &["would help", "would save", "that would", "need this", "exactly"],
            &["not a priority", "maybe later"],
            "How would things change for your team if this were solved?",
        ),
        phase(
            SpinPhase::Closing,
            "Confirm the timeline and propose the next step",
            "confident and brief",
            "assumptive close",
            &["let's do it", "sounds good", "book", "schedule", "call"],
            &resistance,
            "When would you want to have this running?",
        ),
    ]
}

fn default_objections() -> Vec<ObjectionReframe> {
    let objection = |category: &str, keywords: &[&str], reframe: &str| ObjectionReframe {
        category: category.to_string(),
        keywords: keywords.iter().map(|item| (*item).to_string()).collect(),
        reframe: reframe.to_string(),
    };
    vec![
        objection(
            "price",
            &["expensive", "too much", "price", "pricey", "can't afford"],
            "Compare the monthly cost with the deals lost to slow follow-up",
        ),
        objection(
            "timing",
            &["not now", "bad time", "too busy", "next year"],
            "Setup takes one afternoon, and every week of delay keeps costing leads",
        ),
        objection(
            "trust",
            &["not sure it works", "scam", "proof", "reviews", "guarantee"],
            "Offer a concrete example from a similar customer and a low-risk pilot",
        ),
        objection(
            "competitor",
            &["already use", "already have", "another tool", "competitor"],
            "Acknowledge the current tool and ask what it still leaves uncovered",
        ),
        objection(
            "authority",
            &["talk to my boss", "need approval", "check with", "not my decision"],
            "Offer material the lead can share internally with the decision maker",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::AgentProfile;
    use crate::config::ConfigError;
    use crate::flows::states::SpinPhase;

    #[test]
    fn default_profile_is_valid() {
        let profile = AgentProfile::default();
        profile.validate().expect("built-in profile validates");
        for phase in SpinPhase::ALL {
            assert!(profile.phase(phase).is_some());
        }
    }

    #[test]
    fn duplicate_field_keys_are_rejected() {
        let mut profile = AgentProfile::default();
        let duplicate = profile.bant_fields[0].clone();
        profile.bant_fields.push(duplicate);

        let error = profile.validate().expect_err("duplicate key");
        assert!(matches!(error, ConfigError::Validation(ref message) if message.contains("duplicate")));
    }

    #[test]
    fn stage_data_keys_must_be_configured() {
        let mut profile = AgentProfile::default();
        profile.bant_fields.retain(|field| field.key != "budget");

        let error = profile.validate().expect_err("missing budget key");
        assert!(matches!(error, ConfigError::Validation(ref message) if message.contains("`budget`")));

        let mut profile = AgentProfile::default();
        profile.bant_fields.retain(|field| field.key != "current_solution");
        profile.validate().expect("current solution is optional");
    }

    #[test]
    fn fallback_questions_must_pass_style_rules() {
        let mut profile = AgentProfile::default();
        profile.phases[1].fallback_question = "Great, tell me about your budget.".to_string();

        let error = profile.validate().expect_err("bad fallback");
        assert!(matches!(error, ConfigError::Validation(ref message) if message.contains("problem")));
    }

    #[test]
    fn missing_phase_is_rejected() {
        let mut profile = AgentProfile::default();
        profile.phases.retain(|config| config.phase != SpinPhase::Closing);
        assert!(profile.validate().is_err());
    }

    #[test]
    fn objections_are_detected_by_keyword() {
        let profile = AgentProfile::default();
        let objection = profile.detect_objection("Honestly it sounds too expensive for us");
        assert_eq!(objection.map(|objection| objection.category.as_str()), Some("price"));
        assert!(profile.detect_objection("tell me more").is_none());
        assert!(profile.find_objection("Timing").is_some());
    }

    #[test]
    fn regression_signals_are_matched_per_phase() {
        let profile = AgentProfile::default();
        let situation = profile.phase(SpinPhase::Situation).expect("configured");
        assert_eq!(
            situation.matched_regression_signals("I'm not interested, thanks"),
            vec!["not interested".to_string()]
        );
        assert!(situation.matched_regression_signals("interesting idea").is_empty());
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("profile.toml");
        fs::write(
            &path,
            r#"
[business]
name = "Acme Solar"
cta = "a free roof assessment"

[models]
write_temperature = 0.4

[style]
max_lines = 3
"#,
        )
        .expect("write profile");

        let profile = AgentProfile::load(&path).expect("profile loads");
        assert_eq!(profile.business.name, "Acme Solar");
        assert_eq!(profile.style.max_lines, 3);
        assert!(!profile.style.banned_openers.is_empty());
        assert_eq!(profile.phases.len(), 5);
        assert!((profile.models.write_temperature - 0.4).abs() < f32::EPSILON);
    }
}
