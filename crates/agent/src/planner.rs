use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::llm::{CompletionError, CompletionStep};
use crate::prompts::{PlanBriefing, PromptRenderer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterInstructions {
    pub hook: String,
    pub fact: String,
    pub question: String,
    pub avoid: Vec<String>,
}

/// Structured analysis of one lead message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPlan {
    pub sentiment: Sentiment,
    pub intent: String,
    pub extracted: BTreeMap<String, Option<String>>,
    pub should_advance: bool,
    pub advance_reason: String,
    pub objection: Option<String>,
    pub instructions: WriterInstructions,
}

impl TurnPlan {
    /// Minimal plan used when planning fails: ask the exploratory question, hold the phase.
    pub fn fallback(question: &str) -> Self {
        Self {
            intent: "unknown".to_string(),
            advance_reason: "planner unavailable".to_string(),
            instructions: WriterInstructions {
                question: question.to_string(),
                ..WriterInstructions::default()
            },
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlanOutcome {
    Planned(TurnPlan),
    Fallback { plan: TurnPlan, error: CompletionError },
}

impl PlanOutcome {
    pub fn plan(&self) -> &TurnPlan {
        match self {
            Self::Planned(plan) | Self::Fallback { plan, .. } => plan,
        }
    }

    pub fn into_plan(self) -> TurnPlan {
        match self {
            Self::Planned(plan) | Self::Fallback { plan, .. } => plan,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawPlan {
    sentiment: Value,
    intent: Value,
    extracted: BTreeMap<String, Value>,
    should_advance: Value,
    advance_reason: Value,
    objection: Value,
    instructions: WriterInstructions,
}

impl Default for RawPlan {
    fn default() -> Self {
        Self {
            sentiment: Value::Null,
            intent: Value::Null,
            extracted: BTreeMap::new(),
            should_advance: Value::Bool(false),
            advance_reason: Value::Null,
            objection: Value::Null,
            instructions: WriterInstructions::default(),
        }
    }
}

/// Parses planner output. Unknown field keys are dropped; scalar values are stringified.
pub fn parse_plan(raw: &str, field_keys: &[&str]) -> Result<TurnPlan, CompletionError> {
    let body = json_object_slice(raw)
        .ok_or_else(|| CompletionError::Malformed("no JSON object in plan output".to_string()))?;
    let parsed: RawPlan =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;

    let extracted = parsed
        .extracted
        .into_iter()
        .filter(|(key, _)| field_keys.contains(&key.as_str()))
        .map(|(key, value)| (key, scalar_text(&value)))
        .collect();

    Ok(TurnPlan {
        sentiment: scalar_text(&parsed.sentiment)
            .and_then(|text| serde_json::from_value(Value::String(text.to_ascii_lowercase())).ok())
            .unwrap_or_default(),
        intent: scalar_text(&parsed.intent).unwrap_or_default(),
        extracted,
        should_advance: truthy(&parsed.should_advance),
        advance_reason: scalar_text(&parsed.advance_reason).unwrap_or_default(),
        objection: scalar_text(&parsed.objection).filter(|category| !is_none_marker(category)),
        instructions: parsed.instructions,
    })
}

fn json_object_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

fn is_none_marker(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "none" | "null" | "n/a")
}

/// Plan step: one JSON completion, falling back to a minimal plan on any failure.
pub struct Planner {
    step: CompletionStep,
}

impl Planner {
    pub fn new(step: CompletionStep) -> Self {
        Self { step }
    }

    pub async fn plan(
        &self,
        prompts: &PromptRenderer,
        briefing: &PlanBriefing<'_>,
        fallback_question: &str,
    ) -> PlanOutcome {
        let result = match prompts.plan_messages(briefing) {
            Ok(messages) => self.step.run(messages, true).await,
            Err(error) => Err(CompletionError::Configuration(error.to_string())),
        };

        match result.and_then(|raw| parse_plan(&raw, &briefing.field_keys)) {
            Ok(plan) => PlanOutcome::Planned(plan),
            Err(error) => {
                warn!(
                    event_name = "engine.plan.fallback",
                    phase = briefing.phase.phase.as_str(),
                    error = %error,
                    "plan step degraded to fallback"
                );
                PlanOutcome::Fallback { plan: TurnPlan::fallback(fallback_question), error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_plan, PlanOutcome, Sentiment, TurnPlan};
    use crate::llm::CompletionError;

    const KEYS: &[&str] = &["pain_point", "urgency", "budget"];

    #[test]
    fn parses_fenced_plan_and_filters_unknown_keys() {
        let raw = r#"Here you go:
```json
{
  "sentiment": "Negative",
  "intent": "describe problem",
  "extracted": { "pain_point": "leads go cold", "budget": null, "favorite_color": "blue", "urgency": 9 },
  "should_advance": "true",
  "advance_reason": "pain and urgency stated",
  "objection": "none",
  "instructions": { "hook": "cold leads hurt", "question": "How fast do you reply today?" }
}
```"#;

        let plan = parse_plan(raw, KEYS).expect("plan parses");
        assert_eq!(plan.sentiment, Sentiment::Negative);
        assert_eq!(plan.extracted.get("pain_point"), Some(&Some("leads go cold".to_string())));
        assert_eq!(plan.extracted.get("budget"), Some(&None));
        assert_eq!(plan.extracted.get("urgency"), Some(&Some("9".to_string())));
        assert!(!plan.extracted.contains_key("favorite_color"));
        assert!(plan.should_advance);
        assert_eq!(plan.objection, None);
        assert_eq!(plan.instructions.hook, "cold leads hurt");
        assert!(plan.instructions.fact.is_empty());
    }

    #[test]
    fn missing_fields_default_to_holding_the_phase() {
        let plan = parse_plan("{\"intent\": \"greeting\"}", KEYS).expect("plan parses");
        assert!(!plan.should_advance);
        assert!(plan.extracted.is_empty());
        assert_eq!(plan.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn prose_output_is_malformed() {
        let error = parse_plan("I think the lead is interested.", KEYS).expect_err("no json");
        assert!(matches!(error, CompletionError::Malformed(_)));

        let broken = parse_plan("{ \"intent\": ", KEYS).expect_err("truncated json");
        assert!(matches!(broken, CompletionError::Malformed(_)));
    }

    #[test]
    fn fallback_plan_never_advances_or_extracts() {
        let plan = TurnPlan::fallback("What slows your team down today?");
        let outcome = PlanOutcome::Fallback { plan, error: CompletionError::EmptyResponse };

        assert!(outcome.is_fallback());
        assert!(!outcome.plan().should_advance);
        assert!(outcome.plan().extracted.is_empty());
        assert_eq!(outcome.plan().instructions.question, "What slows your team down today?");
    }
}
