use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use leadflow_core::archetype::ArchetypeProfile;
use leadflow_core::domain::bant::BantFieldStatus;
use leadflow_core::domain::turn::{ConversationTurn, TurnRole};
use leadflow_core::profile::{BusinessProfile, ObjectionReframe, PhaseConfig};

use crate::llm::ChatMessage;
use crate::planner::WriterInstructions;

const PLAN_TEMPLATE: &str = "plan";
const WRITE_TEMPLATE: &str = "write";
const REPAIR_TEMPLATE: &str = "repair";
const SUPPORT_ANALYZE_TEMPLATE: &str = "support_analyze";
const SUPPORT_RESPOND_TEMPLATE: &str = "support_respond";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template `{name}` failed to load: {detail}")]
    Load { name: &'static str, detail: String },
    #[error("prompt template `{name}` failed to render: {detail}")]
    Render { name: &'static str, detail: String },
}

#[derive(Serialize)]
pub struct PlanBriefing<'a> {
    pub business: &'a BusinessProfile,
    pub phase: &'a PhaseConfig,
    pub outstanding: Vec<&'a BantFieldStatus>,
    pub collected: Vec<&'a BantFieldStatus>,
    pub field_keys: Vec<&'a str>,
    pub objection_categories: Vec<&'a str>,
    pub archetype: &'a ArchetypeProfile,
    pub history: Vec<&'a ConversationTurn>,
    pub message: &'a str,
}

#[derive(Serialize)]
pub struct WriteBriefing<'a> {
    pub business: &'a BusinessProfile,
    pub phase: &'a PhaseConfig,
    pub archetype: &'a ArchetypeProfile,
    pub avoid: Vec<&'a str>,
    pub instructions: &'a WriterInstructions,
    pub objection: Option<&'a ObjectionReframe>,
    pub target_field: Option<&'a BantFieldStatus>,
    pub max_lines: usize,
    pub banned_openers: &'a [String],
    pub banned_phrases: &'a [String],
    #[serde(skip)]
    pub history: Vec<&'a ConversationTurn>,
}

#[derive(Serialize)]
pub struct SupportAnalyzeBriefing<'a> {
    pub business: &'a BusinessProfile,
    pub state: &'a str,
    pub category: &'a str,
    pub priority: &'a str,
    pub summary: Option<&'a str>,
    pub history: Vec<&'a ConversationTurn>,
    #[serde(skip)]
    pub message: &'a str,
}

#[derive(Serialize)]
pub struct SupportRespondBriefing<'a> {
    pub business: &'a BusinessProfile,
    pub state: &'a str,
    pub category: &'a str,
    pub summary: Option<&'a str>,
    pub goal: &'a str,
    pub max_chars: usize,
    #[serde(skip)]
    pub history: Vec<&'a ConversationTurn>,
}

#[derive(Serialize)]
struct RepairContext<'a> {
    draft: &'a str,
    issues: &'a [String],
}

/// Renders the prompt templates shipped with the crate.
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        let templates = [
            (PLAN_TEMPLATE, include_str!("../templates/plan.tera")),
            (WRITE_TEMPLATE, include_str!("../templates/write.tera")),
            (REPAIR_TEMPLATE, include_str!("../templates/repair.tera")),
            (SUPPORT_ANALYZE_TEMPLATE, include_str!("../templates/support_analyze.tera")),
            (SUPPORT_RESPOND_TEMPLATE, include_str!("../templates/support_respond.tera")),
        ];
        for (name, source) in templates {
            tera.add_raw_template(name, source)
                .map_err(|e| PromptError::Load { name, detail: e.to_string() })?;
        }
        Ok(Self { tera })
    }

    pub fn plan_messages(&self, briefing: &PlanBriefing<'_>) -> Result<Vec<ChatMessage>, PromptError> {
        let system = self.render(PLAN_TEMPLATE, briefing)?;
        Ok(vec![
            ChatMessage::system(system),
            ChatMessage::user(format!("Newest lead message: {}", briefing.message)),
        ])
    }

    pub fn write_messages(
        &self,
        briefing: &WriteBriefing<'_>,
    ) -> Result<Vec<ChatMessage>, PromptError> {
        let system = self.render(WRITE_TEMPLATE, briefing)?;
        Ok(with_history(system, &briefing.history))
    }

    pub fn repair_messages(
        &self,
        draft: &str,
        issues: &[String],
    ) -> Result<Vec<ChatMessage>, PromptError> {
        let system = self.render(REPAIR_TEMPLATE, &RepairContext { draft, issues })?;
        Ok(vec![ChatMessage::system(system), ChatMessage::user("Rewrite the draft now.")])
    }

    pub fn support_analyze_messages(
        &self,
        briefing: &SupportAnalyzeBriefing<'_>,
    ) -> Result<Vec<ChatMessage>, PromptError> {
        let system = self.render(SUPPORT_ANALYZE_TEMPLATE, briefing)?;
        Ok(vec![
            ChatMessage::system(system),
            ChatMessage::user(format!("Newest customer message: {}", briefing.message)),
        ])
    }

    pub fn support_respond_messages(
        &self,
        briefing: &SupportRespondBriefing<'_>,
    ) -> Result<Vec<ChatMessage>, PromptError> {
        let system = self.render(SUPPORT_RESPOND_TEMPLATE, briefing)?;
        Ok(with_history(system, &briefing.history))
    }

    fn render<T: Serialize>(&self, name: &'static str, value: &T) -> Result<String, PromptError> {
        let context = Context::from_serialize(value)
            .map_err(|e| PromptError::Render { name, detail: e.to_string() })?;
        self.tera
            .render(name, &context)
            .map_err(|e| PromptError::Render { name, detail: e.to_string() })
    }
}

fn with_history(system: String, history: &[&ConversationTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().map(|turn| match turn.role {
        TurnRole::User => ChatMessage::user(turn.text.clone()),
        TurnRole::Assistant => ChatMessage::assistant(turn.text.clone()),
    }));
    messages
}

#[cfg(test)]
mod tests {
    use leadflow_core::archetype::Archetype;
    use leadflow_core::domain::bant::{BantSnapshot, BantValues};
    use leadflow_core::domain::turn::{TurnRole, TurnWindow};
    use leadflow_core::flows::SpinPhase;
    use leadflow_core::profile::AgentProfile;

    use super::{PlanBriefing, PromptRenderer, WriteBriefing};
    use crate::llm::MessageRole;
    use crate::planner::WriterInstructions;

    #[test]
    fn plan_prompt_lists_outstanding_fields_and_history() {
        let renderer = PromptRenderer::new().expect("templates load");
        let profile = AgentProfile::default();
        let mut values = BantValues::default();
        values.set("current_solution", "a shared spreadsheet");
        let snapshot = BantSnapshot::build(&profile.bant_fields, &values);
        let mut turns = TurnWindow::default();
        turns.push(TurnRole::User, "we lose leads over the weekend");
        let archetype = Archetype::Analytical.profile();
        let phase = profile.phase(SpinPhase::Situation).expect("situation configured");

        let briefing = PlanBriefing {
            business: &profile.business,
            phase,
            outstanding: snapshot.missing_for_phase(SpinPhase::Situation),
            collected: snapshot.fields.iter().filter(|field| field.collected()).collect(),
            field_keys: profile.bant_fields.iter().map(|field| field.key.as_str()).collect(),
            objection_categories: profile.objections.iter().map(|o| o.category.as_str()).collect(),
            archetype: &archetype,
            history: turns.iter().collect(),
            message: "we lose leads over the weekend",
        };

        let messages = renderer.plan_messages(&briefing).expect("render");
        assert_eq!(messages.len(), 2);
        let system = &messages[0].content;
        assert!(system.contains("- pain_point: Main pain point"));
        assert!(system.contains("- current_solution = a shared spreadsheet"));
        assert!(system.contains("user: we lose leads over the weekend"));
        assert!(system.contains("situation"));
        assert!(messages[1].content.ends_with("we lose leads over the weekend"));
    }

    #[test]
    fn write_prompt_carries_objection_reframe_and_history() {
        let renderer = PromptRenderer::new().expect("templates load");
        let profile = AgentProfile::default();
        let archetype = Archetype::Balanced.profile();
        let instructions = WriterInstructions {
            hook: "mirror the weekend gap".to_string(),
            ..WriterInstructions::default()
        };
        let mut turns = TurnWindow::default();
        turns.push(TurnRole::User, "sounds expensive");
        let objection = profile.find_objection("price");

        let briefing = WriteBriefing {
            business: &profile.business,
            phase: profile.phase(SpinPhase::Problem).expect("problem configured"),
            archetype: &archetype,
            avoid: vec!["jargon"],
            instructions: &instructions,
            objection,
            target_field: None,
            max_lines: profile.style.max_lines,
            banned_openers: &profile.style.banned_openers,
            banned_phrases: &profile.style.banned_phrases,
            history: turns.iter().collect(),
        };

        let messages = renderer.write_messages(&briefing).expect("render");
        assert!(messages[0].content.contains("Idea: mirror the weekend gap"));
        assert!(messages[0].content.contains("price concern"));
        assert_eq!(messages.last().map(|m| m.role), Some(MessageRole::User));
    }

    #[test]
    fn repair_prompt_enumerates_issues() {
        let renderer = PromptRenderer::new().expect("templates load");
        let issues = vec!["ask exactly one".to_string(), "do not open with `Great`".to_string()];
        let messages = renderer.repair_messages("Great! Why? How?", &issues).expect("render");
        assert!(messages[0].content.contains("- ask exactly one"));
        assert!(messages[0].content.contains("Great! Why? How?"));
    }
}
