use std::io::{self, BufRead, Write};
use std::sync::Arc;

use leadflow_agent::{
    CompletionClient, EngineSettings, HttpCompletionClient, OfflineCompletionClient,
    QualificationEngine, SupportAgent, SupportOutcome, TurnOutcome,
};
use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_core::profile::AgentProfile;
use leadflow_db::{connect_with_config, migrations, SqlSnapshotStore};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use crate::commands::{current_thread_runtime, CommandResult};

/// Agent the session talks to.
pub enum ChatAgent {
    Qualification(QualificationEngine),
    Support(SupportAgent),
}

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Message(&'a str),
    State,
    Qualify,
    Disqualify(&'a str),
    Help,
    Quit,
    Unknown(&'a str),
}

const HELP: &str = "commands: /state, /qualify, /disqualify <reason>, /help, /quit";

pub fn run(options: LoadOptions, key: &str, support: bool) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config);

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let agent = match runtime.block_on(build_agent(&config, support)) {
        Ok(agent) => agent,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("chat", error_class, message, exit_code);
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    match run_session(&runtime, &agent, key, stdin.lock(), stdout.lock()) {
        Ok(()) => CommandResult::silent(),
        Err(error) => CommandResult::failure("chat", "io", error.to_string(), 6),
    }
}

/// Logs go to stderr so they never interleave with the conversation on stdout.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .compact()
        .try_init();
}

async fn build_agent(
    config: &AppConfig,
    support: bool,
) -> Result<ChatAgent, (&'static str, String, u8)> {
    let profile = AgentProfile::load_or_default(config.engine.profile_path.as_deref())
        .map_err(|error| ("agent_profile", error.to_string(), 2u8))?;
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;

    let client: Arc<dyn CompletionClient> = match HttpCompletionClient::from_config(&config.llm) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            tracing::warn!(
                event_name = "cli.chat.completion_offline",
                error = %error,
                "completion client unavailable; replies use fallbacks"
            );
            Arc::new(OfflineCompletionClient)
        }
    };
    let settings = EngineSettings::from_config(config);
    let profile = Arc::new(profile);

    let agent = if support {
        SupportAgent::new(profile, client, Arc::new(SqlSnapshotStore::new(pool)), settings)
            .map(ChatAgent::Support)
    } else {
        QualificationEngine::new(profile, client, Arc::new(SqlSnapshotStore::new(pool)), settings)
            .map(ChatAgent::Qualification)
    };
    agent.map_err(|error| ("engine_setup", error.to_string(), 2u8))
}

/// Reads lines from `input` until EOF or `/quit`, writing replies and status lines to `output`.
pub fn run_session<R: BufRead, W: Write>(
    runtime: &Runtime,
    agent: &ChatAgent,
    key: &str,
    input: R,
    mut output: W,
) -> io::Result<()> {
    writeln!(output, "chatting as `{key}` ({HELP})")?;

    for line in input.lines() {
        let line = line?;
        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => writeln!(output, "{HELP}")?,
            Input::Unknown(command) => writeln!(output, "unknown command `{command}`; {HELP}")?,
            Input::Message(message) => match agent {
                ChatAgent::Qualification(engine) => {
                    match runtime.block_on(engine.process_turn(key, message)) {
                        Ok(outcome) => {
                            writeln!(output, "agent: {}", outcome.reply)?;
                            writeln!(output, "{}", qualification_status(&outcome))?;
                        }
                        Err(error) => writeln!(output, "error: {error}")?,
                    }
                }
                ChatAgent::Support(agent) => {
                    match runtime.block_on(agent.process_turn(key, message)) {
                        Ok(outcome) => {
                            writeln!(output, "agent: {}", outcome.reply)?;
                            writeln!(output, "{}", support_status(&outcome))?;
                        }
                        Err(error) => writeln!(output, "error: {error}")?,
                    }
                }
            },
            Input::State => writeln!(output, "{}", render_state(runtime, agent, key))?,
            Input::Qualify => match agent {
                ChatAgent::Qualification(engine) => {
                    match runtime.block_on(engine.qualify(key)) {
                        Ok(lead) => writeln!(output, "lead is now {}", lead.stage)?,
                        Err(error) => writeln!(output, "error: {error}")?,
                    }
                }
                ChatAgent::Support(_) => writeln!(output, "/qualify needs the qualification engine")?,
            },
            Input::Disqualify(reason) => match agent {
                ChatAgent::Qualification(engine) => {
                    match runtime.block_on(engine.disqualify(key, reason)) {
                        Ok(lead) => writeln!(output, "lead is now {}", lead.stage)?,
                        Err(error) => writeln!(output, "error: {error}")?,
                    }
                }
                ChatAgent::Support(_) => {
                    writeln!(output, "/disqualify needs the qualification engine")?
                }
            },
        }
        output.flush()?;
    }

    Ok(())
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line);
    };

    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    match name {
        "state" => Input::State,
        "qualify" => Input::Qualify,
        "disqualify" => Input::Disqualify(rest.trim()),
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(line),
    }
}

fn qualification_status(outcome: &TurnOutcome) -> String {
    let mut status = format!(
        "[phase {} | stage {} | score {} | progress {}%]",
        outcome.phase, outcome.stage, outcome.score, outcome.progress
    );
    if let Some(phase) = outcome.advanced_to {
        status.push_str(&format!(" advanced to {phase}"));
    }
    if outcome.ready_for_handoff {
        status.push_str(" ready for handoff");
    }
    status
}

fn support_status(outcome: &SupportOutcome) -> String {
    let mut status = format!(
        "[state {} | category {:?} | priority {:?} | turn {}]",
        outcome.state, outcome.category, outcome.priority, outcome.turn_count
    );
    if outcome.escalated {
        status.push_str(" escalated");
    }
    status
}

fn render_state(runtime: &Runtime, agent: &ChatAgent, key: &str) -> String {
    let rendered = match agent {
        ChatAgent::Qualification(engine) => runtime
            .block_on(engine.get_state(key))
            .map(|state| state.map(|snapshot| serde_json::to_string_pretty(&snapshot))),
        ChatAgent::Support(agent) => runtime
            .block_on(agent.get_state(key))
            .map(|state| state.map(|snapshot| serde_json::to_string_pretty(&snapshot))),
    };
    match rendered {
        Ok(Some(Ok(json))) => json,
        Ok(Some(Err(error))) => format!("error: failed to render state: {error}"),
        Ok(None) => format!("no conversation stored for `{key}` yet"),
        Err(error) => format!("error: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leadflow_agent::{
        EngineSettings, OfflineCompletionClient, QualificationEngine, SupportAgent,
    };
    use leadflow_core::domain::conversation::{ConversationSnapshot, SupportSnapshot};
    use leadflow_core::profile::AgentProfile;
    use leadflow_db::InMemorySnapshotStore;

    use super::{parse_input, run_session, ChatAgent, Input};
    use crate::commands::current_thread_runtime;

    fn qualification_agent() -> ChatAgent {
        let engine = QualificationEngine::new(
            Arc::new(AgentProfile::default()),
            Arc::new(OfflineCompletionClient),
            Arc::new(InMemorySnapshotStore::<ConversationSnapshot>::default()),
            EngineSettings::default(),
        )
        .expect("engine");
        ChatAgent::Qualification(engine)
    }

    fn support_agent() -> ChatAgent {
        let agent = SupportAgent::new(
            Arc::new(AgentProfile::default()),
            Arc::new(OfflineCompletionClient),
            Arc::new(InMemorySnapshotStore::<SupportSnapshot>::default()),
            EngineSettings::default(),
        )
        .expect("support agent");
        ChatAgent::Support(agent)
    }

    fn session(agent: &ChatAgent, script: &str) -> String {
        let runtime = current_thread_runtime().expect("runtime");
        let mut output = Vec::new();
        run_session(&runtime, agent, "cli-test", script.as_bytes(), &mut output).expect("session");
        String::from_utf8(output).expect("utf8")
    }

    #[test]
    fn commands_are_parsed_before_messages() {
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(parse_input("hi there"), Input::Message("hi there"));
        assert_eq!(parse_input("/state"), Input::State);
        assert_eq!(parse_input("/disqualify  no budget "), Input::Disqualify("no budget"));
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/frobnicate now"), Input::Unknown("/frobnicate now"));
    }

    #[test]
    fn qualification_turns_print_reply_and_status() {
        let output = session(&qualification_agent(), "hello\n/quit\nignored\n");

        assert!(output.contains("agent: "), "{output}");
        assert!(output.contains("[phase situation | stage discovery"), "{output}");
        assert_eq!(output.matches("agent: ").count(), 1, "lines after /quit are not read");
    }

    #[test]
    fn state_before_first_turn_reports_nothing_stored() {
        let output = session(&qualification_agent(), "/state\n");
        assert!(output.contains("no conversation stored for `cli-test` yet"), "{output}");
    }

    #[test]
    fn disqualify_ends_the_lead() {
        let output = session(&qualification_agent(), "hello\n/disqualify\n/disqualify not a fit\n");

        assert!(output.contains("error: "), "empty reason is rejected: {output}");
        assert!(output.contains("lead is now disqualified"), "{output}");
    }

    #[test]
    fn support_sessions_reject_qualification_commands() {
        let output = session(&support_agent(), "my invoice is wrong\n/qualify\n");

        assert!(output.contains("[state "), "{output}");
        assert!(output.contains("/qualify needs the qualification engine"), "{output}");
    }
}
