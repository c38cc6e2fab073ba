use leadflow_agent::HttpCompletionClient;
use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_core::profile::AgentProfile;
use leadflow_db::{connect_with_config, migrations};
use serde::Serialize;

use crate::commands::current_thread_runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Returns the exit code and the rendered report.
pub fn run(options: LoadOptions, json_output: bool) -> (u8, String) {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (exit_code, output);
    }

    (exit_code, render_human(&report))
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_profile(&config));
            checks.push(check_completion_client(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["agent_profile", "completion_client", "database"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let overall_status = overall(&checks);
    let summary = match overall_status {
        CheckStatus::Pass => "doctor: all readiness checks passed",
        CheckStatus::Warn => "doctor: ready, with warnings",
        _ => "doctor: one or more readiness checks failed",
    }
    .to_string();

    DoctorReport { overall_status, summary, checks }
}

fn overall(checks: &[DoctorCheck]) -> CheckStatus {
    if checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped)) {
        CheckStatus::Fail
    } else if checks.iter().any(|check| check.status == CheckStatus::Warn) {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    }
}

fn check_profile(config: &AppConfig) -> DoctorCheck {
    let loaded = AgentProfile::load_or_default(config.engine.profile_path.as_deref())
        .and_then(|profile| profile.validate().map(|()| profile));
    match loaded {
        Ok(profile) => DoctorCheck {
            name: "agent_profile",
            status: CheckStatus::Pass,
            details: match &config.engine.profile_path {
                Some(path) => format!("profile `{}` loaded from {}", profile.business.name, path.display()),
                None => format!("built-in profile `{}` in use", profile.business.name),
            },
        },
        Err(error) => {
            DoctorCheck { name: "agent_profile", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

/// A missing completion client is only a warning: every step has a deterministic fallback.
fn check_completion_client(config: &AppConfig) -> DoctorCheck {
    match HttpCompletionClient::from_config(&config.llm) {
        Ok(_) => DoctorCheck {
            name: "completion_client",
            status: CheckStatus::Pass,
            details: format!(
                "provider `{}` with model `{}`",
                config.llm.provider.as_str(),
                config.llm.model
            ),
        },
        Err(error) => DoctorCheck {
            name: "completion_client",
            status: CheckStatus::Warn,
            details: format!("{error}; replies will use canned fallbacks"),
        },
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| format!("failed to inspect migrations: {error}"));
        pool.close().await;
        pending
    });

    match result {
        Ok(0) => DoctorCheck {
            name: "database",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; schema up to date", config.database.url),
        },
        Ok(pending) => DoctorCheck {
            name: "database",
            status: CheckStatus::Warn,
            details: format!("{pending} pending migration(s); run `leadflow migrate`"),
        },
        Err(error) => DoctorCheck { name: "database", status: CheckStatus::Fail, details: error },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use leadflow_core::config::{ConfigOverrides, LlmProvider, LoadOptions};
    use serde_json::Value;

    use super::{overall, run, CheckStatus, DoctorCheck};

    fn check(status: CheckStatus) -> DoctorCheck {
        DoctorCheck { name: "sample", status, details: String::new() }
    }

    #[test]
    fn warnings_do_not_fail_the_report() {
        assert_eq!(overall(&[check(CheckStatus::Pass), check(CheckStatus::Warn)]), CheckStatus::Warn);
        assert_eq!(overall(&[check(CheckStatus::Pass)]), CheckStatus::Pass);
        assert_eq!(overall(&[check(CheckStatus::Warn), check(CheckStatus::Skipped)]), CheckStatus::Fail);
    }

    #[test]
    fn json_report_lists_every_check() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (exit_code, output) = run(
            LoadOptions {
                overrides: ConfigOverrides {
                    database_url: Some(format!(
                        "sqlite://{}",
                        dir.path().join("doctor.db").display()
                    )),
                    llm_provider: Some(LlmProvider::Ollama),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            },
            true,
        );

        let report: Value = serde_json::from_str(&output).expect("json report");
        let names = report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["config_validation", "agent_profile", "completion_client", "database"]);
        // fresh database has pending migrations, which only warns
        assert_eq!(report["checks"][3]["status"], "warn");
        assert_eq!(exit_code, 0);
    }

    #[test]
    fn missing_config_file_fails_and_skips_the_rest() {
        let (exit_code, output) = run(
            LoadOptions {
                config_path: Some("/nonexistent/leadflow.toml".into()),
                require_file: true,
                ..LoadOptions::default()
            },
            false,
        );
        assert_eq!(exit_code, 1);
        assert!(output.contains("[fail] config_validation"));
        assert!(output.contains("[skip] database"));
    }
}
