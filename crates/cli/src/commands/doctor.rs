use hitter_core::config::{AppConfig, LoadOptions};
use hitter_db::{connect_with_settings, migrations};
use serde::Serialize;

use crate::commands::CommandResult;

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

/// Exit code 7 when any check fails. Warnings alone still exit 0.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 7 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_request_verification(&config));
            checks.push(check_staging_secret(&config));
            checks.push(check_translation(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in [
                "request_verification",
                "staging_signing_secret",
                "translation_backend",
                "database_connectivity",
                "schema_migrations",
            ] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = if failed {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else if warned {
        (CheckStatus::Warn, "doctor: ready, with warnings")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_request_verification(config: &AppConfig) -> DoctorCheck {
    if config.slack.signing_secret.is_some() {
        DoctorCheck {
            name: "request_verification",
            status: CheckStatus::Pass,
            details: "verification token and v0 request signatures are checked".to_string(),
        }
    } else {
        DoctorCheck {
            name: "request_verification",
            status: CheckStatus::Warn,
            details: "only the verification token is checked; set SLACK_SIGNING_SECRET to verify signatures".to_string(),
        }
    }
}

fn check_staging_secret(config: &AppConfig) -> DoctorCheck {
    if config.staging.signing_secret.is_some() {
        DoctorCheck {
            name: "staging_signing_secret",
            status: CheckStatus::Pass,
            details: format!("object links signed for `{}`", config.staging_public_base_url()),
        }
    } else {
        DoctorCheck {
            name: "staging_signing_secret",
            status: CheckStatus::Warn,
            details: "no HITTER_STAGING_SIGNING_SECRET; links issued by one server process stop working after it restarts".to_string(),
        }
    }
}

fn check_translation(config: &AppConfig) -> DoctorCheck {
    match config.translate.base_url.as_deref() {
        Some(base_url) => DoctorCheck {
            name: "translation_backend",
            status: CheckStatus::Pass,
            details: format!("translate requests go to `{base_url}`"),
        },
        None => DoctorCheck {
            name: "translation_backend",
            status: CheckStatus::Skipped,
            details: "HITTER_TRANSLATE_BASE_URL is unset; `translate` replies with an error"
                .to_string(),
        },
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let applied = migrations::applied_count(&pool).await;
        pool.close().await;
        Ok::<_, String>(applied)
    });

    match result {
        Ok(applied) => {
            let known = migrations::known_count();
            let schema = match applied {
                Ok(applied) if applied >= known => DoctorCheck {
                    name: "schema_migrations",
                    status: CheckStatus::Pass,
                    details: format!("{applied}/{known} migrations applied"),
                },
                Ok(applied) => DoctorCheck {
                    name: "schema_migrations",
                    status: CheckStatus::Warn,
                    details: format!(
                        "{applied}/{known} migrations applied; run `hitter migrate` (the server also migrates on start)"
                    ),
                },
                Err(error) => DoctorCheck {
                    name: "schema_migrations",
                    status: CheckStatus::Fail,
                    details: format!("could not read migration state: {error}"),
                },
            };
            vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Pass,
                    details: format!("connected using `{}`", config.database.url),
                },
                schema,
            ]
        }
        Err(error) => vec![
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: error,
            },
            DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Skipped,
                details: "skipped because the database is unreachable".to_string(),
            },
        ],
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
