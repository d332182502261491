use clap::Args;
use filmdb::{
    FilmdbConfig, InitReport, MemoryBackend, OutputFormat, SchemaError, SchemaManager,
    SchemaStatus,
};
use serde::Serialize;

use super::{connect, fail, render_table};

/// Confirmation printed once after a successful initialization
const INIT_MESSAGE: &str = "Database initialized successfully";

/// Arguments for the Init command
#[derive(Args, Default)]
pub struct InitArgs {
    /// Report what would be created without modifying the database
    #[clap(long)]
    pub dry_run: bool,

    /// Print every step, not only the confirmation
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput<'a> {
    message: &'a str,
    dry_run: bool,
    created: usize,
    #[serde(flatten)]
    report: &'a InitReport,
}

pub async fn run(config: &FilmdbConfig, args: InitArgs, output_format: OutputFormat) {
    let InitArgs { dry_run, verbose } = args;
    let conn = connect(config).await;

    if dry_run {
        let copy = match MemoryBackend::snapshot_of(&conn).await {
            Ok(copy) => copy,
            Err(e) => fail(&e),
        };
        let report = match SchemaManager::new(&copy).initialize().await {
            Ok(report) => report,
            Err(e) => fail(&e),
        };
        print_lines(render_report(&report, true, true, output_format));
        return;
    }

    let manager = SchemaManager::new(&conn);
    let report = match manager.initialize().await {
        Ok(report) => report,
        Err(e) => fail(&e),
    };

    // a concurrent initializer may still be building; report, don't fail
    if let Some(warning) = status_warning(manager.check_status().await) {
        tracing::warn!("{}", warning);
    }

    print_lines(render_report(&report, false, verbose, output_format));
}

fn print_lines(lines: serde_json::Result<Vec<String>>) {
    match lines {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            std::process::exit(1);
        }
    }
}

/// Warning for a post-initialization status that is not current
fn status_warning(status: Result<SchemaStatus, SchemaError>) -> Option<String> {
    match status {
        Ok(SchemaStatus::Current) => None,
        Ok(status) => Some(format!("schema status after initialization: {}", status)),
        Err(e) => Some(format!(
            "could not check schema status after initialization: {}",
            e
        )),
    }
}

/// Line summarizing a run; only a real run confirms initialization
fn report_message(report: &InitReport, dry_run: bool) -> String {
    if dry_run {
        format!(
            "Dry run: {} object(s) would be created in '{}'",
            report.created_count(),
            report.database
        )
    } else {
        INIT_MESSAGE.to_string()
    }
}

/// Output of an init run
///
/// JSON formats produce a single object carrying the summary as `message`;
/// table formats produce the optional steps table followed by the summary.
fn render_report(
    report: &InitReport,
    dry_run: bool,
    show_steps: bool,
    output_format: OutputFormat,
) -> serde_json::Result<Vec<String>> {
    let message = report_message(report, dry_run);
    let output = InitOutput {
        message: &message,
        dry_run,
        created: report.created_count(),
        report,
    };
    if let Some(json) = output_format.to_json(&output) {
        return Ok(vec![json?]);
    }

    let mut lines = Vec::new();
    if show_steps {
        lines.push(render_table(&report.steps, output_format));
    }
    lines.push(message);
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filmdb::{InitStep, StepAction, StepKind};

    fn report(action: StepAction) -> InitReport {
        InitReport {
            database: "film_assist_db".to_string(),
            steps: vec![
                InitStep {
                    kind: StepKind::Collection,
                    target: "users".to_string(),
                    action,
                },
                InitStep {
                    kind: StepKind::Index,
                    target: "users.email_1".to_string(),
                    action,
                },
            ],
        }
    }

    fn confirmations(lines: &[String]) -> usize {
        lines
            .iter()
            .map(|line| line.matches(INIT_MESSAGE).count())
            .sum()
    }

    #[test]
    fn test_confirmation_printed_once() {
        let report = report(StepAction::Created);

        for format in [OutputFormat::Table, OutputFormat::Markdown] {
            let lines = render_report(&report, false, false, format).unwrap();
            assert_eq!(lines, vec![INIT_MESSAGE.to_string()]);

            let lines = render_report(&report, false, true, format).unwrap();
            assert_eq!(lines.len(), 2);
            assert_eq!(confirmations(&lines), 1);
            assert_eq!(lines.last().unwrap(), INIT_MESSAGE);
        }

        // a no-op run still confirms
        let lines =
            render_report(&self::report(StepAction::Present), false, false, OutputFormat::Table)
                .unwrap();
        assert_eq!(confirmations(&lines), 1);
    }

    #[test]
    fn test_dry_run_never_confirms() {
        let report = report(StepAction::Created);

        for format in [
            OutputFormat::Table,
            OutputFormat::Markdown,
            OutputFormat::Json,
            OutputFormat::JsonPretty,
            OutputFormat::JsonLine,
        ] {
            let lines = render_report(&report, true, true, format).unwrap();
            assert_eq!(confirmations(&lines), 0);
            assert!(lines
                .iter()
                .any(|line| line.contains("2 object(s) would be created in 'film_assist_db'")));
        }
    }

    #[test]
    fn test_status_warning() {
        assert_eq!(status_warning(Ok(SchemaStatus::Current)), None);

        let incomplete = SchemaStatus::Incomplete {
            missing_collections: vec![],
            missing_indexes: vec!["stories.user_id_1".to_string()],
        };
        assert_eq!(
            status_warning(Ok(incomplete)).unwrap(),
            "schema status after initialization: incomplete"
        );

        let err = SchemaError::Connection {
            message: "server selection failed: timed out".to_string(),
        };
        let warning = status_warning(Err(err)).unwrap();
        assert!(warning.starts_with("could not check schema status"));
        assert!(warning.contains("timed out"));
    }

    #[test]
    fn test_json_carries_confirmation_as_message() {
        let report = report(StepAction::Created);

        for format in [
            OutputFormat::Json,
            OutputFormat::JsonPretty,
            OutputFormat::JsonLine,
        ] {
            let lines = render_report(&report, false, true, format).unwrap();
            assert_eq!(lines.len(), 1);
            assert_eq!(confirmations(&lines), 1);

            let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
            assert_eq!(value["message"], INIT_MESSAGE);
            assert_eq!(value["dry_run"], false);
            assert_eq!(value["created"], 2);
            assert_eq!(value["database"], "film_assist_db");
        }
    }
}
