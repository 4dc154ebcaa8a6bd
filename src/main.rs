mod api;
mod config;
mod config_wizard;
mod error;
mod models;
mod search;
mod session;
#[cfg(test)]
mod test_support;
mod tui;
mod utils;

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::SearchError;
use crate::models::search::{cell_text, JobStatus};
use crate::search::SearchClient;
use crate::session::{SearchRequest, SearchSession, SearchState};
use clap::{Parser, Subcommand, ValueEnum};
use simplelog::*;
use std::fs::File;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(name = "vibesearch")]
#[command(about = "A terminal console for search jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configuration wizard
    Config,
    /// Run one search without the TUI and print its results
    Search {
        /// Query text
        #[arg(short, long)]
        query: String,
        /// Earliest time (YYYY-MM-DDTHH:MM or RFC 3339), defaults to 24h ago
        #[arg(long)]
        earliest: Option<String>,
        /// Latest time (YYYY-MM-DDTHH:MM or RFC 3339), defaults to now
        #[arg(long)]
        latest: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Ndjson)]
        format: OutputFormat,
        /// Also print the job timeline to stderr
        #[arg(long)]
        timeline: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Ndjson,
    Table,
}

pub fn build_session(config: &Config) -> Result<SearchSession, SearchError> {
    let client = SearchClient::new(ApiClient::new(config)?);
    Ok(SearchSession::new(
        client,
        config.max_wait(),
        config.poll_interval(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    match args.command {
        Some(Commands::Config) => {
            config_wizard::run()?;
        }
        Some(Commands::Search {
            query,
            earliest,
            latest,
            format,
            timeline,
        }) => {
            let _ = TermLogger::init(
                LevelFilter::Warn,
                simplelog::Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            );
            let (default_earliest, default_latest) = utils::time_range::default_inputs();
            let request = SearchRequest {
                query,
                earliest: earliest.unwrap_or(default_earliest),
                latest: latest.unwrap_or(default_latest),
            };
            run_headless(&Config::load()?, request, format, timeline).await?;
        }
        None => {
            let _ = WriteLogger::init(
                LevelFilter::Info,
                simplelog::Config::default(),
                File::create("vibesearch.log")?,
            );
            log::info!("Application started");
            tui::run_app(Config::load()?).await?;
        }
    }
    Ok(())
}

async fn run_headless(
    config: &Config,
    request: SearchRequest,
    format: OutputFormat,
    show_timeline: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(config)?;
    let state = Mutex::new(SearchState::default());
    session.run(&request, &state).await?;

    let state = state.into_inner();
    match format {
        OutputFormat::Ndjson => {
            for row in &state.results {
                println!("{}", serde_json::to_string(row)?);
            }
        }
        OutputFormat::Table => {
            for line in render_plain_table(&state) {
                println!("{}", line);
            }
        }
    }

    if let Some(info) = &state.info {
        eprintln!(
            "job {} {} ({} events)",
            info.id,
            state.job_status.unwrap_or(JobStatus::Completed),
            info.event_count
        );
    }
    if show_timeline {
        match &state.timeline {
            Some(t) => {
                for bucket in &t.buckets {
                    eprintln!(
                        "{}\t{}s\t{}",
                        bucket.earliest, bucket.duration, bucket.event_count
                    );
                }
                eprintln!("total\t\t{}", t.total_event_count);
            }
            None => eprintln!("timeline unavailable"),
        }
    }
    Ok(())
}

/// Tab-separated header plus one line per row, columns from the first row.
fn render_plain_table(state: &SearchState) -> Vec<String> {
    if state.columns.is_empty() {
        return vec!["No results found".to_string()];
    }
    let header = state
        .columns
        .iter()
        .map(|c| c.header_name.as_str())
        .collect::<Vec<_>>()
        .join("\t");
    let mut lines = vec![header];
    lines.extend(state.results.iter().map(|row| {
        state
            .columns
            .iter()
            .map(|c| cell_text(row, &c.field).replace(['\t', '\n'], " "))
            .collect::<Vec<_>>()
            .join("\t")
    }));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::search::column_defs;
    use serde_json::json;

    #[test]
    fn cli_parses_search_subcommand() {
        let cli = Cli::try_parse_from([
            "vibesearch",
            "search",
            "-q",
            "dataset=\"logs\" | limit 10",
            "--earliest",
            "2024-01-01T00:00",
            "--format",
            "table",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Search {
                query,
                earliest,
                latest,
                format,
                timeline,
            }) => {
                assert_eq!(query, "dataset=\"logs\" | limit 10");
                assert_eq!(earliest.as_deref(), Some("2024-01-01T00:00"));
                assert!(latest.is_none());
                assert!(matches!(format, OutputFormat::Table));
                assert!(!timeline);
            }
            _ => panic!("expected search subcommand"),
        }
    }

    #[test]
    fn plain_table_uses_first_row_columns() {
        let results = vec![
            json!({"host": "a", "msg": "line one\nline two"})
                .as_object()
                .cloned()
                .unwrap(),
            json!({"host": "b", "extra": 1}).as_object().cloned().unwrap(),
        ];
        let state = SearchState {
            columns: column_defs(&results),
            results,
            ..SearchState::default()
        };
        assert_eq!(
            render_plain_table(&state),
            vec!["host\tmsg", "a\tline one line two", "b\t"]
        );
    }

    #[test]
    fn plain_table_without_rows() {
        assert_eq!(
            render_plain_table(&SearchState::default()),
            vec!["No results found"]
        );
    }

    #[test]
    fn session_builds_from_default_config() {
        assert!(build_session(&Config::default()).is_ok());
    }
}
