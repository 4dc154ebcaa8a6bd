use crate::error::SearchError;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One matched event. The field set is not known ahead of time.
pub type SearchResult = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
    /// A status string this client does not recognise. Never terminal.
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Unknown => "unknown",
        }
    }

    /// Missing or empty status strings mean the server has not scheduled the job yet.
    /// Unrecognised strings map to [`JobStatus::Unknown`] so polling carries on.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            None | Some("") => JobStatus::Pending,
            Some(s) => s.parse().unwrap_or_else(|e| {
                warn!("{}, treating the job as still in progress", e);
                JobStatus::Unknown
            }),
        }
    }
}

impl FromStr for JobStatus {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            other => Err(SearchError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchJob {
    pub id: String,
    pub query: String,
    pub status: JobStatus,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub event_count: Option<u64>,
}

/// Body of `POST .../jobs`.
#[derive(Debug, Serialize)]
pub struct CreateJobRequest<'a> {
    pub search: &'a str,
    pub earliest_time: i64,
    pub latest_time: i64,
}

/// Job payload as the backend sends it, before defaults are applied.
#[derive(Debug, Deserialize)]
pub struct JobEnvelope {
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Kept loose; only unsigned integers are taken as a count.
    #[serde(rename = "eventCount", default)]
    pub event_count: Option<Value>,
}

/// Info line of a results body. Fields other than sid/status/eventCount land in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub id: String,
    pub status: JobStatus,
    pub event_count: u64,
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResults {
    pub info: JobInfo,
    pub results: Vec<SearchResult>,
}

impl JobResults {
    pub fn empty(job_id: &str) -> Self {
        Self {
            info: JobInfo {
                id: job_id.to_string(),
                status: JobStatus::Pending,
                event_count: 0,
                extra: Map::new(),
            },
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineBucket {
    pub duration: f64,
    pub earliest: f64,
    #[serde(rename = "eventCount")]
    pub event_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TimeLine {
    #[serde(default)]
    pub buckets: Vec<TimelineBucket>,
    #[serde(rename = "totalEventCount", default)]
    pub total_event_count: u64,
}

impl TimeLine {
    pub fn counts(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.event_count).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub field: String,
    pub header_name: String,
    pub min_width: u16,
}

pub const MIN_COLUMN_WIDTH: u16 = 10;

/// Columns come from the keys of the first row, in that row's order.
pub fn column_defs(results: &[SearchResult]) -> Vec<ColumnDef> {
    let Some(first) = results.first() else {
        return Vec::new();
    };
    first
        .keys()
        .map(|key| ColumnDef {
            field: key.clone(),
            header_name: key.clone(),
            min_width: MIN_COLUMN_WIDTH,
        })
        .collect()
}

/// Renders a cell the way a grid would: strings bare, everything else as JSON.
pub fn cell_text(row: &SearchResult, field: &str) -> String {
    match row.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> SearchResult {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Unknown.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
    }

    #[test]
    fn missing_status_is_pending() {
        assert_eq!(JobStatus::from_wire(None), JobStatus::Pending);
        assert_eq!(JobStatus::from_wire(Some("")), JobStatus::Pending);
        assert_eq!(JobStatus::from_wire(Some("running")), JobStatus::Running);
    }

    #[test]
    fn unrecognised_status_keeps_the_job_open() {
        assert_eq!(JobStatus::from_wire(Some("queued")), JobStatus::Unknown);
        assert_eq!(JobStatus::from_wire(Some("Completed")), JobStatus::Unknown);
        assert!(matches!(
            "queued".parse::<JobStatus>(),
            Err(SearchError::UnknownStatus(s)) if s == "queued"
        ));
    }

    #[test]
    fn columns_follow_first_row_key_order() {
        let results = vec![
            row(json!({"zeta": 1, "alpha": "x", "_time": 3})),
            row(json!({"other": true})),
        ];
        let fields: Vec<String> = column_defs(&results).into_iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["zeta", "alpha", "_time"]);
    }

    #[test]
    fn no_results_means_no_columns() {
        assert!(column_defs(&[]).is_empty());
    }

    #[test]
    fn cell_text_formats_values() {
        let r = row(json!({"s": "hello", "n": 4, "o": {"k": [1]}, "z": null}));
        assert_eq!(cell_text(&r, "s"), "hello");
        assert_eq!(cell_text(&r, "n"), "4");
        assert_eq!(cell_text(&r, "o"), r#"{"k":[1]}"#);
        assert_eq!(cell_text(&r, "z"), "");
        assert_eq!(cell_text(&r, "missing"), "");
    }

    #[test]
    fn timeline_uses_camel_case() {
        let t: TimeLine = serde_json::from_value(json!({
            "buckets": [{"duration": 60, "earliest": 1700000000, "eventCount": 4}],
            "totalEventCount": 4
        }))
        .unwrap();
        assert_eq!(t.total_event_count, 4);
        assert_eq!(t.counts(), vec![4]);
        assert_eq!(t.buckets[0].duration, 60.0);
    }
}
