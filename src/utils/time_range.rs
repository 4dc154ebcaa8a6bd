use crate::error::SearchError;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};

pub const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";
const INPUT_FORMAT_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";

/// A validated search window in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub earliest: i64,
    pub latest: i64,
}

impl TimeRange {
    pub fn parse(earliest: &str, latest: &str) -> Result<Self, SearchError> {
        let earliest = parse_instant(earliest)?;
        let latest = parse_instant(latest)?;
        if earliest >= latest {
            return Err(SearchError::InvalidInput(
                "Earliest time must be before latest time".to_string(),
            ));
        }
        Ok(Self { earliest, latest })
    }
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` in local time, or RFC 3339 with an offset.
pub fn parse_instant(input: &str) -> Result<i64, SearchError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp());
    }

    let naive = NaiveDateTime::parse_from_str(input, INPUT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(input, INPUT_FORMAT_SECONDS))
        .map_err(|_| SearchError::InvalidInput(format!("Invalid time '{}'", input)))?;

    // Ambiguous local times (DST fold) resolve to the earlier instant.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| SearchError::InvalidInput(format!("Time '{}' does not exist locally", input)))
}

/// Last 24 hours ending now, formatted for the input fields.
pub fn default_inputs() -> (String, String) {
    let now = Local::now();
    let day_ago = now - Duration::hours(24);
    (
        day_ago.format(INPUT_FORMAT).to_string(),
        now.format(INPUT_FORMAT).to_string(),
    )
}
