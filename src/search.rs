use crate::api::{ApiClient, RequestOptions, SEARCH_JOBS_PATH};
use crate::error::SearchError;
use crate::models::search::{
    CreateJobRequest, JobEnvelope, JobInfo, JobResults, JobStatus, SearchJob, SearchResult,
    TimeLine,
};
use log::{debug, info};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Search job lifecycle on top of [`ApiClient`].
#[derive(Clone)]
pub struct SearchClient {
    api: ApiClient,
}

impl SearchClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn create_search_job(
        &self,
        query: &str,
        earliest_time: i64,
        latest_time: i64,
    ) -> Result<SearchJob, SearchError> {
        let body = serde_json::to_value(CreateJobRequest {
            search: query,
            earliest_time,
            latest_time,
        })?;

        let response = self
            .api
            .fetch(SEARCH_JOBS_PATH, RequestOptions::post(body))
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::http("Failed to create search job", status));
        }

        let data: JobEnvelope = serde_json::from_str(&response.text().await?)?;
        let job = SearchJob {
            id: data.sid.unwrap_or_default(),
            query: query.to_string(),
            status: JobStatus::from_wire(data.status.as_deref()),
            start_time: Some(earliest_time),
            end_time: Some(latest_time),
            event_count: None,
        };
        info!("Created search job {} ({})", job.id, job.status);
        Ok(job)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<SearchJob, SearchError> {
        let path = format!("{}/{}", SEARCH_JOBS_PATH, job_id);
        let response = self.api.fetch(&path, RequestOptions::get()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::http("Failed to get job status", status));
        }

        let data: JobEnvelope = serde_json::from_str(&response.text().await?)?;
        Ok(SearchJob {
            id: data
                .sid
                .filter(|sid| !sid.is_empty())
                .unwrap_or_else(|| job_id.to_string()),
            query: data.search.unwrap_or_default(),
            status: JobStatus::from_wire(data.status.as_deref()),
            start_time: None,
            end_time: None,
            event_count: data.event_count.and_then(|v| v.as_u64()),
        })
    }

    /// Polls until the job is terminal. Fails with [`SearchError::Timeout`] once
    /// `max_wait` has elapsed; status errors end the poll immediately.
    pub async fn poll_job_status(
        &self,
        job_id: &str,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Result<SearchJob, SearchError> {
        let started = Instant::now();

        while started.elapsed() < max_wait {
            let job = self.get_job_status(job_id).await?;
            if job.status.is_terminal() {
                info!("Job {} reached {}", job_id, job.status);
                return Ok(job);
            }
            debug!("Job {} still {}", job_id, job.status);
            sleep(poll_interval).await;
        }

        Err(SearchError::Timeout)
    }

    pub async fn get_job_results(&self, job_id: &str) -> Result<JobResults, SearchError> {
        let path = format!("{}/{}/results", SEARCH_JOBS_PATH, job_id);
        let response = self.api.fetch(&path, RequestOptions::get()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::http("Failed to get job results", status));
        }

        let text = response.text().await?;
        parse_job_results(job_id, &text)
    }

    pub async fn get_job_timeline(&self, job_id: &str) -> Result<TimeLine, SearchError> {
        let path = format!("{}/{}/timeline", SEARCH_JOBS_PATH, job_id);
        let response = self.api.fetch(&path, RequestOptions::get()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::http("Failed to get job timeline", status));
        }

        Ok(serde_json::from_str(&response.text().await?)?)
    }
}

/// Splits a results body into the info header and one row per following line.
/// Rows that are not JSON objects are dropped without failing the batch.
pub fn parse_job_results(job_id: &str, text: &str) -> Result<JobResults, SearchError> {
    let mut lines = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty());

    let Some(header) = lines.next() else {
        return Ok(JobResults::empty(job_id));
    };

    let mut extra = match serde_json::from_str::<Value>(header)? {
        Value::Object(map) => map,
        other => {
            debug!("Job {} info line is not an object: {}", job_id, other);
            serde_json::Map::new()
        }
    };

    let mut results: Vec<SearchResult> = Vec::new();
    for (idx, line) in lines.enumerate() {
        match serde_json::from_str::<SearchResult>(line) {
            Ok(row) => results.push(row),
            // idx + 2: one-based, after the header line
            Err(e) => debug!("Skipping result line {} of job {}: {}", idx + 2, job_id, e),
        }
    }

    let id = match extra.remove("sid") {
        Some(Value::String(sid)) if !sid.is_empty() => sid,
        _ => job_id.to_string(),
    };
    let status = match extra.remove("status") {
        Some(Value::String(s)) => {
            let status = JobStatus::from_wire(Some(s.as_str()));
            // Keep the server's wording when we could not map it
            if status == JobStatus::Unknown {
                extra.insert("status".to_string(), Value::String(s));
            }
            status
        }
        _ => JobStatus::Pending,
    };
    let event_count = extra
        .remove("eventCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(results.len() as u64);

    Ok(JobResults {
        info: JobInfo {
            id,
            status,
            event_count,
            extra,
        },
        results,
    })
}
