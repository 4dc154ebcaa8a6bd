use crate::error::SearchError;
use crate::models::search::{column_defs, ColumnDef, JobInfo, JobStatus, SearchResult, TimeLine};
use crate::search::SearchClient;
use crate::utils::time_range::TimeRange;
use log::{error, info, warn};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// What the user submitted: the query text and the two raw time inputs.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub earliest: String,
    pub latest: String,
}

/// View model for one console. Each search resets it.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub loading: bool,
    pub error: Option<String>,
    pub results: Vec<SearchResult>,
    pub columns: Vec<ColumnDef>,
    pub info: Option<JobInfo>,
    pub timeline: Option<TimeLine>,
    pub job_id: Option<String>,
    pub job_status: Option<JobStatus>,
    pub started_at: Option<Instant>,
}

impl SearchState {
    pub fn begin(&mut self) {
        *self = SearchState {
            loading: true,
            job_status: Some(JobStatus::Pending),
            started_at: Some(Instant::now()),
            ..SearchState::default()
        };
    }

    pub fn job_created(&mut self, job_id: &str) {
        self.job_id = Some(job_id.to_string());
        self.job_status = Some(JobStatus::Pending);
    }

    pub fn polled(&mut self, status: JobStatus) {
        self.job_status = Some(status);
    }

    pub fn finish(&mut self, info: JobInfo, results: Vec<SearchResult>) {
        self.loading = false;
        self.error = None;
        self.columns = column_defs(&results);
        self.results = results;
        self.info = Some(info);
        self.job_status = Some(JobStatus::Completed);
    }

    pub fn fail(&mut self, message: String) {
        self.loading = false;
        self.error = Some(message);
        self.job_status = Some(JobStatus::Failed);
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    pub fn has_searched(&self) -> bool {
        self.job_status.is_some()
    }
}

/// Runs create, poll and fetch for one request, one step at a time.
#[derive(Clone)]
pub struct SearchSession {
    client: SearchClient,
    max_wait: Duration,
    poll_interval: Duration,
}

impl SearchSession {
    pub fn new(client: SearchClient, max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            client,
            max_wait,
            poll_interval,
        }
    }

    pub fn client(&self) -> &SearchClient {
        &self.client
    }

    /// Drives `request` to completion, mirroring every step into `state`.
    /// The lock is never held across a request to the backend.
    pub async fn run(
        &self,
        request: &SearchRequest,
        state: &Mutex<SearchState>,
    ) -> Result<(), SearchError> {
        if request.query.trim().is_empty() {
            let err = SearchError::InvalidInput("Please enter a query".to_string());
            state.lock().await.error = Some(err.to_string());
            return Err(err);
        }

        state.lock().await.begin();

        match self.execute(request, state).await {
            Ok((info, results, timeline)) => {
                info!("Search finished with {} results", results.len());
                let mut state = state.lock().await;
                state.timeline = timeline;
                state.finish(info, results);
                Ok(())
            }
            Err(e) => {
                error!("Search failed: {}", e);
                state.lock().await.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &SearchRequest,
        state: &Mutex<SearchState>,
    ) -> Result<(JobInfo, Vec<SearchResult>, Option<TimeLine>), SearchError> {
        let range = TimeRange::parse(&request.earliest, &request.latest)?;

        let job = self
            .client
            .create_search_job(&request.query, range.earliest, range.latest)
            .await?;
        state.lock().await.job_created(&job.id);

        let finished = self
            .client
            .poll_job_status(&job.id, self.max_wait, self.poll_interval)
            .await?;
        state.lock().await.polled(finished.status);

        match finished.status {
            JobStatus::Failed => return Err(SearchError::JobFailed),
            JobStatus::Canceled => return Err(SearchError::JobCanceled),
            _ => {}
        }

        let results = self.client.get_job_results(&job.id).await?;

        let timeline = match self.client.get_job_timeline(&job.id).await {
            Ok(timeline) => Some(timeline),
            Err(e) => {
                warn!("Timeline unavailable for job {}: {}", job.id, e);
                None
            }
        };

        Ok((results.info, results.results, timeline))
    }
}
