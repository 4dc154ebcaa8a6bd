use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The backend answered with a non-success status.
    #[error("{context}: {status_text}")]
    Http {
        context: &'static str,
        status_text: String,
    },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown job status '{0}'")]
    UnknownStatus(String),

    #[error("Search job failed")]
    JobFailed,

    #[error("Search job was canceled")]
    JobCanceled,

    #[error("Job polling timeout")]
    Timeout,

    #[error("{0}")]
    InvalidInput(String),
}

impl SearchError {
    pub fn http(context: &'static str, status: reqwest::StatusCode) -> Self {
        let status_text = status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_str().to_string());
        SearchError::Http {
            context,
            status_text,
        }
    }
}
