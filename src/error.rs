use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Error types for the sweep pipeline and the authorization flow
#[derive(Error, Debug)]
pub enum GmailError {
    /// Fetching a page of message IDs failed; aborts the producer
    #[error("Listing failed: {0}")]
    ListingFailed(String),

    /// Modifying a single message failed; logged by the worker, never fatal
    #[error("Failed to modify message {id}: {message}")]
    MutationFailed { id: String, message: String },

    /// The authorization redirect arrived without a usable `code`
    #[error("Malformed authorization callback: {0}")]
    CallbackMalformed(String),

    /// The callback server went away before an authorization code was delivered
    #[error("Authorization aborted: {0}")]
    AuthorizationAborted(String),

    /// The authorization code could not be turned into a usable token
    #[error("Credential exchange failed: {0}")]
    CredentialExchangeFailed(String),

    /// A worker task panicked; reported after the remaining workers drained
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// Every worker exited while the producer still had messages to enqueue
    #[error("Job queue closed: {0}")]
    QueueClosed(String),

    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication setup failed (credentials file, authenticator, TLS roots)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GmailError {
    /// Whether this error belongs to the authorization flow rather than the pipeline
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            GmailError::CallbackMalformed(_)
                | GmailError::AuthorizationAborted(_)
                | GmailError::CredentialExchangeFailed(_)
                | GmailError::AuthError(_)
        )
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => GmailError::RateLimitExceeded(message),
                    404 => GmailError::MessageNotFound("Resource not found".to_string()),
                    400 => GmailError::BadRequest(message),
                    403 => GmailError::Forbidden(message),
                    500..=599 => GmailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => GmailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => GmailError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
