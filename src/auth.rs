//! OAuth2 authentication management for Gmail API
//!
//! Tokens are cached on disk by the authenticator. When no usable token is
//! cached, the operator is sent to Google's consent page and the redirect is
//! captured by a one-shot [`CallbackServer`] bound to the registered redirect
//! address.

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, info};
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;

use crate::callback::CallbackServer;
use crate::config::AuthConfig;
use crate::error::{GmailError, Result};

/// Gmail API scopes requested during authorization
///
/// - userinfo.email: identify the authorized account
/// - gmail.modify: read messages and change their labels (no permanent deletion)
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Static anti-forgery token appended to the consent URL
pub const STATE_TOKEN: &str = "state-token";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Set `state` on a consent URL, replacing any existing value
pub fn with_state_token(auth_url: &str, state: &str) -> Result<String> {
    let mut url = url::Url::parse(auth_url)
        .map_err(|e| GmailError::AuthError(format!("Invalid authorization URL: {}", e)))?;

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "state")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("state", state);

    Ok(url.to_string())
}

/// Presents the consent URL and captures the redirect with a fresh [`CallbackServer`]
pub struct CallbackFlowDelegate {
    redirect_uri: String,
    bind_addr: String,
    callback_path: String,
    state_token: String,
}

impl CallbackFlowDelegate {
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            redirect_uri: auth.redirect_uri(),
            bind_addr: auth.redirect_addr.clone(),
            callback_path: auth.callback_path.clone(),
            state_token: STATE_TOKEN.to_string(),
        }
    }

    /// Run one authorization attempt and return the captured code
    pub async fn capture_code(&self, auth_url: &str) -> Result<String> {
        // Bind before printing the URL so a fast redirect cannot miss the listener
        let server = CallbackServer::bind(&self.bind_addr, &self.callback_path).await?;
        let auth_url = with_state_token(auth_url, &self.state_token)?;

        info!(
            "Go to the following link in your browser to authorize access:\n{}",
            auth_url
        );

        server.wait_for_code().await
    }
}

impl InstalledFlowDelegate for CallbackFlowDelegate {
    fn redirect_uri(&self) -> Option<&str> {
        Some(&self.redirect_uri)
    }

    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move { self.capture_code(url).await.map_err(|e| e.to_string()) })
    }
}

/// Classify an error from the authenticator's token call
fn token_error(error: yup_oauth2::Error) -> GmailError {
    match error {
        yup_oauth2::Error::UserError(message) => GmailError::AuthorizationAborted(message),
        other => GmailError::CredentialExchangeFailed(other.to_string()),
    }
}

/// Whether a credential is already cached at `token_cache_path`
pub fn has_cached_token(token_cache_path: &Path) -> bool {
    token_cache_path.is_file()
}

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Loads the cached token if present; otherwise runs the callback flow,
/// exchanges the code and persists the resulting token for reuse.
///
/// # Arguments
/// * `credentials_path` - Path to the OAuth2 credentials JSON file
/// * `token_cache_path` - Path where access tokens will be cached
/// * `auth` - Redirect address and callback path registered with the provider
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
    auth: &AuthConfig,
) -> Result<GmailHub> {
    info!("Loading configuration from {:?}", credentials_path);
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to read credentials: {}", e)))?;

    if let Some(parent) = token_cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let cached = has_cached_token(token_cache_path);
    if !cached {
        info!("No cached credential found; starting authorization flow");
    }

    let authenticator = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::Interactive,
    )
    .persist_tokens_to_disk(token_cache_path)
    .flow_delegate(Box::new(CallbackFlowDelegate::new(auth)))
    .build()
    .await
    .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Obtain the token up front so the flow runs before any worker starts
    authenticator.token(REQUIRED_SCOPES).await.map_err(token_error)?;

    if !cached {
        info!("Saving credential file to: {:?}", token_cache_path);
    }
    if has_cached_token(token_cache_path) {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    debug!("Gmail hub initialized");
    Ok(Gmail::new(client, authenticator))
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
