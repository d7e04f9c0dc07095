//! Gmail API client for listing and modifying messages

use async_trait::async_trait;
use google_gmail1::{api::ModifyMessageRequest, hyper_rustls, hyper_util, Gmail};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{GmailError, Result};
use crate::models::{LabelChange, MessagePage};

/// Scope every call is made with; matches the scope requested during authorization
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Largest page size the messages.list endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 500;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Mailbox operations the sweep pipeline depends on
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Fetch one page of message IDs matching `query`, starting at `page_token`
    async fn list_page(&self, query: &str, page_token: Option<String>) -> Result<MessagePage>;

    /// Apply a label change to a single message
    async fn modify_labels(&self, message_id: &str, change: &LabelChange) -> Result<()>;
}

#[async_trait]
impl<T: MailboxClient + ?Sized> MailboxClient for Arc<T> {
    async fn list_page(&self, query: &str, page_token: Option<String>) -> Result<MessagePage> {
        self.as_ref().list_page(query, page_token).await
    }

    async fn modify_labels(&self, message_id: &str, change: &LabelChange) -> Result<()> {
        self.as_ref().modify_labels(message_id, change).await
    }
}

/// Production Gmail client backed by the generated API hub
///
/// Each call is bounded by a timeout. Failed calls are not retried; the
/// pipeline decides what a failure means.
pub struct ProductionMailboxClient {
    hub: Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>,
    page_size: u32,
}

impl ProductionMailboxClient {
    /// Create a new production client
    ///
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `page_size` - Message IDs requested per listing call (clamped to 1..=500)
    pub fn new(
        hub: Gmail<
            hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
        >,
        page_size: u32,
    ) -> Self {
        Self {
            hub,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

/// Run an API call under the client timeout, converting its error
async fn with_timeout<T, F>(operation: &str, api_call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, google_gmail1::Error>>,
{
    match tokio::time::timeout(API_TIMEOUT, api_call).await {
        Ok(result) => result.map_err(GmailError::from),
        Err(_) => {
            warn!("Gmail API {} call timed out after {:?}", operation, API_TIMEOUT);
            Err(GmailError::NetworkError(format!(
                "API call timed out after {:?}",
                API_TIMEOUT
            )))
        }
    }
}

fn non_empty(labels: &[String]) -> Option<Vec<String>> {
    if labels.is_empty() {
        None
    } else {
        Some(labels.to_vec())
    }
}

#[async_trait]
impl MailboxClient for ProductionMailboxClient {
    async fn list_page(&self, query: &str, page_token: Option<String>) -> Result<MessagePage> {
        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(self.page_size);

        if let Some(token) = page_token.as_deref().filter(|t| !t.is_empty()) {
            call = call.page_token(token);
        }

        let (_, response) = with_timeout("messages.list", call.add_scope(MODIFY_SCOPE).doit()).await?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg_ref| msg_ref.id)
            .collect();

        debug!(
            "Listed {} message IDs (next page: {})",
            ids.len(),
            response.next_page_token.is_some()
        );

        Ok(MessagePage::new(ids, response.next_page_token))
    }

    async fn modify_labels(&self, message_id: &str, change: &LabelChange) -> Result<()> {
        let modify_request = ModifyMessageRequest {
            add_label_ids: non_empty(&change.add),
            remove_label_ids: non_empty(&change.remove),
        };

        let call = self
            .hub
            .users()
            .messages_modify(modify_request, "me", message_id)
            .add_scope(MODIFY_SCOPE)
            .doit();

        with_timeout("messages.modify", call).await?;
        Ok(())
    }
}

/// Lists through the wrapped client but only logs the modifications it would make
pub struct DryRunClient<C> {
    inner: C,
}

impl<C: MailboxClient> DryRunClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: MailboxClient> MailboxClient for DryRunClient<C> {
    async fn list_page(&self, query: &str, page_token: Option<String>) -> Result<MessagePage> {
        self.inner.list_page(query, page_token).await
    }

    async fn modify_labels(&self, message_id: &str, change: &LabelChange) -> Result<()> {
        debug!(
            "[dry run] would modify {} (add: {:?}, remove: {:?})",
            message_id, change.add, change.remove
        );
        Ok(())
    }
}
