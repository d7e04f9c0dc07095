//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use gmail_sweep::client::MailboxClient;
use gmail_sweep::error::{GmailError, Result};
use gmail_sweep::models::{LabelChange, MessagePage};
use mockall::mock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Continuation token for the page at `index` (the first page has none)
pub fn page_token(index: usize) -> Option<String> {
    if index == 0 {
        None
    } else {
        Some(format!("page-{}", index))
    }
}

/// Build pages with the given sizes; IDs are `m1`, `m2`, ... across all pages
pub fn build_pages(layout: &[usize]) -> Vec<MessagePage> {
    let mut next_id = 1;
    layout
        .iter()
        .enumerate()
        .map(|(index, &size)| {
            let ids = (0..size)
                .map(|_| {
                    let id = format!("m{}", next_id);
                    next_id += 1;
                    id
                })
                .collect();
            let next = if index + 1 < layout.len() {
                page_token(index + 1)
            } else {
                None
            };
            MessagePage::new(ids, next)
        })
        .collect()
}

/// All IDs produced by `build_pages(layout)`, in listing order
pub fn all_ids(layout: &[usize]) -> Vec<String> {
    build_pages(layout)
        .into_iter()
        .flat_map(|page| page.ids)
        .collect()
}

/// In-memory mailbox that records every call
pub struct RecordingClient {
    pages: Vec<MessagePage>,
    fail_listing_at: Option<usize>,
    failing_ids: HashSet<String>,
    modify_delay: Option<Duration>,
    pub modified: Mutex<Vec<String>>,
    pub list_calls: Mutex<Vec<Option<String>>>,
    pub modify_calls: AtomicUsize,
}

impl RecordingClient {
    pub fn new(pages: Vec<MessagePage>) -> Self {
        Self {
            pages,
            fail_listing_at: None,
            failing_ids: HashSet::new(),
            modify_delay: None,
            modified: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
            modify_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_layout(layout: &[usize]) -> Self {
        Self::new(build_pages(layout))
    }

    /// Listing the page at `index` fails with a server error
    pub fn fail_listing_at(mut self, index: usize) -> Self {
        self.fail_listing_at = Some(index);
        self
    }

    pub fn fail_modify(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    pub fn with_modify_delay(mut self, delay: Duration) -> Self {
        self.modify_delay = Some(delay);
        self
    }

    pub fn modified_sorted(&self) -> Vec<String> {
        let mut ids = self.modified.lock().unwrap().clone();
        ids.sort();
        ids
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MailboxClient for RecordingClient {
    async fn list_page(&self, _query: &str, page_token: Option<String>) -> Result<MessagePage> {
        self.list_calls.lock().unwrap().push(page_token.clone());

        let index = match page_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| GmailError::BadRequest(format!("unknown page token {}", token)))?,
        };

        if self.fail_listing_at == Some(index) {
            return Err(GmailError::ServerError {
                status: 500,
                message: format!("listing page {} failed", index),
            });
        }

        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| GmailError::BadRequest(format!("no page {}", index)))
    }

    async fn modify_labels(&self, message_id: &str, _change: &LabelChange) -> Result<()> {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.modify_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_ids.contains(message_id) {
            return Err(GmailError::MessageNotFound(message_id.to_string()));
        }
        self.modified.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

// Mock implementation of MailboxClient for testing
mock! {
    pub MailboxClient {}

    #[async_trait::async_trait]
    impl MailboxClient for MailboxClient {
        async fn list_page(&self, query: &str, page_token: Option<String>) -> Result<MessagePage>;
        async fn modify_labels(&self, message_id: &str, change: &LabelChange) -> Result<()>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pages() {
        let pages = build_pages(&[2, 0, 1]);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].ids, vec!["m1", "m2"]);
        assert_eq!(pages[0].next_page_token.as_deref(), Some("page-1"));
        assert!(pages[1].ids.is_empty());
        assert!(!pages[1].is_last());
        assert_eq!(pages[2].ids, vec!["m3"]);
        assert!(pages[2].is_last());
    }

    #[test]
    fn test_all_ids() {
        assert_eq!(all_ids(&[1, 2]), vec!["m1", "m2", "m3"]);
        assert!(all_ids(&[]).is_empty());
    }
}
