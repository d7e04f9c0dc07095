//! One-shot local HTTP listener that captures an OAuth2 authorization code
//!
//! The provider redirects the operator's browser to the registered redirect
//! URL with `?code=...`. [`CallbackServer`] answers that request, hands the
//! code to whoever is waiting in [`CallbackServer::wait_for_code`] and then
//! shuts down gracefully. A server instance captures at most one code.
//!
//! ```text
//! Listening -> AwaitingCallback -> Delivered -> Stopped
//!     \______________\____________________________> Aborted
//! ```

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{GmailError, Result};

pub const SUCCESS_MESSAGE: &str = "success, you can close this window";

/// Lifecycle of a callback server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    /// Bound and serving, no request seen yet
    Listening,
    /// At least one request arrived, none carried a usable code
    AwaitingCallback,
    /// A code was handed to the waiter
    Delivered,
    /// Shut down after delivery
    Stopped,
    /// Shut down without delivering a code
    Aborted,
}

struct Inner {
    state: CallbackState,
    slot: Option<oneshot::Sender<String>>,
}

/// State shared by the request handler, the server and its abort handles
struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state(&self) -> CallbackState {
        self.lock().state
    }

    /// Drop the handoff slot so a pending waiter wakes up empty-handed
    fn abort(&self) {
        let mut inner = self.lock();
        inner.slot.take();
        if !matches!(inner.state, CallbackState::Delivered | CallbackState::Stopped) {
            inner.state = CallbackState::Aborted;
        }
    }
}

/// Cloneable handle that tears a [`CallbackServer`] down without a code
#[derive(Clone)]
pub struct AbortHandle {
    shared: Arc<Shared>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.shared.abort();
        let _ = self.shutdown.send(true);
    }

    pub fn state(&self) -> CallbackState {
        self.shared.state()
    }
}

/// Single-use authorization callback listener
pub struct CallbackServer {
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    code_rx: oneshot::Receiver<String>,
    shutdown: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    /// Bind `addr` and start serving `path`
    ///
    /// `addr` must match the host and port of the redirect URL registered with
    /// the provider. Failure to bind is reported as
    /// [`GmailError::AuthorizationAborted`].
    pub async fn bind(addr: &str, path: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GmailError::AuthorizationAborted(format!(
                "failed to bind callback listener on {}: {}",
                addr, e
            ))
        })?;
        let local_addr = listener.local_addr()?;

        let (code_tx, code_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: CallbackState::Listening,
                slot: Some(code_tx),
            }),
        });
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let app = Router::new()
            .route(path, get(handle_callback))
            .with_state(Arc::clone(&shared));

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await;
            match result {
                Ok(()) => debug!("Callback server stopped"),
                Err(e) => warn!("Callback server failed: {}", e),
            }
        });

        info!("Listening for authorization callback on {}", local_addr);

        Ok(Self {
            local_addr,
            shared,
            code_rx,
            shutdown: Arc::new(shutdown_tx),
            task,
        })
    }

    /// Address actually bound (useful when binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> CallbackState {
        self.shared.state()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: Arc::clone(&self.shared),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Block until a code is delivered, then stop the listener
    ///
    /// Waits indefinitely; returns [`GmailError::AuthorizationAborted`] if the
    /// server is aborted before a code arrives.
    pub async fn wait_for_code(mut self) -> Result<String> {
        let received = (&mut self.code_rx).await;
        self.stop().await;
        received.map_err(|_| {
            GmailError::AuthorizationAborted(
                "callback server stopped before an authorization code arrived".to_string(),
            )
        })
    }

    /// Like [`wait_for_code`](Self::wait_for_code) but gives up after `timeout`
    pub async fn wait_for_code_timeout(mut self, timeout: Duration) -> Result<String> {
        match tokio::time::timeout(timeout, &mut self.code_rx).await {
            Ok(Ok(code)) => {
                self.stop().await;
                Ok(code)
            }
            Ok(Err(_)) => {
                self.stop().await;
                Err(GmailError::AuthorizationAborted(
                    "callback server stopped before an authorization code arrived".to_string(),
                ))
            }
            Err(_) => {
                self.abort_handle().abort();
                self.stop().await;
                Err(GmailError::AuthorizationAborted(format!(
                    "no authorization callback within {:?}",
                    timeout
                )))
            }
        }
    }

    /// Gracefully stop the listener, letting an in-flight response complete
    pub async fn stop(self) {
        {
            let mut inner = self.shared.lock();
            inner.slot.take();
            inner.state = match inner.state {
                CallbackState::Delivered | CallbackState::Stopped => CallbackState::Stopped,
                _ => CallbackState::Aborted,
            };
        }
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Callback server task did not shut down cleanly: {}", e);
        }
        debug!("Callback server on {} is {:?}", self.local_addr, self.shared.state());
    }
}

/// Extract the authorization code from a raw query string
///
/// Returns [`GmailError::CallbackMalformed`] when the query is missing, the
/// provider reported an error, or `code` is absent or empty.
pub fn parse_code(query: Option<&str>) -> Result<String> {
    let query = query.filter(|q| !q.is_empty()).ok_or_else(|| {
        GmailError::CallbackMalformed("ERROR: GET request missing 'code' in URL".to_string())
    })?;

    let mut code = None;
    let mut provider_error = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => provider_error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = provider_error {
        return Err(GmailError::CallbackMalformed(format!(
            "ERROR: authorization was not granted: {}",
            error
        )));
    }

    match code {
        Some(code) if !code.is_empty() => Ok(code),
        Some(_) => Err(GmailError::CallbackMalformed(
            "ERROR: GET request 'code' parameter is empty".to_string(),
        )),
        None => Err(GmailError::CallbackMalformed(
            "ERROR: GET request missing 'code' in URL".to_string(),
        )),
    }
}

/// Answer one request on the callback path
///
/// The handoff is a `oneshot` send, which never waits for the receiver. The
/// code is placed in the channel before the 200 response is returned, so a
/// waiter that stops the server as soon as it wakes cannot lose it.
async fn handle_callback(
    State(shared): State<Arc<Shared>>,
    RawQuery(query): RawQuery,
) -> (StatusCode, String) {
    let mut inner = shared.lock();

    match inner.state {
        CallbackState::Delivered | CallbackState::Stopped => {
            return (
                StatusCode::CONFLICT,
                "ERROR: an authorization code was already received".to_string(),
            );
        }
        CallbackState::Aborted => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "ERROR: authorization is no longer pending".to_string(),
            );
        }
        CallbackState::Listening => inner.state = CallbackState::AwaitingCallback,
        CallbackState::AwaitingCallback => {}
    }

    let code = match parse_code(query.as_deref()) {
        Ok(code) => code,
        Err(e) => {
            warn!("Rejected authorization callback: {}", e);
            let message = match e {
                GmailError::CallbackMalformed(message) => message,
                other => other.to_string(),
            };
            return (StatusCode::BAD_REQUEST, message);
        }
    };

    let delivered = inner
        .slot
        .take()
        .map(|slot| slot.send(code).is_ok())
        .unwrap_or(false);

    if delivered {
        inner.state = CallbackState::Delivered;
        info!("Received authorization code");
        (StatusCode::OK, SUCCESS_MESSAGE.to_string())
    } else {
        inner.state = CallbackState::Aborted;
        warn!("Authorization code arrived but nobody is waiting for it");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "ERROR: authorization is no longer pending".to_string(),
        )
    }
}
