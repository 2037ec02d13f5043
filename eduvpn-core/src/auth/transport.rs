//! Delivery of the OAuth redirect back into the client
//!
//! Desktop builds listen on a loopback port; builds with a registered custom
//! redirect URL get the callback handed in by the host application. The
//! coordinator only sees the [`AuthorizationTransport`] trait and picks the
//! implementation once, at construction.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CancelReason, ConnectionError};

/// Capability to receive exactly one authorization redirect
#[async_trait]
pub trait AuthorizationTransport: Send + Sync {
    /// Start listening for a redirect
    ///
    /// The returned listener owns whatever resource receives the callback and
    /// releases it when dropped.
    async fn listen(&self) -> Result<Box<dyn RedirectListener>, ConnectionError>;
}

/// A prepared redirect receiver for one flow
#[async_trait]
pub trait RedirectListener: Send {
    /// Value to send as `redirect_uri`
    fn redirect_uri(&self) -> &Url;

    /// Wait for the browser to come back; resolves to the full callback URL
    async fn wait_for_redirect(&mut self) -> Result<Url, ConnectionError>;
}

const CALLBACK_PATH: &str = "/callback";
const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>eduVPN</title></head>\
<body><p>Authorization complete. You can close this window and return to the application.</p></body></html>";

/// In-process HTTP server on 127.0.0.1
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    port: u16,
    active: Arc<AtomicUsize>,
}

impl LoopbackTransport {
    /// Listen on an ephemeral port
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on a fixed port (registered redirect URIs sometimes pin one)
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of listeners currently bound
    pub fn active_listeners(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Shared with the callback handler of one server
struct CallbackState {
    redirect_uri: Url,
    sender: Mutex<Option<oneshot::Sender<Url>>>,
}

async fn receive_callback(State(state): State<Arc<CallbackState>>, uri: Uri) -> Html<&'static str> {
    let target = uri
        .path_and_query()
        .map_or(CALLBACK_PATH, |pq| pq.as_str());
    match state.redirect_uri.join(target) {
        Ok(url) => {
            let sender = state.sender.lock().ok().and_then(|mut slot| slot.take());
            match sender {
                Some(tx) => {
                    let _ = tx.send(url);
                }
                None => debug!("Ignoring repeated redirect"),
            }
        }
        Err(e) => warn!(error = %e, "Redirect request has an unusable target"),
    }
    Html(SUCCESS_PAGE)
}

async fn not_found() -> StatusCode {
    // Browsers also ask for /favicon.ico and the like
    StatusCode::NOT_FOUND
}

#[async_trait]
impl AuthorizationTransport for LoopbackTransport {
    async fn listen(&self) -> Result<Box<dyn RedirectListener>, ConnectionError> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, self.port)))
            .await
            .map_err(|e| ConnectionError::AuthorizationFailed {
                reason: format!("Failed to start redirect listener: {}", e),
            })?;
        let addr = listener
            .local_addr()
            .map_err(|e| ConnectionError::AuthorizationFailed {
                reason: format!("Failed to read redirect listener address: {}", e),
            })?;
        let redirect_uri = Url::parse(&format!("http://{}{}", addr, CALLBACK_PATH)).map_err(|e| {
            ConnectionError::AuthorizationFailed {
                reason: format!("Invalid redirect URI: {}", e),
            }
        })?;

        let (tx, rx) = oneshot::channel();
        let state = Arc::new(CallbackState {
            redirect_uri: redirect_uri.clone(),
            sender: Mutex::new(Some(tx)),
        });
        let app = Router::new()
            .route(CALLBACK_PATH, get(receive_callback))
            .fallback(not_found)
            .with_state(state);

        // Every connection is served on its own task, so idle sockets never
        // hold up the callback
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "Redirect listener failed");
            }
        });

        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(%redirect_uri, "Redirect listener started");

        Ok(Box::new(LoopbackListener {
            redirect_uri,
            receiver: rx,
            server,
            active: self.active.clone(),
        }))
    }
}

struct LoopbackListener {
    redirect_uri: Url,
    receiver: oneshot::Receiver<Url>,
    server: JoinHandle<()>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl RedirectListener for LoopbackListener {
    fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    async fn wait_for_redirect(&mut self) -> Result<Url, ConnectionError> {
        (&mut self.receiver)
            .await
            .map_err(|_| ConnectionError::AuthorizationFailed {
                reason: "Redirect listener stopped".to_string(),
            })
    }
}

impl Drop for LoopbackListener {
    fn drop(&mut self) {
        // Closes the listening socket; responses already being written finish
        self.server.abort();
        self.active.fetch_sub(1, Ordering::SeqCst);
        debug!(redirect_uri = %self.redirect_uri, "Redirect listener released");
    }
}

type PendingRedirect = Arc<Mutex<Option<(u64, oneshot::Sender<Url>)>>>;

/// Redirect to a fixed, registered URL that the host application intercepts
///
/// The host hands the intercepted URL to [`ExternalRedirectTransport::resume`].
#[derive(Debug, Clone)]
pub struct ExternalRedirectTransport {
    redirect_uri: Url,
    pending: PendingRedirect,
    next_token: Arc<AtomicU64>,
}

impl ExternalRedirectTransport {
    pub fn new(redirect_uri: Url) -> Self {
        Self {
            redirect_uri,
            pending: Arc::new(Mutex::new(None)),
            next_token: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Feed an intercepted callback URL to the waiting flow
    ///
    /// Returns `false` when no flow is waiting or the URL is not our redirect.
    pub fn resume(&self, url: Url) -> bool {
        let is_ours = url.scheme() == self.redirect_uri.scheme()
            && url.host_str() == self.redirect_uri.host_str()
            && url.path() == self.redirect_uri.path();
        if !is_ours {
            debug!(%url, "Ignoring URL that is not our redirect");
            return false;
        }

        let sender = match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match sender {
            Some((_, tx)) => tx.send(url).is_ok(),
            None => false,
        }
    }

    /// Whether a flow is currently waiting for its callback
    pub fn is_waiting(&self) -> bool {
        self.pending.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

#[async_trait]
impl AuthorizationTransport for ExternalRedirectTransport {
    async fn listen(&self) -> Result<Box<dyn RedirectListener>, ConnectionError> {
        let (tx, rx) = oneshot::channel();
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let mut slot = self
            .pending
            .lock()
            .map_err(|_| ConnectionError::AuthorizationFailed {
                reason: "Redirect state poisoned".to_string(),
            })?;
        *slot = Some((token, tx));

        Ok(Box::new(ExternalRedirectListener {
            redirect_uri: self.redirect_uri.clone(),
            token,
            receiver: rx,
            pending: self.pending.clone(),
        }))
    }
}

struct ExternalRedirectListener {
    redirect_uri: Url,
    token: u64,
    receiver: oneshot::Receiver<Url>,
    pending: PendingRedirect,
}

#[async_trait]
impl RedirectListener for ExternalRedirectListener {
    fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    async fn wait_for_redirect(&mut self) -> Result<Url, ConnectionError> {
        (&mut self.receiver)
            .await
            .map_err(|_| ConnectionError::UserCancelled {
                reason: CancelReason::Superseded,
            })
    }
}

impl Drop for ExternalRedirectListener {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.pending.lock() {
            // Only clear the slot if it still belongs to this flow
            if slot.as_ref().is_some_and(|(token, _)| *token == self.token) {
                *slot = None;
            }
        }
    }
}
