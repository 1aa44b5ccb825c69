// Content context: relays between the page bus and the background context
// and serves summary / copy / clear requests.
//
// Requests that need the page's answer are correlated by a generated
// request id. The waiter for an id lives in `pending` until the matching
// `state` broadcast arrives or the timeout fires; an expired id is removed
// so a late reply finds nothing to resolve.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use club_core::normalize::{extract_items, squad_membership};
use club_core::protocol::{
    ExtensionResponse, PageEnvelope, PageMessage, RosterSnapshot, RuntimeMessage, TabMessage,
    NO_DATA_ERROR,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::background::BackgroundEvent;
use crate::clipboard::Clipboard;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("timed out waiting for the page to respond")]
    Timeout,

    #[error("{0} context is not running")]
    ContextClosed(&'static str),
}

type Reply = oneshot::Sender<Result<ExtensionResponse, RelayError>>;

/// Mailbox entry for the content context.
#[derive(Debug)]
pub struct ContentCommand {
    pub message: TabMessage,
    pub reply: Reply,
}

/// Cloneable address of a tab's content context.
#[derive(Debug, Clone)]
pub struct ContentHandle {
    tx: mpsc::Sender<ContentCommand>,
}

impl ContentHandle {
    pub fn new(tx: mpsc::Sender<ContentCommand>) -> Self {
        Self { tx }
    }

    /// Deliver a tab message and wait for the structured reply.
    pub async fn request(&self, message: TabMessage) -> Result<ExtensionResponse, RelayError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(ContentCommand { message, reply })
            .await
            .map_err(|_| RelayError::ContextClosed("content"))?;
        reply_rx
            .await
            .map_err(|_| RelayError::ContextClosed("content"))?
    }

    pub async fn get_summary(&self) -> Result<ExtensionResponse, RelayError> {
        self.request(TabMessage::GetSummary).await
    }

    pub async fn copy_roster(&self) -> Result<ExtensionResponse, RelayError> {
        self.request(TabMessage::CopyRoster).await
    }

    pub async fn clear_roster(&self) -> Result<ExtensionResponse, RelayError> {
        self.request(TabMessage::ClearRoster).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Summary,
    Clear,
}

#[derive(Debug)]
struct Pending {
    kind: PendingKind,
    waiter: oneshot::Sender<RosterSnapshot>,
}

pub struct ContentContext {
    bus: broadcast::Sender<PageEnvelope>,
    background: mpsc::Sender<BackgroundEvent>,
    clipboard: Arc<dyn Clipboard>,
    timeout: Duration,
    cache: RosterSnapshot,
    ready: bool,
    pending: HashMap<String, Pending>,
    next_request: u64,
    expire_tx: mpsc::UnboundedSender<String>,
    expire_rx: Option<mpsc::UnboundedReceiver<String>>,
}

impl ContentContext {
    pub fn new(
        bus: broadcast::Sender<PageEnvelope>,
        background: mpsc::Sender<BackgroundEvent>,
        clipboard: Arc<dyn Clipboard>,
        timeout: Duration,
    ) -> Self {
        let (expire_tx, expire_rx) = mpsc::unbounded_channel();
        Self {
            bus,
            background,
            clipboard,
            timeout,
            cache: RosterSnapshot::default(),
            ready: false,
            pending: HashMap::new(),
            next_request: 0,
            expire_tx,
            expire_rx: Some(expire_rx),
        }
    }

    pub fn handle_command(&mut self, command: ContentCommand) {
        let ContentCommand { message, reply } = command;
        match message {
            TabMessage::GetSummary => {
                if self.ready {
                    let _ = reply.send(Ok(ExtensionResponse::summary(self.cache.clone())));
                } else {
                    self.request_from_page(PendingKind::Summary, reply);
                }
            }
            TabMessage::CopyRoster => self.copy_roster(reply),
            TabMessage::ClearRoster => self.request_from_page(PendingKind::Clear, reply),
        }
    }

    pub async fn handle_bus_message(&mut self, envelope: PageEnvelope) {
        if !envelope.is_from_page() {
            return;
        }
        match envelope.message {
            PageMessage::Club { payload } => {
                let items = extract_items(&payload);
                debug!("Relaying {} club items to background", items.len());
                self.notify_background(RuntimeMessage::Club {
                    items: Value::Array(items),
                })
                .await;
            }
            PageMessage::Squad { payload } => {
                let membership: Map<String, Value> = squad_membership(&payload)
                    .into_iter()
                    .map(|(resource_id, active)| (resource_id.to_string(), Value::Bool(active)))
                    .collect();
                self.notify_background(RuntimeMessage::SquadMembership {
                    membership: Value::Object(membership),
                })
                .await;
            }
            PageMessage::State {
                request_id,
                snapshot,
            } => {
                self.cache = snapshot;
                self.ready = true;
                if let Some(id) = request_id {
                    self.resolve(&id).await;
                }
            }
            PageMessage::RequestState { .. } | PageMessage::ClearRoster { .. } => {}
        }
    }

    /// Drop the waiter for an expired request id.
    pub fn expire(&mut self, request_id: &str) {
        if self.pending.remove(request_id).is_some() {
            debug!("Request {} expired", request_id);
        }
    }

    fn request_from_page(&mut self, kind: PendingKind, reply: Reply) {
        self.next_request += 1;
        let request_id = format!("req-{}", self.next_request);
        let (waiter, waiter_rx) = oneshot::channel();
        self.pending
            .insert(request_id.clone(), Pending { kind, waiter });

        let message = match kind {
            PendingKind::Summary => PageMessage::RequestState {
                request_id: request_id.clone(),
            },
            PendingKind::Clear => PageMessage::ClearRoster {
                request_id: request_id.clone(),
            },
        };
        if self.bus.send(PageEnvelope::from_extension(message)).is_err() {
            debug!("No page bus listeners for {}", request_id);
        }

        let timeout = self.timeout;
        let expire_tx = self.expire_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, waiter_rx).await {
                Ok(Ok(snapshot)) => Ok(match kind {
                    PendingKind::Summary => ExtensionResponse::summary(snapshot),
                    PendingKind::Clear => ExtensionResponse::ok().with_count(snapshot.count),
                }),
                Ok(Err(_)) => Err(RelayError::ContextClosed("content")),
                Err(_) => {
                    warn!("Request {} timed out after {:?}", request_id, timeout);
                    let _ = expire_tx.send(request_id);
                    Err(RelayError::Timeout)
                }
            };
            let _ = reply.send(result);
        });
    }

    async fn resolve(&mut self, request_id: &str) {
        let Some(pending) = self.pending.remove(request_id) else {
            debug!("Ignoring state for unknown request {}", request_id);
            return;
        };
        // The waiter task drops its receiver the moment the timeout fires,
        // before the expiry reaches this actor.
        if pending.waiter.is_closed() {
            debug!("Ignoring state for expired request {}", request_id);
            return;
        }
        if pending.kind == PendingKind::Clear {
            info!("Roster cleared");
            self.notify_background(RuntimeMessage::ClearStore).await;
        }
        let _ = pending.waiter.send(self.cache.clone());
    }

    fn copy_roster(&self, reply: Reply) {
        if self.cache.roster.is_empty() {
            let _ = reply.send(Ok(ExtensionResponse::failure(NO_DATA_ERROR)));
            return;
        }
        let clipboard = Arc::clone(&self.clipboard);
        let text = self.cache.roster.clone();
        let count = self.cache.count;
        tokio::spawn(async move {
            let response = match clipboard.write_text(&text).await {
                Ok(()) => {
                    info!("Copied roster ({} players) to clipboard", count);
                    ExtensionResponse::ok().with_count(count)
                }
                Err(e) => {
                    warn!("Clipboard write failed: {}", e);
                    ExtensionResponse::failure(e.to_string())
                }
            };
            let _ = reply.send(Ok(response));
        });
    }

    async fn notify_background(&self, message: RuntimeMessage) {
        let event = BackgroundEvent::Runtime {
            message,
            reply: None,
        };
        if self.background.send(event).await.is_err() {
            warn!("Background context is not running, message dropped");
        }
    }
}

/// Content context event loop. Exits when every [`ContentHandle`] is gone.
pub async fn run(
    mut commands: mpsc::Receiver<ContentCommand>,
    mut bus_rx: broadcast::Receiver<PageEnvelope>,
    mut content: ContentContext,
) {
    info!("Content context started");
    let Some(mut expire_rx) = content.expire_rx.take() else {
        warn!("Content context already ran");
        return;
    };
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => content.handle_command(cmd),
                None => break,
            },
            msg = bus_rx.recv() => match msg {
                Ok(envelope) => content.handle_bus_message(envelope).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Content context lagged, {} bus messages skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            Some(request_id) = expire_rx.recv() => content.expire(&request_id),
        }
    }
    info!("Content context exiting");
}
