// Page context: runs alongside the game's web client.
//
// Owns the network interceptor and a page-side player store. Intercepted
// payloads are broadcast on the page bus for the content context; roster
// state is broadcast after every club payload and on request.

use club_core::export;
use club_core::normalize::{extract_items, squad_membership};
use club_core::protocol::{PageEnvelope, PageMessage, RosterSnapshot};
use club_core::PlayerStore;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::InterceptorConfig;
use crate::interceptor::{Interceptor, Intercepted, ReadyState, RequestId};

/// Request lifecycle observations reported by the browser hook.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Open {
        request: RequestId,
        method: String,
        url: String,
    },
    Send {
        request: RequestId,
    },
    ReadyStateChange {
        request: RequestId,
        state: ReadyState,
        body: Option<String>,
    },
}

pub struct PageContext {
    interceptor: Interceptor,
    store: PlayerStore,
    bus: broadcast::Sender<PageEnvelope>,
}

impl PageContext {
    pub fn new(config: &InterceptorConfig, bus: broadcast::Sender<PageEnvelope>) -> Self {
        Self {
            interceptor: Interceptor::new(config),
            store: PlayerStore::new(),
            bus,
        }
    }

    pub fn store(&self) -> &PlayerStore {
        &self.store
    }

    /// Apply one request lifecycle observation.
    pub fn handle_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::Open {
                request,
                method,
                url,
            } => self.interceptor.open(request, &method, &url),
            PageEvent::Send { request } => {
                if !self.interceptor.instrument(request) {
                    debug!("Request {} already instrumented", request);
                }
            }
            PageEvent::ReadyStateChange {
                request,
                state,
                body,
            } => {
                if let Some(intercepted) =
                    self.interceptor
                        .ready_state_change(request, state, body.as_deref())
                {
                    self.handle_intercepted(intercepted);
                }
            }
        }
    }

    /// React to a broadcast from the extension side. Page-sourced messages
    /// (including our own) are ignored.
    pub fn handle_bus_message(&mut self, envelope: PageEnvelope) {
        if !envelope.is_from_extension() {
            return;
        }
        match envelope.message {
            PageMessage::RequestState { request_id } => {
                debug!("State requested ({})", request_id);
                self.post_state(Some(request_id));
            }
            PageMessage::ClearRoster { request_id } => {
                info!("Clearing page roster ({} players)", self.store.len());
                self.store.clear();
                self.post_state(Some(request_id));
            }
            other => debug!("Ignoring extension message on page bus: {:?}", other),
        }
    }

    /// Current roster as text plus records.
    pub fn snapshot(&self) -> RosterSnapshot {
        let players = self.store.snapshot();
        let roster = export::roster_text(&players).unwrap_or_else(|e| {
            warn!("Failed to render roster export: {}", e);
            String::new()
        });
        RosterSnapshot {
            count: players.len(),
            roster,
            players,
        }
    }

    fn handle_intercepted(&mut self, intercepted: Intercepted) {
        match intercepted {
            Intercepted::Club(payload) => {
                let items = extract_items(&payload);
                let stored = self.store.upsert_many(&items);
                info!(
                    "Club payload intercepted: {} items, {} players stored",
                    items.len(),
                    stored.len()
                );
                self.post(PageMessage::Club { payload });
                self.post_state(None);
            }
            Intercepted::Squad(payload) => {
                let membership = squad_membership(&payload);
                info!("Active squad intercepted: {} players", membership.len());
                self.store.set_active_squad(membership);
                self.post(PageMessage::Squad { payload });
            }
        }
    }

    fn post_state(&self, request_id: Option<String>) {
        self.post(PageMessage::State {
            request_id,
            snapshot: self.snapshot(),
        });
    }

    fn post(&self, message: PageMessage) {
        if self.bus.send(PageEnvelope::from_page(message)).is_err() {
            debug!("No page bus listeners");
        }
    }
}

/// Page context event loop. Exits when the hook event channel closes.
pub async fn run(
    mut events: mpsc::Receiver<PageEvent>,
    mut bus_rx: broadcast::Receiver<PageEnvelope>,
    mut page: PageContext,
) {
    info!("Page context started");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => page.handle_event(event),
                None => break,
            },
            msg = bus_rx.recv() => match msg {
                Ok(envelope) => page.handle_bus_message(envelope),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Page context lagged, {} bus messages skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    info!("Page context exiting");
}
