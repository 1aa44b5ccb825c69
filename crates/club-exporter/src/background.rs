// Background context: owns the player store and the context-menu action.

use club_core::protocol::{ExtensionResponse, RuntimeMessage};
use club_core::PlayerStore;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ContextMenuConfig;
use crate::content::ContentHandle;

/// Id of the context-menu entry that copies the roster.
pub const COPY_MENU_ID: &str = "fc26-copy-roster";

/// A registered context-menu entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMenuEntry {
    pub id: String,
    pub title: String,
    pub contexts: Vec<String>,
    pub document_url_patterns: Vec<String>,
}

#[derive(Debug)]
pub enum BackgroundEvent {
    /// Extension installed or updated.
    Installed,
    /// A context-menu entry was clicked in `tab`.
    MenuClicked {
        menu_item_id: String,
        tab: Option<ContentHandle>,
    },
    Runtime {
        message: RuntimeMessage,
        reply: Option<oneshot::Sender<ExtensionResponse>>,
    },
}

pub struct BackgroundController {
    store: PlayerStore,
    menu_config: ContextMenuConfig,
    menus: Vec<ContextMenuEntry>,
}

impl BackgroundController {
    pub fn new(menu_config: ContextMenuConfig) -> Self {
        Self {
            store: PlayerStore::new(),
            menu_config,
            menus: Vec::new(),
        }
    }

    pub fn store(&self) -> &PlayerStore {
        &self.store
    }

    /// Registered context-menu entries.
    pub fn menus(&self) -> &[ContextMenuEntry] {
        &self.menus
    }

    pub fn handle_event(&mut self, event: BackgroundEvent) {
        match event {
            BackgroundEvent::Installed => self.register_menu(),
            BackgroundEvent::MenuClicked { menu_item_id, tab } => {
                self.handle_menu_click(&menu_item_id, tab)
            }
            BackgroundEvent::Runtime { message, reply } => {
                let response = self.handle_runtime(message);
                if let Some(reply) = reply {
                    let _ = reply.send(response);
                }
            }
        }
    }

    fn register_menu(&mut self) {
        let entry = ContextMenuEntry {
            id: COPY_MENU_ID.to_string(),
            title: self.menu_config.title.clone(),
            contexts: vec!["all".to_string()],
            document_url_patterns: self.menu_config.document_url_patterns.clone(),
        };
        self.menus.retain(|m| m.id != entry.id);
        info!(
            "Registered context menu '{}' for {} URL patterns",
            entry.title,
            entry.document_url_patterns.len()
        );
        self.menus.push(entry);
    }

    /// Ask the tab to copy its roster. Failures are logged, never surfaced.
    fn handle_menu_click(&self, menu_item_id: &str, tab: Option<ContentHandle>) {
        if menu_item_id != COPY_MENU_ID {
            debug!("Ignoring click on unknown menu item {}", menu_item_id);
            return;
        }
        let Some(tab) = tab else {
            warn!("Copy menu clicked without an active tab");
            return;
        };
        tokio::spawn(async move {
            match tab.copy_roster().await {
                Ok(response) if response.success => {
                    info!("Roster copied from context menu");
                }
                Ok(response) => {
                    warn!(
                        "Copy from context menu failed: {}",
                        response.error.as_deref().unwrap_or("unknown error")
                    );
                }
                Err(e) => warn!("Failed to deliver copy request to tab: {}", e),
            }
        });
    }

    fn handle_runtime(&mut self, message: RuntimeMessage) -> ExtensionResponse {
        match message {
            RuntimeMessage::Club { items } => {
                let items = match items {
                    Value::Array(items) => items,
                    other => {
                        warn!(
                            "Club message without an item list ({}), treating as empty",
                            kind_of(&other)
                        );
                        Vec::new()
                    }
                };
                let stored = self.store.upsert_many(&items);
                info!(
                    "Stored {} club players ({} in store)",
                    stored.len(),
                    self.store.len()
                );
                ExtensionResponse::ok().with_count(stored.len())
            }
            RuntimeMessage::SquadMembership { membership } => {
                self.store.set_active_squad_membership(&membership);
                ExtensionResponse::ok()
            }
            RuntimeMessage::ClearStore => {
                info!("Clearing background store ({} players)", self.store.len());
                self.store.clear();
                ExtensionResponse::ok().with_count(0)
            }
            RuntimeMessage::GetPlayers => {
                let players = self.store.snapshot();
                ExtensionResponse {
                    success: true,
                    count: Some(players.len()),
                    players: Some(players),
                    ..ExtensionResponse::default()
                }
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Background event loop. Messages are handled one at a time, which is the
/// only writer discipline the store relies on.
pub async fn run(
    mut events: mpsc::Receiver<BackgroundEvent>,
    mut controller: BackgroundController,
) {
    info!("Background context started");
    while let Some(event) = events.recv().await {
        controller.handle_event(event);
    }
    info!("Background context exiting");
}
