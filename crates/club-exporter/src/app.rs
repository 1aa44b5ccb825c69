// Application wiring and orchestration.
//
// Spawns the page, content and background contexts as separate tasks that
// share nothing but channels, then runs the central loop that routes hook
// events from the WebSocket into the page context and console commands into
// the content and background contexts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use club_core::protocol::{ExtensionResponse, RuntimeMessage};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::background::{self, BackgroundController, BackgroundEvent, COPY_MENU_ID};
use crate::clipboard::Clipboard;
use crate::config::Config;
use crate::content::{self, ContentContext, ContentHandle, RelayError};
use crate::page::{self, PageContext, PageEvent};
use crate::ws_server::{HookEvent, WsEvent};

const PAGE_BUS_CAPACITY: usize = 256;
const MAILBOX_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Console-facing types
// ---------------------------------------------------------------------------

/// Commands issued by the user from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Summary,
    Copy,
    Clear,
    Players,
    /// Simulates a click on the copy context-menu entry.
    Menu,
    Quit,
}

impl UserCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserCommand::Summary => "summary",
            UserCommand::Copy => "copy",
            UserCommand::Clear => "clear",
            UserCommand::Players => "players",
            UserCommand::Menu => "menu",
            UserCommand::Quit => "quit",
        }
    }
}

impl fmt::Display for UserCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" | "s" => Ok(UserCommand::Summary),
            "copy" | "c" => Ok(UserCommand::Copy),
            "clear" => Ok(UserCommand::Clear),
            "players" | "p" => Ok(UserCommand::Players),
            "menu" | "m" => Ok(UserCommand::Menu),
            "quit" | "q" | "exit" => Ok(UserCommand::Quit),
            other => Err(format!("unknown command: {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Updates pushed to the console.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    ConnectionStatus(ConnectionStatus),
    Response {
        command: UserCommand,
        response: ExtensionResponse,
    },
    Failed {
        command: UserCommand,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Context wiring
// ---------------------------------------------------------------------------

/// Addresses of the running contexts.
pub struct Contexts {
    pub page_tx: mpsc::Sender<PageEvent>,
    pub content: ContentHandle,
    pub background_tx: mpsc::Sender<BackgroundEvent>,
    handles: Vec<JoinHandle<()>>,
}

impl Contexts {
    /// Abort every context task.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Spawn the page, content and background contexts.
///
/// Bus receivers are subscribed before any task starts so no broadcast is
/// missed. The background context is installed before it starts receiving.
pub fn spawn_contexts(config: &Config, clipboard: Arc<dyn Clipboard>) -> Contexts {
    let (bus, _) = broadcast::channel(PAGE_BUS_CAPACITY);
    let (page_tx, page_rx) = mpsc::channel(MAILBOX_CAPACITY);
    let (content_tx, content_rx) = mpsc::channel(MAILBOX_CAPACITY);
    let (background_tx, background_rx) = mpsc::channel(MAILBOX_CAPACITY);

    let mut controller = BackgroundController::new(config.context_menu.clone());
    controller.handle_event(BackgroundEvent::Installed);

    let page_ctx = PageContext::new(&config.interceptor, bus.clone());
    let content_ctx = ContentContext::new(
        bus.clone(),
        background_tx.clone(),
        clipboard,
        config.relay.request_timeout(),
    );

    let handles = vec![
        tokio::spawn(page::run(page_rx, bus.subscribe(), page_ctx)),
        tokio::spawn(content::run(content_rx, bus.subscribe(), content_ctx)),
        tokio::spawn(background::run(background_rx, controller)),
    ];

    Contexts {
        page_tx,
        content: ContentHandle::new(content_tx),
        background_tx,
        handles,
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run the application event loop.
///
/// Listens on the WebSocket event channel and the console command channel
/// and pushes results through `ui_tx`. Returns on `Quit` or when either
/// input channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    contexts: Contexts,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { addr }) => {
                        info!("Browser hook connected from {}", addr);
                        let status = UiUpdate::ConnectionStatus(ConnectionStatus::Connected);
                        let _ = ui_tx.send(status).await;
                    }
                    Some(WsEvent::Disconnected) => {
                        info!("Browser hook disconnected");
                        let status = UiUpdate::ConnectionStatus(ConnectionStatus::Disconnected);
                        let _ = ui_tx.send(status).await;
                    }
                    Some(WsEvent::Hook(event)) => route_hook_event(&contexts, event).await,
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => dispatch_command(&contexts, cmd, &ui_tx).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    contexts.shutdown();
    info!("Application event loop exiting");
    Ok(())
}

async fn route_hook_event(contexts: &Contexts, event: HookEvent) {
    let page_event = match event {
        HookEvent::Open {
            request,
            method,
            url,
        } => PageEvent::Open {
            request,
            method,
            url,
        },
        HookEvent::Send { request } => PageEvent::Send { request },
        HookEvent::ReadyStateChange {
            request,
            ready_state,
            response_text,
        } => PageEvent::ReadyStateChange {
            request,
            state: ready_state,
            body: response_text,
        },
        HookEvent::ContextMenu { menu_item_id } => {
            click_menu(contexts, menu_item_id).await;
            return;
        }
    };
    if contexts.page_tx.send(page_event).await.is_err() {
        warn!("Page context is not running, hook event dropped");
    }
}

async fn click_menu(contexts: &Contexts, menu_item_id: String) {
    let event = BackgroundEvent::MenuClicked {
        menu_item_id,
        tab: Some(contexts.content.clone()),
    };
    if contexts.background_tx.send(event).await.is_err() {
        warn!("Background context is not running, menu click dropped");
    }
}

/// Run a console command without blocking the loop: each request is
/// awaited on its own task and its result pushed to the UI.
async fn dispatch_command(
    contexts: &Contexts,
    command: UserCommand,
    ui_tx: &mpsc::Sender<UiUpdate>,
) {
    debug!("Dispatching console command {}", command);
    match command {
        UserCommand::Summary | UserCommand::Copy | UserCommand::Clear => {
            let content = contexts.content.clone();
            let ui_tx = ui_tx.clone();
            tokio::spawn(async move {
                let result = match command {
                    UserCommand::Summary => content.get_summary().await,
                    UserCommand::Copy => content.copy_roster().await,
                    _ => content.clear_roster().await,
                };
                let _ = ui_tx.send(to_update(command, result)).await;
            });
        }
        UserCommand::Players => {
            let (reply, reply_rx) = oneshot::channel();
            let event = BackgroundEvent::Runtime {
                message: RuntimeMessage::GetPlayers,
                reply: Some(reply),
            };
            if contexts.background_tx.send(event).await.is_err() {
                let _ = ui_tx
                    .send(to_update(command, Err(RelayError::ContextClosed("background"))))
                    .await;
                return;
            }
            let ui_tx = ui_tx.clone();
            tokio::spawn(async move {
                let result = reply_rx
                    .await
                    .map_err(|_| RelayError::ContextClosed("background"));
                let _ = ui_tx.send(to_update(command, result)).await;
            });
        }
        UserCommand::Menu => click_menu(contexts, COPY_MENU_ID.to_string()).await,
        UserCommand::Quit => {}
    }
}

fn to_update(command: UserCommand, result: Result<ExtensionResponse, RelayError>) -> UiUpdate {
    match result {
        Ok(response) => UiUpdate::Response { command, response },
        Err(e) => UiUpdate::Failed {
            command,
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::config::{ClipboardConfig, ContextMenuConfig, InterceptorConfig, RelayConfig};

    fn test_config() -> Config {
        Config {
            ws_port: 9017,
            interceptor: InterceptorConfig {
                page_origin: "https://www.ea.com".into(),
                club_path_suffix: "/club".into(),
                squad_path_suffix: "/squad/active".into(),
                auth_failure_code: 401,
            },
            relay: RelayConfig::default(),
            clipboard: ClipboardConfig::default(),
            context_menu: ContextMenuConfig {
                title: "Copy roster".into(),
                document_url_patterns: vec!["https://www.ea.com/*".into()],
            },
        }
    }

    #[test]
    fn user_command_parsing() {
        assert_eq!("summary".parse::<UserCommand>(), Ok(UserCommand::Summary));
        assert_eq!(" COPY ".parse::<UserCommand>(), Ok(UserCommand::Copy));
        assert_eq!("q".parse::<UserCommand>(), Ok(UserCommand::Quit));
        assert!("dance".parse::<UserCommand>().is_err());
    }

    #[tokio::test]
    async fn event_loop_handles_quit_command() {
        let contexts = spawn_contexts(&test_config(), Arc::new(MemoryClipboard::new()));
        let (_ws_tx, ws_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, _ui_rx) = mpsc::channel(16);

        let handle = tokio::spawn(run(ws_rx, cmd_rx, ui_tx, contexts));
        cmd_tx.send(UserCommand::Quit).await.unwrap();

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn event_loop_reports_connection_status() {
        let contexts = spawn_contexts(&test_config(), Arc::new(MemoryClipboard::new()));
        let (ws_tx, ws_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run(ws_rx, cmd_rx, ui_tx, contexts));

        ws_tx
            .send(WsEvent::Connected {
                addr: "127.0.0.1:5555".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            ui_rx.recv().await.unwrap(),
            UiUpdate::ConnectionStatus(ConnectionStatus::Connected)
        );

        ws_tx.send(WsEvent::Disconnected).await.unwrap();
        assert_eq!(
            ui_rx.recv().await.unwrap(),
            UiUpdate::ConnectionStatus(ConnectionStatus::Disconnected)
        );

        cmd_tx.send(UserCommand::Quit).await.unwrap();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn copy_before_capture_reports_no_data() {
        let contexts = spawn_contexts(&test_config(), Arc::new(MemoryClipboard::new()));
        let (_ws_tx, ws_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run(ws_rx, cmd_rx, ui_tx, contexts));

        cmd_tx.send(UserCommand::Copy).await.unwrap();
        match ui_rx.recv().await.unwrap() {
            UiUpdate::Response { command, response } => {
                assert_eq!(command, UserCommand::Copy);
                assert_eq!(response.error.as_deref(), Some("No club data captured yet"));
            }
            other => panic!("expected response, got {other:?}"),
        }

        cmd_tx.send(UserCommand::Quit).await.unwrap();
        let _ = handle.await;
    }
}
