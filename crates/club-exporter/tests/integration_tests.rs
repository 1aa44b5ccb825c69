// Integration tests for the club exporter.
//
// These drive the page, content and background contexts together through the
// library's public API: intercepted responses flow from the page context to
// the background store, and console requests flow from the content context
// to the page and back.

use std::sync::Arc;
use std::time::Duration;

use club_core::protocol::{ExtensionResponse, PageEnvelope, RuntimeMessage};
use club_exporter::app::{self, Contexts, UiUpdate, UserCommand};
use club_exporter::background::{BackgroundEvent, COPY_MENU_ID};
use club_exporter::clipboard::MemoryClipboard;
use club_exporter::config::{
    ClipboardConfig, Config, ContextMenuConfig, InterceptorConfig, RelayConfig,
};
use club_exporter::content::{self, ContentContext, ContentHandle, RelayError};
use club_exporter::interceptor::ReadyState;
use club_exporter::page::PageEvent;
use club_exporter::ws_server::{HookEvent, WsEvent};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};

// ===========================================================================
// Test helpers
// ===========================================================================

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
            title: "Copy FC26 club roster".into(),
            document_url_patterns: vec!["https://www.ea.com/*".into()],
        },
    }
}

fn club_payload() -> Value {
    json!({
        "itemData": [
            {
                "id": 101,
                "resourceId": 5001,
                "itemType": "player",
                "rating": 91,
                "preferredPosition": "ST",
                "commonName": "Striker",
                "untradeable": true,
                "lastSalePrice": 0
            },
            {
                "id": 102,
                "resourceId": 5002,
                "itemType": "player",
                "rating": 84,
                "preferredPosition": "GK",
                "firstName": "Safe",
                "lastName": "Hands"
            },
            { "id": 900, "itemType": "training", "rating": 99 }
        ]
    })
}

fn squad_payload() -> Value {
    json!({ "squad": { "players": [{ "itemData": { "id": 101, "resourceId": 5001 } }] } })
}

async fn respond(page_tx: &mpsc::Sender<PageEvent>, request: u64, url: &str, body: Value) {
    page_tx
        .send(PageEvent::Open {
            request,
            method: "GET".into(),
            url: url.into(),
        })
        .await
        .unwrap();
    page_tx.send(PageEvent::Send { request }).await.unwrap();
    page_tx
        .send(PageEvent::ReadyStateChange {
            request,
            state: ReadyState::Done,
            body: Some(body.to_string()),
        })
        .await
        .unwrap();
}

async fn background_players(contexts: &Contexts) -> ExtensionResponse {
    let (reply, rx) = oneshot::channel();
    contexts
        .background_tx
        .send(BackgroundEvent::Runtime {
            message: RuntimeMessage::GetPlayers,
            reply: Some(reply),
        })
        .await
        .unwrap();
    rx.await.unwrap()
}

/// Poll the background store until it holds `count` players.
async fn wait_for_background_count(contexts: &Contexts, count: usize) -> ExtensionResponse {
    for _ in 0..200 {
        let response = background_players(contexts).await;
        if response.count == Some(count) {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("background store never reached {count} players");
}

/// Poll the content summary until the cached roster holds `count` players.
async fn wait_for_summary_count(content: &ContentHandle, count: usize) -> ExtensionResponse {
    for _ in 0..200 {
        let response = content.get_summary().await.unwrap();
        if response.count == Some(count) {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("content summary never reached {count} players");
}

/// Poll the memory clipboard until it has been written.
async fn wait_for_clipboard(clipboard: &MemoryClipboard) -> String {
    for _ in 0..200 {
        if let Some(text) = clipboard.contents() {
            return text;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("clipboard was never written");
}

// ===========================================================================
// Capture flow
// ===========================================================================

#[tokio::test]
async fn intercepted_club_reaches_background_store() {
    let contexts = app::spawn_contexts(&test_config(), Arc::new(MemoryClipboard::new()));

    respond(&contexts.page_tx, 1, "/ut/game/fc26/squad/active", squad_payload()).await;
    respond(&contexts.page_tx, 2, "/ut/game/fc26/club", club_payload()).await;

    let response = wait_for_background_count(&contexts, 2).await;
    let players = response.players.unwrap();
    let striker = players.iter().find(|p| p.id == "101").unwrap();
    assert_eq!(striker.resource_id, 5001);
    assert!(striker.active_squad);
    assert!(striker.untradeable);
    assert_eq!(striker.location.as_deref(), Some("club"));

    let keeper = players.iter().find(|p| p.id == "102").unwrap();
    assert!(!keeper.active_squad);
    assert_eq!(keeper.chem_style, "GK");

    contexts.shutdown();
}

#[tokio::test]
async fn ignored_responses_do_not_reach_background() {
    let contexts = app::spawn_contexts(&test_config(), Arc::new(MemoryClipboard::new()));

    // Cross-origin, auth failure, then a real capture.
    respond(&contexts.page_tx, 1, "https://evil.example.com/club", club_payload()).await;
    respond(
        &contexts.page_tx,
        2,
        "/ut/game/fc26/club",
        json!({ "code": 401, "itemData": [{ "id": 1, "rating": 80 }] }),
    )
    .await;
    respond(
        &contexts.page_tx,
        3,
        "/ut/game/fc26/club",
        json!([{ "id": 7, "rating": 70 }]),
    )
    .await;

    let response = wait_for_background_count(&contexts, 1).await;
    assert_eq!(response.players.unwrap()[0].id, "7");

    contexts.shutdown();
}

// ===========================================================================
// Console requests
// ===========================================================================

#[tokio::test]
async fn summary_copy_and_clear_round_trip() {
    let clipboard = Arc::new(MemoryClipboard::new());
    let contexts = app::spawn_contexts(&test_config(), clipboard.clone());

    // Nothing captured yet: summary answers with an empty roster.
    let summary = contexts.content.get_summary().await.unwrap();
    assert!(summary.success);
    assert_eq!(summary.count, Some(0));
    assert_eq!(summary.roster.as_deref(), Some(""));

    let copy = contexts.content.copy_roster().await.unwrap();
    assert!(!copy.success);
    assert_eq!(copy.error.as_deref(), Some("No club data captured yet"));
    assert!(clipboard.writes().is_empty());

    respond(&contexts.page_tx, 1, "/ut/game/fc26/club", club_payload()).await;
    wait_for_background_count(&contexts, 2).await;

    let summary = wait_for_summary_count(&contexts.content, 2).await;
    let roster = summary.roster.unwrap();
    assert!(roster.starts_with("Name\t"));
    assert_eq!(roster.lines().count(), 3);

    let copy = contexts.content.copy_roster().await.unwrap();
    assert!(copy.success);
    assert_eq!(clipboard.contents(), Some(roster));

    let clear = contexts.content.clear_roster().await.unwrap();
    assert!(clear.success);
    assert_eq!(clear.count, Some(0));
    wait_for_background_count(&contexts, 0).await;

    let summary = contexts.content.get_summary().await.unwrap();
    assert_eq!(summary.count, Some(0));

    contexts.shutdown();
}

#[tokio::test]
async fn summary_times_out_without_page_context() {
    tokio::time::pause();

    // Content context with no page listening on the bus.
    let (bus, _) = broadcast::channel::<PageEnvelope>(16);
    let (background_tx, _background_rx) = mpsc::channel(16);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let content_ctx = ContentContext::new(
        bus.clone(),
        background_tx,
        Arc::new(MemoryClipboard::new()),
        RelayConfig::default().request_timeout(),
    );
    tokio::spawn(content::run(cmd_rx, bus.subscribe(), content_ctx));
    let handle = ContentHandle::new(cmd_tx);

    let timeout = Duration::from_millis(2000);

    let started = tokio::time::Instant::now();
    let result = handle.get_summary().await;
    assert_eq!(result, Err(RelayError::Timeout));
    assert!(started.elapsed() >= timeout);

    let started = tokio::time::Instant::now();
    let result = handle.clear_roster().await;
    assert_eq!(result, Err(RelayError::Timeout));
    assert!(started.elapsed() >= timeout);
}

// ===========================================================================
// App loop
// ===========================================================================

#[tokio::test]
async fn hook_events_and_menu_click_through_app_loop() {
    let clipboard = Arc::new(MemoryClipboard::new());
    let contexts = app::spawn_contexts(&test_config(), clipboard.clone());

    let (ws_tx, ws_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, mut ui_rx) = mpsc::channel(64);
    let app_handle = tokio::spawn(app::run(ws_rx, cmd_rx, ui_tx, contexts));

    let body = club_payload().to_string();
    for event in [
        HookEvent::Open {
            request: 1,
            method: "get".into(),
            url: "https://www.ea.com/ut/game/fc26/club?start=0".into(),
        },
        HookEvent::Send { request: 1 },
        HookEvent::ReadyStateChange {
            request: 1,
            ready_state: ReadyState::Done,
            response_text: Some(body),
        },
    ] {
        ws_tx.send(WsEvent::Hook(event)).await.unwrap();
    }

    // Wait until the content context has seen the page's roster state.
    let mut cached = 0;
    for _ in 0..200 {
        cmd_tx.send(UserCommand::Summary).await.unwrap();
        if let UiUpdate::Response { response, .. } = ui_rx.recv().await.unwrap() {
            cached = response.count.unwrap_or(0);
        }
        if cached == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(cached, 2);

    ws_tx
        .send(WsEvent::Hook(HookEvent::ContextMenu {
            menu_item_id: COPY_MENU_ID.into(),
        }))
        .await
        .unwrap();
    let copied = wait_for_clipboard(&clipboard).await;
    assert!(copied.contains("Striker"));

    cmd_tx.send(UserCommand::Players).await.unwrap();
    match ui_rx.recv().await.unwrap() {
        UiUpdate::Response { command, response } => {
            assert_eq!(command, UserCommand::Players);
            assert_eq!(response.count, Some(2));
        }
        other => panic!("expected players response, got {other:?}"),
    }

    cmd_tx.send(UserCommand::Quit).await.unwrap();
    assert!(app_handle.await.unwrap().is_ok());
}
