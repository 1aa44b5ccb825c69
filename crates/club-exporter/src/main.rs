// Club exporter entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, stdout belongs to the console)
// 2. Load config
// 3. Build the clipboard and spawn the page, content and background contexts
// 4. Create mpsc channels
// 5. Spawn WebSocket server task
// 6. Spawn app logic task
// 7. Run the console until quit or EOF
// 8. Cleanup on exit

use club_exporter::app;
use club_exporter::clipboard;
use club_exporter::config;
use club_exporter::console;
use club_exporter::ws_server;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Club exporter starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: origin={}, relay timeout {}ms",
        config.interceptor.page_origin, config.relay.request_timeout_ms
    );

    // 3. Clipboard and contexts
    let clipboard = clipboard::from_command(&config.clipboard.command);
    if config.clipboard.command.is_empty() {
        info!("No clipboard command configured, copy requests will fail");
    }
    let contexts = app::spawn_contexts(&config, clipboard);

    // 4. Channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 5. WebSocket server
    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(ws_port, ws_tx).await {
            error!("WebSocket server error on port {}: {}", ws_port, e);
        }
    });

    // 6. App loop
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(ws_rx, cmd_rx, ui_tx, contexts).await {
            error!("Application loop error: {}", e);
        }
    });

    // 7. Console (blocks until quit or EOF)
    info!("Application ready. WebSocket server listening on 127.0.0.1:{}", ws_port);
    if let Err(e) = console::run(ui_rx, cmd_tx).await {
        error!("Console error: {}", e);
    }

    // 8. Cleanup: wait for app task to finish (with timeout)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    // Abort WebSocket server (it loops forever)
    ws_handle.abort();

    info!("Club exporter shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (stdout carries console output).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("club-exporter.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("club_exporter=info,club_core=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
