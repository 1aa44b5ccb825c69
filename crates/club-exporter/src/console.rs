// Line-oriented console: commands on stdin, JSON lines on stdout.

use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::{ConnectionStatus, UiUpdate, UserCommand};

/// Run the console on the process's stdin and stdout until the user quits
/// or stdin reaches EOF.
pub async fn run(
    ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_with(stdin, tokio::io::stdout(), ui_rx, cmd_tx).await
}

/// Console loop over arbitrary input and output streams.
///
/// Each input line is parsed as a [`UserCommand`]; unknown commands are
/// reported on the output and otherwise ignored. Every [`UiUpdate`] is
/// written as one JSON line. EOF on the input is treated as `quit`.
pub async fn run_with<R, W>(
    input: R,
    mut output: W,
    mut ui_rx: mpsc::Receiver<UiUpdate>,
    cmd_tx: mpsc::Sender<UserCommand>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => {
                        info!("Console input closed");
                        let _ = cmd_tx.send(UserCommand::Quit).await;
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<UserCommand>() {
                    Ok(cmd) => {
                        debug!("Console command: {}", cmd);
                        if cmd_tx.send(cmd).await.is_err() || cmd == UserCommand::Quit {
                            break;
                        }
                    }
                    Err(e) => write_line(&mut output, &json!({ "error": e }).to_string()).await?,
                }
            }

            update = ui_rx.recv() => {
                match update {
                    Some(update) => write_line(&mut output, &render_update(&update)).await?,
                    None => break,
                }
            }
        }
    }

    output.flush().await?;
    Ok(())
}

/// Render one UI update as a single JSON line (without the newline).
pub fn render_update(update: &UiUpdate) -> String {
    let value = match update {
        UiUpdate::ConnectionStatus(status) => json!({
            "event": "connection",
            "connected": *status == ConnectionStatus::Connected,
        }),
        UiUpdate::Response { command, response } => json!({
            "command": command.as_str(),
            "response": response,
        }),
        UiUpdate::Failed { command, error } => json!({
            "command": command.as_str(),
            "error": error,
        }),
    };
    value.to_string()
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> std::io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
