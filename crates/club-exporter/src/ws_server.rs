// WebSocket ingress for the browser hook.
//
// The hook runs in the game's web client and reports request lifecycle
// observations and context-menu clicks as JSON text frames.

use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::interceptor::{ReadyState, RequestId};

/// One observation from the browser hook.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HookEvent {
    Open {
        request: RequestId,
        method: String,
        url: String,
    },
    Send {
        request: RequestId,
    },
    #[serde(rename_all = "camelCase")]
    ReadyStateChange {
        request: RequestId,
        ready_state: ReadyState,
        #[serde(default)]
        response_text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ContextMenu { menu_item_id: String },
}

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug, PartialEq)]
pub enum WsEvent {
    Connected { addr: String },
    Disconnected,
    Hook(HookEvent),
}

/// Run the WebSocket server on `127.0.0.1:{port}`, one client at a time,
/// forwarding events through `tx`. Returns when `tx` is closed.
pub async fn run(port: u16, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    info!("WebSocket server listening on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr = addr.to_string();
        info!("Accepted TCP connection from {addr}");

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake failed for {addr}: {e}");
                continue;
            }
        };

        if tx
            .send(WsEvent::Connected { addr: addr.clone() })
            .await
            .is_err()
        {
            break;
        }

        let (_write, read) = ws_stream.split();
        if process_message_stream(read, &tx, &addr).await.is_err() {
            break;
        }

        if tx.send(WsEvent::Disconnected).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// Parse text frames from `stream` into [`HookEvent`]s and forward them.
/// Frames that are not valid hook events are logged and skipped. Returns
/// `Err(())` once the receiver is gone.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event: HookEvent = match serde_json::from_str(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Unrecognized hook message from {addr}: {e}");
                        continue;
                    }
                };
                if tx.send(WsEvent::Hook(event)).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            Ok(other) => debug!("Ignoring non-text frame from {addr}: {other:?}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    #[tokio::test]
    async fn open_event_forwarded() {
        let (tx, mut rx) = mpsc::channel(16);
        let frame = r#"{"kind":"open","request":1,"method":"GET","url":"/ut/game/fc26/club"}"#;
        process_message_stream(mock_stream(vec![Ok(Message::Text(frame.into()))]), &tx, "test")
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            WsEvent::Hook(HookEvent::Open {
                request: 1,
                method: "GET".into(),
                url: "/ut/game/fc26/club".into(),
            })
        );
    }

    #[tokio::test]
    async fn ready_state_change_parses_camel_case_fields() {
        let (tx, mut rx) = mpsc::channel(16);
        let frame = r#"{"kind":"readyStateChange","request":4,"readyState":4,"responseText":"{}"}"#;
        process_message_stream(mock_stream(vec![Ok(Message::Text(frame.into()))]), &tx, "test")
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            WsEvent::Hook(HookEvent::ReadyStateChange {
                request: 4,
                ready_state: ReadyState::Done,
                response_text: Some("{}".into()),
            })
        );
    }

    #[tokio::test]
    async fn invalid_frames_are_skipped() {
        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![
            Ok(Message::Text("not json".into())),
            Ok(Message::Text(r#"{"kind":"unknown"}"#.into())),
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Text(r#"{"kind":"contextMenu","menuItemId":"fc26-copy-roster"}"#.into())),
        ];
        process_message_stream(mock_stream(messages), &tx, "test")
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            WsEvent::Hook(HookEvent::ContextMenu {
                menu_item_id: "fc26-copy-roster".into()
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"kind":"send","request":1}"#.into())),
        ];
        process_message_stream(mock_stream(messages), &tx, "test")
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn returns_err_when_channel_closed() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let messages = vec![Ok(Message::Text(r#"{"kind":"send","request":1}"#.into()))];
        assert!(process_message_stream(mock_stream(messages), &tx, "test")
            .await
            .is_err());
    }
}
