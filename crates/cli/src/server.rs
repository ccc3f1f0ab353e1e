use futures::{SinkExt, StreamExt};
use jscope_core::daemon::{DaemonHandle, Responder};
use jscope_core::logging::LogBroadcaster;
use jscope_core::protocol::{ClientMessage, Envelope, ErrorCode};
use serde_json::{Map, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

pub async fn accept_loop(
    listener: TcpListener,
    daemon: DaemonHandle,
    broadcaster: LogBroadcaster,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!("connection from {}", peer);
        let daemon = daemon.clone();
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, daemon, broadcaster).await {
                tracing::debug!("connection from {} ended: {}", peer, err);
            }
        });
    }
}

/// One task per connection reads frames and forwards requests to the
/// dispatcher; a writer task owns the socket's send half so responses,
/// streamed chunks, and log lines interleave without contention.
async fn handle_connection(
    stream: TcpStream,
    daemon: DaemonHandle,
    broadcaster: LogBroadcaster,
) -> Result<(), tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut frames) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut log_sink = None;
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let text = match &frame {
            Message::Text(text) => text.as_str(),
            Message::Close(_) => break,
            _ => continue,
        };
        match ClientMessage::parse(text) {
            None => {
                let _ = out_tx.send(Envelope::error(None, ErrorCode::ProtocolError).to_json());
            }
            Some(msg) if msg.kind == "log" => {
                // log streaming is a connection concern, not a daemon one
                if log_sink.is_none() {
                    log_sink = Some(subscribe_logs(&broadcaster, msg.verbose, out_tx.clone()));
                }
            }
            Some(msg) => {
                let reply = Responder::new(msg.kind.clone(), out_tx.clone());
                daemon.request(msg, reply);
            }
        }
    }

    if let Some(id) = log_sink {
        broadcaster.remove_sink(id);
    }
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

/// Register a log sink for this connection and pump its lines out as
/// `more data` chunks. Returns the sink id for removal on disconnect.
fn subscribe_logs(
    broadcaster: &LogBroadcaster,
    verbose: bool,
    out: mpsc::UnboundedSender<String>,
) -> u64 {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let id = broadcaster.add_sink(verbose, line_tx);
    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            let mut payload = Map::new();
            payload.insert("log".into(), Value::String(line));
            let frame = Envelope::chunk(Some("log".into()), payload).to_json();
            if out.send(frame).is_err() {
                break;
            }
        }
    });
    id
}
