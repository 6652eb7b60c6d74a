//! Per connection plumbing: a reader task, a writer task and the session actor in between.

use crate::session::{Outbound, SessionActor};
use crate::state::AppState;
use protocol::CHANNEL_BUFFER_SIZE;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::{Receiver, Sender};

/// Runs one client connection from accept to teardown.
pub async fn handle_connection(stream: TcpStream, address: SocketAddr, state: Arc<AppState>) {
    let id = state.register(address).await;
    tracing::info!(session = id, %address, "Connection accepted.");

    let (read_half, write_half) = stream.into_split();
    let (inbound_sender, inbound_receiver) = tokio::sync::mpsc::channel(CHANNEL_BUFFER_SIZE);
    let (outbound_sender, outbound_receiver) = tokio::sync::mpsc::channel(CHANNEL_BUFFER_SIZE);

    let read_task = tokio::spawn(receive_logic(read_half, inbound_sender, id));
    let write_task = tokio::spawn(send_logic(write_half, outbound_receiver, id));
    let actor = SessionActor::new(state.clone(), id, address, outbound_sender.clone());
    let session_task = tokio::spawn(actor.run(inbound_receiver));

    let reason = match session_task.await {
        Ok(reason) => reason,
        Err(err) => {
            tracing::error!(session = id, ?err, "Internal panic in session.");
            let line = format!("ERROR :Closing Link: *[{}] (Internal error)", address.ip());
            // The writer may be gone already, nothing left to tell then.
            let _ = outbound_sender.send(Outbound::Close(line)).await;
            "Internal panic in session."
        }
    };

    // Once the last sender is gone the writer drains the queue and ends.
    drop(outbound_sender);
    read_task.abort();
    match write_task.await {
        Ok(write_reason) => tracing::debug!(session = id, write_reason, "Writer finished."),
        Err(err) => tracing::error!(session = id, ?err, "Internal panic in writer."),
    }

    state.unregister(id).await;
    tracing::info!(session = id, reason, "Connection closed.");
}

/// Splits the socket into lines and hands them to the session.
async fn receive_logic(read_half: OwnedReadHalf, inbound: Sender<String>, id: u64) -> &'static str {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    continue;
                }
                tracing::trace!(session = id, line, "Read");
                if inbound.send(line.to_string()).await.is_err() {
                    return "Session gone.";
                }
            }
            Ok(None) => return "Connection lost.",
            Err(error) => {
                tracing::debug!(session = id, ?error, "Read failed.");
                return "Connection lost.";
            }
        }
    }
}

/// Writes queued lines in order. Batches are flushed once the queue runs dry.
async fn send_logic(
    write_half: OwnedWriteHalf,
    mut outbound: Receiver<Outbound>,
    id: u64,
) -> &'static str {
    let mut writer = BufWriter::new(write_half);
    while let Some(item) = outbound.recv().await {
        let (line, last) = match item {
            Outbound::Line(line) => (line, false),
            Outbound::Close(line) => (line, true),
        };
        tracing::debug!(session = id, line = %line, "Write");
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\r\n").await?;
            if last || outbound.is_empty() {
                writer.flush().await?;
            }
            if last {
                writer.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        }
        .await;
        if let Err(error) = written {
            tracing::debug!(session = id, ?error, "Write failed.");
            return "Connection lost.";
        }
        if last {
            return "Closing line sent.";
        }
    }
    if let Err(error) = writer.flush().await {
        tracing::debug!(session = id, ?error, "Final flush failed.");
    }
    "Session ended."
}
