//! WebSocket connection lifecycle.
//!
//! Each admitted socket is split into three tasks joined by channels:
//! the read loop queues inbound text frames, the request loop answers them
//! one at a time, and the write loop drains the session's outbound queue
//! into the socket. Broadcasts reach the socket only through that queue.
//!
//! When the peer closes, requests it already sent still run to completion.
//! Termination abandons them.

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::messages::ServerMessage;
use super::router::RequestRouter;
use super::session::Session;
use crate::app_state::AppState;

/// Pending inbound requests per connection.
const REQUEST_QUEUE: usize = 64;

/// Runs a single authenticated connection until it closes or is
/// terminated.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(state.outbound_capacity.max(1));
    let session = Arc::new(Session::new(out_tx));
    let session_id = session.id();
    let cancel = session.cancel_token();

    if !state.sessions.add(Arc::clone(&session)).await {
        debug!(session_id = %session_id, "bridge shutting down, dropping connection");
        return;
    }
    info!(session_id = %session_id, "client connected");

    // Cancelled by termination, or by the writer when the peer stops reading.
    let peer_gone = cancel.child_token();
    let writer = tokio::spawn(write_loop(ws_tx, out_rx, peer_gone.clone()));

    deliver(&session, &ServerMessage::hello());
    if let Some(initial) = state.initial_payload().await {
        deliver(&session, &initial);
    }
    let flushed = session.open();
    if flushed > 0 {
        debug!(session_id = %session_id, flushed, "flushed held events");
    }

    let (req_tx, req_rx) = mpsc::channel(REQUEST_QUEUE);
    let worker = tokio::spawn(request_loop(
        Arc::clone(&state.router),
        Arc::clone(&session),
        req_rx,
    ));

    let end = read_loop(ws_rx, req_tx, cancel.clone(), peer_gone).await;
    let _ = state.sessions.remove(session_id).await;
    drain_requests(worker, end, &cancel).await;
    cancel.cancel();
    let _ = writer.await;
    info!(
        session_id = %session_id,
        dropped = session.dropped_count(),
        "client disconnected"
    );
}

/// Serializes `msg` and queues it on `session`, logging failures.
pub fn deliver(session: &Session, msg: &ServerMessage) {
    let frame = match msg.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            debug!(session_id = %session.id(), error = %e, "failed to serialize message");
            return;
        }
    };
    if let Err(e) = session.send(frame) {
        debug!(error = %e, "reply not delivered");
    }
}

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadEnd {
    /// The peer closed, the stream ended, or reading failed.
    PeerClosed,
    /// The session was terminated.
    Terminated,
}

/// Waits for requests already queued by a closing peer, or abandons them if
/// the session was terminated.
async fn drain_requests(mut worker: JoinHandle<()>, end: ReadEnd, cancel: &CancellationToken) {
    if end == ReadEnd::Terminated {
        worker.abort();
        return;
    }
    tokio::select! {
        _ = &mut worker => {}
        () = cancel.cancelled() => worker.abort(),
    }
}

/// Forwards text frames to the request queue. Dropping `requests` on return
/// lets the request loop finish what is already queued.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    requests: mpsc::Sender<Utf8Bytes>,
    cancel: CancellationToken,
    peer_gone: CancellationToken,
) -> ReadEnd {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return ReadEnd::Terminated,
            () = peer_gone.cancelled() => return ReadEnd::PeerClosed,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    tokio::select! {
                        () = cancel.cancelled() => return ReadEnd::Terminated,
                        sent = requests.send(text) => if sent.is_err() {
                            return ReadEnd::PeerClosed;
                        },
                    }
                }
                Some(Ok(Message::Close(_))) | None => return ReadEnd::PeerClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "ws read error");
                    return ReadEnd::PeerClosed;
                }
            }
        }
    }
}

async fn request_loop(
    router: Arc<RequestRouter>,
    session: Arc<Session>,
    mut requests: mpsc::Receiver<Utf8Bytes>,
) {
    while let Some(text) = requests.recv().await {
        if let Some(reply) = router.handle_text(&session, text.as_str()).await {
            deliver(&session, &reply);
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Utf8Bytes>,
    peer_gone: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = peer_gone.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
    // A dead peer on the write side ends the read side too.
    peer_gone.cancel();
}
