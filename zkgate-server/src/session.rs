//! Per-connection session engine.
//!
//! A session splits its connection into four workers cooperating over
//! bounded channels, all owned by one [`TaskGroup`]:
//!
//! ```text
//! TCP bytes → recv loop → [frame chan] → parse loop
//!   → [op chan] → process loop → backend → [reply chan]
//!   → send loop → TCP bytes
//! ```
//!
//! # Lifecycle
//!
//! **Handshake**: recv and send loops start immediately; the first frame
//! must decode as a `ConnectRequest` within the deadline, and is answered
//! with a `ConnectResponse` before the parse and process loops start.
//!
//! **Running**: the process loop is the single consumer of parsed
//! operations, so replies leave in request order; pings are no
//! exception, their xid override notwithstanding.
//!
//! **Draining**: entered on Close, on any worker failure, or on server
//! shutdown. The recv loop stops reading, the process loop drains
//! already-enqueued operations, and the send loop keeps flushing for a
//! short grace period before the socket is dropped.
//!
//! Workers borrow frame buffers from the shared pool and return them on
//! every exit path; a frame's buffer goes back as soon as the parser has
//! decoded it, not when the loop exits.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error};

use zkgate_proto::records::{ConnectResponse, OpCode, Request, RequestHeader, Response};
use zkgate_proto::{frame, ConnectRequest, WireError, WireResult};

use crate::buffer::BufferPool;
use crate::dispatch::{Dispatcher, Operation};
use crate::error::SessionError;
use crate::task::{Dying, KillHandle, TaskGroup};

/// Capacity of each of the three inter-worker channels.
const CHANNEL_CAPACITY: usize = 16;

/// How long the send loop keeps flushing replies after "dying".
const SEND_GRACE: Duration = Duration::from_millis(100);

/// The constant session id granted to every client. The bridge keeps no
/// session state, so ids collide across concurrent sessions by design;
/// ZooKeeper's session semantics are not honored.
const SESSION_ID: i64 = 1;

/// Messages queued for the send loop.
#[derive(Debug)]
enum Outbound {
    /// The handshake reply (no reply header on the wire).
    Connect(ConnectResponse),
    /// A regular operation reply.
    Reply(Response),
}

impl Outbound {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Connect(rep) => rep.encode(buf),
            Self::Reply(rep) => rep.encode(buf),
        }
    }
}

/// One client connection through the bridge.
pub struct Session {
    stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<BufferPool>,
    handshake_timeout: Duration,
    shutdown: Dying,
}

impl Session {
    /// Binds a session to an accepted socket.
    #[must_use]
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        pool: Arc<BufferPool>,
        handshake_timeout: Duration,
        shutdown: Dying,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            dispatcher,
            pool,
            handshake_timeout,
            shutdown,
        }
    }

    /// Drives the session to completion.
    ///
    /// Returns `Ok(())` for a clean end (client Close, clean shutdown);
    /// a graceful Close never surfaces as an error.
    ///
    /// # Errors
    /// Protocol faults, socket errors, and worker panics, all scoped to
    /// this session.
    pub async fn run(self) -> Result<(), SessionError> {
        let Self {
            stream,
            peer_addr,
            dispatcher,
            pool,
            handshake_timeout,
            mut shutdown,
        } = self;

        let (read_half, write_half) = stream.into_split();
        let mut group = TaskGroup::new();

        let (frame_tx, mut frame_rx) = mpsc::channel::<BytesMut>(CHANNEL_CAPACITY);
        let (op_tx, op_rx) = mpsc::channel::<Operation>(CHANNEL_CAPACITY);
        let (reply_tx, reply_rx) = mpsc::channel::<Outbound>(CHANNEL_CAPACITY);

        group.spawn(recv_loop(
            read_half,
            frame_tx,
            Arc::clone(&pool),
            group.dying(),
        ));
        group.spawn(send_loop(
            write_half,
            reply_rx,
            Arc::clone(&pool),
            group.dying(),
        ));

        // Handshake: the first frame must be a ConnectRequest.
        match handshake(peer_addr, &pool, handshake_timeout, &mut frame_rx, &reply_tx).await {
            Ok(()) => {
                group.spawn(parse_loop(
                    frame_rx,
                    op_tx,
                    Arc::clone(&pool),
                    group.kill_handle(),
                    group.dying(),
                ));
                group.spawn(process_loop(
                    op_rx,
                    reply_tx,
                    dispatcher,
                    group.dying(),
                ));
            }
            Err(e) => {
                group.kill();
                let _ = group.join().await;
                // The recv loop has exited; return any frames it had
                // already queued.
                while let Ok(buf) = frame_rx.try_recv() {
                    pool.put(buf);
                }
                return Err(e);
            }
        }

        // Supervise until all workers exit or the server shuts down.
        let joined = tokio::select! {
            result = group.join() => Some(result),
            () = shutdown.wait() => None,
        };
        let result = match joined {
            Some(result) => result,
            None => {
                debug!(peer = %peer_addr, "server shutdown, draining session");
                group.kill();
                group.join().await
            }
        };

        match result {
            Err(SessionError::CloseRequested) => {
                debug!(peer = %peer_addr, "session closed at client request");
                Ok(())
            }
            other => other,
        }
    }
}

/// Awaits and answers the ConnectRequest that must open every session.
async fn handshake(
    peer_addr: SocketAddr,
    pool: &BufferPool,
    deadline: Duration,
    frames: &mut mpsc::Receiver<BytesMut>,
    replies: &mpsc::Sender<Outbound>,
) -> Result<(), SessionError> {
    let first = timeout(deadline, frames.recv())
        .await
        .map_err(|_| SessionError::HandshakeTimeout(deadline))?;

    // The recv loop closing its channel means the socket failed or the
    // peer disconnected; the loop's own error carries the cause.
    let Some(buf) = first else {
        return Err(SessionError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed during handshake",
        )));
    };

    let decoded = {
        let mut cursor = &buf[..];
        ConnectRequest::decode(&mut cursor)
    };
    pool.put(buf);

    let req = decoded?;
    debug!(
        peer = %peer_addr,
        timeout = req.timeout,
        read_only = req.read_only,
        "connect request"
    );

    let rep = ConnectResponse {
        protocol_version: req.protocol_version,
        timeout: req.timeout,
        session_id: SESSION_ID,
        passwd: req.passwd,
    };
    if replies.send(Outbound::Connect(rep)).await.is_err() {
        return Err(SessionError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "send loop exited during handshake",
        )));
    }
    Ok(())
}

/// Reads frames into pooled buffers and hands them to the parser.
async fn recv_loop(
    mut read_half: OwnedReadHalf,
    frames: mpsc::Sender<BytesMut>,
    pool: Arc<BufferPool>,
    mut dying: Dying,
) -> Result<(), SessionError> {
    loop {
        let mut buf = pool.get();
        let read = tokio::select! {
            result = frame::read_frame(&mut read_half, &mut buf) => Some(result),
            () = dying.wait() => None,
        };

        match read {
            None => {
                pool.put(buf);
                return Ok(());
            }
            Some(Err(e)) => {
                pool.put(buf);
                return Err(e.into());
            }
            Some(Ok(len)) => {
                debug!(len, frame = %hex(&buf), "<-");
            }
        }

        if let Err(send_err) = frames.send(buf).await {
            // Parser gone: the session is already unwinding.
            pool.put(send_err.0);
            return Ok(());
        }
    }
}

/// Decodes a frame into a header plus request body.
fn parse_request(payload: &[u8]) -> WireResult<Operation> {
    let mut cursor = payload;
    let header = RequestHeader::decode(&mut cursor)?;
    let opcode =
        OpCode::from_i32(header.opcode).ok_or(WireError::UnknownOpCode(header.opcode))?;
    let request = Request::decode(opcode, &mut cursor)?;
    Ok(Operation { header, request })
}

/// Turns raw frames into operations, in arrival order.
async fn parse_loop(
    mut frames: mpsc::Receiver<BytesMut>,
    ops: mpsc::Sender<Operation>,
    pool: Arc<BufferPool>,
    kill: KillHandle,
    mut dying: Dying,
) -> Result<(), SessionError> {
    let result = loop {
        tokio::select! {
            maybe = frames.recv() => {
                let Some(buf) = maybe else { break Ok(()); };
                let parsed = parse_request(&buf);
                // The frame is consumed: its buffer goes back now, not
                // when this loop exits.
                pool.put(buf);

                let operation = match parsed {
                    Ok(operation) => operation,
                    Err(e) => {
                        error!(error = %e, "unable to decode request");
                        break Err(e.into());
                    }
                };
                debug!(
                    xid = operation.header.xid,
                    opcode = operation.request.opcode().name(),
                    "request"
                );
                if ops.send(operation).await.is_err() {
                    break Ok(());
                }
            }
            () = dying.wait() => break Ok(()),
        }
    };

    // Unwind: stop the recv loop, then return every frame it managed to
    // queue before closing its end of the channel.
    kill.kill();
    while let Some(buf) = frames.recv().await {
        pool.put(buf);
    }
    result
}

/// Serializes all request handling for the session: single consumer,
/// dispatch order equals reply order.
async fn process_loop(
    mut ops: mpsc::Receiver<Operation>,
    replies: mpsc::Sender<Outbound>,
    dispatcher: Arc<Dispatcher>,
    mut dying: Dying,
) -> Result<(), SessionError> {
    loop {
        tokio::select! {
            maybe = ops.recv() => {
                let Some(operation) = maybe else { return Ok(()); };
                let is_close = matches!(operation.request, Request::Close);

                let reply = dispatcher.dispatch(operation).await;
                if replies.send(Outbound::Reply(reply)).await.is_err() {
                    return Ok(());
                }
                if is_close {
                    // The success reply is enqueued; unwind the group.
                    return Err(SessionError::CloseRequested);
                }
            }
            () = dying.wait() => {
                // Drain operations that were already parsed so their
                // replies still make the send loop's grace window.
                while let Ok(operation) = ops.try_recv() {
                    let reply = dispatcher.dispatch(operation).await;
                    if replies.send(Outbound::Reply(reply)).await.is_err() {
                        break;
                    }
                }
                return Ok(());
            }
        }
    }
}

/// Encodes and writes replies; on "dying", keeps flushing for a bounded
/// grace period so a Close reply still reaches the wire.
async fn send_loop(
    mut write_half: OwnedWriteHalf,
    mut replies: mpsc::Receiver<Outbound>,
    pool: Arc<BufferPool>,
    mut dying: Dying,
) -> Result<(), SessionError> {
    let mut grace: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;
    loop {
        tokio::select! {
            maybe = replies.recv() => {
                let Some(outbound) = maybe else { return Ok(()); };
                let mut buf = pool.get();
                outbound.encode(&mut buf);

                let written = frame::write_frame(&mut write_half, &buf).await;
                debug!(len = buf.len(), frame = %hex(&buf), "->");
                pool.put(buf);
                written?;
            }
            () = dying.wait(), if grace.is_none() => {
                grace = Some(Box::pin(tokio::time::sleep(SEND_GRACE)));
            }
            () = async {
                match grace.as_mut() {
                    Some(sleep) => sleep.await,
                    None => std::future::pending::<()>().await,
                }
            } => return Ok(()),
        }
    }
}

/// Lowercase hex dump for frame-level debug logging.
fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_rejects_unknown_opcode() {
        let mut buf = BytesMut::new();
        RequestHeader { xid: 1, opcode: 77 }.encode(&mut buf);

        let err = parse_request(&buf).unwrap_err();
        assert!(matches!(err, WireError::UnknownOpCode(77)));
    }

    #[test]
    fn test_parse_request_ping() {
        let mut buf = BytesMut::new();
        RequestHeader {
            xid: 1234,
            opcode: OpCode::Ping as i32,
        }
        .encode(&mut buf);

        let operation = parse_request(&buf).unwrap();
        assert_eq!(operation.header.xid, 1234);
        assert_eq!(operation.request, Request::Ping);
    }

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex(&[0x00, 0xff, 0x0a]), "00ff0a");
    }
}
