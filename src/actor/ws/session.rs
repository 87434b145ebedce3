//! Client session: bounded send queue drained by a dedicated writer thread.
//!
//! The session thread exclusively owns its WebSocket: it drains the outgoing
//! queue, polls incoming frames (answering pings itself), and closes the
//! socket on disconnect or when the hub drops the queue sender.

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::monitor::Monitor;
use crate::reload::ReloadMessage;

/// Bounded send queue per session. A full queue sheds the session.
pub(super) const SEND_QUEUE_CAPACITY: usize = 64;

/// Hub-side handle to a connected client.
pub(super) struct ClientSession {
    pub(super) id: u64,
    tx: Sender<Message>,
    dead: Arc<AtomicBool>,
    last_activity_ms: Arc<AtomicU64>,
}

/// Why a send was refused.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum SendError {
    /// Queue full: the slow consumer must be shed.
    Overflow,
    /// Session already closed.
    Closed,
}

impl ClientSession {
    /// Take ownership of a handshaken WebSocket and start the writer thread.
    pub(super) fn spawn(
        id: u64,
        ws: WebSocket<TcpStream>,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        let (tx, rx) = channel::bounded::<Message>(SEND_QUEUE_CAPACITY);
        let dead = Arc::new(AtomicBool::new(false));
        let last_activity_ms = Arc::new(AtomicU64::new(now_ms()));

        {
            let dead = Arc::clone(&dead);
            let last_activity_ms = Arc::clone(&last_activity_ms);
            std::thread::spawn(move || {
                run_session(id, ws, rx, &dead, &last_activity_ms, monitor);
            });
        }

        Self {
            id,
            tx,
            dead,
            last_activity_ms,
        }
    }

    /// Queue a message without blocking. Overflow marks the session dead;
    /// the caller unregisters it before its broadcast call returns.
    pub(super) fn try_send(&self, msg: Message) -> Result<(), SendError> {
        if self.is_dead() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dead.store(true, Ordering::SeqCst);
                Err(SendError::Overflow)
            }
            Err(TrySendError::Disconnected(_)) => Err(SendError::Closed),
        }
    }

    pub(super) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Time since the client last sent any frame.
    pub(super) fn idle_for(&self) -> Duration {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms().saturating_sub(last))
    }
}

// Dropping the hub-side handle disconnects the queue; the session thread
// observes it and closes the socket with a close frame.

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Session thread body.
fn run_session(
    id: u64,
    mut ws: WebSocket<TcpStream>,
    rx: Receiver<Message>,
    dead: &AtomicBool,
    last_activity_ms: &AtomicU64,
    monitor: Arc<dyn Monitor>,
) {
    // Non-blocking reads so the queue drain never stalls on a silent client.
    let _ = ws.get_ref().set_nonblocking(true);

    loop {
        if dead.load(Ordering::SeqCst) {
            break;
        }

        // Outgoing: drain one message, waiting briefly.
        match rx.recv_timeout(Duration::from_millis(20)) {
            Ok(msg) => {
                if !send_blocking(&mut ws, msg) {
                    dead.store(true, Ordering::SeqCst);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // Hub dropped us: polite close frame, then stop.
                let _ = ws.close(None);
                flush_close(&mut ws);
                break;
            }
        }

        // Incoming: poll everything available.
        loop {
            match ws.read() {
                Ok(Message::Text(text)) => {
                    last_activity_ms.store(now_ms(), Ordering::Relaxed);
                    if matches!(ReloadMessage::from_json(&text), Some(ReloadMessage::Ping))
                        && !send_blocking(&mut ws, Message::Text(ReloadMessage::Pong.to_json().into()))
                    {
                        dead.store(true, Ordering::SeqCst);
                    }
                }
                Ok(Message::Ping(payload)) => {
                    last_activity_ms.store(now_ms(), Ordering::Relaxed);
                    let _ = ws.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => {
                    dead.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {
                    last_activity_ms.store(now_ms(), Ordering::Relaxed);
                }
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    break;
                }
                Err(_) => {
                    dead.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    crate::debug!("ws"; "session {} closed", id);
    monitor.client_disconnected();
}

/// Send on a non-blocking socket, retrying WouldBlock flushes.
fn send_blocking(ws: &mut WebSocket<TcpStream>, msg: Message) -> bool {
    match ws.send(msg) {
        Ok(()) => true,
        Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
            // Frame is queued inside tungstenite; flush until it drains.
            for _ in 0..200 {
                std::thread::sleep(Duration::from_millis(5));
                match ws.flush() {
                    Ok(()) => return true,
                    Err(tungstenite::Error::Io(ref e))
                        if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(_) => return false,
                }
            }
            false
        }
        Err(_) => false,
    }
}

/// Best-effort flush of the close frame.
fn flush_close(ws: &mut WebSocket<TcpStream>) {
    for _ in 0..10 {
        match ws.flush() {
            Ok(()) => return,
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::NoopMonitor;
    use std::net::TcpListener;
    use tungstenite::protocol::Role;

    /// Raw server-side WebSocket over a connected pair; the peer stream is
    /// returned so tests control whether the client ever reads.
    fn connected_session(id: u64) -> (ClientSession, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let ws = WebSocket::from_raw_socket(server, Role::Server, None);
        let session = ClientSession::spawn(id, ws, Arc::new(NoopMonitor));
        (session, client)
    }

    #[test]
    fn test_send_reaches_reading_client() {
        let (session, client) = connected_session(1);
        session
            .try_send(Message::Text("hello".into()))
            .expect("queue has room");

        let mut client_ws = WebSocket::from_raw_socket(client, Role::Client, None);
        match client_ws.read().unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), "hello"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_slow_client_overflows_and_is_shed() {
        // The client never reads: socket buffers fill, the writer stalls,
        // the bounded queue overflows, and try_send reports it.
        let (session, _client) = connected_session(2);

        let big = "x".repeat(64 * 1024);
        let mut overflowed = false;
        for _ in 0..500 {
            match session.try_send(Message::Text(big.clone().into())) {
                Ok(()) => {}
                Err(SendError::Overflow) => {
                    overflowed = true;
                    break;
                }
                Err(SendError::Closed) => break,
            }
        }

        assert!(overflowed, "slow client should overflow its send queue");
        assert!(session.is_dead());
        // The broadcaster's next call refuses immediately.
        assert_eq!(
            session.try_send(Message::Text("more".into())),
            Err(SendError::Closed)
        );
    }

    #[test]
    fn test_dropping_handle_closes_session() {
        let (session, client) = connected_session(3);
        drop(session);

        // The session thread sends a close frame and shuts the socket down.
        let mut client_ws = WebSocket::from_raw_socket(client, Role::Client, None);
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match client_ws.read() {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
            assert!(Instant::now() < deadline, "no close frame arrived");
        }
    }
}
