//! WebSocket Server for Live Reload
//!
//! Binds the reload channel listener and hands accepted connections to the
//! HubActor over a channel. Handshake (including origin validation) happens
//! in the hub, which owns the client set.

use std::net::TcpListener;

use anyhow::Result;

use crate::actor::messages::HubMsg;
use crate::core::CancelToken;

/// Default WebSocket port for hot reload.
pub const DEFAULT_WS_PORT: u16 = 35729;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Start the WebSocket listener; accepted streams go to the HubActor.
///
/// Returns the actually-bound port (may differ from `base_port` after
/// retries).
pub fn start_ws_server(
    base_port: u16,
    hub_tx: tokio::sync::mpsc::Sender<HubMsg>,
    cancel: CancelToken,
) -> Result<u16> {
    let (listener, actual_port) = try_bind_port(base_port, MAX_PORT_RETRIES)?;
    listener.set_nonblocking(true)?;

    // Acceptor thread: non-blocking accept so cancellation is observed.
    std::thread::spawn(move || {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("reload"; "client connecting: {}", addr);

                    // Blocking mode for the handshake; the hub flips it back.
                    let _ = stream.set_nonblocking(false);

                    if hub_tx.blocking_send(HubMsg::AddClient(stream)).is_err() {
                        crate::debug!("reload"; "hub gone, stopping acceptor");
                        break;
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                Err(e) => {
                    crate::log!("reload"; "accept error: {}", e);
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        }
    });

    Ok(actual_port)
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(format!("127.0.0.1:{}", port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                if offset > 0 {
                    crate::log!("reload"; "port {} in use, using {}", base_port, actual_port);
                }
                return Ok((listener, actual_port));
            }
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind reload channel after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_retries_past_taken_port() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = taken.local_addr().unwrap().port();

        let (_listener, port) = try_bind_port(base, MAX_PORT_RETRIES).unwrap();
        assert_ne!(port, base);
        assert!(port > base);
    }
}
