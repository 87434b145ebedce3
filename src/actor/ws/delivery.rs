use tungstenite::protocol::Message;

use super::HubActor;
use super::session::SendError;
use crate::reload::ReloadMessage;

impl HubActor {
    /// Fan a message out to every session. A session whose queue is full is
    /// shed (closed and unregistered) before this call returns; fast
    /// consumers are unaffected.
    pub(super) fn broadcast(&mut self, msg: ReloadMessage) {
        if self.sessions.is_empty() {
            crate::debug!("ws"; "no clients connected");
            return;
        }

        let text: Message = Message::Text(msg.to_json().into());
        let monitor = std::sync::Arc::clone(&self.monitor);
        let count = self.sessions.len();

        self.sessions.retain(|session| {
            match session.try_send(text.clone()) {
                Ok(()) => true,
                Err(SendError::Overflow) => {
                    crate::log!("ws"; "session {} too slow, shedding", session.id);
                    monitor.client_shed();
                    false
                }
                Err(SendError::Closed) => {
                    crate::debug!("ws"; "session {} gone", session.id);
                    false
                }
            }
        });

        crate::debug!("ws"; "broadcast to {}/{} session(s)", self.sessions.len(), count);
    }

    /// Send to a single session by id.
    pub(super) fn send_to(&mut self, id: u64, msg: ReloadMessage) {
        let text: Message = Message::Text(msg.to_json().into());
        let mut failed = false;

        if let Some(session) = self.sessions.iter().find(|s| s.id == id) {
            failed = session.try_send(text).is_err();
        }

        if failed {
            self.sessions.retain(|s| s.id != id);
        }
    }
}
