// Presence tracking
// The set of online user ids belongs to the session, not to the chat store.
// The push channel replaces it wholesale on every getOnlineUsers event.

use log::{debug, error};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::models::ContactStatus;
use crate::socket::{EventKind, ListenerId, PushChannel, PushEvent};

#[derive(Debug, Clone)]
pub struct Presence {
    self_id: String,
    online: Arc<RwLock<HashSet<String>>>,
}

impl Presence {
    /// `self_id` is the logged-in user, who is excluded from the online count
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            online: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn replace<I: IntoIterator<Item = String>>(&self, ids: I) {
        match self.online.write() {
            Ok(mut online) => {
                *online = ids.into_iter().collect();
                debug!("Presence updated: {} user(s) online", online.len());
            }
            Err(_) => error!("Failed to lock presence set for update"),
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online
            .read()
            .map(|online| online.contains(user_id))
            .unwrap_or(false)
    }

    pub fn status(&self, user_id: &str) -> ContactStatus {
        if self.is_online(user_id) {
            ContactStatus::Online
        } else {
            ContactStatus::Offline
        }
    }

    /// Number of other users online
    pub fn online_count(&self) -> usize {
        self.online
            .read()
            .map(|online| online.iter().filter(|id| **id != self.self_id).count())
            .unwrap_or(0)
    }

    pub fn handle_event(&self, event: &PushEvent) {
        if let PushEvent::OnlineUsers(ids) = event {
            self.replace(ids.iter().cloned());
        }
    }

    /// Keep this set in sync with the channel's presence broadcasts
    pub fn attach(&self, channel: &dyn PushChannel) -> ListenerId {
        let presence = self.clone();
        channel.on(
            EventKind::OnlineUsers,
            Arc::new(move |event: &PushEvent| presence.handle_event(event)),
        )
    }
}
