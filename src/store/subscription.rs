// Push listener lifecycle for ChatStore
// At most one newMessage listener is registered per store at any time.

use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::{ChatError, ChatStore, Operation, Subscription};
use crate::socket::{EventKind, Listener, PushEvent};

impl ChatStore {
    /// Listen for new messages from `contact_id`.
    ///
    /// Calling again for the same contact is a no-op. Calling for another
    /// contact replaces the existing listener, so two are never registered.
    pub fn subscribe(&self, contact_id: &str) -> Result<(), ChatError> {
        if !self.channel.is_connected() {
            return Err(self.report(
                Operation::Subscribe,
                ChatError::ChannelUnavailable("push channel is not connected".to_string()),
            ));
        }

        let mut state = self.lock_state();

        if let Some(active) = state.subscription.take() {
            if active.contact_id == contact_id {
                debug!("Already listening for messages from {}", contact_id);
                state.subscription = Some(active);
                return Ok(());
            }
            warn!(
                "Replacing message listener for {} with one for {}",
                active.contact_id, contact_id
            );
            self.channel.off(active.listener);
        }

        let token = Uuid::new_v4();
        let store = self.me.clone();
        let sender = contact_id.to_string();
        let listener: Listener = Arc::new(move |event: &PushEvent| {
            if let Some(store) = store.upgrade() {
                store.handle_push(token, &sender, event);
            }
        });

        let listener = self.channel.on(EventKind::NewMessage, listener);
        state.subscription = Some(Subscription {
            contact_id: contact_id.to_string(),
            token,
            listener,
        });
        info!("Listening for messages from {}", contact_id);
        Ok(())
    }

    /// Remove the message listener. Returns false if none was registered.
    pub fn unsubscribe(&self) -> bool {
        let released = self.lock_state().subscription.take();
        match released {
            Some(subscription) => {
                self.channel.off(subscription.listener);
                info!("Stopped listening for messages from {}", subscription.contact_id);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock_state().subscription.is_some()
    }

    pub fn subscribed_contact(&self) -> Option<String> {
        self.lock_state()
            .subscription
            .as_ref()
            .map(|s| s.contact_id.clone())
    }

    /// Apply an inbound event for the listener identified by `token`.
    ///
    /// Events from other senders, for a conversation that is no longer open,
    /// or reaching a listener that has since been replaced are dropped.
    fn handle_push(&self, token: Uuid, contact_id: &str, event: &PushEvent) {
        let PushEvent::NewMessage(message) = event else {
            return;
        };
        if message.sender_id != contact_id {
            debug!(
                "Dropping message {} from {}: not the open conversation",
                message.id, message.sender_id
            );
            return;
        }

        let appended = self.update(|state| {
            let current = state
                .subscription
                .as_ref()
                .map_or(false, |s| s.token == token);
            current && state.accept(contact_id, message)
        });

        if appended {
            debug!("Received message {} from {}", message.id, contact_id);
        } else {
            debug!("Ignored message {} from {}", message.id, contact_id);
        }
    }
}
