// Selected conversation: selection, history, sending

use log::{debug, info, warn};

use super::{ChatError, ChatStore, Operation, PendingHistory};
use crate::models::{Contact, Message, MessagePayload};

/// Outcome of a history fetch that reached the server successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLoad {
    /// The message list now holds this many messages
    Applied(usize),
    /// The contact was not selected, or the selection moved on (or a newer
    /// fetch started) before the response arrived
    Stale,
}

impl ChatStore {
    /// Change the selected contact. Changing to a different contact clears the
    /// message list and invalidates any history fetch still in flight.
    ///
    /// Does not fetch history or touch the message listener; see
    /// `switch_conversation` for the full sequence.
    pub fn select_contact(&self, contact: Option<Contact>) {
        self.update(|state| {
            let same = match (&state.selected, &contact) {
                (Some(current), Some(next)) => current.id == next.id,
                (None, None) => true,
                _ => false,
            };
            if !same {
                state.reset_conversation();
            }
            debug!(
                "Selected contact: {}",
                contact.as_ref().map_or("none", |c| c.id.as_str())
            );
            state.selected = contact;
        });
    }

    /// Fetch the history with `contact_id` and make it the message list.
    ///
    /// Only the selected contact's history is fetched; for any other id this
    /// returns `Stale` without a remote call and leaves a fetch in flight for
    /// the selected contact alone. The response is applied only if
    /// `contact_id` is still selected and no newer fetch for it has started.
    /// Messages accepted while the fetch was running are kept after the
    /// fetched history. On failure the current list stays.
    pub async fn load_history(&self, contact_id: &str) -> Result<HistoryLoad, ChatError> {
        let request = self.update(|state| {
            if state.selected_id() != Some(contact_id) {
                return None;
            }
            state.history_request += 1;
            state.pending_history = Some(PendingHistory {
                request: state.history_request,
                contact_id: contact_id.to_string(),
                arrived: Vec::new(),
            });
            Some(state.history_request)
        });
        let Some(request) = request else {
            debug!("Not loading history for {}: not the selected contact", contact_id);
            return Ok(HistoryLoad::Stale);
        };

        let result = self.api.fetch_history(contact_id).await;

        let outcome = self.update(|state| {
            let latest = state.history_request == request;
            let arrived = if latest {
                state
                    .pending_history
                    .take()
                    .map(|pending| pending.arrived)
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            match &result {
                Ok(history) if latest && state.selected_id() == Some(contact_id) => {
                    let mut merged = history.clone();
                    for message in arrived {
                        if !merged.iter().any(|m| m.id == message.id) {
                            merged.push(message);
                        }
                    }
                    state.messages = merged;
                    Some(HistoryLoad::Applied(state.messages.len()))
                }
                Ok(_) => Some(HistoryLoad::Stale),
                Err(_) => None,
            }
        });

        match (result, outcome) {
            (Ok(_), Some(HistoryLoad::Applied(count))) => {
                info!("Loaded {} messages with {}", count, contact_id);
                Ok(HistoryLoad::Applied(count))
            }
            (Ok(_), _) => {
                debug!("Discarding stale history response for {}", contact_id);
                Ok(HistoryLoad::Stale)
            }
            (Err(e), _) => Err(self.report(Operation::LoadHistory, e.into())),
        }
    }

    /// Send a message to `contact_id`.
    ///
    /// Nothing is appended until the server confirms; the confirmed record is
    /// appended verbatim if that conversation is still open. An empty payload
    /// is rejected without a remote call.
    pub async fn send(
        &self,
        contact_id: &str,
        payload: MessagePayload,
    ) -> Result<Message, ChatError> {
        let payload = payload.normalized();
        if payload.is_empty() {
            return Err(self.report(
                Operation::Send,
                ChatError::Validation(
                    "a message needs text, an image, a video or an audio clip".to_string(),
                ),
            ));
        }

        match self.api.send_message(contact_id, &payload).await {
            Ok(message) => {
                let appended = self.update(|state| state.accept(contact_id, &message));
                if !appended {
                    debug!(
                        "Sent message {} not appended: {} is no longer open or already listed",
                        message.id, contact_id
                    );
                }
                Ok(message)
            }
            Err(e) => Err(self.report(Operation::Send, e.into())),
        }
    }

    /// Move to another conversation (or to none).
    ///
    /// Runs unsubscribe, select, history fetch and subscribe in that order.
    /// The listener is only installed if the selection is still `contact` once
    /// the history has arrived. A failed fetch still installs the listener.
    /// When both steps fail the fetch error is returned; each failure has
    /// already been published as a notice.
    pub async fn switch_conversation(&self, contact: Option<Contact>) -> Result<(), ChatError> {
        self.unsubscribe();
        self.select_contact(contact.clone());

        let Some(contact) = contact else {
            return Ok(());
        };

        let loaded = self.load_history(&contact.id).await;

        if self.lock_state().selected_id() != Some(contact.id.as_str()) {
            warn!(
                "Selection changed while opening {}, not subscribing",
                contact.id
            );
            return loaded.map(|_| ());
        }

        let subscribed = self.subscribe(&contact.id);
        loaded?;
        subscribed
    }
}
