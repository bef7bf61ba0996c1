// Contact list operations for ChatStore

use log::{debug, info};

use super::{ChatError, ChatStore, Operation};
use crate::models::{Contact, ContactStatus};

impl ChatStore {
    /// Refresh the contact cache from the server.
    ///
    /// On failure the previous cache is kept. When several refreshes overlap,
    /// only the most recently started one may replace the cache.
    pub async fn list_contacts(&self) -> Result<Vec<Contact>, ChatError> {
        let request = self.update(|state| {
            state.contacts_request += 1;
            state.contacts_in_flight += 1;
            state.contacts_request
        });

        let result = self.api.list_contacts().await;

        let applied = self.update(|state| {
            state.contacts_in_flight = state.contacts_in_flight.saturating_sub(1);
            match &result {
                Ok(contacts) if state.contacts_request == request => {
                    state.contacts = contacts.clone();
                    true
                }
                _ => false,
            }
        });

        match result {
            Ok(contacts) => {
                if applied {
                    info!("Contact list refreshed: {} contacts", contacts.len());
                } else {
                    debug!("Discarding superseded contact list response");
                }
                Ok(contacts)
            }
            Err(e) => Err(self.report(Operation::ListContacts, e.into())),
        }
    }

    /// Delete the conversation with `contact_id` and drop the contact from the cache.
    ///
    /// If it was the selected contact, the selection, message list and message
    /// listener are cleared too. Nothing changes on failure.
    pub async fn delete_conversation(&self, contact_id: &str) -> Result<(), ChatError> {
        let known = self.update(|state| {
            let known = state.contacts.iter().any(|c| c.id == contact_id);
            if known {
                state.deleting.insert(contact_id.to_string());
            }
            known
        });
        if !known {
            return Err(self.report(
                Operation::DeleteConversation,
                ChatError::NotFound(format!("no conversation with {}", contact_id)),
            ));
        }

        let result = self.api.delete_conversation(contact_id).await;

        match result {
            Ok(()) => {
                let released = self.update(|state| {
                    state.deleting.remove(contact_id);
                    state.contacts.retain(|c| c.id != contact_id);

                    if state.selected_id() == Some(contact_id) {
                        state.selected = None;
                        state.reset_conversation();
                    }

                    let listening = state
                        .subscription
                        .as_ref()
                        .map_or(false, |s| s.contact_id == contact_id);
                    if listening {
                        state.subscription.take()
                    } else {
                        None
                    }
                });
                if let Some(subscription) = released {
                    self.channel.off(subscription.listener);
                }
                info!("Deleted conversation with {}", contact_id);
                Ok(())
            }
            Err(e) => {
                self.update(|state| state.deleting.remove(contact_id));
                Err(self.report(Operation::DeleteConversation, e.into()))
            }
        }
    }

    pub fn contact_status(&self, contact_id: &str) -> ContactStatus {
        self.presence.status(contact_id)
    }

    /// Cached contacts that are currently online, in cache order
    pub fn online_contacts(&self) -> Vec<Contact> {
        self.lock_state()
            .contacts
            .iter()
            .filter(|c| self.presence.is_online(&c.id))
            .cloned()
            .collect()
    }

    /// How many other users are online
    pub fn online_count(&self) -> usize {
        self.presence.online_count()
    }
}
