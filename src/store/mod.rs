// Chat state store
// Holds the cached contacts, the selected conversation and its messages, and
// mediates between the REST client and the push channel. Operations are split
// across submodules the same way: contacts, conversation, subscription.

use log::{debug, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::api::{ApiError, ChatApi};
use crate::models::{Contact, Message};
use crate::presence::Presence;
use crate::socket::{ChannelError, ListenerId, PushChannel};

pub mod contacts;
pub mod conversation;
pub mod subscription;

pub use conversation::HistoryLoad;

/// Failure conditions surfaced to the UI. Raw transport errors never leave the store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// The remote call could not complete
    #[error("Network failure: {0}")]
    Network(String),

    /// The referenced contact or conversation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request was rejected before reaching the server
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The push channel is not connected
    #[error("Push channel unavailable: {0}")]
    ChannelUnavailable(String),
}

impl ChatError {
    pub fn reason(&self) -> &str {
        match self {
            ChatError::Network(reason)
            | ChatError::NotFound(reason)
            | ChatError::Validation(reason)
            | ChatError::ChannelUnavailable(reason) => reason,
        }
    }
}

impl From<ApiError> for ChatError {
    fn from(e: ApiError) -> Self {
        if e.is_not_found() {
            ChatError::NotFound(e.reason().to_string())
        } else {
            ChatError::Network(e.to_string())
        }
    }
}

impl From<ChannelError> for ChatError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NotConnected | ChannelError::Connect(_) => {
                ChatError::ChannelUnavailable(e.to_string())
            }
            ChannelError::Send(_) | ChannelError::Decode(_) => ChatError::Network(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListContacts,
    LoadHistory,
    Send,
    Subscribe,
    DeleteConversation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::ListContacts => "load contacts",
            Operation::LoadHistory => "load messages",
            Operation::Send => "send message",
            Operation::Subscribe => "listen for new messages",
            Operation::DeleteConversation => "delete chat",
        };
        f.write_str(label)
    }
}

/// A transient, toast-style failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub operation: Operation,
    pub error: ChatError,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to {}: {}", self.operation, self.error.reason())
    }
}

/// Read-only view of the store handed to UI consumers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub contacts: Vec<Contact>,
    pub selected: Option<Contact>,
    pub messages: Vec<Message>,
    pub contacts_loading: bool,
    pub messages_loading: bool,
    /// Contacts whose conversation is being deleted
    pub deleting: BTreeSet<String>,
}

/// History fetch that has not resolved yet
#[derive(Debug)]
pub(crate) struct PendingHistory {
    pub(crate) request: u64,
    pub(crate) contact_id: String,
    /// Messages accepted while the fetch was running, merged on completion
    pub(crate) arrived: Vec<Message>,
}

#[derive(Debug)]
pub(crate) struct Subscription {
    pub(crate) contact_id: String,
    pub(crate) token: Uuid,
    pub(crate) listener: ListenerId,
}

#[derive(Debug, Default)]
pub(crate) struct ChatState {
    pub(crate) contacts: Vec<Contact>,
    pub(crate) selected: Option<Contact>,
    pub(crate) messages: Vec<Message>,
    pub(crate) contacts_request: u64,
    pub(crate) contacts_in_flight: usize,
    pub(crate) history_request: u64,
    pub(crate) pending_history: Option<PendingHistory>,
    pub(crate) deleting: BTreeSet<String>,
    pub(crate) subscription: Option<Subscription>,
}

impl ChatState {
    pub(crate) fn selected_id(&self) -> Option<&str> {
        self.selected.as_ref().map(|c| c.id.as_str())
    }

    /// Forget the current conversation and invalidate any history fetch in flight
    pub(crate) fn reset_conversation(&mut self) {
        self.messages.clear();
        self.history_request += 1;
        self.pending_history = None;
    }

    /// Append a confirmed message to the open conversation.
    ///
    /// Returns false when `contact_id` is not the selected contact, the
    /// message is not part of that conversation, or it is already listed.
    pub(crate) fn accept(&mut self, contact_id: &str, message: &Message) -> bool {
        if self.selected_id() != Some(contact_id) || !message.involves(contact_id) {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        if let Some(pending) = self.pending_history.as_mut() {
            if pending.contact_id == contact_id {
                pending.arrived.push(message.clone());
            }
        }
        self.messages.push(message.clone());
        true
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            contacts: self.contacts.clone(),
            selected: self.selected.clone(),
            messages: self.messages.clone(),
            contacts_loading: self.contacts_in_flight > 0,
            messages_loading: self.pending_history.is_some(),
            deleting: self.deleting.clone(),
        }
    }
}

/// Chat state for one UI session.
///
/// Construct one per session and share it as `Arc<ChatStore>`; the REST
/// client, push channel and presence set are injected.
pub struct ChatStore {
    me: Weak<ChatStore>,
    api: Arc<dyn ChatApi>,
    channel: Arc<dyn PushChannel>,
    presence: Presence,
    state: Mutex<ChatState>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    notice_tx: broadcast::Sender<Notice>,
}

impl ChatStore {
    pub fn new(
        api: Arc<dyn ChatApi>,
        channel: Arc<dyn PushChannel>,
        presence: Presence,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(ChatSnapshot::default());
        let (notice_tx, _) = broadcast::channel(64);

        Arc::new_cyclic(|me| ChatStore {
            me: me.clone(),
            api,
            channel,
            presence,
            state: Mutex::new(ChatState::default()),
            snapshot_tx,
            notice_tx,
        })
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.lock_state().snapshot()
    }

    /// Receiver that sees a fresh snapshot after every state change
    pub fn watch(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Failure notices, one per failed operation
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ChatState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate state and publish the resulting snapshot under the same lock,
    /// so watchers never observe snapshots out of order.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.lock_state();
        let result = f(&mut state);
        self.snapshot_tx.send_replace(state.snapshot());
        result
    }

    /// Log a failure and broadcast it as a notice; hands the error back for returning
    pub(crate) fn report(&self, operation: Operation, error: ChatError) -> ChatError {
        warn!("Failed to {}: {}", operation, error);
        if self
            .notice_tx
            .send(Notice {
                operation,
                error: error.clone(),
            })
            .is_err()
        {
            debug!("No notice receivers for {} failure", operation);
        }
        error
    }
}

impl Drop for ChatStore {
    fn drop(&mut self) {
        let subscription = self.lock_state().subscription.take();
        if let Some(subscription) = subscription {
            self.channel.off(subscription.listener);
            debug!(
                "Released message listener for {} on store drop",
                subscription.contact_id
            );
        }
    }
}
