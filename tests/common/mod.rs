// Common test utilities for integration tests
// Mock collaborators for the chat store plus fixtures shared by all test files

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use log::{info, LevelFilter};
use tokio::sync::oneshot;

use murmur::api::{ApiError, ChatApi};
use murmur::models::{Contact, Message, MessagePayload};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub fn contact(id: &str, name: &str) -> Contact {
    Contact {
        id: id.to_string(),
        full_name: name.to_string(),
        profile_pic: None,
        email: None,
    }
}

pub fn message(id: &str, from: &str, to: &str, text: &str) -> Message {
    Message {
        id: id.to_string(),
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        text: Some(text.to_string()),
        image: None,
        video: None,
        audio: None,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

/// In-memory stand-in for the chat server's REST API.
///
/// Every call is recorded. Failures can be queued per operation, and any call
/// can be held open until the test releases it.
pub struct MockApi {
    pub self_id: String,
    contacts: Mutex<Vec<Contact>>,
    histories: Mutex<HashMap<String, Vec<Message>>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    held: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, MessagePayload)>>,
    next_id: Mutex<u32>,
}

impl MockApi {
    pub fn new(self_id: &str) -> Self {
        MockApi {
            self_id: self_id.to_string(),
            contacts: Mutex::new(Vec::new()),
            histories: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    pub fn with_contacts(self, contacts: Vec<Contact>) -> Self {
        *self.contacts.lock().unwrap() = contacts;
        self
    }

    pub fn set_contacts(&self, contacts: Vec<Contact>) {
        *self.contacts.lock().unwrap() = contacts;
    }

    pub fn set_history(&self, contact_id: &str, messages: Vec<Message>) {
        self.histories
            .lock()
            .unwrap()
            .insert(contact_id.to_string(), messages);
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: &'static str, error: ApiError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    /// Block the next occurrence of `call` (as recorded by `calls`) until the sender fires
    pub fn hold(&self, call: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.held.lock().unwrap().insert(call.to_string(), rx);
        tx
    }

    pub fn hold_history(&self, contact_id: &str) -> oneshot::Sender<()> {
        self.hold(&format!("history:{}", contact_id))
    }

    pub fn hold_contacts(&self) -> oneshot::Sender<()> {
        self.hold("contacts")
    }

    pub fn hold_delete(&self, contact_id: &str) -> oneshot::Sender<()> {
        self.hold(&format!("delete:{}", contact_id))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, MessagePayload)> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until `call` has been recorded (a held request has started)
    pub async fn wait_for_call(&self, call: &str) {
        let wait = async {
            while !self.calls().iter().any(|c| c == call) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for call {}", call));
    }

    /// Record `call`, then wait if the test is holding it
    async fn record(&self, call: String) {
        info!("MockApi call: {}", call);
        let held = self.held.lock().unwrap().remove(&call);
        self.calls.lock().unwrap().push(call);
        if let Some(release) = held {
            let _ = release.await;
        }
    }

    fn take_failure(&self, operation: &'static str) -> Option<ApiError> {
        self.failures.lock().unwrap().remove(operation)
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn list_contacts(&self) -> Result<Vec<Contact>, ApiError> {
        // the server answers with the list as it was when the request arrived
        let contacts = self.contacts.lock().unwrap().clone();
        self.record("contacts".to_string()).await;
        if let Some(e) = self.take_failure("contacts") {
            return Err(e);
        }
        Ok(contacts)
    }

    async fn fetch_history(&self, contact_id: &str) -> Result<Vec<Message>, ApiError> {
        self.record(format!("history:{}", contact_id)).await;
        if let Some(e) = self.take_failure("history") {
            return Err(e);
        }
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(contact_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        contact_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, ApiError> {
        self.record(format!("send:{}", contact_id)).await;
        if let Some(e) = self.take_failure("send") {
            return Err(e);
        }
        self.sent
            .lock()
            .unwrap()
            .push((contact_id.to_string(), payload.clone()));

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("srv-{}", *next)
        };
        Ok(Message {
            id,
            sender_id: self.self_id.clone(),
            receiver_id: contact_id.to_string(),
            text: payload.text.clone(),
            image: payload
                .image
                .as_ref()
                .map(|_| "https://cdn.example/uploads/img.png".to_string()),
            video: None,
            audio: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap(),
        })
    }

    async fn delete_conversation(&self, contact_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete:{}", contact_id)).await;
        if let Some(e) = self.take_failure("delete") {
            return Err(e);
        }
        self.contacts.lock().unwrap().retain(|c| c.id != contact_id);
        self.histories.lock().unwrap().remove(contact_id);
        Ok(())
    }
}
