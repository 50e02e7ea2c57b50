//! Displayed-message bookkeeping.

use std::collections::{HashMap, HashSet};

use crate::api::Message;

/// Tracks which messages have already been shown, and through which
/// connection each one arrived.
#[derive(Debug, Default)]
pub struct MessageFeed {
    displayed: HashSet<String>,
    origins: HashMap<String, String>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the messages that have not been displayed yet, in order, and
    /// records them as displayed.
    ///
    /// `connection_id` is `None` for the user's own messages.
    pub fn ingest(&mut self, connection_id: Option<&str>, messages: Vec<Message>) -> Vec<Message> {
        let fresh: Vec<Message> = messages
            .into_iter()
            .filter(|message| self.displayed.insert(message.id.clone()))
            .collect();
        if let Some(connection_id) = connection_id {
            for message in &fresh {
                self.origins
                    .insert(message.id.clone(), connection_id.to_string());
            }
        }
        fresh
    }

    /// Connection a displayed message was fetched through.
    pub fn connection_for(&self, message_id: &str) -> Option<&str> {
        self.origins.get(message_id).map(String::as_str)
    }
}
