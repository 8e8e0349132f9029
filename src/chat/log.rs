//! Ordered, de-duplicated chat message storage.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::types::{Channel, ChatMessage};

/// Log shared between the controller and a running transport.
pub type SharedChatLog = Arc<Mutex<ChatLog>>;

/// Messages from every channel, sorted by timestamp then id.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl ChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> SharedChatLog {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Append messages whose id is not yet present.
    ///
    /// Returns how many were added. Re-sorts only when something changed.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = ChatMessage>) -> usize {
        let before = self.messages.len();
        for msg in incoming {
            if self.ids.insert(msg.id.clone()) {
                self.messages.push(msg);
            }
        }
        let added = self.messages.len() - before;
        if added > 0 {
            self.messages
                .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        }
        added
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages of one channel, in log order.
    pub fn channel(&self, channel: Channel) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(move |m| m.channel == channel)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, channel: Channel, secs: i64) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            channel,
            user_id: "1".into(),
            user_name: "Admin User".into(),
            content: format!("message {id}"),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn duplicate_delivery_is_kept_once() {
        let mut log = ChatLog::new();
        let socket_copy = msg("42", Channel::Community, 100);
        let poll_copy = socket_copy.clone();

        assert_eq!(log.merge([socket_copy]), 1);
        assert_eq!(log.merge([poll_copy]), 0);
        assert_eq!(log.len(), 1);
        assert!(log.contains("42"));
    }

    #[test]
    fn merge_sorts_by_timestamp_then_id() {
        let mut log = ChatLog::new();
        log.merge([
            msg("3", Channel::Community, 300),
            msg("b", Channel::Moderator, 100),
        ]);
        log.merge([msg("a", Channel::Community, 100), msg("3", Channel::Community, 300)]);

        let ids: Vec<_> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "3"]);
        assert_eq!(log.channel(Channel::Moderator).count(), 1);
    }

    #[test]
    fn clear_forgets_ids() {
        let mut log = ChatLog::new();
        log.merge([msg("1", Channel::Community, 1)]);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.merge([msg("1", Channel::Community, 1)]), 1);
    }
}
