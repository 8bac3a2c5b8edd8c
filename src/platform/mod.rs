pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

/// Where an inbound event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Private or group chat message
    Message,
    /// Post in a broadcast channel
    ChannelPost,
}

/// A text event received from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub message_id: i32,
    pub text: String,
    pub kind: EventKind,
}

/// Reply keyboard: rows of button labels. Pressing a button sends its label
/// back as a plain message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
    /// Hide the keyboard after one press
    pub one_time: bool,
}

impl ReplyKeyboard {
    /// All labels in a single row, persistent.
    pub fn single_row(labels: Vec<String>) -> Self {
        Self {
            rows: vec![labels],
            one_time: false,
        }
    }
}

/// Outbound side of the chat platform
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()>;
}
