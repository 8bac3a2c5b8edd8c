use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{KeyboardButton, KeyboardMarkup, MessageId};
use teloxide::update_listeners::Polling;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::platform::{ChatClient, EventKind, InboundEvent, ReplyKeyboard};

/// Long-poll timeout passed to getUpdates
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the feed between the poller and the dispatch loop
pub const FEED_CAPACITY: usize = 100;

/// Telegram side of the bot: sends replies and deletes messages.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    /// Create the client and check the token with getMe.
    pub async fn connect(token: &str) -> Result<Self> {
        let bot = Bot::new(token);
        let me = bot
            .get_me()
            .await
            .context("Failed to connect to Telegram (check Bot.BotKey)")?;

        info!(
            "Authorized on Telegram as @{} ({})",
            me.user.username.as_deref().unwrap_or("unknown"),
            me.user.id
        );
        Ok(Self { bot })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

fn to_markup(keyboard: &ReplyKeyboard) -> KeyboardMarkup {
    let rows = keyboard
        .rows
        .iter()
        .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>());
    let markup = KeyboardMarkup::new(rows);
    if keyboard.one_time {
        markup.one_time_keyboard()
    } else {
        markup
    }
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> Result<()> {
        let request = self.bot.send_message(ChatId(chat_id), text);
        match keyboard {
            Some(keyboard) => request.reply_markup(to_markup(keyboard)).await?,
            None => request.await?,
        };
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }
}

/// Convert a text message or channel post into an event. Non-text updates are dropped.
pub fn to_event(msg: &Message, kind: EventKind) -> Option<InboundEvent> {
    let text = msg.text()?;
    Some(InboundEvent {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: text.to_string(),
        kind,
    })
}

async fn forward(
    msg: Message,
    kind: EventKind,
    feed: mpsc::Sender<InboundEvent>,
) -> ResponseResult<()> {
    let Some(event) = to_event(&msg, kind) else {
        debug!("Skipping non-text update in chat {}", msg.chat.id);
        return Ok(());
    };

    if feed.send(event).await.is_err() {
        warn!("Dispatch loop is gone, dropping update from chat {}", msg.chat.id);
    }
    Ok(())
}

async fn forward_message(msg: Message, feed: mpsc::Sender<InboundEvent>) -> ResponseResult<()> {
    forward(msg, EventKind::Message, feed).await
}

async fn forward_channel_post(
    msg: Message,
    feed: mpsc::Sender<InboundEvent>,
) -> ResponseResult<()> {
    forward(msg, EventKind::ChannelPost, feed).await
}

/// Long-poll Telegram and push every text message and channel post into
/// `feed` until `cancel` fires.
pub async fn run_feed(
    bot: Bot,
    feed: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    info!("Starting Telegram long polling (timeout {:?})...", POLL_TIMEOUT);

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(forward_message))
        .branch(Update::filter_channel_post().endpoint(forward_channel_post));

    let listener = Polling::builder(bot.clone()).timeout(POLL_TIMEOUT).build();

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![feed])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build();

    let shutdown_token = dispatcher.shutdown_token();

    tokio::select! {
        _ = dispatcher.dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("telegram polling"),
        ) => {
            info!("Telegram polling finished");
        }
        _ = cancel.cancelled() => {
            info!("Stopping Telegram polling");
            shutdown_token.shutdown().ok();
        }
    }

    Ok(())
}
