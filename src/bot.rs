use std::sync::Arc;

use macaddr::MacAddr6;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::platform::{ChatClient, EventKind, InboundEvent, ReplyKeyboard};
use crate::wol::WakeSender;

pub const START_COMMAND: &str = "/start";
pub const START_REPLY: &str = "Select machine to start:";

/// What the dispatch loop did with a single event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Sender is neither the owner nor the configured channel
    Unauthorized,
    /// Text matched no machine
    Ignored,
    KeyboardSent,
    Woken { machine: String },
    InvalidMac { machine: String },
    /// Reply or wake was attempted and failed
    Failed { reason: String },
}

/// Matches chat events against the machine list and wakes machines.
pub struct WakeBot<C, W> {
    config: Arc<AppConfig>,
    chat: C,
    waker: W,
    keyboard: ReplyKeyboard,
}

impl<C: ChatClient, W: WakeSender> WakeBot<C, W> {
    pub fn new(config: Arc<AppConfig>, chat: C, waker: W) -> Self {
        let keyboard = ReplyKeyboard::single_row(config.machine_names());
        Self {
            config,
            chat,
            waker,
            keyboard,
        }
    }

    /// Consume events until `cancel` fires or the feed closes.
    pub async fn run(&self, mut feed: mpsc::Receiver<InboundEvent>, cancel: CancellationToken) {
        info!(
            "Dispatch loop started ({} machines, channel {})",
            self.config.machines.len(),
            match self.config.bot.channel_id() {
                Some(id) => id.to_string(),
                None => "disabled".to_string(),
            }
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Dispatch loop cancelled");
                    return;
                }
                event = feed.recv() => {
                    let Some(event) = event else {
                        info!("Event feed closed, dispatch loop exiting");
                        return;
                    };
                    let outcome = self.handle(&event).await;
                    debug!("Event {} in chat {}: {:?}", event.message_id, event.chat_id, outcome);
                }
            }
        }
    }

    pub async fn handle(&self, event: &InboundEvent) -> Outcome {
        if !self.is_authorized(event) {
            debug!("Ignoring event from unauthorized chat {}", event.chat_id);
            return Outcome::Unauthorized;
        }

        info!("Got update '{}' from {}", event.text, event.chat_id);

        if event.text == START_COMMAND {
            return self.send_keyboard().await;
        }

        let Some(machine) = self.config.find_machine(&event.text) else {
            return Outcome::Ignored;
        };

        let mac = match machine.mac.parse::<MacAddr6>() {
            Ok(mac) => mac,
            Err(e) => {
                warn!(
                    "Machine '{}' has invalid MAC address {:?}: {}",
                    machine.name, machine.mac, e
                );
                return Outcome::InvalidMac {
                    machine: machine.name.clone(),
                };
            }
        };

        let outcome = match self.waker.wake(&machine.address, mac).await {
            Ok(()) => {
                info!("Woke '{}' ({}) via {}", machine.name, mac, machine.address);
                Outcome::Woken {
                    machine: machine.name.clone(),
                }
            }
            Err(e) => {
                error!("Failed to wake '{}': {}", machine.name, e);
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        if self.config.bot.channel_id().is_some() {
            if let Err(e) = self
                .chat
                .delete_message(event.chat_id, event.message_id)
                .await
            {
                debug!(
                    "Could not delete message {} in chat {}: {:#}",
                    event.message_id, event.chat_id, e
                );
            }
        }

        outcome
    }

    fn is_authorized(&self, event: &InboundEvent) -> bool {
        match event.kind {
            EventKind::Message => self.config.bot.is_authorized(event.chat_id),
            EventKind::ChannelPost => self.config.bot.channel_id() == Some(event.chat_id),
        }
    }

    async fn send_keyboard(&self) -> Outcome {
        let owner = self.config.bot.owner_id;
        match self
            .chat
            .send_message(owner, START_REPLY, Some(&self.keyboard))
            .await
        {
            Ok(()) => Outcome::KeyboardSent,
            Err(e) => {
                error!("Failed to send machine keyboard: {:#}", e);
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
