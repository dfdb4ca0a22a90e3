use async_trait::async_trait;
use teloxide::{Bot, prelude::Requester, types::ChatId};

use super::{AlertChannel, ChannelError};
use crate::config::TelegramChannelConfig;
use crate::models::Alert;

/// Sends each alert as a Telegram bot message.
pub struct TelegramChannel {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChannel {
    pub fn new(config: &TelegramChannelConfig) -> Self {
        Self {
            bot: Bot::new(config.bot_token.clone()),
            chat_id: ChatId(config.chat_id),
        }
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let text = format!(
            "[watchbeat][{}] {}\n{}",
            alert.severity.as_str(),
            alert.kind.label(),
            alert.message
        );

        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }
}
