//! Best-effort alert delivery.
//!
//! The dispatcher fans each alert out to every enabled channel behind the
//! uniform [`AlertChannel`] contract. Channel failures are logged and
//! isolated: one dead channel never blocks the others or the tick.

mod email;
mod telegram;
mod webhook;

pub use email::EmailChannel;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ChannelsConfig;
use crate::models::Alert;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build mail: {0}")]
    Mail(#[from] lettre::error::Error),
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    #[error("channel failure: {0}")]
    Failed(String),
}

/// One delivery target. Implementations hold their own transient connection
/// handles and treat the alert as opaque payload.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, alert: &Alert) -> Result<(), ChannelError>;
}

pub struct Dispatcher {
    channels: Vec<Box<dyn AlertChannel>>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            send_timeout,
        }
    }

    /// Build a dispatcher with every channel the config enables.
    pub fn from_config(
        channels: &ChannelsConfig,
        send_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let mut dispatcher = Self::new(send_timeout);
        if channels.webhook.enabled {
            dispatcher.add_channel(Box::new(WebhookChannel::new(&channels.webhook)?));
        }
        if channels.email.enabled {
            dispatcher.add_channel(Box::new(EmailChannel::new(&channels.email)?));
        }
        if channels.telegram.enabled {
            dispatcher.add_channel(Box::new(TelegramChannel::new(&channels.telegram)));
        }
        Ok(dispatcher)
    }

    pub fn add_channel(&mut self, channel: Box<dyn AlertChannel>) {
        self.channels.push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver one alert to every channel. Returns how many channels
    /// accepted it; failures and timeouts are logged and swallowed.
    pub async fn dispatch(&self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            match tokio::time::timeout(self.send_timeout, channel.send(alert)).await {
                Ok(Ok(())) => {
                    info!(
                        channel = channel.name(),
                        kind = alert.kind.label(),
                        "alert delivered"
                    );
                    delivered += 1;
                }
                Ok(Err(error)) => {
                    warn!(
                        channel = channel.name(),
                        kind = alert.kind.label(),
                        error = %error,
                        "alert delivery failed"
                    );
                }
                Err(_) => {
                    warn!(
                        channel = channel.name(),
                        kind = alert.kind.label(),
                        "alert delivery timed out"
                    );
                }
            }
        }
        delivered
    }

    /// Deliver a tick's batch, returning the total successful sends.
    pub async fn dispatch_all(&self, alerts: &[Alert]) -> usize {
        let mut delivered = 0;
        for alert in alerts {
            delivered += self.dispatch(alert).await;
        }
        delivered
    }
}
