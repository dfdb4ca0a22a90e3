use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::Mailbox,
    transport::smtp::authentication::Credentials,
};

use super::{AlertChannel, ChannelError};
use crate::config::EmailChannelConfig;
use crate::models::Alert;

/// Sends each alert as a plain-text mail over SMTP (STARTTLS).
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    pub fn new(config: &EmailChannelConfig) -> Result<Self, ChannelError> {
        let from = config.from_addr.parse::<Mailbox>()?;
        let mut to = Vec::with_capacity(config.to_addrs.len());
        for addr in &config.to_addrs {
            to.push(addr.parse::<Mailbox>()?);
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let subject = format!(
            "[{}] {}",
            alert.severity.as_str().to_uppercase(),
            alert.kind.label()
        );
        let body = format!(
            "{}\n\nKind: {}\nSeverity: {}\nValue: {}\nThreshold: {}\nSuppressed since last dispatch: {}\n",
            alert.message,
            alert.kind.label(),
            alert.severity.as_str(),
            alert
                .value
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "n/a".to_owned()),
            alert
                .threshold
                .map(|t| format!("{t:.2}"))
                .unwrap_or_else(|| "n/a".to_owned()),
            alert.suppressed_since_last,
        );

        let mut message = Message::builder().from(self.from.clone()).subject(subject);
        for mailbox in &self.to {
            message = message.to(mailbox.clone());
        }
        let message = message.body(body)?;

        self.transport.send(message).await?;
        Ok(())
    }
}
