use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

/// Outbound mail seam. The OTP service only knows how to ask for a reset
/// code to be delivered; transport lives behind this trait.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_code(&self, to_email: &str, code: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self { config, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_reset_code(&self, to_email: &str, code: &str) -> anyhow::Result<()> {
        let from = format!("{} <{}>", self.config.from_name, self.config.from_email);
        let email = Message::builder()
            .from(from.parse().map_err(|e| anyhow::anyhow!("{e}"))?)
            .to(to_email.parse().map_err(|e| anyhow::anyhow!("{e}"))?)
            .subject("Password Reset OTP")
            .header(ContentType::TEXT_PLAIN)
            .body(format!("Your OTP for password reset is: {code}"))?;
        self.transport.send(email).await?;
        info!(to = %to_email, "reset code email sent");
        Ok(())
    }
}

/// Logs instead of sending; used when SMTP is not configured and in tests.
pub struct MockMailer;

#[async_trait]
impl Mailer for MockMailer {
    async fn send_reset_code(&self, to_email: &str, code: &str) -> anyhow::Result<()> {
        info!(to = %to_email, code = %code, "mock mailer: reset code email");
        Ok(())
    }
}
