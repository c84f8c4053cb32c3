// src/utils/mailer.rs

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, Message},
    transport::smtp::authentication::Credentials,
};

use crate::{config::Config, error::AppError};

/// SMTP sender for verification codes. When SMTP is not configured
/// (local development, integration tests), codes are logged instead.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl Mailer {
    /// Builds the transport from config. Returns a no-op mailer when any
    /// SMTP setting is missing.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let (Some(host), Some(username), Some(password), Some(from)) = (
            &config.smtp_host,
            &config.smtp_username,
            &config.smtp_password,
            &config.smtp_from,
        ) else {
            tracing::warn!("SMTP not configured, verification codes will be logged");
            return Ok(Mailer {
                transport: None,
                from: None,
            });
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();

        let from = from
            .parse::<Mailbox>()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        Ok(Mailer {
            transport: Some(transport),
            from: Some(from),
        })
    }

    /// No-op mailer for tests.
    pub fn disabled() -> Self {
        Mailer {
            transport: None,
            from: None,
        }
    }

    /// Sends the 6-digit registration code to `to`.
    pub async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), AppError> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            tracing::info!("Verification code for {}: {}", to, code);
            return Ok(());
        };

        let to_mailbox = to
            .parse::<Mailbox>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let msg = Message::builder()
            .from(from.clone())
            .to(to_mailbox)
            .subject("Your Quizhub verification code")
            .body(format!(
                "Your verification code is: {}\n\nIt expires in 10 minutes.",
                code
            ))
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        if let Err(err) = transport.send(msg).await {
            tracing::error!("error sending email with smtp: {}", err);
            return Err(AppError::InternalServerError(err.to_string()));
        }

        Ok(())
    }
}
