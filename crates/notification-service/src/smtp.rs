use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::templates::RenderedEmail;
use crate::{NotificationChannel, NotificationConfig, NotificationError, SmtpTls};

/// Email channel: every rendered notification goes to all configured
/// recipients through one SMTP relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    addressing: Addressing,
}

/// Sender and recipients stamped on every message.
struct Addressing {
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl Addressing {
    fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let from = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SMTP_FROM_ADDRESS not set".into()))
            .and_then(|addr| mailbox("SMTP_FROM_ADDRESS", addr))?;

        let to = config
            .smtp_to
            .iter()
            .map(|addr| mailbox("NOTIFICATION_EMAIL_TO", addr))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotificationError::Config("NOTIFICATION_EMAIL_TO is empty".into()));
        }

        Ok(Self { from, to })
    }

    /// HTML body with the plain text rendering as its alternative.
    fn message(&self, email: &RenderedEmail) -> Result<Message, NotificationError> {
        let builder = self
            .to
            .iter()
            .fold(Message::builder().from(self.from.clone()), |b, rcpt| b.to(rcpt.clone()))
            .subject(email.subject.as_str());

        builder
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| NotificationError::Smtp(format!("cannot assemble {:?}: {}", email.subject, e)))
    }
}

fn mailbox(key: &str, addr: &str) -> Result<Mailbox, NotificationError> {
    addr.parse()
        .map_err(|e| NotificationError::Config(format!("{} has invalid address {:?}: {}", key, addr, e)))
}

fn relay(config: &NotificationConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotificationError> {
    let host = config
        .smtp_host
        .as_deref()
        .ok_or_else(|| NotificationError::Config("SMTP_HOST not set".into()))?;

    let builder = match config.smtp_tls {
        SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
        SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
        SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
    }
    .map_err(|e| NotificationError::Smtp(format!("relay {}: {}", host, e)))?
    .port(config.smtp_port);

    let builder = match (&config.smtp_username, &config.smtp_password) {
        (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("SMTP_USERNAME and SMTP_PASSWORD must both be set; connecting without auth");
            builder
        }
        (None, None) => builder,
    };
    Ok(builder.build())
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let addressing = Addressing::from_config(config)?;
        let transport = relay(config)?;
        Ok(Self {
            transport,
            addressing,
        })
    }

    pub fn recipient_count(&self) -> usize {
        self.addressing.to.len()
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, email: &RenderedEmail) -> Result<(), NotificationError> {
        let message = self.addressing.message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Smtp(format!("delivery of {:?} failed: {}", email.subject, e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
