use anyhow::{anyhow, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::{Arc, Mutex};

use crate::config::{AppConfig, MailTransportKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body: String,
    pub attachment: Option<EmailAttachment>,
}

#[derive(Clone)]
enum Transport {
    Smtp(Arc<AsyncSmtpTransport<Tokio1Executor>>),
    /// Records messages in memory instead of delivering them.
    Outbox(Arc<Mutex<Vec<OutgoingEmail>>>),
    Unavailable,
}

#[derive(Clone)]
pub struct Mailer {
    from: Mailbox,
    transport: Transport,
}

impl Mailer {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        match config.mail_transport {
            MailTransportKind::Outbox => Self::outbox(&config.mail_from),
            MailTransportKind::Smtp => {
                let smtp = &config.smtp;
                let mut builder = if smtp.starttls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
                };
                builder = builder.port(smtp.port);
                if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
                    builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
                }

                Ok(Self {
                    from: parse_mailbox(&config.mail_from)?,
                    transport: Transport::Smtp(Arc::new(builder.build())),
                })
            }
        }
    }

    pub fn outbox(from: &str) -> Result<Self> {
        Ok(Self {
            from: parse_mailbox(from)?,
            transport: Transport::Outbox(Arc::new(Mutex::new(Vec::new()))),
        })
    }

    /// A mailer whose every delivery fails.
    pub fn unavailable(from: &str) -> Result<Self> {
        Ok(Self {
            from: parse_mailbox(from)?,
            transport: Transport::Unavailable,
        })
    }

    /// Bare sender address, without the display name.
    pub fn sender_address(&self) -> String {
        self.from.email.to_string()
    }

    pub async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let message = build_message(&self.from, &email)?;

        match &self.transport {
            Transport::Smtp(transport) => {
                transport.send(message).await?;
            }
            Transport::Outbox(outbox) => {
                let mut sent = outbox
                    .lock()
                    .map_err(|_| anyhow!("mail outbox lock poisoned"))?;
                sent.push(email.clone());
            }
            Transport::Unavailable => return Err(anyhow!("mail transport unavailable")),
        }

        tracing::debug!(transport = transport_name(&self.transport), to = %email.to, "email dispatched");
        Ok(())
    }

    /// Messages recorded by the outbox transport, oldest first.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        match &self.transport {
            Transport::Outbox(outbox) => match outbox.lock() {
                Ok(sent) => sent.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            },
            _ => Vec::new(),
        }
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<OutgoingEmail> {
        self.sent()
            .into_iter()
            .filter(|email| email.to.eq_ignore_ascii_case(recipient))
            .collect()
    }
}

fn transport_name(transport: &Transport) -> &'static str {
    match transport {
        Transport::Smtp(_) => "smtp",
        Transport::Outbox(_) => "outbox",
        Transport::Unavailable => "unavailable",
    }
}

fn parse_mailbox(value: &str) -> Result<Mailbox> {
    value
        .parse::<Mailbox>()
        .map_err(|err| anyhow!("invalid mail address {}: {}", value, err))
}

fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message> {
    let address = email
        .to
        .parse::<Address>()
        .map_err(|err| anyhow!("invalid recipient {}: {}", email.to, err))?;
    let to = Mailbox::new(email.to_name.clone(), address);

    let builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.clone());

    let message = match &email.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|err| anyhow!("invalid attachment content type: {}", err))?;
            builder.multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(email.body.clone()))
                    .singlepart(
                        Attachment::new(attachment.filename.clone())
                            .body(attachment.content.clone(), content_type),
                    ),
            )?
        }
        None => builder.singlepart(SinglePart::plain(email.body.clone()))?,
    };

    Ok(message)
}
