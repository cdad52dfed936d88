// SPDX-License-Identifier: MIT

//! SMTP-backed [`NotifyAdapter`] via `lettre`.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as LettreAttachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};

use crate::adapter::{Message, NotifyAdapter};
use crate::error::NotifyError;

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpNotifier {
    pub fn new(relay: &str, credentials: Option<(String, String)>, from: impl Into<String>) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)
            .map_err(NotifyError::Send)?;
        if let Some((user, pass)) = credentials {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        Ok(Self { transport: builder.build(), from: from.into() })
    }
}

#[async_trait]
impl NotifyAdapter for SmtpNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(message.body.clone()));
        for attachment in &message.attachments {
            multipart = multipart.singlepart(
                LettreAttachment::new(attachment.filename.clone())
                    .body(attachment.body.clone().into_bytes(), ContentType::TEXT_PLAIN),
            );
        }
        let mut builder = LettreMessage::builder().from(self.from.parse()?);
        for recipient in &message.to {
            builder = builder.to(recipient.parse()?);
        }
        let email = builder.subject(&message.subject).multipart(multipart)?;
        self.transport.send(email).await?;
        Ok(())
    }
}
