use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::format::{render_text, Digest};
use super::{Channel, EmailSettings};

pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    pub fn from_settings(s: &EmailSettings) -> Result<Self> {
        let creds = Credentials::new(s.user.clone(), s.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&s.host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = s.from.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = s.to.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }
}

#[async_trait::async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, digest: &Digest) -> Result<()> {
        let subject = format!("{} ({})", digest.title_line(), digest.date);
        let body = render_text(digest);

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
