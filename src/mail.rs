//! Send emails to user for important updates.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use url::Url;

use crate::config::Mail;
use crate::error::{Result, ServerError};
use crate::user::User;

/// SMTP mail sender.
///
/// Without a `mail` config section the manager carries no transport and
/// every send is a logged no-op.
#[derive(Clone, Default)]
pub struct MailManager {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

fn delivery(err: impl std::error::Error + Send + Sync + 'static) -> ServerError {
    ServerError::Delivery(Box::new(err))
}

impl MailManager {
    /// Create a new [`MailManager`] from the SMTP config section.
    pub fn new(config: &Mail) -> Result<Self> {
        let mut builder = if config.tls.unwrap_or(true) {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.address)
                .map_err(delivery)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.address,
            )
        };

        if let Some(port) = config.port {
            builder = builder.port(port);
        }
        if let (Some(username), Some(password)) =
            (&config.username, &config.password)
        {
            builder = builder
                .credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|err| delivery(err))?;

        tracing::info!(hostname = %config.address, "smtp transport ready");

        Ok(Self {
            transport: Some(builder.build()),
            from: Some(from),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<()> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from)
        else {
            tracing::debug!(%subject, "mail transport not configured, skipped");
            return Ok(());
        };

        let message = Message::builder()
            .from(from.clone())
            .to(to.parse::<Mailbox>().map_err(delivery)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(delivery)?;

        transport.send(message).await.map_err(delivery)?;

        tracing::trace!(%subject, "mail sent");

        Ok(())
    }

    /// Mail a verification link to the user's address.
    pub async fn send_verification_link(
        &self,
        user: &User,
        link: &Url,
    ) -> Result<()> {
        self.send(
            &user.email,
            "Verify your email address",
            format!(
                "Hello {},\n\nOpen the link below to verify your email \
                 address:\n{link}\n",
                user.username
            ),
        )
        .await
    }

    /// Mail a password-reset token to an address.
    pub async fn send_reset_link(&self, email: &str, token: &str) -> Result<()> {
        self.send(
            email,
            "Reset your password",
            format!(
                "A password reset was requested for this address.\n\n\
                 Reset token: {token}\n\nIf you did not request it, ignore \
                 this mail.\n"
            ),
        )
        .await
    }
}
