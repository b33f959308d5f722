use clap::ValueEnum;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::{smtp::authentication::Credentials, stub::AsyncStubTransport},
};
use minijinja::{Environment, context};
use serde::Deserialize;
use tracing::info;

use crate::{
    config::{Config, EmailConfig},
    entities::{guest, household},
};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("No sender address configured (DEFAULT_WEDDING_EMAIL)")]
    MissingSender,

    #[error("No recipient given")]
    NoRecipients,

    #[error(transparent)]
    Address(#[from] lettre::address::AddressError),

    #[error(transparent)]
    Message(#[from] lettre::error::Error),

    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error(transparent)]
    Stub(#[from] lettre::transport::stub::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EmailKind {
    Invitation,
    SaveTheDate,
}

impl EmailKind {
    fn template(self) -> &'static str {
        match self {
            EmailKind::Invitation => "email/invitation.html",
            EmailKind::SaveTheDate => "email/save_the_date.html",
        }
    }

    fn subject(self, couple_name: &str) -> String {
        match self {
            EmailKind::Invitation => format!("Invitation au mariage de {couple_name}"),
            EmailKind::SaveTheDate => format!("Save the date : {couple_name} se marient !"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Personal RSVP link of a household.
pub fn invitation_url(site_url: &str, token: &str) -> String {
    format!("{}/invitation/{}/", site_url.trim_end_matches('/'), token)
}

pub fn render_email(
    templates: &Environment<'_>,
    config: &Config,
    kind: EmailKind,
    household: &household::Model,
    guests: &[guest::Model],
) -> Result<RenderedEmail, minijinja::Error> {
    let tmpl = templates.get_template(kind.template())?;
    let html = tmpl.render(context! {
        household_name => household.name,
        guests => guests,
        info_url => config.info_url,
        rsvp_url => invitation_url(&config.site_url, &household.invitation_token),
        couple_name => config.couple_name,
        wedding_date => config.wedding_date,
        wedding_location => config.wedding_location,
        support_email => config.email.reply_to,
        email_mode => true,
    })?;

    Ok(RenderedEmail {
        subject: kind.subject(&config.couple_name),
        html,
    })
}

/// Plain-text message the couple can paste into a chat or a personal email.
pub fn invitation_message(
    templates: &Environment<'_>,
    config: &Config,
    household: &household::Model,
) -> Result<String, minijinja::Error> {
    templates
        .get_template("email/invitation_message.txt")?
        .render(context! {
            household_name => household.name,
            info_url => config.info_url,
            rsvp_url => invitation_url(&config.site_url, &household.invitation_token),
            couple_name => config.couple_name,
        })
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    // Used when no SMTP host is configured: messages are logged, not sent.
    Stub(AsyncStubTransport),
}

pub struct Notifier {
    transport: Transport,
    from: Option<String>,
    reply_to: Option<String>,
    cc: Vec<String>,
}

impl Notifier {
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let transport = match &config.host {
            Some(host) => {
                let builder = if config.use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                };
                let mut builder = builder.port(config.port);
                if let Some(username) = &config.username {
                    builder = builder.credentials(Credentials::new(
                        username.clone(),
                        config.password.clone().unwrap_or_default(),
                    ));
                }
                Transport::Smtp(builder.build())
            }
            None => Transport::Stub(AsyncStubTransport::new_ok()),
        };

        Ok(Self {
            transport,
            from: config.from.clone(),
            reply_to: config.reply_to.clone(),
            cc: config.cc.clone(),
        })
    }

    pub fn build_message(
        &self,
        email: &RenderedEmail,
        recipients: &[String],
    ) -> Result<Message, NotifyError> {
        let from = self.from.as_deref().ok_or(NotifyError::MissingSender)?;
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(from.parse::<Mailbox>()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.parse()?);
        }
        for to in recipients {
            builder = builder.to(to.parse()?);
        }
        for cc in &self.cc {
            builder = builder.cc(cc.parse()?);
        }

        Ok(builder.body(email.html.clone())?)
    }

    pub async fn send(&self, email: &RenderedEmail, recipients: &[String]) -> Result<(), NotifyError> {
        let message = self.build_message(email, recipients)?;
        match &self.transport {
            Transport::Smtp(transport) => {
                transport.send(message).await?;
            }
            Transport::Stub(transport) => {
                info!("No SMTP host configured, not sending {:?}", email.subject);
                transport.send(message).await?;
            }
        }
        info!(recipients = recipients.len(), "Sent {:?}", email.subject);
        Ok(())
    }
}
