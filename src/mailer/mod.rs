use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::{ClientId, Extension};
use log::{debug, info, warn};
use thiserror::Error;

use crate::configuration::credential::Credential;
use crate::configuration::smtp::{SmtpHeaders, SmtpSettings};
use crate::configuration::ConfigError;

type SmtpError = lettre::transport::smtp::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("incomplete SMTP configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("unable to connect to {server}: {source}")]
    Connection {
        server: String,
        #[source]
        source: SmtpError,
    },
    #[error("{0} does not offer STARTTLS, refusing to authenticate in clear text")]
    StartTlsUnavailable(String),
    #[error("authentication failed: {0}")]
    Auth(#[source] SmtpError),
    #[error("not authenticated, the message was not sent")]
    NotAuthenticated,
    #[error("unable to attach '{path}': {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("unable to build message: {0}")]
    Message(#[source] lettre::error::Error),
    #[error("sending failed: {0}")]
    Send(#[source] SmtpError),
}

/// An SMTP session that is upgraded to TLS before logging in. The session
/// is closed with QUIT when the mailer is dropped.
pub struct Mailer {
    connection: SmtpConnection,
    host: String,
    hello_name: ClientId,
    authenticated: bool,
}

impl Mailer {
    pub fn connect(settings: &SmtpSettings) -> Result<Mailer, MailError> {
        let server = format!("{}:{}", settings.host, settings.port);
        let hello_name = ClientId::default();

        info!("connecting to SMTP server {}", server);
        let connection = SmtpConnection::connect(
            (settings.host.as_str(), settings.port),
            Some(settings.timeout),
            &hello_name,
            None,
            None,
        )
        .map_err(|source| MailError::Connection {
            server: server.clone(),
            source,
        })?;

        Ok(Mailer {
            connection,
            host: settings.host.clone(),
            hello_name,
            authenticated: false,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn login(&mut self, credential: &Credential) -> Result<(), MailError> {
        if !self
            .connection
            .server_info()
            .supports_feature(Extension::StartTls)
        {
            return Err(MailError::StartTlsUnavailable(self.host.clone()));
        }

        debug!("upgrading connection to {} with STARTTLS", self.host);
        let tls_parameters = TlsParameters::new(self.host.clone()).map_err(MailError::Auth)?;
        self.connection
            .starttls(&tls_parameters, &self.hello_name)
            .map_err(MailError::Auth)?;

        let credentials = Credentials::new(credential.username.clone(), credential.password.clone());
        self.connection
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .map_err(MailError::Auth)?;
        self.authenticated = true;
        info!("authenticated as {}", credential.username);

        Ok(())
    }

    /// Sends `file` as the only attachment of a plain text message.
    pub fn send_attachment(
        &mut self,
        headers: &SmtpHeaders,
        file: &Path,
        body: &str,
    ) -> Result<(), MailError> {
        if !self.is_authenticated() {
            return Err(MailError::NotAuthenticated);
        }

        let message = build_message(headers, file, body)?;
        self.connection
            .send(message.envelope(), &message.formatted())
            .map_err(MailError::Send)?;
        info!("e-mail sent to {}", headers.to);

        Ok(())
    }
}

impl Drop for Mailer {
    fn drop(&mut self) {
        if let Err(err) = self.connection.quit() {
            warn!("closing SMTP session failed: {}", err);
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse::<Mailbox>()
        .map_err(|source| MailError::Address {
            address: address.to_string(),
            source,
        })
}

/// Builds a multipart message with `body` as text and `file` attached under
/// its base name. An unreadable file fails the whole message.
pub fn build_message(headers: &SmtpHeaders, file: &Path, body: &str) -> Result<Message, MailError> {
    let content = fs::read(file).map_err(|source| MailError::Attachment {
        path: file.to_path_buf(),
        source,
    })?;
    let attachment_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let mut builder = Message::builder()
        .from(parse_mailbox(&headers.from)?)
        .subject(headers.subject.as_str());
    for recipient in headers.recipients() {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body.to_string()))
                .singlepart(Attachment::new(attachment_name).body(content, ContentType::TEXT_PLAIN)),
        )
        .map_err(MailError::Message)
}
