use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use error_stack::{Report, Result, ResultExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::NotifierConfig;
use crate::state::now_stamp;
use crate::RigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RotationKind {
    Sweep,
    Angle,
}

/// Forwards captured photos and progress to the collaborator's server.
/// Callers treat every failure as non-fatal; nothing here is retried.
pub trait Notifier: Send {
    fn send_photo(
        &self,
        path: &Path,
        rotation_number: u32,
        kind: RotationKind,
    ) -> Result<(), RigError>;

    fn send_status(&self, rotation_number: u32, status: &str) -> Result<(), RigError>;

    fn test_connection(&self) -> Result<(), RigError>;
}

#[derive(Serialize)]
struct PhotoUpload<'a> {
    image: String,
    timestamp: String,
    filename: &'a str,
    rotation_number: u32,
    sender: &'a str,
    rotation_type: String,
}

#[derive(Serialize)]
struct StatusUpdate<'a> {
    timestamp: String,
    rotation_number: u32,
    status: &'a str,
    sender: &'a str,
}

#[derive(Deserialize)]
struct RemoteReply {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpNotifier {
    config: NotifierConfig,
    // built on first use, which is always on a blocking thread
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpNotifier {
    pub fn new(config: &NotifierConfig) -> Self {
        Self {
            config: config.clone(),
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, RigError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.timeout())
            .build()
            .change_context(RigError::NotifyError)?;
        Ok(self.client.get_or_init(|| client))
    }

    fn check_reply(reply: reqwest::blocking::Response, what: &str) -> Result<(), RigError> {
        let status = reply.status();
        if !status.is_success() {
            return Err(Report::new(RigError::NotifyError)
                .attach_printable(format!("{what} rejected with HTTP {status}")));
        }
        let body: RemoteReply = reply.json().change_context(RigError::NotifyError)?;
        if !body.success {
            return Err(Report::new(RigError::NotifyError).attach_printable(format!(
                "collaborator reported failure: {}",
                body.error.unwrap_or_else(|| "unknown error".into())
            )));
        }
        Ok(())
    }
}

impl Notifier for HttpNotifier {
    fn send_photo(
        &self,
        path: &Path,
        rotation_number: u32,
        kind: RotationKind,
    ) -> Result<(), RigError> {
        let Some(url) = &self.config.url else {
            debug!("notifier disabled, keeping {} local only", path.display());
            return Ok(());
        };

        let bytes = fs::read(path)
            .change_context(RigError::NotifyError)
            .attach_printable_lazy(|| format!("couldn't read photo {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("photo.jpg");

        let upload = PhotoUpload {
            image: BASE64.encode(&bytes),
            timestamp: now_stamp(),
            filename,
            rotation_number,
            sender: &self.config.sender,
            rotation_type: kind.to_string(),
        };

        let reply = self
            .client()?
            .post(format!("{url}/api/receive_photo"))
            .json(&upload)
            .send()
            .change_context(RigError::NotifyError)?;
        Self::check_reply(reply, "photo upload")?;

        info!("forwarded {filename} ({} bytes)", bytes.len());
        Ok(())
    }

    fn send_status(&self, rotation_number: u32, status: &str) -> Result<(), RigError> {
        let Some(url) = &self.config.url else {
            return Ok(());
        };

        let update = StatusUpdate {
            timestamp: now_stamp(),
            rotation_number,
            status,
            sender: &self.config.sender,
        };

        let reply = self
            .client()?
            .post(format!("{url}/api/receive_status"))
            .json(&update)
            .send()
            .change_context(RigError::NotifyError)?;
        Self::check_reply(reply, "status update")
    }

    fn test_connection(&self) -> Result<(), RigError> {
        let Some(url) = &self.config.url else {
            return Ok(());
        };

        let reply = self
            .client()?
            .get(url)
            .send()
            .change_context(RigError::NotifyError)
            .attach_printable_lazy(|| format!("couldn't reach {url}"))?;
        if !reply.status().is_success() {
            return Err(Report::new(RigError::NotifyError)
                .attach_printable(format!("{url} answered HTTP {}", reply.status())));
        }
        Ok(())
    }
}
