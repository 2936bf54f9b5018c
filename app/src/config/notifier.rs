use std::time::Duration;

use serde::Deserialize;

/// Collaborator server that receives captured photos. With no `url` the
/// notifier is disabled and uploads become logged no-ops.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NotifierConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
    pub sender: String,
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            sender: "camera-rig".into(),
        }
    }
}
