use std::{fs, path::Path, time::Duration};

use error_stack::ResultExt;
use serde::Deserialize;

mod camera;
mod motor;
mod notifier;

pub use camera::CameraConfig;
pub use motor::MotorConfig;
pub use notifier::NotifierConfig;

use crate::sequence;
use crate::RigError;

#[derive(Deserialize, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub motor: MotorConfig,
    pub camera: CameraConfig,
    pub notifier: NotifierConfig,
    pub sequence: SequenceConfig,
}

impl Config {
    pub fn open(path: &Path) -> error_stack::Result<Self, RigError> {
        toml::from_str(
            &fs::read_to_string(path)
                .change_context(RigError::ConfigError)
                .attach_printable("Couldn't read the config file")?,
        )
        .change_context(RigError::ConfigError)
    }

    /// Config from `path` if the file exists, built-in defaults otherwise.
    pub fn open_or_default(path: &Path) -> error_stack::Result<Self, RigError> {
        if path.exists() {
            Self::open(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SequenceConfig {
    pub sweep_steps: u32,
    pub sweep_ack_timeout_secs: u64,
    pub move_ack_timeout_secs: u64,
    pub angle_wait_secs: u64,
    pub poll_interval_ms: u64,
    pub return_to_start: bool,
    pub capture_angle_photos: bool,
}

impl SequenceConfig {
    pub fn sweep_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.sweep_ack_timeout_secs)
    }

    pub fn move_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.move_ack_timeout_secs)
    }

    pub fn angle_wait(&self) -> Duration {
        Duration::from_secs(self.angle_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            sweep_steps: sequence::SWEEP_STEPS,
            sweep_ack_timeout_secs: sequence::SWEEP_ACK_TIMEOUT.as_secs(),
            move_ack_timeout_secs: sequence::MOVE_ACK_TIMEOUT.as_secs(),
            angle_wait_secs: sequence::ANGLE_WAIT_TIMEOUT.as_secs(),
            poll_interval_ms: sequence::ANGLE_POLL_INTERVAL.as_millis() as u64,
            return_to_start: true,
            capture_angle_photos: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn parse_config() {
        let config_toml = r#"
        [server]
        host = "127.0.0.1"
        port = 8080

        [motor]
        port = "/dev/ttyUSB0"
        baud_rate = 115200
        ack_token = "ack"

        [camera]
        width = 1280
        height = 720
        photos_dir = "shots"

        [notifier]
        url = "http://192.168.1.50:5000"
        sender = "rig-one"

        [sequence]
        sweep_steps = 12
        return_to_start = false"#;

        let config: Config = toml::from_str(config_toml).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.motor.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.motor.baud_rate, 115200);
        assert_eq!(config.camera.photos_dir, "shots");
        assert_eq!(config.sequence.sweep_steps, 12);
        assert!(!config.sequence.return_to_start);
        // untouched sections keep their defaults
        assert_eq!(config.sequence.angle_wait_secs, 300);
        assert_eq!(config.motor.step_command, "step");
    }

    #[test]
    fn empty_config_is_complete() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.sequence.sweep_steps, 90);
        assert_eq!(config.motor.baud_rate, 9600);
        assert!(config.notifier.url.is_none());
    }
}
