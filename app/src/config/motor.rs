use std::time::Duration;

use serde::Deserialize;

/// Serial link to the motor controller. With no `port` set, a USB serial
/// adapter is auto-detected and `/dev/ttyS0` (the Pi UART) is the fallback.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MotorConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Pause between the writes of an angle set, giving the controller time
    /// to act on each value before the next arrives.
    pub write_delay_ms: u64,
    /// Literal token the controller writes back when a command completes.
    pub ack_token: String,
    /// Token that advances the rig by one sweep increment.
    pub step_command: String,
    /// Token that returns the rig to its start orientation.
    pub return_command: String,
}

impl MotorConfig {
    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            write_delay_ms: 2000,
            ack_token: "done".into(),
            step_command: "step".into(),
            return_command: "reset".into(),
        }
    }
}
