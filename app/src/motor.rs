//! Serial link to the motor controller.
//!
//! Commands go out as newline-terminated decimal or keyword tokens; the
//! controller answers a completed move with a fixed acknowledgment token.
//! When no physical link opens at startup the rig runs on [`SimulatedLink`],
//! which logs intended writes and always acknowledges.

use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use error_stack::{Result, ResultExt};
use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::config::MotorConfig;
use crate::state::AngleSet;
use crate::RigError;

const DEFAULT_PORT: &str = "/dev/ttyS0";
const READ_CHUNK_TIMEOUT: Duration = Duration::from_millis(500);

pub trait MotorLink: Send {
    /// Writes each value sequentially with the configured inter-write
    /// delay. No acknowledgment is expected.
    fn send_angle_set(&mut self, angles: &AngleSet) -> Result<(), RigError>;

    /// Writes one command token (step, return-to-start).
    fn send_command(&mut self, token: &str) -> Result<(), RigError>;

    /// Writes one angle as a decimal token.
    fn send_angle(&mut self, angle: u16) -> Result<(), RigError>;

    /// Blocks until the acknowledgment token is seen or `timeout` elapses.
    /// `Ok(false)` on timeout; `Err` only on link failure.
    fn await_ack(&mut self, timeout: Duration) -> Result<bool, RigError>;

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Opens the configured or detected port, falling back to [`SimulatedLink`]
/// when nothing answers, so the rest of the rig never has to care which
/// kind of link it drives.
pub fn connect(config: &MotorConfig, force_simulated: bool) -> Box<dyn MotorLink> {
    if force_simulated {
        info!("motor link forced into simulated mode");
        return Box::new(SimulatedLink::new(config));
    }

    let port_name = config
        .port
        .clone()
        .or_else(detect_usb_port)
        .unwrap_or_else(|| DEFAULT_PORT.into());

    match SerialLink::open(&port_name, config) {
        Ok(link) => Box::new(link),
        Err(report) => {
            warn!("no motor controller on {port_name}, running simulated: {report}");
            Box::new(SimulatedLink::new(config))
        }
    }
}

fn detect_usb_port() -> Option<String> {
    let ports = serialport::available_ports().ok()?;
    ports
        .into_iter()
        .find(|p| matches!(p.port_type, serialport::SerialPortType::UsbPort(_)))
        .map(|p| p.port_name)
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
    config: MotorConfig,
}

impl SerialLink {
    pub fn open(port_name: &str, config: &MotorConfig) -> Result<Self, RigError> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_CHUNK_TIMEOUT)
            .open()
            .change_context(RigError::MotorError)
            .attach_printable_lazy(|| format!("couldn't open serial port {port_name}"))?;

        info!(
            "connected to motor controller on {port_name} at {} baud",
            config.baud_rate
        );

        Ok(Self {
            port,
            config: config.clone(),
        })
    }

    fn write_token(&mut self, token: &str) -> Result<(), RigError> {
        self.port
            .write_all(format!("{token}\n").as_bytes())
            .change_context(RigError::MotorError)
            .attach_printable_lazy(|| format!("serial write of {token:?} failed"))?;
        self.port.flush().change_context(RigError::MotorError)
    }
}

impl MotorLink for SerialLink {
    fn send_angle_set(&mut self, angles: &AngleSet) -> Result<(), RigError> {
        for (i, angle) in angles.iter().enumerate() {
            self.write_token(&angle.to_string())?;
            debug!("sent angle {} of 4: {angle}", i + 1);
            // give the controller time to act before the next value
            thread::sleep(self.config.write_delay());
        }
        Ok(())
    }

    fn send_command(&mut self, token: &str) -> Result<(), RigError> {
        self.write_token(token)
    }

    fn send_angle(&mut self, angle: u16) -> Result<(), RigError> {
        self.write_token(&angle.to_string())
    }

    fn await_ack(&mut self, timeout: Duration) -> Result<bool, RigError> {
        let deadline = Instant::now() + timeout;
        let mut seen = Vec::new();
        let mut buf = [0u8; 64];

        // each read blocks for at most the port timeout, so the loop wakes
        // often enough to honor the deadline without spinning
        while Instant::now() < deadline {
            match self.port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    seen.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&seen).contains(&self.config.ack_token) {
                        return Ok(true);
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => {
                    return Err(e)
                        .change_context(RigError::MotorError)
                        .attach_printable("serial read failed while waiting for acknowledgment")
                }
            }
        }

        Ok(false)
    }
}

/// No-hardware fallback: logs every intended write and reports success.
pub struct SimulatedLink {
    ack_token: String,
}

impl SimulatedLink {
    pub fn new(config: &MotorConfig) -> Self {
        Self {
            ack_token: config.ack_token.clone(),
        }
    }
}

impl MotorLink for SimulatedLink {
    fn send_angle_set(&mut self, angles: &AngleSet) -> Result<(), RigError> {
        info!("[simulated] angle set {angles}");
        Ok(())
    }

    fn send_command(&mut self, token: &str) -> Result<(), RigError> {
        info!("[simulated] command {token:?}");
        Ok(())
    }

    fn send_angle(&mut self, angle: u16) -> Result<(), RigError> {
        info!("[simulated] angle {angle}");
        Ok(())
    }

    fn await_ack(&mut self, _timeout: Duration) -> Result<bool, RigError> {
        debug!("[simulated] acknowledged with {:?}", self.ack_token);
        Ok(true)
    }

    fn is_simulated(&self) -> bool {
        true
    }
}
