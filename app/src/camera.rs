use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use error_stack::{Report, Result, ResultExt};
use tracing::{debug, info};

use crate::config::CameraConfig;
use crate::RigError;

pub trait CameraDevice: Send {
    /// Idempotent. Makes the device ready for still capture.
    fn initialize(&mut self) -> Result<(), RigError>;

    /// Captures one still into the photos directory, returning the saved
    /// path.
    fn capture(&mut self, name: &str) -> Result<PathBuf, RigError>;

    /// Idempotent; safe to call when not initialized.
    fn release(&mut self);

    fn is_initialized(&self) -> bool;
}

/// Still capture through the Pi camera stack's CLI tool. There is no
/// mature `picamera2` equivalent crate; `rpicam-still` is the supported
/// capture route and keeps the device free between shots.
pub struct StillCamera {
    config: CameraConfig,
    initialized: bool,
}

impl StillCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            initialized: false,
        }
    }
}

impl CameraDevice for StillCamera {
    fn initialize(&mut self) -> Result<(), RigError> {
        if self.initialized {
            return Ok(());
        }

        fs::create_dir_all(&self.config.photos_dir)
            .change_context(RigError::CameraError)
            .attach_printable_lazy(|| {
                format!("couldn't create photos directory {}", self.config.photos_dir)
            })?;

        self.initialized = true;
        info!(
            "camera ready, {}x{} stills into {}",
            self.config.width, self.config.height, self.config.photos_dir
        );
        Ok(())
    }

    fn capture(&mut self, name: &str) -> Result<PathBuf, RigError> {
        self.initialize()?;

        let path = Path::new(&self.config.photos_dir).join(name);
        let status = Command::new(&self.config.still_command)
            .arg("-o")
            .arg(&path)
            .args(["--width", &self.config.width.to_string()])
            .args(["--height", &self.config.height.to_string()])
            .args(["-n", "-t", "1"])
            .status()
            .change_context(RigError::CameraError)
            .attach_printable_lazy(|| {
                format!("couldn't run capture tool {}", self.config.still_command)
            })?;

        if !status.success() {
            return Err(Report::new(RigError::CameraError)
                .attach_printable(format!("{} exited with {status}", self.config.still_command)));
        }
        if !path.is_file() {
            return Err(Report::new(RigError::CameraError)
                .attach_printable(format!("capture tool wrote no file at {}", path.display())));
        }

        debug!("photo saved: {}", path.display());
        Ok(path)
    }

    fn release(&mut self) {
        if self.initialized {
            info!("camera released");
        }
        self.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

pub fn sweep_photo_name(step: u32) -> String {
    format!("rotation_{step:03}.jpg")
}

pub fn angle_photo_name(axis: usize, angle: u16) -> String {
    format!("axis{}_{angle:03}.jpg", axis + 1)
}
