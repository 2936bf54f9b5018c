use camera::{CameraDevice, StillCamera};
use config::Config;
use motor::MotorLink;
use notifier::{HttpNotifier, Notifier};

mod error;

pub mod camera;
pub mod config;
pub mod motor;
pub mod notifier;
pub mod sequence;
pub mod state;
pub mod stream;
pub mod web;

pub use error::RigError;

/// The rig's devices: one motor link, one camera, one notifier. Single
/// global resources; the web layer serializes access behind a mutex.
pub struct Rig {
    pub motor: Box<dyn MotorLink>,
    pub camera: Box<dyn CameraDevice>,
    pub notifier: Box<dyn Notifier>,
}

impl Rig {
    /// Builds the devices the config describes, falling back to the
    /// simulated motor link when no hardware answers.
    pub fn from_config(config: &Config, force_simulated: bool) -> Self {
        Self {
            motor: motor::connect(&config.motor, force_simulated),
            camera: Box::new(StillCamera::new(&config.camera)),
            notifier: Box::new(HttpNotifier::new(&config.notifier)),
        }
    }
}
