use std::fmt;

use error_stack::Context;

#[derive(Debug)]
pub enum RigError {
    ConfigError,
    MotorError,
    AckTimeout,
    CameraError,
    StreamError,
    NotifyError,
    AngleWaitTimeout,
    ServerError,
}

impl fmt::Display for RigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError => write!(f, "Error in loading config"),
            Self::MotorError => write!(f, "Error on the motor serial link"),
            Self::AckTimeout => write!(f, "Motor did not acknowledge in time"),
            Self::CameraError => write!(f, "Camera Error"),
            Self::StreamError => write!(f, "Error in the video stream"),
            Self::NotifyError => write!(f, "Error talking to the collaborator server"),
            Self::AngleWaitTimeout => write!(f, "No angle data arrived in time"),
            Self::ServerError => write!(f, "Error in the web server"),
        }
    }
}

impl Context for RigError {}
