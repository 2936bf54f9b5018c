use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub photos_dir: String,
    /// Still capture tool. `libcamera-still` on older Pi OS releases.
    pub still_command: String,
    pub video_command: String,
    pub stream_width: u32,
    pub stream_height: u32,
    pub stream_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            photos_dir: "photos".into(),
            still_command: "rpicam-still".into(),
            video_command: "rpicam-vid".into(),
            stream_width: 640,
            stream_height: 480,
            stream_fps: 15,
        }
    }
}
