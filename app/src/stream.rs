//! Live MJPEG preview. The video tool writes an MJPEG byte stream to its
//! stdout; a reader thread splits it into JPEG frames and publishes the
//! latest one on a watch channel for any number of feed connections.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use error_stack::{Report, Result, ResultExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::CameraConfig;
use crate::RigError;

const SOI: [u8; 2] = [0xff, 0xd8];
const EOI: [u8; 2] = [0xff, 0xd9];

pub struct Streamer {
    child: Child,
    stop_tx: flume::Sender<()>,
    frames: watch::Receiver<Bytes>,
    reader: Option<JoinHandle<()>>,
}

impl Streamer {
    pub fn start(config: &CameraConfig) -> Result<Self, RigError> {
        let mut child = Command::new(&config.video_command)
            .args(["-t", "0", "--codec", "mjpeg", "-n", "-o", "-"])
            .args(["--width", &config.stream_width.to_string()])
            .args(["--height", &config.stream_height.to_string()])
            .args(["--framerate", &config.stream_fps.to_string()])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .change_context(RigError::StreamError)
            .attach_printable_lazy(|| {
                format!("couldn't start video tool {}", config.video_command)
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Report::new(RigError::StreamError).attach_printable("video tool has no stdout")
        })?;

        let (stop_tx, stop_rx) = flume::bounded(1);
        let (frame_tx, frames) = watch::channel(Bytes::new());
        let reader = thread::spawn(move || read_frames(stdout, frame_tx, stop_rx));

        info!(
            "video stream started, {}x{} at {} fps",
            config.stream_width, config.stream_height, config.stream_fps
        );

        Ok(Self {
            child,
            stop_tx,
            frames,
            reader: Some(reader),
        })
    }

    pub fn frames(&self) -> watch::Receiver<Bytes> {
        self.frames.clone()
    }

    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        info!("video stream stopped");
    }
}

fn read_frames(mut stdout: impl Read, frame_tx: watch::Sender<Bytes>, stop_rx: flume::Receiver<()>) {
    let mut pending = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        if stop_rx.try_recv().is_ok() {
            return;
        }
        match stdout.read(&mut buf) {
            Ok(0) => {
                debug!("video tool closed its stdout");
                return;
            }
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                for frame in split_frames(&mut pending) {
                    if frame_tx.send(frame).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("video stream read failed: {e}");
                return;
            }
        }
    }
}

/// Extracts every complete SOI..EOI frame, keeping a partial trailing
/// frame buffered for the next read.
fn split_frames(pending: &mut Vec<u8>) -> Vec<Bytes> {
    let mut frames = Vec::new();

    loop {
        let Some(start) = find_marker(pending, &SOI) else {
            // no frame start in the buffer; keep one byte in case a marker
            // got split across reads
            let keep_from = pending.len().saturating_sub(1);
            pending.drain(..keep_from);
            break;
        };
        let Some(end) = find_marker(&pending[start + 2..], &EOI).map(|i| start + 2 + i + 2) else {
            pending.drain(..start);
            break;
        };

        frames.push(Bytes::copy_from_slice(&pending[start..end]));
        pending.drain(..end);
    }

    frames
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|window| window == marker)
}
