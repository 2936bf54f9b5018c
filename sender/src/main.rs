use std::error::Error;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};
use serde_json::json;

const DEFAULT_RIG_URL: &str = "http://192.168.0.170:5000";
const SEND_TIMEOUT_SECS: u64 = 10;
const PROBE_TIMEOUT_SECS: u64 = 5;

const MAX_ANGLE: u16 = 180;

/// Collaborator-side tool for the rotating camera rig.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Base URL of the rig (or of a photo receiver for test-photo).
    #[arg(short, long, default_value = DEFAULT_RIG_URL)]
    url: String,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send four per-axis target angles to the rig.
    Send {
        angle1: u16,
        angle2: u16,
        angle3: u16,
        angle4: u16,
    },
    /// Check that the rig answers its status endpoint.
    Probe,
    /// Post a synthetic photo to a receiver to exercise its API.
    TestPhoto,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
        .build()?;

    match args.cmd {
        Command::Send {
            angle1,
            angle2,
            angle3,
            angle4,
        } => {
            let angles = [angle1, angle2, angle3, angle4];
            for (i, angle) in angles.iter().enumerate() {
                if *angle > MAX_ANGLE {
                    return Err(format!(
                        "angle {} out of range (0-{MAX_ANGLE}): {angle}",
                        i + 1
                    )
                    .into());
                }
            }

            println!("sending {angles:?} to {}", args.url);
            let reply: serde_json::Value = client
                .post(format!("{}/api/receive_angles", args.url))
                .json(&json!({ "angles": angles }))
                .send()?
                .json()?;

            if reply["success"].as_bool().unwrap_or(false) {
                println!("ok: {}", reply["message"].as_str().unwrap_or("stored"));
            } else {
                return Err(format!(
                    "rig rejected the angles: {}",
                    reply["error"].as_str().unwrap_or("unknown error")
                )
                .into());
            }
        }
        Command::Probe => {
            let reply = client
                .get(format!("{}/api/get_status", args.url))
                .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
                .send()?;
            println!("{} answered HTTP {}", args.url, reply.status());
            println!("{}", reply.text()?);
        }
        Command::TestPhoto => {
            let payload = json!({
                "image": BASE64.encode(b"synthetic test image"),
                "timestamp": chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                "filename": "test_photo.jpg",
                "rotation_number": 0,
                "sender": "connection-test",
                "rotation_type": "test",
            });

            let reply = client
                .post(format!("{}/api/receive_photo", args.url))
                .json(&payload)
                .send()?;
            println!("HTTP {}: {}", reply.status(), reply.text()?);
        }
    }

    Ok(())
}
