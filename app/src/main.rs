use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use camera_rig::config::Config;
use camera_rig::web::{self, AppState};
use camera_rig::{Rig, RigError};

const DEFAULT_CONFIG: &str = "rig.toml";

#[derive(Parser, Debug)]
#[command(version, about = "Rotating camera rig controller")]
struct Args {
    /// TOML config file; built-in defaults apply if it doesn't exist.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Listen port override.
    #[arg(short, long)]
    port: Option<u16>,
    /// Run without motor hardware; serial writes are logged instead.
    #[arg(long, default_value_t = false)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> error_stack::Result<(), RigError> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = Config::open_or_default(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let rig = Rig::from_config(&config, args.simulate);
    if rig.motor.is_simulated() {
        info!("motor link is simulated; no hardware will move");
    }
    match &config.notifier.url {
        Some(url) => info!("forwarding photos to {url}"),
        None => info!("no collaborator url configured, photos stay local"),
    }

    web::serve(AppState::new(config, rig)).await
}
