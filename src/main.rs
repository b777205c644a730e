use clap::Parser;
use sshbot::app::App;
use sshbot::utils::paths::resolve_config_path;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sshbot", version, about = "Run allow-listed SSH actions from a Telegram chat")]
struct Args {
    /// Path to the JSON config file (defaults to $SSHBOT_CONFIG or ./config.json)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = resolve_config_path(args.config.as_deref());
    let app = match App::initialize(&config_path) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("sshbot: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = app.run().await {
        eprintln!("sshbot: {}", err);
        std::process::exit(1);
    }
}
