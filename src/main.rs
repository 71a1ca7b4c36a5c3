use clap::Parser;

use zen_watcher::telemetry::{self, LogFormat};
use zen_watcher::Result;

/// Kubernetes-resident observation aggregation pipeline.
#[derive(Parser, Debug)]
#[command(name = "zen-watcher", version, about)]
struct Opts {
    /// Override the autodetected log format (text, json).
    #[arg(long, env = "ZEN_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    let log_format = match opts.log_format.as_deref() {
        Some("json") => LogFormat::Json,
        Some("text") => LogFormat::Text,
        _ => LogFormat::from_env(),
    };
    telemetry::init(log_format);

    zen_watcher::run::execute().await
}
