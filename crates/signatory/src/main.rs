use anyhow::{Context, Result};
use clap::Parser;
use openid_signatory::{AppState, MemoryStore, run};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    #[clap(long, env = "PROVIDER_HOST", default_value = "127.0.0.1")]
    host: String,
    #[clap(long, env = "PROVIDER_PORT", default_value = "3000")]
    port: u16,
    /// Tracing filter directives, e.g. `openid_signatory=debug`.
    #[clap(long, env = "RUST_LOG", default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_filter)
        .with_context(|| format!("invalid log filter `{}`", args.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let state = AppState::new(MemoryStore::new());
    run(args.host, args.port, state).await
}
