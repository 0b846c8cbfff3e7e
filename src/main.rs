mod ado;
mod cli;
mod config;
mod credentials;
mod error;
mod model;
mod sync;
mod util;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use ado::client::AdoClient;
use ado::transport::ReqwestTransport;
use sync::SyncService;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON results, so logs go to stderr
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adosync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (identity, command) = cli::parse_args(&args)?;
    if command == cli::Command::Help {
        cli::print_help();
        return Ok(());
    }

    let config = config::load_config()?;
    let defaults = config.process_defaults(|key| std::env::var(key).ok());
    let creds = identity.resolve(&defaults)?;

    let transport = ReqwestTransport::with_timeout(config.timeout())?;
    let client = AdoClient::new(transport, config.retry_policy());
    let service = SyncService::new(client, config.sync_settings());
    tracing::debug!(
        org = %creds.organization_url,
        api_version = %service.settings().api.work_items,
        "resolved connection"
    );

    cli::run(&service, &creds, command).await
}
