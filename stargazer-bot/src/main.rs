use std::sync::Arc;

use reqwest::{redirect, ClientBuilder};
use stargazer_core::{
    spawn_poller, AnnouncedStore, AppConfig, DiscordDirectory, GithubClient, MilestoneTracker,
    Notifier, Poller,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;
    let discord_token = config.discord_token()?.to_owned();

    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(5))
        .user_agent(config.github.user_agent.clone())
        .build()?;

    let source = GithubClient::new(client.clone(), config.github_api()?)
        .with_token(config.github.token.clone())
        .with_timeout(config.request_timeout());
    let directory = DiscordDirectory::new(client, config.discord_api()?, discord_token)
        .with_channel_names(config.discord.channel_names.clone())
        .with_timeout(config.request_timeout());

    let announced = load_announced_store(&config).await?;
    let tracker = MilestoneTracker::new(config.thresholds()?, announced);
    let repos = config.repos()?;
    info!(repos = repos.len(), interval = ?config.poll_config().interval, "starting stargazer");

    let poller = Poller::new(
        repos,
        Arc::new(source),
        tracker,
        Notifier::new(Arc::new(directory)),
    );
    let handle = spawn_poller(poller, config.poll_config());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    handle.stop().await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn load_announced_store(
    config: &AppConfig,
) -> Result<AnnouncedStore, Box<dyn std::error::Error>> {
    if config.milestones.persist_announced {
        let path = AppConfig::announced_store_path()?;
        Ok(AnnouncedStore::load_from(&path).await)
    } else {
        // restarts will announce already-passed milestones again
        Ok(AnnouncedStore::in_memory())
    }
}
