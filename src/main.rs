use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rainbow_volunteer::{services::messages::MessageLogger, ClientState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rainbow volunteer client...");
    info!("Using backend {} ({})", config.api_base_url, config.environment);
    if config.api_token.is_none() {
        warn!("API_TOKEN is not set, requests will be anonymous");
    }

    let state = ClientState::new(config)?;

    // 把状态消息转成日志
    let logger = MessageLogger::spawn(&state.bus);

    match state.notifications.refresh().await {
        Ok(()) => {
            let snapshot = state.notifications.snapshot();
            info!(
                "Notifications: {} loaded, {} unread",
                snapshot.items.len(),
                snapshot.unread_count
            );
        }
        Err(e) => warn!("Failed to load notifications: {}", e),
    }

    match state.registrations.load_events(1).await {
        Ok(events) => info!("Events: {} loaded", events.len()),
        Err(e) => warn!("Failed to load events: {}", e),
    }

    match state.reactions.load_page(1).await {
        Ok(posts) => info!("Posts: {} loaded", posts.len()),
        Err(e) => warn!("Failed to load posts: {}", e),
    }

    let logged = logger.shutdown().await;
    info!("Session finished, {} status messages", logged);

    Ok(())
}
