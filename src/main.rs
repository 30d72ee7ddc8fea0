use std::env;

use tracing::info;

use minnow::{ChatConfig, ChatSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let login = env::var("TWITCH_LOGIN")?;
    let token = env::var("TWITCH_TOKEN")?;
    let channels: Vec<String> = env::var("TWITCH_CHANNELS")
        .map(|raw| {
            raw.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let config = ChatConfig::new(login, token, channels)?;
    let mut session = ChatSession::new(config);
    session.on_message(|msg| {
        info!(
            channel = msg.channel(),
            sender = msg.sender(),
            text = msg.text(),
            "message"
        );
        Ok(())
    });

    session.connect().await?;
    info!("connected; ctrl-c to quit");

    tokio::signal::ctrl_c().await?;
    session.stop().await;

    Ok(())
}
