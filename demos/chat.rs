use std::sync::Arc;

use resilient_api_client::{
    ChatCompletionRequest, ChatMessage, ResilientApiClient, StaticToken,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut client = ResilientApiClient::from_env()?;
    if let Ok(token) = std::env::var("API_ID_TOKEN") {
        client = client.with_token_provider(Arc::new(StaticToken::new(token)));
    }

    if !client.check_connection().await {
        tracing::warn!(base_url = client.base_url(), "backend health check failed");
    }

    let history = client.load_chat_history().await;
    tracing::info!(chats = history.len(), "loaded chat history");

    let prompt = std::env::args().nth(1).unwrap_or_else(|| "Hello!".to_owned());
    let request = ChatCompletionRequest::new("default", [ChatMessage::user(prompt)])
        .with_max_tokens(512)
        .with_temperature(0.7);

    match client.chat(&request).await {
        Ok(reply) => println!("{}", reply.response),
        Err(err) => {
            tracing::error!(kind = %err.kind(), error = %err, "chat failed");
            eprintln!("{}", err.user_message());
        }
    }

    Ok(())
}
