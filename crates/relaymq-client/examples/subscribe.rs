//! Receive pushed messages over a persistent subscription, acknowledging
//! each one.
//!
//! Expects a broker at RELAYMQ_HOST (default http://localhost:8080).

use relaymq_client::{RelayClient, SubscriptionEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("RELAYMQ_HOST").unwrap_or_else(|_| "http://localhost:8080".into());
    let client = RelayClient::builder()
        .host(host)
        .project_id("demo")
        .build()?;

    let mut subscription = client.subscribe("consumer-1", "consumer-token", "greetings", 10)?;
    println!("subscribed to greetings, state {:?}", subscription.state());

    while let Some(event) = subscription.recv().await {
        match event {
            SubscriptionEvent::Message(message) => {
                println!("received {}: {}", message.message_id, message.content);
                subscription.acknowledge(&[message.message_id]).await?;
            }
            SubscriptionEvent::Error(err) => {
                eprintln!("subscription error: {err}");
            }
        }
    }
    println!("subscription closed");

    Ok(())
}
