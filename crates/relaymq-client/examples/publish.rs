//! Publish a handful of messages, then pull and acknowledge them.
//!
//! Expects a broker at RELAYMQ_HOST (default http://localhost:8080).

use relaymq_client::RelayClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let host = std::env::var("RELAYMQ_HOST").unwrap_or_else(|_| "http://localhost:8080".into());
    let client = RelayClient::builder()
        .host(host)
        .project_id("demo")
        .build()?;

    let producer = client.producer("producer-1", "producer-token");
    for i in 0..5 {
        let id = producer.publish("greetings", format!("hello #{i}")).await?;
        println!("published {id}");
    }

    let consumer = client.consumer("consumer-1", "consumer-token");
    loop {
        let messages = consumer.pull("greetings", Some(10), Some(1)).await?;
        if messages.is_empty() {
            break;
        }
        for message in &messages {
            println!("pulled {}: {}", message.message_id, message.content);
        }
        let ids: Vec<_> = messages.into_iter().map(|m| m.message_id).collect();
        consumer.acknowledge("greetings", &ids).await?;
    }

    Ok(())
}
