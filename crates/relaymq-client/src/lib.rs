//! RelayMQ client - publish, pull and push-subscribe against a hosted
//! pub/sub broker.
//!
//! The broker itself is a remote service reached over HTTP plus a
//! streaming socket; this crate is the reliability layer in front of it: a
//! retrying request executor with jittered exponential backoff, and a
//! subscription state machine managing a long-lived push connection with
//! credit-based flow control and bounded reconnection.
//!
//! # Examples
//!
//! ## Publish and pull
//!
//! ```ignore
//! use relaymq_client::RelayClient;
//!
//! let client = RelayClient::builder()
//!     .host("http://mq.example.com/v1/")
//!     .project_id("demo")
//!     .build()?;
//!
//! let producer = client.producer("producer-1", "token");
//! let id = producer.publish("orders", "order data").await?;
//!
//! let consumer = client.consumer("consumer-1", "token");
//! let messages = consumer.pull("orders", Some(10), Some(5)).await?;
//! consumer
//!     .acknowledge("orders", &messages.iter().map(|m| m.message_id.clone()).collect::<Vec<_>>())
//!     .await?;
//! ```
//!
//! ## Push subscription
//!
//! ```ignore
//! use relaymq_client::{RelayClient, SubscriptionEvent};
//!
//! let mut subscription = client.subscribe("consumer-1", "token", "orders", 10)?;
//! while let Some(event) = subscription.recv().await {
//!     match event {
//!         SubscriptionEvent::Message(message) => {
//!             subscription.acknowledge(&[message.message_id]).await?;
//!         }
//!         SubscriptionEvent::Error(err) => eprintln!("subscription error: {err}"),
//!     }
//! }
//! ```

pub mod client;
pub mod consumer;
pub mod error;
pub mod message;
pub mod producer;
pub mod rest;
pub mod retry;
pub mod subscription;

pub use client::{ClientBuilder, Credential, RelayClient};
pub use consumer::Consumer;
pub use error::{ClientError, Result};
pub use message::{Message, MessageId};
pub use producer::Producer;
pub use rest::RequestExecutor;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use subscription::{Subscription, SubscriptionEvent, SubscriptionState};
