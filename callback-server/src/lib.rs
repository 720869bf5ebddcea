//! Generic UPnP callback server for receiving event notifications.
//!
//! This crate provides a lightweight HTTP server for handling GENA `NOTIFY`
//! requests. It has no knowledge of devices or services: it validates the
//! UPnP headers, acknowledges the request and forwards the subscription ID and
//! raw body to a channel.
//!
//! # Overview
//!
//! - [`CallbackServer`]: binds the first free port in a range and serves
//!   `NOTIFY` on any path.
//! - [`EventRouter`]: forwards every accepted notification to a channel.
//! - [`NotificationPayload`]: subscription ID, sequence number and raw XML.
//!
//! Responses follow GENA: `200 OK` for any `NOTIFY` with a `SID`, including
//! SIDs the consumer has never heard of; `412 Precondition Failed` when the
//! `SID` is missing or `NT`/`NTS` carry unexpected values; `405` for other
//! methods. Correlating SIDs with subscriptions is the consumer's job.
//!
//! # Example: Basic Usage
//!
//! ```no_run
//! use callback_server::{CallbackConfig, CallbackServer, NotificationPayload};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::CallbackServerError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
//!     let server = CallbackServer::start(CallbackConfig::default(), tx).await?;
//!
//!     println!("Callback server listening at: {}", server.base_url());
//!
//!     while let Some(notification) = rx.recv().await {
//!         println!(
//!             "SID {} SEQ {:?}: {} bytes",
//!             notification.subscription_id,
//!             notification.seq,
//!             notification.event_xml.len()
//!         );
//!     }
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod router;
pub mod server;

pub use error::{CallbackServerError, Result};
pub use router::{EventRouter, NotificationPayload};
pub use server::{CallbackConfig, CallbackServer};
