//! Changes-Feed Follower
//!
//! A Rust client for CouchDB-style changes feeds - resumable, resilient
//! consumption of an append-only change log over long-polling HTTP.
//!
//! The follower turns a sequence of paginated long-poll requests into one
//! continuous, ordered event stream: per-change notifications, per-batch
//! notifications, sequence-position checkpoints, and terminal/error signals.
//! Watch a database forever with [`ChangesFeed::start`], or drain it once to
//! "caught up" with [`ChangesFeed::drain_to_tail`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use changes_follower::{Client, FeedEvent, FeedOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("http://localhost:5984");
//!     let feed = client.changes("orders");
//!
//!     // Resume from the beginning with document bodies attached
//!     feed.configure(
//!         FeedOptions::new()
//!             .start_position("0")
//!             .include_docs(true),
//!     )?;
//!
//!     let mut events = feed.start();
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             FeedEvent::Change(change) => println!("changed: {}", change.id),
//!             FeedEvent::Seq(position) => println!("checkpoint: {}", position),
//!             FeedEvent::Error(failure) => eprintln!("poll failed: {:?}", failure),
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! Transient failures (429, 5xx, network drops, undecodable bodies) are
//! retried on the same position; 4xx failures halt the feed after surfacing
//! an error event. The position only ever holds server-issued tokens, so a
//! [`FeedEvent::Seq`] checkpoint is always safe to persist and resume from.

mod client;
mod error;
mod events;
mod feed;
mod transport;
mod types;

pub use client::{Client, ClientBuilder};
pub use error::{ConfigError, FeedError, FeedFailure, InvalidHeaderError};
pub use events::{FeedEvent, Subscription};
pub use feed::{ChangesFeed, FeedOptions};
pub use transport::{HttpTransport, Transport};
pub use types::{ChangeRecord, ChangesPage, FeedPosition, RevisionRef};
