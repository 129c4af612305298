//! Client for signed filter updates replicated over Nostr relays.
//!
//! A [`DistributionClient`] subscribes to one replaceable document (kind +
//! topic tag) on every configured relay, authenticates each candidate, and
//! hands the consumer exactly the updates that are strictly newer than the one
//! it already has.
//!
//! ```no_run
//! use filtersync::{ClientConfig, DistributionClient, TopicFilter};
//!
//! # async fn demo() -> filtersync::Result<()> {
//! let mut client = DistributionClient::new(ClientConfig::new(vec![
//!     "wss://relay.damus.io".into(),
//!     "wss://nos.lol".into(),
//! ]))?;
//! client.start(TopicFilter::default(), |update| {
//!     println!("filters {} from {}", update.document.version, update.relay);
//! })?;
//! // ...
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod freshness;
pub mod payload;
pub mod relay;
pub mod verify;

pub use client::{ClientConfig, DistributionClient};
pub use codec::{RelayMessage, TopicFilter};
pub use error::{ClientError, Result};
pub use event::{Event, Tag};
pub use freshness::{AcceptedUpdate, Freshness, FreshnessTracker};
pub use payload::FilterDocument;
pub use relay::{LinkPhase, LinkSnapshot};
pub use verify::{Rejection, Verifier};
