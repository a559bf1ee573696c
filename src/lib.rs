//! Async HTTP client for the raccoon key-value store
//!
//! The store exposes each key as `/kv/{key}`: `GET` reads it (with an `etag`
//! version and optional `if-none-match` precondition), `PUT` overwrites it. On
//! top of those this crate builds a long-poll watch that calls you back every
//! time a key's version changes.
//!
//! # Features
//! - Point reads returning value and version
//! - Unconditional writes
//! - Cancellable long-poll watches with capped exponential backoff
//! - One pooled HTTP/1.1 + HTTP/2 connection pool shared by all clones
//! - Typed errors distinguishing protocol, status and transport failures
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use raccoon_kv_client::{Client, WatchContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), raccoon_kv_client::Error> {
//!     let client = Client::new("http://localhost:3000")?;
//!
//!     client.put("greeting", b"Hello, World!").await?;
//!
//!     let entry = client.get("greeting").await?;
//!     println!("{:?} at version {}", entry.value, entry.version);
//!
//!     let ctx = WatchContext::new();
//!     client
//!         .watch("greeting", &ctx, |value| println!("changed: {:?}", value))
//!         .await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod watch;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use types::*;
pub use watch::{Backoff, ConditionalFetch, WatchContext, WatchSession, WatchSettings};
