//! Async Rust client library for the Enterprise Application Access (EAA) API.
//!
//! Signs requests for both API generations, pages through list endpoints,
//! and continuously retrieves access and admin event logs without losing
//! or duplicating events across transient failures.
//!
//! # Modules
//!
//! - [`auth`]: Credentials, endpoint generations, and request signing.
//! - [`cancel`]: Cooperative stop requests and signal wiring.
//! - [`client`]: Authenticated HTTP wrapper for the EAA REST API.
//! - [`config`]: Layered CLI configuration (flags, env, config file).
//! - [`connectors`]: Connector listing.
//! - [`error`]: Typed error hierarchy (`EaaError`) and its retry class.
//! - [`event`]: Log event records and their ordering.
//! - [`eventlog`]: The event log poller.
//! - [`idp`]: Identity provider listing.
//! - [`output`]: Line-oriented event output.
//! - [`pagination`]: Forward-only pagination over list endpoints.
//! - [`retry`]: Capped exponential backoff.
//!
//! # Quick Start
//!
//! ```ignore
//! use eaactl::cancel::CancellationController;
//! use eaactl::client::{DEFAULT_REQUEST_TIMEOUT, EaaClient};
//! use eaactl::eventlog::{EventLogPoller, PollConfig};
//! use eaactl::output::OutputSink;
//!
//! let client = EaaClient::new(credentials, DEFAULT_REQUEST_TIMEOUT)?;
//! let cancel = CancellationController::new();
//! let mut sink = OutputSink::new(std::io::stdout(), ",");
//! let config = PollConfig { follow: true, ..PollConfig::default() };
//! let summary = EventLogPoller::new(&client, config).run(&mut sink, &cancel).await?;
//! ```

#![warn(missing_docs)]

pub mod auth;
pub mod cancel;
pub mod client;
pub mod config;
pub mod connectors;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod idp;
pub mod output;
pub mod pagination;
pub mod retry;
