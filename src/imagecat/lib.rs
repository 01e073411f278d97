//! # Imagecat Architecture
//!
//! Imagecat is the **listing, consistency and access-projection engine** of a
//! collaborative image-annotation catalog. A root image is uploaded once,
//! split into addressable planes (channel, z, time), and bound into projects
//! as project instances. The engine answers four questions about that
//! hierarchy:
//!
//! 1. **Listing**: which instances or root images match a caller's filters,
//!    sorted and paged, with blind-project names redacted ([`query`]).
//! 2. **Consistency**: when a root image's calibration changes, which
//!    instances follow ([`commands::propagate`]).
//! 3. **Reference planes**: which plane represents a multi-dimensional image
//!    ([`reference`]).
//! 4. **Deletion**: may this root image or plane go, and what goes with it
//!    ([`commands::delete`]).
//!
//! ## The Three-Layer Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI (main.rs, args.rs)                                     │
//! │  - Parses arguments, prints messages and JSON data          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - Resolves the caller, demarcates transactions             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs, query/, reference.rs)         │
//! │  - Business logic over any Executor and Permissions         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - Executor / Store traits, SqliteStore                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! From `api.rs` inward nothing writes to stdout or stderr; logging goes
//! through `tracing` and it is up to the client to install a subscriber.
//!
//! ## Collaborators
//!
//! Permission evaluation and caller identity are not decided here. Commands
//! ask [`access::Permissions`] and [`access::Identity`] and act on the answers;
//! [`access::Acl`] is a membership-table implementation good enough for the
//! CLI and tests.
//!
//! ## Module Overview
//!
//! - [`api`]: The facade, entry point for all operations
//! - [`commands`]: Business logic per operation family
//! - [`query`]: Filter, sort and page compilation, redaction, row projection
//! - [`reference`]: Reference plane resolution
//! - [`store`]: Executor traits and the SQLite store
//! - [`access`]: Permission and identity collaborators
//! - [`model`]: Entity types
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod access;
pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod reference;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
