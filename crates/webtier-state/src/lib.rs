//! webtier-state: persisted state and the local provisioning backend.
//!
//! Backed by [redb](https://docs.rs/redb), the store keeps provisioned
//! resources, target group members with their health, fleet capacity
//! snapshots, load metrics, and published stack outputs.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{kind}/{name}`, `{target_group}:{instance_id}`,
//! `{fleet}:{epoch}`) enable prefix scans for related records.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. It implements
//! [`ProvisioningBackend`] by converging every write immediately.

pub mod backend;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use backend::ProvisioningBackend;
pub use error::{StateError, StateResult, StorageOp};
pub use store::{StateStore, epoch_millis};
pub use types::*;
