//! redb table definitions for the webtier state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Every table shares this shape.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Provisioned resources keyed by `{kind}/{name}`.
pub const RESOURCES: JsonTable = TableDefinition::new("resources");

/// Target group members keyed by `{target_group}:{instance_id}`.
pub const MEMBERS: JsonTable = TableDefinition::new("members");

/// Fleet capacity snapshots keyed by `{fleet}`.
pub const FLEETS: JsonTable = TableDefinition::new("fleets");

/// Load metrics keyed by `{fleet}:{epoch}` with a zero-padded epoch.
pub const METRICS: JsonTable = TableDefinition::new("metrics");

/// Published stack outputs keyed by output name.
pub const OUTPUTS: JsonTable = TableDefinition::new("outputs");
