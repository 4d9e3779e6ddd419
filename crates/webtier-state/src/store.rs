//! StateStore: redb-backed state persistence for webtier.
//!
//! Provides typed CRUD operations over resources, target group members,
//! fleet snapshots, metrics, and outputs. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult, StorageOp};
use crate::tables::*;
use crate::types::*;

/// Map a redb error into `StateError::Storage` for the given step.
macro_rules! storage {
    ($op:ident) => {
        |e| StateError::Storage {
            op: StorageOp::$op,
            message: e.to_string(),
        }
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(storage!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(storage!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(storage!(Begin))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [RESOURCES, MEMBERS, FLEETS, METRICS, OUTPUTS] {
            txn.open_table(table).map_err(storage!(OpenTable))?;
        }
        txn.commit().map_err(storage!(Commit))?;
        Ok(())
    }

    // ── Generic JSON helpers ───────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(|source| StateError::Encode {
            key: key.to_string(),
            source,
        })?;
        let txn = self.db.begin_write().map_err(storage!(Begin))?;
        {
            let mut t = txn.open_table(table).map_err(storage!(OpenTable))?;
            t.insert(key, value.as_slice()).map_err(storage!(Write))?;
        }
        txn.commit().map_err(storage!(Commit))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(storage!(Begin))?;
        let t = txn.open_table(table).map_err(storage!(OpenTable))?;
        match t.get(key).map_err(storage!(Read))? {
            Some(guard) => Ok(Some(decode(key, guard.value())?)),
            None => Ok(None),
        }
    }

    /// All values whose key starts with `prefix`, in key order.
    fn list_json<T: DeserializeOwned>(&self, table: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(storage!(Begin))?;
        let t = txn.open_table(table).map_err(storage!(OpenTable))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(storage!(Read))? {
            let (key, value) = entry.map_err(storage!(Read))?;
            if key.value().starts_with(prefix) {
                results.push(decode(key.value(), value.value())?);
            }
        }
        Ok(results)
    }

    fn delete_key(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(storage!(Begin))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(storage!(OpenTable))?;
            existed = t.remove(key).map_err(storage!(Write))?.is_some();
        }
        txn.commit().map_err(storage!(Commit))?;
        Ok(existed)
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Converge a resource to `spec`.
    ///
    /// Writing an identical spec is a no-op. Immutable kinds refuse a
    /// changed spec with `ReplacementRequired`. The local backend has
    /// nothing to wait for, so every successful write is `Active`.
    pub fn converge_resource(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &serde_json::Value,
    ) -> StateResult<ResourceHandle> {
        let handle = ResourceHandle::new(kind, name);
        let now = epoch_millis();

        let record = match self.get_resource(&handle)? {
            Some(existing) if existing.spec == *spec => {
                debug!(%handle, "resource already converged");
                return Ok(handle);
            }
            Some(_) if kind.is_immutable() => {
                warn!(%handle, "immutable resource spec changed");
                return Err(StateError::ReplacementRequired {
                    handle: handle.to_string(),
                });
            }
            Some(mut existing) => {
                existing.spec = spec.clone();
                existing.status = ResourceStatus::Active;
                existing.updated_at = now;
                existing
            }
            None => ResourceRecord {
                handle: handle.clone(),
                kind,
                name: name.to_string(),
                spec: spec.clone(),
                status: ResourceStatus::Active,
                attributes: default_attributes(kind, name),
                created_at: now,
                updated_at: now,
            },
        };

        self.put_json(RESOURCES, handle.as_str(), &record)?;
        info!(%handle, "resource converged");
        Ok(handle)
    }

    /// Get a resource by handle.
    pub fn get_resource(&self, handle: &ResourceHandle) -> StateResult<Option<ResourceRecord>> {
        self.get_json(RESOURCES, handle.as_str())
    }

    /// List all resources.
    pub fn list_resources(&self) -> StateResult<Vec<ResourceRecord>> {
        self.list_json(RESOURCES, "")
    }

    /// Overwrite the status of a resource (used by external convergence drivers).
    pub fn set_resource_status(
        &self,
        handle: &ResourceHandle,
        status: ResourceStatus,
    ) -> StateResult<()> {
        let mut record = self
            .get_resource(handle)?
            .ok_or_else(|| StateError::NotFound(handle.to_string()))?;
        record.status = status;
        record.updated_at = epoch_millis();
        self.put_json(RESOURCES, handle.as_str(), &record)
    }

    /// Delete a resource by handle. Returns true if it existed.
    pub fn delete_resource(&self, handle: &ResourceHandle) -> StateResult<bool> {
        self.delete_key(RESOURCES, handle.as_str())
    }

    // ── Members ────────────────────────────────────────────────────

    /// Register or overwrite a target group member.
    pub fn put_member(&self, member: &MemberState) -> StateResult<()> {
        self.put_json(MEMBERS, &member.table_key(), member)?;
        debug!(
            target_group = %member.target_group,
            instance = %member.id,
            health = ?member.health,
            "member stored"
        );
        Ok(())
    }

    /// Get a member by target group and instance ID.
    pub fn get_member(&self, target_group: &str, instance_id: &str) -> StateResult<Option<MemberState>> {
        self.get_json(MEMBERS, &member_key(target_group, instance_id))
    }

    /// List all members of a target group.
    pub fn list_members_for_group(&self, target_group: &str) -> StateResult<Vec<MemberState>> {
        self.list_json(MEMBERS, &format!("{target_group}:"))
    }

    /// Update only the health of a member.
    ///
    /// Draining is terminal: once a member drains, later health results are
    /// ignored. Returns the stored member, or `None` if it is not registered.
    ///
    /// The read and the write share one write transaction, so a concurrent
    /// drain or deregistration is never overwritten by a stale result.
    pub fn set_member_health(
        &self,
        target_group: &str,
        instance_id: &str,
        health: TargetHealth,
    ) -> StateResult<Option<MemberState>> {
        let key = member_key(target_group, instance_id);
        let txn = self.db.begin_write().map_err(storage!(Begin))?;
        let updated = {
            let mut t = txn.open_table(MEMBERS).map_err(storage!(OpenTable))?;
            let current: Option<MemberState> = match t.get(key.as_str()).map_err(storage!(Read))? {
                Some(guard) => Some(decode(&key, guard.value())?),
                None => None,
            };
            let Some(mut member) = current else {
                return Ok(None);
            };
            if member.health == health {
                return Ok(Some(member));
            }
            if member.health == TargetHealth::Draining {
                debug!(%target_group, %instance_id, ?health, "ignoring health change of draining member");
                return Ok(Some(member));
            }

            let now = epoch_millis();
            member.health = health;
            member.updated_at = now;
            if health == TargetHealth::Draining {
                member.drain_started_at = Some(now);
            }
            let value = serde_json::to_vec(&member).map_err(|source| StateError::Encode {
                key: key.clone(),
                source,
            })?;
            t.insert(key.as_str(), value.as_slice()).map_err(storage!(Write))?;
            member
        };
        txn.commit().map_err(storage!(Commit))?;
        debug!(%target_group, %instance_id, ?health, "member health updated");
        Ok(Some(updated))
    }

    /// Deregister a member. Returns true if it existed.
    pub fn delete_member(&self, target_group: &str, instance_id: &str) -> StateResult<bool> {
        let existed = self.delete_key(MEMBERS, &member_key(target_group, instance_id))?;
        debug!(%target_group, %instance_id, existed, "member deregistered");
        Ok(existed)
    }

    // ── Fleets ─────────────────────────────────────────────────────

    /// Atomically replace a fleet snapshot.
    pub fn put_fleet_state(&self, state: &FleetState) -> StateResult<()> {
        self.put_json(FLEETS, &state.fleet, state)
    }

    /// Get the latest fleet snapshot.
    pub fn get_fleet_state(&self, fleet: &str) -> StateResult<Option<FleetState>> {
        self.get_json(FLEETS, fleet)
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Insert a metrics snapshot.
    pub fn put_metrics(&self, snapshot: &MetricsSnapshot) -> StateResult<()> {
        self.put_json(METRICS, &snapshot.table_key(), snapshot)
    }

    /// Most recent metrics snapshots for a fleet, newest first.
    pub fn list_metrics_for_fleet(&self, fleet: &str, limit: usize) -> StateResult<Vec<MetricsSnapshot>> {
        let (lo, hi) = metrics_bounds(fleet);
        let txn = self.db.begin_read().map_err(storage!(Begin))?;
        let t = txn.open_table(METRICS).map_err(storage!(OpenTable))?;
        let range = t.range(lo.as_str()..hi.as_str()).map_err(storage!(Read))?;
        let mut results = Vec::new();
        for entry in range.rev().take(limit) {
            let (key, value) = entry.map_err(storage!(Read))?;
            results.push(decode(key.value(), value.value())?);
        }
        Ok(results)
    }

    /// The newest metrics snapshot for a fleet.
    pub fn latest_metrics(&self, fleet: &str) -> StateResult<Option<MetricsSnapshot>> {
        let (lo, hi) = metrics_bounds(fleet);
        let txn = self.db.begin_read().map_err(storage!(Begin))?;
        let t = txn.open_table(METRICS).map_err(storage!(OpenTable))?;
        let mut range = t.range(lo.as_str()..hi.as_str()).map_err(storage!(Read))?;
        match range.next_back() {
            Some(entry) => {
                let (key, value) = entry.map_err(storage!(Read))?;
                Ok(Some(decode(key.value(), value.value())?))
            }
            None => Ok(None),
        }
    }

    /// Drop all but the newest `keep` snapshots of a fleet. Returns the
    /// number of rows removed.
    pub fn prune_metrics(&self, fleet: &str, keep: usize) -> StateResult<usize> {
        let (lo, hi) = metrics_bounds(fleet);
        let txn = self.db.begin_write().map_err(storage!(Begin))?;
        let removed = {
            let mut t = txn.open_table(METRICS).map_err(storage!(OpenTable))?;
            let mut keys = Vec::new();
            for entry in t.range(lo.as_str()..hi.as_str()).map_err(storage!(Read))? {
                let (key, _) = entry.map_err(storage!(Read))?;
                keys.push(key.value().to_string());
            }
            let stale = keys.len().saturating_sub(keep);
            for key in &keys[..stale] {
                t.remove(key.as_str()).map_err(storage!(Write))?;
            }
            stale
        };
        txn.commit().map_err(storage!(Commit))?;
        if removed > 0 {
            debug!(%fleet, removed, keep, "pruned metrics snapshots");
        }
        Ok(removed)
    }

    // ── Outputs ────────────────────────────────────────────────────

    /// Publish (or overwrite) a stack output.
    pub fn put_output(&self, key: &str, value: &str) -> StateResult<StackOutput> {
        let output = StackOutput {
            key: key.to_string(),
            value: value.to_string(),
            published_at: epoch_millis(),
        };
        self.put_json(OUTPUTS, key, &output)?;
        Ok(output)
    }

    /// Get a published output.
    pub fn get_output(&self, key: &str) -> StateResult<Option<StackOutput>> {
        self.get_json(OUTPUTS, key)
    }

    /// List all published outputs.
    pub fn list_outputs(&self) -> StateResult<Vec<StackOutput>> {
        self.list_json(OUTPUTS, "")
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|source| StateError::Decode {
        key: key.to_string(),
        source,
    })
}

/// Key range covering every snapshot of `fleet` (`;` sorts right after `:`).
fn metrics_bounds(fleet: &str) -> (String, String) {
    (format!("{fleet}:"), format!("{fleet};"))
}

/// Attributes the local backend assigns at creation time.
fn default_attributes(kind: ResourceKind, name: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    if kind == ResourceKind::LoadBalancer {
        attrs.insert("dns_name".to_string(), format!("{name}.elb.localhost"));
    }
    attrs
}

/// Current time as unix milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_member(target_group: &str, id: &str, health: TargetHealth) -> MemberState {
        MemberState {
            id: id.to_string(),
            fleet: "asg".to_string(),
            target_group: target_group.to_string(),
            address: "10.0.1.10:3000".to_string(),
            health,
            bootstrap_script: None,
            launched_at: 1000,
            drain_started_at: None,
            updated_at: 1000,
        }
    }

    fn test_snapshot(epoch: u64, rate: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            fleet: "asg".to_string(),
            epoch,
            window_secs: 60.0,
            request_count: rate as u64,
            request_rate_per_minute: rate,
            average_cpu_percent: 40.0,
            healthy_instances: 1,
        }
    }

    // ── Resources ──────────────────────────────────────────────────

    #[test]
    fn converge_creates_active_resource() {
        let store = StateStore::open_in_memory().unwrap();
        let handle = store
            .converge_resource(ResourceKind::TargetGroup, "web", &json!({"port": 3000}))
            .unwrap();

        let record = store.get_resource(&handle).unwrap().unwrap();
        assert_eq!(record.status, ResourceStatus::Active);
        assert_eq!(record.name, "web");
    }

    #[test]
    fn converge_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        let spec = json!({"port": 80});
        let a = store.converge_resource(ResourceKind::Listener, "l", &spec).unwrap();
        let created = store.get_resource(&a).unwrap().unwrap().updated_at;
        let b = store.converge_resource(ResourceKind::Listener, "l", &spec).unwrap();

        assert_eq!(a, b);
        assert_eq!(store.get_resource(&b).unwrap().unwrap().updated_at, created);
        assert_eq!(store.list_resources().unwrap().len(), 1);
    }

    #[test]
    fn converge_updates_mutable_resource() {
        let store = StateStore::open_in_memory().unwrap();
        let h = store
            .converge_resource(ResourceKind::Listener, "l", &json!({"port": 80}))
            .unwrap();
        store
            .converge_resource(ResourceKind::Listener, "l", &json!({"port": 8080}))
            .unwrap();
        assert_eq!(store.get_resource(&h).unwrap().unwrap().spec, json!({"port": 8080}));
    }

    #[test]
    fn network_change_requires_replacement() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .converge_resource(ResourceKind::Network, "vpc", &json!({"nat": 1}))
            .unwrap();
        let err = store
            .converge_resource(ResourceKind::Network, "vpc", &json!({"nat": 2}))
            .unwrap_err();
        assert!(err.is_convergence());
    }

    #[test]
    fn load_balancer_gets_dns_name() {
        let store = StateStore::open_in_memory().unwrap();
        let h = store
            .converge_resource(ResourceKind::LoadBalancer, "alb", &json!({}))
            .unwrap();
        let record = store.get_resource(&h).unwrap().unwrap();
        assert_eq!(record.attributes["dns_name"], "alb.elb.localhost");
    }

    #[test]
    fn set_status_on_missing_resource_fails() {
        let store = StateStore::open_in_memory().unwrap();
        let h = ResourceHandle::new(ResourceKind::Fleet, "nope");
        assert!(matches!(
            store.set_resource_status(&h, ResourceStatus::Active),
            Err(StateError::NotFound(_))
        ));
    }

    // ── Members ────────────────────────────────────────────────────

    #[test]
    fn members_scoped_by_group() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_member(&test_member("web", "i-1", TargetHealth::Initial)).unwrap();
        store.put_member(&test_member("web", "i-2", TargetHealth::Healthy)).unwrap();
        store.put_member(&test_member("api", "i-3", TargetHealth::Healthy)).unwrap();

        assert_eq!(store.list_members_for_group("web").unwrap().len(), 2);
        assert_eq!(store.list_members_for_group("api").unwrap().len(), 1);
    }

    #[test]
    fn set_member_health_updates_and_stamps_drain() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_member(&test_member("web", "i-1", TargetHealth::Healthy)).unwrap();

        let m = store
            .set_member_health("web", "i-1", TargetHealth::Draining)
            .unwrap()
            .unwrap();
        assert_eq!(m.health, TargetHealth::Draining);
        assert!(m.drain_started_at.is_some());
    }

    #[test]
    fn draining_member_ignores_later_health() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_member(&test_member("web", "i-1", TargetHealth::Draining)).unwrap();

        let m = store
            .set_member_health("web", "i-1", TargetHealth::Healthy)
            .unwrap()
            .unwrap();
        assert_eq!(m.health, TargetHealth::Draining);
    }

    #[test]
    fn health_writes_never_undo_drain_or_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let mut reverted = 0;
        let mut resurrected = 0;

        for round in 0..300 {
            let id = format!("i-{round}");
            store.put_member(&test_member("web", &id, TargetHealth::Healthy)).unwrap();

            let flipper = {
                let store = store.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for n in 0..20 {
                        let health = if n % 2 == 0 {
                            TargetHealth::Unhealthy
                        } else {
                            TargetHealth::Healthy
                        };
                        store.set_member_health("web", &id, health).unwrap();
                    }
                })
            };

            store.set_member_health("web", &id, TargetHealth::Draining).unwrap();
            if store
                .get_member("web", &id)
                .unwrap()
                .is_some_and(|m| m.health != TargetHealth::Draining)
            {
                reverted += 1;
            }

            store.delete_member("web", &id).unwrap();
            flipper.join().unwrap();
            if store.get_member("web", &id).unwrap().is_some() {
                resurrected += 1;
            }
        }

        assert_eq!((reverted, resurrected), (0, 0));
    }

    #[test]
    fn set_health_on_missing_member_is_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store
            .set_member_health("web", "ghost", TargetHealth::Healthy)
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_member_reports_existence() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_member(&test_member("web", "i-1", TargetHealth::Healthy)).unwrap();
        assert!(store.delete_member("web", "i-1").unwrap());
        assert!(!store.delete_member("web", "i-1").unwrap());
    }

    // ── Fleets, metrics, outputs ───────────────────────────────────

    #[test]
    fn fleet_state_replaced_atomically() {
        let store = StateStore::open_in_memory().unwrap();
        let mut state = FleetState::new("asg", 1, 3);
        store.put_fleet_state(&state).unwrap();

        state.set_desired(3);
        store.put_fleet_state(&state).unwrap();
        assert_eq!(store.get_fleet_state("asg").unwrap().unwrap().desired_capacity, 3);
    }

    #[test]
    fn metrics_listed_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        for (epoch, rate) in [(1000, 10.0), (3000, 30.0), (2000, 20.0)] {
            store.put_metrics(&test_snapshot(epoch, rate)).unwrap();
        }

        let latest = store.latest_metrics("asg").unwrap().unwrap();
        assert_eq!(latest.epoch, 3000);

        let two = store.list_metrics_for_fleet("asg", 2).unwrap();
        assert_eq!(two.iter().map(|s| s.epoch).collect::<Vec<_>>(), vec![3000, 2000]);
    }

    #[test]
    fn latest_metrics_scoped_to_fleet() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_metrics(&test_snapshot(1000, 10.0)).unwrap();
        let mut other = test_snapshot(9000, 90.0);
        other.fleet = "asg2".to_string();
        store.put_metrics(&other).unwrap();

        assert_eq!(store.latest_metrics("asg").unwrap().unwrap().epoch, 1000);
        assert_eq!(store.latest_metrics("asg2").unwrap().unwrap().epoch, 9000);
        assert!(store.latest_metrics("as").unwrap().is_none());
    }

    #[test]
    fn prune_keeps_newest_snapshots() {
        let store = StateStore::open_in_memory().unwrap();
        for epoch in 1..=10u64 {
            store.put_metrics(&test_snapshot(epoch * 1000, epoch as f64)).unwrap();
        }
        let mut other = test_snapshot(500, 1.0);
        other.fleet = "api".to_string();
        store.put_metrics(&other).unwrap();

        assert_eq!(store.prune_metrics("asg", 3).unwrap(), 7);
        let kept = store.list_metrics_for_fleet("asg", 100).unwrap();
        assert_eq!(
            kept.iter().map(|s| s.epoch).collect::<Vec<_>>(),
            vec![10_000, 9000, 8000]
        );
        assert_eq!(store.latest_metrics("asg").unwrap().unwrap().epoch, 10_000);
        assert!(store.latest_metrics("api").unwrap().is_some());

        assert_eq!(store.prune_metrics("asg", 3).unwrap(), 0);
    }

    #[test]
    fn outputs_put_and_list() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_output("albDNS", "alb.elb.localhost").unwrap();
        assert_eq!(
            store.get_output("albDNS").unwrap().unwrap().value,
            "alb.elb.localhost"
        );
        assert_eq!(store.list_outputs().unwrap().len(), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_fleet_state(&FleetState::new("asg", 1, 3)).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_fleet_state("asg").unwrap().is_some());
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_resources().unwrap().is_empty());
        assert!(store.list_members_for_group("any").unwrap().is_empty());
        assert!(store.latest_metrics("any").unwrap().is_none());
        assert!(store.list_outputs().unwrap().is_empty());
        assert!(!store.delete_member("any", "nope").unwrap());
    }
}
