//! Router synchronization from the state store.
//!
//! `TargetSync` reads target group members from the store and rebuilds
//! the router's per-group snapshots. Health monitors and the fleet
//! reconciler write the store; the router only ever sees what a sync
//! copied over.

use tracing::{debug, info};

use webtier_state::{MemberState, StateError, StateStore};

use crate::router::{Router, Target};

/// Bridges the state store to the router.
pub struct TargetSync {
    router: Router,
}

impl TargetSync {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Full rebuild of every group the listener forwards to.
    ///
    /// Groups held by the router that no rule references any more are
    /// removed.
    pub fn sync(&self, store: &StateStore) -> Result<SyncStats, StateError> {
        let mut stats = SyncStats::default();
        let wanted = self.router.rules().forward_targets();

        for group in &wanted {
            let members = store.list_members_for_group(group)?;
            let targets = members_to_targets(&members);

            stats.groups_synced += 1;
            stats.targets_total += targets.len() as u32;
            stats.healthy_total += targets.iter().filter(|t| t.health.is_routable()).count() as u32;

            self.router.update_group(group, targets);
        }

        for group in self.router.list_groups() {
            if !wanted.contains(&group) {
                self.router.remove_group(&group);
                stats.groups_removed += 1;
            }
        }

        info!(
            groups = stats.groups_synced,
            targets = stats.targets_total,
            healthy = stats.healthy_total,
            removed = stats.groups_removed,
            "router sync complete"
        );

        Ok(stats)
    }

    /// Event-driven: refresh one group after a membership or health change.
    pub fn on_members_changed(&self, target_group: &str, members: &[MemberState]) {
        self.router
            .update_group(target_group, members_to_targets(members));
        debug!(target_group, members = members.len(), "synced target group");
    }
}

/// Sync statistics.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub groups_synced: u32,
    pub targets_total: u32,
    pub healthy_total: u32,
    pub groups_removed: u32,
}

/// Convert member records to router targets. Every member is carried
/// over; the router decides routability from the health field.
fn members_to_targets(members: &[MemberState]) -> Vec<Target> {
    members
        .iter()
        .map(|m| Target {
            instance_id: m.id.clone(),
            address: m.address.clone(),
            health: m.health,
        })
        .collect()
}
