//! Round-robin selection over a target group's healthy members.
//!
//! The balancer remembers the member it served last instead of a bare
//! index. Members are visited in key order, so one joining or leaving the
//! healthy set never makes the rotation skip or repeat anyone else.

use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    last: Mutex<Option<String>>,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the member to serve next, given the keys of the current
    /// pool. `None` for an empty pool.
    pub fn next(&self, keys: &[&str]) -> Option<usize> {
        let mut last = self.last.lock().expect("balancer lock");
        let prev = last.as_deref();

        // Smallest key overall, and smallest key after the last one served.
        let mut first: Option<usize> = None;
        let mut after: Option<usize> = None;
        for (i, key) in keys.iter().enumerate() {
            if first.is_none_or(|f| *key < keys[f]) {
                first = Some(i);
            }
            if prev.is_some_and(|p| *key > p) && after.is_none_or(|a| *key < keys[a]) {
                after = Some(i);
            }
        }

        let idx = after.or(first)?;
        *last = Some(keys[idx].to_string());
        Some(idx)
    }

    /// Key of the member served last.
    pub fn last_served(&self) -> Option<String> {
        self.last.lock().expect("balancer lock").clone()
    }
}
