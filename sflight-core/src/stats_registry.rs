use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::FlightStats;

/// Global registry for group statistics.
///
/// Groups built with a name register their [`FlightStats`] here, so counters
/// can be inspected from anywhere in the process without holding the group.
///
/// # Thread Safety
///
/// This registry is thread-safe and can be accessed from multiple threads concurrently.
///
/// # Examples
///
/// ```
/// use sflight_core::stats_registry;
///
/// if let Some(stats) = stats_registry::get("user_lookup") {
///     println!("Executions: {}", stats.executions());
///     println!("Joins: {}", stats.joins());
/// }
///
/// for name in stats_registry::list() {
///     println!("Group: {}", name);
/// }
/// ```
static STATS_REGISTRY: Lazy<RwLock<HashMap<String, Arc<FlightStats>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a group's statistics under a given name.
///
/// Called automatically when a group is built from a named
/// [`GroupConfig`](crate::GroupConfig). A later registration under the same
/// name replaces the earlier one.
pub fn register(name: &str, stats: Arc<FlightStats>) {
    let mut registry = STATS_REGISTRY.write();
    registry.insert(name.to_string(), stats);
}

/// Get a snapshot of the statistics registered under `name`.
///
/// The returned value is a copy; it does not change as the group keeps running.
///
/// # Examples
///
/// ```
/// use sflight_core::stats_registry;
///
/// if let Some(stats) = stats_registry::get("user_lookup") {
///     println!("Join rate: {:.2}%", stats.join_rate() * 100.0);
/// } else {
///     println!("Group not found");
/// }
/// ```
pub fn get(name: &str) -> Option<FlightStats> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).map(|stats| (**stats).clone())
}

/// Get the live statistics registered under `name`.
pub fn get_arc(name: &str) -> Option<Arc<FlightStats>> {
    let registry = STATS_REGISTRY.read();
    registry.get(name).cloned()
}

/// List all registered group names.
pub fn list() -> Vec<String> {
    let registry = STATS_REGISTRY.read();
    registry.keys().cloned().collect()
}

/// Remove the registration for `name`. Returns true if it existed.
///
/// The group itself keeps counting; it is only no longer reachable by name.
pub fn unregister(name: &str) -> bool {
    let mut registry = STATS_REGISTRY.write();
    registry.remove(name).is_some()
}

/// Clear all registered statistics.
///
/// This removes all entries from the registry but does not reset the statistics themselves.
///
/// ```
/// use sflight_core::stats_registry;
///
/// stats_registry::clear();
/// assert!(stats_registry::list().is_empty());
/// ```
pub fn clear() {
    let mut registry = STATS_REGISTRY.write();
    registry.clear();
}

/// Reset the counters registered under `name`.
///
/// # Returns
///
/// * `true` - If the group was found and reset
/// * `false` - If no group with that name is registered
pub fn reset(name: &str) -> bool {
    let registry = STATS_REGISTRY.read();
    if let Some(stats) = registry.get(name) {
        stats.reset();
        true
    } else {
        false
    }
}

/// Reset the counters of every registered group.
pub fn reset_all() {
    let registry = STATS_REGISTRY.read();
    for stats in registry.values() {
        stats.reset();
    }
}
