//! Status projection — pod listing → `status.nodes`.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Pod;

/// Names of the listed pods, sorted.
///
/// Listing order is not stable across passes, so the persisted sequence
/// is sorted to keep the status stable for readers.
pub fn project_nodes(pods: &[Pod]) -> Vec<String> {
    let mut names: Vec<String> = pods.iter().filter_map(|p| p.metadata.name.clone()).collect();
    names.sort();
    names
}

/// Whether the observed node set differs from the stored one.
///
/// Compared as sets: a reordered listing of the same pods is not a change.
pub fn nodes_changed(stored: &[String], observed: &[String]) -> bool {
    let stored: BTreeSet<&str> = stored.iter().map(String::as_str).collect();
    let observed: BTreeSet<&str> = observed.iter().map(String::as_str).collect();
    stored != observed
}

/// Pod IP, if the pod has been assigned one.
pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}
