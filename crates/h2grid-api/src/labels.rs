//! Label set shared by the workload, its pods, and the service selector.

use std::collections::BTreeMap;

/// Label key identifying the managed application.
pub const APP_LABEL: &str = "app";

/// Value of [`APP_LABEL`] on every object h2grid creates.
pub const APP_LABEL_VALUE: &str = "h2database";

/// Label key carrying the owning `H2Database` name.
pub const INSTANCE_LABEL: &str = "h2database_cr";

/// Labels selecting the resources that belong to the named database.
///
/// Derived from the name alone, so the service selector and the
/// workload's pod labels always agree.
pub fn labels_for(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_LABEL_VALUE.to_string()),
        (INSTANCE_LABEL.to_string(), name.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_scoped_by_name() {
        let a = labels_for("orders");
        let b = labels_for("billing");

        assert_eq!(a.get(APP_LABEL).map(String::as_str), Some("h2database"));
        assert_eq!(a.get(INSTANCE_LABEL).map(String::as_str), Some("orders"));
        assert_ne!(a, b);
        assert_eq!(a, labels_for("orders"));
    }
}
