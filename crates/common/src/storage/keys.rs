//! Storage key namespacing

/// Prefix shared by every key this crate writes
pub const NAMESPACE: &str = "superapp:";

/// Prefix `key` with the application namespace
///
/// Keys that already carry the namespace are returned unchanged.
pub fn namespaced(key: &str) -> String {
    if key.starts_with(NAMESPACE) {
        key.to_string()
    } else {
        format!("{NAMESPACE}{key}")
    }
}

/// Namespaced key scoped to one user
pub fn user_scoped(user_id: &str, key: &str) -> String {
    format!("{NAMESPACE}user:{user_id}:{key}")
}
