//! Client identity from the upgrade path

/// Path prefix clients connect under
pub const WS_PREFIX: &str = "/ws/";

/// `/ws/{namespace}/{name}` → `namespace:name`
///
/// A query string is ignored. Both segments must be non-empty and no
/// further segments are allowed.
pub fn client_identity(path: &str) -> Option<String> {
    let path = path.split('?').next().unwrap_or_default();
    let rest = path.strip_prefix(WS_PREFIX)?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    let mut segments = rest.split('/');
    let namespace = segments.next().filter(|s| !s.is_empty())?;
    let name = segments.next().filter(|s| !s.is_empty())?;
    if segments.next().is_some() {
        return None;
    }
    Some(format!("{namespace}:{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_path() {
        assert_eq!(
            client_identity("/ws/org.i2ec/air-quality-led").as_deref(),
            Some("org.i2ec:air-quality-led")
        );
        assert_eq!(client_identity("/ws/org.i2ec/lamp/").as_deref(), Some("org.i2ec:lamp"));
        assert_eq!(
            client_identity("/ws/org.i2ec/lamp?token=abc").as_deref(),
            Some("org.i2ec:lamp")
        );
    }

    #[test]
    fn test_rejected_paths() {
        assert_eq!(client_identity("/"), None);
        assert_eq!(client_identity("/ws/"), None);
        assert_eq!(client_identity("/ws/org.i2ec"), None);
        assert_eq!(client_identity("/ws/org.i2ec/"), None);
        assert_eq!(client_identity("/ws//lamp"), None);
        assert_eq!(client_identity("/ws/a/b/c"), None);
        assert_eq!(client_identity("/api/org.i2ec/lamp"), None);
    }
}
