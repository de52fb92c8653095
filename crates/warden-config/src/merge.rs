//! Layer merging.

/// Recursively deep-merge `overlay` into `base`.
///
/// - Tables merge recursively per-field.
/// - Scalars and arrays from the overlay **replace** the base value.
pub fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

/// Set the value at a dotted `path`, creating intermediate tables.
///
/// Does nothing if an intermediate segment exists and is not a table.
pub fn set_path(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        let toml::Value::Table(table) = current else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_string(), value);
            return;
        }
        current = table
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn tables_merge_and_scalars_replace() {
        let mut base = parse(
            r#"
            [security]
            approval_timeout_secs = 300
            [security.pin]
            max_failures = 5
            "#,
        );
        let overlay = parse(
            r#"
            [security.pin]
            max_failures = 3
            "#,
        );
        deep_merge(&mut base, &overlay);
        assert_eq!(base["security"]["approval_timeout_secs"].as_integer(), Some(300));
        assert_eq!(base["security"]["pin"]["max_failures"].as_integer(), Some(3));
    }

    #[test]
    fn arrays_replace() {
        let mut base = parse("allowed_env = [\"PATH\", \"HOME\"]");
        deep_merge(&mut base, &parse("allowed_env = [\"PATH\"]"));
        assert_eq!(base["allowed_env"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn set_path_creates_tables() {
        let mut root = toml::Value::Table(toml::map::Map::new());
        set_path(&mut root, "security.pin.credential", "x".into());
        assert_eq!(root["security"]["pin"]["credential"].as_str(), Some("x"));
    }
}
