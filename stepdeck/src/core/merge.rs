//! Recursive merge for structured (YAML) configuration documents.

use serde_yaml::Value;

/// Merge `patch` into `base`, returning the combined document.
///
/// Mappings merge key by key and sequences merge index by index, recursing
/// into each pair; entries past the end of the patch are kept. Any other
/// pairing (scalars, mismatched kinds) takes the patch value. Existing key
/// order is preserved and new keys are appended.
pub fn deep_merge(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Mapping(mut base), Value::Mapping(patch)) => {
            for (key, value) in patch {
                if let Some(existing) = base.get_mut(&key) {
                    let current = std::mem::replace(existing, Value::Null);
                    *existing = deep_merge(current, value);
                    continue;
                }
                base.insert(key, value);
            }
            Value::Mapping(base)
        }
        (Value::Sequence(mut base), Value::Sequence(patch)) => {
            for (index, value) in patch.into_iter().enumerate() {
                match base.get_mut(index) {
                    Some(existing) => {
                        let current = std::mem::replace(existing, Value::Null);
                        *existing = deep_merge(current, value);
                    }
                    None => base.push(value),
                }
            }
            Value::Sequence(base)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> Value {
        serde_yaml::from_str(src).expect("yaml")
    }

    #[test]
    fn nested_mappings_merge_and_new_values_win() {
        let base = yaml("framework:\n  secret: old\n  session: true\ntwig:\n  strict: false\n");
        let patch = yaml("framework:\n  secret: new\n  csrf: true\n");
        let merged = deep_merge(base, patch);
        assert_eq!(
            merged,
            yaml(
                "framework:\n  secret: new\n  session: true\n  csrf: true\ntwig:\n  strict: false\n"
            )
        );
    }

    #[test]
    fn sequences_merge_by_index() {
        let merged = deep_merge(yaml("paths: [a, b]\n"), yaml("paths: [c]\n"));
        assert_eq!(serde_yaml::to_string(&merged).expect("render"), "paths:\n- c\n- b\n");
    }

    #[test]
    fn longer_patch_sequence_appends_and_items_recurse() {
        let base = yaml("firewalls:\n  - {name: main, lazy: true}\n");
        let patch = yaml("firewalls:\n  - {lazy: false}\n  - {name: api}\n");
        assert_eq!(
            deep_merge(base, patch),
            yaml("firewalls:\n  - {name: main, lazy: false}\n  - {name: api}\n")
        );
    }

    #[test]
    fn scalars_and_mismatched_kinds_are_replaced() {
        let base = yaml("paths: [a, b]\nname: one\n");
        let patch = yaml("paths: solo\nname: {nested: true}\n");
        assert_eq!(deep_merge(base, patch), yaml("paths: solo\nname: {nested: true}\n"));
    }

    #[test]
    fn non_mapping_base_is_replaced_by_patch() {
        assert_eq!(deep_merge(Value::Null, yaml("a: 1")), yaml("a: 1"));
    }

    #[test]
    fn key_order_is_preserved() {
        let merged = deep_merge(yaml("b: 1\na: 2\n"), yaml("b: 3\nc: 4\n"));
        let rendered = serde_yaml::to_string(&merged).expect("render");
        assert_eq!(rendered, "b: 3\na: 2\nc: 4\n");
    }
}
