//! Metadata Filter Glue (§4.G) — strips versioning-internal keys from a
//! retrieval hit's metadata before it reaches a caller.

use bitemporal_core::backend::VectorHit;
use bitemporal_core::constants::VERSIONING_METADATA_KEYS;

/// Removes every key in `VERSIONING_METADATA_KEYS` from `hit`'s metadata,
/// in place.
pub fn strip_versioning_keys(hit: &mut VectorHit) {
    for key in VERSIONING_METADATA_KEYS {
        hit.metadata.remove(*key);
    }
}

/// Applies [`strip_versioning_keys`] to every hit in `hits`.
pub fn strip_versioning_keys_all(hits: &mut [VectorHit]) {
    for hit in hits {
        strip_versioning_keys(hit);
    }
}

#[cfg(test)]
mod tests {
    use bitemporal_core::constants::{EXTRACT_TIMESTAMP_KEY, VALID_FROM_KEY, VALID_TO_KEY};
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value};

    use super::*;

    fn hit_with(extra: &[(&str, Value)]) -> VectorHit {
        let mut metadata = Map::new();
        metadata.insert(VALID_FROM_KEY.to_string(), Value::from(100));
        metadata.insert(VALID_TO_KEY.to_string(), Value::from(200));
        metadata.insert(EXTRACT_TIMESTAMP_KEY.to_string(), Value::from(90));
        metadata.insert("category".to_string(), Value::from("x"));
        for (key, value) in extra {
            metadata.insert(key.to_string(), value.clone());
        }
        VectorHit { node_id: "n1".into(), score: 0.9, metadata }
    }

    #[test]
    fn strips_versioning_keys_but_keeps_user_metadata() {
        let mut hit = hit_with(&[]);
        strip_versioning_keys(&mut hit);

        assert!(!hit.metadata.contains_key(VALID_FROM_KEY));
        assert!(!hit.metadata.contains_key(VALID_TO_KEY));
        assert!(!hit.metadata.contains_key(EXTRACT_TIMESTAMP_KEY));
        assert_eq!(hit.metadata.get("category"), Some(&Value::from("x")));
    }

    #[test]
    fn is_a_noop_when_no_versioning_keys_are_present() {
        let mut metadata = Map::new();
        metadata.insert("category".to_string(), Value::from("x"));
        let mut hit = VectorHit { node_id: "n1".into(), score: 0.5, metadata: metadata.clone() };

        strip_versioning_keys(&mut hit);
        assert_eq!(hit.metadata, metadata);
    }

    #[test]
    fn strips_across_a_whole_result_set() {
        let mut hits = vec![hit_with(&[]), hit_with(&[])];
        strip_versioning_keys_all(&mut hits);
        assert!(hits.iter().all(|h| !h.metadata.contains_key(VALID_FROM_KEY)));
    }
}
