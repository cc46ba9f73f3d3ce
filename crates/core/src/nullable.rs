//! Serde helper for PATCH-style fields where `null` means "clear".
//!
//! Use with `#[serde(default, deserialize_with = "nullable::deserialize")]`
//! on an `Option<Option<T>>`: a missing field is `None`, an explicit `null`
//! is `Some(None)`.

use serde::{Deserialize, Deserializer};

pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "super::deserialize")]
        brand: Option<Option<String>>,
    }

    #[test]
    fn distinguishes_missing_null_and_value() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.brand, None);

        let null: Patch = serde_json::from_str(r#"{"brand": null}"#).unwrap();
        assert_eq!(null.brand, Some(None));

        let set: Patch = serde_json::from_str(r#"{"brand": "Acme"}"#).unwrap();
        assert_eq!(set.brand, Some(Some("Acme".to_string())));
    }
}
