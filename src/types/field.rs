//! Presence-aware field wrapper.
//!
//! Every attribute of a mirrored entity may be missing from any given update.
//! GitHub also reports some attributes as an explicit `null` (a run that has
//! not concluded yet has `"conclusion": null`). [`Field`] keeps the three cases
//! apart so the merge rule can tell "not reported" from "reported as empty".
//!
//! # Serde
//!
//! A `Field<T>` struct member must carry
//! `#[serde(default, skip_serializing_if = "Field::is_absent")]`:
//!
//! - a missing key decodes as [`Field::Absent`] (via `Default`)
//! - `null` decodes as [`Field::Null`]
//! - any other value decodes as [`Field::Value`]
//!
//! Absent fields are skipped on output; `Null` is written as `null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A tri-state value: not reported, explicitly null, or a concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field<T> {
    /// The update did not mention this attribute.
    Absent,
    /// The update reported this attribute as explicitly empty.
    Null,
    /// The update reported a concrete value.
    Value(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Returns true if the attribute was reported at all (null or value).
    pub fn is_reported(&self) -> bool {
        !self.is_absent()
    }

    /// Returns the concrete value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            Field::Absent | Field::Null => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            Field::Absent | Field::Null => None,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Absent => Field::Absent,
            Field::Null => Field::Null,
            Field::Value(v) => Field::Value(v),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Absent => Field::Absent,
            Field::Null => Field::Null,
            Field::Value(v) => Field::Value(f(v)),
        }
    }

    /// Downgrades an explicit null to absent.
    ///
    /// Used for structural linkage (owner, workflow) where a null must not
    /// detach an entity from a parent it is already placed under.
    pub fn null_as_absent(self) -> Self {
        match self {
            Field::Null => Field::Absent,
            other => other,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> From<Option<T>> for Field<T> {
    /// `None` maps to [`Field::Null`]: the caller had a slot for the value.
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => Field::Value(v),
            None => Field::Null,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => serializer.serialize_some(v),
            Field::Absent | Field::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Probe {
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        status: Field<String>,
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        conclusion: Field<String>,
    }

    #[test]
    fn missing_key_is_absent_and_null_is_null() {
        let probe: Probe = serde_json::from_str(r#"{"conclusion": null}"#).unwrap();
        assert_eq!(probe.status, Field::Absent);
        assert_eq!(probe.conclusion, Field::Null);
    }

    #[test]
    fn value_decodes_as_value() {
        let probe: Probe = serde_json::from_str(r#"{"status": "queued"}"#).unwrap();
        assert_eq!(probe.status, Field::Value("queued".to_string()));
    }

    #[test]
    fn absent_fields_are_skipped_on_output() {
        let probe = Probe {
            status: Field::Value("completed".into()),
            conclusion: Field::Absent,
        };
        assert_eq!(serde_json::to_string(&probe).unwrap(), r#"{"status":"completed"}"#);

        let probe = Probe {
            status: Field::Absent,
            conclusion: Field::Null,
        };
        assert_eq!(serde_json::to_string(&probe).unwrap(), r#"{"conclusion":null}"#);
    }

    #[test]
    fn null_as_absent_only_touches_null() {
        assert_eq!(Field::<u8>::Null.null_as_absent(), Field::Absent);
        assert_eq!(Field::Value(3).null_as_absent(), Field::Value(3));
        assert_eq!(Field::<u8>::Absent.null_as_absent(), Field::Absent);
    }

    #[test]
    fn accessors() {
        let f = Field::Value(5);
        assert_eq!(f.value(), Some(&5));
        assert!(f.is_reported());
        assert_eq!(f.map(|n| n * 2), Field::Value(10));
        assert_eq!(Field::<u8>::Null.into_value(), None);
        assert!(Field::<u8>::Null.is_reported());
        assert!(Field::<u8>::Null.is_null());
    }
}
