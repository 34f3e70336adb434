//! Modality - imaging channel tag
//!
//! Canonical lower-case name backed by `Arc<str>`, so the tag can be cloned into
//! every volume, tensor channel list and error without reallocating.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Imaging modality tag (e.g. `t1`, `t1ce`, `t2`, `flair`).
///
/// Tags are trimmed and lower-cased on construction so `"FLAIR"` and
/// `"flair"` name the same channel.
///
/// # Examples
/// ```
/// use contracts::Modality;
///
/// let m: Modality = " FLAIR ".into();
/// assert_eq!(m, "flair");
/// assert_eq!(m.as_str(), "flair");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Modality(Arc<str>);

impl Modality {
    /// Create a modality tag from any string
    pub fn new(s: &str) -> Self {
        let canonical = s.trim().to_ascii_lowercase();
        Self(Arc::from(canonical))
    }

    /// Get the canonical tag
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Modality {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Modality {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Modality {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Modality {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modality({:?})", self.0)
    }
}

impl PartialEq<str> for Modality {
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for Modality {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

impl Serialize for Modality {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Modality {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_canonical_form() {
        assert_eq!(Modality::from("T1CE"), Modality::from("t1ce"));
        assert_eq!(Modality::from("  t2 ").as_str(), "t2");
    }

    #[test]
    fn test_clone_shares_storage() {
        let a: Modality = "flair".into();
        let b = a.clone();
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
    }

    #[test]
    fn test_map_lookup_by_str() {
        let mut map: BTreeMap<Modality, u8> = BTreeMap::new();
        map.insert("t1".into(), 1);
        assert_eq!(map.get("t1"), Some(&1));
    }

    #[test]
    fn test_serde() {
        let m: Modality = "Flair".into();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"flair\"");
        let parsed: Modality = serde_json::from_str("\"FLAIR\"").unwrap();
        assert_eq!(parsed, m);
    }
}
