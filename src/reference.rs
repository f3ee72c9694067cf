//! The as-authored form of a relational attribute.
//!
//! A [`Reference`] records how configuration (or prior state) wrote a link
//! to another object: by numeric ID, by slug, or by name. It is parsed on
//! every plan/apply and never persisted itself; only its raw value ends up
//! in state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a reference value was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// No value was configured.
    Unset,
    /// A non-negative integer ID.
    NumericId,
    /// A slug.
    Slug,
    /// A display name.
    Name,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unset => "unset value",
            Self::NumericId => "ID",
            Self::Slug => "slug",
            Self::Name => "name",
        };
        f.write_str(label)
    }
}

/// The textual shape an attribute declares for non-numeric values.
///
/// This is fixed by the resource schema, never inferred from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupField {
    /// Text values are slugs.
    #[default]
    Slug,
    /// Text values are names.
    Name,
}

impl From<LookupField> for ReferenceKind {
    fn from(field: LookupField) -> Self {
        match field {
            LookupField::Slug => Self::Slug,
            LookupField::Name => Self::Name,
        }
    }
}

/// A relational attribute value, classified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    kind: ReferenceKind,
    raw_value: String,
    object_type: String,
}

impl Reference {
    /// Classify `raw_value` as a reference to `object_type`.
    ///
    /// Non-negative integers are always IDs. Empty strings are unset.
    /// Anything else takes the kind the schema declared for the attribute.
    pub fn parse(raw_value: &str, object_type: &str, declared: LookupField) -> Self {
        let kind = if raw_value.is_empty() {
            ReferenceKind::Unset
        } else if parse_id(raw_value).is_some() {
            ReferenceKind::NumericId
        } else {
            declared.into()
        };

        Self {
            kind,
            raw_value: raw_value.to_string(),
            object_type: object_type.to_string(),
        }
    }

    /// Classify an optional value; `None` is unset.
    pub fn parse_optional(
        raw_value: Option<&str>,
        object_type: &str,
        declared: LookupField,
    ) -> Self {
        Self::parse(raw_value.unwrap_or_default(), object_type, declared)
    }

    /// An unset reference to `object_type`.
    pub fn unset(object_type: &str) -> Self {
        Self {
            kind: ReferenceKind::Unset,
            raw_value: String::new(),
            object_type: object_type.to_string(),
        }
    }

    /// A numeric reference to `object_type`.
    pub fn from_id(id: u64, object_type: &str) -> Self {
        Self {
            kind: ReferenceKind::NumericId,
            raw_value: id.to_string(),
            object_type: object_type.to_string(),
        }
    }

    /// How the value was written.
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// The literal value, exactly as written.
    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    /// The referenced object type (e.g. `"site"`).
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Returns true when no value was configured.
    pub fn is_unset(&self) -> bool {
        self.kind == ReferenceKind::Unset
    }

    /// The numeric ID, if this reference is one.
    pub fn id(&self) -> Option<u64> {
        match self.kind {
            ReferenceKind::NumericId => parse_id(&self.raw_value),
            _ => None,
        }
    }

    /// A copy of this reference reclassified as `kind`, with the same raw value.
    pub(crate) fn with_kind(&self, kind: ReferenceKind) -> Self {
        Self {
            kind,
            raw_value: self.raw_value.clone(),
            object_type: self.object_type.clone(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReferenceKind::Unset => write!(f, "{} (unset)", self.object_type),
            _ => write!(f, "{} {} '{}'", self.object_type, self.kind, self.raw_value),
        }
    }
}

/// Parse a non-negative decimal integer ID. Signs and whitespace are rejected.
pub(crate) fn parse_id(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_values_are_ids_regardless_of_type() {
        for object_type in ["site", "tenant", "vlan", "device"] {
            for declared in [LookupField::Slug, LookupField::Name] {
                for value in ["0", "7", "42", "18446744073709551615"] {
                    let r = Reference::parse(value, object_type, declared);
                    assert_eq!(r.kind(), ReferenceKind::NumericId, "{value} as {object_type}");
                }
            }
        }
    }

    #[test]
    fn test_text_values_take_declared_kind() {
        let slug = Reference::parse("dc-east", "site", LookupField::Slug);
        assert_eq!(slug.kind(), ReferenceKind::Slug);

        let name = Reference::parse("device-42", "device", LookupField::Name);
        assert_eq!(name.kind(), ReferenceKind::Name);
        assert_eq!(name.raw_value(), "device-42");
        assert_eq!(name.object_type(), "device");
    }

    #[test]
    fn test_empty_and_absent_are_unset() {
        assert!(Reference::parse("", "tenant", LookupField::Slug).is_unset());
        assert!(Reference::parse_optional(None, "tenant", LookupField::Slug).is_unset());
        assert!(Reference::unset("tenant").is_unset());
    }

    #[test]
    fn test_signed_and_padded_numbers_are_not_ids() {
        assert_eq!(
            Reference::parse("-5", "vlan", LookupField::Name).kind(),
            ReferenceKind::Name
        );
        assert_eq!(
            Reference::parse(" 5", "vlan", LookupField::Name).kind(),
            ReferenceKind::Name
        );
        assert_eq!(
            Reference::parse("+5", "vlan", LookupField::Slug).kind(),
            ReferenceKind::Slug
        );
    }

    #[test]
    fn test_overflowing_digits_fall_back_to_declared_kind() {
        let r = Reference::parse("99999999999999999999999", "asn", LookupField::Name);
        assert_eq!(r.kind(), ReferenceKind::Name);
        assert_eq!(r.id(), None);
    }

    #[test]
    fn test_id_accessor() {
        assert_eq!(Reference::parse("15", "site", LookupField::Slug).id(), Some(15));
        assert_eq!(Reference::from_id(15, "site").raw_value(), "15");
        assert_eq!(Reference::parse("dc", "site", LookupField::Slug).id(), None);
    }

    #[test]
    fn test_display() {
        let r = Reference::parse("dc-east", "site", LookupField::Slug);
        assert_eq!(r.to_string(), "site slug 'dc-east'");
        assert_eq!(Reference::unset("site").to_string(), "site (unset)");
    }
}
