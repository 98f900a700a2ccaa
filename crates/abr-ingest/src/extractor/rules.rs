//! Path-to-field mapping for ABR records
//!
//! The mapping is plain data: [`FIELD_RULES`] decides which field a closing
//! element feeds, [`ATTRIBUTE_RULES`] which attributes are captured when an
//! element opens. Element names and suffixes are bit-exact with the ABR bulk
//! extract schema.

use serde::{Deserialize, Serialize};

/// Element that delimits one entity record
pub const RECORD_ELEMENT: &str = "ABR";

/// `GST@status` value meaning "registered for GST"
pub const GST_ACTIVE_STATUS: &str = "ACT";

/// Record fields fed from element text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Abn,
    Gst,
    EntityType,
    OrganisationName,
    FamilyName,
    GivenName,
    State,
    Postcode,
    Acn,
    BusinessName,
}

/// Record fields fed from attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeField {
    Status,
    StatusFrom,
    GstStatus,
}

/// How an element position is recognised
#[derive(Debug, Clone, Copy)]
pub enum PathMatch {
    /// Innermost element has this name, wherever it sits
    Element(&'static str),
    /// The open-element path ends with these names
    Suffix(&'static [&'static str]),
}

impl PathMatch {
    pub fn matches<S: AsRef<str>>(&self, path: &[S]) -> bool {
        match self {
            PathMatch::Element(name) => path.last().is_some_and(|last| last.as_ref() == *name),
            PathMatch::Suffix(suffix) => {
                path.len() >= suffix.len()
                    && path[path.len() - suffix.len()..]
                        .iter()
                        .zip(suffix.iter())
                        .all(|(open, expected)| open.as_ref() == *expected)
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub at: PathMatch,
    pub field: Field,
}

/// Text rules, checked in order; the first match wins.
pub const FIELD_RULES: &[FieldRule] = &[
    FieldRule { at: PathMatch::Element("ABN"), field: Field::Abn },
    FieldRule { at: PathMatch::Element("GST"), field: Field::Gst },
    FieldRule {
        at: PathMatch::Suffix(&["EntityType", "EntityTypeInd"]),
        field: Field::EntityType,
    },
    FieldRule {
        at: PathMatch::Suffix(&["MainEntity", "NonIndividualName", "NonIndividualNameText"]),
        field: Field::OrganisationName,
    },
    FieldRule {
        at: PathMatch::Suffix(&["MainEntity", "IndividualName", "FamilyName"]),
        field: Field::FamilyName,
    },
    FieldRule {
        at: PathMatch::Suffix(&["MainEntity", "IndividualName", "GivenName"]),
        field: Field::GivenName,
    },
    FieldRule {
        at: PathMatch::Suffix(&["BusinessAddress", "AddressDetails", "State"]),
        field: Field::State,
    },
    FieldRule {
        at: PathMatch::Suffix(&["BusinessAddress", "AddressDetails", "Postcode"]),
        field: Field::Postcode,
    },
    FieldRule { at: PathMatch::Element("ASICNumber"), field: Field::Acn },
    FieldRule {
        at: PathMatch::Suffix(&["OtherEntity", "NonIndividualName", "NonIndividualNameText"]),
        field: Field::BusinessName,
    },
];

#[derive(Debug, Clone, Copy)]
pub struct AttributeRule {
    pub element: &'static str,
    pub attribute: &'static str,
    pub field: AttributeField,
}

pub const ATTRIBUTE_RULES: &[AttributeRule] = &[
    AttributeRule { element: "ABN", attribute: "status", field: AttributeField::Status },
    AttributeRule {
        element: "ABN",
        attribute: "ABNStatusFromDate",
        field: AttributeField::StatusFrom,
    },
    AttributeRule { element: "GST", attribute: "status", field: AttributeField::GstStatus },
];

/// Field fed by the element at the top of `path`, if any
pub fn field_for<S: AsRef<str>>(path: &[S]) -> Option<Field> {
    FIELD_RULES
        .iter()
        .find(|rule| rule.at.matches(path))
        .map(|rule| rule.field)
}

/// Attribute captures that apply when `element` opens
pub fn attribute_rules_for(element: &str) -> impl Iterator<Item = &'static AttributeRule> + '_ {
    ATTRIBUTE_RULES.iter().filter(move |rule| rule.element == element)
}

/// Ordering of individual name parts inside `legal_name`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameOrder {
    /// Concatenate as parts close: a family name prepends `"Family, "`, a
    /// given name appends `" Given"`. `<GivenName/><FamilyName/>` therefore
    /// yields "Smith, John". Matches previously loaded data.
    #[default]
    Document,
    /// Always "Given [Given...] Family", independent of element order
    GivenFamily,
}

impl std::str::FromStr for NameOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document" => Ok(NameOrder::Document),
            "given-family" | "given_family" => Ok(NameOrder::GivenFamily),
            _ => Err(format!("Invalid name order: {} (expected document or given-family)", s)),
        }
    }
}

impl std::fmt::Display for NameOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameOrder::Document => write!(f, "document"),
            NameOrder::GivenFamily => write!(f, "given-family"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<&str> {
        s.split('/').collect()
    }

    #[test]
    fn test_suffix_matches_whole_element_names() {
        let rule = PathMatch::Suffix(&["EntityType", "EntityTypeInd"]);
        assert!(rule.matches(&path("Transfer/ABR/EntityType/EntityTypeInd")));
        assert!(!rule.matches(&path("Transfer/ABR/XEntityType/EntityTypeInd")));
        assert!(!rule.matches(&path("EntityTypeInd")));
    }

    #[test]
    fn test_main_and_other_entity_names_are_distinct() {
        assert_eq!(
            field_for(&path("ABR/MainEntity/NonIndividualName/NonIndividualNameText")),
            Some(Field::OrganisationName)
        );
        assert_eq!(
            field_for(&path("ABR/OtherEntity/NonIndividualName/NonIndividualNameText")),
            Some(Field::BusinessName)
        );
        assert_eq!(field_for(&path("ABR/DGR/NonIndividualName/NonIndividualNameText")), None);
    }

    #[test]
    fn test_element_rules_ignore_ancestry() {
        assert_eq!(field_for(&path("ABR/ABN")), Some(Field::Abn));
        assert_eq!(field_for(&path("ABR/ASICNumber")), Some(Field::Acn));
        assert_eq!(field_for(&path("ABR/Deep/Nested/ASICNumber")), Some(Field::Acn));
    }

    #[test]
    fn test_address_outside_business_address_is_ignored() {
        assert_eq!(field_for(&path("ABR/BusinessAddress/AddressDetails/State")), Some(Field::State));
        assert_eq!(field_for(&path("ABR/PostalAddress/AddressDetails/State")), None);
    }

    #[test]
    fn test_attribute_rules_per_element() {
        let abn: Vec<_> = attribute_rules_for("ABN").map(|r| r.field).collect();
        assert_eq!(abn, vec![AttributeField::Status, AttributeField::StatusFrom]);

        let gst: Vec<_> = attribute_rules_for("GST").map(|r| r.attribute).collect();
        assert_eq!(gst, vec!["status"]);

        assert_eq!(attribute_rules_for("EntityType").count(), 0);
    }

    #[test]
    fn test_name_order_from_str() {
        assert_eq!("document".parse::<NameOrder>().unwrap(), NameOrder::Document);
        assert_eq!("Given-Family".parse::<NameOrder>().unwrap(), NameOrder::GivenFamily);
        assert!("family-first".parse::<NameOrder>().is_err());
    }
}
