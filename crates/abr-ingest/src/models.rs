//! Flat records produced from ABR XML and persisted by the loader

use serde::{Deserialize, Serialize};

/// One business registration found in the bulk extract
///
/// `abn` is the only required field; the extractor never emits a record
/// with an empty `abn`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityRecord {
    pub abn: String,
    pub status: Option<String>,
    pub status_from: Option<String>,
    pub entity_type: Option<String>,
    pub legal_name: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub acn: Option<String>,
    pub gst_registered: Option<bool>,
    /// Trading/business names in document order, duplicates preserved
    pub business_names: Vec<String>,
}

impl EntityRecord {
    /// Create a record carrying only its key
    pub fn new(abn: impl Into<String>) -> Self {
        Self {
            abn: abn.into(),
            ..Default::default()
        }
    }

    /// A record can be persisted only when its key is non-empty
    pub fn is_valid(&self) -> bool {
        !self.abn.is_empty()
    }

    /// Business-name rows for this record, in document order
    pub fn business_name_rows(&self) -> impl Iterator<Item = BusinessNameRow<'_>> {
        self.business_names.iter().map(move |name| BusinessNameRow {
            abn: &self.abn,
            name,
        })
    }
}

/// A single `(abn, name)` pair destined for the business names table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusinessNameRow<'a> {
    pub abn: &'a str,
    pub name: &'a str,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_requires_abn() {
        assert!(!EntityRecord::default().is_valid());
        assert!(EntityRecord::new("51824753556").is_valid());
    }

    #[test]
    fn test_business_name_rows_keep_duplicates() {
        let mut record = EntityRecord::new("51824753556");
        record.business_names = vec!["Acme".into(), "Acme".into(), "Widgets".into()];

        let rows: Vec<_> = record.business_name_rows().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.abn == "51824753556"));
        assert_eq!(rows[2].name, "Widgets");
    }
}
