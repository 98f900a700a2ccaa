//! Record assembly state machine
//!
//! Driven by open / text / close events and independent of any XML library,
//! so the mapping can be exercised without a document stream.

use super::rules::{
    attribute_rules_for, field_for, AttributeField, Field, NameOrder, GST_ACTIVE_STATUS,
    RECORD_ELEMENT,
};
use crate::models::EntityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    /// Outside any record
    Idle,
    /// Inside a record, on an element no rule cares about
    InRecord,
    /// Inside a record, collecting text for `Field`
    AccumulatingField(Field),
}

/// The record being assembled plus the name parts held back for
/// [`NameOrder::GivenFamily`]
#[derive(Debug, Default)]
struct RecordBuilder {
    record: EntityRecord,
    gst_status: Option<String>,
    given_names: Vec<String>,
    family_name: Option<String>,
}

impl RecordBuilder {
    fn apply(&mut self, field: Field, text: &str, order: NameOrder) {
        let record = &mut self.record;
        match field {
            Field::Abn => {
                if !text.is_empty() {
                    record.abn = text.to_string();
                }
            },
            Field::Gst => {
                if let Some(status) = self.gst_status.take() {
                    record.gst_registered = Some(status == GST_ACTIVE_STATUS);
                }
            },
            Field::EntityType => set_non_empty(&mut record.entity_type, text),
            Field::OrganisationName => {
                if record.legal_name.is_none() {
                    set_non_empty(&mut record.legal_name, text);
                }
            },
            Field::FamilyName if !text.is_empty() => match order {
                NameOrder::Document => {
                    record.legal_name = Some(match record.legal_name.take() {
                        Some(existing) => format!("{}, {}", text, existing),
                        None => text.to_string(),
                    });
                },
                NameOrder::GivenFamily => self.family_name = Some(text.to_string()),
            },
            Field::GivenName if !text.is_empty() => match order {
                NameOrder::Document => match record.legal_name {
                    Some(ref mut existing) => {
                        existing.push(' ');
                        existing.push_str(text);
                    },
                    None => record.legal_name = Some(text.to_string()),
                },
                NameOrder::GivenFamily => self.given_names.push(text.to_string()),
            },
            Field::FamilyName | Field::GivenName => {},
            Field::State => set_non_empty(&mut record.state, text),
            Field::Postcode => set_non_empty(&mut record.postcode, text),
            Field::Acn => set_non_empty(&mut record.acn, text),
            Field::BusinessName => {
                if !text.is_empty() {
                    record.business_names.push(text.to_string());
                }
            },
        }
    }

    fn capture(&mut self, field: AttributeField, value: &str) {
        if value.is_empty() {
            return;
        }
        match field {
            AttributeField::Status => self.record.status = Some(value.to_string()),
            AttributeField::StatusFrom => self.record.status_from = Some(value.to_string()),
            AttributeField::GstStatus => self.gst_status = Some(value.to_string()),
        }
    }

    fn finish(mut self) -> Option<EntityRecord> {
        if !self.record.is_valid() {
            return None;
        }

        if self.record.legal_name.is_none() {
            let parts: Vec<String> = self
                .given_names
                .into_iter()
                .chain(self.family_name)
                .collect();
            if !parts.is_empty() {
                self.record.legal_name = Some(parts.join(" "));
            }
        }

        Some(self.record)
    }
}

fn set_non_empty(slot: &mut Option<String>, text: &str) {
    if !text.is_empty() {
        *slot = Some(text.to_string());
    }
}

/// Assembles [`EntityRecord`]s from a flat stream of element events
#[derive(Debug)]
pub struct RecordMachine {
    state: ExtractorState,
    path: Vec<String>,
    text: String,
    current: Option<RecordBuilder>,
    name_order: NameOrder,
}

impl Default for RecordMachine {
    fn default() -> Self {
        Self::new(NameOrder::default())
    }
}

impl RecordMachine {
    pub fn new(name_order: NameOrder) -> Self {
        Self {
            state: ExtractorState::Idle,
            path: Vec::with_capacity(16),
            text: String::new(),
            current: None,
            name_order,
        }
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    /// Number of currently open elements
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Element opened, with its attributes
    pub fn open<K: AsRef<str>, V: AsRef<str>>(&mut self, name: &str, attributes: &[(K, V)]) {
        self.path.push(name.to_string());
        self.text.clear();

        if name == RECORD_ELEMENT {
            self.current = Some(RecordBuilder::default());
        } else if let Some(builder) = self.current.as_mut() {
            for rule in attribute_rules_for(name) {
                if let Some((_, value)) = attributes.iter().find(|(k, _)| k.as_ref() == rule.attribute)
                {
                    builder.capture(rule.field, value.as_ref().trim());
                }
            }
        }

        self.state = self.state_at_top();
    }

    /// Element opened without attributes
    pub fn open_bare(&mut self, name: &str) {
        self.open::<&str, &str>(name, &[]);
    }

    /// Character data inside the current element
    pub fn text(&mut self, text: &str) {
        if matches!(self.state, ExtractorState::AccumulatingField(_)) {
            self.text.push_str(text);
        }
    }

    /// Current element closed; yields a record when a valid record ends
    pub fn close(&mut self) -> Option<EntityRecord> {
        let mut emitted = None;

        if let (ExtractorState::AccumulatingField(field), Some(builder)) =
            (self.state, self.current.as_mut())
        {
            builder.apply(field, self.text.trim(), self.name_order);
        }

        if self.path.last().map(String::as_str) == Some(RECORD_ELEMENT) {
            emitted = self.current.take().and_then(RecordBuilder::finish);
        }

        self.path.pop();
        self.text.clear();
        self.state = self.state_at_top();
        emitted
    }

    fn state_at_top(&self) -> ExtractorState {
        if self.current.is_none() {
            return ExtractorState::Idle;
        }
        match field_for(&self.path) {
            Some(field) => ExtractorState::AccumulatingField(field),
            None => ExtractorState::InRecord,
        }
    }
}
