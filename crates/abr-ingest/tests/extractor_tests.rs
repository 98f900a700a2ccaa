//! Extractor tests over realistic bulk extract fixtures

mod common;

use abr_ingest::{EntityRecord, IngestError, NameOrder, RecordStream};
use common::fixture;

fn extract(name: &str, order: NameOrder) -> Vec<abr_ingest::Result<EntityRecord>> {
    RecordStream::open_with(fixture(name), order)
        .expect("fixture exists")
        .collect()
}

#[test]
fn test_fixture_records() {
    let records: Vec<_> = extract("xml/20260101_Public01.xml", NameOrder::Document)
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("well-formed fixture");

    // The fourth ABR element has an empty ABN and is dropped
    assert_eq!(records.len(), 3);

    let smith = &records[0];
    assert_eq!(smith.abn, "12345678901");
    assert_eq!(smith.legal_name.as_deref(), Some("Smith, John"));
    assert_eq!(smith.entity_type.as_deref(), Some("IND"));
    assert_eq!(smith.state.as_deref(), Some("NSW"));
    assert_eq!(smith.postcode.as_deref(), Some("2000"));
    assert_eq!(smith.gst_registered, Some(true));

    let woolworths = &records[1];
    assert_eq!(woolworths.legal_name.as_deref(), Some("WOOLWORTHS GROUP LIMITED"));
    assert_eq!(woolworths.acn.as_deref(), Some("004085616"));
    assert_eq!(woolworths.status_from.as_deref(), Some("19991101"));
    assert_eq!(
        woolworths.business_names,
        vec!["WOOLWORTHS", "BIG W", "WOOLWORTHS"]
    );

    let cancelled = &records[2];
    assert_eq!(cancelled.status.as_deref(), Some("CAN"));
    assert_eq!(cancelled.legal_name.as_deref(), Some("SMITH & JONES PTY LTD"));
    assert_eq!(cancelled.gst_registered, Some(false));
    assert!(records.iter().all(EntityRecord::is_valid));
}

#[test]
fn test_given_family_name_order() {
    let first = extract("xml/20260101_Public01.xml", NameOrder::GivenFamily)
        .into_iter()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(first.legal_name.as_deref(), Some("John Smith"));
}

#[test]
fn test_truncated_fixture_yields_records_then_parse_error() {
    let results = extract("xml/20260101_Public02.xml", NameOrder::Document);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().abn, "11000000005");
    match &results[1] {
        Err(IngestError::Parse { path, .. }) => {
            assert!(path.ends_with("20260101_Public02.xml"));
        },
        other => panic!("expected parse error, got {:?}", other),
    }
}
