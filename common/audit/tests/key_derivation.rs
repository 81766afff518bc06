use gateway_audit::model::{Entity, Event, Request, User};
use gateway_audit::{
    derive_key, AuditRecord, EventBuilder, EventSource, EventType, FieldEntry, Invocation, Outcome, RootType,
    SourceConfig,
};
use proptest::prelude::*;
use serde_json::json;

fn record_for(args: serde_json::Value, outcome: Outcome) -> AuditRecord {
    let builder = EventBuilder::new(
        "mesh-gateway",
        "users",
        vec![SourceConfig::new("usersApi", RootType::Mutation, "createUser").with_external_id("name")],
    );
    let mut record = builder
        .open(&Invocation::new("usersApi", "Mutation", "createUser", args))
        .unwrap()
        .finalize(&outcome);
    // Pin latency so structurally identical builds compare equal.
    let latency = record
        .event
        .fields
        .iter_mut()
        .find(|f| f.code == "latency")
        .unwrap();
    latency.value = "3".into();
    record
}

#[test]
fn key_is_sixteen_bytes_and_stable() {
    let a = record_for(json!({"name": "Ann"}), Outcome::Value(json!({"id": 1})));
    let b = record_for(json!({"name": "Ann"}), Outcome::Value(json!({"id": 1})));
    assert_eq!(a, b);
    let key = derive_key(&a).unwrap();
    assert_eq!(key.as_bytes().len(), 16);
    assert_eq!(key, derive_key(&b).unwrap());
    assert_eq!(key.to_hex().len(), 32);
    assert_eq!(key.to_string(), key.to_hex());
}

#[test]
fn key_covers_field_order() {
    let record = record_for(json!({"name": "Ann"}), Outcome::Value(json!(null)));
    let mut swapped = record.clone();
    swapped.event.fields.swap(0, 1);
    assert_ne!(derive_key(&record).unwrap(), derive_key(&swapped).unwrap());
}

#[test]
fn key_covers_outcome() {
    let ok = record_for(json!({"name": "Ann"}), Outcome::Value(json!({"id": 1})));
    let failed = record_for(json!({"name": "Ann"}), Outcome::Error("boom".into()));
    assert_ne!(derive_key(&ok).unwrap(), derive_key(&failed).unwrap());
}

#[test]
fn key_is_md5_of_the_pre_encoding_json() {
    let record = AuditRecord {
        entity: Entity { code: "users".into() },
        event: Event {
            source: EventSource::Human as i32,
            r#type: EventType::Create as i32,
            user: Some(User { id: None }),
            request: Some(Request { id: None }),
            fields: vec![FieldEntry::new("app_code", "mesh-gateway")],
        },
    };
    assert_eq!(
        serde_json::to_string(&record).unwrap(),
        r#"{"entity":{"code":"users"},"event":{"source":1,"type":0,"user":{"id":null},"request":{},"fields":[{"code":"app_code","value":"mesh-gateway"}]}}"#
    );
    assert_eq!(derive_key(&record).unwrap().to_hex(), "1d446081874dee8aa1aac81e42749b3e");
}

#[test]
fn key_follows_argument_order_as_received() {
    let a = record_for(json!({"name": "Ann", "age": 3}), Outcome::Value(json!(null)));
    let b = record_for(json!({"age": 3, "name": "Ann"}), Outcome::Value(json!(null)));
    assert_ne!(derive_key(&a).unwrap(), derive_key(&b).unwrap());
}

proptest! {
    #[test]
    fn identical_records_share_a_key(name in "[A-Za-z]{1,12}", id in 0u32..10_000) {
        let a = record_for(json!({"name": name}), Outcome::Value(json!({"id": id})));
        let b = record_for(json!({"name": name}), Outcome::Value(json!({"id": id})));
        prop_assert_eq!(derive_key(&a).unwrap(), derive_key(&b).unwrap());
    }

    #[test]
    fn differing_field_values_change_the_key(value in "[a-z0-9]{1,16}", other in "[a-z0-9]{1,16}") {
        prop_assume!(value != other);
        let base = record_for(json!({"name": "Ann"}), Outcome::Value(json!(null)));
        let mut a = base.clone();
        let mut b = base;
        a.event.fields.push(FieldEntry::new("extra", value));
        b.event.fields.push(FieldEntry::new("extra", other));
        prop_assert_ne!(derive_key(&a).unwrap(), derive_key(&b).unwrap());
    }
}
