//! Drives the compression codec, archiver, and in-memory store together over
//! realistic payload shapes (a ~1KB context blob and a Unicode-only payload),
//! the data supporting scenario S6.

use hsm_core::{EntityIdType, EventId, EventRecord, EventSource};
use hsm_storage::{Archiver, CompressionCodec, CompressionConfig, InMemoryMachineStore, MachineStore};
use hsm_test_utils::scenarios::{kilobyte_context, unicode_payload};

fn codec() -> CompressionCodec {
    CompressionCodec::new(CompressionConfig { enabled: true, level: 6, fields: vec!["events".into()], threshold: 100 })
}

fn events_with_payload(root: EventId, payload: serde_json::Value) -> Vec<EventRecord> {
    vec![
        EventRecord::root(root, "archived_machine", 1, "archived_machine.start", vec!["archived_machine.a".into()], Some(payload.clone()), None),
        EventRecord::next(
            root,
            2,
            "archived_machine",
            1,
            EventSource::External,
            "NEXT",
            vec!["archived_machine.b".into()],
            Some(payload),
            None,
        ),
    ]
}

#[tokio::test]
async fn kilobyte_context_compresses_and_restores_field_exact() {
    let root = EventId::now_v7();
    let events = events_with_payload(root, kilobyte_context(7));
    let archiver = Archiver::new(codec());
    let store = InMemoryMachineStore::new();

    let entry = archiver.archive_one(events.clone()).unwrap();
    assert!(entry.compressed_size < entry.original_size, "kilobyte payload should compress");

    store.archive(entry.clone()).await.unwrap();
    let loaded = store.load(root).await.unwrap().expect("entry was archived");
    let restored = archiver.restore(&loaded).unwrap();
    assert_eq!(restored, events);
}

#[tokio::test]
async fn unicode_payload_survives_archive_and_restore() {
    let root = EventId::now_v7();
    let events = events_with_payload(root, unicode_payload());
    let archiver = Archiver::new(codec());

    let entry = archiver.archive_one(events.clone()).unwrap();
    let restored = archiver.restore(&entry).unwrap();
    assert_eq!(restored, events);
    assert_eq!(restored[0].payload.as_ref().unwrap()["text"], "Türkçe 中文 🚀");
}

#[tokio::test]
async fn duplicate_root_event_id_is_rejected_by_the_store() {
    let root = EventId::now_v7();
    let archiver = Archiver::new(codec());
    let store = InMemoryMachineStore::new();

    let entry = archiver.archive_one(events_with_payload(root, unicode_payload())).unwrap();
    store.archive(entry.clone()).await.unwrap();
    assert!(store.archive(entry).await.is_err());
}
