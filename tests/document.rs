//! End-to-end tests for local updates, sizes, garbage collection and
//! history on a single replica.

use std::collections::BTreeMap;

use serde_json::json;
use tandem::ActorId;
use tandem::Document;
use tandem::DocumentOptions;
use tandem::DocumentStatus;
use tandem::Error;
use tandem::Primitive;
use tandem::Value;
use tandem::VersionVector;
use tandem::crdt::primitives::TimeTicket;

// =============================================================================
// Helpers
// =============================================================================

fn actor(who: u8) -> ActorId {
    let mut bytes = [0u8; 12];
    bytes[11] = who;
    return ActorId::new(bytes);
}

fn replica(who: u8) -> Document {
    let mut doc = Document::new("doc");
    doc.set_actor(actor(who));
    return doc;
}

fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    return pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
}

// =============================================================================
// Objects, arrays and garbage
// =============================================================================

#[test]
fn removing_a_nested_array_leaves_four_pieces_of_garbage() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        root.set("1", 1)?;
        let mut array = root.set_new_array("2")?;
        array.push(1)?;
        array.push(2)?;
        array.push(3)?;
        root.set("3", 3)?;
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.to_json_value(), json!({"1": 1, "2": [1, 2, 3], "3": 3}));

    doc.update(|root, _| root.remove("2")).unwrap();
    assert_eq!(doc.to_json_value(), json!({"1": 1, "3": 3}));
    assert_eq!(doc.garbage_length(), 4);

    let live = doc.doc_size().live;
    let full = doc.version_vector().clone();
    assert_eq!(doc.garbage_collect(&full), 4);
    assert_eq!(doc.garbage_length(), 0);
    assert_eq!(doc.doc_size().live, live);
    assert_eq!(doc.doc_size().gc.total(), 0);
}

#[test]
fn undominated_removals_are_kept() {
    let mut doc = replica(1);
    doc.update(|root, _| root.set("a", "x")).unwrap();
    doc.update(|root, _| root.remove("a")).unwrap();
    assert_eq!(doc.garbage_length(), 1);

    // Saw the first change, not the removal.
    let behind = VersionVector::from_entries([(actor(1), 1)]);
    assert_eq!(doc.garbage_collect(&behind), 0);
    assert_eq!(doc.garbage_length(), 1);

    // The legacy ticket boundary works too.
    let ticket = TimeTicket::new(2, u32::MAX, ActorId::MAX);
    assert_eq!(doc.garbage_collect(&ticket), 1);
    assert_eq!(doc.garbage_length(), 0);
}

#[test]
fn disabled_gc_collects_nothing() {
    let options = DocumentOptions::new().with_disable_gc(true);
    let mut doc = Document::with_options("doc", options);
    doc.set_actor(actor(1));
    doc.update(|root, _| root.set("a", 1)).unwrap();
    doc.update(|root, _| root.remove("a")).unwrap();

    let full = doc.version_vector().clone();
    assert_eq!(doc.garbage_collect(&full), 0);
    assert_eq!(doc.garbage_length(), 1);
    assert_eq!(doc.to_json_value(), json!({}));
}

#[test]
fn removing_a_missing_key_is_a_no_op() {
    let mut doc = replica(1);
    let change = doc.update(|root, _| root.remove("nothing")).unwrap();
    assert!(change.is_none());
    assert!(!doc.has_local_changes());
}

#[test]
fn reads_inside_an_update_see_its_writes() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        let mut obj = root.set_new_object("obj")?;
        obj.set("k", "v")?;
        assert_eq!(obj.get("k"), Some(json!("v")));
        assert_eq!(root.keys(), vec!["obj".to_string()]);
        assert!(root.has("obj"));
        assert_eq!(root.get_object("obj")?.to_json_value(), json!({"k": "v"}));
        return Ok(());
    })
    .unwrap();
}

#[test]
fn wrong_kind_is_a_structural_error() {
    let mut doc = replica(1);
    doc.update(|root, _| root.set("n", 1)).unwrap();
    let err = doc
        .update(|root, _| {
            root.get_array("n")?;
            return Ok(());
        })
        .unwrap_err();
    assert!(err.is_structural());
    assert!(matches!(err, Error::TypeMismatch { expected: "array", actual: "primitive" }));
}

#[test]
fn failed_updates_roll_back() {
    let mut doc = replica(1);
    doc.update(|root, _| root.set("a", 1)).unwrap();
    let before = doc.to_json();
    let size = doc.doc_size();

    let result = doc.update(|root, _| {
        root.set("b", 2)?;
        let mut array = root.set_new_array("c")?;
        array.remove(5)?;
        return Ok(());
    });
    assert!(matches!(result, Err(Error::IndexOutOfRange { index: 5, len: 0 })));
    assert_eq!(doc.to_json(), before);
    assert_eq!(doc.doc_size(), size);
    assert_eq!(doc.local_changes().len(), 1);
}

#[test]
fn array_editing() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        let mut list = root.set_new_array("list")?;
        for i in 0..4 {
            list.push(i)?;
        }
        list.insert(1, 9)?;
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.get_value_by_path("$.list"), Some(json!([0, 9, 1, 2, 3])));

    doc.update(|root, _| {
        let mut list = root.get_array("list")?;
        list.move_front(4)?;
        list.move_last(1)?;
        list.set(0, "three")?;
        list.remove(1)?;
        assert_eq!(list.len(), 4);
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.get_value_by_path("$.list"), Some(json!(["three", 1, 2, 0])));
    assert_eq!(doc.get_value_by_path("$.list.2"), Some(json!(2)));
    assert_eq!(doc.get_value_by_path("$.missing"), None);
    assert_eq!(doc.doc_size(), doc.root().compute_doc_size());
}

#[test]
fn primitives_render_as_json() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        root.set("null", Primitive::Null)?;
        root.set("bool", true)?;
        root.set("long", 1i64 << 40)?;
        root.set("double", 1.5)?;
        root.set("bytes", vec![0xdeu8, 0xad])?;
        root.set("date", Primitive::Date(0))?;
        root.set_json("plain", &json!({"nested": [1, "two"]}))?;
        return Ok(());
    })
    .unwrap();
    assert_eq!(
        doc.to_json_value(),
        json!({
            "bool": true,
            "bytes": "dead",
            "date": "1970-01-01T00:00:00.000Z",
            "double": 1.5,
            "long": 1099511627776i64,
            "null": null,
            "plain": {"nested": [1, "two"]},
        })
    );
}

// =============================================================================
// Counters and text
// =============================================================================

#[test]
fn counters_add_up() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        let mut counter = root.set_new_counter("n", 10)?;
        counter.increase(5)?;
        counter.increase(-3)?;
        assert_eq!(counter.value(), Some(Primitive::Int(12)));
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.to_json_value(), json!({"n": 12}));

    let err = doc
        .update(|root, _| root.get_counter("n")?.increase("one"))
        .unwrap_err();
    assert!(err.is_structural());
}

#[test]
fn styled_edit_splits_runs() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        let mut text = root.set_new_text("k1")?;
        text.edit(0, 0, "Hello World")?;
        return Ok(());
    })
    .unwrap();

    doc.update(|root, _| {
        let mut text = root.get_text("k1")?;
        text.edit_with_attributes(6, 11, "Yorkie", &attrs(&[("b", "1")]))?;
        assert_eq!(text.value(), "Hello Yorkie");
        return Ok(());
    })
    .unwrap();
    assert_eq!(
        doc.get_value_by_path("$.k1"),
        Some(json!([{"val": "Hello "}, {"attrs": {"b": "1"}, "val": "Yorkie"}]))
    );
    assert_eq!(doc.garbage_length(), 1);
    assert_eq!(doc.doc_size(), doc.root().compute_doc_size());
}

#[test]
fn inverted_ranges_are_rejected() {
    let mut doc = replica(1);
    doc.update(|root, _| root.set_new_text("t")?.edit(0, 0, "abc")).unwrap();
    let err = doc
        .update(|root, _| root.get_text("t")?.edit(2, 1, "x"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRange { from: 2, to: 1 }));
}

#[test]
fn selections_do_not_touch_content() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        let mut text = root.set_new_text("t")?;
        text.edit(0, 0, "abcdef")?;
        text.select(1, 3)?;
        assert_eq!(text.selection(), Some((1, 3)));
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.to_json_value(), json!({"t": [{"val": "abcdef"}]}));
}

// =============================================================================
// Quota and schema
// =============================================================================

#[test]
fn local_updates_over_quota_are_rejected() {
    let options = DocumentOptions::new().with_max_size_per_document(76);
    let mut doc = Document::with_options("doc", options);
    doc.set_actor(actor(1));

    doc.update(|root, _| {
        root.set_new_text("t")?;
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.doc_size().live.total(), 48);

    let err = doc
        .update(|root, _| root.get_text("t")?.edit(0, 0, "helloworld"))
        .unwrap_err();
    assert!(err.is_policy());
    assert!(matches!(err, Error::DocumentSizeExceeded { size: 92, limit: 76 }));
    assert_eq!(doc.to_json_value(), json!({"t": []}));
    assert_eq!(doc.doc_size().live.total(), 48);
}

#[test]
fn schema_violations_roll_back() {
    let mut doc = replica(1);
    doc.set_validator(|root: &tandem::crdt::root::CrdtRoot| {
        if root.to_json_value().get("forbidden").is_some() {
            return Err("forbidden is not allowed".to_string());
        }
        return Ok(());
    });

    doc.update(|root, _| root.set("fine", 1)).unwrap();
    let err = doc.update(|root, _| root.set("forbidden", 1)).unwrap_err();
    assert!(err.is_policy());
    assert_eq!(err.to_string(), "schema violation: forbidden is not allowed");
    assert_eq!(doc.to_json_value(), json!({"fine": 1}));
}

// =============================================================================
// History
// =============================================================================

#[test]
fn undo_and_redo_object_edits() {
    let mut doc = replica(1);
    doc.update(|root, _| root.set("a", 1)).unwrap();
    doc.update(|root, _| {
        root.set("a", 2)?;
        let mut obj = root.set_new_object("b")?;
        obj.set("c", 3)?;
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.to_json_value(), json!({"a": 2, "b": {"c": 3}}));

    doc.undo().unwrap();
    assert_eq!(doc.to_json_value(), json!({"a": 1}));
    assert!(doc.can_redo());

    doc.redo().unwrap();
    assert_eq!(doc.to_json_value(), json!({"a": 2, "b": {"c": 3}}));

    doc.undo().unwrap();
    doc.undo().unwrap();
    assert_eq!(doc.to_json_value(), json!({}));
    assert!(matches!(doc.undo(), Err(Error::EmptyHistory("undo"))));
}

#[test]
fn undo_array_and_counter_edits() {
    let mut doc = replica(1);
    doc.update(|root, _| {
        let mut list = root.set_new_array("list")?;
        list.push("a")?;
        list.push("b")?;
        root.set_new_counter("n", 0)?;
        return Ok(());
    })
    .unwrap();

    doc.update(|root, _| {
        root.get_array("list")?.remove(0)?;
        root.get_array("list")?.push("c")?;
        root.get_counter("n")?.increase(7)?;
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.to_json_value(), json!({"list": ["b", "c"], "n": 7}));

    doc.undo().unwrap();
    assert_eq!(doc.to_json_value(), json!({"list": ["a", "b"], "n": 0}));

    doc.redo().unwrap();
    assert_eq!(doc.to_json_value(), json!({"list": ["b", "c"], "n": 7}));
}

#[test]
fn a_new_update_clears_redo() {
    let mut doc = replica(1);
    doc.update(|root, _| root.set("a", 1)).unwrap();
    doc.undo().unwrap();
    assert!(doc.can_redo());
    doc.update(|root, _| root.set("b", 1)).unwrap();
    assert!(!doc.can_redo());
    assert!(matches!(doc.redo(), Err(Error::EmptyHistory("redo"))));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn set_actor_rebinds_pending_changes() {
    let mut doc = Document::new("doc");
    doc.update(|root, _| {
        root.set("a", 1)?;
        root.set_new_text("t")?.edit(0, 0, "hi")?;
        return Ok(());
    })
    .unwrap();
    assert_eq!(doc.actor(), ActorId::INITIAL);

    doc.set_actor(actor(7));
    assert_eq!(doc.actor(), actor(7));
    for change in doc.local_changes() {
        assert_eq!(change.id().actor(), actor(7));
    }
    assert_eq!(doc.to_json_value(), json!({"a": 1, "t": [{"val": "hi"}]}));
    assert_eq!(doc.version_vector().get(&actor(7)), Some(1));

    let pack = doc.create_change_pack(false);
    assert_eq!(pack.changes_len(), 1);
    assert_eq!(pack.checkpoint.client_seq, 1);
}

#[test]
fn removed_documents_reject_updates() {
    let mut doc = replica(1);
    let mut pack = tandem::ChangePack::new("doc", tandem::Checkpoint::INITIAL, Vec::new());
    pack.is_removed = true;
    doc.apply_change_pack(&pack).unwrap();
    assert_eq!(doc.status(), DocumentStatus::Removed);

    let err = doc.update(|root, _| root.set("a", 1)).unwrap_err();
    assert!(matches!(err, Error::DocumentRemoved));
}

#[test]
fn presence_rides_along() {
    let mut doc = replica(1);
    let change = doc
        .update(|_, presence| {
            presence.set("cursor", "4");
            return Ok(());
        })
        .unwrap()
        .unwrap();
    assert!(!change.has_operations());
    assert_eq!(doc.presence(&actor(1)).and_then(|p| p.get("cursor")), Some("4"));

    doc.update(|_, presence| {
        presence.clear();
        return Ok(());
    })
    .unwrap();
    assert!(doc.presence(&actor(1)).is_none());
}

#[test]
fn values_write_whole_subtrees() {
    let mut doc = replica(1);
    let value = Value::Object(
        [
            ("list".to_string(), Value::Array(vec![Value::from(Primitive::Int(1))])),
            (
                "text".to_string(),
                Value::Text(vec![("hi".to_string(), attrs(&[("i", "1")]))]),
            ),
        ]
        .into_iter()
        .collect(),
    );
    doc.update(|root, _| root.set_value("v", &value)).unwrap();
    assert_eq!(
        doc.to_json_value(),
        json!({"v": {"list": [1], "text": [{"attrs": {"i": "1"}, "val": "hi"}]}})
    );
    assert_eq!(doc.doc_size(), doc.root().compute_doc_size());
}
