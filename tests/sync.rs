//! Replicas editing concurrently and exchanging changes.

use serde_json::json;
use tandem::ActorId;
use tandem::Change;
use tandem::ChangePack;
use tandem::Checkpoint;
use tandem::Document;
use tandem::DocumentOptions;
use tandem::DocumentStatus;

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

/// Deliver everything `from` has committed. Already applied changes are
/// skipped by the receiver.
fn push(from: &Document, to: &mut Document) {
    let pack = ChangePack::new(from.key(), Checkpoint::INITIAL, from.local_changes().to_vec());
    to.apply_change_pack(&pack).unwrap();
}

fn sync(a: &mut Document, b: &mut Document) {
    push(a, b);
    push(b, a);
}

fn deliver(to: &mut Document, changes: &[Change]) {
    let pack = ChangePack::new(to.key(), Checkpoint::INITIAL, changes.to_vec());
    to.apply_change_pack(&pack).unwrap();
}

/// Every merge of queues of the given lengths that keeps each queue's own
/// order, as a sequence of queue numbers.
fn interleavings(counts: &[usize]) -> Vec<Vec<usize>> {
    if counts.iter().all(|count| *count == 0) {
        return vec![Vec::new()];
    }
    let mut orders = Vec::new();
    for (queue, count) in counts.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let mut rest = counts.to_vec();
        rest[queue] -= 1;
        for tail in interleavings(&rest) {
            let mut order = vec![queue];
            order.extend(tail);
            orders.push(order);
        }
    }
    return orders;
}

/// Visible content of the text at `$.t`.
fn text_of(doc: &Document) -> String {
    let runs = doc.get_value_by_path("$.t").unwrap_or_default();
    return match runs.as_array() {
        Some(runs) => runs.iter().filter_map(|run| run["val"].as_str()).collect(),
        None => String::new(),
    };
}

fn text_doc(content: &str) -> (Document, Document) {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, _| root.set_new_text("t")?.edit(0, 0, content)).unwrap();
    push(&a, &mut b);
    return (a, b);
}

// =============================================================================
// Text
// =============================================================================

#[test]
fn concurrent_edits_at_disjoint_ranges_commute() {
    let (mut a, mut b) = text_doc("Hello World");
    a.update(|root, _| root.get_text("t")?.edit(0, 0, "<")).unwrap();
    b.update(|root, _| root.get_text("t")?.edit(11, 11, ">")).unwrap();
    sync(&mut a, &mut b);

    assert_eq!(a.to_json(), b.to_json());
    assert_eq!(text_of(&a), "<Hello World>");
}

#[test]
fn deletes_spare_unseen_inserts() {
    let (mut a, mut b) = text_doc("Hello");
    a.update(|root, _| root.get_text("t")?.edit(2, 2, "X")).unwrap();
    b.update(|root, _| root.get_text("t")?.edit(0, 5, "")).unwrap();
    sync(&mut a, &mut b);

    assert_eq!(a.to_json(), b.to_json());
    assert_eq!(text_of(&a), "X");
}

#[test]
fn redelivery_is_harmless() {
    let (mut a, mut b) = text_doc("abc");
    a.update(|root, _| root.get_text("t")?.edit(3, 3, "d")).unwrap();
    push(&a, &mut b);
    push(&a, &mut b);
    assert_eq!(text_of(&b), "abcd");
}

// =============================================================================
// Objects, arrays, counters
// =============================================================================

#[test]
fn concurrent_sets_pick_the_later_ticket() {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, _| root.set("k", "a")).unwrap();
    b.update(|root, _| root.set("k", "b")).unwrap();
    sync(&mut a, &mut b);

    // Same lamport, so the larger actor wins.
    assert_eq!(a.to_json_value(), json!({"k": "b"}));
    assert_eq!(a.to_json(), b.to_json());
    assert_eq!(a.garbage_length(), 1);
    assert_eq!(b.garbage_length(), 1);
}

#[test]
fn double_removal_counts_once() {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, _| {
        let mut list = root.set_new_array("list")?;
        for i in 0..3 {
            list.push(i)?;
        }
        return Ok(());
    })
    .unwrap();
    push(&a, &mut b);

    a.update(|root, _| root.get_array("list")?.remove(1)).unwrap();
    b.update(|root, _| root.get_array("list")?.remove(1)).unwrap();
    assert_eq!(a.garbage_length(), 1);

    sync(&mut a, &mut b);
    assert_eq!(a.garbage_length(), 1);
    assert_eq!(b.garbage_length(), 1);
    assert_eq!(a.to_json_value(), json!({"list": [0, 2]}));
    assert_eq!(a.to_json(), b.to_json());
    assert_eq!(a.doc_size(), a.root().compute_doc_size());
}

#[test]
fn concurrent_moves_of_one_element_converge() {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, _| {
        let mut list = root.set_new_array("list")?;
        for i in 0..4 {
            list.push(i)?;
        }
        return Ok(());
    })
    .unwrap();
    push(&a, &mut b);

    a.update(|root, _| root.get_array("list")?.move_front(3)).unwrap();
    b.update(|root, _| root.get_array("list")?.move_after(3, 1)).unwrap();
    sync(&mut a, &mut b);

    assert_eq!(a.to_json(), b.to_json());
    // The later move wins.
    assert_eq!(a.to_json_value(), json!({"list": [0, 1, 3, 2]}));
}

#[test]
fn three_replicas_moving_one_list_agree_in_every_delivery_order() {
    let mut a = replica(1);
    let mut b = replica(2);
    let mut c = replica(3);
    a.update(|root, _| {
        let mut list = root.set_new_array("list")?;
        for i in 0..4 {
            list.push(i)?;
        }
        return Ok(());
    })
    .unwrap();
    push(&a, &mut b);
    push(&a, &mut c);
    let seed = a.local_changes().len();

    a.update(|root, _| root.get_array("list")?.move_front(3)).unwrap();
    a.update(|root, _| root.get_array("list")?.move_after(1, 2)).unwrap();
    b.update(|root, _| root.get_array("list")?.move_after(3, 1)).unwrap();
    b.update(|root, _| {
        root.get_array("list")?.set(2, 7)?;
        return Ok(());
    })
    .unwrap();
    c.update(|root, _| root.get_array("list")?.move_last(0)).unwrap();
    c.update(|root, _| root.get_array("list")?.move_front(2)).unwrap();

    let queues = [
        a.local_changes()[seed..].to_vec(),
        b.local_changes().to_vec(),
        c.local_changes().to_vec(),
    ];
    let mut outcomes = std::collections::BTreeSet::new();
    for order in interleavings(&[2, 2, 2]) {
        let mut observer = replica(9);
        deliver(&mut observer, &a.local_changes()[..seed]);
        let mut next = [0; 3];
        for queue in order {
            deliver(&mut observer, &queues[queue][next[queue]..=next[queue]]);
            next[queue] += 1;
        }
        outcomes.insert(observer.to_json());
    }
    assert_eq!(outcomes.len(), 1);

    sync(&mut a, &mut b);
    sync(&mut b, &mut c);
    sync(&mut a, &mut c);
    assert_eq!(a.to_json(), b.to_json());
    assert_eq!(b.to_json(), c.to_json());
    assert!(outcomes.contains(&a.to_json()));
}

#[test]
fn counters_merge_by_addition() {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, _| {
        root.set_new_counter("n", 0i64)?;
        return Ok(());
    })
    .unwrap();
    push(&a, &mut b);

    a.update(|root, _| root.get_counter("n")?.increase(2i64)).unwrap();
    b.update(|root, _| root.get_counter("n")?.increase(40i64)).unwrap();
    sync(&mut a, &mut b);
    assert_eq!(a.to_json_value(), json!({"n": 42}));
    assert_eq!(b.to_json_value(), json!({"n": 42}));
}

#[test]
fn edits_inside_a_concurrently_removed_container_are_dropped() {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, _| {
        root.set_new_object("obj")?.set("x", 1)?;
        return Ok(());
    })
    .unwrap();
    push(&a, &mut b);

    a.update(|root, _| root.remove("obj")).unwrap();
    b.update(|root, _| root.get_object("obj")?.set("y", 2)).unwrap();
    sync(&mut a, &mut b);

    assert_eq!(a.to_json_value(), json!({}));
    assert_eq!(a.to_json(), b.to_json());
}

// =============================================================================
// Quota, snapshots, packs
// =============================================================================

#[test]
fn remote_changes_bypass_the_quota() {
    let options = DocumentOptions::new().with_max_size_per_document(76);
    let mut a = Document::with_options("doc", options);
    a.set_actor(actor(1));
    let mut b = replica(2);

    a.update(|root, _| {
        root.set_new_text("t")?;
        return Ok(());
    })
    .unwrap();
    push(&a, &mut b);

    b.update(|root, _| root.get_text("t")?.edit(0, 0, "helloworld")).unwrap();
    push(&b, &mut a);

    assert_eq!(a.doc_size().live.total(), 92);
    assert_eq!(a.to_json_value(), json!({"t": [{"val": "helloworld"}]}));
}

#[test]
fn snapshots_replace_the_root_and_keep_pending_changes() {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, _| {
        root.set("a", 1)?;
        root.set_new_text("t")?.edit(0, 0, "snap")?;
        return Ok(());
    })
    .unwrap();
    b.update(|root, _| root.set("b", 2)).unwrap();

    let mut pack = ChangePack::new("doc", Checkpoint::new(10, 0), Vec::new());
    pack.snapshot = Some(a.snapshot().unwrap());
    b.apply_change_pack(&pack).unwrap();

    assert_eq!(b.to_json_value(), json!({"a": 1, "b": 2, "t": [{"val": "snap"}]}));
    assert_eq!(b.checkpoint(), Checkpoint::new(10, 0));
    assert!(b.change_id().lamport() >= a.change_id().lamport());

    // Further local edits stay ahead of anything in the snapshot.
    b.update(|root, _| root.set("a", 3)).unwrap();
    assert_eq!(b.get_value_by_path("$.a"), Some(json!(3)));
}

#[test]
fn acknowledged_changes_are_dropped_and_collected() {
    let mut a = replica(1);
    a.update(|root, _| root.set("a", 1)).unwrap();
    a.update(|root, _| root.remove("a")).unwrap();
    let sent = a.create_change_pack(false);
    assert_eq!(sent.changes_len(), 2);
    assert_eq!(sent.checkpoint, Checkpoint::new(0, 2));

    // What a server would answer once every replica has seen both.
    let mut reply = ChangePack::new("doc", Checkpoint::new(2, 2), Vec::new());
    reply.version_vector = Some(a.version_vector().clone());
    a.apply_change_pack(&reply).unwrap();

    assert!(!a.has_local_changes());
    assert_eq!(a.checkpoint(), Checkpoint::new(2, 2));
    assert_eq!(a.garbage_length(), 0);
    assert_eq!(a.status(), DocumentStatus::Detached);
}

#[test]
fn change_packs_survive_serialization() {
    let mut a = replica(1);
    let mut b = replica(2);
    a.update(|root, presence| {
        presence.set("name", "a");
        root.set_new_array("list")?.push("x")?;
        root.set_new_text("t")?.edit_with_attributes(0, 0, "bold", &[("b".to_string(), "1".to_string())].into())?;
        return Ok(());
    })
    .unwrap();

    let bytes = serde_json::to_vec(&a.create_change_pack(false)).unwrap();
    let pack: ChangePack = serde_json::from_slice(&bytes).unwrap();
    b.apply_change_pack(&pack).unwrap();

    assert_eq!(a.to_json(), b.to_json());
    assert_eq!(b.presence(&actor(1)).and_then(|p| p.get("name")), Some("a"));
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use proptest::prelude::*;
    use tandem::Change;
    use tandem::ChangePack;
    use tandem::Checkpoint;
    use tandem::Document;

    use super::push;
    use super::replica;

    #[derive(Clone, Debug)]
    enum Edit {
        Push(i32),
        Insert { at: f64, value: i32 },
        Remove { at: f64 },
        Move { at: f64, after: f64 },
        Front { at: f64 },
        Replace { at: f64, value: i32 },
        Type { at: f64, content: String },
        Erase { at: f64, len: f64 },
        Bold { at: f64, len: f64 },
        Put { key: u8, value: i32 },
        Delete { key: u8 },
        Bump(i32),
    }

    fn arbitrary_edit() -> impl Strategy<Value = Edit> {
        let pct = 0.0..1.0f64;
        return prop_oneof![
            any::<i32>().prop_map(Edit::Push),
            (pct.clone(), any::<i32>()).prop_map(|(at, value)| Edit::Insert { at, value }),
            pct.clone().prop_map(|at| Edit::Remove { at }),
            (pct.clone(), pct.clone()).prop_map(|(at, after)| Edit::Move { at, after }),
            pct.clone().prop_map(|at| Edit::Front { at }),
            (pct.clone(), any::<i32>()).prop_map(|(at, value)| Edit::Replace { at, value }),
            (pct.clone(), "[a-z]{1,4}").prop_map(|(at, content)| Edit::Type { at, content }),
            (pct.clone(), 0.0..0.5f64).prop_map(|(at, len)| Edit::Erase { at, len }),
            (pct.clone(), 0.0..0.5f64).prop_map(|(at, len)| Edit::Bold { at, len }),
            (0u8..3, any::<i32>()).prop_map(|(key, value)| Edit::Put { key, value }),
            (0u8..3).prop_map(|key| Edit::Delete { key }),
            (-100i32..100).prop_map(Edit::Bump),
        ];
    }

    fn scale(pct: f64, len: usize) -> usize {
        return ((pct * len as f64) as usize).min(len);
    }

    fn apply(doc: &mut Document, edit: &Edit) {
        doc.update(|root, _| {
            match edit {
                Edit::Push(value) => {
                    root.get_array("list")?.push(*value)?;
                }
                Edit::Insert { at, value } => {
                    let mut list = root.get_array("list")?;
                    let index = scale(*at, list.len());
                    list.insert(index, *value)?;
                }
                Edit::Remove { at } => {
                    let mut list = root.get_array("list")?;
                    if !list.is_empty() {
                        let index = scale(*at, list.len() - 1);
                        list.remove(index)?;
                    }
                }
                Edit::Move { at, after } => {
                    let mut list = root.get_array("list")?;
                    if !list.is_empty() {
                        let last = list.len() - 1;
                        list.move_after(scale(*at, last), scale(*after, last))?;
                    }
                }
                Edit::Front { at } => {
                    let mut list = root.get_array("list")?;
                    if !list.is_empty() {
                        let index = scale(*at, list.len() - 1);
                        list.move_front(index)?;
                    }
                }
                Edit::Replace { at, value } => {
                    let mut list = root.get_array("list")?;
                    if !list.is_empty() {
                        let index = scale(*at, list.len() - 1);
                        list.set(index, *value)?;
                    }
                }
                Edit::Type { at, content } => {
                    let mut text = root.get_text("text")?;
                    let index = scale(*at, text.len());
                    text.edit(index, index, content)?;
                }
                Edit::Erase { at, len } => {
                    let mut text = root.get_text("text")?;
                    let from = scale(*at, text.len());
                    let to = from + scale(*len, text.len() - from);
                    if to > from {
                        text.edit(from, to, "")?;
                    }
                }
                Edit::Bold { at, len } => {
                    let mut text = root.get_text("text")?;
                    let from = scale(*at, text.len());
                    let to = from + scale(*len, text.len() - from);
                    if to > from {
                        let attrs = [("b".to_string(), "1".to_string())].into();
                        text.style(from, to, &attrs)?;
                    }
                }
                Edit::Put { key, value } => {
                    root.get_object("map")?.set(&key.to_string(), *value)?;
                }
                Edit::Delete { key } => {
                    root.get_object("map")?.remove(&key.to_string())?;
                }
                Edit::Bump(delta) => {
                    root.get_counter("n")?.increase(i64::from(*delta))?;
                }
            }
            return Ok(());
        })
        .unwrap();
    }

    fn seed(doc: &mut Document) {
        doc.update(|root, _| {
            let mut list = root.set_new_array("list")?;
            for i in 0..4 {
                list.push(i)?;
            }
            root.set_new_text("text")?.edit(0, 0, "abcdef")?;
            root.set_new_object("map")?;
            root.set_new_counter("n", 0i64)?;
            return Ok(());
        })
        .unwrap();
    }

    fn seeded() -> (Document, Document) {
        let mut a = replica(1);
        let mut b = replica(2);
        seed(&mut a);
        push(&a, &mut b);
        return (a, b);
    }

    #[derive(Clone, Debug)]
    enum Action {
        Edit(Edit),
        /// Pass everything the acting replica has seen on to `to`.
        Relay { to: usize },
    }

    fn arbitrary_action() -> impl Strategy<Value = Action> {
        let pct = 0.0..1.0f64;
        return prop_oneof![
            3 => arbitrary_edit().prop_map(Action::Edit),
            2 => (pct.clone(), pct).prop_map(|(at, after)| Action::Edit(Edit::Move { at, after })),
            2 => (0usize..3).prop_map(|to| Action::Relay { to }),
        ];
    }

    /// Replicas that exchange changes peer to peer. Changes are logged in
    /// the order they were made, so relaying in log order is causal.
    struct Network {
        docs: Vec<Document>,
        log: Vec<Change>,
        seen: Vec<Vec<bool>>,
    }

    impl Network {
        fn new(size: u8) -> Network {
            let mut network = Network {
                docs: (1..=size).map(replica).collect(),
                log: Vec::new(),
                seen: vec![Vec::new(); size as usize],
            };
            seed(&mut network.docs[0]);
            network.record(0, 0);
            for to in 1..network.docs.len() {
                network.relay(0, to);
            }
            return network;
        }

        fn edit(&mut self, who: usize, edit: &Edit) {
            let before = self.docs[who].local_changes().len();
            apply(&mut self.docs[who], edit);
            self.record(who, before);
        }

        fn record(&mut self, who: usize, before: usize) {
            let made = self.docs[who].local_changes()[before..].to_vec();
            for change in made {
                self.log.push(change);
                for (replica, seen) in self.seen.iter_mut().enumerate() {
                    seen.push(replica == who);
                }
            }
        }

        fn relay(&mut self, from: usize, to: usize) {
            for i in 0..self.log.len() {
                if self.seen[from][i] && !self.seen[to][i] {
                    let pack = ChangePack::new("doc", Checkpoint::INITIAL, vec![self.log[i].clone()]);
                    self.docs[to].apply_change_pack(&pack).unwrap();
                    self.seen[to][i] = true;
                }
            }
        }

        fn relay_all(&mut self) {
            for to in 0..self.docs.len() {
                for from in 0..self.docs.len() {
                    self.relay(from, to);
                }
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn replicas_converge(
            left in prop::collection::vec(arbitrary_edit(), 1..12),
            right in prop::collection::vec(arbitrary_edit(), 1..12),
        ) {
            let (mut a, mut b) = seeded();
            for edit in &left {
                apply(&mut a, edit);
            }
            for edit in &right {
                apply(&mut b, edit);
            }
            push(&a, &mut b);
            push(&b, &mut a);

            prop_assert_eq!(a.to_json(), b.to_json());
        }

        #[test]
        fn running_sizes_match_a_full_traversal(
            left in prop::collection::vec(arbitrary_edit(), 1..12),
            right in prop::collection::vec(arbitrary_edit(), 1..12),
        ) {
            let (mut a, mut b) = seeded();
            for edit in &left {
                apply(&mut a, edit);
            }
            for edit in &right {
                apply(&mut b, edit);
            }
            push(&b, &mut a);
            prop_assert_eq!(a.doc_size(), a.root().compute_doc_size());
            prop_assert_eq!(a.root().deep_copy().compute_doc_size(), a.doc_size());

            let live = a.doc_size().live;
            let full = a.version_vector().clone();
            a.garbage_collect(&full);
            prop_assert_eq!(a.garbage_length(), 0);
            prop_assert_eq!(a.doc_size().live, live);
            prop_assert_eq!(a.doc_size(), a.root().compute_doc_size());
        }

        #[test]
        fn three_replicas_converge_under_causal_relay(
            actions in prop::collection::vec((0usize..3, arbitrary_action()), 1..32),
        ) {
            let mut network = Network::new(3);
            for (who, action) in &actions {
                match action {
                    Action::Edit(edit) => network.edit(*who, edit),
                    Action::Relay { to } => network.relay(*who, *to),
                }
            }
            network.relay_all();

            let json = network.docs[0].to_json();
            for doc in &network.docs[1..] {
                prop_assert_eq!(doc.to_json(), json.clone());
                prop_assert_eq!(doc.doc_size(), doc.root().compute_doc_size());
            }
        }
    }
}
