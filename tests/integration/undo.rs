//! Undo/redo integration tests
//!
//! Every edit kind must round-trip: apply, undo back to the earlier state,
//! redo forward to the same state as applying once.

use crate::helpers::*;
use ensemble::prelude::*;
use ensemble::Seq;

type Snapshot = (Vec<(Path, Properties)>, Vec<(Path, Path)>);

/// Apply `edit`, then check undo and redo against snapshots.
fn assert_round_trip(h: &Harness, edit: impl FnOnce(&Harness) -> Seq) {
    let before: Snapshot = h.engine.snapshot();
    let seq = edit(h);
    assert_eq!(h.status(seq), Status::Success);
    let after = h.engine.snapshot();
    assert_ne!(before, after, "edit changed nothing");

    assert_eq!(h.status(h.session.undo()), Status::Success);
    assert_eq!(h.engine.snapshot(), before);

    assert_eq!(h.status(h.session.redo()), Status::Success);
    assert_eq!(h.engine.snapshot(), after);
}

#[test]
fn test_put_round_trip() {
    let h = Harness::new();
    assert_round_trip(&h, |h| h.add_block("/amp", GAIN));
}

#[test]
fn test_graph_with_children_round_trip() {
    let h = Harness::new();
    h.session.put("/g", graph(), Context::Default);
    h.session.put("/g/amp", block(GAIN), Context::Default);
    h.add_port("/g/in", uris::INPUT_PORT, uris::AUDIO_PORT);
    h.connect("/g/in", "/g/amp/in");
    h.flush();
    assert_round_trip(&h, |h| h.session.del("/g"));
}

#[test]
fn test_delta_round_trip() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    assert_round_trip(&h, |h| {
        h.session.delta(
            "/amp",
            Properties::new(),
            Properties::new().with(uris::NAME, Atom::string("Boost")),
            Context::Default,
        )
    });
}

#[test]
fn test_connect_round_trip() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.add_block("/amp2", GAIN);
    h.flush();
    assert_round_trip(&h, |h| h.connect("/src/out", "/amp2/in"));
}

#[test]
fn test_disconnect_round_trip() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    assert_round_trip(&h, |h| h.session.disconnect(path("/src/out"), path("/amp/in")));
}

#[test]
fn test_disconnect_all_round_trip() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    assert_round_trip(&h, |h| h.session.disconnect_all(Path::root(), path("/amp")));
    assert_eq!(h.engine.num_arcs(), 0);
}

#[test]
fn test_move_round_trip() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    assert_round_trip(&h, |h| h.session.move_object(path("/amp"), path("/boost")));
}

#[test]
fn test_delete_round_trip() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    assert_round_trip(&h, |h| h.session.del("/amp"));

    // redo deleted it again; undo once more and the signal is back
    assert_eq!(h.status(h.session.undo()), Status::Success);
    h.cycle();
    let out = h.output(0);
    assert!(out.iter().all(|&s| (s - 1.0).abs() < FLOAT_EPSILON));
}

/// Connect, disconnect, undo: the arc exists again.
#[test]
fn test_undo_disconnect_restores_arc() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.add_block("/amp2", GAIN);
    h.connect("/src/out", "/amp2/in");
    h.session.disconnect(path("/src/out"), path("/amp2/in"));
    h.flush();
    assert!(!h.engine.has_arc(&path("/src/out"), &path("/amp2/in")));

    assert_eq!(h.status(h.session.undo()), Status::Success);
    assert!(h.engine.has_arc(&path("/src/out"), &path("/amp2/in")));
}

/// A delta replacing a name is undone to the old name.
#[test]
fn test_delta_rename_and_undo() {
    let h = Harness::new();
    h.session.put(
        "/amp",
        block(GAIN).with(uris::NAME, Atom::string("Old")),
        Context::Default,
    );
    h.flush();

    let seq = h.session.delta(
        "/amp",
        Properties::new().with(uris::NAME, Atom::string("Old")),
        Properties::new().with(uris::NAME, Atom::string("New")),
        Context::Default,
    );
    assert_eq!(h.status(seq), Status::Success);
    assert_eq!(h.props("/amp").get(uris::NAME), Some(&Atom::string("New")));

    assert_eq!(h.status(h.session.undo()), Status::Success);
    assert_eq!(h.props("/amp").get(uris::NAME), Some(&Atom::string("Old")));
}

/// One undo reverses a whole bundle.
#[test]
fn test_bundle_undoes_in_one_step() {
    let h = Harness::new();
    let before = h.engine.snapshot();

    h.session.bundle_begin();
    h.add_block("/a", GAIN);
    h.add_block("/b", GAIN);
    h.add_block("/c", SOURCE);
    h.session.bundle_end();
    h.flush();
    for at in ["/a", "/b", "/c"] {
        assert!(h.exists(at));
    }
    let after = h.engine.snapshot();

    assert_eq!(h.status(h.session.undo()), Status::Success);
    assert_eq!(h.engine.snapshot(), before);
    assert!(!h.engine.can_undo());

    assert_eq!(h.status(h.session.redo()), Status::Success);
    assert_eq!(h.engine.snapshot(), after);
}

/// Dragging a control produces many edits but one undo step.
#[test]
fn test_repeated_value_edits_merge() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    // an unrelated edit, so the drag does not merge into the chain setup
    h.set_value("/src/level", 0.75);
    h.flush();
    for v in [3.0, 4.0, 5.0] {
        h.set_value("/amp/gain", v);
        h.flush();
    }
    assert_eq!(h.props("/amp/gain").get(uris::VALUE), Some(&Atom::float(5.0)));

    assert_eq!(h.status(h.session.undo()), Status::Success);
    assert_eq!(h.props("/amp/gain").get(uris::VALUE), Some(&Atom::float(2.0)));
    assert_eq!(h.engine.port_value(&path("/amp/gain")), Some(2.0));
}

#[test]
fn test_undo_with_empty_history() {
    let h = Harness::new();
    assert!(!h.engine.can_undo());
    assert_eq!(h.status(h.session.undo()), Status::NotFound);
    assert_eq!(h.status(h.session.redo()), Status::NotFound);
}

#[test]
fn test_failed_edits_are_not_recorded() {
    let h = Harness::new();
    assert_eq!(h.status(h.session.del("/missing")), Status::NotFound);
    assert!(!h.engine.can_undo());
}

#[test]
fn test_new_edit_clears_redo() {
    let h = Harness::new();
    h.add_block("/a", GAIN);
    h.flush();
    h.session.undo();
    h.flush();
    assert!(h.engine.can_redo());

    h.add_block("/b", GAIN);
    h.flush();
    assert!(!h.engine.can_redo());
}

/// An undo queued right behind an edit still sees that edit.
#[test]
fn test_undo_waits_for_earlier_events() {
    let h = Harness::new();
    let put = h.add_block("/a", GAIN);
    let undo = h.session.undo();
    h.flush();

    let statuses: Vec<_> = h
        .inbox
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            Message::Response { id, status, .. } => Some((id, status)),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, [(put, Status::Success), (undo, Status::Success)]);
    assert!(!h.exists("/a"));
}
