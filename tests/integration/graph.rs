//! Graph integration tests
//!
//! Object creation, routing and signal flow through the root output port.

use crate::helpers::*;
use approx::assert_relative_eq;
use ensemble::core::types;
use ensemble::prelude::*;
use ensemble::InternalFactory;

fn assert_constant(samples: &[f32], value: f32) {
    assert_eq!(samples.len(), TEST_BLOCK_LENGTH as usize);
    for &s in samples {
        assert_relative_eq!(s, value, epsilon = FLOAT_EPSILON);
    }
}

/// Source into Gain into the root output.
#[test]
fn test_chain_produces_scaled_signal() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);

    h.cycle();
    assert_constant(&h.output(0), 1.0);
}

/// A value edit is heard on the next cycle.
#[test]
fn test_live_value_edit() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.cycle();

    h.set_value("/amp/gain", 3.0);
    h.flush();
    h.cycle();
    assert_constant(&h.output(0), 1.5);
    assert_eq!(h.props("/amp/gain").get(uris::VALUE), Some(&Atom::float(3.0)));
}

/// Put on an existing path answers EXISTS with the second sequence number.
#[test]
fn test_put_existing_path_is_exists() {
    let h = Harness::new();
    let first = h.add_block("/a", GAIN);
    let second = h.add_block("/a", SOURCE);
    h.flush();

    let got = h.inbox.drain();
    assert_eq!(
        got,
        [
            Message::Response {
                id: first,
                status: Status::Success,
                subject: "/a".into(),
            },
            Message::Response {
                id: second,
                status: Status::Exists,
                subject: "/a".into(),
            },
        ]
    );
    assert_eq!(h.props("/a").get(uris::PROTOTYPE), Some(&Atom::uri(GAIN)));
}

#[test]
fn test_block_ports_come_from_prototype() {
    let h = Harness::new();
    assert_eq!(h.status(h.add_block("/amp", GAIN)), Status::Success);
    for symbol in ["in", "gain", "out"] {
        assert!(h.exists(&format!("/amp/{symbol}")));
    }
    let gain = h.props("/amp/gain");
    assert!(gain.contains(uris::TYPE, &Atom::uri(uris::CONTROL_PORT)));
    assert_eq!(gain.get(uris::INDEX), Some(&Atom::int(1)));
    assert_eq!(gain.get(uris::VALUE), Some(&Atom::float(1.0)));
}

#[test]
fn test_unknown_prototype() {
    let h = Harness::new();
    assert_eq!(h.status(h.add_block("/x", "test:Nope")), Status::PrototypeNotFound);
    assert!(!h.exists("/x"));
}

#[test]
fn test_disconnect_silences_output() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);

    let seq = h.session.disconnect(path("/amp/out"), path("/out"));
    assert_eq!(h.status(seq), Status::Success);
    assert!(!h.engine.has_arc(&path("/amp/out"), &path("/out")));
    h.cycle();
    assert_constant(&h.output(0), 0.0);
}

#[test]
fn test_delete_block_removes_ports_and_arcs() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    let before = h.engine.num_objects();

    assert_eq!(h.status(h.session.del("/amp")), Status::Success);
    assert!(!h.exists("/amp"));
    assert!(!h.exists("/amp/gain"));
    assert_eq!(h.engine.num_objects(), before - 4);
    assert_eq!(h.engine.num_arcs(), 0);

    h.cycle();
    assert_constant(&h.output(0), 0.0);
}

#[test]
fn test_root_is_not_deletable() {
    let h = Harness::new();
    assert_eq!(h.status(h.session.del("/")), Status::NotDeletable);
}

#[test]
fn test_move_keeps_connections() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);

    let seq = h.session.move_object(path("/amp"), path("/boost"));
    assert_eq!(h.status(seq), Status::Success);
    assert!(!h.exists("/amp"));
    assert!(h.engine.has_arc(&path("/src/out"), &path("/boost/in")));
    assert!(h.engine.has_arc(&path("/boost/out"), &path("/out")));

    h.cycle();
    assert_constant(&h.output(0), 1.0);
}

#[test]
fn test_copy_duplicates_values() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);

    assert_eq!(h.status(h.session.copy("/amp", "/amp2")), Status::Success);
    assert_eq!(h.props("/amp2/gain").get(uris::VALUE), Some(&Atom::float(2.0)));
    // the copy is unconnected
    assert!(!h.engine.has_arc(&path("/src/out"), &path("/amp2/in")));
}

#[test]
fn test_connection_errors() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.add_block("/ctl", InternalFactory::CONTROLLER);
    h.flush();

    assert_eq!(h.status(h.connect("/src/out", "/amp/in")), Status::Exists);
    assert_eq!(h.status(h.connect("/amp/in", "/src/out")), Status::DirectionMismatch);
    assert_eq!(h.status(h.connect("/src/out", "/ctl/input")), Status::TypeMismatch);
    assert_eq!(h.status(h.connect("/src/out", "/nope/in")), Status::NotFound);
}

/// An arc closing a cycle is refused and leaves the graph as it was.
#[test]
fn test_feedback_is_rejected() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    let (objects, arcs) = h.engine.snapshot();

    assert_eq!(h.status(h.connect("/amp/out", "/src/level")), Status::Failure);
    assert_eq!(h.engine.snapshot(), (objects, arcs));
    h.cycle();
    assert_constant(&h.output(0), 1.0);
}

/// Builds `/g` with a polyphonic source feeding the mono `/g/out`.
fn build_poly(h: &Harness, voices: i32) {
    h.session.put(
        "/g",
        graph().with(uris::POLYPHONY, Atom::int(voices)),
        Context::Default,
    );
    h.session.put(
        "/g/src",
        block(SOURCE).with(uris::POLYPHONIC, Atom::bool(true)),
        Context::Default,
    );
    h.add_port("/g/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.add_port("/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.connect("/g/src/out", "/g/out");
    h.connect("/g/out", "/out");
    h.set_value("/g/src/level", 0.25);
    h.flush();
    h.inbox.drain();
}

/// Every voice of a polyphonic block mixes into a mono port.
#[test]
fn test_poly_output_mixes_into_mono() {
    let h = Harness::new();
    build_poly(&h, 4);

    h.cycle();
    assert_constant(&h.output(0), 1.0);

    let seq = h
        .session
        .set_property("/g", uris::POLYPHONY, Atom::int(2), Context::Default);
    assert_eq!(h.status(seq), Status::Success);
    h.cycle();
    assert_constant(&h.output(0), 0.5);
}

/// A polyphonic Note spreads held notes over its voices.
#[test]
fn test_note_spreads_notes_over_voices() {
    let h = Harness::new();
    let seq = h
        .session
        .set_property("/", uris::POLYPHONY, Atom::int(2), Context::Default);
    assert_eq!(h.status(seq), Status::Success);
    h.add_port("/midi", uris::INPUT_PORT, uris::ATOM_PORT);
    h.add_port("/gate", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.session.put(
        "/note",
        block(InternalFactory::NOTE).with(uris::POLYPHONIC, Atom::bool(true)),
        Context::Default,
    );
    h.connect("/midi", "/note/input");
    h.connect("/note/gate", "/gate");
    h.flush();

    let mut driver = h.engine.take_process_handle().expect("driver available");
    let note_on = |note: u8| Atom::from_bytes(types::MIDI_EVENT, &[0x90, note, 100]);
    assert!(driver.write_event(0, 0, &note_on(60)).unwrap());
    assert!(driver.write_event(0, 16, &note_on(64)).unwrap());
    driver.run_cycle(TEST_BLOCK_LENGTH).unwrap();
    h.engine.post_process();

    // one voice per held note, summed into the mono output
    let mut gate = vec![0.0; TEST_BLOCK_LENGTH as usize];
    driver.read_output(1, &mut gate).unwrap();
    assert_relative_eq!(gate[8], 1.0, epsilon = FLOAT_EPSILON);
    assert_relative_eq!(gate[32], 2.0, epsilon = FLOAT_EPSILON);
}

#[test]
fn test_invalid_polyphony() {
    let h = Harness::new();
    build_poly(&h, 4);
    for bad in [0, 129] {
        let seq = h
            .session
            .set_property("/g", uris::POLYPHONY, Atom::int(bad), Context::Default);
        assert_eq!(h.status(seq), Status::InvalidPoly);
    }
}

#[test]
fn test_disabled_graph_is_silent() {
    let h = Harness::new();
    build_poly(&h, 4);

    let off = h
        .session
        .set_property("/g", uris::ENABLED, Atom::bool(false), Context::Default);
    assert_eq!(h.status(off), Status::Success);
    h.cycle();
    assert_constant(&h.output(0), 0.0);

    let on = h
        .session
        .set_property("/g", uris::ENABLED, Atom::bool(true), Context::Default);
    assert_eq!(h.status(on), Status::Success);
    h.cycle();
    assert_constant(&h.output(0), 1.0);
}

/// The driver feeds a root input and reads a root output.
#[test]
fn test_driver_io_through_root_ports() {
    let h = Harness::new();
    h.add_port("/in", uris::INPUT_PORT, uris::AUDIO_PORT);
    h.add_port("/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.add_block("/amp", GAIN);
    h.connect("/in", "/amp/in");
    h.connect("/amp/out", "/out");
    h.set_value("/amp/gain", 0.5);
    h.flush();

    let ramp: Vec<f32> = (0..TEST_BLOCK_LENGTH).map(|i| i as f32).collect();
    h.engine.write_input(0, &ramp).unwrap();
    h.cycle();
    let out = h.output(1);
    for (i, s) in out.iter().enumerate() {
        assert_relative_eq!(*s, i as f32 * 0.5, epsilon = FLOAT_EPSILON);
    }
    assert!(h.engine.write_input(1, &ramp).is_err());
}

#[test]
fn test_delay_block_shifts_signal() {
    let h = Harness::new();
    h.add_port("/in", uris::INPUT_PORT, uris::AUDIO_PORT);
    h.add_port("/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.add_block("/d", InternalFactory::DELAY);
    h.connect("/in", "/d/in");
    h.connect("/d/out", "/out");
    // 16 frames at 48 kHz
    h.set_value("/d/delay", 16.0 / 48000.0);
    h.flush();

    let mut impulse = vec![0.0; TEST_BLOCK_LENGTH as usize];
    impulse[0] = 1.0;
    h.engine.write_input(0, &impulse).unwrap();
    h.cycle();
    let out = h.output(1);
    let peak = out
        .iter()
        .position(|&s| s > 0.5)
        .expect("impulse within the block");
    assert_eq!(peak, 16);
}
