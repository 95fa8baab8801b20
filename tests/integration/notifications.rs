//! Notification integration tests
//!
//! Values reported from the audio thread reach the store and every
//! registered client.

use crate::helpers::*;
use approx::assert_relative_eq;
use ensemble::core::types;
use ensemble::prelude::*;
use ensemble::InternalFactory;

/// Every `SetProperty` broadcast for `subject` and `key`, in arrival order.
fn updates(h: &Harness, subject: &str, key: &str) -> Vec<Atom> {
    h.monitor
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            Message::SetProperty {
                seq: 0,
                subject: s,
                key: k,
                value,
                ..
            } if s.as_str() == subject && k.as_str() == key => Some(value),
            _ => None,
        })
        .collect()
}

#[test]
fn test_unmonitored_ports_are_quiet() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.cycle();
    assert!(h.monitor.drain().is_empty());
}

#[test]
fn test_broadcast_all_reports_activity() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.engine.set_broadcast_all(true);
    h.cycle();

    let got = h.monitor.drain();
    let peak = |subject: &str| {
        got.iter().find_map(|msg| match msg {
            Message::SetProperty {
                subject: s,
                key,
                value,
                ..
            } if s.as_str() == subject && key.as_str() == uris::ACTIVITY => value.as_f32(),
            _ => None,
        })
    };
    assert_relative_eq!(peak("/src/out").expect("source activity"), 0.5);
    assert_relative_eq!(peak("/amp/out").expect("gain activity"), 1.0);

    h.engine.set_broadcast_all(false);
    h.cycle();
    assert!(h.monitor.drain().is_empty());
}

/// Setting `broadcast` on one port monitors that port alone.
#[test]
fn test_broadcast_flag_on_port() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    let seq = h
        .session
        .set_property("/amp/out", uris::BROADCAST, Atom::bool(true), Context::Default);
    assert_eq!(h.status(seq), Status::Success);
    h.monitor.drain();

    h.cycle();
    assert_eq!(updates(&h, "/amp/out", uris::ACTIVITY), [Atom::float(1.0)]);

    h.cycle();
    assert!(updates(&h, "/src/out", uris::ACTIVITY).is_empty());
}

/// A control output reports each new value once, and the store follows.
#[test]
fn test_control_output_updates_store() {
    let h = Harness::new();
    h.add_port("/midi", uris::INPUT_PORT, uris::ATOM_PORT);
    h.add_block("/ctl", InternalFactory::CONTROLLER);
    h.connect("/midi", "/ctl/input");
    h.set_value("/ctl/controller", 7.0);
    h.set_value("/ctl/maximum", 10.0);
    h.flush();
    h.monitor.drain();

    let mut driver = h.engine.take_process_handle().expect("driver available");
    let cc = Atom::from_bytes(types::MIDI_EVENT, &[0xB0, 7, 127]);
    assert!(driver.write_event(0, 5, &cc).unwrap());
    driver.run_cycle(TEST_BLOCK_LENGTH).unwrap();
    h.engine.post_process();

    assert_eq!(updates(&h, "/ctl/output", uris::VALUE), [Atom::float(10.0)]);
    assert_eq!(h.props("/ctl/output").get(uris::VALUE), Some(&Atom::float(10.0)));

    // the value holds without events and is not reported again
    driver.run_cycle(TEST_BLOCK_LENGTH).unwrap();
    h.engine.post_process();
    assert!(updates(&h, "/ctl/output", uris::VALUE).is_empty());
}

/// Control inputs set by a client are not echoed back as notifications.
#[test]
fn test_edited_control_is_not_echoed() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.engine.set_broadcast_all(true);
    h.set_value("/amp/gain", 3.0);
    h.flush();
    h.monitor.drain();

    h.cycle();
    assert!(updates(&h, "/amp/gain", uris::VALUE).is_empty());
}
