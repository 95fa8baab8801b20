//! Scheduler integration tests
//!
//! Parallel execution across run contexts, sample-accurate edits and nested
//! graphs.

use crate::helpers::*;
use approx::assert_relative_eq;
use ensemble::prelude::*;
use proptest::prelude::*;

/// Eight sources summed into `/out`, each at a different level.
fn build_fan_in(h: &Harness) -> f32 {
    h.add_port("/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    let mut total = 0.0;
    for i in 0..8 {
        let at = format!("/src{i}");
        let level = 0.1 * (i + 1) as f32;
        h.add_block(&at, SOURCE);
        h.connect(&format!("{at}/out"), "/out");
        h.set_value(&format!("{at}/level"), level);
        total += level;
    }
    h.flush();
    total
}

#[test]
fn test_parallel_fan_in_sums_every_source() {
    let h = Harness::with_threads(4);
    let total = build_fan_in(&h);

    for _ in 0..50 {
        h.cycle();
        for s in h.output(0) {
            assert_relative_eq!(s, total, epsilon = 1e-5);
        }
    }
}

/// The same graph gives the same result on one context and on several.
#[test]
fn test_thread_count_does_not_change_output() {
    let single = Harness::new();
    let parallel = Harness::with_threads(3);
    build_fan_in(&single);
    build_fan_in(&parallel);

    single.cycle();
    parallel.cycle();
    assert_eq!(single.output(0), parallel.output(0));
}

/// Editing the graph between cycles while other contexts run it.
#[test]
fn test_parallel_graph_survives_edits() {
    let h = Harness::with_threads(4);
    let total = build_fan_in(&h);

    h.session.del("/src7");
    h.flush();
    h.cycle();
    for s in h.output(0) {
        assert_relative_eq!(s, total - 0.8, epsilon = 1e-5);
    }
}

/// An edit stamped half way into the next cycle splits it at that frame.
#[test]
fn test_sample_accurate_edit() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.cycle();

    let at = h.engine.frame() + 32;
    h.set_value("/amp/gain", 4.0);
    assert_eq!(h.engine.process_events_at(at), 1);
    h.cycle();

    let out = h.output(0);
    for &s in &out[..32] {
        assert_relative_eq!(s, 1.0, epsilon = FLOAT_EPSILON);
    }
    for &s in &out[32..] {
        assert_relative_eq!(s, 2.0, epsilon = FLOAT_EPSILON);
    }
    assert_eq!(h.props("/amp/gain").get(uris::VALUE), Some(&Atom::float(4.0)));
}

/// Batches never run out of order, even if a later one asks for an
/// earlier frame.
#[test]
fn test_batches_keep_their_order() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    let now = h.engine.frame();

    h.set_value("/amp/gain", 4.0);
    h.engine.process_events_at(now + 48);
    h.set_value("/amp/gain", 3.0);
    h.engine.process_events_at(now + 16);
    h.cycle();

    // the second edit lands at frame 48 too
    let out = h.output(0);
    for &s in &out[..48] {
        assert_relative_eq!(s, 1.0, epsilon = FLOAT_EPSILON);
    }
    for &s in &out[48..] {
        assert_relative_eq!(s, 1.5, epsilon = FLOAT_EPSILON);
    }
}

/// A subgraph runs as one node of its parent.
#[test]
fn test_subgraph_runs_nested() {
    let h = Harness::with_threads(2);
    h.add_block("/src", SOURCE);
    h.session.put("/g", graph(), Context::Default);
    h.add_port("/g/in", uris::INPUT_PORT, uris::AUDIO_PORT);
    h.add_port("/g/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.add_block("/g/amp", GAIN);
    h.add_port("/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.connect("/src/out", "/g/in");
    h.connect("/g/in", "/g/amp/in");
    h.connect("/g/amp/out", "/g/out");
    h.connect("/g/out", "/out");
    h.set_value("/src/level", 0.5);
    h.set_value("/g/amp/gain", 3.0);
    h.flush();

    let compiled = h.engine.compiled(&path("/g")).expect("subgraph compiled");
    assert_eq!(compiled.len(), 1);
    let root = h.engine.compiled(&Path::root()).expect("root compiled");
    assert_eq!(root.len(), 2);

    for _ in 0..4 {
        h.cycle();
        for s in h.output(0) {
            assert_relative_eq!(s, 1.5, epsilon = FLOAT_EPSILON);
        }
    }
}

/// A cycle shorter than the block length only touches its frames.
#[test]
fn test_short_cycle() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    let before = h.engine.frame();

    h.engine.run_cycle(16).unwrap();
    h.engine.post_process();
    assert_eq!(h.engine.frame(), before + 16);
    let out = h.output(0);
    for &s in &out[..16] {
        assert_relative_eq!(s, 1.0, epsilon = FLOAT_EPSILON);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Each independent block runs exactly once per cycle, whatever the
    /// number of contexts.
    #[test]
    fn prop_every_task_runs_once(sources in 1usize..12, threads in 1usize..5) {
        let h = Harness::with_threads(threads);
        h.add_port("/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
        for i in 0..sources {
            let at = format!("/src{i}");
            h.add_block(&at, SOURCE);
            h.connect(&format!("{at}/out"), "/out");
            h.set_value(&format!("{at}/level"), 1.0);
        }
        h.flush();

        for _ in 0..3 {
            h.cycle();
            for s in h.output(0) {
                prop_assert!((s - sources as f32).abs() < 1e-4);
            }
        }
    }
}
