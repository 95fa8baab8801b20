//! Protocol integration tests
//!
//! Responses, fire-and-forget errors, bundles and broadcasts as seen by
//! clients.

use crate::helpers::*;
use ensemble::prelude::*;

fn is_bundle_begin(msg: &Message) -> bool {
    matches!(msg, Message::BundleBegin { seq: 0 })
}

fn is_bundle_end(msg: &Message) -> bool {
    matches!(msg, Message::BundleEnd { seq: 0 })
}

#[test]
fn test_response_echoes_sequence_and_subject() {
    let h = Harness::new();
    let seq = h.session.del("/nothing");
    h.flush();
    assert_eq!(
        h.inbox.drain(),
        [Message::Response {
            id: seq,
            status: Status::NotFound,
            subject: "/nothing".into(),
        }]
    );
}

/// A request with sequence number zero is never answered on success, and a
/// failure arrives as error text.
#[test]
fn test_fire_and_forget() {
    let h = Harness::new();
    h.session.message(Message::Put {
        seq: 0,
        uri: "/amp".into(),
        properties: block(GAIN),
        ctx: Context::Default,
    });
    h.session.message(Message::Del {
        seq: 0,
        uri: "/missing".into(),
    });
    h.flush();

    assert!(h.exists("/amp"));
    assert_eq!(
        h.inbox.drain(),
        [Message::Error {
            text: "del /missing: Object not found".into(),
        }]
    );
}

/// Requests from an interface without a respondee still take effect.
#[test]
fn test_interface_without_respondee() {
    let h = Harness::new();
    let anonymous = h.engine.interface(None);
    anonymous.put("/amp", block(GAIN), Context::Default);
    anonymous.del("/missing");
    h.flush();

    assert!(h.exists("/amp"));
    assert!(h.inbox.drain().is_empty());
}

#[test]
fn test_put_is_broadcast_to_registered_clients() {
    let h = Harness::new();
    h.add_block("/amp", GAIN);
    h.flush();

    let got = h.monitor.drain();
    assert!(is_bundle_begin(&got[0]));
    assert!(is_bundle_end(&got[got.len() - 1]));
    let subjects: Vec<String> = got
        .iter()
        .filter_map(|msg| match msg {
            Message::Put { seq: 0, uri, .. } => Some(uri.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(subjects, ["/amp", "/amp/gain", "/amp/in", "/amp/out"]);
}

/// A value edit is a single broadcast, sent without bundle brackets.
#[test]
fn test_set_property_broadcast() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);
    h.set_value("/amp/gain", 3.0);
    h.flush();

    assert_eq!(
        h.monitor.drain(),
        [Message::SetProperty {
            seq: 0,
            subject: "/amp/gain".into(),
            key: uris::VALUE.into(),
            value: Atom::float(3.0),
            ctx: Context::Default,
        }]
    );
}

#[test]
fn test_failed_request_is_not_broadcast() {
    let h = Harness::new();
    h.add_block("/x", "test:Nope");
    h.flush();
    assert!(h.monitor.drain().is_empty());
}

/// Every request in a bundle is answered, and the changes reach listeners
/// as one bracketed transfer.
#[test]
fn test_bundle_broadcast_is_bracketed() {
    let h = Harness::new();
    let begin = h.session.bundle_begin();
    let a = h.add_block("/a", GAIN);
    let b = h.add_block("/b", SOURCE);
    let end = h.session.bundle_end();
    h.flush();

    let answered: Vec<_> = h
        .inbox
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            Message::Response { id, status, .. } => Some((id, status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        answered,
        [
            (begin, Status::Success),
            (a, Status::Success),
            (b, Status::Success),
            (end, Status::Success),
        ]
    );

    let got = h.monitor.drain();
    assert!(is_bundle_begin(&got[0]));
    assert!(is_bundle_end(&got[got.len() - 1]));
    let inner = &got[1..got.len() - 1];
    assert!(!inner.iter().any(|m| is_bundle_begin(m) || is_bundle_end(m)));
    // two blocks with 3 + 2 ports
    assert_eq!(inner.len(), 7);
}

/// Nothing in an open bundle is applied until the bundle closes.
#[test]
fn test_open_bundle_is_held() {
    let h = Harness::new();
    h.session.bundle_begin();
    h.add_block("/a", GAIN);
    h.flush();
    assert!(!h.exists("/a"));

    h.session.bundle_end();
    h.flush();
    assert!(h.exists("/a"));
}

#[test]
fn test_unbalanced_bundle_end() {
    let h = Harness::new();
    assert_eq!(h.status(h.session.bundle_end()), Status::BadRequest);
}

#[test]
fn test_nested_bundle_begin() {
    let h = Harness::new();
    h.session.bundle_begin();
    let nested = h.session.bundle_begin();
    assert_eq!(h.status(nested), Status::BadRequest);

    // the outer bundle is still open and closes normally
    h.add_block("/a", GAIN);
    assert_eq!(h.status(h.session.bundle_end()), Status::Success);
    assert!(h.exists("/a"));
}

/// Bundles are per client: another session's requests are not captured.
#[test]
fn test_bundles_are_per_client() {
    let h = Harness::new();
    let (respondee, other_inbox) = ChannelClient::new("test:other");
    let other = h.engine.interface(Some(Arc::new(respondee)));

    h.session.bundle_begin();
    h.add_block("/a", GAIN);
    let seq = other.put("/b", block(GAIN), Context::Default);
    h.flush();

    assert!(h.exists("/b"));
    assert!(!h.exists("/a"));
    assert!(other_inbox.drain().contains(&Message::Response {
        id: seq,
        status: Status::Success,
        subject: "/b".into(),
    }));
}

/// Get answers first, then describes the subtree and its arcs.
#[test]
fn test_get_describes_graph() {
    let h = Harness::new();
    build_chain(&h, 0.5, 2.0);

    let seq = h.session.get("/");
    h.flush();
    let got = h.inbox.drain();
    assert_eq!(
        got[0],
        Message::Response {
            id: seq,
            status: Status::Success,
            subject: "/".into(),
        }
    );
    let puts = got.iter().filter(|m| matches!(m, Message::Put { .. })).count();
    let connects = got.iter().filter(|m| matches!(m, Message::Connect { .. })).count();
    assert_eq!(puts, h.engine.num_objects());
    assert_eq!(connects, 2);
    // get changes nothing and tells nobody else
    assert!(h.monitor.drain().is_empty());
}

#[test]
fn test_unregistered_client_hears_nothing() {
    let h = Harness::new();
    assert!(h.engine.unregister_client(&Uri::from("test:monitor")));
    assert!(!h.engine.unregister_client(&Uri::from("test:monitor")));

    h.add_block("/a", GAIN);
    h.flush();
    assert!(h.monitor.drain().is_empty());
}

/// Messages survive a trip through JSON, so a remote client can relay them.
#[test]
fn test_json_relayed_request() {
    let h = Harness::new();
    let request = Message::Put {
        seq: 42,
        uri: "/amp".into(),
        properties: block(GAIN).with(uris::NAME, Atom::string("Boost")),
        ctx: Context::Default,
    };
    let wire = serde_json::to_string(&request).unwrap();
    let relayed: Message = serde_json::from_str(&wire).unwrap();
    h.session.message(relayed);

    assert_eq!(h.status(42), Status::Success);
    assert_eq!(h.props("/amp").get(uris::NAME), Some(&Atom::string("Boost")));
}
