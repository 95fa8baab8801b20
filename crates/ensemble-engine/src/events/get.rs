//! Get: describe an object and everything below it to the requester.

use super::{describe, object_path, Outcome, PreContext, Prepared};
use ensemble_core::Uri;
use ensemble_protocol::{Message, Status};

pub(super) fn get(ctx: &mut PreContext<'_>, uri: &Uri) -> Outcome {
    let path = object_path(uri)?;
    if !ctx.store.contains(&path) {
        return Err(Status::NotFound);
    }

    let mut reply = describe(ctx.store, &path);
    for (graph, _) in ctx.store.subtree(&path).filter(|(_, object)| object.is_graph()) {
        reply.extend(ctx.store.arcs_in(graph).map(|(tail, head)| Message::Connect {
            seq: 0,
            tail: tail.clone(),
            head: head.clone(),
        }));
    }
    Ok(Prepared {
        reply,
        ..Prepared::default()
    })
}
