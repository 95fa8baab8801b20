//! Connect, Disconnect and DisconnectAll.

use super::{Outcome, PreContext, Prepared};
use ensemble_core::Path;
use ensemble_protocol::{Message, Status};

pub(super) fn connect(ctx: &mut PreContext<'_>, tail: &Path, head: &Path) -> Outcome {
    let (Some(tail_kind), Some(head_kind)) = (ctx.store.port_kind(tail), ctx.store.port_kind(head)) else {
        return Err(Status::NotFound);
    };
    let graph = ctx.store.arc_graph(tail, head).ok_or(Status::ParentDiffers)?;
    if !ctx.store.valid_tail(&graph, tail) || !ctx.store.valid_head(&graph, head) {
        return Err(Status::DirectionMismatch);
    }
    if !tail_kind.can_feed(head_kind) {
        return Err(Status::TypeMismatch);
    }
    if ctx.store.has_arc(tail, head) {
        return Err(Status::Exists);
    }

    ctx.store.add_arc(tail.clone(), head.clone(), graph.clone());
    let step = match ctx.recompile(&graph) {
        Ok(step) => step,
        Err(status) => {
            ctx.store.remove_arc(tail, head);
            return Err(status);
        }
    };

    let mut prepared = Prepared::default();
    prepared.plan.push(step);
    prepared.broadcast.push(Message::Connect {
        seq: 0,
        tail: tail.clone(),
        head: head.clone(),
    });
    prepared.inverse.push(Message::Disconnect {
        seq: 0,
        tail: tail.clone(),
        head: head.clone(),
    });
    Ok(prepared)
}

pub(super) fn disconnect(ctx: &mut PreContext<'_>, tail: &Path, head: &Path) -> Outcome {
    let graph = ctx.store.remove_arc(tail, head).ok_or(Status::NotFound)?;
    let step = match ctx.recompile(&graph) {
        Ok(step) => step,
        Err(status) => {
            ctx.store.add_arc(tail.clone(), head.clone(), graph);
            return Err(status);
        }
    };

    let mut prepared = Prepared::default();
    prepared.plan.push(step);
    prepared.broadcast.push(Message::Disconnect {
        seq: 0,
        tail: tail.clone(),
        head: head.clone(),
    });
    prepared.inverse.push(Message::Connect {
        seq: 0,
        tail: tail.clone(),
        head: head.clone(),
    });
    Ok(prepared)
}

/// Remove every arc of `graph` with an end at or below `path`.
pub(super) fn disconnect_all(ctx: &mut PreContext<'_>, graph: &Path, path: &Path) -> Outcome {
    if ctx.store.graph(graph).is_none() || !ctx.store.contains(path) {
        return Err(Status::NotFound);
    }
    let within = |p: &Path| p == path || p.is_descendant_of(path);
    let removed = ctx
        .store
        .remove_arcs_where(|tail, head, owner| owner == graph && (within(tail) || within(head)));

    let step = match ctx.recompile(graph) {
        Ok(step) => step,
        Err(status) => {
            for (tail, head, owner) in removed {
                ctx.store.add_arc(tail, head, owner);
            }
            return Err(status);
        }
    };

    let mut prepared = Prepared::default();
    prepared.plan.push(step);
    prepared.broadcast.push(Message::DisconnectAll {
        seq: 0,
        graph: graph.clone(),
        path: path.clone(),
    });
    prepared.inverse = removed
        .into_iter()
        .map(|(tail, head, _)| Message::Connect { seq: 0, tail, head })
        .collect();
    Ok(prepared)
}
