//! Del: remove an object, its descendants and every arc touching them.

use super::{object_path, Outcome, PreContext, Prepared};
use ensemble_core::{uris, Context, Path, Properties, Uri};
use ensemble_protocol::{Message, Status};
use std::collections::BTreeSet;

pub(super) fn del(ctx: &mut PreContext<'_>, uri: &Uri) -> Outcome {
    let path = object_path(uri)?;
    if path.is_root() {
        return Err(Status::NotDeletable);
    }
    let object = ctx.store.get(&path).ok_or(Status::NotFound)?;
    if object.is_block_port() {
        return Err(Status::NotDeletable);
    }
    let is_graph_port = object.as_port().is_some();
    let parent = path.parent().ok_or(Status::NotDeletable)?;

    let mut inverse = recreate(ctx, &path);
    let arcs = ctx.store.arcs_touching(&path);
    inverse.extend(arcs.iter().map(|(tail, head, _)| Message::Connect {
        seq: 0,
        tail: tail.clone(),
        head: head.clone(),
    }));

    let within = |p: &Path| *p == path || p.is_descendant_of(&path);
    let mut dirty: BTreeSet<Path> = arcs
        .iter()
        .map(|(_, _, graph)| graph.clone())
        .filter(|graph| !within(graph))
        .collect();
    dirty.insert(parent.clone());
    if is_graph_port {
        if let Some(grandparent) = parent.parent() {
            dirty.insert(grandparent);
        }
    }

    let removed_arcs = ctx
        .store
        .remove_arcs_where(|tail, head, _| within(tail) || within(head));
    let removed = ctx.store.remove_subtree(&path);
    let steps: Result<Vec<_>, Status> = dirty.iter().map(|graph| ctx.recompile(graph)).collect();
    let steps = match steps {
        Ok(steps) => steps,
        Err(status) => {
            ctx.store.restore(removed, removed_arcs);
            return Err(status);
        }
    };
    tracing::debug!(%path, objects = removed.len(), arcs = arcs.len(), "deleted");

    let mut prepared = Prepared::default();
    for step in steps {
        prepared.plan.push(step);
    }
    if is_graph_port {
        if let Some(step) = ctx.reinstall_ports(&parent) {
            prepared.plan.push(step);
        }
    }
    prepared.broadcast.push(Message::Del {
        seq: 0,
        uri: uri.clone(),
    });
    prepared.inverse = inverse;
    Ok(prepared)
}

/// Puts that rebuild `path` and its descendants, parents first.
///
/// Block ports are created with their block, so they only get their
/// editable properties back.
fn recreate(ctx: &PreContext<'_>, path: &Path) -> Vec<Message> {
    ctx.store
        .subtree(path)
        .filter_map(|(p, object)| {
            let properties = if object.is_block_port() {
                editable(&object.properties)
            } else {
                object.properties.clone()
            };
            (!properties.is_empty()).then(|| Message::Put {
                seq: 0,
                uri: Uri::from(p),
                properties,
                ctx: Context::Default,
            })
        })
        .collect()
}

fn editable(props: &Properties) -> Properties {
    props
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), uris::TYPE | uris::INDEX | uris::SYMBOL))
        .map(|(key, prop)| (key.clone(), prop.clone()))
        .collect()
}
