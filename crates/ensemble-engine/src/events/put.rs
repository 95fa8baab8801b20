//! Put: create an object, or overwrite keys of an existing one.

use super::{delta, describe, object_path, port_properties, Outcome, PreContext, Prepared};
use crate::factory::{Direction, PortKind};
use crate::runtime::{BlockRuntime, GraphRuntime, PortRuntime};
use crate::store::{BlockObject, GraphObject, Object, ObjectKind, PortObject, Store};
use ensemble_core::{uris, Atom, Context, Path, Properties, Uri};
use ensemble_protocol::{Message, Status};
use std::sync::Arc;

pub(super) fn put(ctx: &mut PreContext<'_>, uri: &Uri, props: &Properties, context: Context) -> Outcome {
    let path = object_path(uri)?;
    if ctx.store.contains(&path) {
        if props.contains_key(uris::TYPE) {
            return Err(Status::Exists);
        }
        return delta::set_keys(ctx, &path, props, context);
    }

    let parent = path.parent().ok_or(Status::BadUri)?;
    let parent_is_graph = match ctx.store.get(&parent) {
        Some(object) => object.is_graph(),
        None => return Err(Status::ParentNotFound),
    };

    let props = if context == Context::Default {
        props.clone()
    } else {
        props.with_context(context)
    };

    let kind = ObjectClass::of(&props)?;
    if !parent_is_graph {
        return Err(Status::InvalidParent);
    }
    let next_port_index = ctx.store.graph(&parent).map_or(0, |graph| graph.next_port_index);
    let created = match kind {
        ObjectClass::Graph => create_graph(ctx, &path, &parent, props),
        ObjectClass::Block => create_block(ctx, &path, &parent, props),
        ObjectClass::Port(direction, kind) => create_port(ctx, &path, &parent, props, direction, kind),
    };
    let mut prepared = match created {
        Ok(prepared) => prepared,
        Err(status) => {
            discard(ctx.store, &path, &parent, next_port_index);
            return Err(status);
        }
    };
    prepared.broadcast = describe(ctx.store, &path);
    prepared.inverse = vec![Message::Del {
        seq: 0,
        uri: Uri::from(&path),
    }];
    tracing::debug!(%path, "created");
    Ok(prepared)
}

/// Undo a creation that failed after touching the store.
fn discard(store: &mut Store, path: &Path, parent: &Path, next_port_index: usize) {
    store.remove_subtree(path);
    if let Some(graph) = store.get_mut(parent).and_then(Object::as_graph_mut) {
        graph.next_port_index = next_port_index;
    }
}

enum ObjectClass {
    Graph,
    Block,
    Port(Direction, PortKind),
}

impl ObjectClass {
    fn of(props: &Properties) -> Result<Self, Status> {
        if props.has_type(uris::GRAPH) {
            return Ok(ObjectClass::Graph);
        }
        if props.has_type(uris::BLOCK) {
            return Ok(ObjectClass::Block);
        }
        let direction = match (props.has_type(uris::INPUT_PORT), props.has_type(uris::OUTPUT_PORT)) {
            (true, false) => Direction::Input,
            (false, true) => Direction::Output,
            _ => return Err(Status::BadObjectType),
        };
        let kind = props
            .get_all(uris::TYPE)
            .find_map(|p| p.as_str().and_then(PortKind::from_class))
            .ok_or(Status::BadObjectType)?;
        Ok(ObjectClass::Port(direction, kind))
    }
}

/// Polyphony from a property value: an integer or float in `1..=128`.
pub(super) fn parse_poly(value: &Atom) -> Result<u32, Status> {
    let poly = match (value.as_i64(), value.as_f32()) {
        (Some(n), _) => n,
        (None, Some(f)) if f.fract() == 0.0 => f as i64,
        (None, Some(_)) => return Err(Status::InvalidPoly),
        (None, None) => return Err(Status::BadValueType),
    };
    if (1..=uris::MAX_POLYPHONY as i64).contains(&poly) {
        Ok(poly as u32)
    } else {
        Err(Status::InvalidPoly)
    }
}

pub(super) fn parse_bool(value: &Atom) -> Result<bool, Status> {
    value
        .get::<bool>()
        .or_else(|| value.as_i64().map(|n| n != 0))
        .ok_or(Status::BadValueType)
}

fn create_graph(ctx: &mut PreContext<'_>, path: &Path, parent: &Path, mut props: Properties) -> Outcome {
    let poly = props.get(uris::POLYPHONY).map(parse_poly).transpose()?.unwrap_or(1);
    let enabled = props.get(uris::ENABLED).map(parse_bool).transpose()?.unwrap_or(true);
    if !props.contains_key(uris::POLYPHONY) {
        props.insert(uris::POLYPHONY, Atom::int(poly as i32));
    }

    let runtime = Arc::new(GraphRuntime::new());
    runtime.set_enabled(enabled);
    ctx.store.insert(
        path.clone(),
        Object {
            properties: props,
            kind: ObjectKind::Graph(GraphObject {
                runtime,
                poly,
                next_port_index: 0,
            }),
        },
    );

    let mut prepared = Prepared::default();
    prepared.plan.push(ctx.recompile(path)?);
    prepared.plan.push(ctx.recompile(parent)?);
    Ok(prepared)
}

fn create_block(ctx: &mut PreContext<'_>, path: &Path, parent: &Path, props: Properties) -> Outcome {
    let prototype = props
        .get(uris::PROTOTYPE)
        .and_then(Atom::as_str)
        .ok_or(Status::PrototypeNotFound)?
        .to_string();
    let polyphonic = props.get(uris::POLYPHONIC).map(parse_bool).transpose()?.unwrap_or(false);

    let infos = ctx.prototype_ports(&prototype)?;
    let port_paths = infos
        .iter()
        .map(|info| path.child(info.symbol))
        .collect::<Option<Vec<Path>>>()
        .ok_or(Status::CreationFailed)?;

    let ports: Vec<Arc<PortRuntime>> = infos
        .iter()
        .enumerate()
        .map(|(index, info)| {
            let id = ctx.store.alloc_id();
            Arc::new(PortRuntime::new(id, index, info.kind, info.direction, info.default, None))
        })
        .collect();
    let voices = ctx.instantiate_voices(&prototype, ctx.voice_count(parent, polyphonic), &ports)?;

    let runtime = Arc::new(BlockRuntime::new(ports.clone(), voices));
    ctx.store.insert(
        path.clone(),
        Object {
            properties: props,
            kind: ObjectKind::Block(BlockObject {
                runtime,
                prototype,
                polyphonic,
            }),
        },
    );
    for ((info, port), port_path) in infos.iter().zip(ports).zip(port_paths) {
        ctx.store.insert(
            port_path,
            Object {
                properties: port_properties(info, port.index()),
                kind: ObjectKind::Port(PortObject {
                    runtime: port,
                    on_graph: false,
                }),
            },
        );
    }

    let mut prepared = Prepared::default();
    prepared.plan.push(ctx.recompile(parent)?);
    Ok(prepared)
}

fn create_port(
    ctx: &mut PreContext<'_>,
    path: &Path,
    parent: &Path,
    mut props: Properties,
    direction: Direction,
    kind: PortKind,
) -> Outcome {
    let value = props.get(uris::VALUE).and_then(Atom::as_f32).unwrap_or(0.0);
    let graph = ctx.store.graph(parent).ok_or(Status::InvalidParent)?;

    let requested = props
        .get(uris::INDEX)
        .and_then(Atom::as_i64)
        .and_then(|i| usize::try_from(i).ok());
    let taken = |index: usize| {
        ctx.store
            .children(parent)
            .any(|(_, o)| o.as_port().is_some_and(|p| p.runtime.index() == index))
    };
    let index = match requested {
        Some(index) if !taken(index) => index,
        _ => graph.next_port_index,
    };
    props.set(uris::INDEX, Atom::int(index as i32));
    if !props.contains_key(uris::SYMBOL) {
        props.insert(uris::SYMBOL, Atom::string(path.symbol()));
    }

    let mut buffer = ctx.port_buffer(kind, value);
    buffer.set_external(parent.is_root());
    let id = ctx.store.alloc_id();
    let runtime = Arc::new(PortRuntime::new(id, index, kind, direction, value, Some(buffer)));

    if let Some(graph) = ctx.store.get_mut(parent).and_then(Object::as_graph_mut) {
        graph.next_port_index = graph.next_port_index.max(index + 1);
    }
    ctx.store.insert(
        path.clone(),
        Object {
            properties: props,
            kind: ObjectKind::Port(PortObject {
                runtime,
                on_graph: true,
            }),
        },
    );

    let mut prepared = Prepared::default();
    prepared.plan.push(ctx.recompile(parent)?);
    if let Some(step) = ctx.reinstall_ports(parent) {
        prepared.plan.push(step);
    }
    if let Some(grandparent) = parent.parent() {
        prepared.plan.push(ctx.recompile(&grandparent)?);
    }
    Ok(prepared)
}
