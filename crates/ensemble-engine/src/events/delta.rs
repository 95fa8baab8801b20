//! Delta and SetProperty: property edits with realtime side effects.

use super::put::{parse_bool, parse_poly};
use super::{object_path, EventTarget, Outcome, Plan, PlanStep, PreContext, Prepared};
use crate::store::{Object, ObjectKind};
use ensemble_core::{uris, Atom, Context, Path, Properties, Property, Uri};
use ensemble_protocol::{Message, Status};

/// Store changes that only apply once every effect has validated.
enum Update {
    Poly(u32),
    Polyphonic(bool),
}

/// Keys that hold a single value and drive realtime state.
fn is_special(key: &str) -> bool {
    matches!(
        key,
        uris::VALUE | uris::POLYPHONY | uris::POLYPHONIC | uris::ENABLED | uris::BROADCAST
    )
}

pub(super) fn delta(
    ctx: &mut PreContext<'_>,
    uri: &Uri,
    remove: &Properties,
    add: &Properties,
    context: Context,
) -> Outcome {
    let path = object_path(uri)?;
    let add = if context == Context::Default {
        add.clone()
    } else {
        add.with_context(context)
    };

    let object = ctx.store.get(&path).ok_or(Status::NotFound)?;
    let mut plan = Plan::default();
    let mut updates = Vec::new();
    for (key, prop) in add.iter() {
        effect(ctx, &path, object, key.as_str(), prop.value(), &mut plan, &mut updates)?;
    }

    let object = ctx.store.get_mut(&path).ok_or(Status::NotFound)?;
    let mut removed = Properties::new();
    for (key, prop) in remove.iter() {
        for old in object.properties.remove(key.as_str(), prop.value()) {
            removed.insert(key.clone(), old);
        }
    }
    let mut added = Properties::new();
    for (key, prop) in add.iter() {
        if is_special(key.as_str()) {
            let old = object.properties.set(key.clone(), prop.clone());
            if old.iter().any(|p| p == prop) {
                continue;
            }
            for p in old {
                removed.insert(key.clone(), p);
            }
            added.insert(key.clone(), prop.clone());
        } else if object.properties.insert(key.clone(), prop.clone()) {
            added.insert(key.clone(), prop.clone());
        }
    }
    for update in updates {
        match (update, &mut object.kind) {
            (Update::Poly(poly), ObjectKind::Graph(graph)) => graph.poly = poly,
            (Update::Polyphonic(polyphonic), ObjectKind::Block(block)) => block.polyphonic = polyphonic,
            _ => {}
        }
    }

    Ok(Prepared {
        plan,
        broadcast: vec![Message::Delta {
            seq: 0,
            uri: uri.clone(),
            remove: remove.clone(),
            add,
            ctx: Context::Default,
        }],
        reply: Vec::new(),
        inverse: vec![Message::Delta {
            seq: 0,
            uri: uri.clone(),
            remove: added,
            add: removed,
            ctx: Context::Default,
        }],
        merge_key: None,
    })
}

/// Validate one added property and stage its realtime effect, if any.
fn effect(
    ctx: &PreContext<'_>,
    path: &Path,
    object: &Object,
    key: &str,
    value: &Atom,
    plan: &mut Plan,
    updates: &mut Vec<Update>,
) -> Result<(), Status> {
    match (key, &object.kind) {
        (uris::VALUE, ObjectKind::Port(port)) => {
            let runtime = &port.runtime;
            if runtime.kind().is_numeric() {
                let value = value.as_f32().ok_or(Status::BadValueType)?;
                plan.push(PlanStep::SetControl {
                    port: runtime.clone(),
                    value,
                });
                return Ok(());
            }
            if value.is_reference() {
                return Err(Status::BadValue);
            }
            let target = if port.on_graph {
                EventTarget::Boundary(runtime.clone())
            } else {
                let block = path
                    .parent()
                    .and_then(|owner| ctx.store.block(&owner))
                    .ok_or(Status::InternalError)?;
                EventTarget::Block {
                    block: block.runtime.clone(),
                    port: runtime.index(),
                }
            };
            plan.push(PlanStep::AppendEvent {
                target,
                value: value.clone(),
            });
        }
        (uris::POLYPHONY, ObjectKind::Graph(graph)) => {
            let poly = parse_poly(value)?;
            if poly == graph.poly {
                return Ok(());
            }
            for (_, child) in ctx.store.children(path) {
                let Some(block) = child.as_block().filter(|block| block.polyphonic) else {
                    continue;
                };
                let voices = ctx.instantiate_voices(&block.prototype, poly as usize, block.runtime.ports())?;
                plan.push(PlanStep::SwapVoices {
                    block: block.runtime.clone(),
                    voices,
                });
            }
            updates.push(Update::Poly(poly));
        }
        (uris::POLYPHONIC, ObjectKind::Block(block)) => {
            let polyphonic = parse_bool(value)?;
            if polyphonic == block.polyphonic {
                return Ok(());
            }
            // Counts come from the store: earlier swaps may still be queued.
            let parent = path.parent().ok_or(Status::InternalError)?;
            let count = ctx.voice_count(&parent, polyphonic);
            if count != ctx.voice_count(&parent, block.polyphonic) {
                let voices = ctx.instantiate_voices(&block.prototype, count, block.runtime.ports())?;
                plan.push(PlanStep::SwapVoices {
                    block: block.runtime.clone(),
                    voices,
                });
            }
            updates.push(Update::Polyphonic(polyphonic));
        }
        (uris::ENABLED, ObjectKind::Graph(graph)) => {
            plan.push(PlanStep::SetEnabled {
                graph: graph.runtime.clone(),
                enabled: parse_bool(value)?,
            });
        }
        (uris::BROADCAST, ObjectKind::Port(port)) => {
            plan.push(PlanStep::SetMonitored {
                port: port.runtime.clone(),
                monitored: parse_bool(value)?,
            });
        }
        _ => {}
    }
    Ok(())
}

pub(super) fn set_property(
    ctx: &mut PreContext<'_>,
    subject: &Uri,
    key: &Uri,
    value: &Atom,
    context: Context,
) -> Outcome {
    let remove = Properties::new().with(key.clone(), Atom::uri(uris::WILDCARD));
    let add = Properties::new().with(key.clone(), Property::new(value.clone(), context));
    let mut prepared = delta(ctx, subject, &remove, &add, Context::Default)?;
    prepared.broadcast = vec![Message::SetProperty {
        seq: 0,
        subject: subject.clone(),
        key: key.clone(),
        value: value.clone(),
        ctx: context,
    }];
    prepared.merge_key = Some((subject.clone(), key.clone()));
    Ok(prepared)
}

/// Put on an existing object: replace the listed keys.
pub(super) fn set_keys(
    ctx: &mut PreContext<'_>,
    path: &Path,
    props: &Properties,
    context: Context,
) -> Outcome {
    let uri = Uri::from(path);
    let remove: Properties = props
        .keys()
        .map(|key| (key.clone(), Atom::uri(uris::WILDCARD)))
        .collect();
    let mut prepared = delta(ctx, &uri, &remove, props, context)?;
    prepared.broadcast = vec![Message::Put {
        seq: 0,
        uri,
        properties: props.clone(),
        ctx: context,
    }];
    Ok(prepared)
}
