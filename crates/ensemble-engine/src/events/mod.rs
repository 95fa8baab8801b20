//! The event pipeline.
//!
//! Every request goes through three phases:
//!
//! 1. **pre-process** (non-realtime): validate against the store, update the
//!    store, and do all allocating work. The result is either a failure
//!    [`Status`] or a [`Prepared`] event holding a [`Plan`].
//! 2. **execute** (realtime): [`Plan::execute`] swaps the prepared objects
//!    in. It has no error path.
//! 3. **post-process** (non-realtime): respond, broadcast, record the inverse
//!    for undo, and drop whatever the plan retired.

mod connect;
mod copy;
mod delete;
mod delta;
mod get;
mod move_object;
mod put;

use crate::compiled::{compile, CompiledGraph};
use crate::factory::{port_infos, BlockFactory, Direction, InstantiateError, PortInfo, PortKind};
use crate::runtime::{BlockRuntime, GraphRuntime, NotifyKeys, PortRuntime, Voice};
use crate::store::Store;
use ensemble_core::{uris, Atom, BufferFactory, BufferRef, Path, Properties, RunContext, Uri};
use ensemble_protocol::{Message, Status};
use smallvec::SmallVec;
use std::sync::Arc;

/// Which stack a group of events records into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Normal,
    Undo,
    Redo,
}

/// Where an event value is delivered.
pub(crate) enum EventTarget {
    Block { block: Arc<BlockRuntime>, port: usize },
    Boundary(Arc<PortRuntime>),
}

/// One realtime action of a plan.
pub(crate) enum PlanStep {
    /// Swap a compiled graph in; afterwards holds the retired one.
    InstallGraph {
        graph: Arc<GraphRuntime>,
        compiled: Option<Arc<CompiledGraph>>,
    },
    /// Swap a graph's boundary port list in; afterwards holds the old list.
    InstallPorts {
        graph: Arc<GraphRuntime>,
        ports: Arc<Vec<Arc<PortRuntime>>>,
    },
    SetControl {
        port: Arc<PortRuntime>,
        value: f32,
    },
    /// Deliver an inline atom as an event to every voice.
    AppendEvent {
        target: EventTarget,
        value: Atom,
    },
    /// Swap in a new voice set; afterwards holds the old one.
    SwapVoices {
        block: Arc<BlockRuntime>,
        voices: Vec<Voice>,
    },
    SetEnabled {
        graph: Arc<GraphRuntime>,
        enabled: bool,
    },
    SetMonitored {
        port: Arc<PortRuntime>,
        monitored: bool,
    },
}

/// Validated realtime work of one event.
///
/// A plan can only be produced by pre-processing and only consumed by
/// [`Plan::execute`], which cannot fail. Anything the plan replaces is kept
/// inside it and freed when the plan is dropped after post-processing.
#[derive(Default)]
pub struct Plan {
    steps: SmallVec<[PlanStep; 2]>,
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan").field("steps", &self.steps.len()).finish()
    }
}

impl Plan {
    pub(crate) fn push(&mut self, step: PlanStep) {
        self.steps.push(step);
    }

    pub(crate) fn extend(&mut self, other: Plan) {
        self.steps.extend(other.steps);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Make the change live. Realtime safe.
    pub fn execute(&mut self, ctx: &RunContext) {
        let time = ctx.offset() as i64;
        for step in &mut self.steps {
            match step {
                PlanStep::InstallGraph { graph, compiled } => {
                    *compiled = graph.swap_compiled(compiled.take());
                }
                PlanStep::InstallPorts { graph, ports } => {
                    let next = ports.clone();
                    *ports = graph.swap_ports(next);
                }
                PlanStep::SetControl { port, value } => port.set_value(*value),
                PlanStep::AppendEvent { target, value } => deliver(target, value, time, ctx),
                PlanStep::SwapVoices { block, voices } => {
                    // SAFETY: executed between cycles on the audio thread;
                    // no task is running.
                    unsafe { block.swap_voices(voices) };
                }
                PlanStep::SetEnabled { graph, enabled } => graph.set_enabled(*enabled),
                PlanStep::SetMonitored { port, monitored } => port.set_monitored(*monitored),
            }
        }
    }
}

fn deliver(target: &EventTarget, value: &Atom, time: i64, ctx: &RunContext) {
    let body = value.get_body();
    let mut delivered = true;
    match target {
        EventTarget::Block { block, port } => {
            // SAFETY: between cycles, see `SwapVoices`.
            for voice in unsafe { block.voices_mut() } {
                if let Some(buffer) = voice.buffers.get_mut(*port) {
                    delivered &= buffer.append_event(time, value.size(), value.atom_type(), body);
                }
            }
        }
        EventTarget::Boundary(port) => {
            // SAFETY: between cycles.
            if let Some(buffer) = unsafe { port.boundary_mut() } {
                delivered = buffer.append_event(time, value.size(), value.atom_type(), body);
            }
        }
    }
    if !delivered {
        ctx.report_error("event buffer full, value dropped");
    }
}

/// Successful pre-processing result.
#[derive(Debug, Default)]
pub(crate) struct Prepared {
    pub plan: Plan,
    /// Sent to every registered client.
    pub broadcast: Vec<Message>,
    /// Sent to the requester after the response.
    pub reply: Vec<Message>,
    /// Messages that undo this event, applied in order.
    pub inverse: Vec<Message>,
    /// `(subject, key)` of a single-property edit, for undo merging.
    pub merge_key: Option<(Uri, Uri)>,
}

impl Prepared {
    pub fn merge(&mut self, other: Prepared) {
        self.plan.extend(other.plan);
        self.broadcast.extend(other.broadcast);
        self.reply.extend(other.reply);
        self.inverse.extend(other.inverse);
    }
}

pub(crate) type Outcome = Result<Prepared, Status>;

/// Everything pre-processing needs besides the message.
pub(crate) struct PreContext<'a> {
    pub store: &'a mut Store,
    pub factory: &'a dyn BlockFactory,
    pub buffers: &'a BufferFactory,
    pub sample_rate: u32,
    pub contexts: usize,
    pub keys: NotifyKeys,
}

impl PreContext<'_> {
    /// Build and stage a fresh plan for `graph`.
    pub fn recompile(&self, graph: &Path) -> Result<PlanStep, Status> {
        let runtime = self
            .store
            .graph(graph)
            .ok_or(Status::InternalError)?
            .runtime
            .clone();
        match compile(self.store, graph, self.contexts, self.keys.clone()) {
            Ok(compiled) => Ok(PlanStep::InstallGraph {
                graph: runtime,
                compiled: Some(Arc::new(compiled)),
            }),
            Err(feedback) => {
                tracing::debug!(%graph, task = feedback.task, "edit would create feedback");
                Err(Status::Failure)
            }
        }
    }

    /// Stage the current boundary port list of `graph`.
    pub fn reinstall_ports(&self, graph: &Path) -> Option<PlanStep> {
        let runtime = self.store.graph(graph)?.runtime.clone();
        let mut ports: Vec<Arc<PortRuntime>> = self
            .store
            .children(graph)
            .filter_map(|(_, object)| object.as_port().map(|p| p.runtime.clone()))
            .collect();
        ports.sort_by_key(|port| port.index());
        Some(PlanStep::InstallPorts {
            graph: runtime,
            ports: Arc::new(ports),
        })
    }

    /// Instantiate `count` voices of `prototype` with buffers for `ports`.
    pub fn instantiate_voices(
        &self,
        prototype: &str,
        count: usize,
        ports: &[Arc<PortRuntime>],
    ) -> Result<Vec<Voice>, Status> {
        let mut voices = Vec::with_capacity(count);
        for voice in 0..count {
            let mut instance = self
                .factory
                .instantiate(prototype, self.sample_rate, self.buffers.block_length())
                .map_err(|err| {
                    tracing::warn!(%prototype, %err, "instantiation failed");
                    match err {
                        InstantiateError::UnknownPrototype(_) => Status::PrototypeNotFound,
                        InstantiateError::Failed { .. } => Status::CreationFailed,
                    }
                })?;
            instance.assign_voice(voice, count);
            let buffers = ports
                .iter()
                .map(|port| self.port_buffer(port.kind(), port.value()))
                .collect();
            voices.push(Voice::new(instance, buffers));
        }
        Ok(voices)
    }

    /// A buffer for a port of `kind`, holding `value` where that applies.
    pub fn port_buffer(&self, kind: PortKind, value: f32) -> BufferRef {
        let mut buffer = self.buffers.get(kind.buffer_kind());
        match kind {
            PortKind::Control => buffer.set_block(value, 0, 1),
            PortKind::Atom => {
                buffer.set_value(&Atom::float(value));
            }
            PortKind::Audio | PortKind::Cv => {}
        }
        buffer
    }

    /// Voices a block should run inside `graph`.
    pub fn voice_count(&self, graph: &Path, polyphonic: bool) -> usize {
        match (polyphonic, self.store.graph(graph)) {
            (true, Some(graph)) => graph.poly as usize,
            _ => 1,
        }
    }

    /// Probe a prototype's port table without keeping the instance.
    pub fn prototype_ports(&self, prototype: &str) -> Result<Vec<PortInfo>, Status> {
        self.factory
            .instantiate(prototype, self.sample_rate, self.buffers.block_length())
            .map(|instance| port_infos(instance.as_ref()))
            .map_err(|err| match err {
                InstantiateError::UnknownPrototype(_) => Status::PrototypeNotFound,
                InstantiateError::Failed { .. } => Status::CreationFailed,
            })
    }
}

/// Pre-process one graph-edit request.
///
/// Bundles, undo and redo are handled by the engine around this.
pub(crate) fn pre_process(ctx: &mut PreContext<'_>, msg: &Message) -> Outcome {
    match msg {
        Message::Put {
            uri,
            properties,
            ctx: context,
            ..
        } => put::put(ctx, uri, properties, *context),
        Message::Delta {
            uri,
            remove,
            add,
            ctx: context,
            ..
        } => delta::delta(ctx, uri, remove, add, *context),
        Message::SetProperty {
            subject,
            key,
            value,
            ctx: context,
            ..
        } => delta::set_property(ctx, subject, key, value, *context),
        Message::Copy { from, to, .. } => copy::copy(ctx, from, to),
        Message::Move { from, to, .. } => move_object::move_object(ctx, from, to),
        Message::Del { uri, .. } => delete::del(ctx, uri),
        Message::Connect { tail, head, .. } => connect::connect(ctx, tail, head),
        Message::Disconnect { tail, head, .. } => connect::disconnect(ctx, tail, head),
        Message::DisconnectAll { graph, path, .. } => connect::disconnect_all(ctx, graph, path),
        Message::Get { uri, .. } => get::get(ctx, uri),
        Message::BundleBegin { .. }
        | Message::BundleEnd { .. }
        | Message::Undo { .. }
        | Message::Redo { .. }
        | Message::Response { .. }
        | Message::Error { .. } => Err(Status::BadRequest),
    }
}

/// Parse an object URI.
pub(crate) fn object_path(uri: &Uri) -> Result<Path, Status> {
    uri.to_path().ok_or(Status::BadUri)
}

/// Properties describing a port created from `info`.
pub(crate) fn port_properties(info: &PortInfo, index: usize) -> Properties {
    let mut props = Properties::new()
        .with(uris::TYPE, Atom::uri(info.direction.class_uri()))
        .with(uris::TYPE, Atom::uri(info.kind.class_uri()))
        .with(uris::SYMBOL, Atom::string(info.symbol))
        .with(uris::NAME, Atom::string(info.name))
        .with(uris::INDEX, Atom::int(index as i32));
    if info.kind.is_numeric() {
        props.insert(uris::DEFAULT, Atom::float(info.default));
        props.insert(uris::MINIMUM, Atom::float(info.min));
        props.insert(uris::MAXIMUM, Atom::float(info.max));
        if info.kind == PortKind::Control || info.direction == Direction::Input {
            props.insert(uris::VALUE, Atom::float(info.default));
        }
    }
    props
}

/// Put messages describing `path` and everything below it.
pub(crate) fn describe(store: &Store, path: &Path) -> Vec<Message> {
    store
        .subtree(path)
        .map(|(p, object)| Message::Put {
            seq: 0,
            uri: Uri::from(p),
            properties: object.properties.clone(),
            ctx: ensemble_core::Context::Default,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing;
