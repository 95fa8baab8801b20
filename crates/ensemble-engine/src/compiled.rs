//! Compiled graphs: the schedulable form of a graph's blocks and arcs.
//!
//! A [`CompiledGraph`] is built off the realtime thread from the store and
//! installed atomically into its [`GraphRuntime`]. It is never mutated
//! afterwards; every structural edit builds a new one.

use crate::factory::{BlockIo, Direction, PortKind};
use crate::runtime::{BlockRuntime, GraphRuntime, NotifyKeys, PortRuntime, Voice};
use crate::store::Store;
use ensemble_core::{Atom, Buffer, BufferKind, CycleWork, Feedback, Path, RunContext, TaskBody, TaskGraph};
use hashbrown::HashMap;
use std::sync::Arc;

/// Where an input reads from.
pub(crate) enum Source {
    Block { block: Arc<BlockRuntime>, port: usize },
    Boundary(Arc<PortRuntime>),
}

impl Source {
    /// # Safety
    /// The producer of this source must have finished for the cycle.
    unsafe fn voices(&self) -> usize {
        match self {
            Source::Block { block, .. } => block.voices().len(),
            Source::Boundary(_) => 1,
        }
    }

    /// # Safety
    /// As for [`Source::voices`]; `voice` must be in range.
    unsafe fn buffer(&self, voice: usize) -> Option<&Buffer> {
        match self {
            Source::Block { block, port } => block
                .voices()
                .get(voice)
                .and_then(|v| v.buffers.get(*port))
                .map(|b| &**b),
            Source::Boundary(port) => port.boundary().map(|b| &**b),
        }
    }
}

/// Where mixed input lands.
pub(crate) enum Target {
    /// Input port `index` of the node's block.
    Block(usize),
    /// A graph boundary port.
    Boundary(Arc<PortRuntime>),
}

pub(crate) struct Wiring {
    target: Target,
    sources: Vec<Source>,
}

pub(crate) enum Node {
    Block(Arc<BlockRuntime>),
    Graph(Arc<GraphRuntime>),
}

/// One schedulable node: a block or a nested graph.
pub struct NodeTask {
    name: String,
    node: Node,
    inputs: Vec<Wiring>,
    keys: NotifyKeys,
}

impl NodeTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn run_block(&self, block: &BlockRuntime, ctx: &mut RunContext) {
        let offset = ctx.offset() as usize;
        let nframes = ctx.nframes() as usize;
        // SAFETY: this task is the only writer of the block's voices during
        // the cycle; readers are ordered after it.
        let voices = unsafe { block.voices_mut() };
        let num_voices = voices.len();

        for (v, voice) in voices.iter_mut().enumerate() {
            for wiring in &self.inputs {
                let Target::Block(index) = wiring.target else {
                    continue;
                };
                let (Some(port), Some(buffer)) = (block.port(index), voice.buffers.get_mut(index)) else {
                    continue;
                };
                gather(buffer, port, &wiring.sources, v, num_voices, offset, nframes);
            }
            for (port, buffer) in block.ports().iter().zip(voice.buffers.iter_mut()) {
                // Control outputs hold their value across cycles.
                if port.direction() == Direction::Output && port.kind() != PortKind::Control {
                    clear_range(buffer, offset, nframes);
                }
            }
            voice.instance.run(ctx, &mut BlockIo::new(&mut voice.buffers));
        }

        self.report(block, voices, ctx);

        // Events delivered straight to an unconnected input are consumed once.
        let end = (offset + nframes) as i64;
        for wiring in &self.inputs {
            let Target::Block(index) = wiring.target else {
                continue;
            };
            if !wiring.sources.is_empty()
                || block.port(index).map(|p| p.kind()) != Some(PortKind::Atom)
            {
                continue;
            }
            for voice in voices.iter_mut() {
                if let Some(buffer) = voice.buffers.get_mut(index) {
                    buffer.update_value(end);
                    buffer.clear();
                }
            }
        }
    }

    /// Queue value changes and peaks for the post-processor.
    fn report(&self, block: &BlockRuntime, voices: &[Voice], ctx: &mut RunContext) {
        let offset = ctx.offset() as usize;
        let nframes = ctx.nframes() as usize;
        let time = ctx.time();

        for (index, port) in block.ports().iter().enumerate() {
            match port.kind() {
                PortKind::Control => {
                    if port.direction() == Direction::Input && !self.keys.monitors(port) {
                        continue;
                    }
                    let Some(value) = voices
                        .first()
                        .and_then(|v| v.buffers.get(index))
                        .map(|b| b.value_at(0))
                    else {
                        continue;
                    };
                    if port.replace_value(value) {
                        ctx.notify(port.id(), self.keys.value, time, &Atom::float(value));
                    }
                }
                PortKind::Audio | PortKind::Cv if self.keys.monitors(port) => {
                    let peak = voices
                        .iter()
                        .filter_map(|v| v.buffers.get(index))
                        .fold(0.0f32, |peak, b| peak.max(b.peak(offset, nframes)));
                    ctx.notify(port.id(), self.keys.activity, time, &Atom::float(peak));
                }
                _ => {}
            }
        }
    }

    fn run_graph(&self, graph: &GraphRuntime, ctx: &mut RunContext) {
        let offset = ctx.offset() as usize;
        let nframes = ctx.nframes() as usize;
        for wiring in &self.inputs {
            let Target::Boundary(port) = &wiring.target else {
                continue;
            };
            // SAFETY: a subgraph's input boundary is written only by the
            // parent task that runs the subgraph, which is this one.
            if let Some(buffer) = unsafe { port.boundary_mut() } {
                gather(buffer, port, &wiring.sources, 0, 1, offset, nframes);
            }
        }

        let compiled = graph.load_compiled();
        if let Some(compiled) = &*compiled {
            if graph.is_enabled() {
                compiled.run_nested(ctx);
            } else {
                compiled.silence_outputs(ctx);
            }
        }
    }
}

impl TaskBody for NodeTask {
    fn run(&self, ctx: &mut RunContext) {
        match &self.node {
            Node::Block(block) => self.run_block(block, ctx),
            Node::Graph(graph) => self.run_graph(graph, ctx),
        }
    }
}

/// Fill an input buffer for one voice from its sources.
///
/// Mono sources feed every voice; a mono destination sums every source
/// voice; otherwise voices pair up by index. An unconnected signal input
/// holds the port's value and an unconnected sequence input keeps whatever
/// was delivered to it.
fn gather(
    dst: &mut Buffer,
    port: &PortRuntime,
    sources: &[Source],
    voice: usize,
    dst_voices: usize,
    offset: usize,
    nframes: usize,
) {
    if sources.is_empty() {
        if port.kind() != PortKind::Atom {
            fill_value(dst, port.value(), offset, nframes);
        }
        return;
    }

    clear_range(dst, offset, nframes);
    let mut first = true;
    for source in sources {
        // SAFETY: sources are producers of this task and have completed.
        let n = unsafe { source.voices() };
        let range = if n == 1 {
            0..1
        } else if dst_voices == 1 {
            0..n
        } else if voice < n {
            voice..voice + 1
        } else {
            0..0
        };
        for u in range {
            let Some(src) = (unsafe { source.buffer(u) }) else {
                continue;
            };
            if first {
                dst.copy(src, offset, nframes);
                first = false;
            } else {
                dst.mix(src, offset, nframes);
            }
        }
    }
    if dst.kind() == BufferKind::Sequence {
        dst.update_value((offset + nframes) as i64);
    }
}

fn clear_range(buffer: &mut Buffer, offset: usize, nframes: usize) {
    match buffer.kind() {
        BufferKind::Audio => buffer.set_block(0.0, offset, offset + nframes),
        BufferKind::Control | BufferKind::Sequence => buffer.clear(),
    }
}

fn fill_value(buffer: &mut Buffer, value: f32, offset: usize, nframes: usize) {
    match buffer.kind() {
        BufferKind::Audio => buffer.set_block(value, offset, offset + nframes),
        BufferKind::Control => buffer.set_block(value, 0, 1),
        BufferKind::Sequence => {}
    }
}

/// The installed execution plan of one graph.
pub struct CompiledGraph {
    tasks: TaskGraph<NodeTask>,
    outputs: Vec<Wiring>,
    /// Sequence-kind input boundaries, emptied after each run.
    event_inputs: Vec<Arc<PortRuntime>>,
}

impl CompiledGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Node names in a valid run order.
    pub fn order(&self) -> Vec<&str> {
        let names: Vec<&str> = self.tasks.tasks().map(NodeTask::name).collect();
        self.tasks.order().iter().map(|&i| names[i]).collect()
    }

    /// One line per node, in run order, listing what it waits for.
    pub fn dump(&self) -> String {
        self.tasks.dump(|task| task.name.clone())
    }

    /// Run every node on the calling context, then fill the outputs.
    pub(crate) fn run_nested(&self, ctx: &mut RunContext) {
        let claimed = ctx.task();
        self.tasks.run_sequential(ctx);
        ctx.claim_task(claimed);
        self.finish(ctx);
    }

    /// Fill output boundaries and retire delivered events. Call after every
    /// task of the cycle has completed.
    pub(crate) fn finish(&self, ctx: &mut RunContext) {
        let offset = ctx.offset() as usize;
        let nframes = ctx.nframes() as usize;
        for wiring in &self.outputs {
            let Target::Boundary(port) = &wiring.target else {
                continue;
            };
            // SAFETY: all producers are done; only this context writes the
            // graph's output boundaries.
            if let Some(buffer) = unsafe { port.boundary_mut() } {
                gather(buffer, port, &wiring.sources, 0, 1, offset, nframes);
            }
        }
        for port in &self.event_inputs {
            // SAFETY: every reader of the input has run.
            if let Some(buffer) = unsafe { port.boundary_mut() } {
                buffer.clear();
            }
        }
    }

    /// Output silence for a disabled graph.
    pub(crate) fn silence_outputs(&self, ctx: &mut RunContext) {
        let offset = ctx.offset() as usize;
        let nframes = ctx.nframes() as usize;
        for wiring in &self.outputs {
            if let Target::Boundary(port) = &wiring.target {
                // SAFETY: as in `finish`.
                if let Some(buffer) = unsafe { port.boundary_mut() } {
                    clear_range(buffer, offset, nframes);
                }
            }
        }
    }
}

impl CycleWork for CompiledGraph {
    fn begin_cycle(&self) {
        self.tasks.begin_cycle();
    }

    fn run_worker(&self, ctx: &mut RunContext) {
        self.tasks.run_worker(ctx);
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("order", &self.order())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

/// Build the execution plan of `graph` from the store.
///
/// Fails with [`Feedback`] if the graph's arcs form a cycle.
pub(crate) fn compile(
    store: &Store,
    graph: &Path,
    contexts: usize,
    keys: NotifyKeys,
) -> Result<CompiledGraph, Feedback> {
    let mut by_head: HashMap<&Path, Vec<&Path>> = HashMap::new();
    for (tail, head) in store.arcs_in(graph) {
        by_head.entry(head).or_default().push(tail);
    }

    let source = |tail: &Path| -> Option<Source> {
        let port = store.port(tail)?;
        if port.on_graph {
            return Some(Source::Boundary(port.runtime.clone()));
        }
        let block = store.block(&Store::port_owner(tail)?)?;
        Some(Source::Block {
            block: block.runtime.clone(),
            port: port.runtime.index(),
        })
    };
    let sources_for = |head: &Path| -> Vec<Source> {
        by_head
            .get(head)
            .map(|tails| tails.iter().filter_map(|t| source(*t)).collect())
            .unwrap_or_default()
    };

    let mut index: HashMap<Path, usize> = HashMap::new();
    let mut tasks = Vec::new();
    for (path, object) in store.children(graph) {
        let node = match (object.as_block(), object.as_graph()) {
            (Some(block), _) => Node::Block(block.runtime.clone()),
            (_, Some(sub)) => Node::Graph(sub.runtime.clone()),
            _ => continue,
        };
        let inputs = store
            .children(path)
            .filter_map(|(port_path, child)| {
                let port = child.as_port()?;
                if port.runtime.direction() != Direction::Input {
                    return None;
                }
                let target = match node {
                    Node::Block(_) => Target::Block(port.runtime.index()),
                    Node::Graph(_) => Target::Boundary(port.runtime.clone()),
                };
                Some(Wiring {
                    target,
                    sources: sources_for(port_path),
                })
            })
            .collect();
        index.insert(path.clone(), tasks.len());
        tasks.push(NodeTask {
            name: path.to_string(),
            node,
            inputs,
            keys: keys.clone(),
        });
    }

    let node_of = |port: &Path| -> Option<usize> {
        let owner = Store::port_owner(port)?;
        if &owner == graph {
            return None;
        }
        index.get(&owner).copied()
    };
    let edges: Vec<(usize, usize)> = store
        .arcs_in(graph)
        .filter_map(|(tail, head)| Some((node_of(tail)?, node_of(head)?)))
        .collect();

    let mut outputs = Vec::new();
    let mut event_inputs = Vec::new();
    for (port_path, child) in store.children(graph) {
        let Some(port) = child.as_port() else {
            continue;
        };
        match port.runtime.direction() {
            Direction::Output => outputs.push(Wiring {
                target: Target::Boundary(port.runtime.clone()),
                sources: sources_for(port_path),
            }),
            Direction::Input if port.runtime.kind() == PortKind::Atom => {
                event_inputs.push(port.runtime.clone());
            }
            Direction::Input => {}
        }
    }

    Ok(CompiledGraph {
        tasks: TaskGraph::new(tasks, &edges, contexts)?,
        outputs,
        event_inputs,
    })
}
