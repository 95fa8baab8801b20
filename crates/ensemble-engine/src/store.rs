//! The non-realtime object model.
//!
//! Every graph, block and port lives here under its [`Path`], with its
//! properties and a handle to its realtime counterpart. Arcs are kept in one
//! table keyed by `(tail, head)` and remember the graph that owns them.
//! Pre-processing validates edits against the store and updates it
//! immediately, so later events in the same batch see earlier ones.

use crate::factory::{Direction, PortKind};
use crate::runtime::{BlockRuntime, GraphRuntime, PortRuntime};
use ensemble_core::{Path, Properties, SubjectId};
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

pub(crate) struct GraphObject {
    pub runtime: Arc<GraphRuntime>,
    pub poly: u32,
    pub next_port_index: usize,
}

pub(crate) struct BlockObject {
    pub runtime: Arc<BlockRuntime>,
    pub prototype: String,
    pub polyphonic: bool,
}

pub(crate) struct PortObject {
    pub runtime: Arc<PortRuntime>,
    /// Owned by a graph (a boundary port) rather than a block.
    pub on_graph: bool,
}

pub(crate) enum ObjectKind {
    Graph(GraphObject),
    Block(BlockObject),
    Port(PortObject),
}

pub(crate) struct Object {
    pub properties: Properties,
    pub kind: ObjectKind,
}

impl Object {
    pub fn as_graph(&self) -> Option<&GraphObject> {
        match &self.kind {
            ObjectKind::Graph(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn as_graph_mut(&mut self) -> Option<&mut GraphObject> {
        match &mut self.kind {
            ObjectKind::Graph(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockObject> {
        match &self.kind {
            ObjectKind::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BlockObject> {
        match &mut self.kind {
            ObjectKind::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&PortObject> {
        match &self.kind {
            ObjectKind::Port(port) => Some(port),
            _ => None,
        }
    }

    pub fn is_graph(&self) -> bool {
        self.as_graph().is_some()
    }

    /// Ports of blocks come from the prototype and cannot be removed alone.
    pub fn is_block_port(&self) -> bool {
        self.as_port().is_some_and(|port| !port.on_graph)
    }
}

/// Arcs as `(tail, head) -> owning graph`.
pub(crate) type ArcTable = BTreeMap<(Path, Path), Path>;

pub(crate) struct Store {
    objects: BTreeMap<Path, Object>,
    arcs: ArcTable,
    ports_by_id: HashMap<SubjectId, Path>,
    next_id: SubjectId,
}

impl Store {
    pub fn new(root: Arc<GraphRuntime>, properties: Properties) -> Self {
        let mut objects = BTreeMap::new();
        objects.insert(
            Path::root(),
            Object {
                properties,
                kind: ObjectKind::Graph(GraphObject {
                    runtime: root,
                    poly: 1,
                    next_port_index: 0,
                }),
            },
        );
        Self {
            objects,
            arcs: BTreeMap::new(),
            ports_by_id: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, path: &Path) -> Option<&Object> {
        self.objects.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Object> {
        self.objects.get_mut(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.objects.contains_key(path)
    }

    pub fn graph(&self, path: &Path) -> Option<&GraphObject> {
        self.get(path).and_then(Object::as_graph)
    }

    pub fn block(&self, path: &Path) -> Option<&BlockObject> {
        self.get(path).and_then(Object::as_block)
    }

    pub fn port(&self, path: &Path) -> Option<&PortObject> {
        self.get(path).and_then(Object::as_port)
    }

    pub fn alloc_id(&mut self) -> SubjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, path: Path, object: Object) {
        if let Some(port) = object.as_port() {
            self.ports_by_id.insert(port.runtime.id(), path.clone());
        }
        self.objects.insert(path, object);
    }

    /// `path` and everything below it, parents first.
    pub fn subtree(&self, path: &Path) -> impl Iterator<Item = (&Path, &Object)> {
        let path = path.clone();
        self.objects
            .range(path.clone()..)
            .take_while(move |(p, _)| **p == path || p.is_descendant_of(&path))
    }

    /// Direct children of `path`.
    pub fn children<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = (&'a Path, &'a Object)> + 'a {
        self.objects
            .range((Bound::Excluded(path.clone()), Bound::Unbounded))
            .take_while(move |(p, _)| p.is_descendant_of(path))
            .filter(move |(p, _)| p.is_child_of(path))
    }

    /// Remove `path` and its descendants, returning them parents first.
    pub fn remove_subtree(&mut self, path: &Path) -> Vec<(Path, Object)> {
        let doomed: Vec<Path> = self.subtree(path).map(|(p, _)| p.clone()).collect();
        doomed
            .into_iter()
            .filter_map(|p| {
                let object = self.objects.remove(&p)?;
                if let Some(port) = object.as_port() {
                    self.ports_by_id.remove(&port.runtime.id());
                }
                Some((p, object))
            })
            .collect()
    }

    /// Put back objects and arcs taken out by [`remove_subtree`] and
    /// [`remove_arcs_where`].
    ///
    /// [`remove_subtree`]: Self::remove_subtree
    /// [`remove_arcs_where`]: Self::remove_arcs_where
    pub fn restore(&mut self, objects: Vec<(Path, Object)>, arcs: Vec<(Path, Path, Path)>) {
        for (path, object) in objects {
            self.insert(path, object);
        }
        for (tail, head, graph) in arcs {
            self.add_arc(tail, head, graph);
        }
    }

    /// Re-key `from` and its descendants under `to`, arcs included.
    pub fn move_subtree(&mut self, from: &Path, to: &Path) {
        for (path, object) in self.remove_subtree(from) {
            if let Some(moved) = path.rebase(from, to) {
                self.insert(moved, object);
            }
        }
        let arcs = std::mem::take(&mut self.arcs);
        self.arcs = arcs
            .into_iter()
            .map(|((tail, head), graph)| {
                let tail = tail.rebase(from, to).unwrap_or(tail);
                let head = head.rebase(from, to).unwrap_or(head);
                let graph = graph.rebase(from, to).unwrap_or(graph);
                ((tail, head), graph)
            })
            .collect();
    }

    pub fn path_of(&self, id: SubjectId) -> Option<&Path> {
        self.ports_by_id.get(&id)
    }

    /// Owner of a port: its block, or the graph for a boundary port.
    pub fn port_owner(path: &Path) -> Option<Path> {
        path.parent()
    }

    /// The graph an arc from `tail` to `head` would live in, or `None` if the
    /// two ports are not in a connectable position.
    pub fn arc_graph(&self, tail: &Path, head: &Path) -> Option<Path> {
        let tail_owner = Self::port_owner(tail)?;
        let head_owner = Self::port_owner(head)?;
        let tail_on_graph = self.port(tail)?.on_graph;
        let head_on_graph = self.port(head)?.on_graph;

        if tail_on_graph && head_on_graph && tail_owner == head_owner {
            return Some(tail_owner);
        }
        if tail_on_graph && head_owner.parent().as_ref() == Some(&tail_owner) {
            return Some(tail_owner);
        }
        if head_on_graph && tail_owner.parent().as_ref() == Some(&head_owner) {
            return Some(head_owner);
        }
        let parent = tail_owner.parent()?;
        (head_owner.parent().as_ref() == Some(&parent)).then_some(parent)
    }

    /// Whether `port` may act as the tail of an arc inside `graph`.
    ///
    /// Inside a graph its own input ports are sources; everywhere else only
    /// outputs are.
    pub fn valid_tail(&self, graph: &Path, port: &Path) -> bool {
        let Some(object) = self.port(port) else {
            return false;
        };
        let inner = Self::port_owner(port).as_ref() == Some(graph);
        match object.runtime.direction() {
            Direction::Input => inner,
            Direction::Output => !inner,
        }
    }

    pub fn valid_head(&self, graph: &Path, port: &Path) -> bool {
        let Some(object) = self.port(port) else {
            return false;
        };
        let inner = Self::port_owner(port).as_ref() == Some(graph);
        match object.runtime.direction() {
            Direction::Output => inner,
            Direction::Input => !inner,
        }
    }

    pub fn port_kind(&self, path: &Path) -> Option<PortKind> {
        self.port(path).map(|port| port.runtime.kind())
    }

    pub fn has_arc(&self, tail: &Path, head: &Path) -> bool {
        self.arcs.contains_key(&(tail.clone(), head.clone()))
    }

    pub fn add_arc(&mut self, tail: Path, head: Path, graph: Path) {
        self.arcs.insert((tail, head), graph);
    }

    pub fn remove_arc(&mut self, tail: &Path, head: &Path) -> Option<Path> {
        self.arcs.remove(&(tail.clone(), head.clone()))
    }

    /// Arcs owned by `graph`.
    pub fn arcs_in<'a>(&'a self, graph: &'a Path) -> impl Iterator<Item = (&'a Path, &'a Path)> + 'a {
        self.arcs
            .iter()
            .filter(move |(_, g)| *g == graph)
            .map(|((tail, head), _)| (tail, head))
    }

    /// Remove every arc matching `pred`, returning `(tail, head, graph)`.
    pub fn remove_arcs_where(
        &mut self,
        mut pred: impl FnMut(&Path, &Path, &Path) -> bool,
    ) -> Vec<(Path, Path, Path)> {
        let doomed: Vec<(Path, Path)> = self
            .arcs
            .iter()
            .filter(|((tail, head), graph)| pred(tail, head, graph))
            .map(|(key, _)| key.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| {
                let graph = self.arcs.remove(&key)?;
                Some((key.0, key.1, graph))
            })
            .collect()
    }

    /// Arcs whose tail or head is `path` or lies below it.
    pub fn arcs_touching(&self, path: &Path) -> Vec<(Path, Path, Path)> {
        let within = |p: &Path| p == path || p.is_descendant_of(path);
        self.arcs
            .iter()
            .filter(|((tail, head), _)| within(tail) || within(head))
            .map(|((tail, head), graph)| (tail.clone(), head.clone(), graph.clone()))
            .collect()
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// Snapshot of every object's properties and every arc, for comparing
    /// graph states.
    pub fn snapshot(&self) -> (Vec<(Path, Properties)>, Vec<(Path, Path)>) {
        let objects = self
            .objects
            .iter()
            .map(|(path, object)| (path.clone(), object.properties.clone()))
            .collect();
        let arcs = self.arcs.keys().cloned().collect();
        (objects, arcs)
    }
}
