//! Dependency-counted task graphs.
//!
//! A [`TaskGraph`] is built once, off the realtime thread, from a list of task
//! bodies and `(before, after)` edges. Running it never allocates: each
//! context has a fixed-capacity ready queue sized to hold every task, a task
//! is pushed exactly once per cycle (when its last provider finishes), and
//! idle contexts steal from their neighbours' queues.

use crate::run_context::RunContext;
use crossbeam::queue::ArrayQueue;
use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Work executed for one task.
pub trait TaskBody: Send + Sync {
    fn run(&self, ctx: &mut RunContext);
}

/// The edges contain a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("feedback cycle through task {task}")]
pub struct Feedback {
    /// A task on (or downstream of) the cycle.
    pub task: usize,
}

struct TaskNode<T> {
    body: T,
    dependants: Vec<usize>,
    providers: usize,
    pending: AtomicUsize,
}

/// Schedulable DAG of tasks.
pub struct TaskGraph<T> {
    nodes: Vec<TaskNode<T>>,
    order: Vec<usize>,
    roots: Vec<usize>,
    ready: Box<[ArrayQueue<usize>]>,
    remaining: AtomicUsize,
}

impl<T: TaskBody> TaskGraph<T> {
    /// Build a graph for `contexts` run contexts.
    ///
    /// Edge `(a, b)` makes `b` wait for `a`. Duplicate edges are ignored.
    pub fn new(bodies: Vec<T>, edges: &[(usize, usize)], contexts: usize) -> Result<Self, Feedback> {
        let n = bodies.len();
        let mut edges: Vec<(usize, usize)> = edges
            .iter()
            .copied()
            .filter(|&(a, b)| a < n && b < n)
            .collect();
        edges.sort_unstable();
        edges.dedup();

        if let Some(&(a, _)) = edges.iter().find(|(a, b)| a == b) {
            return Err(Feedback { task: a });
        }

        let mut nodes: Vec<TaskNode<T>> = bodies
            .into_iter()
            .map(|body| TaskNode {
                body,
                dependants: Vec::new(),
                providers: 0,
                pending: AtomicUsize::new(0),
            })
            .collect();
        for &(a, b) in &edges {
            nodes[a].dependants.push(b);
            nodes[b].providers += 1;
        }

        // Kahn's algorithm; whatever is left over sits on or behind a cycle.
        let mut indegree: Vec<usize> = nodes.iter().map(|node| node.providers).collect();
        let roots: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        let mut queue = roots.clone();
        while let Some(i) = queue.pop() {
            order.push(i);
            for &d in &nodes[i].dependants {
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    queue.push(d);
                }
            }
        }
        if order.len() < n {
            let task = (0..n).find(|&i| indegree[i] > 0).unwrap_or(0);
            return Err(Feedback { task });
        }

        let ready = (0..contexts.max(1))
            .map(|_| ArrayQueue::new(n.max(1)))
            .collect();

        Ok(Self {
            nodes,
            order,
            roots,
            ready,
            remaining: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Task bodies in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().map(|node| &node.body)
    }

    /// A topological order of the tasks.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Run every task on one context in dependency order.
    pub fn run_sequential(&self, ctx: &mut RunContext) {
        for &i in &self.order {
            ctx.claim_task(Some(i));
            self.nodes[i].body.run(ctx);
        }
        ctx.claim_task(None);
    }

    /// Reset dependency counters and seed the ready queues. Call once per
    /// cycle before any context calls [`TaskGraph::run_worker`].
    pub fn begin_cycle(&self) {
        for node in &self.nodes {
            node.pending.store(node.providers, Ordering::Relaxed);
        }
        self.remaining.store(self.nodes.len(), Ordering::Release);
        for (slot, &root) in self.roots.iter().enumerate() {
            let _ = self.ready[slot % self.ready.len()].push(root);
        }
    }

    /// Claim and run tasks until every task of the cycle has completed.
    pub fn run_worker(&self, ctx: &mut RunContext) {
        while self.remaining.load(Ordering::Acquire) > 0 {
            match self.claim(ctx.id()) {
                Some(i) => {
                    ctx.claim_task(Some(i));
                    self.nodes[i].body.run(ctx);
                    ctx.claim_task(None);
                    self.complete(i, ctx.id());
                }
                None => std::hint::spin_loop(),
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    fn claim(&self, id: usize) -> Option<usize> {
        let n = self.ready.len();
        let own = id % n;
        if let Some(i) = self.ready[own].pop() {
            return Some(i);
        }
        (1..n).find_map(|k| self.ready[(own + k) % n].pop())
    }

    fn complete(&self, i: usize, id: usize) {
        let own = id % self.ready.len();
        for &d in &self.nodes[i].dependants {
            if self.nodes[d].pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                let _ = self.ready[own].push(d);
            }
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel);
    }

    /// Human-readable schedule: one line per task in run order, with the
    /// tasks it waits for.
    pub fn dump(&self, name: impl Fn(&T) -> String) -> String {
        let mut providers: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for &d in &node.dependants {
                providers[d].push(i);
            }
        }
        let mut out = String::new();
        for &i in &self.order {
            let _ = write!(out, "{}", name(&self.nodes[i].body));
            if !providers[i].is_empty() {
                let mut inputs: Vec<String> = providers[i]
                    .iter()
                    .map(|&p| name(&self.nodes[p].body))
                    .collect();
                inputs.sort();
                let _ = write!(out, " <- {}", inputs.join(", "));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{notification_channel, RtErrors};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Record {
        id: usize,
        log: Arc<Mutex<Vec<usize>>>,
    }

    impl TaskBody for Record {
        fn run(&self, _ctx: &mut RunContext) {
            self.log.lock().push(self.id);
        }
    }

    fn records(n: usize) -> (Vec<Record>, Arc<Mutex<Vec<usize>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bodies = (0..n)
            .map(|id| Record {
                id,
                log: log.clone(),
            })
            .collect();
        (bodies, log)
    }

    fn ctx(id: usize) -> RunContext {
        let (tx, _rx) = notification_channel(1);
        RunContext::new(id, 48000, tx, Arc::new(RtErrors::default()))
    }

    #[test]
    fn test_sequential_respects_edges() {
        let (bodies, log) = records(4);
        let graph = TaskGraph::new(bodies, &[(2, 1), (1, 0), (3, 0)], 1).unwrap();
        graph.run_sequential(&mut ctx(0));

        let order = log.lock().clone();
        let pos = |t| order.iter().position(|&x| x == t).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos(2) < pos(1));
        assert!(pos(1) < pos(0));
        assert!(pos(3) < pos(0));
    }

    #[test]
    fn test_cycle_is_feedback() {
        let (bodies, _) = records(3);
        let err = TaskGraph::new(bodies, &[(0, 1), (1, 2), (2, 0)], 1).err();
        assert!(err.is_some());

        let (bodies, _) = records(1);
        assert_eq!(
            TaskGraph::new(bodies, &[(0, 0)], 1).err(),
            Some(Feedback { task: 0 })
        );
    }

    #[test]
    fn test_single_context_worker_runs_all() {
        let (bodies, log) = records(5);
        let graph = TaskGraph::new(bodies, &[(0, 4), (1, 4), (4, 2)], 1).unwrap();
        let mut root = ctx(0);
        for _ in 0..3 {
            graph.begin_cycle();
            graph.run_worker(&mut root);
            assert!(graph.is_complete());
        }
        assert_eq!(log.lock().len(), 15);
    }

    #[test]
    fn test_dump_lists_providers() {
        struct Named(&'static str);
        impl TaskBody for Named {
            fn run(&self, _ctx: &mut RunContext) {}
        }
        let graph = TaskGraph::new(
            vec![Named("osc"), Named("filter"), Named("out")],
            &[(0, 1), (1, 2)],
            1,
        )
        .unwrap();
        assert_eq!(
            graph.dump(|t| t.0.to_string()),
            "osc\nfilter <- osc\nout <- filter\n"
        );
    }
}
