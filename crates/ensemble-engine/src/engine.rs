//! The engine: request intake, the three-phase event pipeline, and the
//! process handle a driver runs cycles on.
//!
//! Requests arrive through [`EngineInterface`]s on a channel. Each call to
//! [`Engine::process_events`] pre-processes what is pending into batches and
//! pushes them onto a ring for the realtime side. [`ProcessHandle::run_cycle`]
//! executes each batch at its frame time and hands it back on a second ring.
//! [`Engine::post_process`] then answers requesters, broadcasts the changes,
//! records undo history, and frees whatever the batch retired.

use crate::broadcaster::Broadcaster;
use crate::compiled::CompiledGraph;
use crate::events::{pre_process, Mode, Outcome, PreContext, Prepared};
use crate::factory::{BlockFactory, Direction, FactoryChain, InternalFactory, PortKind};
use crate::runtime::{GraphRuntime, NotifyKeys, PortRuntime};
use crate::store::Store;
use crate::undo::{History, UndoEntry};
use crossbeam_channel::{Receiver, Sender};
use ensemble_core::{
    notification_channel, uris, Atom, AtomicFlag, BufferFactory, Context, EngineConfig, Error,
    NotificationHub, Path, Properties, Result, RtErrors, RunContext, Uri, UriMap, WorkerPool,
};
use ensemble_protocol::{Interface, InterfaceExt, Message, Seq, SequenceCounter, Status};
use hashbrown::HashMap;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A message as it arrived, with who sent it.
struct Request {
    msg: Message,
    client: Uri,
    respondee: Option<Arc<dyn Interface>>,
}

/// One pre-processed message travelling through the pipeline.
struct Event {
    seq: Seq,
    name: &'static str,
    subject: String,
    respondee: Option<Arc<dyn Interface>>,
    outcome: Outcome,
}

impl Event {
    fn new(request: &Request, outcome: Outcome) -> Self {
        Self {
            seq: request.msg.seq().unwrap_or(0),
            name: request.msg.name(),
            subject: request.msg.subject(),
            respondee: request.respondee.clone(),
            outcome,
        }
    }

    /// An event the engine generated itself, e.g. an undo step.
    fn internal(msg: &Message, outcome: Outcome) -> Self {
        Self {
            seq: 0,
            name: msg.name(),
            subject: msg.subject(),
            respondee: None,
            outcome,
        }
    }
}

/// Events that execute together in one realtime step.
pub(crate) struct Batch {
    /// Absolute frame at which the batch takes effect.
    time: u64,
    mode: Mode,
    events: Vec<Event>,
}

impl Batch {
    fn single(request: &Request, outcome: Outcome) -> Self {
        Self {
            time: 0,
            mode: Mode::Normal,
            events: vec![Event::new(request, outcome)],
        }
    }

    fn execute(&mut self, ctx: &RunContext) {
        for event in &mut self.events {
            if let Ok(prepared) = &mut event.outcome {
                prepared.plan.execute(ctx);
            }
        }
    }
}

/// State shared between the engine, its interfaces and the process handle.
struct Shared {
    config: EngineConfig,
    store: Mutex<Store>,
    factory: FactoryChain,
    buffers: BufferFactory,
    uri_map: UriMap,
    broadcaster: Broadcaster,
    notifications: NotificationHub,
    errors: Arc<RtErrors>,
    history: Mutex<History>,
    keys: NotifyKeys,
    root: Arc<GraphRuntime>,
    /// Frame at the start of the next cycle.
    frame: AtomicU64,
    /// Batches pushed to the realtime side and not yet post-processed.
    in_flight: AtomicUsize,
    requests: Sender<Request>,
    next_client: AtomicUsize,
}

struct PreState {
    requests: Receiver<Request>,
    pending: VecDeque<Request>,
    /// Open bundles, by client.
    bundles: HashMap<Uri, Vec<Request>>,
    to_rt: HeapProd<Box<Batch>>,
    last_time: u64,
}

struct PostState {
    from_rt: HeapCons<Box<Batch>>,
}

/// A live-editable audio graph host.
///
/// # Example
///
/// ```ignore
/// use ensemble_engine::Engine;
/// use ensemble_protocol::{ChannelClient, InterfaceExt};
///
/// let engine = Engine::new(EngineConfig::default(), vec![Arc::new(MyFactory)])?;
/// let (client, inbox) = ChannelClient::new("app:ui");
/// let client = Arc::new(client);
/// engine.register_client(client.clone());
///
/// let session = engine.interface(Some(client));
/// session.put("/osc", osc_properties, Context::Default);
/// engine.flush()?;
/// ```
pub struct Engine {
    shared: Arc<Shared>,
    pre: Mutex<PreState>,
    post: Mutex<PostState>,
    /// The process handle while no external driver owns it.
    driver: Mutex<Option<ProcessHandle>>,
}

impl Engine {
    /// Create an engine. Prototypes resolve through `factories` in order,
    /// then through the built-in blocks.
    pub fn new(config: EngineConfig, factories: Vec<Arc<dyn BlockFactory>>) -> Result<Self> {
        config.validate()?;

        let mut factory = FactoryChain::new();
        for f in factories {
            factory.push(f);
        }
        factory.push(Arc::new(InternalFactory));

        let uri_map = UriMap::new();
        let keys = NotifyKeys {
            value: uri_map.map(uris::VALUE),
            activity: uri_map.map(uris::ACTIVITY),
            monitor_all: Arc::new(AtomicFlag::new(false)),
        };

        let errors = Arc::new(RtErrors::new(config.notification_capacity));
        let notifications = NotificationHub::new();
        let context = |id: usize| {
            let (notifier, reader) = notification_channel(config.notification_capacity);
            notifications.add_reader(reader);
            RunContext::new(id, config.sample_rate, notifier, errors.clone())
        };
        let mut root_ctx = context(0);
        root_ctx.set_realtime(true);
        let workers = (1..config.num_threads).map(&context).collect();
        let pool = WorkerPool::new(workers)?;

        let root = Arc::new(GraphRuntime::new());
        let root_props = Properties::new()
            .with(uris::TYPE, Atom::uri(uris::GRAPH))
            .with(uris::POLYPHONY, Atom::int(1));
        let store = Store::new(root.clone(), root_props);

        let buffers = BufferFactory::new(
            config.block_length as usize,
            config.sequence_capacity,
            config.buffer_pool_capacity,
        );
        let (requests_tx, requests_rx) = crossbeam_channel::unbounded();
        let (to_rt, incoming) = HeapRb::<Box<Batch>>::new(config.event_queue_capacity).split();
        let (done, from_rt) = HeapRb::<Box<Batch>>::new(config.event_queue_capacity).split();

        tracing::info!(
            sample_rate = config.sample_rate,
            block_length = config.block_length,
            threads = config.num_threads,
            prototypes = factory.prototypes().len(),
            "engine created"
        );

        let shared = Arc::new(Shared {
            history: Mutex::new(History::new(config.undo_depth)),
            config,
            store: Mutex::new(store),
            factory,
            buffers,
            uri_map,
            broadcaster: Broadcaster::new(),
            notifications,
            errors,
            keys,
            root,
            frame: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            requests: requests_tx,
            next_client: AtomicUsize::new(1),
        });
        let handle = ProcessHandle {
            shared: shared.clone(),
            root: root_ctx,
            pool,
            incoming,
            done,
        };
        Ok(Self {
            shared,
            pre: Mutex::new(PreState {
                requests: requests_rx,
                pending: VecDeque::new(),
                bundles: HashMap::new(),
                to_rt,
                last_time: 0,
            }),
            post: Mutex::new(PostState { from_rt }),
            driver: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Open a session. Responses to its requests go to `respondee`.
    pub fn interface(&self, respondee: Option<Arc<dyn Interface>>) -> Arc<EngineInterface> {
        let n = self.shared.next_client.fetch_add(1, Ordering::Relaxed);
        Arc::new(EngineInterface {
            uri: Uri::new(format!("ens:client/{n}")),
            seq: SequenceCounter::new(),
            respondee,
            requests: self.shared.requests.clone(),
        })
    }

    /// Receive every broadcast from now on.
    pub fn register_client(&self, client: Arc<dyn Interface>) {
        self.shared.broadcaster.register(client);
    }

    pub fn unregister_client(&self, uri: &Uri) -> bool {
        self.shared.broadcaster.unregister(uri)
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.shared.broadcaster
    }

    /// Report the value of every port, not only those with `broadcast` set.
    pub fn set_broadcast_all(&self, all: bool) {
        tracing::debug!(all, "monitoring every port");
        self.shared.keys.monitor_all.set(all);
    }

    pub fn uri_map(&self) -> &UriMap {
        &self.shared.uri_map
    }

    /// Hand the process handle to an external driver.
    ///
    /// Afterwards [`Engine::run_cycle`] and [`Engine::flush`] fail with
    /// [`Error::DriverAttached`]; the driver calls
    /// [`ProcessHandle::run_cycle`] and something else must keep calling
    /// [`Engine::process_events`] and [`Engine::post_process`].
    pub fn take_process_handle(&self) -> Option<ProcessHandle> {
        let handle = self.driver.lock().take();
        if handle.is_some() {
            tracing::info!("process handle taken by external driver");
        }
        handle
    }

    /// Pre-process pending requests. Returns the number of batches queued.
    pub fn process_events(&self) -> usize {
        self.pre_process_requests(None)
    }

    /// Like [`Engine::process_events`], with the batches taking effect at
    /// frame `time` (or the next cycle if that has already passed).
    pub fn process_events_at(&self, time: u64) -> usize {
        self.pre_process_requests(Some(time))
    }

    /// Run one cycle on the engine's own process handle. Call
    /// [`Engine::post_process`] afterwards.
    pub fn run_cycle(&self, nframes: u32) -> Result<()> {
        let mut driver = self.driver.lock();
        let handle = driver.as_mut().ok_or(Error::DriverAttached)?;
        handle.run_cycle(nframes)
    }

    /// Write one root input port for the next cycle.
    pub fn write_input(&self, index: usize, samples: &[f32]) -> Result<()> {
        let mut driver = self.driver.lock();
        driver
            .as_mut()
            .ok_or(Error::DriverAttached)?
            .write_input(index, samples)
    }

    /// Read a root output port as of the last cycle.
    pub fn read_output(&self, index: usize, out: &mut [f32]) -> Result<usize> {
        let driver = self.driver.lock();
        driver
            .as_ref()
            .ok_or(Error::DriverAttached)?
            .read_output(index, out)
    }

    /// Process, run and post-process until every request so far is
    /// answered. Returns the number of cycles run.
    pub fn flush(&self) -> Result<usize> {
        let mut driver = self.driver.lock();
        let handle = driver.as_mut().ok_or(Error::DriverAttached)?;
        let block_length = self.shared.config.block_length;
        let mut cycles = 0;
        loop {
            self.process_events();
            if self.is_idle() {
                break;
            }
            handle.run_cycle(block_length)?;
            cycles += 1;
            self.post_process();
        }
        self.post_process();
        Ok(cycles)
    }

    /// With an external driver, pre- and post-process until idle or until
    /// `timeout` passes. Returns whether the engine went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_events();
            self.post_process();
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Nothing queued and nothing waiting for the realtime side.
    pub fn is_idle(&self) -> bool {
        let pre = self.pre.lock();
        pre.pending.is_empty()
            && pre.requests.is_empty()
            && self.shared.in_flight.load(Ordering::Acquire) == 0
    }

    /// Frame at the start of the next cycle.
    pub fn frame(&self) -> u64 {
        self.shared.frame.load(Ordering::Acquire)
    }

    fn pre_context<'a>(&'a self, store: &'a mut Store) -> PreContext<'a> {
        PreContext {
            store,
            factory: &self.shared.factory,
            buffers: &self.shared.buffers,
            sample_rate: self.shared.config.sample_rate,
            contexts: self.shared.config.num_threads,
            keys: self.shared.keys.clone(),
        }
    }

    fn pre_process_requests(&self, stamp: Option<u64>) -> usize {
        let mut guard = self.pre.lock();
        let pre = &mut *guard;
        pre.pending.extend(pre.requests.try_iter());

        let capacity = self.shared.config.event_queue_capacity;
        let mut queued = 0;
        while let Some(next) = pre.pending.front() {
            let in_flight = self.shared.in_flight.load(Ordering::Acquire);
            if in_flight >= capacity {
                tracing::trace!(in_flight, "event queue full, deferring");
                break;
            }
            // Undo replays history, so it waits until every earlier event
            // has been recorded.
            let is_history = matches!(next.msg, Message::Undo { .. } | Message::Redo { .. })
                && !pre.bundles.contains_key(&next.client);
            if is_history && in_flight > 0 {
                break;
            }
            let Some(request) = pre.pending.pop_front() else {
                break;
            };
            let Some(mut batch) = self.prepare(pre, request) else {
                continue;
            };

            let now = self.shared.frame.load(Ordering::Acquire);
            batch.time = stamp.unwrap_or(now).max(now).max(pre.last_time);
            pre.last_time = batch.time;

            self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
            if pre.to_rt.try_push(Box::new(batch)).is_err() {
                self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                tracing::error!("event ring full, batch dropped");
                continue;
            }
            queued += 1;
            // Later requests must see the recorded history first.
            if is_history {
                break;
            }
        }
        queued
    }

    /// Turn one request into a batch, or buffer it in an open bundle.
    fn prepare(&self, pre: &mut PreState, request: Request) -> Option<Batch> {
        let bundling = pre.bundles.contains_key(&request.client);
        match &request.msg {
            Message::BundleBegin { .. } if bundling => {
                tracing::warn!(client = %request.client, "nested bundle");
                Some(Batch::single(&request, Err(Status::BadRequest)))
            }
            Message::BundleBegin { .. } => {
                pre.bundles.insert(request.client.clone(), vec![request]);
                None
            }
            Message::BundleEnd { .. } => match pre.bundles.remove(&request.client) {
                Some(items) => Some(self.prepare_bundle(items, request)),
                None => Some(Batch::single(&request, Err(Status::BadRequest))),
            },
            _ if bundling => {
                if let Some(items) = pre.bundles.get_mut(&request.client) {
                    items.push(request);
                }
                None
            }
            Message::Undo { .. } => Some(self.prepare_history(request, Mode::Undo)),
            Message::Redo { .. } => Some(self.prepare_history(request, Mode::Redo)),
            msg => {
                let mut store = self.shared.store.lock();
                let mut ctx = self.pre_context(&mut store);
                let outcome = pre_process(&mut ctx, msg);
                Some(Batch::single(&request, outcome))
            }
        }
    }

    fn prepare_bundle(&self, items: Vec<Request>, end: Request) -> Batch {
        let mut store = self.shared.store.lock();
        let mut ctx = self.pre_context(&mut store);
        let mut events = Vec::with_capacity(items.len() + 1);
        for item in &items {
            let outcome = match item.msg {
                Message::BundleBegin { .. } => Ok(Prepared::default()),
                _ => pre_process(&mut ctx, &item.msg),
            };
            events.push(Event::new(item, outcome));
        }
        events.push(Event::new(&end, Ok(Prepared::default())));
        tracing::debug!(events = events.len(), "bundle prepared");
        Batch {
            time: 0,
            mode: Mode::Normal,
            events,
        }
    }

    fn prepare_history(&self, request: Request, mode: Mode) -> Batch {
        let entry = self.shared.history.lock().take(mode);
        let Some(entry) = entry else {
            return Batch::single(&request, Err(Status::NotFound));
        };
        tracing::debug!(?mode, events = entry.num_events(), "replaying history");

        let mut store = self.shared.store.lock();
        let mut ctx = self.pre_context(&mut store);
        let mut events: Vec<Event> = entry
            .replay()
            .map(|msg| Event::internal(msg, pre_process(&mut ctx, msg)))
            .collect();
        events.push(Event::new(&request, Ok(Prepared::default())));
        Batch {
            time: 0,
            mode,
            events,
        }
    }

    /// Finish every batch the realtime side has executed, then publish
    /// monitored values. Returns the number of batches finished.
    pub fn post_process(&self) -> usize {
        let mut finished = 0;
        {
            let mut post = self.post.lock();
            while let Some(batch) = post.from_rt.try_pop() {
                self.finish_batch(*batch);
                self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                finished += 1;
            }
        }
        self.publish_notifications();
        self.shared.errors.flush();
        finished
    }

    fn finish_batch(&self, batch: Batch) {
        let merge_key = match batch.events.as_slice() {
            [Event {
                outcome: Ok(prepared),
                ..
            }] => prepared.merge_key.clone(),
            _ => None,
        };

        let mut entry = UndoEntry::new();
        let mut broadcasts = Vec::new();
        for event in batch.events {
            match event.outcome {
                Ok(prepared) => {
                    tracing::debug!(op = event.name, subject = %event.subject, "applied");
                    if let Some(respondee) = &event.respondee {
                        if event.seq != 0 {
                            respondee.response(event.seq, Status::Success, event.subject.as_str());
                        }
                        for reply in prepared.reply {
                            respondee.message(reply);
                        }
                    }
                    broadcasts.extend(prepared.broadcast);
                    entry.push_event(prepared.inverse);
                }
                Err(status) => {
                    tracing::debug!(op = event.name, subject = %event.subject, %status, "rejected");
                    match (&event.respondee, event.seq) {
                        (Some(respondee), 0) => respondee
                            .error(format!("{} {}: {}", event.name, event.subject, status)),
                        (Some(respondee), seq) => respondee.response(seq, status, event.subject),
                        (None, _) => {
                            tracing::warn!(op = event.name, subject = %event.subject, %status, "event failed")
                        }
                    }
                }
            }
        }

        self.shared.broadcaster.send_all(&broadcasts);
        entry.set_merge_key(merge_key);
        self.shared.history.lock().record(batch.mode, entry);
    }

    /// Turn realtime notifications into property updates and broadcasts.
    fn publish_notifications(&self) {
        let end = self.shared.frame.load(Ordering::Acquire);
        let mut updates = Vec::new();
        {
            let mut store = self.shared.store.lock();
            self.shared.notifications.drain_until(end, |note| {
                let Some(path) = store.path_of(note.subject).cloned() else {
                    return;
                };
                let Some(key) = self.shared.uri_map.unmap(note.key) else {
                    return;
                };
                if note.key == self.shared.keys.value {
                    if let Some(object) = store.get_mut(&path) {
                        object.properties.set(key.as_str(), note.value.clone());
                    }
                }
                updates.push(Message::SetProperty {
                    seq: 0,
                    subject: Uri::from(&path),
                    key: Uri::from(key),
                    value: note.value,
                    ctx: Context::Default,
                });
            });
        }
        if !updates.is_empty() {
            tracing::trace!(count = updates.len(), "publishing port values");
        }
        self.shared.broadcaster.send_all(&updates);
    }

    /// Properties of the object at `path`.
    pub fn properties(&self, path: &Path) -> Option<Properties> {
        self.shared
            .store
            .lock()
            .get(path)
            .map(|object| object.properties.clone())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.shared.store.lock().contains(path)
    }

    pub fn has_arc(&self, tail: &Path, head: &Path) -> bool {
        self.shared.store.lock().has_arc(tail, head)
    }

    pub fn num_objects(&self) -> usize {
        self.shared.store.lock().num_objects()
    }

    pub fn num_arcs(&self) -> usize {
        self.shared.store.lock().num_arcs()
    }

    /// Every object with its properties, and every arc, in path order.
    pub fn snapshot(&self) -> (Vec<(Path, Properties)>, Vec<(Path, Path)>) {
        self.shared.store.lock().snapshot()
    }

    /// The installed run order of the graph at `path`.
    pub fn dump(&self, path: &Path) -> Option<String> {
        let compiled = self.shared.store.lock().graph(path)?.runtime.compiled();
        Some(compiled.map(|c| c.dump()).unwrap_or_default())
    }

    /// Compiled plan of the graph at `path`, if one is installed.
    pub fn compiled(&self, path: &Path) -> Option<Arc<CompiledGraph>> {
        self.shared.store.lock().graph(path)?.runtime.compiled()
    }

    /// Current realtime value of the port at `path`.
    pub fn port_value(&self, path: &Path) -> Option<f32> {
        Some(self.shared.store.lock().port(path)?.runtime.value())
    }

    pub fn prototypes(&self) -> Vec<String> {
        self.shared.factory.prototypes()
    }

    pub fn can_undo(&self) -> bool {
        self.shared.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.shared.history.lock().can_redo()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        tracing::debug!(frame = self.frame(), "engine dropped");
    }
}

/// A client session: sends requests into the engine.
pub struct EngineInterface {
    uri: Uri,
    seq: SequenceCounter,
    respondee: Option<Arc<dyn Interface>>,
    requests: Sender<Request>,
}

impl Interface for EngineInterface {
    fn uri(&self) -> &Uri {
        &self.uri
    }

    fn message(&self, msg: Message) {
        let request = Request {
            msg,
            client: self.uri.clone(),
            respondee: self.respondee.clone(),
        };
        if self.requests.send(request).is_err() {
            tracing::warn!(client = %self.uri, "engine gone, request dropped");
        }
    }

    fn next_seq(&self) -> Seq {
        self.seq.next()
    }

    fn respondee(&self) -> Option<Arc<dyn Interface>> {
        self.respondee.clone()
    }
}

/// The realtime half of the engine, driven once per audio cycle.
pub struct ProcessHandle {
    shared: Arc<Shared>,
    root: RunContext,
    pool: WorkerPool<CompiledGraph>,
    incoming: HeapCons<Box<Batch>>,
    done: HeapProd<Box<Batch>>,
}

impl ProcessHandle {
    pub fn block_length(&self) -> u32 {
        self.shared.config.block_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.config.sample_rate
    }

    /// Run one cycle of `nframes`. Batches due inside the cycle split it so
    /// each takes effect at its exact frame.
    pub fn run_cycle(&mut self, nframes: u32) -> Result<()> {
        let block_length = self.shared.config.block_length;
        if nframes > block_length {
            return Err(Error::BlockLength {
                requested: nframes,
                block_length,
            });
        }
        let start = self.shared.frame.load(Ordering::Acquire);
        let end = start + u64::from(nframes);
        self.root.locate(start, nframes);

        let mut offset = 0;
        while let Some(time) = self.incoming.try_peek().map(|batch| batch.time) {
            if time >= end {
                break;
            }
            let at = time.saturating_sub(start) as u32;
            if at > offset {
                self.run_slice(offset, at - offset);
                offset = at;
            }
            let Some(mut batch) = self.incoming.try_pop() else {
                break;
            };
            self.root.slice(offset, nframes - offset);
            batch.execute(&self.root);
            if self.done.try_push(batch).is_err() {
                self.root.report_error("finished event ring full");
            }
        }
        if offset < nframes {
            self.run_slice(offset, nframes - offset);
        }
        self.shared.frame.store(end, Ordering::Release);
        Ok(())
    }

    fn run_slice(&mut self, offset: u32, nframes: u32) {
        self.root.slice(offset, nframes);
        let root = &self.shared.root;
        let guard = root.load_compiled();
        let Some(compiled) = &*guard else {
            return;
        };
        if !root.is_enabled() {
            compiled.silence_outputs(&mut self.root);
            return;
        }
        self.pool.run_cycle(compiled, &mut self.root);
        compiled.finish(&mut self.root);
    }

    fn root_port(&self, index: usize, direction: Direction) -> Result<Arc<PortRuntime>> {
        self.shared
            .root
            .ports()
            .iter()
            .find(|port| port.index() == index && port.direction() == direction)
            .cloned()
            .ok_or(Error::PortIndex(index))
    }

    /// Fill root input port `index` for the next cycle. Audio and CV ports
    /// take up to a block of samples; control ports take the last sample.
    pub fn write_input(&mut self, index: usize, samples: &[f32]) -> Result<()> {
        let port = self.root_port(index, Direction::Input)?;
        // SAFETY: between cycles on the driver thread.
        let buffer = unsafe { port.boundary_mut() }.ok_or(Error::PortIndex(index))?;
        match port.kind() {
            PortKind::Audio | PortKind::Cv => {
                let dst = buffer.samples_mut();
                let n = samples.len().min(dst.len());
                dst[..n].copy_from_slice(&samples[..n]);
                dst[n..].fill(0.0);
            }
            PortKind::Control => {
                if let Some(&value) = samples.last() {
                    buffer.set_block(value, 0, 1);
                }
            }
            PortKind::Atom => return Err(Error::PortIndex(index)),
        }
        Ok(())
    }

    /// Append an event to root atom input port `index`, `offset` frames
    /// into the next cycle. Returns false if the buffer is full.
    pub fn write_event(&mut self, index: usize, offset: u32, value: &Atom) -> Result<bool> {
        let port = self.root_port(index, Direction::Input)?;
        if port.kind() != PortKind::Atom {
            return Err(Error::PortIndex(index));
        }
        // SAFETY: between cycles on the driver thread.
        let buffer = unsafe { port.boundary_mut() }.ok_or(Error::PortIndex(index))?;
        Ok(buffer.append_event(
            i64::from(offset),
            value.size(),
            value.atom_type(),
            value.get_body(),
        ))
    }

    /// Copy root output port `index` into `out`. Returns the number of
    /// samples copied.
    pub fn read_output(&self, index: usize, out: &mut [f32]) -> Result<usize> {
        let port = self.root_port(index, Direction::Output)?;
        if !port.kind().is_numeric() {
            return Err(Error::PortIndex(index));
        }
        // SAFETY: between cycles on the driver thread.
        let buffer = unsafe { port.boundary() }.ok_or(Error::PortIndex(index))?;
        let src = buffer.samples();
        let n = src.len().min(out.len());
        out[..n].copy_from_slice(&src[..n]);
        Ok(n)
    }
}
