//! Priority-driven event handler scheduler.
//!
//! Events pair a pure trigger predicate with a handler factory. Active
//! handlers live in a heapset (max-priority queue plus membership map)
//! and step through an explicit NOOP → INITIALIZE → EXECUTE → TERMINATE
//! lifecycle, one step per tick, so a tick always terminates. A higher
//! priority handler entering the queue preempts the current head by
//! forcing it DONE without a terminate call; handlers that rely on
//! terminate-time cleanup must establish their post-conditions during
//! execute or tolerate re-entry.

use std::collections::{BinaryHeap, HashMap};
use strum_macros::Display;

/// Execution state of an active handler.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Noop,
    Initialize,
    Execute,
    Terminate,
    Done,
}

/// Return value of a handler step.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResult {
    Success,
    Reset,
    InProgress,
    Shutdown,
}

/// Capability set of an event handler. All three steps default to an
/// immediate SUCCESS.
pub trait EventHandler<S> {
    fn initialize(&mut self, _ctx: &mut HandlerCtx<S>) -> HandlerResult { HandlerResult::Success }

    fn execute(&mut self, _ctx: &mut HandlerCtx<S>) -> HandlerResult { HandlerResult::Success }

    fn terminate(&mut self, _ctx: &mut HandlerCtx<S>) -> HandlerResult { HandlerResult::Success }
}

/// Per-step context handed to a handler: mutable access to the shared
/// state plus the ability to spawn child handlers.
pub struct HandlerCtx<'a, S> {
    pub state: &'a mut S,
    event: String,
    priority: f64,
    children: Vec<Spawned<S>>,
}

impl<S> HandlerCtx<'_, S> {
    /// Name of the event this handler was activated for.
    pub fn event(&self) -> &str { &self.event }

    pub fn priority(&self) -> f64 { self.priority }

    /// Spawns a child handler at the parent's current priority. The
    /// child starts in INITIALIZE on a later tick.
    pub fn spawn(&mut self, event: &str, handler: Box<dyn EventHandler<S>>) {
        self.children.push(Spawned {
            event: event.to_string(),
            priority: self.priority,
            handler,
        });
    }

    /// Spawns a child handler with an explicit priority. A child below
    /// the parent's priority runs only after the parent finishes.
    pub fn spawn_with_priority(
        &mut self,
        event: &str,
        handler: Box<dyn EventHandler<S>>,
        priority: f64,
    ) {
        self.children.push(Spawned {
            event: event.to_string(),
            priority,
            handler,
        });
    }
}

struct Spawned<S> {
    event: String,
    priority: f64,
    handler: Box<dyn EventHandler<S>>,
}

/// A max-priority queue combined with a membership map. Priority updates
/// are applied by re-pushing; superseded entries are skipped lazily.
/// Ties resolve to the earliest insertion.
pub(crate) struct HeapSet<K> {
    heap: BinaryHeap<Entry<K>>,
    live: HashMap<K, u64>,
    seq: u64,
}

struct Entry<K> {
    priority: f64,
    seq: u64,
    key: K,
}

impl<K: Eq> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool { self.seq == other.seq && self.key == other.key }
}

impl<K: Eq> Eq for Entry<K> {}

impl<K: Eq> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}

impl<K: Eq> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority.total_cmp(&other.priority).then(other.seq.cmp(&self.seq))
    }
}

impl<K: Copy + Eq + std::hash::Hash> HeapSet<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            seq: 0,
        }
    }

    /// Adds `key` at `priority`, superseding any earlier entry for the
    /// same key.
    pub fn push(&mut self, key: K, priority: f64) {
        self.seq += 1;
        self.live.insert(key, self.seq);
        self.heap.push(Entry {
            priority,
            seq: self.seq,
            key,
        });
    }

    /// Highest-priority live key.
    pub fn top(&mut self) -> Option<K> {
        while let Some(entry) = self.heap.peek() {
            if self.live.get(&entry.key) == Some(&entry.seq) {
                return Some(entry.key);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes and returns the highest-priority live key.
    pub fn pop(&mut self) -> Option<K> {
        let key = self.top()?;
        self.live.remove(&key);
        self.heap.pop();
        Some(key)
    }

    pub fn contains(&self, key: &K) -> bool { self.live.contains_key(key) }

    pub fn is_empty(&self) -> bool { self.live.is_empty() }

    pub fn len(&self) -> usize { self.live.len() }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}

type Trigger<S> = fn(&S) -> bool;
type Factory<S> = fn() -> Box<dyn EventHandler<S>>;

struct Registration<S> {
    name: String,
    priority: i32,
    trigger: Trigger<S>,
    factory: Option<Factory<S>>,
}

struct ActiveHandler<S> {
    event: String,
    reg_index: Option<usize>,
    exec_state: ExecState,
    priority: f64,
    default_priority: f64,
    behavior: Box<dyn EventHandler<S>>,
}

/// The scheduler: registered events in registration order plus the
/// heapset of active handlers.
pub struct EventManager<S> {
    registrations: Vec<Registration<S>>,
    active: HashMap<u64, ActiveHandler<S>>,
    queue: HeapSet<u64>,
    event_instance: HashMap<String, u64>,
    next_id: u64,
}

impl<S> Default for EventManager<S> {
    fn default() -> Self { Self::new() }
}

impl<S> EventManager<S> {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            active: HashMap::new(),
            queue: HeapSet::new(),
            event_instance: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers an event: trigger plus optional handler factory. Events
    /// without a factory are evaluated for their side observations only.
    pub fn add_event_handler(
        &mut self,
        name: &str,
        priority: i32,
        trigger: Trigger<S>,
        factory: Option<Factory<S>>,
    ) {
        self.registrations.push(Registration {
            name: name.to_string(),
            priority,
            trigger,
            factory,
        });
    }

    /// Drops all registrations and active handlers.
    pub fn reset(&mut self) {
        self.registrations.clear();
        self.active.clear();
        self.queue.clear();
        self.event_instance.clear();
    }

    /// One scheduler tick: monitor pass, then one handler step.
    pub fn run(&mut self, state: &mut S) {
        self.run_event_monitors(state);
        self.run_event_handlers(state);
    }

    /// Evaluates every trigger in registration order and activates
    /// handlers for events that fired and are not already active. If the
    /// new head of the queue changed, the previous head is preempted.
    pub fn run_event_monitors(&mut self, state: &mut S) {
        for idx in 0..self.registrations.len() {
            if !(self.registrations[idx].trigger)(state) {
                continue;
            }
            let Some(factory) = self.registrations[idx].factory else {
                continue;
            };
            let name = self.registrations[idx].name.clone();
            if self.event_instance.contains_key(&name) {
                continue;
            }
            let priority = f64::from(self.registrations[idx].priority);
            self.next_id += 1;
            let id = self.next_id;
            self.active.insert(
                id,
                ActiveHandler {
                    event: name.clone(),
                    reg_index: Some(idx),
                    exec_state: ExecState::Noop,
                    priority,
                    default_priority: priority,
                    behavior: factory(),
                },
            );
            self.event_instance.insert(name, id);

            let prev_top = self.queue.top();
            self.queue.push(id, priority);
            if let Some(prev) = prev_top {
                if self.queue.top() != Some(prev) {
                    // The new handler outranks the running one: stop it
                    // without a terminate call.
                    if let Some(h) = self.active.get_mut(&prev) {
                        h.exec_state = ExecState::Done;
                    }
                }
            }
        }
    }

    /// Runs one lifecycle step of the handler at the head of the queue,
    /// then enqueues any children it spawned.
    pub fn run_event_handlers(&mut self, state: &mut S) {
        let Some(top_id) = self.queue.top() else {
            return;
        };
        let Some(mut handler) = self.active.remove(&top_id) else {
            self.queue.pop();
            return;
        };

        let done;
        let mut children = Vec::new();
        if handler.exec_state == ExecState::Noop {
            // A handler that never started re-checks its trigger before
            // committing; a stale trigger drops it silently.
            let still_active =
                handler.reg_index.is_some_and(|i| (self.registrations[i].trigger)(state));
            if still_active {
                handler.exec_state = ExecState::Initialize;
                // Half-unit boost defends the head slot against priority
                // ties on later ticks.
                handler.priority = handler.default_priority + 0.5;
                self.queue.push(top_id, handler.priority);
                done = Self::run_event(&mut handler, state, &mut children);
            } else {
                handler.priority = handler.default_priority;
                self.queue.pop();
                self.event_instance.remove(&handler.event);
                return;
            }
        } else {
            done = Self::run_event(&mut handler, state, &mut children);
        }

        if done {
            handler.priority = handler.default_priority;
            self.queue.pop();
            self.event_instance.remove(&handler.event);
        } else {
            self.active.insert(top_id, handler);
        }

        for child in children {
            self.next_id += 1;
            let id = self.next_id;
            self.queue.push(id, child.priority);
            self.active.insert(
                id,
                ActiveHandler {
                    event: child.event,
                    reg_index: None,
                    exec_state: ExecState::Initialize,
                    priority: child.priority,
                    default_priority: child.priority,
                    behavior: child.handler,
                },
            );
        }
    }

    fn run_event(
        handler: &mut ActiveHandler<S>,
        state: &mut S,
        children: &mut Vec<Spawned<S>>,
    ) -> bool {
        let mut ctx = HandlerCtx {
            state,
            event: handler.event.clone(),
            priority: handler.priority,
            children: Vec::new(),
        };
        match handler.exec_state {
            ExecState::Initialize => match handler.behavior.initialize(&mut ctx) {
                HandlerResult::Success => handler.exec_state = ExecState::Execute,
                HandlerResult::Shutdown => handler.exec_state = ExecState::Done,
                _ => {}
            },
            ExecState::Execute => match handler.behavior.execute(&mut ctx) {
                HandlerResult::Success => handler.exec_state = ExecState::Terminate,
                HandlerResult::Reset => handler.exec_state = ExecState::Initialize,
                HandlerResult::Shutdown => handler.exec_state = ExecState::Done,
                HandlerResult::InProgress => {}
            },
            ExecState::Terminate => match handler.behavior.terminate(&mut ctx) {
                HandlerResult::Success => handler.exec_state = ExecState::Done,
                HandlerResult::Reset => handler.exec_state = ExecState::Initialize,
                _ => {}
            },
            ExecState::Noop | ExecState::Done => {}
        }
        children.append(&mut ctx.children);

        if handler.exec_state == ExecState::Done {
            handler.exec_state = ExecState::Initialize;
            true
        } else {
            false
        }
    }

    /// Name of the event whose handler currently heads the queue.
    pub fn current_event(&mut self) -> Option<String> {
        let id = self.queue.top()?;
        self.active.get(&id).map(|h| h.event.clone())
    }

    /// Execution state of the active handler for a registered event.
    pub fn exec_state_of(&self, event: &str) -> Option<ExecState> {
        let id = self.event_instance.get(event)?;
        self.active.get(id).map(|h| h.exec_state)
    }

    /// Number of handlers currently in the queue.
    pub fn active_handlers(&self) -> usize { self.queue.len() }
}
