// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work-stealing thread-pool executor.
//!
//! Each worker owns a [`crossbeam_deque::Worker`] (push/pop at the front); a
//! shared [`crossbeam_deque::Injector`] receives tasks that become ready
//! from a thread other than the one that will eventually run them; idle
//! workers steal from the injector first, then make a randomized attempt
//! against a sibling's [`crossbeam_deque::Stealer`] — the canonical
//! crossbeam-deque consumer loop. One-shot result delivery reuses the same
//! `flume::bounded(1)` shape as the sequential executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use rand::seq::SliceRandom;
use tracing::instrument;

use super::{assemble_input, Executor, PipelineOutput};
use crate::error::{PipelineError, TaskError};
use crate::pipeline::task::{DynTask, Emitter};
use crate::pipeline::{Pipeline, PipelineValue, TaskContext, TaskId, ValueKind};

/// Upper bound on how long an idle worker sleeps on `wake_cv` before
/// rechecking the deques itself. Bounds the cost of a wakeup missed between
/// a waiter's predicate check and another thread's `notify_all`.
const IDLE_WAIT_INTERVAL: Duration = Duration::from_millis(5);

struct NodeEntry {
    task: Arc<dyn DynTask>,
    parents: Vec<TaskId>,
    /// Tasks to wake (decrement `remaining`) when this node completes.
    /// Fixed at construction for static nodes; grown as dynamically
    /// emitted dependents register themselves.
    dependents: Mutex<Vec<TaskId>>,
    remaining: AtomicUsize,
    /// `Some` once the task has produced a value.
    output: Mutex<Option<PipelineValue>>,
    /// Dynamic nodes carry their literal input value directly (set at
    /// `emit` time); static nodes assemble their input from `parents`'
    /// outputs instead, so this is `None` for them.
    fixed_input: Option<PipelineValue>,
    result_tx: Option<flume::Sender<Result<PipelineValue, TaskError>>>,
}

/// Bookkeeping shared by every worker thread: node metadata (including
/// dynamically emitted nodes added mid-run), the aborted flag, and the
/// active-task counter used to detect completion. `wake_cv`/`wake_mutex`
/// back a condition variable that idle workers wait on instead of
/// busy-spinning; every push of a newly ready task, every abort, and run
/// completion (`active` reaching zero) notifies it.
struct Shared {
    nodes: Mutex<HashMap<TaskId, Arc<NodeEntry>>>,
    next_dynamic_id: AtomicUsize,
    active: AtomicUsize,
    aborted: Mutex<Option<(TaskId, TaskError)>>,
    wake_cv: Condvar,
    wake_mutex: Mutex<()>,
    injector: Injector<TaskId>,
}

impl Shared {
    fn is_aborted(&self) -> bool {
        self.aborted.lock().unwrap().is_some()
    }

    fn wake_workers(&self) {
        let _guard = self.wake_mutex.lock().unwrap();
        self.wake_cv.notify_all();
    }

    fn push_ready(&self, id: TaskId) {
        self.injector.push(id);
        self.wake_workers();
    }

    /// Blocks the calling worker until new work may be available, up to
    /// `IDLE_WAIT_INTERVAL` — a bounded backstop against a wakeup missed
    /// between the caller's last empty poll and another thread's
    /// `wake_workers`.
    fn wait_for_work(&self) {
        let guard = self.wake_mutex.lock().unwrap();
        let _ = self.wake_cv.wait_timeout(guard, IDLE_WAIT_INTERVAL).unwrap();
    }

    fn complete(&self, id: TaskId, value: Result<PipelineValue, TaskError>) {
        let nodes = self.nodes.lock().unwrap();
        let Some(entry) = nodes.get(&id).cloned() else {
            return;
        };
        drop(nodes);

        match value {
            Ok(v) => {
                *entry.output.lock().unwrap() = Some(v.clone());
                if let Some(tx) = &entry.result_tx {
                    let _ = tx.send(Ok(v));
                }
                for dep in entry.dependents.lock().unwrap().iter() {
                    self.ready_if_zero(*dep);
                }
            }
            Err(e) => {
                if let Some(tx) = &entry.result_tx {
                    let _ = tx.send(Err(e.clone()));
                }
                *self.aborted.lock().unwrap() = Some((id, e));
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.wake_workers();
    }

    fn ready_if_zero(&self, id: TaskId) {
        let nodes = self.nodes.lock().unwrap();
        let Some(entry) = nodes.get(&id) else { return };
        if entry.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.push_ready(id);
        }
    }
}

impl Emitter for Shared {
    fn emit_dyn(
        &self,
        task: Arc<dyn DynTask>,
        _input_kind: ValueKind,
        _output_kind: ValueKind,
        input_value: PipelineValue,
        depends_on: Vec<TaskId>,
    ) -> (TaskId, flume::Receiver<Result<PipelineValue, TaskError>>) {
        let raw_id = self.next_dynamic_id.fetch_add(1, Ordering::SeqCst);
        let id = TaskId::from_raw(u64::MAX / 2 + raw_id as u64);
        let (tx, rx) = flume::bounded(1);

        // Held for the whole critical section so a dependency can't
        // complete (and miss seeing this node registered as its dependent)
        // between the readiness check and the registration below.
        let mut nodes = self.nodes.lock().unwrap();
        let remaining = depends_on
            .iter()
            .filter(|d| {
                nodes
                    .get(*d)
                    .map(|e| e.output.lock().unwrap().is_none())
                    .unwrap_or(false)
            })
            .count();

        nodes.insert(
            id,
            Arc::new(NodeEntry {
                task,
                parents: depends_on.clone(),
                dependents: Mutex::new(Vec::new()),
                remaining: AtomicUsize::new(remaining),
                output: Mutex::new(None),
                fixed_input: Some(input_value),
                result_tx: Some(tx),
            }),
        );
        for dep in &depends_on {
            if let Some(entry) = nodes.get(dep) {
                if entry.output.lock().unwrap().is_none() {
                    entry.dependents.lock().unwrap().push(id);
                }
            }
        }
        drop(nodes);

        self.active.fetch_add(1, Ordering::SeqCst);
        if remaining == 0 {
            self.push_ready(id);
        }
        (id, rx)
    }
}

/// Runs a pipeline on a fixed-size pool of worker threads using work
/// stealing. `threads` defaults to the detected hardware concurrency.
pub struct ThreadPoolExecutor {
    threads: usize,
}

impl ThreadPoolExecutor {
    pub fn new() -> Self {
        Self {
            threads: num_cpus::get().max(1),
        }
    }

    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

impl Default for ThreadPoolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadPoolExecutor {
    #[instrument(skip_all)]
    fn execute(
        &self,
        pipeline: &mut Pipeline,
        initial_input: PipelineValue,
    ) -> Result<PipelineOutput, PipelineError> {
        let order = pipeline.validate()?;

        let mut dependents_by_parent: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for id in &order {
            for parent in &pipeline.nodes[id.index()].parents {
                dependents_by_parent.entry(*parent).or_default().push(*id);
            }
        }

        let mut nodes = HashMap::new();
        for id in &order {
            let node = &pipeline.nodes[id.index()];
            nodes.insert(
                *id,
                Arc::new(NodeEntry {
                    task: node.task.clone(),
                    parents: node.parents.clone(),
                    dependents: Mutex::new(dependents_by_parent.get(id).cloned().unwrap_or_default()),
                    remaining: AtomicUsize::new(node.parents.len()),
                    output: Mutex::new(None),
                    fixed_input: None,
                    result_tx: None,
                }),
            );
        }

        let active = order.len();
        let shared = Arc::new(Shared {
            nodes: Mutex::new(nodes),
            next_dynamic_id: AtomicUsize::new(0),
            active: AtomicUsize::new(active),
            aborted: Mutex::new(None),
            wake_cv: Condvar::new(),
            wake_mutex: Mutex::new(()),
            injector: Injector::new(),
        });

        for id in &order {
            if shared.nodes.lock().unwrap()[id].parents.is_empty() {
                shared.push_ready(*id);
            }
        }

        let workers: Vec<Worker<TaskId>> = (0..self.threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<TaskId>> = workers.iter().map(|w| w.stealer()).collect();

        std::thread::scope(|scope| {
            for (idx, worker) in workers.into_iter().enumerate() {
                let shared = shared.clone();
                let stealers = stealers.clone();
                let initial_input = initial_input.clone();
                scope.spawn(move || {
                    worker_loop(idx, worker, &stealers, &shared, &initial_input);
                });
            }
        });

        if let Some((id, err)) = shared.aborted.lock().unwrap().take() {
            return Err(PipelineError::TaskFailure(id, err));
        }

        let nodes = shared.nodes.lock().unwrap();
        let terminal = pipeline
            .terminal_nodes()
            .into_iter()
            .filter_map(|id| {
                nodes
                    .get(&id)
                    .and_then(|e| e.output.lock().unwrap().clone())
                    .map(|v| (id, v))
            })
            .collect();
        drop(nodes);

        // Deliver static results through their `TaskResult` handles too.
        let nodes_guard = shared.nodes.lock().unwrap();
        for id in &order {
            if let Some(entry) = nodes_guard.get(id) {
                let value = entry.output.lock().unwrap().clone();
                match value {
                    Some(v) => pipeline.nodes[id.index()].result_tx.send(Ok(v)),
                    None => pipeline.nodes[id.index()].result_tx.send(Err(TaskError::Aborted)),
                }
            }
        }

        Ok(PipelineOutput::new(terminal))
    }
}

fn worker_loop(
    idx: usize,
    local: Worker<TaskId>,
    stealers: &[Stealer<TaskId>],
    shared: &Arc<Shared>,
    initial_input: &PipelineValue,
) {
    let mut rng = rand::thread_rng();
    loop {
        if shared.is_aborted() {
            return;
        }
        let task_id = local.pop().or_else(|| {
            std::iter::repeat_with(|| shared.injector.steal_batch_and_pop(&local))
                .find(|s| !s.is_retry())
                .and_then(|s| s.success())
                .or_else(|| {
                    let mut order: Vec<usize> = (0..stealers.len()).collect();
                    order.shuffle(&mut rng);
                    order
                        .into_iter()
                        .filter(|&i| i != idx)
                        .find_map(|i| match stealers[i].steal() {
                            Steal::Success(t) => Some(t),
                            _ => None,
                        })
                })
        });

        let Some(id) = task_id else {
            if shared.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            shared.wait_for_work();
            continue;
        };

        let entry = {
            let nodes = shared.nodes.lock().unwrap();
            nodes.get(&id).cloned()
        };
        let Some(entry) = entry else { continue };

        let input = if let Some(fixed) = &entry.fixed_input {
            fixed.clone()
        } else if entry.parents.is_empty() {
            initial_input.clone()
        } else {
            let nodes = shared.nodes.lock().unwrap();
            let parent_outputs: Vec<PipelineValue> = entry
                .parents
                .iter()
                .map(|p| {
                    nodes
                        .get(p)
                        .and_then(|e| e.output.lock().unwrap().clone())
                        .unwrap_or(PipelineValue::Any(Arc::new(())))
                })
                .collect();
            assemble_input(&parent_outputs)
        };

        let ctx = TaskContext::new(id, Some(shared.as_ref() as &dyn Emitter));
        let result = entry.task.run_dyn(input, &ctx);
        shared.complete(id, result);
    }
}
