// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-task contract, its type-erased form stored in the graph, and the
//! one-shot result future handed back to callers.
//!
//! One-shot delivery uses `flume::bounded(1)`, the same "single reply"
//! channel shape the teacher codebase uses for its own request/response
//! pattern; a small cache layer on top lets a cloned [`TaskResult`] be read
//! more than once, since downstream holders and the external caller may both
//! want the value.

use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::value::{PipelineValue, TypedValue, ValueKind};
use super::TaskId;
use crate::error::TaskError;

/// A node's computation: given a typed input, produce a typed output.
/// Implementors may request a [`TaskContext`] to dynamically emit further
/// tasks with their dependency set bound atomically at creation.
pub trait Task: Send + Sync {
    type Input: TypedValue;
    type Output: TypedValue;

    fn run(&self, input: Self::Input, ctx: &TaskContext) -> Result<Self::Output, TaskError>;
}

/// Type-erased form of [`Task`] stored in the graph so nodes of different
/// concrete types can live side by side in one [`Vec`].
pub(crate) trait DynTask: Send + Sync {
    fn run_dyn(&self, input: PipelineValue, ctx: &TaskContext) -> Result<PipelineValue, TaskError>;
}

pub(crate) struct BoxedTask<T: Task> {
    task: T,
}

impl<T: Task> BoxedTask<T> {
    pub fn new(task: T) -> Self {
        Self { task }
    }
}

impl<T: Task> DynTask for BoxedTask<T> {
    fn run_dyn(&self, input: PipelineValue, ctx: &TaskContext) -> Result<PipelineValue, TaskError> {
        let typed_in = T::Input::from_value(input)?;
        let out = self.task.run(typed_in, ctx)?;
        Ok(out.into_value())
    }
}

pub(crate) use BoxedTask as Boxed;

/// A plain function or closure adapted into a [`Task`], ignoring dynamic
/// emission. Convenient for the common case (map/reduce-style steps).
pub struct TaskFn<F, I, O> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<F, I, O> TaskFn<F, I, O>
where
    F: Fn(I) -> O + Send + Sync,
    I: TypedValue,
    O: TypedValue,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, I, O> Task for TaskFn<F, I, O>
where
    F: Fn(I) -> O + Send + Sync,
    I: TypedValue,
    O: TypedValue,
{
    type Input = I;
    type Output = O;

    fn run(&self, input: I, _ctx: &TaskContext) -> Result<O, TaskError> {
        Ok((self.f)(input))
    }
}

/// A fallible plain function adapted into a [`Task`].
pub struct TryTaskFn<F, I, O> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<F, I, O> TryTaskFn<F, I, O>
where
    F: Fn(I) -> Result<O, TaskError> + Send + Sync,
    I: TypedValue,
    O: TypedValue,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, I, O> Task for TryTaskFn<F, I, O>
where
    F: Fn(I) -> Result<O, TaskError> + Send + Sync,
    I: TypedValue,
    O: TypedValue,
{
    type Input = I;
    type Output = O;

    fn run(&self, input: I, _ctx: &TaskContext) -> Result<O, TaskError> {
        (self.f)(input)
    }
}

/// Sink an executor implements to accept a dynamically emitted task,
/// binding its dependency set in the same atomic step as its creation.
pub(crate) trait Emitter: Send + Sync {
    fn emit_dyn(
        &self,
        task: Arc<dyn DynTask>,
        input_kind: ValueKind,
        output_kind: ValueKind,
        input_value: PipelineValue,
        depends_on: Vec<TaskId>,
    ) -> (TaskId, flume::Receiver<Result<PipelineValue, TaskError>>);
}

/// Handed to a running task's body; only non-`None` inside an executor that
/// supports dynamic emission (all three shipped executors do).
pub struct TaskContext<'a> {
    pub(crate) emitter: Option<&'a dyn Emitter>,
    pub(crate) task_id: TaskId,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(task_id: TaskId, emitter: Option<&'a dyn Emitter>) -> Self {
        Self { emitter, task_id }
    }

    /// The id of the task currently running, for logging/diagnostics.
    pub fn current_task(&self) -> TaskId {
        self.task_id
    }

    /// Atomically creates a new node running `task` on `input`, depending on
    /// `depends_on` in addition to its implicit creation-time ordering.
    pub fn emit<T>(
        &self,
        task: T,
        input: T::Input,
        depends_on: &[TaskId],
    ) -> Result<TaskResult<T::Output>, TaskError>
    where
        T: Task + 'static,
    {
        let emitter = self.emitter.ok_or_else(|| {
            TaskError::Failed("this executor does not support dynamic task emission".into())
        })?;
        let boxed: Arc<dyn DynTask> = Arc::new(BoxedTask::new(task));
        let (_id, rx) = emitter.emit_dyn(
            boxed,
            T::Input::kind(),
            T::Output::kind(),
            input.into_value(),
            depends_on.to_vec(),
        );
        Ok(TaskResult::from_receiver(rx))
    }
}

/// The sending half of a node's one-shot result channel, held by the graph
/// in type-erased (`PipelineValue`) form and fulfilled exactly once by
/// whichever executor runs the node.
pub struct TaskResultSender(flume::Sender<Result<PipelineValue, TaskError>>);

impl TaskResultSender {
    pub(crate) fn send(&self, result: Result<PipelineValue, TaskError>) {
        // A receiver dropped mid-run (e.g. caller discarded the handle) is
        // not itself an error; the value is simply unread.
        let _ = self.0.send(result);
    }
}

struct TaskResultInner {
    receiver: flume::Receiver<Result<PipelineValue, TaskError>>,
    cache: OnceLock<Result<PipelineValue, TaskError>>,
    lock: Mutex<()>,
}

/// A shareable one-shot future over a task's output. Every static and
/// dynamic task publishes through exactly one such channel; cloning a
/// `TaskResult` and calling [`get`](TaskResult::get) from several holders is
/// safe and returns the same value to each.
pub struct TaskResult<T> {
    inner: Arc<TaskResultInner>,
    _marker: PhantomData<T>,
}

impl<T> Clone for TaskResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: TypedValue> TaskResult<T> {
    pub(crate) fn channel() -> (Self, TaskResultSender) {
        let (tx, rx) = flume::bounded(1);
        (Self::from_receiver(rx), TaskResultSender(tx))
    }

    pub(crate) fn from_receiver(receiver: flume::Receiver<Result<PipelineValue, TaskError>>) -> Self {
        Self {
            inner: Arc::new(TaskResultInner {
                receiver,
                cache: OnceLock::new(),
                lock: Mutex::new(()),
            }),
            _marker: PhantomData,
        }
    }

    /// Blocks until the task completes (or returns immediately if it
    /// already has), yielding its typed output or the error it failed with.
    pub fn get(&self) -> Result<T, TaskError> {
        let raw = self.raw_get()?;
        T::from_value(raw)
    }

    /// Non-blocking: `Some` once the task has completed.
    pub fn try_get(&self) -> Option<Result<T, TaskError>> {
        self.inner
            .cache
            .get()
            .cloned()
            .or_else(|| self.inner.receiver.try_recv().ok())
            .map(|raw| raw.and_then(T::from_value))
    }

    fn raw_get(&self) -> Result<PipelineValue, TaskError> {
        if let Some(v) = self.inner.cache.get() {
            return v.clone();
        }
        let _guard = self.inner.lock.lock();
        if let Some(v) = self.inner.cache.get() {
            return v.clone();
        }
        let v = self
            .inner
            .receiver
            .recv()
            .unwrap_or(Err(TaskError::Aborted));
        let _ = self.inner.cache.set(v.clone());
        v
    }
}
