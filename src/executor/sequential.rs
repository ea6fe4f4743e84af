// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-threaded executor: topological order, one task to completion at a
//! time, dynamically emitted tasks drained in creation order before the run
//! is considered complete.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;

use super::{assemble_input, Executor, PipelineOutput};
use crate::error::{PipelineError, TaskError};
use crate::pipeline::task::{DynTask, Emitter};
use crate::pipeline::{Pipeline, PipelineValue, TaskContext, TaskId, ValueKind};

struct DynamicNode {
    id: TaskId,
    task: Arc<dyn DynTask>,
    depends_on: Vec<TaskId>,
    input_value: PipelineValue,
    result_tx: flume::Sender<Result<PipelineValue, TaskError>>,
}

struct SequentialEmitter {
    next_id: Mutex<u64>,
    queue: Mutex<VecDeque<DynamicNode>>,
}

impl SequentialEmitter {
    fn new(static_len: usize) -> Self {
        Self {
            next_id: Mutex::new(static_len as u64),
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl Emitter for SequentialEmitter {
    fn emit_dyn(
        &self,
        task: Arc<dyn DynTask>,
        _input_kind: ValueKind,
        _output_kind: ValueKind,
        input_value: PipelineValue,
        depends_on: Vec<TaskId>,
    ) -> (TaskId, flume::Receiver<Result<PipelineValue, TaskError>>) {
        let mut next_id = self.next_id.lock();
        let id = TaskId::from_raw(*next_id);
        *next_id += 1;
        drop(next_id);

        let (tx, rx) = flume::bounded(1);
        self.queue.lock().push_back(DynamicNode {
            id,
            task,
            depends_on,
            input_value,
            result_tx: tx,
        });
        (id, rx)
    }
}

/// Runs a pipeline to completion on the calling thread.
#[derive(Debug, Default)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Executor for SequentialExecutor {
    #[instrument(skip_all)]
    fn execute(
        &self,
        pipeline: &mut Pipeline,
        initial_input: PipelineValue,
    ) -> Result<PipelineOutput, PipelineError> {
        let order = pipeline.validate()?;
        let emitter = SequentialEmitter::new(pipeline.nodes.len());
        let mut outputs: HashMap<TaskId, PipelineValue> = HashMap::new();

        for id in order {
            let node = &pipeline.nodes[id.index()];
            let input = if node.parents.is_empty() {
                initial_input.clone()
            } else {
                let parent_outputs: Vec<PipelineValue> = node
                    .parents
                    .iter()
                    .map(|p| outputs[p].clone())
                    .collect();
                assemble_input(&parent_outputs)
            };
            let ctx = TaskContext::new(id, Some(&emitter as &dyn Emitter));
            match node.task.run_dyn(input, &ctx) {
                Ok(value) => {
                    pipeline.nodes[id.index()].result_tx.send(Ok(value.clone()));
                    outputs.insert(id, value);
                }
                Err(err) => {
                    abort_remaining(pipeline, &outputs, &emitter);
                    return Err(PipelineError::TaskFailure(id, err));
                }
            }
        }

        if let Err(err) = drain_dynamic(&emitter, &mut outputs) {
            return Err(err);
        }

        let terminal = pipeline
            .terminal_nodes()
            .into_iter()
            .filter_map(|id| outputs.get(&id).cloned().map(|v| (id, v)))
            .collect();
        Ok(PipelineOutput::new(terminal))
    }
}

fn drain_dynamic(
    emitter: &SequentialEmitter,
    outputs: &mut HashMap<TaskId, PipelineValue>,
) -> Result<(), PipelineError> {
    loop {
        let next = emitter.queue.lock().pop_front();
        let Some(node) = next else { break };
        let deps_ready = node
            .depends_on
            .iter()
            .all(|dep| outputs.contains_key(dep));
        if !deps_ready {
            // Dependency not yet available: put it back for a later pass.
            // By construction (depends_on only ever names already-created
            // tasks) this converges in at most queue-length passes.
            emitter.queue.lock().push_back(node);
            continue;
        }
        let ctx = TaskContext::new(node.id, Some(emitter as &dyn Emitter));
        match node.task.run_dyn(node.input_value.clone(), &ctx) {
            Ok(value) => {
                let _ = node.result_tx.send(Ok(value.clone()));
                outputs.insert(node.id, value);
            }
            Err(err) => {
                let _ = node.result_tx.send(Err(err.clone()));
                return Err(PipelineError::TaskFailure(node.id, err));
            }
        }
    }
    Ok(())
}

fn abort_remaining(
    pipeline: &Pipeline,
    outputs: &HashMap<TaskId, PipelineValue>,
    emitter: &SequentialEmitter,
) {
    for (idx, node) in pipeline.nodes.iter().enumerate() {
        let id = TaskId::from_raw(idx as u64);
        if !outputs.contains_key(&id) {
            node.result_tx.send(Err(TaskError::Aborted));
        }
    }
    for node in emitter.queue.lock().drain(..) {
        let _ = node.result_tx.send(Err(TaskError::Aborted));
    }
}
