// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interchangeable schedulers for a [`crate::pipeline::Pipeline`]: run the
//! same graph sequentially, on a work-stealing thread pool, or across
//! multiple processes, with identical observable results for deterministic
//! task bodies.

pub mod distributed;
pub mod sequential;
pub mod thread_pool;

pub use distributed::DistributedExecutor;
pub use sequential::SequentialExecutor;
pub use thread_pool::ThreadPoolExecutor;

use std::collections::HashMap;

use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineValue, TaskId};

/// The outputs of a pipeline run's terminal nodes (those with no children).
pub struct PipelineOutput {
    terminal: HashMap<TaskId, PipelineValue>,
}

impl PipelineOutput {
    pub(crate) fn new(terminal: HashMap<TaskId, PipelineValue>) -> Self {
        Self { terminal }
    }

    pub fn get(&self, id: TaskId) -> Option<&PipelineValue> {
        self.terminal.get(&id)
    }

    pub fn terminal_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.terminal.keys()
    }
}

/// Shared contract for the three scheduler variants. `execute` validates the
/// graph, runs every reachable task (static and dynamically emitted) with
/// `initial_input` fed to every parentless node, and publishes each node's
/// output through its [`crate::pipeline::TaskResult`] as well as the
/// returned [`PipelineOutput`].
pub trait Executor {
    fn execute(
        &self,
        pipeline: &mut Pipeline,
        initial_input: PipelineValue,
    ) -> Result<PipelineOutput, PipelineError>;
}

/// Packs parent outputs into the `PipelineValue` a child task will see:
/// pass-through for a single parent, a packed tuple (matching
/// [`crate::pipeline::value::TypedValue`]'s tuple encoding) for several.
pub(crate) fn assemble_input(parent_outputs: &[PipelineValue]) -> PipelineValue {
    match parent_outputs {
        [] => PipelineValue::Any(std::sync::Arc::new(())),
        [single] => single.clone(),
        many => PipelineValue::Any(std::sync::Arc::new(many.to_vec())),
    }
}
