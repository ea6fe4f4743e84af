// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed task-DAG graph: nodes, edges, and the tagged value representation
//! that lets [`validate`](Pipeline::validate) reject mismatched wiring before
//! any task runs.

pub(crate) mod task;
mod value;

pub use task::{Task, TaskContext, TaskFn, TaskResult, TaskResultSender, TryTaskFn};
pub use value::{Dyn, PipelineValue, TypedValue, ValueKind};

use std::collections::HashSet;
use std::sync::Arc;

use task::DynTask;

use crate::error::ValidationError;

/// Stable identifier for a node in a [`Pipeline`] graph, assigned in
/// insertion order starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

pub(crate) struct Node {
    pub task: Arc<dyn DynTask>,
    pub parents: Vec<TaskId>,
    pub input_kind: ValueKind,
    pub output_kind: ValueKind,
    pub result_tx: TaskResultSender,
}

/// A typed dependency graph of tasks. Nodes are added with [`add_task`] and
/// wired together with [`add_dependency`]; [`validate`] must succeed before
/// any [`crate::executor::Executor`] will run the graph.
pub struct Pipeline {
    pub(crate) nodes: Vec<Node>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a task with no declared parents. Returns its [`TaskId`] and a
    /// [`TaskResult`] handle for the value it will eventually produce.
    pub fn add_task<T>(&mut self, task: T) -> (TaskId, TaskResult<T::Output>)
    where
        T: Task + 'static,
    {
        self.add_task_with_parents(task, &[])
    }

    /// Adds a task depending on `parents`, in the given order. A task with
    /// more than one parent receives a tuple of parent outputs in this order;
    /// with exactly one parent it receives that parent's output directly.
    pub fn add_task_with_parents<T>(
        &mut self,
        task: T,
        parents: &[TaskId],
    ) -> (TaskId, TaskResult<T::Output>)
    where
        T: Task + 'static,
    {
        let id = TaskId(self.nodes.len() as u64);
        let (result, tx) = TaskResult::channel();
        let input_kind = T::Input::kind();
        let output_kind = T::Output::kind();
        self.nodes.push(Node {
            task: Arc::new(task::BoxedTask::new(task)),
            parents: parents.to_vec(),
            input_kind,
            output_kind,
            result_tx: tx,
        });
        (id, result)
    }

    /// Records an additional dependency edge after the child was created.
    /// Prefer [`add_task_with_parents`] when parents are known up front;
    /// this exists for graphs assembled incrementally.
    pub fn add_dependency(&mut self, parent: TaskId, child: TaskId) -> Result<(), ValidationError> {
        if parent.index() >= self.nodes.len() {
            return Err(ValidationError::UnknownParent(child, parent));
        }
        if child.index() >= self.nodes.len() {
            return Err(ValidationError::UnknownParent(child, parent));
        }
        self.nodes[child.index()].parents.push(parent);
        Ok(())
    }

    /// Validates acyclicity and structural type compatibility, returning a
    /// topological order of [`TaskId`]s on success. Never mutates the graph
    /// and never invokes a task body.
    pub fn validate(&self) -> Result<Vec<TaskId>, ValidationError> {
        if self.nodes.is_empty() {
            return Err(ValidationError::Empty);
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            let child = TaskId(idx as u64);
            for &parent in &node.parents {
                if parent.index() >= self.nodes.len() {
                    return Err(ValidationError::UnknownParent(child, parent));
                }
            }
        }
        let order = self.topological_order()?;
        self.check_types()?;
        Ok(order)
    }

    fn topological_order(&self) -> Result<Vec<TaskId>, ValidationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }
        let n = self.nodes.len();
        let mut marks = vec![Mark::White; n];
        let mut order = Vec::with_capacity(n);

        fn visit(
            idx: usize,
            nodes: &[Node],
            marks: &mut [Mark],
            order: &mut Vec<TaskId>,
        ) -> Result<(), ValidationError> {
            match marks[idx] {
                Mark::Black => return Ok(()),
                Mark::Gray => return Err(ValidationError::Cycle),
                Mark::White => {}
            }
            marks[idx] = Mark::Gray;
            for &parent in &nodes[idx].parents {
                visit(parent.index(), nodes, marks, order)?;
            }
            marks[idx] = Mark::Black;
            order.push(TaskId(idx as u64));
            Ok(())
        }

        for idx in 0..n {
            visit(idx, &self.nodes, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    fn check_types(&self) -> Result<(), ValidationError> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let child = TaskId(idx as u64);
            match node.parents.as_slice() {
                [] => {}
                [single] => {
                    let parent_kind = self.nodes[single.index()].output_kind.clone();
                    if !node.input_kind.accepts(parent_kind.clone()) {
                        return Err(ValidationError::TypeMismatch {
                            parent: *single,
                            child,
                            expected: node.input_kind.clone(),
                            found: parent_kind,
                        });
                    }
                }
                many => {
                    let tuple_kind = ValueKind::Tuple(
                        many.iter()
                            .map(|p| self.nodes[p.index()].output_kind.clone())
                            .collect(),
                    );
                    if !node.input_kind.accepts(tuple_kind.clone()) {
                        return Err(ValidationError::TypeMismatch {
                            parent: many[0],
                            child,
                            expected: node.input_kind.clone(),
                            found: tuple_kind,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn terminal_nodes(&self) -> Vec<TaskId> {
        let mut has_child = vec![false; self.nodes.len()];
        for node in &self.nodes {
            for &parent in &node.parents {
                has_child[parent.index()] = true;
            }
        }
        (0..self.nodes.len())
            .filter(|&idx| !has_child[idx])
            .map(|idx| TaskId(idx as u64))
            .collect()
    }

    pub(crate) fn dependents_of(&self, id: TaskId) -> HashSet<TaskId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parents.contains(&id))
            .map(|(idx, _)| TaskId(idx as u64))
            .collect()
    }
}
