// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-rank executor built on [`crate::transport::Transport`]. Tasks are
//! placed round-robin across ranks by id; a rank running a task whose parent
//! lives on another rank blocks on a tagged `recv` for it, and fans its own
//! result out to whichever other ranks need it. Process bootstrap (spawning
//! real OS processes, wiring an MPI communicator) is out of scope — this
//! executor drives one [`crate::transport::LoopbackHub`] rank per thread,
//! which is enough to exercise the placement/send/recv/barrier/gather logic
//! deterministically.
//!
//! Dynamic task emission (`TaskContext::emit`) is not supported across rank
//! boundaries; tasks run under this executor receive a context with no
//! emitter, matching `TaskContext::emit`'s "this executor does not support
//! dynamic task emission" failure mode.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::instrument;

use super::{assemble_input, Executor, PipelineOutput};
use crate::error::{PipelineError, TaskError};
use crate::pipeline::{Pipeline, PipelineValue, TaskContext, TaskId};
use crate::transport::{LoopbackHub, Payload, Transport};

/// Runs a pipeline across `ranks` simulated ranks over a [`LoopbackHub`].
pub struct DistributedExecutor {
    hub: Arc<LoopbackHub>,
}

impl DistributedExecutor {
    /// Builds a fresh in-process communicator of `ranks` simulated ranks.
    pub fn new(ranks: usize) -> Self {
        Self {
            hub: LoopbackHub::new(ranks.max(1)),
        }
    }

    /// Reuses an existing communicator, e.g. to run several pipelines over
    /// the same simulated ranks.
    pub fn with_hub(hub: Arc<LoopbackHub>) -> Self {
        Self { hub }
    }
}

impl Executor for DistributedExecutor {
    #[instrument(skip_all)]
    fn execute(
        &self,
        pipeline: &mut Pipeline,
        initial_input: PipelineValue,
    ) -> Result<PipelineOutput, PipelineError> {
        let order = pipeline.validate()?;
        let size = self.hub.size();

        let tasks: Vec<_> = pipeline.nodes.iter().map(|n| n.task.clone()).collect();
        let parents: Vec<Vec<TaskId>> = pipeline.nodes.iter().map(|n| n.parents.clone()).collect();
        let terminal_set: HashSet<TaskId> = pipeline.terminal_nodes().into_iter().collect();

        let mut dependents_by_parent: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for id in &order {
            for parent in &parents[id.index()] {
                dependents_by_parent.entry(*parent).or_default().push(*id);
            }
        }

        let aborted: Mutex<Option<(TaskId, TaskError)>> = Mutex::new(None);
        let terminal_ids: Vec<TaskId> = terminal_set.iter().copied().collect();

        let per_rank_results: Vec<Result<HashMap<TaskId, PipelineValue>, PipelineError>> =
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..size)
                    .map(|rank| {
                        let transport = self.hub.transport(rank);
                        let order = &order;
                        let tasks = &tasks;
                        let parents = &parents;
                        let dependents_by_parent = &dependents_by_parent;
                        let terminal_set = &terminal_set;
                        let terminal_ids = &terminal_ids;
                        let aborted = &aborted;
                        let initial_input = initial_input.clone();
                        scope.spawn(move || {
                            run_rank(
                                rank,
                                size,
                                &transport,
                                order,
                                tasks,
                                parents,
                                dependents_by_parent,
                                terminal_set,
                                terminal_ids,
                                initial_input,
                                aborted,
                            )
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

        if let Some((id, err)) = aborted.into_inner().unwrap() {
            for (idx, node) in pipeline.nodes.iter().enumerate() {
                let nid = TaskId::from_raw(idx as u64);
                if nid != id {
                    node.result_tx.send(Err(TaskError::Aborted));
                }
            }
            return Err(PipelineError::TaskFailure(id, err));
        }

        let mut all_outputs: HashMap<TaskId, PipelineValue> = HashMap::new();
        for result in per_rank_results {
            all_outputs.extend(result?);
        }

        for (idx, node) in pipeline.nodes.iter().enumerate() {
            let id = TaskId::from_raw(idx as u64);
            match all_outputs.get(&id) {
                Some(v) => node.result_tx.send(Ok(v.clone())),
                None => node.result_tx.send(Err(TaskError::Aborted)),
            }
        }

        let terminal = terminal_set
            .into_iter()
            .filter_map(|id| all_outputs.get(&id).cloned().map(|v| (id, v)))
            .collect();
        Ok(PipelineOutput::new(terminal))
    }
}

#[allow(clippy::too_many_arguments)]
fn run_rank(
    rank: usize,
    size: usize,
    transport: &dyn Transport,
    order: &[TaskId],
    tasks: &[Arc<dyn crate::pipeline::task::DynTask>],
    parents: &[Vec<TaskId>],
    dependents_by_parent: &HashMap<TaskId, Vec<TaskId>>,
    terminal_set: &HashSet<TaskId>,
    terminal_ids: &[TaskId],
    initial_input: PipelineValue,
    aborted: &Mutex<Option<(TaskId, TaskError)>>,
) -> Result<HashMap<TaskId, PipelineValue>, PipelineError> {
    let owner_of = |id: TaskId| id.index() % size;

    // The root broadcasts the literal initial input; every other rank blocks
    // on it before it can run any parentless task of its own.
    let initial_payload = Payload::from_value(&initial_input).map_err(PipelineError::Transport)?;
    let initial_input = transport
        .broadcast(initial_payload, 0)
        .map_err(PipelineError::Transport)?
        .into_value();

    let mut local: HashMap<TaskId, PipelineValue> = HashMap::new();

    for &id in order {
        if aborted.lock().unwrap().is_some() {
            break;
        }
        if owner_of(id) != rank {
            continue;
        }

        let node_parents = &parents[id.index()];
        let input = if node_parents.is_empty() {
            initial_input.clone()
        } else {
            let mut parent_outputs = Vec::with_capacity(node_parents.len());
            for &parent in node_parents {
                let value = if let Some(v) = local.get(&parent) {
                    v.clone()
                } else {
                    let payload = transport
                        .recv(owner_of(parent), parent.0)
                        .map_err(PipelineError::Transport)?;
                    let v = payload.into_value();
                    local.insert(parent, v.clone());
                    v
                };
                parent_outputs.push(value);
            }
            assemble_input(&parent_outputs)
        };

        let ctx = TaskContext::new(id, None);
        match tasks[id.index()].run_dyn(input, &ctx) {
            Ok(value) => {
                local.insert(id, value.clone());
                let mut sent_to: HashSet<usize> = HashSet::new();
                for &dep in dependents_by_parent.get(&id).into_iter().flatten() {
                    let dep_owner = owner_of(dep);
                    if dep_owner != rank && sent_to.insert(dep_owner) {
                        let payload =
                            Payload::from_value(&value).map_err(PipelineError::Transport)?;
                        transport
                            .send(&payload, dep_owner, id.0)
                            .map_err(PipelineError::Transport)?;
                    }
                }
                if terminal_set.contains(&id) && rank != 0 && sent_to.insert(0) {
                    let payload = Payload::from_value(&value).map_err(PipelineError::Transport)?;
                    transport
                        .send(&payload, 0, id.0)
                        .map_err(PipelineError::Transport)?;
                }
            }
            Err(err) => {
                *aborted.lock().unwrap() = Some((id, err));
                transport.abort();
                break;
            }
        }
    }

    transport.barrier();

    // Typed collective aggregation: rank 0 pulls every terminal result it
    // doesn't already own from the rank that computed it.
    if rank == 0 && aborted.lock().unwrap().is_none() {
        for &id in terminal_ids {
            if local.contains_key(&id) {
                continue;
            }
            let owner = owner_of(id);
            let payload = transport
                .recv(owner, id.0)
                .map_err(PipelineError::Transport)?;
            local.insert(id, payload.into_value());
        }
    }

    Ok(local)
}
