// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use dftracer_utils::error::TaskError;
use dftracer_utils::executor::{DistributedExecutor, Executor};
use dftracer_utils::pipeline::{Task, TaskContext, TypedValue};
use dftracer_utils::Pipeline;

struct AddTen;

impl Task for AddTen {
    type Input = i64;
    type Output = i64;

    fn run(&self, input: i64, _ctx: &TaskContext) -> Result<i64, TaskError> {
        Ok(input + 10)
    }
}

struct Double;

impl Task for Double {
    type Input = i64;
    type Output = i64;

    fn run(&self, input: i64, _ctx: &TaskContext) -> Result<i64, TaskError> {
        Ok(input * 2)
    }
}

struct Combine;

impl Task for Combine {
    type Input = (i64, i64);
    type Output = i64;

    fn run(&self, input: (i64, i64), _ctx: &TaskContext) -> Result<i64, TaskError> {
        Ok(input.0 + input.1)
    }
}

struct AlwaysFails;

impl Task for AlwaysFails {
    type Input = i64;
    type Output = i64;

    fn run(&self, _input: i64, _ctx: &TaskContext) -> Result<i64, TaskError> {
        Err(TaskError::Failed("deliberate failure".into()))
    }
}

// With task ids round-robin placed across ranks, a chain of two tasks
// exercises a cross-rank parent recv.
#[test]
fn chained_tasks_cross_rank_boundary() {
    let mut pipeline = Pipeline::new();
    let (add_id, add_result) = pipeline.add_task(AddTen);
    let (_mul_id, mul_result) = pipeline.add_task_with_parents(Double, &[add_id]);

    let executor = DistributedExecutor::new(2);
    executor.execute(&mut pipeline, 5i64.into_value()).unwrap();

    assert_eq!(add_result.get().unwrap(), 15);
    assert_eq!(mul_result.get().unwrap(), 30);
}

// A diamond where the combine step may live on a different rank from
// either of its two parents.
#[test]
fn diamond_combine_across_three_ranks() {
    let mut pipeline = Pipeline::new();
    let (t1, t1_result) = pipeline.add_task(AddTen);
    let (t2, t2_result) = pipeline.add_task(Double);
    let (_t3, t3_result) = pipeline.add_task_with_parents(Combine, &[t1, t2]);

    let executor = DistributedExecutor::new(3);
    executor.execute(&mut pipeline, 5i64.into_value()).unwrap();

    assert_eq!(t1_result.get().unwrap(), 15);
    assert_eq!(t2_result.get().unwrap(), 10);
    assert_eq!(t3_result.get().unwrap(), 25);
}

// Results agree with a single simulated rank, i.e. placement doesn't change
// the answer when there's nowhere else to place a task.
#[test]
fn single_rank_matches_multi_rank() {
    let mut solo_pipeline = Pipeline::new();
    let (t1, t1_solo) = solo_pipeline.add_task(AddTen);
    let (_t2, t2_solo) = solo_pipeline.add_task_with_parents(Double, &[t1]);
    DistributedExecutor::new(1)
        .execute(&mut solo_pipeline, 7i64.into_value())
        .unwrap();

    let mut multi_pipeline = Pipeline::new();
    let (t1, t1_multi) = multi_pipeline.add_task(AddTen);
    let (_t2, t2_multi) = multi_pipeline.add_task_with_parents(Double, &[t1]);
    DistributedExecutor::new(4)
        .execute(&mut multi_pipeline, 7i64.into_value())
        .unwrap();

    assert_eq!(t1_solo.get().unwrap(), t1_multi.get().unwrap());
    assert_eq!(t2_solo.get().unwrap(), t2_multi.get().unwrap());
}

// A failing task on one rank aborts the run for every rank rather than
// hanging the others on a recv that will never arrive.
#[test]
fn task_failure_aborts_every_rank() {
    let mut pipeline = Pipeline::new();
    let (_fail_id, fail_result) = pipeline.add_task(AlwaysFails);
    let (_ok_id, ok_result) = pipeline.add_task(AddTen);

    let err = DistributedExecutor::new(2)
        .execute(&mut pipeline, 5i64.into_value())
        .unwrap_err();

    assert!(matches!(
        err,
        dftracer_utils::error::PipelineError::TaskFailure(_, _)
    ));
    assert!(fail_result.get().is_err());
    assert!(matches!(ok_result.get(), Err(TaskError::Aborted)));
}

// A rank blocked on `recv` for a parent owned by the rank whose task just
// failed must be woken by the collective abort rather than hang forever.
#[test]
fn task_failure_unblocks_cross_rank_dependent() {
    let mut pipeline = Pipeline::new();
    let (fail_id, fail_result) = pipeline.add_task(AlwaysFails);
    let (_dep_id, dep_result) = pipeline.add_task_with_parents(AddTen, &[fail_id]);

    // Round-robin placement puts task 0 (AlwaysFails) and task 1 (AddTen,
    // its dependent) on different ranks of a 2-rank run, so the dependent
    // can only learn of the failure via a collective abort, not by sharing
    // a rank with the task that failed.
    let err = DistributedExecutor::new(2)
        .execute(&mut pipeline, 5i64.into_value())
        .unwrap_err();

    assert!(matches!(
        err,
        dftracer_utils::error::PipelineError::TaskFailure(_, _)
    ));
    assert!(fail_result.get().is_err());
    assert!(matches!(dep_result.get(), Err(TaskError::Aborted)));
}
