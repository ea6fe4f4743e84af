// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use dftracer_utils::error::{PipelineError, ValidationError};
use dftracer_utils::executor::{Executor, SequentialExecutor, ThreadPoolExecutor};
use dftracer_utils::pipeline::{Task, TaskContext, TypedValue};
use dftracer_utils::{error::TaskError, Pipeline};

struct Double;

impl Task for Double {
    type Input = i64;
    type Output = i64;

    fn run(&self, input: i64, _ctx: &TaskContext) -> Result<i64, TaskError> {
        Ok(input * 2)
    }
}

struct AddTen;

impl Task for AddTen {
    type Input = i64;
    type Output = i64;

    fn run(&self, input: i64, _ctx: &TaskContext) -> Result<i64, TaskError> {
        Ok(input + 10)
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

// Scenario A: single task, execute on input 21, expect 42.
#[test]
fn scenario_a_single_task_doubles_input() {
    let mut pipeline = Pipeline::new();
    let (_id, result) = pipeline.add_task(Double);

    let executor = SequentialExecutor::new();
    executor.execute(&mut pipeline, 21i64.into_value()).unwrap();
    assert_eq!(result.get().unwrap(), 42);
}

// Scenario B: add10 -> mul2 chain, input 5, expect 15 then 30.
#[test]
fn scenario_b_chained_tasks() {
    let mut pipeline = Pipeline::new();
    let (add_id, add_result) = pipeline.add_task(AddTen);
    let (_mul_id, mul_result) = pipeline.add_task_with_parents(Double, &[add_id]);

    let executor = SequentialExecutor::new();
    executor.execute(&mut pipeline, 5i64.into_value()).unwrap();
    assert_eq!(add_result.get().unwrap(), 15);
    assert_eq!(mul_result.get().unwrap(), 30);
}

// Scenario C: T1:+10, T2:*2, T3:combine(sum), edges T1->T3, T2->T3, input 5.
#[test]
fn scenario_c_diamond_combine() {
    let mut pipeline = Pipeline::new();
    let (t1, t1_result) = pipeline.add_task(AddTen);
    let (t2, t2_result) = pipeline.add_task(Double);
    let (_t3, t3_result) = pipeline.add_task_with_parents(Combine, &[t1, t2]);

    let executor = SequentialExecutor::new();
    executor.execute(&mut pipeline, 5i64.into_value()).unwrap();
    assert_eq!(t1_result.get().unwrap(), 15);
    assert_eq!(t2_result.get().unwrap(), 10);
    assert_eq!(t3_result.get().unwrap(), 25);
}

// Scenario D: a cycle must be rejected before any task body runs.
#[test]
fn scenario_d_cycle_is_rejected_before_execution() {
    let mut pipeline = Pipeline::new();
    let (t1, _) = pipeline.add_task(AddTen);
    let (t2, _) = pipeline.add_task_with_parents(Double, &[t1]);
    pipeline.add_dependency(t2, t1).unwrap();

    let err = pipeline.validate().unwrap_err();
    assert_eq!(err, ValidationError::Cycle);
}

// Invariant 6: topological order respects edge direction.
#[test]
fn topological_order_respects_edges() {
    let mut pipeline = Pipeline::new();
    let (t1, _) = pipeline.add_task(AddTen);
    let (t2, _) = pipeline.add_task_with_parents(Double, &[t1]);

    let order = pipeline.validate().unwrap();
    let pos1 = order.iter().position(|&id| id == t1).unwrap();
    let pos2 = order.iter().position(|&id| id == t2).unwrap();
    assert!(pos1 < pos2);
}

// Invariant 8: sequential and thread-pool executors agree on deterministic tasks.
#[test]
fn sequential_and_thread_pool_agree() {
    let mut seq_pipeline = Pipeline::new();
    let (t1, t1_seq) = seq_pipeline.add_task(AddTen);
    let (_t2, t2_seq) = seq_pipeline.add_task_with_parents(Double, &[t1]);
    SequentialExecutor::new()
        .execute(&mut seq_pipeline, 5i64.into_value())
        .unwrap();

    let mut pool_pipeline = Pipeline::new();
    let (t1, t1_pool) = pool_pipeline.add_task(AddTen);
    let (_t2, t2_pool) = pool_pipeline.add_task_with_parents(Double, &[t1]);
    ThreadPoolExecutor::with_threads(4)
        .execute(&mut pool_pipeline, 5i64.into_value())
        .unwrap();

    assert_eq!(t1_seq.get().unwrap(), t1_pool.get().unwrap());
    assert_eq!(t2_seq.get().unwrap(), t2_pool.get().unwrap());
}

// Invariant 9: a cycle causes execute() to fail before any task runs.
#[test]
fn execute_rejects_cycle_without_running_tasks() {
    let mut pipeline = Pipeline::new();
    let (t1, _) = pipeline.add_task(AddTen);
    let (t2, _) = pipeline.add_task_with_parents(Double, &[t1]);
    pipeline.add_dependency(t2, t1).unwrap();

    let err = SequentialExecutor::new()
        .execute(&mut pipeline, 5i64.into_value())
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(ValidationError::Cycle)));
}

// Invariant 10: a type-incompatible edge is rejected before any task runs.
#[test]
fn execute_rejects_type_mismatch_without_running_tasks() {
    struct TakesString;
    impl Task for TakesString {
        type Input = String;
        type Output = String;
        fn run(&self, input: String, _ctx: &TaskContext) -> Result<String, TaskError> {
            Ok(input)
        }
    }

    let mut pipeline = Pipeline::new();
    let (t1, _) = pipeline.add_task(AddTen);
    let (_t2, _) = pipeline.add_task_with_parents(TakesString, &[t1]);

    let err = SequentialExecutor::new()
        .execute(&mut pipeline, 5i64.into_value())
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::TypeMismatch { .. })
    ));
}

// A task failure aborts every other pending TaskResult.
#[test]
fn task_failure_aborts_sibling_results() {
    let mut pipeline = Pipeline::new();
    let (_fail_id, fail_result) = pipeline.add_task(AlwaysFails);
    let (_ok_id, ok_result) = pipeline.add_task(AddTen);

    let err = SequentialExecutor::new()
        .execute(&mut pipeline, 5i64.into_value())
        .unwrap_err();
    assert!(matches!(err, PipelineError::TaskFailure(_, _)));
    assert!(fail_result.get().is_err());
    assert!(matches!(ok_result.get(), Err(TaskError::Aborted)));
}
