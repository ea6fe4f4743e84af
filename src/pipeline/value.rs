// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tagged value representation carried along pipeline edges.
//!
//! [`PipelineValue`] is the runtime payload; [`ValueKind`] is its
//! compile-time-free-but-static-checked shadow, compared structurally by
//! [`crate::pipeline::Pipeline::validate`] without ever inspecting a live
//! value.

use std::any::Any;
use std::sync::Arc;

use crate::error::TaskError;

/// A value flowing along a pipeline edge.
///
/// `Any` is the narrow escape hatch for user-defined payloads that don't fit
/// the scalar/vector set; everything else is a concrete, structurally
/// comparable variant so the distributed executor knows which values it can
/// serialize (see `transport`).
#[derive(Debug, Clone)]
pub enum PipelineValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    VecI64(Vec<i64>),
    VecF64(Vec<f64>),
    VecStr(Vec<String>),
    Any(Arc<dyn Any + Send + Sync>),
}

/// The declared shape of a [`PipelineValue`], used only for static graph
/// validation at construction time.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Unit,
    I64,
    F64,
    Bool,
    Str,
    Bytes,
    VecI64,
    VecF64,
    VecStr,
    /// Matches any single `PipelineValue`, including `Any` payloads.
    Any,
    /// The input kind of a task with more than one parent: a tuple of the
    /// parents' output kinds in declared order.
    Tuple(Vec<ValueKind>),
}

impl ValueKind {
    /// True if a value declared as `other` may flow into a slot declared as
    /// `self`.
    pub fn accepts(&self, other: ValueKind) -> bool {
        matches!(self, ValueKind::Any) || *self == other
    }
}

/// A Rust type that can appear as a task input or output.
pub trait TypedValue: Send + Sync + Clone + 'static {
    fn kind() -> ValueKind;
    fn into_value(self) -> PipelineValue;
    fn from_value(value: PipelineValue) -> Result<Self, TaskError>;
}

macro_rules! scalar_typed_value {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl TypedValue for $ty {
            fn kind() -> ValueKind {
                ValueKind::$kind
            }
            fn into_value(self) -> PipelineValue {
                PipelineValue::$variant(self)
            }
            fn from_value(value: PipelineValue) -> Result<Self, TaskError> {
                match value {
                    PipelineValue::$variant(v) => Ok(v),
                    other => Err(TaskError::Failed(format!(
                        "expected {:?}, found {other:?}",
                        ValueKind::$kind
                    ))),
                }
            }
        }
    };
}

scalar_typed_value!(i64, I64, I64);
scalar_typed_value!(f64, F64, F64);
scalar_typed_value!(bool, Bool, Bool);
scalar_typed_value!(String, Str, Str);
scalar_typed_value!(Vec<u8>, Bytes, Bytes);
scalar_typed_value!(Vec<i64>, VecI64, VecI64);
scalar_typed_value!(Vec<f64>, VecF64, VecF64);
scalar_typed_value!(Vec<String>, VecStr, VecStr);

impl TypedValue for () {
    fn kind() -> ValueKind {
        ValueKind::Unit
    }
    fn into_value(self) -> PipelineValue {
        PipelineValue::Any(Arc::new(()))
    }
    fn from_value(_value: PipelineValue) -> Result<Self, TaskError> {
        Ok(())
    }
}

/// Newtype wrapper carrying an arbitrary user payload through the graph as
/// `PipelineValue::Any`. Declared input/output kind is always `ValueKind::Any`.
#[derive(Debug)]
pub struct Dyn<T>(pub Arc<T>);

impl<T> Clone for Dyn<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Send + Sync + 'static> TypedValue for Dyn<T> {
    fn kind() -> ValueKind {
        ValueKind::Any
    }
    fn into_value(self) -> PipelineValue {
        PipelineValue::Any(self.0)
    }
    fn from_value(value: PipelineValue) -> Result<Self, TaskError> {
        match value {
            PipelineValue::Any(any) => any
                .downcast::<T>()
                .map(Dyn)
                .map_err(|_| TaskError::Failed("Any payload downcast failed".into())),
            other => Err(TaskError::Failed(format!(
                "expected Any payload, found {other:?}"
            ))),
        }
    }
}

macro_rules! tuple_typed_value {
    ($($idx:tt => $name:ident),+) => {
        impl<$($name: TypedValue),+> TypedValue for ($($name,)+) {
            fn kind() -> ValueKind {
                ValueKind::Tuple(vec![$($name::kind()),+])
            }
            fn into_value(self) -> PipelineValue {
                let packed: Vec<PipelineValue> = vec![$(self.$idx.into_value()),+];
                PipelineValue::Any(Arc::new(packed))
            }
            fn from_value(value: PipelineValue) -> Result<Self, TaskError> {
                match value {
                    PipelineValue::Any(any) => {
                        let packed = any
                            .downcast_ref::<Vec<PipelineValue>>()
                            .ok_or_else(|| TaskError::Failed("expected packed tuple payload".into()))?;
                        let mut iter = packed.iter().cloned();
                        Ok(($(
                            $name::from_value(iter.next().ok_or_else(|| {
                                TaskError::Failed("tuple payload arity mismatch".into())
                            })?)?,
                        )+))
                    }
                    other => Err(TaskError::Failed(format!(
                        "expected packed tuple payload, found {other:?}"
                    ))),
                }
            }
        }
    };
}

tuple_typed_value!(0 => A, 1 => B);
tuple_typed_value!(0 => A, 1 => B, 2 => C);
tuple_typed_value!(0 => A, 1 => B, 2 => C, 3 => D);
