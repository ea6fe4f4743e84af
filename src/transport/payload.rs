// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed set of values a [`super::Transport`] can carry: integer/float
//! scalars, strings, bytes, and homogeneous vectors thereof. Anything else
//! (in particular [`PipelineValue::Any`]) is rejected before it ever reaches
//! the wire.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::pipeline::PipelineValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    I64(i64),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    VecI64(Vec<i64>),
    VecF64(Vec<f64>),
    VecStr(Vec<String>),
    Unit,
}

impl Payload {
    /// Converts a [`PipelineValue`] into wire form, rejecting
    /// [`PipelineValue::Any`] — the distributed executor only ever moves
    /// values of the closed scalar/vector kinds across a rank boundary.
    pub fn from_value(value: &PipelineValue) -> Result<Self, TransportError> {
        Ok(match value {
            PipelineValue::I64(v) => Payload::I64(*v),
            PipelineValue::F64(v) => Payload::F64(*v),
            PipelineValue::Bool(v) => Payload::Bool(*v),
            PipelineValue::Str(v) => Payload::Str(v.clone()),
            PipelineValue::Bytes(v) => Payload::Bytes(v.clone()),
            PipelineValue::VecI64(v) => Payload::VecI64(v.clone()),
            PipelineValue::VecF64(v) => Payload::VecF64(v.clone()),
            PipelineValue::VecStr(v) => Payload::VecStr(v.clone()),
            PipelineValue::Any(any) if any.downcast_ref::<()>().is_some() => Payload::Unit,
            PipelineValue::Any(_) => return Err(TransportError::UnsupportedPayload),
        })
    }

    pub fn into_value(self) -> PipelineValue {
        match self {
            Payload::I64(v) => PipelineValue::I64(v),
            Payload::F64(v) => PipelineValue::F64(v),
            Payload::Bool(v) => PipelineValue::Bool(v),
            Payload::Str(v) => PipelineValue::Str(v),
            Payload::Bytes(v) => PipelineValue::Bytes(v),
            Payload::VecI64(v) => PipelineValue::VecI64(v),
            Payload::VecF64(v) => PipelineValue::VecF64(v),
            Payload::VecStr(v) => PipelineValue::VecStr(v),
            Payload::Unit => PipelineValue::Any(std::sync::Arc::new(())),
        }
    }

    /// Serializes to the wire format used by every [`super::Transport`]
    /// implementation that crosses a real process/socket boundary.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        cbor4ii::serde::to_vec(Vec::new(), self).map_err(|e| TransportError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        cbor4ii::serde::from_slice(bytes).map_err(|e| TransportError::Serialization(e.to_string()))
    }
}
