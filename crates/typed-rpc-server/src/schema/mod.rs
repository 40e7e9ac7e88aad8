//! Type schema reflection
//!
//! Builds a serializable description of every registered method and every
//! record or overridden type reachable from its parameter and result types.
//! Method signatures are captured as [`Shape`] producers at registration, so
//! reflection never touches live values.

mod reflect;
mod shape;

pub use reflect::{
    FieldDescriptor, MethodInfo, Reflector, ServerSpec, TypeDescriptor, anonymous_name, signature,
};
pub use shape::{Describe, FieldShape, Kind, RecordShape, Shape};
