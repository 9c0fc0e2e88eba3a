//! Parameter binding for advice bodies.
//!
//! An advice declares the parameters it wants; before each run the binder
//! satisfies them from the join point, the returned value or the raised
//! cause. A declaration that cannot be satisfied is reported as an
//! [`AdviceBindingError`] and the advice is skipped for that call.

use std::any::TypeId;
use std::fmt;

use super::AdviceDescriptor;
use crate::interfaces::{Fault, Value};
use crate::pipeline::JoinPoint;

/// A declared advice parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// The invocation context.
    JoinPoint,
    /// Bound by name to the advice's `returning` or `throwing` binding.
    Named(String),
    /// Any returned value of the given shape.
    Value(Shape),
    /// Any raised cause assignable to the given type.
    Cause(CauseType),
}

/// Structural shape of a returned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Any,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl Shape {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Null => value.is_null(),
            Self::Bool => value.is_boolean(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Declared cause type of a [`Param::Cause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseType {
    Any,
    Of { id: TypeId, name: &'static str },
}

impl CauseType {
    pub fn of<E: 'static>() -> Self {
        Self::Of {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    pub fn accepts(&self, fault: &Fault) -> bool {
        match self {
            Self::Any => true,
            Self::Of { id, .. } => fault.type_id() == *id,
        }
    }
}

impl fmt::Display for CauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Of { name, .. } => f.write_str(name),
        }
    }
}

/// Errors that can occur while binding advice parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdviceBindingError {
    #[error("parameter {index} '{name}' is neither the returning nor the throwing binding")]
    UnknownName { index: usize, name: String },

    #[error("parameter {index} expects a {expected} value but none is available")]
    NoValue { index: usize, expected: Shape },

    #[error("parameter {index} expects a cause but nothing was raised")]
    NoCause { index: usize },

    #[error("parameter {index} expects cause {expected} but {actual} was raised")]
    CauseMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

/// What the call produced, as far as After-family advice is concerned.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// Nothing yet (Before advice).
    Pending,
    Returned(&'a Value),
    Raised(&'a Fault),
}

/// A single bound argument.
#[derive(Debug, Clone, Copy)]
pub enum Bound<'a> {
    JoinPoint,
    Value(&'a Value),
    Cause(&'a Fault),
}

/// Arguments handed to an advice body.
pub struct AdviceArgs<'a> {
    join_point: &'a JoinPoint<'a>,
    bound: Vec<Bound<'a>>,
}

impl<'a> AdviceArgs<'a> {
    pub fn join_point(&self) -> &'a JoinPoint<'a> {
        self.join_point
    }

    /// Bound arguments, in declaration order.
    pub fn bound(&self) -> &[Bound<'a>] {
        &self.bound
    }

    pub fn get(&self, index: usize) -> Option<Bound<'a>> {
        self.bound.get(index).copied()
    }

    /// The first bound returned value.
    pub fn returned(&self) -> Option<&'a Value> {
        self.bound.iter().find_map(|b| match b {
            Bound::Value(v) => Some(*v),
            _ => None,
        })
    }

    /// The first bound cause.
    pub fn cause(&self) -> Option<&'a Fault> {
        self.bound.iter().find_map(|b| match b {
            Bound::Cause(c) => Some(*c),
            _ => None,
        })
    }
}

/// Satisfy every declared parameter of `advice`.
pub(crate) fn bind<'a>(
    advice: &AdviceDescriptor,
    join_point: &'a JoinPoint<'a>,
    outcome: Outcome<'a>,
) -> Result<AdviceArgs<'a>, AdviceBindingError> {
    let mut bound = Vec::with_capacity(advice.params.len());

    for (index, param) in advice.params.iter().enumerate() {
        let arg = match param {
            Param::JoinPoint => Bound::JoinPoint,
            Param::Named(name) => match outcome {
                Outcome::Returned(value) if advice.returning() == Some(name.as_str()) => {
                    Bound::Value(value)
                }
                Outcome::Raised(fault) if advice.throwing() == Some(name.as_str()) => {
                    Bound::Cause(fault)
                }
                _ => {
                    return Err(AdviceBindingError::UnknownName {
                        index,
                        name: name.clone(),
                    })
                }
            },
            Param::Value(shape) => match outcome {
                Outcome::Returned(value) if shape.accepts(value) => Bound::Value(value),
                _ => {
                    return Err(AdviceBindingError::NoValue {
                        index,
                        expected: *shape,
                    })
                }
            },
            Param::Cause(cause_type) => match outcome {
                Outcome::Raised(fault) if cause_type.accepts(fault) => Bound::Cause(fault),
                Outcome::Raised(fault) => {
                    return Err(AdviceBindingError::CauseMismatch {
                        index,
                        expected: cause_type.to_string(),
                        actual: fault.type_name().to_string(),
                    })
                }
                _ => return Err(AdviceBindingError::NoCause { index }),
            },
        };
        bound.push(arg);
    }

    Ok(AdviceArgs { join_point, bound })
}
