//! Exception taxonomy and the host-side error type used to propagate a
//! pending language exception up through Rust's `?` operator until the
//! interpreter loop is ready to begin unwinding (`spec.md` §7).
//!
//! Mirrors the teacher's `exception_private::ExcType`/`RunError` idiom: a
//! `strum`-derived enum for the exception kind, and a `RunError` that native
//! helpers build via named constructors (`RunError::type_error(..)`, etc.)
//! rather than ad hoc `format!` calls scattered through the dispatch code.

use std::fmt;

use strum::{Display, EnumString};

/// Result alias for any operation that can raise a language-level exception.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// The kinds of exception named in `spec.md` §7, rooted at a common
/// `Exception` the way CPython's hierarchy is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub(crate) enum ExcType {
    Exception,
    NameError,
    TypeError,
    ValueError,
    IndexError,
    KeyError,
    AttributeError,
    ZeroDivisionError,
    /// Control-flow only, never surfaced as a diagnostic (`spec.md` §7).
    StopIteration,
    AssertionError,
    NotImplementedError,
    RuntimeError,
}

impl ExcType {
    /// `spec.md` §3: "rooted at a common `Exception`"; every kind other than
    /// `Exception` itself has `Exception` as an ancestor for `isinstance`/
    /// `except` matching purposes.
    pub(crate) fn parent(self) -> Option<Self> {
        match self {
            Self::Exception => None,
            _ => Some(Self::Exception),
        }
    }

    pub(crate) fn matches(self, handler: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == handler {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// A pending language exception: its kind plus a human-readable message.
/// This is what travels through the VM's pending-exception slot and what
/// `except` handlers bind to a name (`spec.md` §4.7).
#[derive(Debug, Clone)]
pub(crate) struct RaisedException {
    pub(crate) kind: ExcType,
    pub(crate) message: String,
}

impl fmt::Display for RaisedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Host-side error type. Every CORE operation that can fail threads this
/// through `?` until the interpreter loop's safe point observes it and
/// starts unwinding, exactly as `spec.md` §4.7/§7 describe.
#[derive(Debug, Clone)]
pub(crate) enum RunError {
    Exc(RaisedException),
}

impl RunError {
    fn new(kind: ExcType, message: impl Into<String>) -> Self {
        Self::Exc(RaisedException {
            kind,
            message: message.into(),
        })
    }

    pub(crate) fn name_error(name: &str) -> Self {
        Self::new(ExcType::NameError, format!("name '{name}' is not defined"))
    }

    pub(crate) fn type_error(msg: impl fmt::Display) -> Self {
        Self::new(ExcType::TypeError, msg.to_string())
    }

    pub(crate) fn type_error_unsupported_operand(op: &str, lhs: &str, rhs: &str) -> Self {
        Self::new(
            ExcType::TypeError,
            format!("unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'"),
        )
    }

    pub(crate) fn type_error_unsupported_unary(op: &str, operand: &str) -> Self {
        Self::new(ExcType::TypeError, format!("bad operand type for unary {op}: '{operand}'"))
    }

    pub(crate) fn type_error_not_subscriptable(type_name: &str) -> Self {
        Self::new(ExcType::TypeError, format!("'{type_name}' object is not subscriptable"))
    }

    pub(crate) fn type_error_no_item_assignment(type_name: &str) -> Self {
        Self::new(
            ExcType::TypeError,
            format!("'{type_name}' object does not support item assignment"),
        )
    }

    pub(crate) fn type_error_unhashable(type_name: &str) -> Self {
        Self::new(ExcType::TypeError, format!("unhashable type: '{type_name}'"))
    }

    pub(crate) fn type_error_not_callable(type_name: &str) -> Self {
        Self::new(ExcType::TypeError, format!("'{type_name}' object is not callable"))
    }

    pub(crate) fn type_error_not_iterable(type_name: &str) -> Self {
        Self::new(ExcType::TypeError, format!("'{type_name}' object is not iterable"))
    }

    pub(crate) fn type_error_arity(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ExcType::TypeError,
            format!("{name}() takes {expected} positional arguments but {got} were given"),
        )
    }

    pub(crate) fn type_error_missing_keyword(name: &str, key: &str) -> Self {
        Self::new(ExcType::TypeError, format!("{name}() got an unexpected keyword argument '{key}'"))
    }

    pub(crate) fn type_error_missing_required(name: &str, param: &str) -> Self {
        Self::new(ExcType::TypeError, format!("{name}() missing required argument: '{param}'"))
    }

    pub(crate) fn value_error(msg: impl fmt::Display) -> Self {
        Self::new(ExcType::ValueError, msg.to_string())
    }

    pub(crate) fn index_error(msg: impl fmt::Display) -> Self {
        Self::new(ExcType::IndexError, msg.to_string())
    }

    pub(crate) fn key_error(msg: impl fmt::Display) -> Self {
        Self::new(ExcType::KeyError, msg.to_string())
    }

    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            ExcType::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub(crate) fn attribute_error_readonly(type_name: &str, attr: &str) -> Self {
        Self::new(
            ExcType::AttributeError,
            format!("'{type_name}' object attribute '{attr}' is read-only"),
        )
    }

    pub(crate) fn zero_division(msg: impl fmt::Display) -> Self {
        Self::new(ExcType::ZeroDivisionError, msg.to_string())
    }

    pub(crate) fn stop_iteration() -> Self {
        Self::new(ExcType::StopIteration, "")
    }

    pub(crate) fn assertion(msg: impl fmt::Display) -> Self {
        Self::new(ExcType::AssertionError, msg.to_string())
    }

    pub(crate) fn runtime(msg: impl fmt::Display) -> Self {
        Self::new(ExcType::RuntimeError, msg.to_string())
    }

    pub(crate) fn kind(&self) -> ExcType {
        let Self::Exc(exc) = self;
        exc.kind
    }

    pub(crate) fn message(&self) -> &str {
        let Self::Exc(exc) = self;
        &exc.message
    }
}
