//! Heap object payloads and the shared object header.
//!
//! Every heap-allocated value shares the header described in `spec.md` §3:
//! a variant tag, a GC mark bit, and (implicitly) a slot in the heap's
//! object list. The "intrusive next-pointer" in the original design is
//! realized here as a plain arena index (`HeapId`) rather than a raw
//! pointer -- the "arena-indexed design... avoids raw pointers into a
//! mutable stack" equivalent the spec's design notes call out explicitly.

use crate::{
    function::{BoundMethod, Closure, FunctionProto, NativeFunction, NativeMethod, UpvalueObj},
    intern::Interns,
    table::Table,
    types::{class::Class, class::Instance, class::NativeClass, dict::Dict, range::RangeObj, str::Str},
    value::Value,
};

/// GC mark bit plus whatever else every heap object needs in common.
#[derive(Debug, Default)]
pub(crate) struct ObjHeader {
    pub(crate) marked: bool,
}

/// A module namespace. The standard-library module loader is an external
/// collaborator (`spec.md` §1); this just holds whatever a host or the
/// `IMPORT` opcode installed under a name.
#[derive(Debug, Default)]
pub(crate) struct ModuleObj {
    pub(crate) name: String,
    pub(crate) dict: Table,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SliceObj {
    pub(crate) start: Value,
    pub(crate) stop: Value,
    pub(crate) step: Value,
}

/// Generic iterator state: wraps a source value plus a cursor. Used for
/// list/tuple/dict/string/range iteration alike, matching the C source's
/// single generic iterator approach (`value_methods.c` `*_Iter` producing a
/// small stateful object rather than one heap type per container).
#[derive(Debug)]
pub(crate) enum IteratorObj {
    Sequence { source: Value, index: i64 },
    DictKeys { source: Value, index: usize },
    Range { current: i64, stop: i64, step: i64 },
}

/// One slot in the heap arena: either free (available for reuse) or holding
/// a live object with its header.
pub(crate) enum Slot {
    Free,
    Occupied(ObjHeader, HeapData),
}

pub(crate) type HeapId = usize;

/// The tag-narrowed payload of a heap object, i.e. the `Object-variant`
/// narrowing described in `spec.md` §3.
pub(crate) enum HeapData {
    String(Str),
    List(Vec<Value>),
    Tuple(Box<[Value]>),
    Dict(Dict),
    Function(FunctionProto),
    Closure(Closure),
    NativeFunction(NativeFunction),
    Class(Class),
    NativeClass(NativeClass),
    Instance(Instance),
    BoundMethod(BoundMethod),
    NativeMethod(NativeMethod),
    Upvalue(UpvalueObj),
    Module(ModuleObj),
    Range(RangeObj),
    Slice(SliceObj),
    Iterator(IteratorObj),
}

/// Value-variant tag used to index the per-type method table (`spec.md`
/// §4.1, §9). Immediate variants get their own tags even though they carry
/// no heap allocation, so the whole dispatch surface is addressed uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Tag {
    Undefined,
    NotImplemented,
    None,
    Bool,
    Int,
    Float,
    String,
    List,
    Tuple,
    Dict,
    Function,
    Closure,
    NativeFunction,
    Class,
    NativeClass,
    Instance,
    BoundMethod,
    NativeMethod,
    Upvalue,
    Module,
    Range,
    Slice,
    Iterator,
}

impl HeapData {
    pub(crate) fn tag(&self) -> Tag {
        match self {
            Self::String(_) => Tag::String,
            Self::List(_) => Tag::List,
            Self::Tuple(_) => Tag::Tuple,
            Self::Dict(_) => Tag::Dict,
            Self::Function(_) => Tag::Function,
            Self::Closure(_) => Tag::Closure,
            Self::NativeFunction(_) => Tag::NativeFunction,
            Self::Class(_) => Tag::Class,
            Self::NativeClass(_) => Tag::NativeClass,
            Self::Instance(_) => Tag::Instance,
            Self::BoundMethod(_) => Tag::BoundMethod,
            Self::NativeMethod(_) => Tag::NativeMethod,
            Self::Upvalue(_) => Tag::Upvalue,
            Self::Module(_) => Tag::Module,
            Self::Range(_) => Tag::Range,
            Self::Slice(_) => Tag::Slice,
            Self::Iterator(_) => Tag::Iterator,
        }
    }

    pub(crate) fn type_name(&self, interns: &Interns) -> String {
        let _ = interns;
        match self {
            Self::String(_) => "str".to_owned(),
            Self::List(_) => "list".to_owned(),
            Self::Tuple(_) => "tuple".to_owned(),
            Self::Dict(_) => "dict".to_owned(),
            Self::Function(_) | Self::Closure(_) | Self::NativeFunction(_) => "function".to_owned(),
            Self::Class(c) => c.name.clone(),
            Self::NativeClass(c) => c.name.to_owned(),
            Self::Instance(i) => i.class_name.clone(),
            Self::BoundMethod(_) | Self::NativeMethod(_) => "method".to_owned(),
            Self::Upvalue(_) => "cell".to_owned(),
            Self::Module(m) => format!("module '{}'", m.name),
            Self::Range(_) => "range".to_owned(),
            Self::Slice(_) => "slice".to_owned(),
            Self::Iterator(_) => "iterator".to_owned(),
        }
    }

    /// Every `Value` directly reachable from this object, for GC tracing.
    pub(crate) fn trace_children(&self, mut visit: impl FnMut(Value)) {
        match self {
            Self::String(_) => {}
            Self::List(items) => {
                for &v in items {
                    visit(v);
                }
            }
            Self::Tuple(items) => {
                for &v in items.iter() {
                    visit(v);
                }
            }
            Self::Dict(dict) => dict.table().trace_children(visit),
            Self::Function(proto) => {
                for &c in &proto.code.constants {
                    visit(c);
                }
                for &d in &proto.param_defaults {
                    visit(d);
                }
            }
            Self::Closure(closure) => {
                visit(Value::Object(closure.function));
                for &uv in &closure.upvalues {
                    visit(Value::Object(uv));
                }
            }
            Self::NativeFunction(_) => {}
            Self::Class(class) => {
                class.methods.trace_children(&mut visit);
                if let Some(parent) = class.parent {
                    visit(Value::Object(parent));
                }
            }
            Self::NativeClass(class) => {
                if let Some(parent) = class.parent {
                    visit(Value::Object(parent));
                }
            }
            Self::Instance(instance) => {
                visit(Value::Object(instance.class));
                instance.attrs.trace_children(visit);
            }
            Self::BoundMethod(bound) => {
                visit(bound.receiver);
                visit(bound.method);
            }
            Self::NativeMethod(native) => visit(native.receiver),
            Self::Upvalue(uv) => {
                if let Some(closed) = uv.closed_value() {
                    visit(closed);
                }
            }
            Self::Module(module) => module.dict.trace_children(visit),
            Self::Range(_) => {}
            Self::Slice(s) => {
                visit(s.start);
                visit(s.stop);
                visit(s.step);
            }
            Self::Iterator(iter) => match iter {
                IteratorObj::Sequence { source, .. } | IteratorObj::DictKeys { source, .. } => visit(*source),
                IteratorObj::Range { .. } => {}
            },
        }
    }
}
