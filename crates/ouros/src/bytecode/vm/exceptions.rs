//! `raise`/`try`/`except` machinery (`spec.md` §4.7, §7).
//!
//! The built-in exception hierarchy is represented the same way a user
//! class would be: one [`Class`] per [`ExcType`], all but the root
//! inheriting from `Exception`, registered as ordinary globals so
//! `raise ValueError('x')` is just a call expression. A raised `Instance`
//! is reduced to a `RaisedException{kind, message}` while it travels
//! through `?` as a `RunError`, and reconstructed into a fresh `Instance`
//! of the matching built-in class when a handler catches it -- so identity
//! (`is`) on a caught built-in exception is not preserved across the catch.
//! A documented CORE-scope simplification; see `DESIGN.md`.

use std::str::FromStr;

use super::VM;
use crate::{
    exceptions::{ExcType, RaisedException, RunError, RunResult},
    function::NativeFunction,
    heap::HeapId,
    methods,
    object::HeapData,
    table::Table,
    types::class::{Class, Instance},
    value::Value,
};

const EXC_TYPES: &[ExcType] = &[
    ExcType::Exception,
    ExcType::NameError,
    ExcType::TypeError,
    ExcType::ValueError,
    ExcType::IndexError,
    ExcType::KeyError,
    ExcType::AttributeError,
    ExcType::ZeroDivisionError,
    ExcType::StopIteration,
    ExcType::AssertionError,
    ExcType::NotImplementedError,
    ExcType::RuntimeError,
];

/// Registers one built-in class per [`ExcType`] under its name in
/// `vm.globals`, all but `Exception` itself inheriting from it. Called once
/// by `builtins::install` during VM setup.
pub(crate) fn install_exception_classes(vm: &mut VM) {
    let str_id = vm.heap.allocate(HeapData::NativeFunction(NativeFunction {
        name: "__str__",
        func: exc_str,
        arity_min: 1,
        arity_max: Some(1),
    }));
    let init_id = vm.heap.allocate(HeapData::NativeFunction(NativeFunction {
        name: "__init__",
        func: exc_init,
        arity_min: 1,
        arity_max: Some(2),
    }));

    let mut exception_base = None;
    for &kind in EXC_TYPES {
        let name = kind.to_string();
        let mut methods = Table::new();
        if kind == ExcType::Exception {
            let str_key = vm.interns.intern(&mut vm.heap, "__str__");
            let init_key = vm.interns.intern(&mut vm.heap, "__init__");
            methods
                .set(&vm.heap, Value::Object(str_key), Value::Object(str_id))
                .expect("interned key is always hashable");
            methods
                .set(&vm.heap, Value::Object(init_key), Value::Object(init_id))
                .expect("interned key is always hashable");
        }
        let parent = if kind == ExcType::Exception { None } else { exception_base };
        let class_id = vm.heap.allocate(HeapData::Class(Class { name: name.clone(), methods, parent }));
        if kind == ExcType::Exception {
            exception_base = Some(class_id);
        }
        let name_id = vm.heap.allocate_interned_string(&name);
        vm.globals
            .set(&vm.heap, Value::Object(name_id), Value::Object(class_id))
            .expect("exception class name is always a string");
    }
}

fn exc_init(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let Value::Object(id) = args[0] else {
        unreachable!("__init__ always receives the new instance as self")
    };
    let message = match args.get(1) {
        Some(&v) => methods::value_str(vm, v)?,
        None => String::new(),
    };
    let message_id = vm.heap.allocate_string(message);
    set_message(vm, id, Value::Object(message_id));
    Ok(Value::None)
}

fn exc_str(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let Value::Object(id) = args[0] else {
        unreachable!("__str__ always receives the instance as self")
    };
    Ok(get_message(vm, id))
}

fn set_message(vm: &mut VM, instance_id: HeapId, message: Value) {
    let key_id = vm.interns.intern(&mut vm.heap, "message");
    let key = Value::Object(key_id);
    let HeapData::Instance(instance) = vm.heap.get_mut(instance_id) else {
        unreachable!()
    };
    let mut attrs = std::mem::take(&mut instance.attrs);
    attrs.set(&vm.heap, key, message).expect("interned key is always hashable");
    let HeapData::Instance(instance) = vm.heap.get_mut(instance_id) else {
        unreachable!()
    };
    instance.attrs = attrs;
}

fn get_message(vm: &mut VM, instance_id: HeapId) -> Value {
    let key_id = vm.interns.intern(&mut vm.heap, "message");
    let key = Value::Object(key_id);
    let HeapData::Instance(instance) = vm.heap.get(instance_id) else {
        unreachable!()
    };
    instance.attrs.get(&vm.heap, key).unwrap_or(Value::Undefined)
}

fn resolve_exc_type(heap: &crate::heap::Heap, class_id: Option<HeapId>) -> Option<ExcType> {
    let mut current = class_id;
    while let Some(id) = current {
        let HeapData::Class(class) = heap.get(id) else {
            return None;
        };
        if let Ok(kind) = ExcType::from_str(&class.name) {
            return Some(kind);
        }
        current = class.parent;
    }
    None
}

/// `RAISE`: reduces the popped value to a `RunError`. Only an `Instance` of
/// (a subclass of) a built-in exception class is a valid raise target;
/// anything else raises `TypeError` instead of propagating (`spec.md` §7:
/// "all are values of user-visible exception classes rooted at a common
/// `Exception`").
pub(crate) fn value_to_raise(vm: &mut VM, value: Value) -> RunError {
    let Value::Object(id) = value else {
        return RunError::type_error("exceptions must derive from BaseException");
    };
    let HeapData::Instance(instance) = vm.heap.get(id) else {
        return RunError::type_error("exceptions must derive from BaseException");
    };
    let class_id = instance.class;
    let Some(kind) = resolve_exc_type(&vm.heap, Some(class_id)) else {
        return RunError::type_error("exceptions must derive from BaseException");
    };
    let message = match get_message(vm, id) {
        Value::Object(str_id) => match vm.heap.get(str_id) {
            HeapData::String(s) => s.as_str().to_owned(),
            _ => String::new(),
        },
        _ => String::new(),
    };
    RunError::Exc(RaisedException { kind, message })
}

/// Reconstructs a fresh `Instance` of `raised.kind`'s built-in class,
/// carrying `raised.message`, for the handler to bind.
fn instantiate_exception(vm: &mut VM, raised: &RaisedException) -> Value {
    let class_name = raised.kind.to_string();
    let key_id = vm.interns.intern(&mut vm.heap, &class_name);
    let class_value = vm.globals.get(&vm.heap, Value::Object(key_id)).unwrap_or(Value::Undefined);
    let Value::Object(class_id) = class_value else {
        unreachable!("install_exception_classes registers every ExcType")
    };
    let instance_id = vm.heap.allocate(HeapData::Instance(Instance::new(class_id, class_name)));
    let message_id = vm.heap.allocate_string(raised.message.clone());
    set_message(vm, instance_id, Value::Object(message_id));
    Value::Object(instance_id)
}

/// Searches outward from the current frame for a handler. On a hit,
/// truncates the stack to the handler's recorded depth, pushes the
/// (reconstructed) exception value, records it as the current exception for
/// a later bare `raise`, and jumps. On a miss, pops the frame (closing its
/// upvalues) and keeps unwinding into the caller.
pub(crate) fn try_unwind(vm: &mut VM, err: &RunError) -> bool {
    let RunError::Exc(raised) = err;
    loop {
        let Some(frame) = vm.frames.last_mut() else {
            return false;
        };
        if let Some(handler) = frame.except_handlers.pop() {
            vm.stack.truncate(handler.stack_depth);
            let exc_value = instantiate_exception(vm, raised);
            vm.current_exception = Some(exc_value);
            vm.stack.push(exc_value);
            vm.frames.last_mut().expect("just matched Some above").ip = handler.target;
            return true;
        }
        let frame = vm.frames.pop().expect("loop condition just matched Some");
        vm.close_upvalues_from(frame.base);
        vm.stack.truncate(frame.base.saturating_sub(1).max(0));
    }
}

/// `PUSH_EXCEPTION`: the value a bare `raise` (re-raise) reads.
pub(crate) fn current_exception_value(vm: &VM) -> Value {
    vm.current_exception.unwrap_or(Value::None)
}
