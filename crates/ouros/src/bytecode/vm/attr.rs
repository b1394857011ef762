//! Attribute (`.`) and subscript (`[]`) access (`spec.md` §4.5):
//!
//! > Attribute lookup walks instance dict, then class, then parents in
//! > declaration order. `getattr` consults the value's method table; for
//! > instances it first checks the per-instance dict, then the class chain.
//! > A class method resolved from an instance is wrapped into a bound method
//! > object carrying the receiver. `setattr`/`delattr` raise when the method
//! > table slot is absent (read-only type).

use super::VM;
use crate::{
    exceptions::{RunError, RunResult},
    function::BoundMethod,
    heap::HeapId,
    methods,
    object::HeapData,
    value::Value,
};

/// Walks `class_id`'s own method dict, then its parent chain, for `key`
/// (an already-interned string `Value`). Stops at a `NativeClass` parent:
/// a user class inheriting from a built-in type does not currently pick up
/// the built-in's dunder operators this way (those are already reachable
/// through the value's own `MethodTable`, so the only gap is a user class
/// overriding, say, `list`'s `__len__` — out of scope for CORE).
fn lookup_class_chain(heap: &crate::heap::Heap, class_id: Option<HeapId>, key: Value) -> Option<Value> {
    let mut current = class_id;
    while let Some(id) = current {
        let HeapData::Class(class) = heap.get(id) else {
            return None;
        };
        if let Ok(value) = class.methods.get(heap, key) {
            if !matches!(value, Value::Undefined) {
                return Some(value);
            }
        }
        current = class.parent.filter(|&p| matches!(heap.get(p), HeapData::Class(_)));
    }
    None
}

impl VM {
    /// Resolves a dunder or user method by name against `instance`'s class
    /// chain only — never its per-instance attribute dict, mirroring
    /// `type(obj).__method__` semantics so that shadowing an instance
    /// attribute named e.g. `__len__` cannot hijack operator dispatch.
    /// Wraps the result in a [`BoundMethod`] when found.
    pub(crate) fn resolve_instance_method(&mut self, instance_id: HeapId, name: &str) -> Option<Value> {
        let HeapData::Instance(instance) = self.heap.get(instance_id) else {
            unreachable!("resolve_instance_method only ever called on an Instance")
        };
        let class_id = instance.class;
        let key_id = self.interns.intern(&mut self.heap, name);
        let key = Value::Object(key_id);
        let method = lookup_class_chain(&self.heap, Some(class_id), key)?;
        let bound_id = self.heap.allocate(HeapData::BoundMethod(BoundMethod {
            receiver: Value::Object(instance_id),
            method,
        }));
        Some(Value::Object(bound_id))
    }
}

/// `GET_ATTR`. Only `Instance`/`Class`/`Module` carry an attribute
/// namespace; every other built-in type raises `AttributeError` (its
/// operators are all reached through the value's `MethodTable` instead,
/// per `spec.md` §9's scope for CORE).
pub(crate) fn getattr(vm: &mut VM, obj: Value, name: &str) -> RunResult<Value> {
    let Value::Object(id) = obj else {
        let tname = methods::type_name(&vm.heap, obj);
        return Err(RunError::attribute_error(&tname, name));
    };
    match vm.heap.get(id) {
        HeapData::Instance(instance) => {
            let class_id = instance.class;
            let key_id = vm.interns.intern(&mut vm.heap, name);
            let key = Value::Object(key_id);
            let HeapData::Instance(instance) = vm.heap.get(id) else { unreachable!() };
            if let Ok(value) = instance.attrs.get(&vm.heap, key) {
                if !matches!(value, Value::Undefined) {
                    return Ok(value);
                }
            }
            if let Some(method) = lookup_class_chain(&vm.heap, Some(class_id), key) {
                let bound_id = vm.heap.allocate(HeapData::BoundMethod(BoundMethod { receiver: obj, method }));
                return Ok(Value::Object(bound_id));
            }
            let class_name = instance_class_name(vm, id);
            Err(RunError::attribute_error(&class_name, name))
        }
        HeapData::Class(class) => {
            let class_name = class.name.clone();
            let key_id = vm.interns.intern(&mut vm.heap, name);
            let key = Value::Object(key_id);
            let HeapData::Class(class) = vm.heap.get(id) else { unreachable!() };
            if let Some(method) = lookup_class_chain(&vm.heap, Some(class_id_of(class, id)), key) {
                return Ok(method);
            }
            Err(RunError::attribute_error(&class_name, name))
        }
        HeapData::Module(module) => {
            let module_name = module.name.clone();
            let key_id = vm.interns.intern(&mut vm.heap, name);
            let key = Value::Object(key_id);
            let HeapData::Module(module) = vm.heap.get(id) else { unreachable!() };
            match module.dict.get(&vm.heap, key) {
                Ok(value) if !matches!(value, Value::Undefined) => Ok(value),
                _ => Err(RunError::attribute_error(&module_name, name)),
            }
        }
        _ => {
            let tname = methods::type_name(&vm.heap, obj);
            Err(RunError::attribute_error(&tname, name))
        }
    }
}

// `lookup_class_chain` needs the class's own id as the starting point, but
// we're already holding `&class`; reuse the id we matched on instead of
// re-deriving it.
fn class_id_of(_class: &crate::types::class::Class, id: HeapId) -> HeapId {
    id
}

fn instance_class_name(vm: &VM, instance_id: HeapId) -> String {
    let HeapData::Instance(instance) = vm.heap.get(instance_id) else {
        unreachable!()
    };
    instance.class_name.clone()
}

/// `SET_ATTR`. Only `Instance`/`Module` attribute dicts are mutable;
/// classes are not (CORE has no metaclass protocol for rebinding class
/// attributes at runtime).
pub(crate) fn setattr(vm: &mut VM, obj: Value, name: &str, value: Value) -> RunResult<()> {
    let Value::Object(id) = obj else {
        let tname = methods::type_name(&vm.heap, obj);
        return Err(RunError::attribute_error_readonly(&tname, name));
    };
    match vm.heap.get(id) {
        HeapData::Instance(_) => {
            let key_id = vm.interns.intern(&mut vm.heap, name);
            let key = Value::Object(key_id);
            let HeapData::Instance(instance) = vm.heap.get_mut(id) else { unreachable!() };
            let mut attrs = std::mem::take(&mut instance.attrs);
            let result = attrs.set(&vm.heap, key, value);
            let HeapData::Instance(instance) = vm.heap.get_mut(id) else { unreachable!() };
            instance.attrs = attrs;
            result?;
            Ok(())
        }
        HeapData::Module(_) => {
            let key_id = vm.interns.intern(&mut vm.heap, name);
            let key = Value::Object(key_id);
            let HeapData::Module(module) = vm.heap.get_mut(id) else { unreachable!() };
            let mut dict = std::mem::take(&mut module.dict);
            let result = dict.set(&vm.heap, key, value);
            let HeapData::Module(module) = vm.heap.get_mut(id) else { unreachable!() };
            module.dict = dict;
            result?;
            Ok(())
        }
        _ => {
            let tname = methods::type_name(&vm.heap, obj);
            Err(RunError::attribute_error_readonly(&tname, name))
        }
    }
}

/// `DEL_ATTR`.
pub(crate) fn delattr(vm: &mut VM, obj: Value, name: &str) -> RunResult<()> {
    let Value::Object(id) = obj else {
        let tname = methods::type_name(&vm.heap, obj);
        return Err(RunError::attribute_error_readonly(&tname, name));
    };
    match vm.heap.get(id) {
        HeapData::Instance(_) => {
            let key_id = vm.interns.intern(&mut vm.heap, name);
            let key = Value::Object(key_id);
            let HeapData::Instance(instance) = vm.heap.get_mut(id) else { unreachable!() };
            let mut attrs = std::mem::take(&mut instance.attrs);
            let result = attrs.delete(&vm.heap, key);
            let HeapData::Instance(instance) = vm.heap.get_mut(id) else { unreachable!() };
            instance.attrs = attrs;
            result?;
            Ok(())
        }
        _ => {
            let tname = methods::type_name(&vm.heap, obj);
            Err(RunError::attribute_error_readonly(&tname, name))
        }
    }
}

/// `GET_ITEM` (`obj[key]`): instance `__getitem__` override, else the
/// built-in table slot, else `TypeError` (`spec.md` §4.5).
pub(crate) fn getitem(vm: &mut VM, obj: Value, key: Value) -> RunResult<Value> {
    if let Value::Object(id) = obj {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__getitem__") {
                return vm.call_value(method, &[obj, key]);
            }
            let tname = methods::type_name(&vm.heap, obj);
            return Err(RunError::type_error_not_subscriptable(&tname));
        }
    }
    let tag = obj.tag(&vm.heap);
    match methods::table_for(tag).and_then(|t| t.getitem) {
        Some(f) => f(vm, obj, key),
        None => {
            let tname = methods::type_name(&vm.heap, obj);
            Err(RunError::type_error_not_subscriptable(&tname))
        }
    }
}

/// `SET_ITEM` (`obj[key] = value`).
pub(crate) fn setitem(vm: &mut VM, obj: Value, key: Value, value: Value) -> RunResult<()> {
    if let Value::Object(id) = obj {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__setitem__") {
                vm.call_value(method, &[obj, key, value])?;
                return Ok(());
            }
            let tname = methods::type_name(&vm.heap, obj);
            return Err(RunError::type_error_no_item_assignment(&tname));
        }
    }
    let tag = obj.tag(&vm.heap);
    match methods::table_for(tag).and_then(|t| t.setitem) {
        Some(f) => f(vm, obj, key, value),
        None => {
            let tname = methods::type_name(&vm.heap, obj);
            Err(RunError::type_error_no_item_assignment(&tname))
        }
    }
}

/// `DEL_ITEM` (`del obj[key]`).
pub(crate) fn delitem(vm: &mut VM, obj: Value, key: Value) -> RunResult<()> {
    if let Value::Object(id) = obj {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__delitem__") {
                vm.call_value(method, &[obj, key])?;
                return Ok(());
            }
            let tname = methods::type_name(&vm.heap, obj);
            return Err(RunError::type_error_no_item_assignment(&tname));
        }
    }
    let tag = obj.tag(&vm.heap);
    match methods::table_for(tag).and_then(|t| t.delitem) {
        Some(f) => f(vm, obj, key),
        None => {
            let tname = methods::type_name(&vm.heap, obj);
            Err(RunError::type_error_no_item_assignment(&tname))
        }
    }
}
