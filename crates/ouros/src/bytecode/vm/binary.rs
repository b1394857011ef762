//! Opcode-facing wrappers around the operator protocol in [`crate::methods`]
//! for `NEG`/`POS`, `GET_ITER`, and `CONTAINS` (`spec.md` §4.1, §4.4).
//!
//! `ADD`/`SUB`/.../`LE` go straight through [`VM::binary_op`]; the protocol
//! itself (forward → reflected → identity fallback → `TypeError`) lives in
//! `methods::binary_dispatch` since it's shared with no opcode-specific
//! logic here.

use super::VM;
use crate::{exceptions::RunError, exceptions::RunResult, methods, object::HeapData, value::Value};

impl VM {
    pub(crate) fn binary_op(&mut self, op: methods::BinOp) -> RunResult<()> {
        let b = self.pop();
        let a = self.pop();
        let result = methods::binary_dispatch(self, op, a, b)?;
        self.push(result)
    }
}

/// `NEG`/`POS`. `symbol` is `"-"` or `"+"`.
pub(crate) fn unary_op(vm: &mut VM, symbol: &'static str) -> RunResult<()> {
    let a = vm.pop();
    let select = if symbol == "-" { |t: &methods::MethodTable| t.neg } else { |t: &methods::MethodTable| t.pos };
    let result = methods::unary_dispatch(vm, symbol, select, a)?;
    vm.push(result)
}

/// `GET_ITER`: resolves `obj`'s iterator, preferring an instance's
/// `__iter__` override over the built-in table slot (`spec.md` §4.4: "`for`
/// lowers to `GET_ITER` then a `FOR_ITER` loop").
pub(crate) fn get_iter(vm: &mut VM, obj: Value) -> RunResult<Value> {
    if let Value::Object(id) = obj {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__iter__") {
                return vm.call_value(method, &[obj]);
            }
        }
    }
    let tag = obj.tag(&vm.heap);
    match methods::table_for(tag).and_then(|t| t.iter) {
        Some(f) => f(vm, obj),
        None => {
            let name = methods::type_name(&vm.heap, obj);
            Err(RunError::type_error_not_iterable(&name))
        }
    }
}

/// `CONTAINS` (the `in` operator): `needle in haystack`, preferring an
/// instance's `__contains__` override over the built-in table slot.
pub(crate) fn contains(vm: &mut VM, haystack: Value, needle: Value) -> RunResult<bool> {
    if let Value::Object(id) = haystack {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__contains__") {
                let result = vm.call_value(method, &[haystack, needle])?;
                return methods::to_bool(vm, result);
            }
        }
    }
    let tag = haystack.tag(&vm.heap);
    match methods::table_for(tag).and_then(|t| t.contains) {
        Some(f) => f(vm, haystack, needle),
        None => {
            let name = methods::type_name(&vm.heap, haystack);
            Err(RunError::type_error(format!("argument of type '{name}' is not iterable")))
        }
    }
}
