//! List/tuple/dict/slice literal construction and the `for`-loop iteration
//! opcode (`spec.md` §4.3, §4.4).

use super::VM;
use crate::{
    exceptions::{RunError, RunResult},
    object::{HeapData, SliceObj},
    value::Value,
};

/// `BUILD_LIST`: pops `count` values (in source order), pushes a `list`.
pub(crate) fn build_list(vm: &mut VM, count: usize) -> RunResult<()> {
    let items = vm.stack.split_off(vm.stack.len() - count);
    let id = vm.heap.allocate(HeapData::List(items));
    vm.push(Value::Object(id))
}

/// `BUILD_TUPLE`: pops `count` values, pushes a `tuple`.
pub(crate) fn build_tuple(vm: &mut VM, count: usize) -> RunResult<()> {
    let items = vm.stack.split_off(vm.stack.len() - count);
    let id = vm.heap.allocate(HeapData::Tuple(items.into_boxed_slice()));
    vm.push(Value::Object(id))
}

/// `BUILD_DICT`: pops `2 * count` values (key, value interleaved), pushes a
/// `dict`. A later key wins on duplicates, matching literal evaluation
/// order (`spec.md` §4.3).
pub(crate) fn build_dict(vm: &mut VM, count: usize) -> RunResult<()> {
    let flat = vm.stack.split_off(vm.stack.len() - 2 * count);
    let mut dict = crate::types::dict::Dict::new();
    for pair in flat.chunks_exact(2) {
        dict.table_mut().set(&vm.heap, pair[0], pair[1])?;
    }
    let id = vm.heap.allocate(HeapData::Dict(dict));
    vm.push(Value::Object(id))
}

/// `BUILD_SLICE`: pops step, stop, start (in that order), pushes a `slice`.
pub(crate) fn build_slice(vm: &mut VM) -> RunResult<()> {
    let step = vm.pop();
    let stop = vm.pop();
    let start = vm.pop();
    let id = vm.heap.allocate(HeapData::Slice(SliceObj { start, stop, step }));
    vm.push(Value::Object(id))
}

/// `FOR_ITER`: peeks the iterator on top of stack. Resolves an instance's
/// `__next__` override first, else the built-in `Iterator` table slot; on
/// `StopIteration` pops the iterator and jumps to `target`, otherwise
/// pushes the yielded value (`spec.md` §4.4).
pub(crate) fn for_iter(vm: &mut VM, target: usize) -> RunResult<()> {
    let iterator = vm.peek(0);
    let next_result = call_next(vm, iterator);
    match next_result {
        Ok(value) => {
            vm.push(value)?;
            Ok(())
        }
        Err(err) if is_stop_iteration(&err) => {
            vm.pop();
            vm.frames.last_mut().expect("FOR_ITER always runs inside a frame").ip = target;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn call_next(vm: &mut VM, iterator: Value) -> RunResult<Value> {
    if let Value::Object(id) = iterator {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__next__") {
                return vm.call_value(method, &[iterator]);
            }
        }
    }
    let tag = iterator.tag(&vm.heap);
    match crate::methods::table_for(tag).and_then(|t| t.next) {
        Some(f) => f(vm, iterator),
        None => {
            let name = crate::methods::type_name(&vm.heap, iterator);
            Err(RunError::type_error_not_iterable(&name))
        }
    }
}

fn is_stop_iteration(err: &RunError) -> bool {
    let RunError::Exc(raised) = err;
    raised.kind == crate::exceptions::ExcType::StopIteration
}
