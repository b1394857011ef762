//! Call semantics: invoking closures, native functions, bound/native
//! methods, and class instantiation (`spec.md` §4.6).

use smallvec::SmallVec;

use super::{CallFrame, StepOutcome, VM};
use crate::{
    exceptions::{RunError, RunResult},
    function::BoundMethod,
    heap::HeapId,
    methods,
    object::HeapData,
    table::Table,
    types::class::Instance,
    value::Value,
};

type Args = SmallVec<[Value; 4]>;

/// Outcome of resolving a callable: either it ran to completion and
/// produced a value directly (native code), or a new bytecode frame was
/// pushed and the main dispatch loop should simply keep stepping.
enum InvokeOutcome {
    Immediate(Value),
    Entered,
}

/// Handles the `CALL` opcode: pops are already done by the caller, this
/// resolves `callee(args)` and either pushes the result (native call) or
/// lets a freshly pushed frame continue the dispatch loop (bytecode call).
pub(crate) fn dispatch_call(vm: &mut VM, callee: Value, args: Args) -> RunResult<StepOutcome> {
    match vm.invoke(callee, args)? {
        InvokeOutcome::Immediate(value) => {
            vm.push(value)?;
            Ok(StepOutcome::Continue)
        }
        InvokeOutcome::Entered => Ok(StepOutcome::Continue),
    }
}

fn check_arity(name: &str, min: usize, max: Option<usize>, got: usize) -> RunResult<()> {
    if got < min || max.is_some_and(|m| got > m) {
        let expected = max.unwrap_or(min);
        return Err(RunError::type_error_arity(name, expected, got));
    }
    Ok(())
}

impl VM {
    /// Resolves and runs a single call to completion, used by native
    /// helpers (operator dispatch, attribute access, the `for` loop's
    /// `__iter__`/`__next__` calls) that need the result synchronously
    /// rather than by stepping the dispatch loop themselves.
    pub(crate) fn call_value(&mut self, callee: Value, args: &[Value]) -> RunResult<Value> {
        match self.invoke(callee, Args::from_slice(args))? {
            InvokeOutcome::Immediate(value) => Ok(value),
            InvokeOutcome::Entered => {
                let base_frame_count = self.frames.len() - 1;
                self.run_until(base_frame_count)
            }
        }
    }

    fn invoke(&mut self, callee: Value, args: Args) -> RunResult<InvokeOutcome> {
        let Value::Object(id) = callee else {
            let tname = methods::type_name(&self.heap, callee);
            return Err(RunError::type_error_not_callable(&tname));
        };
        match self.heap.get(id) {
            HeapData::Closure(_) => {
                self.enter_closure(id, args)?;
                Ok(InvokeOutcome::Entered)
            }
            HeapData::NativeFunction(nf) => {
                let func = nf.func;
                let name = nf.name;
                let (min, max) = (nf.arity_min, nf.arity_max);
                check_arity(name, min, max, args.len())?;
                let result = func(self, &args)?;
                Ok(InvokeOutcome::Immediate(result))
            }
            HeapData::BoundMethod(bound) => {
                let bound: BoundMethod = *bound;
                let mut full_args = Args::with_capacity(args.len() + 1);
                full_args.push(bound.receiver);
                full_args.extend(args);
                self.invoke(bound.method, full_args)
            }
            HeapData::NativeMethod(nm) => {
                let nm = *nm;
                let result = (nm.func)(self, nm.receiver, &args)?;
                Ok(InvokeOutcome::Immediate(result))
            }
            HeapData::Class(_) => {
                let value = self.instantiate_class(id, args)?;
                Ok(InvokeOutcome::Immediate(value))
            }
            HeapData::NativeClass(_) => {
                let tname = methods::type_name(&self.heap, callee);
                Err(RunError::type_error_not_callable(&tname))
            }
            _ => {
                let tname = methods::type_name(&self.heap, callee);
                Err(RunError::type_error_not_callable(&tname))
            }
        }
    }

    fn enter_closure(&mut self, closure_id: HeapId, args: Args) -> RunResult<()> {
        if self.frames.len() >= self.resource_max_frame_depth() {
            return Err(RunError::runtime("maximum recursion depth exceeded"));
        }
        let HeapData::Closure(closure) = self.heap.get(closure_id) else {
            unreachable!("invoke only reaches enter_closure for a Closure")
        };
        let function_id = closure.function;
        let HeapData::Function(proto) = self.heap.get(function_id) else {
            unreachable!("Closure::function always points at a FunctionProto")
        };
        let arity = proto.arity();
        let required = proto.required_arity();
        let max_locals = proto.code.max_locals;
        let name = proto.name.clone();
        let defaults = proto.param_defaults.clone();
        if args.len() < required || args.len() > arity {
            return Err(RunError::type_error_arity(&name, arity, args.len()));
        }

        self.push(Value::Object(closure_id))?;
        let base = self.stack.len() - 1;
        for i in 0..arity {
            let value = if i < args.len() { args[i] } else { defaults[i - required] };
            self.push(value)?;
        }
        for _ in arity..max_locals {
            self.push(Value::None)?;
        }
        self.frames.push(CallFrame {
            closure: closure_id,
            ip: 0,
            base,
            except_handlers: Vec::new(),
        });
        Ok(())
    }

    fn resource_max_frame_depth(&self) -> usize {
        self.resource_limits().max_frame_depth
    }

    /// Allocates a new instance and runs `__init__` if the class (or a
    /// parent in its chain) defines one (`spec.md` §4.6: "invokes a class
    /// object, which allocates an instance, calls its `init`, and leaves the
    /// instance on the stack").
    fn instantiate_class(&mut self, class_id: HeapId, args: Args) -> RunResult<Value> {
        let HeapData::Class(class) = self.heap.get(class_id) else {
            unreachable!()
        };
        let class_name = class.name.clone();
        let instance_id = self.heap.allocate(HeapData::Instance(Instance::new(class_id, class_name.clone())));
        let instance = Value::Object(instance_id);
        match self.resolve_instance_method(instance_id, "__init__") {
            Some(init) => {
                let mut full_args = Args::with_capacity(args.len() + 1);
                full_args.push(instance);
                full_args.extend(args);
                self.call_value(init, &full_args)?;
            }
            None if !args.is_empty() => {
                return Err(RunError::type_error_arity(&class_name, 0, args.len()));
            }
            None => {}
        }
        Ok(instance)
    }
}

/// Builds a [`Closure`](crate::function::Closure) over `proto_value` (a
/// `Value::Object` pointing at a `FunctionProto` constant), capturing
/// upvalues per the descriptor bytes that immediately follow the `CLOSURE`
/// operand in the instruction stream (`spec.md` §4.6).
pub(crate) fn make_closure(vm: &mut VM, proto_value: Value) -> RunResult<()> {
    let Value::Object(function_id) = proto_value else {
        unreachable!("CLOSURE operand always indexes a FunctionProto constant")
    };
    let HeapData::Function(proto) = vm.heap.get(function_id) else {
        unreachable!()
    };
    let descriptors = proto.upvalue_descriptors.clone();
    let base = vm.frames.last().expect("CLOSURE always runs inside a frame").base;
    let mut upvalues = Vec::with_capacity(descriptors.len());
    for desc in descriptors {
        if desc.is_local {
            upvalues.push(vm.capture_upvalue(base + desc.index as usize));
        } else {
            let enclosing = vm.frames.last().unwrap().closure;
            let HeapData::Closure(enclosing) = vm.heap.get(enclosing) else {
                unreachable!()
            };
            upvalues.push(enclosing.upvalues[desc.index as usize]);
        }
    }
    let closure_id = vm.heap.allocate(HeapData::Closure(crate::function::Closure {
        function: function_id,
        upvalues,
    }));
    vm.push(Value::Object(closure_id))
}

/// `MAKE_CLASS`: pushes a fresh, parent-less [`crate::types::class::Class`]
/// with the given name. `METHOD_DEF`/`INHERIT` subsequently populate it
/// before a matching `STORE_*` binds it to a name.
pub(crate) fn make_class(vm: &mut VM, name: &str) -> RunResult<()> {
    let class_id = vm.heap.allocate(HeapData::Class(crate::types::class::Class {
        name: name.to_owned(),
        methods: Table::new(),
        parent: None,
    }));
    vm.push(Value::Object(class_id))
}

/// `METHOD_DEF`: pops a closure, binds it under `name` in the class dict
/// now sitting on top of the stack (class body execution keeps the class
/// object on the stack throughout, per the teacher's own class-body
/// compilation strategy).
pub(crate) fn define_method(vm: &mut VM, name: &str) -> RunResult<()> {
    let method = vm.pop();
    let class_value = vm.peek(0);
    let Value::Object(class_id) = class_value else {
        unreachable!("METHOD_DEF always runs with the class object on top of stack")
    };
    let key_id = vm.interns.intern(&mut vm.heap, name);
    let key = Value::Object(key_id);
    let HeapData::Class(class) = vm.heap.get_mut(class_id) else {
        unreachable!()
    };
    let mut methods = std::mem::take(&mut class.methods);
    let result = methods.set(&vm.heap, key, method);
    let HeapData::Class(class) = vm.heap.get_mut(class_id) else {
        unreachable!()
    };
    class.methods = methods;
    result?;
    Ok(())
}

/// `INHERIT`: pops the parent (class or native class), sets it as the
/// parent of the class now on top of the stack.
pub(crate) fn inherit(vm: &mut VM) -> RunResult<()> {
    let parent = vm.pop();
    let Value::Object(parent_id) = parent else {
        let tname = methods::type_name(&vm.heap, parent);
        return Err(RunError::type_error(format!("cannot inherit from '{tname}'")));
    };
    if !matches!(vm.heap.get(parent_id), HeapData::Class(_) | HeapData::NativeClass(_)) {
        let tname = methods::type_name(&vm.heap, parent);
        return Err(RunError::type_error(format!("cannot inherit from '{tname}'")));
    }
    let class_value = vm.peek(0);
    let Value::Object(class_id) = class_value else {
        unreachable!("INHERIT always runs with the class object on top of stack")
    };
    let HeapData::Class(class) = vm.heap.get_mut(class_id) else {
        unreachable!()
    };
    class.parent = Some(parent_id);
    Ok(())
}
