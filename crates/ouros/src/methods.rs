//! Per-variant method tables and the operator dispatch protocol.
//!
//! `spec.md` §4.1/§9: dispatch is a tagged union whose discriminant indexes
//! a static table of function pointers, one table per built-in type. This
//! mirrors the C source's `*_METHODS` macros (e.g.
//! `original_source/include/value_float.h`'s `FLOAT_METHODS`) almost
//! verbatim, just expressed as a Rust `struct` of `Option<fn(..)>` fields
//! instead of a C struct literal macro.
//!
//! User-defined classes are not represented in this table at all: their
//! operators are ordinary methods in the class's method dict, resolved by
//! name (`__add__`, `__radd__`, …) by the instance-aware wrappers in
//! `bytecode::vm::binary`/`compare`/`attr`. This table only ever holds the
//! built-in types' native implementations.

use crate::{
    bytecode::vm::VM,
    exceptions::RunError,
    exceptions::RunResult,
    heap::Heap,
    object::{HeapData, Tag},
    types::{range::RangeObj, str::Str},
    value::Value,
};

pub(crate) type BinFn = fn(&mut VM, Value, Value) -> RunResult<Value>;
pub(crate) type UnFn = fn(&mut VM, Value) -> RunResult<Value>;
pub(crate) type HashFn = fn(&Heap, Value) -> RunResult<u64>;
pub(crate) type LenFn = fn(&Heap, Value) -> RunResult<i64>;
pub(crate) type ToBoolFn = fn(&Heap, Value) -> bool;
pub(crate) type ToIntFn = fn(&Heap, Value) -> RunResult<i64>;
pub(crate) type ToFloatFn = fn(&Heap, Value) -> RunResult<f64>;
pub(crate) type StrFn = fn(&mut VM, Value) -> RunResult<String>;
pub(crate) type ItemGetFn = fn(&mut VM, Value, Value) -> RunResult<Value>;
pub(crate) type ItemSetFn = fn(&mut VM, Value, Value, Value) -> RunResult<()>;
pub(crate) type ItemDelFn = fn(&mut VM, Value, Value) -> RunResult<()>;
pub(crate) type ContainsFn = fn(&mut VM, Value, Value) -> RunResult<bool>;
pub(crate) type IterFn = fn(&mut VM, Value) -> RunResult<Value>;
pub(crate) type NextFn = fn(&mut VM, Value) -> RunResult<Value>;

/// The per-type operator record. Absent slots are equivalent to returning
/// `NotImplemented` (`spec.md` §9).
#[derive(Debug, Clone, Copy)]
pub(crate) struct MethodTable {
    pub(crate) eq: Option<BinFn>,
    pub(crate) gt: Option<BinFn>,
    pub(crate) ge: Option<BinFn>,
    pub(crate) lt: Option<BinFn>,
    pub(crate) le: Option<BinFn>,
    pub(crate) add: Option<BinFn>,
    pub(crate) radd: Option<BinFn>,
    pub(crate) sub: Option<BinFn>,
    pub(crate) rsub: Option<BinFn>,
    pub(crate) mul: Option<BinFn>,
    pub(crate) rmul: Option<BinFn>,
    pub(crate) truediv: Option<BinFn>,
    pub(crate) rtruediv: Option<BinFn>,
    pub(crate) floordiv: Option<BinFn>,
    pub(crate) modulo: Option<BinFn>,
    pub(crate) neg: Option<UnFn>,
    pub(crate) pos: Option<UnFn>,
    pub(crate) contains: Option<ContainsFn>,
    pub(crate) getitem: Option<ItemGetFn>,
    pub(crate) setitem: Option<ItemSetFn>,
    pub(crate) delitem: Option<ItemDelFn>,
    pub(crate) hash: Option<HashFn>,
    pub(crate) len: Option<LenFn>,
    pub(crate) to_bool: Option<ToBoolFn>,
    pub(crate) to_int: Option<ToIntFn>,
    pub(crate) to_float: Option<ToFloatFn>,
    pub(crate) str_: Option<StrFn>,
    pub(crate) repr: Option<StrFn>,
    pub(crate) iter: Option<IterFn>,
    pub(crate) next: Option<NextFn>,
}

impl MethodTable {
    pub(crate) const NONE: Self = Self {
        eq: None,
        gt: None,
        ge: None,
        lt: None,
        le: None,
        add: None,
        radd: None,
        sub: None,
        rsub: None,
        mul: None,
        rmul: None,
        truediv: None,
        rtruediv: None,
        floordiv: None,
        modulo: None,
        neg: None,
        pos: None,
        contains: None,
        getitem: None,
        setitem: None,
        delitem: None,
        hash: None,
        len: None,
        to_bool: None,
        to_int: None,
        to_float: None,
        str_: None,
        repr: None,
        iter: None,
        next: None,
    };
}

/// Returns the static method table backing `tag`, or `None` for tags that
/// carry no built-in operators of their own (`Instance`/`Class`, which
/// dispatch through their method dict instead).
pub(crate) fn table_for(tag: Tag) -> Option<&'static MethodTable> {
    match tag {
        Tag::Bool | Tag::Int => Some(&INT_METHODS),
        Tag::Float => Some(&FLOAT_METHODS),
        Tag::None | Tag::Undefined | Tag::NotImplemented => Some(&NONE_METHODS),
        Tag::String => Some(&STRING_METHODS),
        Tag::List => Some(&LIST_METHODS),
        Tag::Tuple => Some(&TUPLE_METHODS),
        Tag::Dict => Some(&DICT_METHODS),
        Tag::Range => Some(&RANGE_METHODS),
        Tag::Iterator => Some(&ITERATOR_METHODS),
        _ => None,
    }
}

pub(crate) fn type_name(heap: &Heap, value: Value) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::NotImplemented => "NotImplementedType".to_owned(),
        Value::None => "NoneType".to_owned(),
        Value::Bool(_) => "bool".to_owned(),
        Value::Int(_) => "int".to_owned(),
        Value::Float(_) => "float".to_owned(),
        // `type_name` never actually consults the intern table (built-in
        // type names are static strings, instance/class names are owned
        // `String`s already), so no real `Interns` is needed here.
        Value::Object(id) => heap.get(id).type_name(&crate::intern::Interns::new()),
    }
}

// ---------------------------------------------------------------------
// Binary/unary operator protocol (spec.md §4.1)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
}

impl BinOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::TrueDiv => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
        }
    }

    /// The forward dunder name, used as both the class-method-dict lookup
    /// key and (conceptually) the method-table slot name.
    fn forward_magic(self) -> &'static str {
        match self {
            Self::Eq => "__eq__",
            Self::Ne => "__ne__",
            Self::Gt => "__gt__",
            Self::Ge => "__ge__",
            Self::Lt => "__lt__",
            Self::Le => "__le__",
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::TrueDiv => "__truediv__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
        }
    }

    /// The reflected dunder name and, for non-commutative comparisons, the
    /// mirrored comparison to try (`a < b` reflects to `b > a`, etc.).
    fn reflected_magic(self) -> &'static str {
        match self {
            Self::Eq => "__eq__",
            Self::Ne => "__ne__",
            Self::Gt => "__lt__",
            Self::Ge => "__le__",
            Self::Lt => "__gt__",
            Self::Le => "__ge__",
            Self::Add => "__radd__",
            Self::Sub => "__rsub__",
            Self::Mul => "__rmul__",
            Self::TrueDiv => "__rtruediv__",
            Self::FloorDiv => "__rfloordiv__",
            Self::Mod => "__rmod__",
        }
    }

    fn table_slot(self, table: &MethodTable) -> Option<BinFn> {
        match self {
            // `!=` has no dedicated slot: it reuses `eq` and the caller
            // negates the result (see `dispatch_forward`).
            Self::Eq | Self::Ne => table.eq,
            Self::Gt => table.gt,
            Self::Ge => table.ge,
            Self::Lt => table.lt,
            Self::Le => table.le,
            Self::Add => table.add,
            Self::Sub => table.sub,
            Self::Mul => table.mul,
            Self::TrueDiv => table.truediv,
            Self::FloorDiv => table.floordiv,
            Self::Mod => table.modulo,
        }
    }

    fn reflected_table_slot(self, table: &MethodTable) -> Option<BinFn> {
        match self {
            Self::Eq => table.eq,
            Self::Ne => table.eq,
            Self::Gt => table.lt,
            Self::Ge => table.le,
            Self::Lt => table.gt,
            Self::Le => table.ge,
            Self::Add => table.radd,
            Self::Sub => table.rsub,
            Self::Mul => table.rmul,
            Self::TrueDiv => table.rtruediv,
            Self::FloorDiv => None,
            Self::Mod => None,
        }
    }
}

/// Resolves and invokes the forward half of `op` for `a op b`.
fn dispatch_forward(vm: &mut VM, op: BinOp, a: Value, b: Value) -> RunResult<Value> {
    if let Value::Object(id) = a {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, op.forward_magic()) {
                return vm.call_value(method, &[a, b]);
            }
            return Ok(Value::NotImplemented);
        }
    }
    let tag = a.tag(&vm.heap);
    match table_for(tag).and_then(|t| op.table_slot(t)) {
        Some(f) => {
            let result = f(vm, a, b);
            if op == BinOp::Ne {
                return result.map(negate_bool_value);
            }
            result
        }
        None => Ok(Value::NotImplemented),
    }
}

fn negate_bool_value(v: Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(!b),
        other => other,
    }
}

/// Resolves and invokes the reflected half: `b.rop(a)`.
fn dispatch_reflected(vm: &mut VM, op: BinOp, b: Value, a: Value) -> RunResult<Value> {
    if let Value::Object(id) = b {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, op.reflected_magic()) {
                return vm.call_value(method, &[b, a]);
            }
            return Ok(Value::NotImplemented);
        }
    }
    let tag = b.tag(&vm.heap);
    match table_for(tag).and_then(|t| op.reflected_table_slot(t)) {
        Some(f) => {
            let result = f(vm, b, a);
            if op == BinOp::Ne {
                result.map(negate_bool_value)
            } else {
                result
            }
        }
        None => Ok(Value::NotImplemented),
    }
}

/// The full binary-operator protocol from `spec.md` §4.1: try forward, then
/// reflected, then (for `==`/`!=` only) identity, then raise `TypeError`.
pub(crate) fn binary_dispatch(vm: &mut VM, op: BinOp, a: Value, b: Value) -> RunResult<Value> {
    let forward = dispatch_forward(vm, op, a, b)?;
    if !matches!(forward, Value::NotImplemented) {
        return Ok(forward);
    }
    let reflected = dispatch_reflected(vm, op, b, a)?;
    if !matches!(reflected, Value::NotImplemented) {
        return Ok(reflected);
    }
    match op {
        BinOp::Eq => Ok(Value::Bool(a.is_identical(b))),
        BinOp::Ne => Ok(Value::Bool(!a.is_identical(b))),
        _ => {
            let lhs = type_name(&vm.heap, a);
            let rhs = type_name(&vm.heap, b);
            Err(RunError::type_error_unsupported_operand(op.symbol(), &lhs, &rhs))
        }
    }
}

/// Unary `-`/`+` (no reflected step, `spec.md` §4.1).
pub(crate) fn unary_dispatch(vm: &mut VM, symbol: &'static str, select: fn(&MethodTable) -> Option<UnFn>, a: Value) -> RunResult<Value> {
    if let Value::Object(id) = a {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            let magic = if symbol == "-" { "__neg__" } else { "__pos__" };
            if let Some(method) = vm.resolve_instance_method(id, magic) {
                return vm.call_value(method, &[a]);
            }
        }
    }
    let tag = a.tag(&vm.heap);
    match table_for(tag).and_then(select) {
        Some(f) => f(vm, a),
        None => {
            let name = type_name(&vm.heap, a);
            Err(RunError::type_error_unsupported_unary(symbol, &name))
        }
    }
}

/// `hash()`, used by [`crate::table::Table`] as the keying function.
pub(crate) fn value_hash(heap: &Heap, value: Value) -> RunResult<u64> {
    match table_for(value.tag(heap)).and_then(|t| t.hash) {
        Some(f) => f(heap, value),
        None => Err(RunError::type_error_unhashable(&type_name(heap, value))),
    }
}

/// Key equality for the `Table`: identical to `==` for the common case, but
/// must not re-enter user code (tables used internally -- globals, attribute
/// maps -- must stay infallible w.r.t. user dunder overrides). Built-in
/// types only.
pub(crate) fn value_eq_for_key(heap: &Heap, a: Value, b: Value) -> RunResult<bool> {
    if let (Value::Object(ida), Value::Object(idb)) = (a, b) {
        if ida == idb {
            return Ok(true);
        }
    }
    match table_for(a.tag(heap)).and_then(|t| t.eq) {
        Some(_) => Ok(builtin_eq(heap, a, b)),
        None => Ok(a.is_identical(b)),
    }
}

fn builtin_eq(heap: &Heap, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (x as f64) == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Bool(x), Value::Int(y)) | (Value::Int(y), Value::Bool(x)) => i64::from(x) == y,
        (Value::None, Value::None) => true,
        (Value::Object(ida), Value::Object(idb)) => match (heap.get(ida), heap.get(idb)) {
            (HeapData::String(sa), HeapData::String(sb)) => sa.as_str() == sb.as_str(),
            (HeapData::Tuple(ta), HeapData::Tuple(tb)) => {
                ta.len() == tb.len() && ta.iter().zip(tb.iter()).all(|(x, y)| builtin_eq(heap, *x, *y))
            }
            _ => ida == idb,
        },
        _ => false,
    }
}

pub(crate) fn to_bool(vm: &mut VM, value: Value) -> RunResult<bool> {
    if let Some(b) = value.truthy_immediate() {
        return Ok(b);
    }
    if let Value::Object(id) = value {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__bool__") {
                let result = vm.call_value(method, &[value])?;
                return Ok(result.truthy_immediate().unwrap_or(true));
            }
            return Ok(true);
        }
    }
    let tag = value.tag(&vm.heap);
    Ok(match table_for(tag).and_then(|t| t.to_bool) {
        Some(f) => f(&vm.heap, value),
        None => true,
    })
}

pub(crate) fn value_len(vm: &mut VM, value: Value) -> RunResult<i64> {
    if let Value::Object(id) = value {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__len__") {
                let result = vm.call_value(method, &[value])?;
                return match result {
                    Value::Int(i) => Ok(i),
                    _ => Err(RunError::type_error("__len__() should return an int")),
                };
            }
        }
    }
    let tag = value.tag(&vm.heap);
    match table_for(tag).and_then(|t| t.len) {
        Some(f) => f(&vm.heap, value),
        None => {
            let name = type_name(&vm.heap, value);
            Err(RunError::type_error(format!("object of type '{name}' has no len()")))
        }
    }
}

/// `str(value)`: falls back to `repr` for any type that defines repr but not
/// str (`spec.md` §4.1).
pub(crate) fn value_str(vm: &mut VM, value: Value) -> RunResult<String> {
    if let Value::Object(id) = value {
        if matches!(vm.heap.get(id), HeapData::Instance(_)) {
            if let Some(method) = vm.resolve_instance_method(id, "__str__") {
                let result = vm.call_value(method, &[value])?;
                return value_str(vm, result);
            }
            return value_repr(vm, value);
        }
    }
    let tag = value.tag(&vm.heap);
    match table_for(tag).and_then(|t| t.str_.or(t.repr)) {
        Some(f) => f(vm, value),
        None => value_repr(vm, value),
    }
}

pub(crate) fn value_repr(vm: &mut VM, value: Value) -> RunResult<String> {
    match value {
        Value::Undefined => Ok("<undefined>".to_owned()),
        Value::NotImplemented => Ok("NotImplemented".to_owned()),
        Value::None => Ok("None".to_owned()),
        Value::Bool(b) => Ok(if b { "True".to_owned() } else { "False".to_owned() }),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(format_float(f)),
        Value::Object(id) => {
            if matches!(vm.heap.get(id), HeapData::Instance(_)) {
                if let Some(method) = vm.resolve_instance_method(id, "__repr__") {
                    return vm.call_value(method, &[value]).and_then(|v| value_str(vm, v));
                }
                let name = type_name(&vm.heap, value);
                return Ok(format!("<{name} object>"));
            }
            let tag = value.tag(&vm.heap);
            match table_for(tag).and_then(|t| t.repr) {
                Some(f) => f(vm, value),
                None => {
                    let name = type_name(&vm.heap, value);
                    Ok(format!("<{name} object>"))
                }
            }
        }
    }
}

/// Shortest round-trippable float formatting, matching CPython's
/// `repr(float)` contract closely enough to satisfy the "repr parsed back"
/// testable property in `spec.md` §8. Uses `ryu` exactly as the teacher's
/// `Cargo.toml` does for this concern.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_owned() } else { "-inf".to_owned() };
    }
    let mut buf = ryu::Buffer::new();
    let rendered = buf.format_finite(f);
    // ryu always includes a decimal point or exponent; CPython additionally
    // drops a trailing ".0e" exponent form, which ryu never produces for
    // values in normal range, so no further massaging is needed here.
    rendered.to_owned()
}

// ---------------------------------------------------------------------
// Built-in static method tables
// ---------------------------------------------------------------------

fn as_f64(_heap: &Heap, v: Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(i as f64),
        Value::Float(f) => Some(f),
        Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn is_numeric(v: Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_))
}

fn int_of(v: Value) -> i64 {
    match v {
        Value::Int(i) => i,
        Value::Bool(b) => i64::from(b),
        _ => unreachable!("caller already checked is_numeric and non-float"),
    }
}

fn is_float_operand(v: Value) -> bool {
    matches!(v, Value::Float(_))
}

macro_rules! numeric_binop {
    ($name:ident, $intop:expr, $floatop:expr) => {
        fn $name(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
            let _ = vm;
            if !is_numeric(b) {
                return Ok(Value::NotImplemented);
            }
            if is_float_operand(a) || is_float_operand(b) {
                let fa = as_f64(&vm.heap, a).unwrap();
                let fb = as_f64(&vm.heap, b).unwrap();
                Ok(Value::Float($floatop(fa, fb)))
            } else {
                Ok(Value::Int($intop(int_of(a), int_of(b))))
            }
        }
    };
}

numeric_binop!(num_add, |a: i64, b: i64| a.wrapping_add(b), |a: f64, b: f64| a + b);
numeric_binop!(num_sub, |a: i64, b: i64| a.wrapping_sub(b), |a: f64, b: f64| a - b);
numeric_binop!(num_mul, |a: i64, b: i64| a.wrapping_mul(b), |a: f64, b: f64| a * b);

fn num_truediv(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    if !is_numeric(b) {
        return Ok(Value::NotImplemented);
    }
    let fb = as_f64(&vm.heap, b).unwrap();
    if fb == 0.0 {
        return Err(RunError::zero_division("division by zero"));
    }
    let fa = as_f64(&vm.heap, a).unwrap();
    Ok(Value::Float(fa / fb))
}

fn num_floordiv(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    if !is_numeric(b) {
        return Ok(Value::NotImplemented);
    }
    if is_float_operand(a) || is_float_operand(b) {
        let fb = as_f64(&vm.heap, b).unwrap();
        if fb == 0.0 {
            return Err(RunError::zero_division("float floor division by zero"));
        }
        let fa = as_f64(&vm.heap, a).unwrap();
        Ok(Value::Float((fa / fb).floor()))
    } else {
        let ib = int_of(b);
        if ib == 0 {
            return Err(RunError::zero_division("integer division or modulo by zero"));
        }
        Ok(Value::Int(floor_div(int_of(a), ib)))
    }
}

/// Floor division for integers: rounds toward negative infinity, unlike
/// `div_euclid` (which rounds so the remainder is non-negative and so
/// disagrees with floor division whenever `ib` is negative).
fn floor_div(ia: i64, ib: i64) -> i64 {
    let q = ia.div_euclid(ib);
    let r = ia.rem_euclid(ib);
    if r != 0 && ib < 0 {
        q - 1
    } else {
        q
    }
}

/// Floor-division remainder for integers: its sign always matches `ib`,
/// unlike `rem_euclid` (always non-negative).
fn floor_mod(ia: i64, ib: i64) -> i64 {
    let r = ia.rem_euclid(ib);
    if r != 0 && ib < 0 {
        r + ib
    } else {
        r
    }
}

fn num_mod(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    if !is_numeric(b) {
        return Ok(Value::NotImplemented);
    }
    if is_float_operand(a) || is_float_operand(b) {
        let fb = as_f64(&vm.heap, b).unwrap();
        if fb == 0.0 {
            return Err(RunError::zero_division("float modulo"));
        }
        let fa = as_f64(&vm.heap, a).unwrap();
        Ok(Value::Float(fa - (fa / fb).floor() * fb))
    } else {
        let ib = int_of(b);
        if ib == 0 {
            return Err(RunError::zero_division("integer division or modulo by zero"));
        }
        Ok(Value::Int(floor_mod(int_of(a), ib)))
    }
}

macro_rules! numeric_cmp {
    ($name:ident, $op:tt) => {
        fn $name(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
            if !is_numeric(b) {
                return Ok(Value::NotImplemented);
            }
            let fa = as_f64(&vm.heap, a).unwrap();
            let fb = as_f64(&vm.heap, b).unwrap();
            Ok(Value::Bool(fa $op fb))
        }
    };
}

numeric_cmp!(num_eq, ==);
numeric_cmp!(num_gt, >);
numeric_cmp!(num_ge, >=);
numeric_cmp!(num_lt, <);
numeric_cmp!(num_le, <=);

fn num_neg(_vm: &mut VM, a: Value) -> RunResult<Value> {
    Ok(match a {
        Value::Int(i) => Value::Int(-i),
        Value::Float(f) => Value::Float(-f),
        Value::Bool(b) => Value::Int(-i64::from(b)),
        _ => unreachable!(),
    })
}

fn num_pos(_vm: &mut VM, a: Value) -> RunResult<Value> {
    Ok(a)
}

fn num_hash(_heap: &Heap, v: Value) -> RunResult<u64> {
    Ok(match v {
        Value::Int(i) => i as u64,
        Value::Bool(b) => u64::from(b),
        Value::Float(f) => {
            if f == f.trunc() && f.is_finite() {
                (f as i64) as u64
            } else {
                f.to_bits()
            }
        }
        _ => unreachable!(),
    })
}

fn num_to_bool(_heap: &Heap, v: Value) -> bool {
    match v {
        Value::Int(i) => i != 0,
        Value::Float(f) => f != 0.0,
        Value::Bool(b) => b,
        _ => true,
    }
}

fn num_to_int(_heap: &Heap, v: Value) -> RunResult<i64> {
    Ok(match v {
        Value::Int(i) => i,
        Value::Bool(b) => i64::from(b),
        Value::Float(f) => {
            if f.is_nan() {
                return Err(RunError::value_error("cannot convert float NaN to integer"));
            }
            f as i64
        }
        _ => unreachable!(),
    })
}

fn num_to_float(_heap: &Heap, v: Value) -> RunResult<f64> {
    Ok(match v {
        Value::Int(i) => i as f64,
        Value::Bool(b) => if b { 1.0 } else { 0.0 },
        Value::Float(f) => f,
        _ => unreachable!(),
    })
}

fn num_str(_vm: &mut VM, v: Value) -> RunResult<String> {
    Ok(match v {
        Value::Int(i) => i.to_string(),
        Value::Bool(b) => if b { "True".to_owned() } else { "False".to_owned() },
        Value::Float(f) => format_float(f),
        _ => unreachable!(),
    })
}

pub(crate) static INT_METHODS: MethodTable = MethodTable {
    eq: Some(num_eq),
    gt: Some(num_gt),
    ge: Some(num_ge),
    lt: Some(num_lt),
    le: Some(num_le),
    add: Some(num_add),
    radd: Some(num_add),
    sub: Some(num_sub),
    rsub: Some(|vm, a, b| num_sub(vm, b, a)),
    mul: Some(num_mul),
    rmul: Some(num_mul),
    truediv: Some(num_truediv),
    rtruediv: Some(|vm, a, b| num_truediv(vm, b, a)),
    floordiv: Some(num_floordiv),
    modulo: Some(num_mod),
    neg: Some(num_neg),
    pos: Some(num_pos),
    hash: Some(num_hash),
    to_bool: Some(num_to_bool),
    to_int: Some(num_to_int),
    to_float: Some(num_to_float),
    str_: Some(num_str),
    repr: Some(num_str),
    ..MethodTable::NONE
};

pub(crate) static FLOAT_METHODS: MethodTable = INT_METHODS;

pub(crate) static NONE_METHODS: MethodTable = MethodTable {
    eq: Some(|_vm, a, b| Ok(Value::Bool(matches!((a, b), (Value::None, Value::None))))),
    to_bool: Some(|_heap, _v| false),
    str_: Some(|_vm, _v| Ok("None".to_owned())),
    repr: Some(|_vm, _v| Ok("None".to_owned())),
    ..MethodTable::NONE
};

// --- String -----------------------------------------------------------

fn str_contents<'h>(heap: &'h Heap, v: Value) -> &'h Str {
    match v {
        Value::Object(id) => match heap.get(id) {
            HeapData::String(s) => s,
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

fn str_eq(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    if !matches!(b, Value::Object(id) if matches!(vm.heap.get(id), HeapData::String(_))) {
        return Ok(Value::NotImplemented);
    }
    Ok(Value::Bool(str_contents(&vm.heap, a).as_str() == str_contents(&vm.heap, b).as_str()))
}

fn str_cmp(vm: &mut VM, a: Value, b: Value, ord: std::cmp::Ordering, strict: bool) -> RunResult<Value> {
    if !matches!(b, Value::Object(id) if matches!(vm.heap.get(id), HeapData::String(_))) {
        return Ok(Value::NotImplemented);
    }
    let sa = str_contents(&vm.heap, a).as_str();
    let sb = str_contents(&vm.heap, b).as_str();
    let cmp = sa.cmp(sb);
    Ok(Value::Bool(if strict { cmp == ord } else { cmp == ord || cmp == std::cmp::Ordering::Equal }))
}

fn str_gt(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    str_cmp(vm, a, b, std::cmp::Ordering::Greater, true)
}
fn str_ge(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    str_cmp(vm, a, b, std::cmp::Ordering::Greater, false)
}
fn str_lt(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    str_cmp(vm, a, b, std::cmp::Ordering::Less, true)
}
fn str_le(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    str_cmp(vm, a, b, std::cmp::Ordering::Less, false)
}

fn str_add(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    if !matches!(b, Value::Object(id) if matches!(vm.heap.get(id), HeapData::String(_))) {
        return Ok(Value::NotImplemented);
    }
    let mut out = String::with_capacity(str_contents(&vm.heap, a).len() + str_contents(&vm.heap, b).len());
    out.push_str(str_contents(&vm.heap, a).as_str());
    out.push_str(str_contents(&vm.heap, b).as_str());
    Ok(Value::Object(vm.heap.allocate_string(out)))
}

fn str_mul(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    let Value::Int(n) = b else { return Ok(Value::NotImplemented) };
    if n < 0 {
        return Ok(Value::Object(vm.heap.allocate_string(String::new())));
    }
    let repeated = str_contents(&vm.heap, a).as_str().repeat(n as usize);
    Ok(Value::Object(vm.heap.allocate_string(repeated)))
}

fn str_contains(vm: &mut VM, haystack: Value, needle: Value) -> RunResult<bool> {
    let Value::Object(id) = needle else {
        return Err(RunError::type_error("'in <string>' requires string as left operand"));
    };
    let HeapData::String(needle_str) = vm.heap.get(id) else {
        return Err(RunError::type_error("'in <string>' requires string as left operand"));
    };
    let needle_owned = needle_str.as_str().to_owned();
    Ok(str_contents(&vm.heap, haystack).as_str().contains(&needle_owned))
}

fn str_hash(heap: &Heap, v: Value) -> RunResult<u64> {
    Ok(str_contents(heap, v).hash())
}

fn str_len(heap: &Heap, v: Value) -> RunResult<i64> {
    Ok(str_contents(heap, v).len() as i64)
}

fn str_to_bool(heap: &Heap, v: Value) -> bool {
    str_contents(heap, v).len() != 0
}

fn str_to_int(heap: &Heap, v: Value) -> RunResult<i64> {
    str_contents(heap, v)
        .as_str()
        .trim()
        .parse::<i64>()
        .map_err(|_| RunError::value_error(format!("invalid literal for int() with base 10: {:?}", str_contents(heap, v).as_str())))
}

fn str_to_float(heap: &Heap, v: Value) -> RunResult<f64> {
    str_contents(heap, v)
        .as_str()
        .trim()
        .parse::<f64>()
        .map_err(|_| RunError::value_error(format!("could not convert string to float: {:?}", str_contents(heap, v).as_str())))
}

fn str_str(vm: &mut VM, v: Value) -> RunResult<String> {
    Ok(str_contents(&vm.heap, v).as_str().to_owned())
}

fn str_repr(vm: &mut VM, v: Value) -> RunResult<String> {
    Ok(format!("'{}'", str_contents(&vm.heap, v).as_str().replace('\\', "\\\\").replace('\'', "\\'")))
}

fn str_getitem(vm: &mut VM, obj: Value, key: Value) -> RunResult<Value> {
    let s = str_contents(&vm.heap, obj).as_str().to_owned();
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    match key {
        Value::Int(mut i) => {
            if i < 0 {
                i += len;
            }
            if i < 0 || i >= len {
                return Err(RunError::index_error("string index out of range"));
            }
            Ok(Value::Object(vm.heap.allocate_string(chars[i as usize].to_string())))
        }
        Value::Object(id) => {
            if let HeapData::Slice(slice) = vm.heap.get(id) {
                let slice = *slice;
                let (start, stop, step) = resolve_slice(slice, len, &vm.heap)?;
                let result = slice_chars(&chars, start, stop, step);
                Ok(Value::Object(vm.heap.allocate_string(result.into_iter().collect::<String>())))
            } else {
                Err(RunError::type_error("string indices must be integers"))
            }
        }
        _ => Err(RunError::type_error("string indices must be integers")),
    }
}

fn str_iter(vm: &mut VM, v: Value) -> RunResult<Value> {
    use crate::object::IteratorObj;
    let id = vm.heap.allocate(HeapData::Iterator(IteratorObj::Sequence { source: v, index: 0 }));
    Ok(Value::Object(id))
}

pub(crate) static STRING_METHODS: MethodTable = MethodTable {
    eq: Some(str_eq),
    gt: Some(str_gt),
    ge: Some(str_ge),
    lt: Some(str_lt),
    le: Some(str_le),
    add: Some(str_add),
    radd: Some(str_add),
    mul: Some(str_mul),
    rmul: Some(str_mul),
    contains: Some(str_contains),
    getitem: Some(str_getitem),
    hash: Some(str_hash),
    len: Some(str_len),
    to_bool: Some(str_to_bool),
    to_int: Some(str_to_int),
    to_float: Some(str_to_float),
    str_: Some(str_str),
    repr: Some(str_repr),
    iter: Some(str_iter),
    ..MethodTable::NONE
};

/// Resolves a `Slice` against a sequence of known `len`, applying Python's
/// clamping rules. Shared by strings, lists, and tuples.
pub(crate) fn resolve_slice(slice: crate::object::SliceObj, len: i64, heap: &Heap) -> RunResult<(i64, i64, i64)> {
    let step = match slice.step {
        Value::None => 1,
        Value::Int(s) => {
            if s == 0 {
                return Err(RunError::value_error("slice step cannot be zero"));
            }
            s
        }
        _ => return Err(RunError::type_error("slice indices must be integers or None")),
    };
    let _ = heap;
    let clamp = |raw: Option<i64>, default_forward: i64, default_backward: i64| -> i64 {
        let default = if step > 0 { default_forward } else { default_backward };
        let Some(mut v) = raw else { return default };
        if v < 0 {
            v += len;
        }
        if step > 0 {
            v.clamp(0, len)
        } else {
            v.clamp(-1, len - 1)
        }
    };
    let start_raw = match slice.start {
        Value::None => None,
        Value::Int(s) => Some(s),
        _ => return Err(RunError::type_error("slice indices must be integers or None")),
    };
    let stop_raw = match slice.stop {
        Value::None => None,
        Value::Int(s) => Some(s),
        _ => return Err(RunError::type_error("slice indices must be integers or None")),
    };
    let start = clamp(start_raw, 0, len - 1);
    let stop = clamp(stop_raw, len, -1);
    Ok((start, stop, step))
}

fn slice_chars(chars: &[char], start: i64, stop: i64, step: i64) -> Vec<char> {
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            if i >= 0 && (i as usize) < chars.len() {
                out.push(chars[i as usize]);
            }
            i += step;
        }
    } else {
        while i > stop {
            if i >= 0 && (i as usize) < chars.len() {
                out.push(chars[i as usize]);
            }
            i += step;
        }
    }
    out
}

pub(crate) fn slice_values(items: &[Value], start: i64, stop: i64, step: i64) -> Vec<Value> {
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            if i >= 0 && (i as usize) < items.len() {
                out.push(items[i as usize]);
            }
            i += step;
        }
    } else {
        while i > stop {
            if i >= 0 && (i as usize) < items.len() {
                out.push(items[i as usize]);
            }
            i += step;
        }
    }
    out
}

// --- List / Tuple -------------------------------------------------------

fn seq_items<'h>(heap: &'h Heap, v: Value) -> &'h [Value] {
    match v {
        Value::Object(id) => match heap.get(id) {
            HeapData::List(items) => items.as_slice(),
            HeapData::Tuple(items) => items.as_ref(),
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

fn seq_getitem(vm: &mut VM, obj: Value, key: Value) -> RunResult<Value> {
    let len = seq_items(&vm.heap, obj).len() as i64;
    match key {
        Value::Int(mut i) => {
            if i < 0 {
                i += len;
            }
            if i < 0 || i >= len {
                return Err(RunError::index_error("list index out of range"));
            }
            Ok(seq_items(&vm.heap, obj)[i as usize])
        }
        Value::Object(id) => {
            let Some(slice) = (if let HeapData::Slice(slice) = vm.heap.get(id) { Some(*slice) } else { None }) else {
                return Err(RunError::type_error("indices must be integers"));
            };
            let (start, stop, step) = resolve_slice(slice, len, &vm.heap)?;
            let values = slice_values(seq_items(&vm.heap, obj), start, stop, step);
            let Value::Object(obj_id) = obj else { unreachable!() };
            let is_tuple = matches!(vm.heap.get(obj_id), HeapData::Tuple(_));
            if is_tuple {
                Ok(Value::Object(vm.heap.allocate(HeapData::Tuple(values.into_boxed_slice()))))
            } else {
                Ok(Value::Object(vm.heap.allocate(HeapData::List(values))))
            }
        }
        _ => Err(RunError::type_error("indices must be integers")),
    }
}

fn seq_setitem(vm: &mut VM, obj: Value, key: Value, value: Value) -> RunResult<()> {
    let Value::Object(id) = obj else { unreachable!() };
    let Value::Int(mut i) = key else {
        return Err(RunError::type_error("list indices must be integers"));
    };
    let HeapData::List(items) = vm.heap.get_mut(id) else {
        return Err(RunError::type_error_no_item_assignment("tuple"));
    };
    let len = items.len() as i64;
    if i < 0 {
        i += len;
    }
    if i < 0 || i >= len {
        return Err(RunError::index_error("list assignment index out of range"));
    }
    items[i as usize] = value;
    Ok(())
}

fn seq_delitem(vm: &mut VM, obj: Value, key: Value) -> RunResult<()> {
    let Value::Object(id) = obj else { unreachable!() };
    let Value::Int(mut i) = key else {
        return Err(RunError::type_error("list indices must be integers"));
    };
    let HeapData::List(items) = vm.heap.get_mut(id) else {
        return Err(RunError::type_error_no_item_assignment("tuple"));
    };
    let len = items.len() as i64;
    if i < 0 {
        i += len;
    }
    if i < 0 || i >= len {
        return Err(RunError::index_error("list assignment index out of range"));
    }
    items.remove(i as usize);
    Ok(())
}

fn seq_len(heap: &Heap, v: Value) -> RunResult<i64> {
    Ok(seq_items(heap, v).len() as i64)
}

fn seq_to_bool(heap: &Heap, v: Value) -> bool {
    !seq_items(heap, v).is_empty()
}

fn seq_contains(vm: &mut VM, haystack: Value, needle: Value) -> RunResult<bool> {
    let items = seq_items(&vm.heap, haystack).to_vec();
    for item in items {
        if crate::methods::binary_dispatch(vm, BinOp::Eq, item, needle)?.truthy_immediate() == Some(true) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn list_repr(vm: &mut VM, v: Value) -> RunResult<String> {
    let items = seq_items(&vm.heap, v).to_vec();
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(value_repr(vm, item)?);
    }
    Ok(format!("[{}]", parts.join(", ")))
}

fn tuple_repr(vm: &mut VM, v: Value) -> RunResult<String> {
    let items = seq_items(&vm.heap, v).to_vec();
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(value_repr(vm, item)?);
    }
    if items_len(&vm.heap, v) == 1 {
        Ok(format!("({},)", parts.first().cloned().unwrap_or_default()))
    } else {
        Ok(format!("({})", parts.join(", ")))
    }
}

fn items_len(heap: &Heap, v: Value) -> usize {
    seq_items(heap, v).len()
}

fn seq_iter(vm: &mut VM, v: Value) -> RunResult<Value> {
    use crate::object::IteratorObj;
    let id = vm.heap.allocate(HeapData::Iterator(IteratorObj::Sequence { source: v, index: 0 }));
    Ok(Value::Object(id))
}

fn list_eq(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    let Value::Object(idb) = b else { return Ok(Value::NotImplemented) };
    if !matches!(vm.heap.get(idb), HeapData::List(_)) {
        return Ok(Value::NotImplemented);
    }
    let ia = seq_items(&vm.heap, a).to_vec();
    let ib = seq_items(&vm.heap, b).to_vec();
    if ia.len() != ib.len() {
        return Ok(Value::Bool(false));
    }
    for (x, y) in ia.into_iter().zip(ib) {
        if binary_dispatch(vm, BinOp::Eq, x, y)?.truthy_immediate() != Some(true) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn tuple_eq(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    let Value::Object(idb) = b else { return Ok(Value::NotImplemented) };
    if !matches!(vm.heap.get(idb), HeapData::Tuple(_)) {
        return Ok(Value::NotImplemented);
    }
    let ia = seq_items(&vm.heap, a).to_vec();
    let ib = seq_items(&vm.heap, b).to_vec();
    if ia.len() != ib.len() {
        return Ok(Value::Bool(false));
    }
    for (x, y) in ia.into_iter().zip(ib) {
        if binary_dispatch(vm, BinOp::Eq, x, y)?.truthy_immediate() != Some(true) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn list_add(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    let Value::Object(idb) = b else { return Ok(Value::NotImplemented) };
    if !matches!(vm.heap.get(idb), HeapData::List(_)) {
        return Ok(Value::NotImplemented);
    }
    let mut combined = seq_items(&vm.heap, a).to_vec();
    combined.extend_from_slice(seq_items(&vm.heap, b));
    Ok(Value::Object(vm.heap.allocate(HeapData::List(combined))))
}

fn tuple_add(vm: &mut VM, a: Value, b: Value) -> RunResult<Value> {
    let Value::Object(idb) = b else { return Ok(Value::NotImplemented) };
    if !matches!(vm.heap.get(idb), HeapData::Tuple(_)) {
        return Ok(Value::NotImplemented);
    }
    let mut combined = seq_items(&vm.heap, a).to_vec();
    combined.extend_from_slice(seq_items(&vm.heap, b));
    Ok(Value::Object(vm.heap.allocate(HeapData::Tuple(combined.into_boxed_slice()))))
}

pub(crate) static LIST_METHODS: MethodTable = MethodTable {
    eq: Some(list_eq),
    add: Some(list_add),
    contains: Some(seq_contains),
    getitem: Some(seq_getitem),
    setitem: Some(seq_setitem),
    delitem: Some(seq_delitem),
    len: Some(seq_len),
    to_bool: Some(seq_to_bool),
    repr: Some(list_repr),
    str_: Some(list_repr),
    iter: Some(seq_iter),
    ..MethodTable::NONE
};

pub(crate) static TUPLE_METHODS: MethodTable = MethodTable {
    eq: Some(tuple_eq),
    add: Some(tuple_add),
    contains: Some(seq_contains),
    getitem: Some(seq_getitem),
    len: Some(seq_len),
    to_bool: Some(seq_to_bool),
    repr: Some(tuple_repr),
    str_: Some(tuple_repr),
    iter: Some(seq_iter),
    ..MethodTable::NONE
};

// --- Dict ---------------------------------------------------------------

fn dict_of<'h>(heap: &'h Heap, v: Value) -> &'h crate::types::dict::Dict {
    match v {
        Value::Object(id) => match heap.get(id) {
            HeapData::Dict(d) => d,
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

fn dict_getitem(vm: &mut VM, obj: Value, key: Value) -> RunResult<Value> {
    let result = dict_of(&vm.heap, obj).table().get(&vm.heap, key)?;
    if matches!(result, Value::Undefined) {
        let key_repr = value_repr(vm, key)?;
        return Err(RunError::key_error(key_repr));
    }
    Ok(result)
}

// `Table::set`/`delete` need a `&Heap` to hash `key`, but that heap also owns
// the `Dict` slot we're mutating. Rather than alias the heap through a raw
// pointer, lift the dict's table out of its slot for the duration of the
// call (`Dict` is cheap and `Default`), then put it back.
fn dict_setitem(vm: &mut VM, obj: Value, key: Value, value: Value) -> RunResult<()> {
    let Value::Object(id) = obj else { unreachable!() };
    let HeapData::Dict(dict) = vm.heap.get_mut(id) else { unreachable!() };
    let mut taken = std::mem::take(dict);
    let result = taken.table_mut().set(&vm.heap, key, value);
    let HeapData::Dict(dict) = vm.heap.get_mut(id) else { unreachable!() };
    *dict = taken;
    result?;
    Ok(())
}

fn dict_delitem(vm: &mut VM, obj: Value, key: Value) -> RunResult<()> {
    let Value::Object(id) = obj else { unreachable!() };
    let key_repr = value_repr(vm, key)?;
    let HeapData::Dict(dict) = vm.heap.get_mut(id) else { unreachable!() };
    let mut taken = std::mem::take(dict);
    let result = taken.table_mut().delete(&vm.heap, key);
    let HeapData::Dict(dict) = vm.heap.get_mut(id) else { unreachable!() };
    *dict = taken;
    let removed = result?;
    if matches!(removed, Value::Undefined) {
        return Err(RunError::key_error(key_repr));
    }
    Ok(())
}

fn dict_contains(vm: &mut VM, obj: Value, key: Value) -> RunResult<bool> {
    dict_of(&vm.heap, obj).table().contains(&vm.heap, key)
}

fn dict_len(heap: &Heap, v: Value) -> RunResult<i64> {
    Ok(dict_of(heap, v).table().len() as i64)
}

fn dict_to_bool(heap: &Heap, v: Value) -> bool {
    !dict_of(heap, v).table().is_empty()
}

fn dict_repr(vm: &mut VM, v: Value) -> RunResult<String> {
    let pairs = dict_of(&vm.heap, v).table().iter().collect::<Vec<_>>();
    let mut parts = Vec::with_capacity(pairs.len());
    for (k, val) in pairs {
        parts.push(format!("{}: {}", value_repr(vm, k)?, value_repr(vm, val)?));
    }
    Ok(format!("{{{}}}", parts.join(", ")))
}

fn dict_iter(vm: &mut VM, v: Value) -> RunResult<Value> {
    use crate::object::IteratorObj;
    let id = vm.heap.allocate(HeapData::Iterator(IteratorObj::DictKeys { source: v, index: 0 }));
    Ok(Value::Object(id))
}

pub(crate) static DICT_METHODS: MethodTable = MethodTable {
    getitem: Some(dict_getitem),
    setitem: Some(dict_setitem),
    delitem: Some(dict_delitem),
    contains: Some(dict_contains),
    len: Some(dict_len),
    to_bool: Some(dict_to_bool),
    repr: Some(dict_repr),
    str_: Some(dict_repr),
    iter: Some(dict_iter),
    ..MethodTable::NONE
};

// --- Range ----------------------------------------------------------------

fn range_of(heap: &Heap, v: Value) -> RangeObj {
    match v {
        Value::Object(id) => match heap.get(id) {
            HeapData::Range(r) => *r,
            _ => unreachable!(),
        },
        _ => unreachable!(),
    }
}

fn range_len(heap: &Heap, v: Value) -> RunResult<i64> {
    Ok(range_of(heap, v).len())
}

fn range_to_bool(heap: &Heap, v: Value) -> bool {
    range_of(heap, v).len() != 0
}

fn range_repr(vm: &mut VM, v: Value) -> RunResult<String> {
    let r = range_of(&vm.heap, v);
    Ok(format!("range({}, {}, {})", r.start, r.stop, r.step))
}

fn range_contains(vm: &mut VM, haystack: Value, needle: Value) -> RunResult<bool> {
    let Value::Int(n) = needle else { return Ok(false) };
    let r = range_of(&vm.heap, haystack);
    if r.step > 0 {
        Ok(n >= r.start && n < r.stop && (n - r.start) % r.step == 0)
    } else if r.step < 0 {
        Ok(n <= r.start && n > r.stop && (r.start - n) % (-r.step) == 0)
    } else {
        Ok(false)
    }
}

fn range_iter(vm: &mut VM, v: Value) -> RunResult<Value> {
    use crate::object::IteratorObj;
    let r = range_of(&vm.heap, v);
    let id = vm.heap.allocate(HeapData::Iterator(IteratorObj::Range {
        current: r.start,
        stop: r.stop,
        step: r.step,
    }));
    Ok(Value::Object(id))
}

pub(crate) static RANGE_METHODS: MethodTable = MethodTable {
    len: Some(range_len),
    to_bool: Some(range_to_bool),
    repr: Some(range_repr),
    str_: Some(range_repr),
    contains: Some(range_contains),
    iter: Some(range_iter),
    ..MethodTable::NONE
};

// --- Iterator ---------------------------------------------------------

/// A snapshot of the iterator's state, taken before any re-entrant call
/// into the VM so the borrow of `vm.heap` backing the live `IteratorObj`
/// never overlaps a call that itself needs `&mut VM`.
enum IterPlan {
    Range { current: i64, stop: i64, step: i64 },
    Sequence { source: Value, index: i64 },
    DictKeys { source: Value, index: usize },
}

fn iterator_next(vm: &mut VM, v: Value) -> RunResult<Value> {
    use crate::object::IteratorObj;
    let Value::Object(id) = v else { unreachable!() };
    let plan = match vm.heap.get(id) {
        HeapData::Iterator(IteratorObj::Range { current, stop, step }) => IterPlan::Range {
            current: *current,
            stop: *stop,
            step: *step,
        },
        HeapData::Iterator(IteratorObj::Sequence { source, index }) => IterPlan::Sequence {
            source: *source,
            index: *index,
        },
        HeapData::Iterator(IteratorObj::DictKeys { source, index }) => IterPlan::DictKeys {
            source: *source,
            index: *index,
        },
        _ => unreachable!(),
    };
    match plan {
        IterPlan::Range { current, stop, step } => {
            let exhausted = if step > 0 { current >= stop } else { current <= stop };
            if exhausted {
                return Err(RunError::stop_iteration());
            }
            let HeapData::Iterator(IteratorObj::Range { current: stored, .. }) = vm.heap.get_mut(id) else {
                unreachable!()
            };
            *stored += step;
            Ok(Value::Int(current))
        }
        IterPlan::Sequence { source, index } => {
            let len = value_len(vm, source)?;
            if index >= len {
                return Err(RunError::stop_iteration());
            }
            let result = crate::bytecode::vm::attr::getitem(vm, source, Value::Int(index))?;
            let HeapData::Iterator(IteratorObj::Sequence { index: stored, .. }) = vm.heap.get_mut(id) else {
                unreachable!()
            };
            *stored += 1;
            Ok(result)
        }
        IterPlan::DictKeys { source, index } => {
            let keys = dict_of(&vm.heap, source).table().keys_in_order();
            if index >= keys.len() {
                return Err(RunError::stop_iteration());
            }
            let result = keys[index];
            let HeapData::Iterator(IteratorObj::DictKeys { index: stored, .. }) = vm.heap.get_mut(id) else {
                unreachable!()
            };
            *stored += 1;
            Ok(result)
        }
    }
}

pub(crate) static ITERATOR_METHODS: MethodTable = MethodTable {
    next: Some(iterator_next),
    ..MethodTable::NONE
};
