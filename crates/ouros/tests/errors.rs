use ouros::{interpret, interpret_capturing, InterpretResult};

fn expect_ok_output(source: &str) -> Vec<String> {
    let (result, lines) = interpret_capturing(source, "test.ou");
    match result {
        InterpretResult::Ok => lines,
        InterpretResult::CompileError(msg) => panic!("unexpected compile error: {msg}"),
        InterpretResult::RuntimeError(msg) => panic!("unexpected runtime error: {msg}"),
    }
}

fn expect_compile_error(source: &str) -> String {
    match interpret(source, "test.ou") {
        InterpretResult::CompileError(msg) => msg,
        InterpretResult::Ok => panic!("expected a compile error, program ran to completion"),
        InterpretResult::RuntimeError(msg) => panic!("expected a compile error, got runtime error: {msg}"),
    }
}

fn expect_runtime_error(source: &str) -> String {
    match interpret(source, "test.ou") {
        InterpretResult::RuntimeError(msg) => msg,
        InterpretResult::Ok => panic!("expected a runtime error, program ran to completion"),
        InterpretResult::CompileError(msg) => panic!("expected a runtime error, got compile error: {msg}"),
    }
}

#[test]
fn unterminated_string_literal_is_a_compile_error() {
    let msg = expect_compile_error("print('unterminated)");
    assert!(!msg.is_empty(), "expected a non-empty compile error message");
}

#[test]
fn mismatched_indentation_is_a_compile_error() {
    let source = "\
if True:
    print(1)
   print(2)
";
    let msg = expect_compile_error(source);
    assert!(!msg.is_empty(), "expected a non-empty compile error message");
}

#[test]
fn single_line_if_suite_is_rejected() {
    // CORE requires an indented block suite; `if x: y` on one line is not
    // supported (no single-line compound statements).
    let msg = expect_compile_error("if True: print(1)");
    assert!(!msg.is_empty(), "expected a non-empty compile error message");
}

#[test]
fn break_outside_a_loop_is_a_compile_error() {
    let msg = expect_compile_error("break");
    assert!(msg.contains("'break' outside loop"), "got: {msg}");
}

#[test]
fn continue_outside_a_loop_is_a_compile_error() {
    let msg = expect_compile_error("continue");
    assert!(msg.contains("'continue' outside loop"), "got: {msg}");
}

#[test]
fn nonlocal_outside_a_function_is_a_compile_error() {
    let msg = expect_compile_error("nonlocal x");
    assert!(msg.contains("'nonlocal' outside function"), "got: {msg}");
}

#[test]
fn del_on_an_attribute_is_unsupported_syntax() {
    // CORE's `del` only supports item deletion (`del d[key]`), never
    // attribute deletion.
    let source = "\
class C:
    def __init__(self):
        self.x = 1

c = C()
del c.x
";
    let msg = expect_compile_error(source);
    assert!(!msg.is_empty(), "got: {msg}");
}

#[test]
fn calling_a_function_with_too_many_positional_arguments_raises_type_error() {
    let source = "\
def one_arg(x):
    return x

one_arg(1, 2)
";
    let msg = expect_runtime_error(source);
    assert!(msg.contains("TypeError"), "got: {msg}");
}

#[test]
fn calling_a_function_missing_a_required_argument_raises_type_error() {
    let source = "\
def needs_two(x, y):
    return x + y

needs_two(1)
";
    let msg = expect_runtime_error(source);
    assert!(msg.contains("TypeError"), "got: {msg}");
}

#[test]
fn calling_a_non_callable_value_raises_type_error() {
    let msg = expect_runtime_error("x = 5\nx()");
    assert!(msg.contains("TypeError") && msg.contains("not callable"), "got: {msg}");
}

#[test]
fn indexing_an_int_raises_type_error_not_subscriptable() {
    let msg = expect_runtime_error("x = 5\nprint(x[0])");
    assert!(msg.contains("TypeError") && msg.contains("not subscriptable"), "got: {msg}");
}

#[test]
fn iterating_a_non_iterable_raises_type_error() {
    let msg = expect_runtime_error("for x in 5:\n    print(x)");
    assert!(msg.contains("TypeError") && msg.contains("not iterable"), "got: {msg}");
}

#[test]
fn assertion_error_can_be_raised_manually() {
    // CORE's compiler front end has no dedicated `assert` statement (not
    // named among spec.md's CORE operations), but `AssertionError` is still
    // a registered exception class a program can `raise` directly.
    let msg = expect_runtime_error("raise AssertionError('nope')");
    assert!(msg.contains("AssertionError") && msg.contains("nope"), "got: {msg}");
}

#[test]
fn not_implemented_error_can_be_raised_and_caught() {
    let lines = expect_ok_output("try:\n    raise NotImplementedError('todo')\nexcept NotImplementedError as e:\n    print(str(e))");
    assert_eq!(lines, vec!["todo".to_owned()]);
}
