use ouros::{interpret, interpret_capturing, InterpretResult};

fn expect_ok_output(source: &str) -> Vec<String> {
    let (result, lines) = interpret_capturing(source, "test.ou");
    match result {
        InterpretResult::Ok => lines,
        InterpretResult::CompileError(msg) => panic!("unexpected compile error: {msg}"),
        InterpretResult::RuntimeError(msg) => panic!("unexpected runtime error: {msg}"),
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
fn integer_arithmetic_wraps_and_prints() {
    let lines = expect_ok_output("print(2 + 3 * 4)");
    assert_eq!(lines, vec!["14".to_owned()]);
}

#[test]
fn true_division_always_yields_float() {
    let lines = expect_ok_output("print(7 / 2)");
    assert_eq!(lines, vec!["3.5".to_owned()]);
}

#[test]
fn floor_division_rounds_toward_negative_infinity() {
    let lines = expect_ok_output("print(-7 // 2)");
    assert_eq!(lines, vec!["-4".to_owned()]);
}

#[test]
fn modulo_follows_divisor_sign_python_style() {
    let lines = expect_ok_output("print(-7 % 2)");
    assert_eq!(lines, vec!["1".to_owned()]);
}

#[test]
fn floor_division_with_a_negative_divisor_rounds_toward_negative_infinity() {
    let lines = expect_ok_output("print(7 // -2)");
    assert_eq!(lines, vec!["-4".to_owned()]);
}

#[test]
fn modulo_with_a_negative_divisor_takes_the_divisors_sign() {
    let lines = expect_ok_output("print(7 % -2)");
    assert_eq!(lines, vec!["-1".to_owned()]);
}

#[test]
fn float_modulo_with_a_negative_divisor_takes_the_divisors_sign() {
    let lines = expect_ok_output("print(7.0 % -2.0)");
    assert_eq!(lines, vec!["-1.0".to_owned()]);
}

#[test]
fn integer_division_by_zero_raises_zero_division_error() {
    let msg = expect_runtime_error("print(1 // 0)");
    assert!(
        msg.contains("ZeroDivisionError") && msg.contains("integer division or modulo by zero"),
        "got: {msg}"
    );
}

#[test]
fn true_division_by_zero_raises_zero_division_error() {
    let msg = expect_runtime_error("print(1 / 0)");
    assert!(msg.contains("ZeroDivisionError"), "got: {msg}");
}

#[test]
fn mixed_int_float_arithmetic_promotes_to_float() {
    let lines = expect_ok_output("print(1 + 2.5)");
    assert_eq!(lines, vec!["3.5".to_owned()]);
}

#[test]
fn bool_participates_in_arithmetic_as_zero_or_one() {
    let lines = expect_ok_output("print(True + True)");
    assert_eq!(lines, vec!["2".to_owned()]);
}

#[test]
fn comparison_chains_short_circuit_with_and() {
    let lines = expect_ok_output("print(1 < 2 and 2 < 3)");
    assert_eq!(lines, vec!["True".to_owned()]);
}

#[test]
fn unsupported_operand_types_raise_type_error() {
    let msg = expect_runtime_error("print(1 + 'x')");
    assert!(
        msg.contains("TypeError") && msg.contains("unsupported operand type(s) for +"),
        "got: {msg}"
    );
}

#[test]
fn unary_minus_on_string_raises_type_error() {
    let msg = expect_runtime_error("print(-'x')");
    assert!(msg.contains("TypeError"), "got: {msg}");
}
