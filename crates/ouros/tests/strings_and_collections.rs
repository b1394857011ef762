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
fn negative_string_index_reads_from_the_end() {
    let lines = expect_ok_output("s = 'hello'\nprint(s[-1])");
    assert_eq!(lines, vec!["o".to_owned()]);
}

#[test]
fn string_index_out_of_range_raises_index_error() {
    let msg = expect_runtime_error("s = 'hi'\nprint(s[5])");
    assert!(msg.contains("IndexError") && msg.contains("string index out of range"), "got: {msg}");
}

#[test]
fn string_slicing_supports_omitted_bounds_and_step() {
    let lines = expect_ok_output("s = 'abcdef'\nprint(s[1:4])\nprint(s[::2])\nprint(s[::-1])");
    assert_eq!(lines, vec!["bcd".to_owned(), "ace".to_owned(), "fedcba".to_owned()]);
}

#[test]
fn string_concatenation_and_repetition() {
    let lines = expect_ok_output("print('ab' + 'cd')\nprint('ab' * 3)");
    assert_eq!(lines, vec!["abcd".to_owned(), "ababab".to_owned()]);
}

#[test]
fn list_index_assignment_out_of_range_raises_index_error() {
    let msg = expect_runtime_error("a = [1, 2, 3]\na[10] = 9");
    assert!(msg.contains("IndexError") && msg.contains("list assignment index out of range"), "got: {msg}");
}

#[test]
fn list_index_and_append_and_len() {
    let lines = expect_ok_output("a = [1, 2, 3]\na[0] = 10\nprint(a)\nprint(len(a))");
    assert_eq!(lines, vec!["[10, 2, 3]".to_owned(), "3".to_owned()]);
}

#[test]
fn dict_item_assignment_and_lookup() {
    let lines = expect_ok_output("d = {'a': 1}\nd['b'] = 2\nprint(d['b'])");
    assert_eq!(lines, vec!["2".to_owned()]);
}

#[test]
fn dict_missing_key_raises_key_error() {
    let msg = expect_runtime_error("d = {}\nprint(d['missing'])");
    assert!(msg.contains("KeyError"), "got: {msg}");
}

#[test]
fn del_statement_removes_a_dict_entry() {
    let lines = expect_ok_output(
        "d = {'a': 1, 'b': 2}\ndel d['a']\nprint('a' in d)\nprint(d['b'])",
    );
    assert_eq!(lines, vec!["False".to_owned(), "2".to_owned()]);
}

#[test]
fn del_then_reinsertion_is_visible_under_the_same_key() {
    let lines = expect_ok_output(
        "d = {'a': 1}\ndel d['a']\nd['a'] = 2\nprint(d['a'])",
    );
    assert_eq!(lines, vec!["2".to_owned()]);
}

#[test]
fn del_on_a_missing_item_raises_key_error() {
    let msg = expect_runtime_error("d = {}\ndel d['missing']");
    assert!(msg.contains("KeyError"), "got: {msg}");
}

#[test]
fn tuples_are_immutable_and_reject_item_assignment() {
    let msg = expect_runtime_error("t = (1, 2, 3)\nt[0] = 9");
    assert!(
        msg.contains("TypeError") && msg.contains("does not support item assignment"),
        "got: {msg}"
    );
}

#[test]
fn single_element_tuple_repr_has_trailing_comma() {
    let lines = expect_ok_output("print((1,))");
    assert_eq!(lines, vec!["(1,)".to_owned()]);
}

#[test]
fn builtin_len_str_repr_bool() {
    let lines = expect_ok_output(
        "print(len('hello'))\nprint(str(42))\nprint(repr('x'))\nprint(bool(0))\nprint(bool([1]))",
    );
    assert_eq!(
        lines,
        vec!["5".to_owned(), "42".to_owned(), "'x'".to_owned(), "False".to_owned(), "True".to_owned()]
    );
}

#[test]
fn builtin_int_float_conversions() {
    let lines = expect_ok_output("print(int('42'))\nprint(float('3.5'))\nprint(int(3.9))");
    assert_eq!(lines, vec!["42".to_owned(), "3.5".to_owned(), "3".to_owned()]);
}

#[test]
fn builtin_int_on_malformed_string_raises_value_error() {
    let msg = expect_runtime_error("print(int('not a number'))");
    assert!(msg.contains("ValueError"), "got: {msg}");
}

#[test]
fn builtin_min_and_max_take_varargs() {
    let lines = expect_ok_output("print(min(3, 1, 2))\nprint(max(3, 1, 2))");
    assert_eq!(lines, vec!["1".to_owned(), "3".to_owned()]);
}

#[test]
fn builtin_abs_on_int_and_float() {
    let lines = expect_ok_output("print(abs(-3))\nprint(abs(-2.5))");
    assert_eq!(lines, vec!["3".to_owned(), "2.5".to_owned()]);
}
