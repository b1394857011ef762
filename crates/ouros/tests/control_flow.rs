use ouros::{interpret, interpret_capturing, interpret_with_max_recursion, InterpretResult};

fn expect_ok_output(source: &str) -> Vec<String> {
    let (result, lines) = interpret_capturing(source, "test.ou");
    match result {
        InterpretResult::Ok => lines,
        InterpretResult::CompileError(msg) => panic!("unexpected compile error: {msg}"),
        InterpretResult::RuntimeError(msg) => panic!("unexpected runtime error: {msg}"),
    }
}

#[test]
fn if_elif_else_picks_the_right_branch() {
    let source = "\
def classify(n):
    if n < 0:
        return 'negative'
    elif n == 0:
        return 'zero'
    else:
        return 'positive'

print(classify(-1))
print(classify(0))
print(classify(1))
";
    let lines = expect_ok_output(source);
    assert_eq!(lines, vec!["negative".to_owned(), "zero".to_owned(), "positive".to_owned()]);
}

#[test]
fn while_loop_with_break_and_continue() {
    let source = "\
i = 0
total = 0
while i < 10:
    i = i + 1
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total = total + i
print(total)
";
    // odd numbers 1,3,5,7 summed before breaking at i == 9 (first i > 7 after the continue check)
    let lines = expect_ok_output(source);
    assert_eq!(lines, vec!["16".to_owned()]);
}

#[test]
fn for_loop_over_a_range() {
    let lines = expect_ok_output("total = 0\nfor i in range(5):\n    total = total + i\nprint(total)");
    assert_eq!(lines, vec!["10".to_owned()]);
}

#[test]
fn range_supports_start_stop_step() {
    let lines = expect_ok_output("for i in range(10, 0, -3):\n    print(i)");
    assert_eq!(lines, vec!["10".to_owned(), "7".to_owned(), "4".to_owned(), "1".to_owned()]);
}

#[test]
fn for_loop_break_discards_the_hidden_iterator_slot() {
    // Regression check for the for-loop's break-is-inclusive local cleanup:
    // a variable declared after the loop must land in the same slot the
    // loop's hidden iterator occupied, not be shifted by a leaked slot.
    let source = "\
for i in [1, 2, 3]:
    if i == 2:
        break
after = 99
print(after)
";
    let lines = expect_ok_output(source);
    assert_eq!(lines, vec!["99".to_owned()]);
}

#[test]
fn for_loop_over_a_string_yields_characters() {
    let lines = expect_ok_output("for c in 'ab':\n    print(c)");
    assert_eq!(lines, vec!["a".to_owned(), "b".to_owned()]);
}

#[test]
fn closures_capture_enclosing_locals_by_reference() {
    let source = "\
def make_counter():
    count = 0
    def increment():
        nonlocal count
        count = count + 1
        return count
    return increment

counter = make_counter()
print(counter())
print(counter())
print(counter())
";
    let lines = expect_ok_output(source);
    assert_eq!(lines, vec!["1".to_owned(), "2".to_owned(), "3".to_owned()]);
}

#[test]
fn two_closures_over_the_same_local_share_state() {
    let source = "\
def make_pair():
    count = 0
    def get():
        return count
    def bump():
        nonlocal count
        count = count + 1
    return (get, bump)

pair = make_pair()
get = pair[0]
bump = pair[1]
bump()
bump()
print(get())
";
    let lines = expect_ok_output(source);
    assert_eq!(lines, vec!["2".to_owned()]);
}

#[test]
fn default_arguments_are_used_when_omitted() {
    let lines = expect_ok_output("def greet(name='world'):\n    return 'hello ' + name\nprint(greet())\nprint(greet('ouros'))");
    assert_eq!(lines, vec!["hello world".to_owned(), "hello ouros".to_owned()]);
}

#[test]
fn recursive_function_computes_factorial() {
    let source = "\
def fact(n):
    if n <= 1:
        return 1
    return n * fact(n - 1)
print(fact(10))
";
    let lines = expect_ok_output(source);
    assert_eq!(lines, vec!["3628800".to_owned()]);
}

#[test]
fn unbounded_recursion_hits_the_frame_depth_limit() {
    let source = "\
def recurse(n):
    return recurse(n + 1)
recurse(0)
";
    match interpret(source, "test.ou") {
        InterpretResult::RuntimeError(msg) => {
            assert!(msg.contains("maximum recursion depth exceeded"), "got: {msg}");
        }
        InterpretResult::Ok => panic!("expected a recursion-depth runtime error, program ran to completion"),
        InterpretResult::CompileError(msg) => panic!("expected a recursion-depth runtime error, got compile error: {msg}"),
    }
}

#[test]
fn a_tighter_recursion_limit_is_honored() {
    let source = "\
def recurse(n):
    return recurse(n + 1)
recurse(0)
";
    match interpret_with_max_recursion(source, "test.ou", 8) {
        InterpretResult::RuntimeError(msg) => {
            assert!(msg.contains("maximum recursion depth exceeded"), "got: {msg}");
        }
        _ => panic!("expected a recursion-depth runtime error under the tight limit"),
    }
}
