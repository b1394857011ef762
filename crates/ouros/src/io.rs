//! Output abstraction for the `print` opcode.
//!
//! Mirrors the shape of the teacher's `io.rs` `PrintWriter` trait (a
//! swappable sink so embedders can capture interpreter output instead of
//! writing to the process's real stdout), scaled down to the single line-
//! oriented hook the CORE `Print` opcode needs.

use std::{cell::RefCell, rc::Rc};

pub(crate) trait PrintWriter {
    fn print_line(&mut self, line: &str);
}

/// Default writer: the process's real stdout.
#[derive(Debug, Default)]
pub(crate) struct StdPrint;

impl PrintWriter for StdPrint {
    fn print_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Captures output in memory instead of writing it, for embedding and tests.
///
/// The buffer is shared through an `Rc<RefCell<_>>` rather than owned
/// directly, so a caller can hold onto a handle to it while handing the
/// writer itself (and, through it, ownership of the buffer) into a `VM`.
#[derive(Debug, Default)]
pub(crate) struct CollectStringPrint {
    lines: Rc<RefCell<Vec<String>>>,
}

impl CollectStringPrint {
    /// Returns the writer plus a handle to its buffer, readable once the
    /// `VM` the writer was given to is done with it.
    pub(crate) fn new() -> (Self, Rc<RefCell<Vec<String>>>) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        (Self { lines: Rc::clone(&lines) }, lines)
    }
}

impl PrintWriter for CollectStringPrint {
    fn print_line(&mut self, line: &str) {
        self.lines.borrow_mut().push(line.to_owned());
    }
}
