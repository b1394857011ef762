//! Thin CLI driver: runs a script file or starts a line-at-a-time REPL,
//! exercising `ouros::interpret` (`spec.md` §6, out-of-scope "host CLI/REPL",
//! invoked only through the `interpret`/`InterpretResult` contract).
//!
//! Exit codes follow `sysexits.h`, matching `spec.md` §6 exactly: 0 success,
//! 65 compile error, 70 runtime error, 74 I/O error.

use std::{
    env, fs,
    io::{self, Write},
    process::ExitCode,
};

use ouros::InterpretResult;

const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => repl(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("usage: ouros [script]");
            ExitCode::from(EX_IOERR)
        }
    }
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            eprintln!("ouros: can't read file '{path}': {err}");
            return ExitCode::from(EX_IOERR);
        }
    };
    match ouros::interpret(&source, path) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError(message) => {
            eprintln!("{message}");
            ExitCode::from(EX_DATAERR)
        }
        InterpretResult::RuntimeError(message) => {
            eprintln!("{message}");
            ExitCode::from(EX_SOFTWARE)
        }
    }
}

/// A bare read-print loop: one source line per iteration. Multi-line
/// compound statements aren't supported here -- a real REPL would need to
/// buffer until the lexer's indentation stack returns to zero, which is
/// beyond what this thin driver needs to exercise the CORE interpreter.
fn repl() -> ExitCode {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("ouros> ");
        if io::stdout().flush().is_err() {
            return ExitCode::from(EX_IOERR);
        }
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {}
            Err(err) => {
                eprintln!("ouros: error reading stdin: {err}");
                return ExitCode::from(EX_IOERR);
            }
        }
        match ouros::interpret(&line, "<stdin>") {
            InterpretResult::Ok => {}
            InterpretResult::CompileError(message) | InterpretResult::RuntimeError(message) => {
                eprintln!("{message}");
            }
        }
    }
}
