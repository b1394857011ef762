//! Single-pass Pratt-parser compiler from source text straight to bytecode,
//! in the idiom of the original source's `compiler.c`: no intermediate AST,
//! one recursive-descent/precedence-climbing pass emitting into a
//! [`CodeBuilder`] as it goes (`SPEC_FULL.md` §6).
//!
//! Scope is a hand-rolled subset of Python syntax, not a general front end:
//! literals, arithmetic/comparison/logical operators, `if/elif/else`,
//! `while`, `for`, function/closure defs (with `nonlocal`), classes (method
//! defs only, single inheritance), `try/except/raise`, `break`/`continue`,
//! `del <item>`, list/tuple/dict literals, and indexing/slicing. Every
//! compound statement requires the indented-block suite form; there is no
//! single-line `if x: y`.

use super::{
    builder::CodeBuilder,
    lexer::{self, CompileError, TokenKind},
    Op,
};
use crate::{function::{FunctionProto, UpvalueDesc}, heap::Heap, intern::Interns, object::HeapData, value::Value};

pub(crate) fn compile(source: &str, path: &str, heap: &mut Heap, interns: &mut Interns) -> Result<FunctionProto, CompileError> {
    let tokens = lexer::tokenize(source, path)?;
    let mut compiler = Compiler { tokens, pos: 0, heap, interns, path: path.to_owned(), scopes: vec![FunctionScope::new()], pending_void: false };
    compiler.current_scope_mut().locals.push(Local { name: String::new(), depth: 0, captured: false });
    while !compiler.check(&TokenKind::Eof) {
        compiler.statement()?;
    }
    compiler.emit_implicit_return();
    let scope = compiler.scopes.pop().expect("module scope always present");
    let mut builder = scope.builder;
    builder.set_max_locals(scope.locals.len());
    Ok(FunctionProto {
        name: "<module>".to_owned(),
        param_names: Vec::new(),
        param_defaults: Vec::new(),
        upvalue_descriptors: scope.upvalues,
        code: builder.finish(),
    })
}

/// Pratt precedence ladder, loosest to tightest. There is no dedicated
/// assignment tier: this grammar never treats `=` as an expression operator,
/// only `variable`/`dot`/`subscript` check for a trailing `=` themselves when
/// parsed from a statement's assignable position (clox's "canAssign" trick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Prec {
    None,
    Or,
    And,
    Not,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

fn next_prec(p: Prec) -> Prec {
    match p {
        Prec::None => Prec::Or,
        Prec::Or => Prec::And,
        Prec::And => Prec::Not,
        Prec::Not => Prec::Comparison,
        Prec::Comparison => Prec::Term,
        Prec::Term => Prec::Factor,
        Prec::Factor => Prec::Unary,
        Prec::Unary => Prec::Call,
        Prec::Call | Prec::Primary => Prec::Primary,
    }
}

struct Local {
    name: String,
    depth: usize,
    captured: bool,
}

struct LoopCtx {
    continue_target: usize,
    continue_depth: usize,
    break_depth: usize,
    /// `for` loops must also discard the hidden iterator slot on `break`,
    /// which sits at `break_depth` itself rather than strictly above it.
    break_inclusive: bool,
    break_jumps: Vec<usize>,
}

struct FunctionScope {
    builder: CodeBuilder,
    locals: Vec<Local>,
    scope_depth: usize,
    upvalues: Vec<UpvalueDesc>,
    upvalue_names: Vec<String>,
    nonlocals: Vec<String>,
    loop_stack: Vec<LoopCtx>,
}

impl FunctionScope {
    fn new() -> Self {
        Self {
            builder: CodeBuilder::new(),
            locals: Vec::new(),
            scope_depth: 0,
            upvalues: Vec::new(),
            upvalue_names: Vec::new(),
            nonlocals: Vec::new(),
            loop_stack: Vec::new(),
        }
    }
}

struct Compiler<'a> {
    tokens: Vec<lexer::Token>,
    pos: usize,
    heap: &'a mut Heap,
    interns: &'a mut Interns,
    path: String,
    scopes: Vec<FunctionScope>,
    /// Set by the `obj.attr = v` / `obj[k] = v` assignment forms, which fully
    /// consume their operands (`SetAttr`/`SetItem`) and so leave nothing on
    /// the stack for a statement to pop, unlike `SetLocal`/`SetGlobal`/
    /// `SetUpvalue`, which only peek. Read (and reset) by
    /// `expression_statement` right after parsing.
    pending_void: bool,
}

impl<'a> Compiler<'a> {
    // --- token stream helpers ---

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn current_line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn previous_line(&self) -> u32 {
        self.tokens[self.pos.saturating_sub(1)].line
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn match_tok(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> Result<(), CompileError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(msg))
        }
    }

    fn expect_ident(&mut self, msg: &str) -> Result<String, CompileError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(msg)),
        }
    }

    fn expect_newline(&mut self) -> Result<(), CompileError> {
        self.expect(TokenKind::Newline, "expected newline")
    }

    fn error(&self, msg: impl Into<String>) -> CompileError {
        CompileError { path: self.path.clone(), line: self.current_line(), message: msg.into() }
    }

    // --- scope helpers ---

    fn current_scope(&self) -> &FunctionScope {
        self.scopes.last().expect("at least the module scope is always present")
    }

    fn current_scope_mut(&mut self) -> &mut FunctionScope {
        self.scopes.last_mut().expect("at least the module scope is always present")
    }

    fn emit_op(&mut self, op: Op, line: u32) -> usize {
        self.current_scope_mut().builder.emit_op(op, line)
    }

    fn emit_op_u8(&mut self, op: Op, operand: u8, line: u32) -> usize {
        self.current_scope_mut().builder.emit_op_u8(op, operand, line)
    }

    fn emit_op_u16(&mut self, op: Op, operand: u16, line: u32) -> usize {
        self.current_scope_mut().builder.emit_op_u16(op, operand, line)
    }

    fn emit_jump(&mut self, op: Op, line: u32) -> usize {
        self.current_scope_mut().builder.emit_jump(op, line)
    }

    fn patch_jump(&mut self, offset: usize) {
        self.current_scope_mut().builder.patch_jump(offset);
    }

    fn emit_loop(&mut self, target: usize, line: u32) {
        self.current_scope_mut().builder.emit_loop(target, line);
    }

    fn current_offset(&mut self) -> usize {
        self.current_scope_mut().builder.current_offset()
    }

    fn emit_constant(&mut self, value: Value, line: u32) {
        let idx = self.current_scope_mut().builder.add_constant(value);
        self.emit_op_u16(Op::Constant, idx, line);
    }

    fn name_constant(&mut self, name: &str) -> u16 {
        let id = self.interns.intern(self.heap, name);
        self.current_scope_mut().builder.add_constant(Value::Object(id))
    }

    fn emit_implicit_return(&mut self) {
        let line = self.previous_line();
        self.emit_op(Op::PushNone, line);
        self.emit_op(Op::Return, line);
    }

    fn declare_local(&mut self, name: &str) {
        let depth = self.current_scope().scope_depth;
        self.current_scope_mut().locals.push(Local { name: name.to_owned(), depth, captured: false });
        let count = self.current_scope().locals.len();
        self.current_scope_mut().builder.set_max_locals(count);
    }

    fn resolve_local(&self, scope_idx: usize, name: &str) -> Option<usize> {
        self.scopes[scope_idx].locals.iter().rposition(|l| l.name == name)
    }

    /// clox-style multi-level upvalue resolution: walks outward one
    /// enclosing function at a time, marking an enclosing local as captured
    /// the first time it's reached through a closure boundary, and
    /// memoizing each scope's upvalue list so repeated references to the
    /// same name reuse one slot.
    fn resolve_upvalue(&mut self, scope_idx: usize, name: &str) -> Option<u8> {
        if scope_idx == 0 {
            return None;
        }
        if let Some(pos) = self.scopes[scope_idx].upvalue_names.iter().position(|n| n == name) {
            return Some(pos as u8);
        }
        let enclosing = scope_idx - 1;
        if let Some(slot) = self.resolve_local(enclosing, name) {
            self.scopes[enclosing].locals[slot].captured = true;
            return Some(self.add_upvalue(scope_idx, name, true, slot as u8));
        }
        if let Some(idx) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(scope_idx, name, false, idx));
        }
        None
    }

    fn add_upvalue(&mut self, scope_idx: usize, name: &str, is_local: bool, index: u8) -> u8 {
        let scope = &mut self.scopes[scope_idx];
        scope.upvalues.push(UpvalueDesc { is_local, index });
        scope.upvalue_names.push(name.to_owned());
        (scope.upvalues.len() - 1) as u8
    }

    fn load_name(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        let scope_idx = self.scopes.len() - 1;
        if let Some(slot) = self.resolve_local(scope_idx, name) {
            self.emit_op_u8(Op::GetLocal, slot as u8, line);
        } else if let Some(idx) = self.resolve_upvalue(scope_idx, name) {
            self.emit_op_u8(Op::GetUpvalue, idx, line);
        } else {
            let key = self.name_constant(name);
            self.emit_op_u16(Op::GetGlobal, key, line);
        }
        Ok(())
    }

    /// Python scoping, simplified to what `nonlocal` and bare assignment can
    /// express in this grammar (no `global` statement): a name already bound
    /// as a local in this function rebinds that local; a name declared
    /// `nonlocal` rebinds the matching enclosing upvalue; at module scope a
    /// bare name is a global; otherwise assignment inside a function always
    /// creates a brand-new local, even if a same-named global exists.
    fn store_name(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        let scope_idx = self.scopes.len() - 1;
        if let Some(slot) = self.resolve_local(scope_idx, name) {
            self.emit_op_u8(Op::SetLocal, slot as u8, line);
            return Ok(());
        }
        if self.current_scope().nonlocals.iter().any(|n| n == name) {
            if let Some(idx) = self.resolve_upvalue(scope_idx, name) {
                self.emit_op_u8(Op::SetUpvalue, idx, line);
                return Ok(());
            }
            return Err(self.error(format!("no binding found for nonlocal '{name}'")));
        }
        if scope_idx == 0 {
            let key = self.name_constant(name);
            self.emit_op_u16(Op::SetGlobal, key, line);
            return Ok(());
        }
        self.declare_local(name);
        let slot = self.resolve_local(scope_idx, name).expect("just declared above");
        self.emit_op_u8(Op::SetLocal, slot as u8, line);
        Ok(())
    }

    /// Used by `def`/`class` statements: bind the value already on the stack
    /// to `name`, then discard the residual peeked value (`SetLocal`/
    /// `SetGlobal`/`SetUpvalue` never pop).
    fn bind_name(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        self.store_name(name, line)?;
        self.emit_op(Op::Pop, line);
        Ok(())
    }

    // --- block/loop scope cleanup ---

    fn begin_scope(&mut self) {
        self.current_scope_mut().scope_depth += 1;
    }

    /// Pops the current scope's locals back down to the enclosing depth,
    /// closing any that were captured, and removes them from bookkeeping.
    fn end_scope(&mut self, line: u32) {
        self.current_scope_mut().scope_depth -= 1;
        let floor = self.current_scope().scope_depth;
        loop {
            let Some(local) = self.current_scope().locals.last() else { break };
            if local.depth <= floor {
                break;
            }
            let idx = self.current_scope().locals.len() - 1;
            if local.captured {
                self.emit_op_u8(Op::CloseUpvalue, idx as u8, line);
            } else {
                self.emit_op(Op::Pop, line);
            }
            self.current_scope_mut().locals.pop();
        }
    }

    /// Emits cleanup for a `break`/`continue` jump without touching the
    /// compiler's own `locals` bookkeeping -- code textually after the jump
    /// within the same block is still reachable and needs correct slot
    /// numbers until the block's own `end_scope` runs for real.
    fn emit_loop_cleanup(&mut self, target_depth: usize, inclusive: bool, line: u32) {
        let count = self
            .current_scope()
            .locals
            .iter()
            .rev()
            .take_while(|l| if inclusive { l.depth >= target_depth } else { l.depth > target_depth })
            .count();
        let len = self.current_scope().locals.len();
        for i in (len - count..len).rev() {
            if self.current_scope().locals[i].captured {
                self.emit_op_u8(Op::CloseUpvalue, i as u8, line);
            } else {
                self.emit_op(Op::Pop, line);
            }
        }
    }

    // --- statements ---

    fn statement(&mut self) -> Result<(), CompileError> {
        match self.peek().clone() {
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Def => self.def_statement(),
            TokenKind::Class => self.class_statement(),
            TokenKind::Return => self.return_statement(),
            TokenKind::Try => self.try_statement(),
            TokenKind::Raise => self.raise_statement(),
            TokenKind::Pass => {
                self.advance();
                self.expect_newline()
            }
            TokenKind::Break => self.break_statement(),
            TokenKind::Continue => self.continue_statement(),
            TokenKind::Nonlocal => self.nonlocal_statement(),
            TokenKind::Del => self.del_statement(),
            TokenKind::Print => self.print_statement(),
            _ => self.expression_statement(),
        }
    }

    /// Indented-block suite only: `:` `NEWLINE` `INDENT` stmt* `DEDENT`.
    fn block(&mut self) -> Result<(), CompileError> {
        self.expect(TokenKind::Colon, "expected ':'")?;
        self.expect(TokenKind::Newline, "expected newline after ':'")?;
        self.expect(TokenKind::Indent, "expected an indented block")?;
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            self.statement()?;
        }
        self.expect(TokenKind::Dedent, "expected dedent")
    }

    fn print_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        self.expect(TokenKind::LParen, "expected '(' after 'print'")?;
        self.expression()?;
        self.expect(TokenKind::RParen, "expected ')'")?;
        self.emit_op(Op::Print, line);
        self.expect_newline()
    }

    fn expression_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.pending_void = false;
        self.parse_precedence(Prec::Or, true)?;
        if !self.pending_void {
            self.emit_op(Op::Pop, line);
        }
        self.expect_newline()
    }

    fn return_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        if self.check(&TokenKind::Newline) {
            self.emit_op(Op::PushNone, line);
        } else {
            self.expression()?;
        }
        self.emit_op(Op::Return, line);
        self.expect_newline()
    }

    fn raise_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        if self.check(&TokenKind::Newline) {
            self.emit_op(Op::PushException, line);
        } else {
            self.expression()?;
        }
        self.emit_op(Op::Raise, line);
        self.expect_newline()
    }

    fn nonlocal_statement(&mut self) -> Result<(), CompileError> {
        self.advance();
        if self.scopes.len() <= 1 {
            return Err(self.error("'nonlocal' outside function"));
        }
        loop {
            let name = self.expect_ident("expected name after 'nonlocal'")?;
            self.current_scope_mut().nonlocals.push(name);
            if !self.match_tok(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_newline()
    }

    fn break_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        let (depth, inclusive) = match self.current_scope().loop_stack.last() {
            Some(ctx) => (ctx.break_depth, ctx.break_inclusive),
            None => return Err(self.error("'break' outside loop")),
        };
        self.emit_loop_cleanup(depth, inclusive, line);
        let jump = self.emit_jump(Op::Jump, line);
        self.current_scope_mut().loop_stack.last_mut().expect("checked above").break_jumps.push(jump);
        self.expect_newline()
    }

    fn continue_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        let (target, depth) = match self.current_scope().loop_stack.last() {
            Some(ctx) => (ctx.continue_target, ctx.continue_depth),
            None => return Err(self.error("'continue' outside loop")),
        };
        self.emit_loop_cleanup(depth, false, line);
        self.emit_loop(target, line);
        self.expect_newline()
    }

    fn del_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        let base_name = self.expect_ident("expected a name after 'del'")?;
        self.load_name(&base_name, line)?;
        while self.match_tok(&TokenKind::Dot) {
            let attr_line = self.current_line();
            let attr_name = self.expect_ident("expected attribute name after '.'")?;
            let key = self.name_constant(&attr_name);
            self.emit_op_u16(Op::GetAttr, key, attr_line);
        }
        self.expect(TokenKind::LBracket, "'del' only supports deleting an item, e.g. 'del d[key]'")?;
        self.expression()?;
        self.expect(TokenKind::RBracket, "expected ']'")?;
        self.emit_op(Op::DelItem, line);
        self.expect_newline()
    }

    fn if_statement(&mut self) -> Result<(), CompileError> {
        self.advance(); // 'if'
        let mut pending_jump = self.compile_condition_and_block()?;
        let mut end_jumps = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::Elif => {
                    let line = self.current_line();
                    let skip = self.emit_jump(Op::Jump, line);
                    end_jumps.push(skip);
                    self.patch_jump(pending_jump);
                    self.advance();
                    pending_jump = self.compile_condition_and_block()?;
                }
                TokenKind::Else => {
                    let line = self.current_line();
                    let skip = self.emit_jump(Op::Jump, line);
                    end_jumps.push(skip);
                    self.patch_jump(pending_jump);
                    self.advance();
                    self.begin_scope();
                    self.block()?;
                    let line2 = self.previous_line();
                    self.end_scope(line2);
                    for j in end_jumps {
                        self.patch_jump(j);
                    }
                    return Ok(());
                }
                _ => {
                    self.patch_jump(pending_jump);
                    for j in end_jumps {
                        self.patch_jump(j);
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Compiles `<cond> ':' suite`, returning the `JumpIfFalse` operand
    /// offset (still unpatched) for the caller to wire up once it knows
    /// whether an `elif`/`else` follows.
    fn compile_condition_and_block(&mut self) -> Result<usize, CompileError> {
        self.expression()?;
        let line = self.current_line();
        // JUMP_IF_FALSE unconditionally pops the condition in this VM, on
        // both the taken and fall-through paths -- no extra Pop needed here.
        let jump = self.emit_jump(Op::JumpIfFalse, line);
        self.begin_scope();
        self.block()?;
        let line2 = self.previous_line();
        self.end_scope(line2);
        Ok(jump)
    }

    fn while_statement(&mut self) -> Result<(), CompileError> {
        self.advance(); // 'while'
        let loop_start = self.current_offset();
        self.expression()?;
        let line = self.current_line();
        let exit_jump = self.emit_jump(Op::JumpIfFalse, line);
        let depth_before = self.current_scope().scope_depth;
        self.begin_scope();
        self.current_scope_mut().loop_stack.push(LoopCtx {
            continue_target: loop_start,
            continue_depth: depth_before,
            break_depth: depth_before,
            break_inclusive: false,
            break_jumps: Vec::new(),
        });
        self.block()?;
        let line2 = self.previous_line();
        let ctx = self.current_scope_mut().loop_stack.pop().expect("just pushed");
        self.end_scope(line2);
        self.emit_loop(loop_start, line2);
        self.patch_jump(exit_jump);
        for j in ctx.break_jumps {
            self.patch_jump(j);
        }
        Ok(())
    }

    /// Desugars to: evaluate the iterable, stash it in a hidden local,
    /// `FOR_ITER` peeks it each pass, `continue` jumps back to re-peek,
    /// `break` additionally drops the hidden slot since `FOR_ITER`'s own
    /// `StopIteration` path already popped it by the time control reaches
    /// the loop's natural exit.
    fn for_statement(&mut self) -> Result<(), CompileError> {
        self.advance(); // 'for'
        let var_name = self.expect_ident("expected loop variable name")?;
        self.expect(TokenKind::In, "expected 'in'")?;
        self.expression()?;
        let line = self.current_line();
        self.emit_op(Op::GetIter, line);
        let iter_depth = self.current_scope().scope_depth;
        self.declare_local("<iter>");
        let loop_top = self.current_offset();
        let for_iter_jump = self.emit_jump(Op::ForIter, line);
        self.begin_scope();
        self.declare_local(&var_name);
        self.current_scope_mut().loop_stack.push(LoopCtx {
            continue_target: loop_top,
            continue_depth: iter_depth,
            break_depth: iter_depth,
            break_inclusive: true,
            break_jumps: Vec::new(),
        });
        self.block()?;
        let line2 = self.previous_line();
        let ctx = self.current_scope_mut().loop_stack.pop().expect("just pushed");
        self.end_scope(line2);
        self.emit_loop(loop_top, line2);
        self.patch_jump(for_iter_jump);
        self.current_scope_mut().locals.pop();
        for j in ctx.break_jumps {
            self.patch_jump(j);
        }
        Ok(())
    }

    fn def_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // 'def'
        let name = self.expect_ident("expected function name")?;
        let proto = self.compile_function(&name)?;
        let function_id = self.heap.allocate(HeapData::Function(proto));
        let const_idx = self.current_scope_mut().builder.add_constant(Value::Object(function_id));
        self.emit_op_u16(Op::Closure, const_idx, line);
        self.bind_name(&name, line)
    }

    /// `name '(' params ')' ':' suite`, called with `def`/the method's `def`
    /// already consumed up to (not including) the function's own name.
    fn compile_function(&mut self, name: &str) -> Result<FunctionProto, CompileError> {
        self.expect(TokenKind::LParen, "expected '(' after function name")?;
        let mut param_names: Vec<String> = Vec::new();
        let mut param_defaults: Vec<Value> = Vec::new();
        let mut seen_default = false;
        if !self.check(&TokenKind::RParen) {
            loop {
                let pname = self.expect_ident("expected parameter name")?;
                param_names.push(pname);
                if self.match_tok(&TokenKind::Equal) {
                    seen_default = true;
                    param_defaults.push(self.parse_literal_default()?);
                } else if seen_default {
                    return Err(self.error("non-default argument follows default argument"));
                }
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RParen) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')'")?;

        self.scopes.push(FunctionScope::new());
        self.current_scope_mut().locals.push(Local { name: String::new(), depth: 0, captured: false });
        let mut param_name_ids = Vec::with_capacity(param_names.len());
        for pname in &param_names {
            self.declare_local(pname);
            param_name_ids.push(self.interns.intern(self.heap, pname));
        }
        self.block()?;
        self.emit_implicit_return();
        let scope = self.scopes.pop().expect("just pushed");
        let mut builder = scope.builder;
        builder.set_max_locals(scope.locals.len());
        Ok(FunctionProto {
            name: name.to_owned(),
            param_names: param_name_ids,
            param_defaults,
            upvalue_descriptors: scope.upvalues,
            code: builder.finish(),
        })
    }

    /// Parameter defaults are stored as plain `Value`s on `FunctionProto`,
    /// never re-evaluated, so only literal constants (optionally
    /// negative-signed numbers) are accepted.
    fn parse_literal_default(&mut self) -> Result<Value, CompileError> {
        match self.peek().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Value::Int(n))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Value::Float(f))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Value::Object(self.heap.allocate_string(s)))
            }
            TokenKind::TrueKw => {
                self.advance();
                Ok(Value::Bool(true))
            }
            TokenKind::FalseKw => {
                self.advance();
                Ok(Value::Bool(false))
            }
            TokenKind::NoneKw => {
                self.advance();
                Ok(Value::None)
            }
            TokenKind::Minus => {
                self.advance();
                match self.peek().clone() {
                    TokenKind::Int(n) => {
                        self.advance();
                        Ok(Value::Int(-n))
                    }
                    TokenKind::Float(f) => {
                        self.advance();
                        Ok(Value::Float(-f))
                    }
                    _ => Err(self.error("default argument must be a literal constant")),
                }
            }
            _ => Err(self.error("default argument must be a literal constant")),
        }
    }

    /// Class bodies hold only method defs (no class-level data attributes),
    /// single base clause, matching `MAKE_CLASS`/`INHERIT`/`METHOD_DEF`'s
    /// stack contract: the class value sits on the stack throughout and is
    /// never popped by any of the three, so the `class` statement itself
    /// binds it to a name afterward exactly like any other declaration.
    fn class_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // 'class'
        let name = self.expect_ident("expected class name")?;
        let name_key = self.name_constant(&name);
        self.emit_op_u16(Op::MakeClass, name_key, line);
        let mut has_base = false;
        if self.match_tok(&TokenKind::LParen) {
            if !self.check(&TokenKind::RParen) {
                let base_name = self.expect_ident("expected base class name")?;
                self.load_name(&base_name, line)?;
                has_base = true;
            }
            self.expect(TokenKind::RParen, "expected ')'")?;
        }
        if has_base {
            self.emit_op(Op::Inherit, line);
        }
        self.expect(TokenKind::Colon, "expected ':'")?;
        self.expect(TokenKind::Newline, "expected newline after ':'")?;
        self.expect(TokenKind::Indent, "expected indented class body")?;
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            self.expect(TokenKind::Def, "class bodies may only contain method definitions")?;
            let method_line = self.current_line();
            let method_name = self.expect_ident("expected method name")?;
            let proto = self.compile_function(&method_name)?;
            let function_id = self.heap.allocate(HeapData::Function(proto));
            let const_idx = self.current_scope_mut().builder.add_constant(Value::Object(function_id));
            self.emit_op_u16(Op::Closure, const_idx, method_line);
            let key = self.name_constant(&method_name);
            self.emit_op_u16(Op::MethodDef, key, method_line);
        }
        self.expect(TokenKind::Dedent, "expected dedent")?;
        let decl_line = self.previous_line();
        self.bind_name(&name, decl_line)
    }

    /// Only a single `except` clause is supported, matching the VM's
    /// per-`try`-block single handler slot (`exceptions::try_unwind` pops
    /// whichever handler is on top regardless of the raised type): the type
    /// name, if given, is parsed but not checked at runtime. See `DESIGN.md`.
    fn try_statement(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // 'try'
        let setup_jump = self.emit_jump(Op::SetupExcept, line);
        self.begin_scope();
        self.block()?;
        let line_a = self.previous_line();
        self.end_scope(line_a);
        self.emit_op(Op::PopExcept, line_a);
        let skip_handler = self.emit_jump(Op::Jump, line_a);
        self.patch_jump(setup_jump);

        self.expect(TokenKind::Except, "expected 'except' after 'try' block")?;
        let except_line = self.current_line();
        if !self.check(&TokenKind::Colon) && !self.check(&TokenKind::As) {
            self.expect_ident("expected exception type name")?;
        }
        let bind = if self.match_tok(&TokenKind::As) { Some(self.expect_ident("expected name after 'as'")?) } else { None };
        self.begin_scope();
        if let Some(bind_name) = bind {
            self.emit_op(Op::PushException, except_line);
            self.declare_local(&bind_name);
            let scope_idx = self.scopes.len() - 1;
            let slot = self.resolve_local(scope_idx, &bind_name).expect("just declared above");
            self.emit_op_u8(Op::SetLocal, slot as u8, except_line);
            self.emit_op(Op::Pop, except_line);
        } else {
            // `try_unwind` always pushes the exception value for the handler
            // to bind; with no `as` there's nothing to bind it to, so it must
            // still be popped here to match the non-exception path's stack
            // depth at `skip_handler` below.
            self.emit_op(Op::Pop, except_line);
        }
        self.block()?;
        let line_b = self.previous_line();
        self.end_scope(line_b);
        self.patch_jump(skip_handler);
        Ok(())
    }

    // --- expressions ---

    fn expression(&mut self) -> Result<(), CompileError> {
        self.parse_precedence(Prec::Or, false)
    }

    fn parse_precedence(&mut self, min_prec: Prec, can_assign: bool) -> Result<(), CompileError> {
        self.parse_prefix(can_assign)?;
        while let Some(prec) = self.infix_precedence() {
            if prec < min_prec {
                break;
            }
            self.parse_infix(can_assign)?;
        }
        Ok(())
    }

    fn infix_precedence(&self) -> Option<Prec> {
        Some(match self.peek() {
            TokenKind::Or => Prec::Or,
            TokenKind::And => Prec::And,
            TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::In => Prec::Comparison,
            TokenKind::Plus | TokenKind::Minus => Prec::Term,
            TokenKind::Star | TokenKind::Slash | TokenKind::SlashSlash | TokenKind::Percent => Prec::Factor,
            TokenKind::LParen | TokenKind::Dot | TokenKind::LBracket => Prec::Call,
            _ => return None,
        })
    }

    fn parse_prefix(&mut self, can_assign: bool) -> Result<(), CompileError> {
        let line = self.current_line();
        match self.peek().clone() {
            TokenKind::Int(n) => {
                self.advance();
                self.emit_constant(Value::Int(n), line);
            }
            TokenKind::Float(f) => {
                self.advance();
                self.emit_constant(Value::Float(f), line);
            }
            TokenKind::Str(s) => {
                self.advance();
                let id = self.heap.allocate_string(s);
                self.emit_constant(Value::Object(id), line);
            }
            TokenKind::TrueKw => {
                self.advance();
                self.emit_op(Op::PushTrue, line);
            }
            TokenKind::FalseKw => {
                self.advance();
                self.emit_op(Op::PushFalse, line);
            }
            TokenKind::NoneKw => {
                self.advance();
                self.emit_op(Op::PushNone, line);
            }
            TokenKind::Ident(name) => {
                self.advance();
                self.variable(name, can_assign)?;
            }
            TokenKind::Minus => {
                self.advance();
                self.parse_precedence(Prec::Unary, false)?;
                self.emit_op(Op::Neg, line);
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_precedence(Prec::Unary, false)?;
                self.emit_op(Op::Pos, line);
            }
            TokenKind::Not => {
                self.advance();
                self.parse_precedence(Prec::Comparison, false)?;
                self.emit_op(Op::Not, line);
            }
            TokenKind::LParen => self.grouping_or_tuple()?,
            TokenKind::LBracket => self.list_literal()?,
            TokenKind::LBrace => self.dict_literal()?,
            _ => return Err(self.error("expected expression")),
        }
        Ok(())
    }

    fn parse_infix(&mut self, can_assign: bool) -> Result<(), CompileError> {
        match self.peek().clone() {
            TokenKind::Plus => self.binary_op(Prec::Term, Op::Add),
            TokenKind::Minus => self.binary_op(Prec::Term, Op::Sub),
            TokenKind::Star => self.binary_op(Prec::Factor, Op::Mul),
            TokenKind::Slash => self.binary_op(Prec::Factor, Op::TrueDiv),
            TokenKind::SlashSlash => self.binary_op(Prec::Factor, Op::FloorDiv),
            TokenKind::Percent => self.binary_op(Prec::Factor, Op::Mod),
            TokenKind::EqualEqual => self.binary_op(Prec::Comparison, Op::Eq),
            TokenKind::BangEqual => self.binary_op(Prec::Comparison, Op::Ne),
            TokenKind::Less => self.binary_op(Prec::Comparison, Op::Lt),
            TokenKind::LessEqual => self.binary_op(Prec::Comparison, Op::Le),
            TokenKind::Greater => self.binary_op(Prec::Comparison, Op::Gt),
            TokenKind::GreaterEqual => self.binary_op(Prec::Comparison, Op::Ge),
            // left operand (`needle`) is already on the stack; push the
            // right operand (`haystack`) second, matching `Op::Contains`'s
            // pop order (haystack on top).
            TokenKind::In => self.binary_op(Prec::Comparison, Op::Contains),
            TokenKind::And => self.and_op(),
            TokenKind::Or => self.or_op(),
            TokenKind::LParen => self.call_args(),
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::LBracket => self.subscript(can_assign),
            _ => Err(self.error("unexpected token in expression")),
        }
    }

    fn binary_op(&mut self, prec: Prec, op: Op) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        self.parse_precedence(next_prec(prec), false)?;
        self.emit_op(op, line);
        Ok(())
    }

    /// `a and b`: `JUMP_IF_FALSE_NO_POP` only peeks, so both paths leave
    /// exactly one value at `end` -- `a` itself (falsy, short-circuited) or
    /// `b` (truthy, after the Pop that discards `a`).
    fn and_op(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        let end_jump = self.emit_jump(Op::JumpIfFalseNoPop, line);
        self.emit_op(Op::Pop, line);
        self.parse_precedence(next_prec(Prec::And), false)?;
        self.patch_jump(end_jump);
        Ok(())
    }

    /// `a or b`: mirror image of `and_op` via `JUMP_IF_TRUE_NO_POP`.
    fn or_op(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance();
        let end_jump = self.emit_jump(Op::JumpIfTrueNoPop, line);
        self.emit_op(Op::Pop, line);
        self.parse_precedence(next_prec(Prec::Or), false)?;
        self.patch_jump(end_jump);
        Ok(())
    }

    fn variable(&mut self, name: String, can_assign: bool) -> Result<(), CompileError> {
        let line = self.previous_line();
        if can_assign && self.check(&TokenKind::Equal) {
            self.advance();
            self.parse_precedence(Prec::Or, false)?;
            self.store_name(&name, line)?;
        } else {
            self.load_name(&name, line)?;
        }
        Ok(())
    }

    fn dot(&mut self, can_assign: bool) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // '.'
        let name = self.expect_ident("expected attribute name after '.'")?;
        if can_assign && self.check(&TokenKind::Equal) {
            self.advance();
            self.parse_precedence(Prec::Or, false)?;
            let key = self.name_constant(&name);
            self.emit_op_u16(Op::SetAttr, key, line);
            self.pending_void = true;
        } else {
            let key = self.name_constant(&name);
            self.emit_op_u16(Op::GetAttr, key, line);
        }
        Ok(())
    }

    /// `[expr]` (plain index) or `[start? : stop? : step?]` (slice, any
    /// segment omittable -- represented at runtime by pushing `Value::None`
    /// for an omitted bound). Pop order for both forms matches
    /// `collections::build_slice`/the `GetItem`/`SetItem` handlers exactly
    /// under left-to-right compilation, no reordering needed.
    fn subscript(&mut self, can_assign: bool) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // '['
        let mut is_slice = false;
        if self.check(&TokenKind::Colon) {
            self.emit_op(Op::PushNone, line);
        } else {
            self.parse_precedence(Prec::Or, false)?;
        }
        if self.match_tok(&TokenKind::Colon) {
            is_slice = true;
            if self.check(&TokenKind::Colon) || self.check(&TokenKind::RBracket) {
                self.emit_op(Op::PushNone, line);
            } else {
                self.parse_precedence(Prec::Or, false)?;
            }
            if self.match_tok(&TokenKind::Colon) {
                if self.check(&TokenKind::RBracket) {
                    self.emit_op(Op::PushNone, line);
                } else {
                    self.parse_precedence(Prec::Or, false)?;
                }
            } else {
                self.emit_op(Op::PushNone, line);
            }
        }
        self.expect(TokenKind::RBracket, "expected ']'")?;
        if is_slice {
            self.emit_op(Op::BuildSlice, line);
        }
        if can_assign && self.check(&TokenKind::Equal) {
            self.advance();
            self.parse_precedence(Prec::Or, false)?;
            self.emit_op(Op::SetItem, line);
            self.pending_void = true;
        } else {
            self.emit_op(Op::GetItem, line);
        }
        Ok(())
    }

    fn call_args(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // '('
        let mut argc: u16 = 0;
        if !self.check(&TokenKind::RParen) {
            loop {
                self.parse_precedence(Prec::Or, false)?;
                argc += 1;
                if !self.match_tok(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RParen) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "expected ')' after arguments")?;
        self.emit_op_u16(Op::Call, argc, line);
        Ok(())
    }

    fn grouping_or_tuple(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // '('
        if self.match_tok(&TokenKind::RParen) {
            self.emit_op_u16(Op::BuildTuple, 0, line);
            return Ok(());
        }
        self.parse_precedence(Prec::Or, false)?;
        if self.check(&TokenKind::Comma) {
            let mut count = 1u16;
            while self.match_tok(&TokenKind::Comma) {
                if self.check(&TokenKind::RParen) {
                    break;
                }
                self.parse_precedence(Prec::Or, false)?;
                count += 1;
            }
            self.expect(TokenKind::RParen, "expected ')'")?;
            self.emit_op_u16(Op::BuildTuple, count, line);
        } else {
            self.expect(TokenKind::RParen, "expected ')'")?;
        }
        Ok(())
    }

    fn list_literal(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // '['
        if self.match_tok(&TokenKind::RBracket) {
            self.emit_op_u16(Op::BuildList, 0, line);
            return Ok(());
        }
        let mut count = 1u16;
        self.parse_precedence(Prec::Or, false)?;
        while self.match_tok(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            self.parse_precedence(Prec::Or, false)?;
            count += 1;
        }
        self.expect(TokenKind::RBracket, "expected ']'")?;
        self.emit_op_u16(Op::BuildList, count, line);
        Ok(())
    }

    fn dict_literal(&mut self) -> Result<(), CompileError> {
        let line = self.current_line();
        self.advance(); // '{'
        if self.match_tok(&TokenKind::RBrace) {
            self.emit_op_u16(Op::BuildDict, 0, line);
            return Ok(());
        }
        let mut count = 1u16;
        self.parse_precedence(Prec::Or, false)?;
        self.expect(TokenKind::Colon, "expected ':' in dict literal")?;
        self.parse_precedence(Prec::Or, false)?;
        while self.match_tok(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            self.parse_precedence(Prec::Or, false)?;
            self.expect(TokenKind::Colon, "expected ':' in dict literal")?;
            self.parse_precedence(Prec::Or, false)?;
            count += 1;
        }
        self.expect(TokenKind::RBrace, "expected '}'")?;
        self.emit_op_u16(Op::BuildDict, count, line);
        Ok(())
    }
}
