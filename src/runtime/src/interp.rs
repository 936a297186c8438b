//! A tree-walking interpreter for function bodies.
//!
//! Compiled functions run through their [`CompiledFunc`] structure: the
//! prologue pushes and restores a frame, the body is the dispatch form, and
//! the exit action either saves the slots of the frame or pops it. A yield
//! reached on a fresh frame unwinds the whole call chain with
//! [`Signal::Suspend`].

use {
    crate::{
        coroutine::Context,
        stdlib,
        value::{Func, Value},
        Code, ImportTarget, Program, RestoreError, RuntimeError, Unit,
    },
    backend::compile::{CompiledFunc, ExitAction},
    frontend::ast::{
        self, AssignOp, BinaryOp, Block, BranchKind, CallExpr, CaseClause, CommClause, Element,
        Expr, FuncType, Lit, Stmt, StmtKind, UnaryOp,
    },
    middle::types::{Color, Type, PRIMITIVE_TYPES},
    std::{cell::RefCell, collections::BTreeMap, io::Write, rc::Rc},
};

pub(crate) enum Signal {
    /// A yield is unwinding the stack of the coroutine.
    Suspend,
    Error(RuntimeError),
}

impl Signal {
    pub fn into_error(self) -> RuntimeError {
        match self {
            // only reachable with a context
            Signal::Suspend => RuntimeError::NoContext,
            Signal::Error(error) => error,
        }
    }
}

impl From<RuntimeError> for Signal {
    fn from(error: RuntimeError) -> Self {
        Signal::Error(error)
    }
}

impl From<RestoreError> for Signal {
    fn from(error: RestoreError) -> Self {
        Signal::Error(error.into())
    }
}

type Exec<T> = Result<T, Signal>;

pub type Env = Rc<Scope>;

type Cell = Rc<RefCell<Value>>;

#[derive(Debug)]
pub struct Scope {
    vars: RefCell<BTreeMap<String, Cell>>,
    parent: Option<Env>,
    unit: Rc<Unit>,
}

impl Scope {
    pub fn root(unit: Rc<Unit>) -> Env {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: None,
            unit,
        })
    }

    pub fn child(env: &Env) -> Env {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: Some(env.clone()),
            unit: env.unit.clone(),
        })
    }

    fn cell(&self, name: &str) -> Option<Cell> {
        if let Some(cell) = self.vars.borrow().get(name) {
            return Some(cell.clone());
        }
        self.parent.as_ref()?.cell(name)
    }

    fn contains(&self, name: &str) -> bool {
        self.cell(name).is_some()
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.cell(name).map(|cell| cell.borrow().clone())
    }

    fn set(&self, name: &str, value: Value) -> bool {
        match self.cell(name) {
            Some(cell) => {
                *cell.borrow_mut() = value;
                true
            }
            None => false,
        }
    }

    fn declare(&self, name: &str, value: Value) {
        if name != "_" {
            self.vars
                .borrow_mut()
                .insert(name.to_owned(), Rc::new(RefCell::new(value)));
        }
    }

    // `:=` reuses variables already declared in the same scope
    fn define(&self, name: &str, value: Value) {
        let existing = self.vars.borrow().get(name).cloned();
        match existing {
            Some(cell) => *cell.borrow_mut() = value,
            None => self.declare(name, value),
        }
    }

    /// What a package-qualified name refers to, unless a variable shadows
    /// the import.
    fn import(&self, expr: &Expr) -> Option<&ImportTarget> {
        let ident = expr.as_ident()?;
        if self.contains(&ident.name) {
            return None;
        }
        self.unit.imports.get(&ident.name)
    }
}

enum Flow {
    Next,
    Break(Option<String>),
    Continue(Option<String>),
    Fallthrough,
    // `None` for a bare return
    Return(Option<Value>),
}

fn is_label(label: &Option<String>, own: Option<&str>) -> bool {
    label.as_deref().map_or(true, |label| Some(label) == own)
}

// what a loop does after one iteration; `None` continues with the next one
fn after_iteration(flow: Flow, own: Option<&str>) -> Option<Flow> {
    match flow {
        Flow::Next | Flow::Fallthrough => None,
        Flow::Continue(ref label) if is_label(label, own) => None,
        Flow::Break(ref label) if is_label(label, own) => Some(Flow::Next),
        flow => Some(flow),
    }
}

fn consume_break(flow: Flow, own: Option<&str>) -> Flow {
    match flow {
        Flow::Break(ref label) if is_label(label, own) => Flow::Next,
        flow => flow,
    }
}

enum Callable {
    Func(Func),
    Builtin(&'static str),
    Conversion(Type),
    Yield(Color),
}

fn builtin(name: &str) -> Option<&'static str> {
    [
        "append", "cap", "clear", "close", "copy", "delete", "len", "max", "min", "panic",
        "print", "println", "recover",
    ]
    .into_iter()
    .find(|&builtin| builtin == name)
}

fn type_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::Type(message.into())
}

fn int(value: &Value) -> Result<i64, RuntimeError> {
    match *value {
        Value::Int(n) => Ok(n),
        ref value => Err(type_error(format!("expected an integer, found {}", value.type_name()))),
    }
}

fn boolean(value: &Value) -> Result<bool, RuntimeError> {
    match *value {
        Value::Bool(b) => Ok(b),
        ref value => Err(type_error(format!("expected a bool, found {}", value.type_name()))),
    }
}

fn index_in(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let index = int(index)?;
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or(RuntimeError::IndexOutOfRange { index, len })
}

/// Reads an expression in type position.
fn type_of(expr: &Expr) -> Result<Type, RuntimeError> {
    match expr {
        Expr::Ident(ident) => Ok(Type::from(&ast::Type::Named(ident.name.clone()))),
        Expr::Selector { base, field } => match base.as_ident() {
            Some(package) => Ok(Type::Named {
                package: Some(package.name.clone()),
                name: field.clone(),
            }),
            None => Err(type_error(format!("{field} is not a type"))),
        },
        Expr::TypeLit(ty) => Ok(Type::from(ty)),
        Expr::Paren(expr) => type_of(expr),
        _ => Err(type_error("expected a type")),
    }
}

fn map_get(entries: &[(Value, Value)], key: &Value) -> Option<Value> {
    entries
        .iter()
        .find(|(k, _)| k.equals(key))
        .map(|(_, v)| v.clone())
}

fn map_insert(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(k, _)| k.equals(&key)) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}

fn wrap(kind: &str, n: i64) -> i64 {
    match kind {
        "int8" => n as i8 as i64,
        "int16" => n as i16 as i64,
        "int32" | "rune" => n as i32 as i64,
        "uint8" | "byte" => n as u8 as i64,
        "uint16" => n as u16 as i64,
        "uint32" => n as u32 as i64,
        _ => n,
    }
}

fn char_of(n: i64) -> char {
    u32::try_from(n)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn convert(ty: &Type, value: Value) -> Result<Value, RuntimeError> {
    match (ty, value) {
        (Type::Int(kind), Value::Int(n)) => Ok(Value::Int(wrap(kind, n))),
        (Type::String, Value::Int(n)) => Ok(Value::Str(char_of(n).to_string())),
        (Type::String, Value::Slice { elem, items }) => {
            let items = items.map(|items| items.borrow().clone()).unwrap_or_default();
            let s = match elem {
                Type::Int("rune" | "int32") => items
                    .iter()
                    .map(|item| int(item).map(char_of))
                    .collect::<Result<String, _>>()?,
                _ => {
                    let bytes = items
                        .iter()
                        .map(|item| int(item).map(|b| b as u8))
                        .collect::<Result<Vec<_>, _>>()?;
                    String::from_utf8_lossy(&bytes).into_owned()
                }
            };
            Ok(Value::Str(s))
        }
        (Type::Slice(elem), Value::Str(s)) => {
            let items = match **elem {
                Type::Int("rune" | "int32") => s.chars().map(|c| Value::Int(c as i64)).collect(),
                _ => s.bytes().map(|b| Value::Int(b as i64)).collect(),
            };
            Ok(Value::slice((**elem).clone(), items))
        }
        (ty, value) if value.has_type(ty) => Ok(value),
        (ty, value) => Err(type_error(format!(
            "cannot convert {} to {ty}",
            value.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    let value = match (op, &lhs, &rhs) {
        (Eq, lhs, rhs) => Value::Bool(lhs.equals(rhs)),
        (Ne, lhs, rhs) => Value::Bool(!lhs.equals(rhs)),
        (Div | Rem, Value::Int(_), Value::Int(0)) => return Err(RuntimeError::DivideByZero),
        (_, &Value::Int(a), &Value::Int(b)) => match op {
            Add => Value::Int(a.wrapping_add(b)),
            Sub => Value::Int(a.wrapping_sub(b)),
            Mul => Value::Int(a.wrapping_mul(b)),
            Div => Value::Int(a.wrapping_div(b)),
            Rem => Value::Int(a.wrapping_rem(b)),
            Lt => Value::Bool(a < b),
            Le => Value::Bool(a <= b),
            Gt => Value::Bool(a > b),
            Ge => Value::Bool(a >= b),
            Eq | Ne | And | Or => unreachable!(),
        },
        (Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
        (Lt, Value::Str(a), Value::Str(b)) => Value::Bool(a < b),
        (Le, Value::Str(a), Value::Str(b)) => Value::Bool(a <= b),
        (Gt, Value::Str(a), Value::Str(b)) => Value::Bool(a > b),
        (Ge, Value::Str(a), Value::Str(b)) => Value::Bool(a >= b),
        (op, lhs, rhs) => {
            return Err(type_error(format!(
                "invalid operation: {} {} {}",
                lhs.type_name(),
                op.as_str(),
                rhs.type_name()
            )))
        }
    };
    Ok(value)
}

fn chan_ready(chan: &Value) -> bool {
    match chan {
        Value::Chan {
            chan: Some(chan), ..
        } => {
            let chan = chan.borrow();
            chan.closed || !chan.queue.is_empty()
        }
        _ => false,
    }
}

fn recv_operand(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::Unary {
            op: UnaryOp::Recv,
            expr,
        } => Some(expr),
        Expr::Paren(expr) => recv_operand(expr),
        _ => None,
    }
}

pub(crate) struct Interp<'a> {
    program: &'a Program,
    context: Option<&'a mut Context>,
    out: &'a mut dyn Write,
    // deferred calls of the source functions being executed, innermost last
    defers: Vec<Vec<(Callable, Vec<Value>)>>,
    panicking: Option<String>,
}

impl<'a> Interp<'a> {
    pub fn new(
        program: &'a Program,
        context: Option<&'a mut Context>,
        out: &'a mut dyn Write,
    ) -> Self {
        Self {
            program,
            context,
            out,
            defers: vec![],
            panicking: None,
        }
    }

    fn context(&mut self) -> Result<&mut Context, RuntimeError> {
        self.context.as_deref_mut().ok_or(RuntimeError::NoContext)
    }

    pub fn call(&mut self, func: &Func, args: Vec<Value>) -> Exec<Value> {
        match func {
            Func::Named { package, name } => {
                let program = self.program;
                let function = program
                    .function(*package, name)
                    .ok_or_else(|| RuntimeError::Undefined(name.clone()))?;
                match function.code {
                    Code::Source(ref decl) => {
                        let body = decl.body.as_ref().ok_or_else(|| {
                            RuntimeError::Unsupported(format!("call to {name}, which has no body"))
                        })?;
                        self.call_body(Scope::root(function.unit.clone()), &decl.ty, body, args)
                    }
                    Code::Compiled(ref compiled) => {
                        self.call_compiled(&function.unit, compiled, args)
                    }
                }
            }
            Func::External { path, name } => Ok(stdlib::call(path, name, args, &mut *self.out)?),
            Func::Closure { ty, body, env } => self.call_body(Scope::child(env), ty, body, args),
        }
    }

    fn bind_signature(env: &Env, ty: &FuncType, args: Vec<Value>) {
        for ((name, _), arg) in ty.named_params().zip(args) {
            env.declare(&name.name, arg);
        }
        for (name, ty) in ty.named_results() {
            env.declare(&name.name, Value::zero(&Type::from(ty)));
        }
    }

    fn results(env: &Env, ty: &FuncType, flow: Flow) -> Exec<Value> {
        match flow {
            Flow::Return(Some(value)) => return Ok(value),
            Flow::Return(None) | Flow::Next => {}
            Flow::Break(_) | Flow::Continue(_) | Flow::Fallthrough => {
                return Err(type_error("branch statement outside of its target").into())
            }
        }
        let mut values: Vec<Value> = if ty.named_results().next().is_some() {
            ty.named_results()
                .map(|(name, ty)| {
                    env.get(&name.name)
                        .unwrap_or_else(|| Value::zero(&Type::from(ty)))
                })
                .collect()
        } else {
            ty.result_types()
                .map(|ty| Value::zero(&Type::from(ty)))
                .collect()
        };
        Ok(match values.len() {
            1 => values.remove(0),
            _ => Value::Tuple(values),
        })
    }

    fn call_body(
        &mut self,
        env: Env,
        ty: &FuncType,
        body: &Block,
        args: Vec<Value>,
    ) -> Exec<Value> {
        Self::bind_signature(&env, ty, args);
        self.defers.push(vec![]);
        let outcome = self.stmts(&env, body);
        let deferred = self.defers.pop().unwrap_or_default();
        let flow = match outcome {
            Err(Signal::Suspend) => return Err(Signal::Suspend),
            outcome => self.unwind(deferred, outcome)?,
        };
        Self::results(&env, ty, flow)
    }

    // Runs deferred calls; a call to `recover` among them stops a panic.
    fn unwind(&mut self, deferred: Vec<(Callable, Vec<Value>)>, outcome: Exec<Flow>) -> Exec<Flow> {
        if deferred.is_empty() {
            return outcome;
        }
        let panicking = match outcome {
            Err(Signal::Error(RuntimeError::Panic(ref message))) => {
                self.panicking = Some(message.clone());
                true
            }
            _ => false,
        };
        for (callable, args) in deferred.into_iter().rev() {
            self.invoke(callable, args)?;
        }
        let recovered = panicking && self.panicking.is_none();
        self.panicking = None;
        if recovered {
            Ok(Flow::Return(None))
        } else {
            outcome
        }
    }

    fn call_compiled(
        &mut self,
        unit: &Rc<Unit>,
        func: &CompiledFunc,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let index = {
            let context = self.context()?;
            if context.color != func.color {
                return Err(RuntimeError::ColorMismatch {
                    expected: context.color.clone(),
                    found: func.color.clone(),
                }
                .into());
            }
            context.stack.push()
        };

        let env = Scope::root(unit.clone());
        Self::bind_signature(&env, &func.ty, args);
        let prologue = &func.prologue;
        for (name, ty) in &prologue.locals {
            env.declare(name, Value::zero(ty));
        }
        env.declare(&prologue.context, Value::Context);
        env.declare(&prologue.frame, Value::Frame(index));
        if self.context()?.stack.frame(index).ip > 0 {
            for restore in &prologue.restores {
                let value = self
                    .context()?
                    .stack
                    .frame(index)
                    .restore(restore.index, &restore.ty)?;
                env.set(&restore.name, value);
            }
        }

        let outcome = self.stmts(&env, &func.body);

        let context = self.context()?;
        match func.on_exit.action(context.unwinding) {
            ExitAction::Save(slots) => {
                for slot in slots {
                    let value = env.get(&slot.name).unwrap_or(Value::Nil);
                    context.stack.frame_mut(index).set(slot.index, value);
                }
            }
            ExitAction::Pop => context.stack.pop(),
        }
        Self::results(&env, &func.ty, outcome?)
    }

    fn suspend(&mut self, color: Color, args: Vec<Value>) -> Exec<Value> {
        let context = self.context()?;
        if context.color != color {
            return Err(RuntimeError::ColorMismatch {
                expected: context.color.clone(),
                found: color,
            }
            .into());
        }
        let index = context.stack.push();
        let frame = context.stack.frame_mut(index);
        if frame.ip == 0 {
            frame.ip = 1;
            context.yielded = args.into_iter().next();
            context.unwinding = true;
            return Err(Signal::Suspend);
        }
        context.stack.pop();
        Ok(context
            .resume
            .take()
            .unwrap_or_else(|| Value::zero(&color.resume_ty)))
    }

    fn invoke(&mut self, callable: Callable, args: Vec<Value>) -> Exec<Value> {
        match callable {
            Callable::Func(func) => self.call(&func, args),
            Callable::Builtin(name) => self.builtin(name, args),
            Callable::Conversion(ty) => {
                Ok(convert(&ty, args.into_iter().next().unwrap_or(Value::Nil))?)
            }
            Callable::Yield(color) => self.suspend(color, args),
        }
    }

    fn builtin(&mut self, name: &'static str, args: Vec<Value>) -> Exec<Value> {
        let arg = |index: usize| args.get(index).cloned().unwrap_or(Value::Nil);
        let value = match name {
            "len" | "cap" => {
                let len = arg(0)
                    .len()
                    .ok_or_else(|| type_error(format!("invalid argument for {name}")))?;
                Value::Int(len as i64)
            }
            "append" => {
                let mut args = args.into_iter();
                match args.next() {
                    Some(Value::Slice { elem, items }) => {
                        let mut items = items
                            .map(|items| items.borrow().clone())
                            .unwrap_or_default();
                        items.extend(args);
                        Value::slice(elem, items)
                    }
                    Some(Value::Nil) | None => Value::slice(Type::Any, args.collect()),
                    Some(other) => {
                        return Err(type_error(format!("cannot append to {}", other.type_name())).into())
                    }
                }
            }
            "clear" => {
                match arg(0) {
                    Value::Map {
                        entries: Some(entries),
                        ..
                    } => entries.borrow_mut().clear(),
                    Value::Slice {
                        elem,
                        items: Some(items),
                    } => items.borrow_mut().fill(Value::zero(&elem)),
                    _ => {}
                }
                Value::unit()
            }
            "close" => {
                let Value::Chan {
                    chan: Some(chan), ..
                } = arg(0)
                else {
                    return Err(RuntimeError::Panic("close of nil channel".to_owned()).into());
                };
                let mut chan = chan.borrow_mut();
                if chan.closed {
                    return Err(RuntimeError::Panic("close of closed channel".to_owned()).into());
                }
                chan.closed = true;
                Value::unit()
            }
            "copy" => {
                let src = match arg(1) {
                    Value::Str(s) => s.bytes().map(|b| Value::Int(b as i64)).collect(),
                    src => src.items().unwrap_or_default(),
                };
                let Value::Slice {
                    items: Some(dst), ..
                } = arg(0)
                else {
                    return Ok(Value::Int(0));
                };
                let mut dst = dst.borrow_mut();
                let n = dst.len().min(src.len());
                dst[..n].clone_from_slice(&src[..n]);
                Value::Int(n as i64)
            }
            "delete" => {
                if let Value::Map {
                    entries: Some(entries),
                    ..
                } = arg(0)
                {
                    let key = arg(1);
                    entries.borrow_mut().retain(|(k, _)| !k.equals(&key));
                }
                Value::unit()
            }
            "max" | "min" => {
                let mut best = arg(0);
                for value in args.iter().skip(1) {
                    let op = if name == "max" { BinaryOp::Gt } else { BinaryOp::Lt };
                    if boolean(&binary(op, value.clone(), best.clone())?)? {
                        best = value.clone();
                    }
                }
                best
            }
            "panic" => return Err(RuntimeError::Panic(arg(0).to_string()).into()),
            "print" | "println" => {
                // like Go, these write to standard error
                let s = if name == "println" {
                    stdlib::sprintln(&args)
                } else {
                    args.iter().map(Value::to_string).collect()
                };
                eprint!("{s}");
                Value::unit()
            }
            "recover" => self.panicking.take().map_or(Value::Nil, Value::Str),
            _ => return Err(RuntimeError::Undefined(name.to_owned()).into()),
        };
        Ok(value)
    }

    fn make(&mut self, env: &Env, args: &[Expr]) -> Exec<Value> {
        let ty = type_of(args.first().ok_or_else(|| type_error("missing argument to make"))?)?;
        let value = match ty {
            Type::Slice(elem) => {
                let len = match args.get(1) {
                    Some(len) => int(&self.eval(env, len)?)?,
                    None => 0,
                };
                let len = usize::try_from(len)
                    .map_err(|_| RuntimeError::Panic("makeslice: len out of range".to_owned()))?;
                Value::slice((*elem).clone(), vec![Value::zero(&elem); len])
            }
            Type::Map(key, value) => Value::map(*key, *value, vec![]),
            Type::Chan(elem) => Value::chan(*elem),
            ty => return Err(type_error(format!("cannot make {ty}")).into()),
        };
        Ok(value)
    }

    fn is_yield(env: &Env, expr: &Expr) -> bool {
        match expr {
            Expr::Selector { base, field } => {
                field == "Yield" && env.import(base) == Some(&ImportTarget::Coroutine)
            }
            Expr::Paren(expr) => Self::is_yield(env, expr),
            _ => false,
        }
    }

    fn callee(&mut self, env: &Env, expr: &Expr) -> Exec<Callable> {
        let callable = match expr {
            Expr::Paren(expr) => return self.callee(env, expr),
            Expr::Ident(ident) if !env.contains(&ident.name) => {
                let name = ident.name.as_str();
                if self.program.function(env.unit.package, name).is_some() {
                    Callable::Func(Func::Named {
                        package: env.unit.package,
                        name: name.to_owned(),
                    })
                } else if let Some(builtin) = builtin(name) {
                    Callable::Builtin(builtin)
                } else if let Some(ty) = PRIMITIVE_TYPES.get(name) {
                    Callable::Conversion(ty.clone())
                } else {
                    return Err(RuntimeError::Undefined(name.to_owned()).into());
                }
            }
            Expr::Index { base, indices } if Self::is_yield(env, base) => match &indices[..] {
                [yield_ty, resume_ty] => Callable::Yield(Color {
                    yield_ty: type_of(yield_ty)?,
                    resume_ty: type_of(resume_ty)?,
                }),
                _ => return Err(type_error("Yield takes two type arguments").into()),
            },
            Expr::TypeLit(ty) => Callable::Conversion(Type::from(ty)),
            expr => match self.eval(env, expr)? {
                Value::Func(func) => Callable::Func(func),
                Value::Nil => {
                    return Err(RuntimeError::Panic(
                        "invalid memory address or nil pointer dereference".to_owned(),
                    )
                    .into())
                }
                value => {
                    return Err(
                        type_error(format!("cannot call {}", value.type_name())).into(),
                    )
                }
            },
        };
        Ok(callable)
    }

    fn args(&mut self, env: &Env, call: &CallExpr) -> Exec<Vec<Value>> {
        let mut args = call
            .args
            .iter()
            .map(|arg| self.eval(env, arg))
            .collect::<Exec<Vec<_>>>()?;
        // f(g()) with g returning several values
        if let [Value::Tuple(_)] = args.as_slice() {
            if let Some(Value::Tuple(values)) = args.pop() {
                args = values;
            }
        }
        if call.ellipsis {
            if let Some(last) = args.pop() {
                args.extend(last.items().unwrap_or_default());
            }
        }
        Ok(args)
    }

    fn call_expr(&mut self, env: &Env, call: &CallExpr) -> Exec<Value> {
        if let Some(ident) = call.func.as_ident() {
            let shadowed = env.contains(&ident.name)
                || self.program.function(env.unit.package, &ident.name).is_some();
            match ident.name.as_str() {
                "make" if !shadowed => return self.make(env, &call.args),
                "new" if !shadowed => return Err(RuntimeError::Unsupported("new".to_owned()).into()),
                _ => {}
            }
        }
        let callable = self.callee(env, &call.func)?;
        let args = self.args(env, call)?;
        self.invoke(callable, args)
    }

    fn recv(&mut self, chan: &Value) -> Exec<(Value, bool)> {
        let Value::Chan {
            elem,
            chan: Some(chan),
        } = chan
        else {
            return Err(RuntimeError::Deadlock.into());
        };
        let mut chan = chan.borrow_mut();
        match chan.queue.pop_front() {
            Some(value) => Ok((value, true)),
            None if chan.closed => Ok((Value::zero(elem), false)),
            None => Err(RuntimeError::Deadlock.into()),
        }
    }

    fn send(&mut self, chan: &Value, value: Value) -> Exec<()> {
        let Value::Chan {
            chan: Some(chan), ..
        } = chan
        else {
            return Err(RuntimeError::Deadlock.into());
        };
        let mut chan = chan.borrow_mut();
        if chan.closed {
            return Err(RuntimeError::Panic("send on closed channel".to_owned()).into());
        }
        chan.queue.push_back(value);
        Ok(())
    }

    fn eval(&mut self, env: &Env, expr: &Expr) -> Exec<Value> {
        let value = match expr {
            Expr::Ident(ident) => match env.get(&ident.name) {
                Some(value) => value,
                None if self.program.function(env.unit.package, &ident.name).is_some() => {
                    Value::Func(Func::Named {
                        package: env.unit.package,
                        name: ident.name.clone(),
                    })
                }
                None => match ident.name.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "nil" => Value::Nil,
                    name => return Err(RuntimeError::Undefined(name.to_owned()).into()),
                },
            },
            Expr::Lit(Lit::Int(n)) => Value::Int(*n),
            Expr::Lit(Lit::Str(s)) => Value::Str(s.clone()),
            Expr::Lit(Lit::Char(c)) => Value::Int(*c as i64),
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => {
                let lhs = boolean(&self.eval(env, lhs)?)?;
                if lhs == (*op == BinaryOp::Or) {
                    Value::Bool(lhs)
                } else {
                    Value::Bool(boolean(&self.eval(env, rhs)?)?)
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(env, lhs)?;
                let rhs = self.eval(env, rhs)?;
                binary(*op, lhs, rhs)?
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(env, expr)?;
                match op {
                    UnaryOp::Neg => Value::Int(int(&value)?.wrapping_neg()),
                    UnaryOp::Not => Value::Bool(!boolean(&value)?),
                    UnaryOp::Recv => self.recv(&value)?.0,
                }
            }
            Expr::Call(call) => self.call_expr(env, call)?,
            Expr::Index { base, indices } => {
                let [index] = &indices[..] else {
                    return Err(RuntimeError::Unsupported("generic instantiation".to_owned()).into());
                };
                let base = self.eval(env, base)?;
                let index = self.eval(env, index)?;
                self.index(&base, &index)?.0
            }
            Expr::Selector { base, field } => match env.import(base) {
                Some(ImportTarget::Package(package)) => Value::Func(Func::Named {
                    package: *package,
                    name: field.clone(),
                }),
                Some(ImportTarget::External(path)) => Value::Func(Func::External {
                    path: path.clone(),
                    name: field.clone(),
                }),
                Some(ImportTarget::Coroutine) => {
                    return Err(RuntimeError::Unsupported(format!("coroutine.{field} as a value")).into())
                }
                None => match (self.eval(env, base)?, field.as_str()) {
                    (Value::Frame(index), "IP") => {
                        Value::Int(self.context()?.stack.frame(index).ip)
                    }
                    (value, field) => {
                        return Err(type_error(format!(
                            "{} has no field or method {field}",
                            value.type_name()
                        ))
                        .into())
                    }
                },
            },
            Expr::TypeAssert { expr, ty: Some(ty) } => {
                let value = self.eval(env, expr)?;
                let ty = Type::from(ty);
                if !Self::matches_type(&value, &ty) {
                    return Err(RuntimeError::Panic(format!(
                        "interface conversion: interface {{}} is {}, not {ty}",
                        value.type_name()
                    ))
                    .into());
                }
                value
            }
            Expr::TypeAssert { ty: None, .. } => {
                return Err(type_error("use of .(type) outside type switch").into())
            }
            Expr::Composite { ty, elems } => self.composite(env, ty, elems)?,
            Expr::TypeLit(ty) => {
                return Err(type_error(format!("{} is not an expression", Type::from(ty))).into())
            }
            Expr::FuncLit { ty, body } => Value::Func(Func::Closure {
                ty: ty.clone(),
                body: Rc::new(body.clone()),
                env: env.clone(),
            }),
            Expr::Paren(expr) => self.eval(env, expr)?,
        };
        Ok(value)
    }

    // the element and whether a map contained it
    fn index(&mut self, base: &Value, index: &Value) -> Exec<(Value, bool)> {
        let value = match base {
            Value::Slice {
                items: Some(items), ..
            } => {
                let items = items.borrow();
                items[index_in(index, items.len())?].clone()
            }
            Value::Slice { items: None, .. } => {
                return Err(RuntimeError::IndexOutOfRange {
                    index: int(index)?,
                    len: 0,
                }
                .into())
            }
            Value::Array(items) => items[index_in(index, items.len())?].clone(),
            Value::Str(s) => Value::Int(s.as_bytes()[index_in(index, s.len())?] as i64),
            Value::Map { value, entries, .. } => {
                let found = entries
                    .as_ref()
                    .and_then(|entries| map_get(&entries.borrow(), index));
                return Ok(match found {
                    Some(found) => (found, true),
                    None => (Value::zero(value), false),
                });
            }
            value => {
                return Err(type_error(format!("cannot index {}", value.type_name())).into())
            }
        };
        Ok((value, true))
    }

    /// Whether a dynamic value is of type `ty`, for assertions and type
    /// switches.
    fn matches_type(value: &Value, ty: &Type) -> bool {
        match (value, ty) {
            (Value::Error(_), Type::Named { package: None, name }) => name == "error",
            (_, Type::Named { .. }) => false,
            (Value::Nil, _) => false,
            (value, ty) => value.has_type(ty),
        }
    }

    fn composite(&mut self, env: &Env, ty: &ast::Type, elems: &[Element]) -> Exec<Value> {
        let ty = Type::from(ty);
        match ty {
            Type::Slice(ref elem) | Type::Array(_, ref elem) => {
                let fixed = match ty {
                    Type::Array(len, _) => Some(len),
                    _ => None,
                };
                let mut items = vec![Value::zero(elem); fixed.unwrap_or(0)];
                let mut next = 0;
                for element in elems {
                    if let Some(key) = &element.key {
                        next = index_in(&self.eval(env, key)?, usize::MAX)?;
                    }
                    let value = self.eval(env, &element.value)?;
                    if next >= items.len() {
                        if let Some(len) = fixed {
                            return Err(RuntimeError::IndexOutOfRange {
                                index: next as i64,
                                len,
                            }
                            .into());
                        }
                        items.resize(next + 1, Value::zero(elem));
                    }
                    items[next] = value;
                    next += 1;
                }
                Ok(match fixed {
                    Some(_) => Value::Array(items),
                    None => Value::slice((**elem).clone(), items),
                })
            }
            Type::Map(key, value) => {
                let mut entries = vec![];
                for element in elems {
                    let Some(k) = &element.key else {
                        return Err(type_error("missing key in map literal").into());
                    };
                    let k = self.eval(env, k)?;
                    let v = self.eval(env, &element.value)?;
                    map_insert(&mut entries, k, v);
                }
                Ok(Value::map(*key, *value, entries))
            }
            ty => Err(RuntimeError::Unsupported(format!("composite literal of type {ty}")).into()),
        }
    }

    // the value and the comma-ok flag of `m[k]`, `x.(T)` and `<-ch`
    fn comma_ok(&mut self, env: &Env, expr: &Expr) -> Exec<Option<(Value, bool)>> {
        let result = match expr {
            Expr::Paren(expr) => return self.comma_ok(env, expr),
            Expr::Index { base, indices } if indices.len() == 1 => {
                let base = self.eval(env, base)?;
                if !matches!(base, Value::Map { .. }) {
                    return Ok(None);
                }
                let index = self.eval(env, &indices[0])?;
                self.index(&base, &index)?
            }
            Expr::TypeAssert { expr, ty: Some(ty) } => {
                let value = self.eval(env, expr)?;
                let ty = Type::from(ty);
                if Self::matches_type(&value, &ty) {
                    (value, true)
                } else {
                    (Value::zero(&ty), false)
                }
            }
            Expr::Unary {
                op: UnaryOp::Recv,
                expr,
            } => {
                let chan = self.eval(env, expr)?;
                self.recv(&chan)?
            }
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    fn assign(&mut self, env: &Env, lhs: &Expr, value: Value) -> Exec<()> {
        match lhs {
            Expr::Ident(ident) if ident.is_blank() => {}
            Expr::Ident(ident) => {
                if !env.set(&ident.name, value) {
                    return Err(RuntimeError::Undefined(ident.name.clone()).into());
                }
            }
            Expr::Paren(expr) => self.assign(env, expr, value)?,
            Expr::Index { base: target, indices } if indices.len() == 1 => {
                let base = self.eval(env, target)?;
                let index = self.eval(env, &indices[0])?;
                match base {
                    Value::Slice {
                        items: Some(items), ..
                    } => {
                        let mut items = items.borrow_mut();
                        let i = index_in(&index, items.len())?;
                        items[i] = value;
                    }
                    Value::Slice { items: None, .. } => {
                        return Err(RuntimeError::IndexOutOfRange {
                            index: int(&index)?,
                            len: 0,
                        }
                        .into())
                    }
                    Value::Map {
                        entries: Some(entries),
                        ..
                    } => map_insert(&mut entries.borrow_mut(), index, value),
                    Value::Map { entries: None, .. } => return Err(RuntimeError::NilMap.into()),
                    Value::Array(mut items) => {
                        let i = index_in(&index, items.len())?;
                        items[i] = value;
                        // arrays are values: store the updated copy back
                        self.assign(env, target, Value::Array(items))?;
                    }
                    base => {
                        return Err(type_error(format!(
                            "cannot assign to an element of {}",
                            base.type_name()
                        ))
                        .into())
                    }
                }
            }
            Expr::Selector { base, field } if field == "IP" => match self.eval(env, base)? {
                Value::Frame(index) => {
                    self.context()?.stack.frame_mut(index).ip = int(&value)?;
                }
                base => {
                    return Err(type_error(format!("{} has no field IP", base.type_name())).into())
                }
            },
            _ => return Err(RuntimeError::Unsupported("assignment target".to_owned()).into()),
        }
        Ok(())
    }

    fn bind(&mut self, env: &Env, lhs: &[Expr], define: bool, values: Vec<Value>) -> Exec<()> {
        if lhs.len() != values.len() {
            return Err(type_error(format!(
                "assignment mismatch: {} variables but {} values",
                lhs.len(),
                values.len()
            ))
            .into());
        }
        for (lhs, value) in lhs.iter().zip(values) {
            match lhs.as_ident() {
                Some(ident) if define => env.define(&ident.name, value),
                _ => self.assign(env, lhs, value)?,
            }
        }
        Ok(())
    }

    fn assign_stmt(&mut self, env: &Env, lhs: &[Expr], op: AssignOp, rhs: &[Expr]) -> Exec<()> {
        if let AssignOp::Op(op) = op {
            let (lhs, rhs) = (&lhs[0], &rhs[0]);
            let value = binary(op, self.eval(env, lhs)?, self.eval(env, rhs)?)?;
            return self.assign(env, lhs, value);
        }
        let values = match rhs {
            [expr] if lhs.len() == 2 => match self.comma_ok(env, expr)? {
                Some((value, ok)) => vec![value, Value::Bool(ok)],
                None => self.eval(env, expr)?.into_values(),
            },
            [expr] if lhs.len() > 2 => self.eval(env, expr)?.into_values(),
            rhs => rhs
                .iter()
                .map(|expr| self.eval(env, expr))
                .collect::<Exec<Vec<_>>>()?,
        };
        self.bind(env, lhs, op == AssignOp::Define, values)
    }

    fn stmts(&mut self, env: &Env, stmts: &[Stmt]) -> Exec<Flow> {
        for stmt in stmts {
            match self.stmt(env, stmt, None)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn block(&mut self, env: &Env, block: &[Stmt]) -> Exec<Flow> {
        self.stmts(&Scope::child(env), block)
    }

    fn stmt(&mut self, env: &Env, stmt: &Stmt, label: Option<&str>) -> Exec<Flow> {
        match &stmt.kind {
            StmtKind::Empty => {}
            StmtKind::Expr(expr) => {
                self.eval(env, expr)?;
            }
            StmtKind::Send { chan, value } => {
                let chan = self.eval(env, chan)?;
                let value = self.eval(env, value)?;
                self.send(&chan, value)?;
            }
            StmtKind::IncDec { expr, inc } => {
                let n = int(&self.eval(env, expr)?)?;
                let delta = if *inc { 1 } else { -1 };
                self.assign(env, expr, Value::Int(n.wrapping_add(delta)))?;
            }
            StmtKind::Assign { lhs, op, rhs } => self.assign_stmt(env, lhs, *op, rhs)?,
            StmtKind::Var { names, ty, values } => {
                let values = match values[..] {
                    [] => {
                        let ty = ty.as_ref().map_or(Type::Any, Type::from);
                        vec![Value::zero(&ty); names.len()]
                    }
                    [ref expr] if names.len() > 1 => self.eval(env, expr)?.into_values(),
                    ref values => values
                        .iter()
                        .map(|expr| self.eval(env, expr))
                        .collect::<Exec<Vec<_>>>()?,
                };
                for (name, value) in names.iter().zip(values) {
                    env.declare(&name.name, value);
                }
            }
            StmtKind::Go(_) => {
                return Err(RuntimeError::Unsupported("go statements".to_owned()).into())
            }
            StmtKind::Defer(expr) => {
                let Expr::Call(call) = expr else {
                    return Err(type_error("expression in defer must be a function call").into());
                };
                let callable = self.callee(env, &call.func)?;
                let args = self.args(env, call)?;
                match self.defers.last_mut() {
                    Some(defers) => defers.push((callable, args)),
                    None => return Err(type_error("defer outside of a function").into()),
                }
            }
            StmtKind::Return(exprs) => {
                let value = match &exprs[..] {
                    [] => None,
                    [expr] => Some(self.eval(env, expr)?),
                    exprs => Some(Value::Tuple(
                        exprs
                            .iter()
                            .map(|expr| self.eval(env, expr))
                            .collect::<Exec<Vec<_>>>()?,
                    )),
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Branch { kind, label } => {
                return match kind {
                    BranchKind::Break => Ok(Flow::Break(label.clone())),
                    BranchKind::Continue => Ok(Flow::Continue(label.clone())),
                    BranchKind::Fallthrough => Ok(Flow::Fallthrough),
                    BranchKind::Goto => Err(RuntimeError::Unsupported("goto".to_owned()).into()),
                };
            }
            StmtKind::Block(body) => return self.block(env, body),
            StmtKind::Labeled { label, stmt } => {
                let flow = self.stmt(env, stmt, Some(label.as_str()))?;
                return Ok(consume_break(flow, Some(label.as_str())));
            }
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                let scope = Scope::child(env);
                if let Some(init) = init {
                    self.stmt(&scope, init, None)?;
                }
                return if boolean(&self.eval(&scope, cond)?)? {
                    self.block(&scope, body)
                } else if let Some(els) = els {
                    self.stmt(&scope, els, None)
                } else {
                    Ok(Flow::Next)
                };
            }
            StmtKind::Switch { init, tag, cases } => {
                let scope = Scope::child(env);
                if let Some(init) = init {
                    self.stmt(&scope, init, None)?;
                }
                let tag = match tag {
                    Some(tag) => self.eval(&scope, tag)?,
                    None => Value::Bool(true),
                };
                let mut chosen = None;
                'cases: for (i, case) in cases.iter().enumerate() {
                    let Some(exprs) = &case.exprs else {
                        continue;
                    };
                    for expr in exprs {
                        if self.eval(&scope, expr)?.equals(&tag) {
                            chosen = Some(i);
                            break 'cases;
                        }
                    }
                }
                let chosen = chosen.or_else(|| cases.iter().position(|case| case.exprs.is_none()));
                return match chosen {
                    Some(i) => self.cases(&scope, &cases[i..], label),
                    None => Ok(Flow::Next),
                };
            }
            StmtKind::TypeSwitch {
                init,
                guard,
                cases,
            } => return self.type_switch(env, init.as_deref(), guard, cases, label),
            StmtKind::Select(clauses) => return self.select(env, clauses, label),
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                let scope = Scope::child(env);
                if let Some(init) = init {
                    self.stmt(&scope, init, None)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !boolean(&self.eval(&scope, cond)?)? {
                            break;
                        }
                    }
                    let flow = self.block(&scope, body)?;
                    if let Some(flow) = after_iteration(flow, label) {
                        return Ok(flow);
                    }
                    if let Some(post) = post {
                        self.stmt(&scope, post, None)?;
                    }
                }
            }
            StmtKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => {
                let iterable = self.eval(env, expr)?;
                let mut iter = RangeIter::new(iterable)?;
                while let Some((k, v)) = self.range_next(&mut iter)? {
                    let scope = Scope::child(env);
                    let mut lhs = vec![];
                    let mut values = vec![];
                    if let Some(key) = key {
                        lhs.push(key.clone());
                        values.push(k);
                    }
                    if let (Some(value), Some(v)) = (value, v) {
                        lhs.push(value.clone());
                        values.push(v);
                    }
                    self.bind(&scope, &lhs, *define, values)?;
                    let flow = self.stmts(&scope, body)?;
                    if let Some(flow) = after_iteration(flow, label) {
                        return Ok(flow);
                    }
                }
            }
        }
        Ok(Flow::Next)
    }

    fn range_next(&mut self, iter: &mut RangeIter) -> Exec<Option<(Value, Option<Value>)>> {
        match iter {
            RangeIter::Pairs(pairs) => Ok(pairs.next()),
            RangeIter::Chan(chan) => {
                let (value, ok) = self.recv(chan)?;
                Ok(ok.then_some((value, None)))
            }
        }
    }

    // runs switch clauses from the chosen one on, following fallthroughs
    fn cases(&mut self, env: &Env, cases: &[CaseClause], label: Option<&str>) -> Exec<Flow> {
        for case in cases {
            match self.block(env, &case.body)? {
                Flow::Fallthrough => continue,
                flow => return Ok(consume_break(flow, label)),
            }
        }
        Ok(Flow::Next)
    }

    fn type_switch(
        &mut self,
        env: &Env,
        init: Option<&Stmt>,
        guard: &Stmt,
        cases: &[CaseClause],
        label: Option<&str>,
    ) -> Exec<Flow> {
        let scope = Scope::child(env);
        if let Some(init) = init {
            self.stmt(&scope, init, None)?;
        }
        let (binding, operand) = match &guard.kind {
            StmtKind::Assign { lhs, rhs, .. } => (lhs.first().and_then(Expr::as_ident), rhs.first()),
            StmtKind::Expr(expr) => (None, Some(expr)),
            _ => (None, None),
        };
        let Some(Expr::TypeAssert { expr, ty: None }) = operand else {
            return Err(type_error("malformed type switch guard").into());
        };
        let value = self.eval(&scope, expr)?;
        let mut chosen = None;
        'cases: for case in cases {
            let Some(exprs) = &case.exprs else {
                continue;
            };
            for expr in exprs {
                let matched = match expr.as_ident() {
                    Some(ident) if ident.name == "nil" => value.is_nil(),
                    _ => Self::matches_type(&value, &type_of(expr)?),
                };
                if matched {
                    chosen = Some(case);
                    break 'cases;
                }
            }
        }
        let Some(case) = chosen.or_else(|| cases.iter().find(|case| case.exprs.is_none())) else {
            return Ok(Flow::Next);
        };
        let case_scope = Scope::child(&scope);
        if let Some(binding) = binding {
            case_scope.declare(&binding.name, value);
        }
        let flow = self.stmts(&case_scope, &case.body)?;
        Ok(consume_break(flow, label))
    }

    // The first ready clause runs; with none ready, the default clause.
    fn select(&mut self, env: &Env, clauses: &[CommClause], label: Option<&str>) -> Exec<Flow> {
        let mut default = None;
        for clause in clauses {
            let Some(comm) = &clause.comm else {
                default = Some(clause);
                continue;
            };
            let scope = Scope::child(env);
            let ready = match &comm.kind {
                StmtKind::Send { chan, value } => {
                    let chan = self.eval(env, chan)?;
                    let ready = matches!(chan, Value::Chan { chan: Some(_), .. });
                    if ready {
                        let value = self.eval(env, value)?;
                        self.send(&chan, value)?;
                    }
                    ready
                }
                StmtKind::Expr(expr) => {
                    let Some(operand) = recv_operand(expr) else {
                        return Err(type_error("select case must be a send or receive").into());
                    };
                    let chan = self.eval(env, operand)?;
                    let ready = chan_ready(&chan);
                    if ready {
                        self.recv(&chan)?;
                    }
                    ready
                }
                StmtKind::Assign { lhs, op, rhs } => {
                    let Some(operand) = rhs.first().and_then(recv_operand) else {
                        return Err(type_error("select case must be a send or receive").into());
                    };
                    let chan = self.eval(env, operand)?;
                    let ready = chan_ready(&chan);
                    if ready {
                        let (value, ok) = self.recv(&chan)?;
                        let values = [value, Value::Bool(ok)].into_iter().take(lhs.len()).collect();
                        self.bind(&scope, lhs, *op == AssignOp::Define, values)?;
                    }
                    ready
                }
                _ => return Err(type_error("select case must be a send or receive").into()),
            };
            if ready {
                let flow = self.stmts(&scope, &clause.body)?;
                return Ok(consume_break(flow, label));
            }
        }
        match default {
            Some(clause) => {
                let flow = self.block(env, &clause.body)?;
                Ok(consume_break(flow, label))
            }
            None => Err(RuntimeError::Deadlock.into()),
        }
    }
}

/// The pairs a range loop visits. Channels are received from lazily.
enum RangeIter {
    Pairs(std::vec::IntoIter<(Value, Option<Value>)>),
    Chan(Value),
}

impl RangeIter {
    fn new(iterable: Value) -> Result<Self, RuntimeError> {
        let pairs: Vec<(Value, Option<Value>)> = match iterable {
            Value::Int(n) => (0..n).map(|i| (Value::Int(i), None)).collect(),
            Value::Str(s) => s
                .char_indices()
                .map(|(i, c)| (Value::Int(i as i64), Some(Value::Int(c as i64))))
                .collect(),
            Value::Map { .. } => iterable
                .sorted_entries()
                .into_iter()
                .map(|(k, v)| (k, Some(v)))
                .collect(),
            chan @ Value::Chan { .. } => return Ok(RangeIter::Chan(chan)),
            iterable => match iterable.items() {
                Some(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| (Value::Int(i as i64), Some(item)))
                    .collect(),
                None => {
                    return Err(type_error(format!(
                        "cannot range over {}",
                        iterable.type_name()
                    )))
                }
            },
        };
        Ok(RangeIter::Pairs(pairs.into_iter()))
    }
}
