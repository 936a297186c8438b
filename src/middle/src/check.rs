//! Name resolution and type inference for function bodies.
//!
//! Every function of every loaded package gets a [`FuncInfo`] describing its
//! declarations, what each identifier refers to, and what each call invokes.
//! The call graph, the validator and the backend all read from it.

use {
    crate::types::{Color, Signature, Type, PRIMITIVE_TYPES},
    derive_more::Display,
    frontend::ast::{
        AssignOp, BinaryOp, BranchKind, CallExpr, Expr, File, FuncDecl, Ident, Lit, NodeId,
        Package, Stmt, StmtKind, UnaryOp,
    },
    std::{collections::BTreeMap, path::Path},
};

pub const COROUTINE_PACKAGE: &str = "github.com/stealthrocket/coroutine";

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CheckError {
    #[display("{func}: undefined: {name}")]
    Undefined { func: String, name: String },
    #[display("{name} redeclared in package {package}")]
    Redeclared { package: String, name: String },
    #[display("{func}: {message}")]
    Invalid { func: String, message: String },
}

impl std::error::Error for CheckError {}

type Result<T> = std::result::Result<T, CheckError>;

/// Index of a function in the [`FuncTable`], over all loaded packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncId(pub usize);

/// Index of a declaration in [`FuncInfo::decls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeclId(pub usize);

#[derive(Debug, Clone)]
pub struct FuncEntry {
    pub package: usize,
    pub name: String,
    pub signature: Signature,
    pub has_body: bool,
}

/// Every function declared by the loaded packages.
#[derive(Debug)]
pub struct FuncTable {
    entries: Vec<FuncEntry>,
    by_name: BTreeMap<(usize, String), FuncId>,
    package_names: Vec<String>,
    dir_names: Vec<Option<String>>,
}

impl FuncTable {
    pub fn new(packages: &[Package]) -> Result<Self> {
        let mut entries = vec![];
        let mut by_name = BTreeMap::new();
        for (package_index, package) in packages.iter().enumerate() {
            for (_, func) in package.funcs() {
                let id = FuncId(entries.len());
                if by_name
                    .insert((package_index, func.name.clone()), id)
                    .is_some()
                {
                    return Err(CheckError::Redeclared {
                        package: package.name.clone(),
                        name: func.name.clone(),
                    });
                }
                entries.push(FuncEntry {
                    package: package_index,
                    name: func.name.clone(),
                    signature: Signature::from(&func.ty),
                    has_body: func.body.is_some(),
                });
            }
        }
        let dir_names = packages
            .iter()
            .map(|package| {
                package
                    .dir
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_owned)
            })
            .collect();
        Ok(Self {
            entries,
            by_name,
            package_names: packages.iter().map(|package| package.name.clone()).collect(),
            dir_names,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: FuncId) -> &FuncEntry {
        &self.entries[id.0]
    }

    /// `package.Func`, for diagnostics.
    pub fn qualified_name(&self, id: FuncId) -> String {
        let entry = self.get(id);
        format!("{}.{}", self.package_names[entry.package], entry.name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &FuncEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (FuncId(i), entry))
    }

    pub fn lookup(&self, package: usize, name: &str) -> Option<FuncId> {
        self.by_name.get(&(package, name.to_owned())).copied()
    }

    /// Maps an import path onto a loaded package by its last path element.
    pub fn resolve_import(&self, path: &str) -> Option<usize> {
        if path == COROUTINE_PACKAGE {
            return None;
        }
        let last = Path::new(path).file_name()?.to_str()?;
        self.dir_names
            .iter()
            .position(|name| name.as_deref() == Some(last))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Param,
    Result,
    Local,
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub ident: NodeId,
    pub ty: Type,
    pub kind: DeclKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Local(DeclId),
    Func(FuncId),
    // an import, by path
    Import(String),
    Builtin(&'static str),
    Type(Type),
    Const(Type),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Func(FuncId),
    Yield(Color),
    // a call through a function value
    Dynamic(Signature),
    External { path: String, name: String },
    Builtin(&'static str),
    Conversion(Type),
}

impl Callee {
    /// Builtins, conversions and `unsafe` intrinsics do not count as calls
    /// when limiting calls per expression.
    pub fn is_counted(&self) -> bool {
        match self {
            Callee::Builtin(_) | Callee::Conversion(_) => false,
            Callee::External { path, .. } => path != "unsafe",
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub func: FuncId,
    pub decls: Vec<Decl>,
    pub uses: BTreeMap<NodeId, Binding>,
    pub calls: BTreeMap<NodeId, Callee>,
    // keyed by the id of the range statement
    pub range_types: BTreeMap<NodeId, Type>,
    pub address_taken: Vec<FuncId>,
}

impl FuncInfo {
    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.0]
    }

    pub fn binding(&self, ident: &Ident) -> Option<&Binding> {
        self.uses.get(&ident.id)
    }

    pub fn local(&self, ident: &Ident) -> Option<DeclId> {
        match self.binding(ident) {
            Some(&Binding::Local(decl)) => Some(decl),
            _ => None,
        }
    }

    pub fn callee(&self, call: &CallExpr) -> Option<&Callee> {
        self.calls.get(&call.id)
    }
}

static BUILTINS: &[&str] = &[
    "append", "cap", "clear", "close", "copy", "delete", "len", "make", "max", "min", "new",
    "panic", "print", "println", "recover",
];

fn universe(name: &str) -> Option<Binding> {
    if let Some(&builtin) = BUILTINS.iter().find(|&&builtin| builtin == name) {
        return Some(Binding::Builtin(builtin));
    }
    match name {
        "true" | "false" => Some(Binding::Const(Type::Bool)),
        "nil" => Some(Binding::Const(Type::Nil)),
        _ => PRIMITIVE_TYPES.get(name).cloned().map(Binding::Type),
    }
}

/// Result types of the few standard library functions the runtime provides.
pub fn external_result(path: &str, name: &str) -> Type {
    match (path, name) {
        ("fmt", "Sprint" | "Sprintf" | "Sprintln")
        | ("strconv", "Itoa")
        | ("strings", "Repeat" | "ToUpper" | "ToLower" | "TrimSpace" | "Join") => Type::String,
        ("fmt", "Print" | "Printf" | "Println") => Type::Tuple(vec![Type::int(), Type::error()]),
        ("fmt", "Errorf") | ("errors", "New") => Type::error(),
        ("strings", "Contains" | "HasPrefix" | "HasSuffix") => Type::Bool,
        ("unsafe", "Sizeof" | "Alignof" | "Offsetof") => Type::Int("uintptr"),
        _ => Type::Any,
    }
}

struct Target {
    label: Option<String>,
    is_loop: bool,
}

struct Checker<'a> {
    table: &'a FuncTable,
    package: usize,
    func_name: &'a str,
    imports: BTreeMap<String, String>,
    scopes: Vec<BTreeMap<String, Binding>>,
    targets: Vec<Target>,
    info: FuncInfo,
}

impl<'a> Checker<'a> {
    fn invalid(&self, message: impl Into<String>) -> CheckError {
        CheckError::Invalid {
            func: self.func_name.to_owned(),
            message: message.into(),
        }
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        for scope in self.scopes.iter().rev() {
            if let Some(binding) = scope.get(name) {
                return Some(binding.clone());
            }
        }
        if let Some(func) = self.table.lookup(self.package, name) {
            return Some(Binding::Func(func));
        }
        if let Some(path) = self.imports.get(name) {
            return Some(Binding::Import(path.clone()));
        }
        universe(name)
    }

    fn resolve(&mut self, ident: &Ident) -> Result<Binding> {
        let binding = self
            .lookup(&ident.name)
            .ok_or_else(|| CheckError::Undefined {
                func: self.func_name.to_owned(),
                name: ident.name.clone(),
            })?;
        self.info.uses.insert(ident.id, binding.clone());
        Ok(binding)
    }

    fn declare(&mut self, ident: &Ident, ty: Type, kind: DeclKind) {
        if ident.is_blank() {
            return;
        }
        let id = DeclId(self.info.decls.len());
        self.info.decls.push(Decl {
            name: ident.name.clone(),
            ident: ident.id,
            ty,
            kind,
        });
        self.info.uses.insert(ident.id, Binding::Local(id));
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(ident.name.clone(), Binding::Local(id));
        }
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(BTreeMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn targeted<T>(
        &mut self,
        label: Option<&str>,
        is_loop: bool,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.targets.push(Target {
            label: label.map(str::to_owned),
            is_loop,
        });
        let result = f(self);
        self.targets.pop();
        result
    }

    // the import path when `expr` names an imported package
    fn package_ref(&mut self, expr: &Expr) -> Result<Option<String>> {
        let Expr::Ident(ident) = expr else {
            return Ok(None);
        };
        match self.lookup(&ident.name) {
            Some(Binding::Import(path)) => {
                self.resolve(ident)?;
                Ok(Some(path))
            }
            _ => Ok(None),
        }
    }

    // the type denoted by `expr`, if it denotes one
    fn type_expr(&mut self, expr: &Expr) -> Result<Option<Type>> {
        match expr {
            Expr::Ident(ident) => match self.lookup(&ident.name) {
                Some(Binding::Type(ty)) => {
                    self.resolve(ident)?;
                    Ok(Some(ty))
                }
                _ => Ok(None),
            },
            Expr::TypeLit(ty) => Ok(Some(Type::from(ty))),
            Expr::Paren(expr) => self.type_expr(expr),
            _ => Ok(None),
        }
    }

    fn type_arg(&mut self, expr: &Expr) -> Result<Type> {
        if let Some(ty) = self.type_expr(expr)? {
            return Ok(ty);
        }
        if let Expr::Selector { base, field } = expr {
            if let Some(package) = base.as_ident().map(|ident| ident.name.clone()) {
                if self.package_ref(base)?.is_some() {
                    return Ok(Type::Named {
                        package: Some(package),
                        name: field.clone(),
                    });
                }
            }
        }
        Err(self.invalid(format!("{expr} is not a type")))
    }

    fn is_yield(&mut self, expr: &Expr) -> Result<bool> {
        match expr {
            Expr::Selector { base, field } if field == "Yield" => {
                Ok(self.package_ref(base)?.as_deref() == Some(COROUTINE_PACKAGE))
            }
            _ => Ok(false),
        }
    }

    fn func_value(&mut self, func: FuncId) -> Type {
        self.info.address_taken.push(func);
        Type::Func(self.table.get(func).signature.clone())
    }

    fn expr(&mut self, expr: &Expr) -> Result<Type> {
        match expr {
            Expr::Ident(ident) => {
                if ident.is_blank() {
                    return Err(self.invalid("cannot use _ as value"));
                }
                match self.resolve(ident)? {
                    Binding::Local(decl) => Ok(self.info.decl(decl).ty.clone()),
                    Binding::Func(func) => Ok(self.func_value(func)),
                    Binding::Const(ty) => Ok(ty),
                    Binding::Import(_) | Binding::Builtin(_) | Binding::Type(_) => {
                        Err(self.invalid(format!("{} is not an expression", ident.name)))
                    }
                }
            }
            Expr::Lit(lit) => Ok(match lit {
                Lit::Int(_) => Type::int(),
                Lit::Str(_) => Type::String,
                Lit::Char(_) => Type::Int("rune"),
            }),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.value(lhs)?;
                let rhs = self.value(rhs)?;
                Ok(if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
                    Type::Bool
                } else if lhs == Type::int() && rhs.is_int() {
                    // an untyped constant takes the type of the other operand
                    rhs
                } else {
                    lhs
                })
            }
            Expr::Unary { op, expr } => {
                let ty = self.value(expr)?;
                match op {
                    UnaryOp::Neg => Ok(ty),
                    UnaryOp::Not => Ok(Type::Bool),
                    UnaryOp::Recv => match ty {
                        Type::Chan(elem) => Ok(*elem),
                        ty => Err(self.invalid(format!("cannot receive from {ty}"))),
                    },
                }
            }
            Expr::Call(call) => self.call(call),
            Expr::Index { base, indices } => {
                let ty = self.value(base)?;
                for index in indices {
                    self.value(index)?;
                }
                match ty {
                    Type::String => Ok(Type::Int("byte")),
                    Type::Chan(_) => Err(self.invalid(format!("cannot index {ty}"))),
                    ty => match ty.elem() {
                        Some(elem) => Ok(elem.clone()),
                        None => Err(self.invalid(format!("cannot index {ty}"))),
                    },
                }
            }
            Expr::Selector { base, field } => match self.package_ref(base)? {
                Some(path) => match self.table.resolve_import(&path) {
                    Some(package) => match self.table.lookup(package, field) {
                        Some(func) => Ok(self.func_value(func)),
                        None => Err(CheckError::Undefined {
                            func: self.func_name.to_owned(),
                            name: format!("{base}.{field}"),
                        }),
                    },
                    None => Ok(Type::Any),
                },
                None => Err(self.invalid(format!("unsupported selector {expr}"))),
            },
            Expr::TypeAssert { expr, ty } => {
                self.value(expr)?;
                match ty {
                    Some(ty) => Ok(Type::from(ty)),
                    None => Err(self.invalid("use of .(type) outside type switch")),
                }
            }
            Expr::Composite { ty, elems } => {
                for elem in elems {
                    if let Some(key) = &elem.key {
                        self.value(key)?;
                    }
                    self.value(&elem.value)?;
                }
                Ok(Type::from(ty))
            }
            Expr::TypeLit(ty) => Err(self.invalid(format!("{ty} is not an expression"))),
            Expr::FuncLit { ty, body } => {
                let targets = std::mem::take(&mut self.targets);
                let result = self.scoped(|checker| {
                    for (name, ty) in ty.named_params().chain(ty.named_results()) {
                        checker.declare(name, Type::from(ty), DeclKind::Local);
                    }
                    checker.stmts(body)
                });
                self.targets = targets;
                result?;
                Ok(Type::Func(Signature::from(ty)))
            }
            Expr::Paren(expr) => self.expr(expr),
        }
    }

    // an expression that must produce exactly one value
    fn value(&mut self, expr: &Expr) -> Result<Type> {
        match self.expr(expr)? {
            Type::Tuple(tys) if tys.is_empty() => {
                Err(self.invalid(format!("{expr} (no value) used as value")))
            }
            Type::Tuple(_) => Err(self.invalid(format!(
                "multiple-value {expr} in single-value context"
            ))),
            ty => Ok(ty),
        }
    }

    fn args(&mut self, call: &CallExpr) -> Result<()> {
        for arg in &call.args {
            self.value(arg)?;
        }
        Ok(())
    }

    fn call(&mut self, call: &CallExpr) -> Result<Type> {
        let (callee, ty) = self.callee(call)?;
        self.info.calls.insert(call.id, callee);
        Ok(ty)
    }

    fn callee(&mut self, call: &CallExpr) -> Result<(Callee, Type)> {
        if let Some(ty) = self.type_expr(&call.func)? {
            self.args(call)?;
            return Ok((Callee::Conversion(ty.clone()), ty));
        }
        match &*call.func {
            Expr::Ident(ident) => match self.resolve(ident)? {
                Binding::Func(func) => {
                    self.args(call)?;
                    let signature = &self.table.get(func).signature;
                    return Ok((Callee::Func(func), signature.result()));
                }
                Binding::Builtin(name) => return self.builtin(name, call),
                _ => {}
            },
            Expr::Index { base, indices } if self.is_yield(base)? => {
                let [yield_ty, resume_ty] = indices.as_slice() else {
                    return Err(self.invalid("coroutine.Yield takes two type arguments"));
                };
                let color = Color {
                    yield_ty: self.type_arg(yield_ty)?,
                    resume_ty: self.type_arg(resume_ty)?,
                };
                if call.args.len() != 1 {
                    return Err(self.invalid("coroutine.Yield takes exactly one argument"));
                }
                self.args(call)?;
                let resume_ty = color.resume_ty.clone();
                return Ok((Callee::Yield(color), resume_ty));
            }
            Expr::Selector { base, field } => {
                if let Some(path) = self.package_ref(base)? {
                    self.args(call)?;
                    if let Some(package) = self.table.resolve_import(&path) {
                        let func = self.table.lookup(package, field).ok_or_else(|| {
                            CheckError::Undefined {
                                func: self.func_name.to_owned(),
                                name: format!("{base}.{field}"),
                            }
                        })?;
                        let signature = &self.table.get(func).signature;
                        return Ok((Callee::Func(func), signature.result()));
                    }
                    let ty = external_result(&path, field);
                    return Ok((
                        Callee::External {
                            path,
                            name: field.clone(),
                        },
                        ty,
                    ));
                }
            }
            _ => {}
        }
        match self.value(&call.func)? {
            Type::Func(signature) => {
                self.args(call)?;
                let ty = signature.result();
                Ok((Callee::Dynamic(signature), ty))
            }
            ty => Err(self.invalid(format!("cannot call non-function {} of type {ty}", call.func))),
        }
    }

    fn builtin(&mut self, name: &'static str, call: &CallExpr) -> Result<(Callee, Type)> {
        let ty = match name {
            "make" => {
                let Some((ty, rest)) = call.args.split_first() else {
                    return Err(self.invalid("missing argument to make"));
                };
                let ty = self.type_arg(ty)?;
                for arg in rest {
                    self.value(arg)?;
                }
                ty
            }
            "new" => return Err(self.invalid("new is not supported")),
            _ => {
                let mut tys = vec![];
                for arg in &call.args {
                    tys.push(self.value(arg)?);
                }
                match name {
                    "len" | "cap" | "copy" => Type::int(),
                    "append" | "min" | "max" => tys
                        .into_iter()
                        .next()
                        .ok_or_else(|| self.invalid(format!("missing argument to {name}")))?,
                    "recover" => Type::Any,
                    _ => Type::unit(),
                }
            }
        };
        Ok((Callee::Builtin(name), ty))
    }

    // types of the values assigned to `n` targets
    fn values(&mut self, exprs: &[Expr], n: usize) -> Result<Vec<Type>> {
        if exprs.len() == n {
            return exprs.iter().map(|expr| self.value(expr)).collect();
        }
        let [expr] = exprs else {
            return Err(self.invalid(format!(
                "assignment mismatch: {n} variables but {} values",
                exprs.len()
            )));
        };
        let comma_ok = matches!(
            expr,
            Expr::Index { .. }
                | Expr::TypeAssert { .. }
                | Expr::Unary {
                    op: UnaryOp::Recv,
                    ..
                }
        );
        let tys = match self.expr(expr)? {
            ty if comma_ok && n == 2 => vec![ty, Type::Bool],
            ty => ty.into_values(),
        };
        if tys.len() != n {
            return Err(self.invalid(format!(
                "assignment mismatch: {n} variables but {expr} returns {} values",
                tys.len()
            )));
        }
        Ok(tys)
    }

    fn assign_target(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Ident(ident) if ident.is_blank() => Ok(()),
            Expr::Ident(_) | Expr::Index { .. } | Expr::Selector { .. } | Expr::Paren(_) => {
                self.expr(expr).map(drop)
            }
            _ => Err(self.invalid(format!("cannot assign to {expr}"))),
        }
    }

    fn define(&mut self, lhs: &[Expr], tys: Vec<Type>) -> Result<()> {
        for (expr, ty) in lhs.iter().zip(tys) {
            let ident = expr
                .as_ident()
                .ok_or_else(|| self.invalid(format!("non-name {expr} on left side of :=")))?;
            let redeclared = self
                .scopes
                .last()
                .and_then(|scope| scope.get(&ident.name))
                .cloned();
            match redeclared {
                Some(binding @ Binding::Local(_)) => {
                    self.info.uses.insert(ident.id, binding);
                }
                _ => self.declare(ident, ty, DeclKind::Local),
            }
        }
        Ok(())
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            self.stmt(stmt, None)?;
        }
        Ok(())
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<()> {
        self.scoped(|checker| checker.stmts(stmts))
    }

    fn branch(&mut self, kind: BranchKind, label: Option<&str>) -> Result<()> {
        let found = match kind {
            BranchKind::Goto => return Ok(()),
            BranchKind::Fallthrough => true,
            BranchKind::Break => self
                .targets
                .iter()
                .any(|target| label.is_none() || target.label.as_deref() == label),
            BranchKind::Continue => self.targets.iter().any(|target| {
                target.is_loop && (label.is_none() || target.label.as_deref() == label)
            }),
        };
        if found {
            return Ok(());
        }
        Err(match label {
            Some(label) => self.invalid(format!(
                "invalid {} label {label}",
                kind.as_str()
            )),
            None => self.invalid(format!("{} is not in a loop", kind.as_str())),
        })
    }

    fn stmt(&mut self, stmt: &Stmt, label: Option<&str>) -> Result<()> {
        match &stmt.kind {
            StmtKind::Empty => {}
            StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => {
                self.expr(expr)?;
            }
            StmtKind::Send { chan, value } => {
                match self.value(chan)? {
                    Type::Chan(_) => {}
                    ty => return Err(self.invalid(format!("cannot send to {ty}"))),
                }
                self.value(value)?;
            }
            StmtKind::IncDec { expr, .. } => {
                self.assign_target(expr)?;
            }
            StmtKind::Assign {
                lhs,
                op: AssignOp::Define,
                rhs,
            } => {
                let tys = self.values(rhs, lhs.len())?;
                self.define(lhs, tys)?;
            }
            StmtKind::Assign { lhs, rhs, .. } => {
                self.values(rhs, lhs.len())?;
                for expr in lhs {
                    self.assign_target(expr)?;
                }
            }
            StmtKind::Var { names, ty, values } => {
                let tys = match ty {
                    Some(ty) => {
                        for value in values {
                            self.value(value)?;
                        }
                        vec![Type::from(ty); names.len()]
                    }
                    None if values.is_empty() => {
                        return Err(self.invalid("missing type or initializer in var declaration"))
                    }
                    None => self.values(values, names.len())?,
                };
                for (name, ty) in names.iter().zip(tys) {
                    self.declare(name, ty, DeclKind::Local);
                }
            }
            StmtKind::Return(values) => match values.as_slice() {
                [value] => {
                    self.expr(value)?;
                }
                values => {
                    for value in values {
                        self.value(value)?;
                    }
                }
            },
            StmtKind::Branch { kind, label } => self.branch(*kind, label.as_deref())?,
            StmtKind::Block(body) => self.block(body)?,
            StmtKind::Labeled { label, stmt } => self.stmt(stmt, Some(label.as_str()))?,
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => self.scoped(|checker| {
                if let Some(init) = init {
                    checker.stmt(init, None)?;
                }
                match checker.value(cond)? {
                    Type::Bool => {}
                    ty => return Err(checker.invalid(format!("non-boolean condition of type {ty}"))),
                }
                checker.block(body)?;
                if let Some(els) = els {
                    checker.stmt(els, None)?;
                }
                Ok(())
            })?,
            StmtKind::Switch { init, tag, cases } => self.scoped(|checker| {
                if let Some(init) = init {
                    checker.stmt(init, None)?;
                }
                if let Some(tag) = tag {
                    checker.value(tag)?;
                }
                checker.targeted(label, false, |checker| {
                    for case in cases {
                        checker.scoped(|checker| {
                            for expr in case.exprs.iter().flatten() {
                                checker.value(expr)?;
                            }
                            checker.stmts(&case.body)
                        })?;
                    }
                    Ok(())
                })
            })?,
            StmtKind::TypeSwitch { init, guard, cases } => self.scoped(|checker| {
                if let Some(init) = init {
                    checker.stmt(init, None)?;
                }
                let (name, operand) = match &guard.kind {
                    StmtKind::Expr(Expr::TypeAssert { expr, .. }) => (None, expr),
                    StmtKind::Assign { lhs, rhs, .. } => match (lhs.as_slice(), rhs.as_slice()) {
                        ([Expr::Ident(name)], [Expr::TypeAssert { expr, .. }]) => (Some(name), expr),
                        _ => return Err(checker.invalid("malformed type switch guard")),
                    },
                    _ => return Err(checker.invalid("malformed type switch guard")),
                };
                let operand_ty = checker.value(operand)?;
                checker.targeted(label, false, |checker| {
                    for case in cases {
                        checker.scoped(|checker| {
                            let mut tys = vec![];
                            for expr in case.exprs.iter().flatten() {
                                tys.push(match expr {
                                    Expr::Ident(ident) if ident.name == "nil" => {
                                        checker.resolve(ident)?;
                                        Type::Nil
                                    }
                                    expr => checker.type_arg(expr)?,
                                });
                            }
                            if let Some(name) = name {
                                let ty = match tys.as_slice() {
                                    [ty] if *ty != Type::Nil => ty.clone(),
                                    _ => operand_ty.clone(),
                                };
                                checker.declare(name, ty, DeclKind::Local);
                            }
                            checker.stmts(&case.body)
                        })?;
                    }
                    Ok(())
                })
            })?,
            StmtKind::Select(clauses) => self.targeted(label, false, |checker| {
                for clause in clauses {
                    checker.scoped(|checker| {
                        if let Some(comm) = &clause.comm {
                            checker.stmt(comm, None)?;
                        }
                        checker.stmts(&clause.body)
                    })?;
                }
                Ok(())
            })?,
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => self.scoped(|checker| {
                if let Some(init) = init {
                    checker.stmt(init, None)?;
                }
                if let Some(cond) = cond {
                    match checker.value(cond)? {
                        Type::Bool => {}
                        ty => {
                            return Err(
                                checker.invalid(format!("non-boolean condition of type {ty}"))
                            )
                        }
                    }
                }
                if let Some(post) = post {
                    checker.stmt(post, None)?;
                }
                checker.targeted(label, true, |checker| checker.block(body))
            })?,
            StmtKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => self.scoped(|checker| {
                let ty = checker.value(expr)?;
                let Some((key_ty, value_ty)) = ty.range_types() else {
                    return Err(checker.invalid(format!("cannot range over {expr} of type {ty}")));
                };
                checker.info.range_types.insert(stmt.id, ty);
                if value.is_some() && value_ty.is_none() {
                    return Err(checker.invalid(format!("range over {expr} permits only one iteration variable")));
                }
                if *define {
                    let vars: Vec<Expr> = key.iter().chain(value).cloned().collect();
                    let tys = std::iter::once(key_ty).chain(value_ty).collect();
                    checker.define(&vars, tys)?;
                } else {
                    for var in key.iter().chain(value) {
                        checker.assign_target(var)?;
                    }
                }
                checker.targeted(label, true, |checker| checker.block(body))
            })?,
        }
        Ok(())
    }
}

/// Resolves and types the body of `func`, declared in `file` of package
/// `package`.
pub fn check_func(
    table: &FuncTable,
    package: usize,
    file: &File,
    func: &FuncDecl,
) -> Result<FuncInfo> {
    let id = table.lookup(package, &func.name).ok_or_else(|| CheckError::Undefined {
        func: func.name.clone(),
        name: func.name.clone(),
    })?;
    let imports = file
        .imports
        .iter()
        .filter(|import| !matches!(import.local_name(), "_" | "."))
        .map(|import| (import.local_name().to_owned(), import.path.clone()))
        .collect();
    let mut checker = Checker {
        table,
        package,
        func_name: &func.name,
        imports,
        scopes: vec![BTreeMap::new()],
        targets: vec![],
        info: FuncInfo {
            func: id,
            decls: vec![],
            uses: BTreeMap::new(),
            calls: BTreeMap::new(),
            range_types: BTreeMap::new(),
            address_taken: vec![],
        },
    };
    for (name, ty) in func.ty.named_params() {
        checker.declare(name, Type::from(ty), DeclKind::Param);
    }
    for (name, ty) in func.ty.named_results() {
        checker.declare(name, Type::from(ty), DeclKind::Result);
    }
    if let Some(body) = &func.body {
        checker.stmts(body)?;
    }
    Ok(checker.info)
}

#[cfg(test)]
mod tests {
    use {super::*, frontend::ast::Package, std::path::PathBuf};

    fn package(src: &str) -> Package {
        let file = File::try_from(src).unwrap();
        Package {
            name: file.package.clone(),
            dir: PathBuf::from("p"),
            files: vec![file],
        }
    }

    fn check(src: &str, name: &str) -> Result<FuncInfo> {
        let package = package(src);
        let table = FuncTable::new(std::slice::from_ref(&package))?;
        let (file, func) = package
            .funcs()
            .find(|(_, func)| func.name == name)
            .unwrap();
        check_func(&table, 0, file, func)
    }

    #[test]
    fn infers_local_types_and_shadowing() {
        let info = check(
            "package p\n\
             func f(n int) {\n\
             \txs := []string{\"a\"}\n\
             \tfor i, x := range xs {\n\
             \t\tn := len(x) + i\n\
             \t\t_ = n\n\
             \t}\n\
             }\n",
            "f",
        )
        .unwrap();
        let decls: Vec<_> = info
            .decls
            .iter()
            .map(|decl| (decl.name.as_str(), decl.ty.to_string(), decl.kind))
            .collect();
        assert_eq!(
            decls,
            [
                ("n", "int".to_owned(), DeclKind::Param),
                ("xs", "[]string".to_owned(), DeclKind::Local),
                ("i", "int".to_owned(), DeclKind::Local),
                ("x", "string".to_owned(), DeclKind::Local),
                ("n", "int".to_owned(), DeclKind::Local),
            ]
        );
    }

    #[test]
    fn classifies_calls() {
        let info = check(
            "package p\n\
             import (\n\
             \t\"fmt\"\n\
             \t\"github.com/stealthrocket/coroutine\"\n\
             )\n\
             func g() int { return 1 }\n\
             func f() {\n\
             \th := g\n\
             \tv := coroutine.Yield[int, string](h())\n\
             \tfmt.Println(len(v), int(v[0]), g())\n\
             }\n",
            "f",
        )
        .unwrap();
        let callees: Vec<_> = info.calls.values().cloned().collect();
        assert_eq!(
            callees,
            [
                Callee::Yield(Color {
                    yield_ty: Type::int(),
                    resume_ty: Type::String,
                }),
                Callee::Dynamic(Signature {
                    params: vec![],
                    results: vec![Type::int()],
                }),
                Callee::External {
                    path: "fmt".to_owned(),
                    name: "Println".to_owned(),
                },
                Callee::Builtin("len"),
                Callee::Conversion(Type::int()),
                Callee::Func(FuncId(0)),
            ]
        );
        assert_eq!(info.address_taken, [FuncId(0)]);
    }

    #[test]
    fn reports_undefined_names() {
        let err = check("package p\nfunc f() {\n\tx = 1\n}\n", "f").unwrap_err();
        assert_eq!(err.to_string(), "f: undefined: x");
    }

    #[test]
    fn checks_branch_targets() {
        let err = check(
            "package p\nfunc f() {\n\tswitch {\n\tdefault:\n\t\tcontinue\n\t}\n}\n",
            "f",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "f: continue is not in a loop");

        check(
            "package p\nfunc f() {\nouter:\n\tfor {\n\t\tswitch {\n\t\tdefault:\n\t\t\tbreak outer\n\t\t}\n\t}\n}\n",
            "f",
        )
        .unwrap();
    }

    #[test]
    fn rejects_duplicate_functions() {
        let package = package("package p\nfunc f()\nfunc f()\n");
        let err = FuncTable::new(std::slice::from_ref(&package)).unwrap_err();
        assert_eq!(err.to_string(), "f redeclared in package p");
    }
}
