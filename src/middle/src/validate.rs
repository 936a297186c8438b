//! Rejects colored functions that use constructs the dispatch compiler cannot
//! lower. The first offending construct, in source order, is reported.

use {
    crate::{check::FuncInfo, types::Type, Analysis},
    derive_more::Display,
    frontend::{
        ast::{BranchKind, Expr, FuncDecl, Stmt, StmtKind},
        visit::{walk_expr, Visitor},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Unsupported {
    #[display("defer")]
    Defer,
    #[display("go")]
    Go,
    #[display("labels not attached to for/switch/select")]
    Label,
    #[display("select")]
    Select,
    #[display("type switch")]
    TypeSwitch,
    #[display("inline decls")]
    InlineDecl,
    #[display("multiple assign")]
    MultipleAssign,
    #[display("assign to non-ident")]
    AssignToNonIdent,
    #[display("goto")]
    Goto,
    #[display("fallthrough")]
    Fallthrough,
    #[display("for range {_0}")]
    RangeOver(Type),
    #[display("for post inc/dec {_0}")]
    PostIncDec(&'static str),
    #[display("for post {_0}")]
    Post(&'static str),
    #[display("func literals")]
    FuncLit,
    #[display("multiple function calls in an expression")]
    MultipleCalls,
    // the condition runs again when a suspended body resumes
    #[display("suspending call in condition")]
    SuspendingCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{func}: not implemented: {unsupported}")]
pub struct ValidationError {
    pub func: String,
    pub unsupported: Unsupported,
}

impl std::error::Error for ValidationError {}

fn expr_kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::Ident(_) => "identifier",
        Expr::Lit(_) => "literal",
        Expr::Binary { .. } => "binary expression",
        Expr::Unary { .. } => "unary expression",
        Expr::Call(_) => "call expression",
        Expr::Index { .. } => "index expression",
        Expr::Selector { .. } => "selector expression",
        Expr::TypeAssert { .. } => "type assertion",
        Expr::Composite { .. } => "composite literal",
        Expr::TypeLit(_) => "type",
        Expr::FuncLit { .. } => "function literal",
        Expr::Paren(_) => "parenthesized expression",
    }
}

fn stmt_kind(stmt: &Stmt) -> &'static str {
    match stmt.kind {
        StmtKind::Empty => "empty statement",
        StmtKind::Expr(_) => "expression statement",
        StmtKind::Send { .. } => "send statement",
        StmtKind::IncDec { .. } => "inc/dec statement",
        StmtKind::Assign { .. } => "assignment",
        StmtKind::Var { .. } => "declaration",
        StmtKind::Go(_) => "go statement",
        StmtKind::Defer(_) => "defer statement",
        StmtKind::Return(_) => "return statement",
        StmtKind::Branch { .. } => "branch statement",
        StmtKind::Block(_) => "block",
        StmtKind::Labeled { .. } => "labeled statement",
        StmtKind::If { .. } => "if statement",
        StmtKind::Switch { .. } => "switch statement",
        StmtKind::TypeSwitch { .. } => "type switch statement",
        StmtKind::Select(_) => "select statement",
        StmtKind::For { .. } => "for statement",
        StmtKind::Range { .. } => "range statement",
    }
}

struct CallCounter<'a> {
    info: &'a FuncInfo,
    calls: usize,
    func_lit: bool,
}

impl Visitor for CallCounter<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Call(call) => {
                if self.info.callee(call).map_or(true, |callee| callee.is_counted()) {
                    self.calls += 1;
                }
            }
            Expr::FuncLit { .. } => self.func_lit = true,
            _ => {}
        }
        walk_expr(self, expr);
    }
}

// Finds calls that may suspend.
struct Suspends<'a> {
    info: &'a FuncInfo,
    analysis: &'a Analysis,
    found: bool,
}

impl Visitor for Suspends<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::Call(call) = expr {
            if let Some(callee) = self.info.callee(call) {
                self.found |= self.analysis.suspends(callee);
            }
        }
        walk_expr(self, expr);
    }
}

struct Validator<'a> {
    info: &'a FuncInfo,
    analysis: &'a Analysis,
}

type Result = std::result::Result<(), Unsupported>;

impl Validator<'_> {
    fn suspends(&self, visit: impl FnOnce(&mut Suspends<'_>)) -> bool {
        let mut suspends = Suspends {
            info: self.info,
            analysis: self.analysis,
            found: false,
        };
        visit(&mut suspends);
        suspends.found
    }

    fn exprs_suspend<'e>(&self, exprs: impl IntoIterator<Item = &'e Expr>) -> bool {
        self.suspends(|suspends| {
            for expr in exprs {
                suspends.visit_expr(expr);
            }
        })
    }

    fn stmts_suspend<'s>(&self, blocks: impl IntoIterator<Item = &'s [Stmt]>) -> bool {
        self.suspends(|suspends| {
            for block in blocks {
                for stmt in block {
                    suspends.visit_stmt(stmt);
                }
            }
        })
    }

    fn expr(&self, expr: &Expr) -> Result {
        let mut counter = CallCounter {
            info: self.info,
            calls: 0,
            func_lit: false,
        };
        counter.visit_expr(expr);
        if counter.calls > 1 {
            return Err(Unsupported::MultipleCalls);
        }
        if counter.func_lit {
            return Err(Unsupported::FuncLit);
        }
        Ok(())
    }

    fn exprs<'e>(&self, exprs: impl IntoIterator<Item = &'e Expr>) -> Result {
        exprs.into_iter().try_for_each(|expr| self.expr(expr))
    }

    fn stmts(&self, stmts: &[Stmt]) -> Result {
        stmts.iter().try_for_each(|stmt| self.stmt(stmt))
    }

    fn stmt(&self, stmt: &Stmt) -> Result {
        match &stmt.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Expr(expr) | StmtKind::IncDec { expr, .. } => self.expr(expr),
            StmtKind::Send { chan, value } => self.exprs([chan, value]),
            StmtKind::Assign { lhs, rhs, .. } => {
                if lhs.len() != 1 || rhs.len() != 1 {
                    return Err(Unsupported::MultipleAssign);
                }
                if lhs[0].as_ident().is_none() {
                    return Err(Unsupported::AssignToNonIdent);
                }
                self.exprs(lhs.iter().chain(rhs))
            }
            StmtKind::Var { .. } => Err(Unsupported::InlineDecl),
            StmtKind::Go(_) => Err(Unsupported::Go),
            StmtKind::Defer(_) => Err(Unsupported::Defer),
            StmtKind::Return(values) => self.exprs(values),
            StmtKind::Branch { kind, .. } => match kind {
                BranchKind::Break | BranchKind::Continue => Ok(()),
                BranchKind::Goto => Err(Unsupported::Goto),
                BranchKind::Fallthrough => Err(Unsupported::Fallthrough),
            },
            StmtKind::Block(body) => self.stmts(body),
            StmtKind::Labeled { stmt, .. } => match stmt.kind {
                StmtKind::For { .. }
                | StmtKind::Range { .. }
                | StmtKind::Switch { .. }
                | StmtKind::TypeSwitch { .. }
                | StmtKind::Select(_) => self.stmt(stmt),
                _ => Err(Unsupported::Label),
            },
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                if let Some(init) = init {
                    self.stmt(init)?;
                }
                self.expr(cond)?;
                let branches = [body.as_slice()]
                    .into_iter()
                    .chain(els.as_deref().map(std::slice::from_ref));
                if self.exprs_suspend([cond]) && self.stmts_suspend(branches)
                {
                    return Err(Unsupported::SuspendingCondition);
                }
                self.stmts(body)?;
                match els {
                    Some(els) => self.stmt(els),
                    None => Ok(()),
                }
            }
            StmtKind::Switch { init, tag, cases } => {
                if let Some(init) = init {
                    self.stmt(init)?;
                }
                self.exprs(tag)?;
                let guards = tag
                    .iter()
                    .chain(cases.iter().flat_map(|case| case.exprs.iter().flatten()));
                if self.exprs_suspend(guards)
                    && self.stmts_suspend(cases.iter().map(|case| case.body.as_slice()))
                {
                    return Err(Unsupported::SuspendingCondition);
                }
                for case in cases {
                    self.exprs(case.exprs.iter().flatten())?;
                    self.stmts(&case.body)?;
                }
                Ok(())
            }
            StmtKind::TypeSwitch { .. } => Err(Unsupported::TypeSwitch),
            StmtKind::Select(_) => Err(Unsupported::Select),
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                match post.as_deref() {
                    None => {}
                    Some(Stmt {
                        kind: StmtKind::IncDec { expr, .. },
                        ..
                    }) => {
                        if !matches!(expr, Expr::Ident(_)) {
                            return Err(Unsupported::PostIncDec(expr_kind(expr)));
                        }
                    }
                    Some(post) => return Err(Unsupported::Post(stmt_kind(post))),
                }
                if let Some(init) = init {
                    self.stmt(init)?;
                }
                self.exprs(cond)?;
                if self.exprs_suspend(cond) && self.stmts_suspend([body.as_slice()]) {
                    return Err(Unsupported::SuspendingCondition);
                }
                self.stmts(body)
            }
            StmtKind::Range {
                key,
                value,
                expr,
                body,
                ..
            } => {
                match self.info.range_types.get(&stmt.id) {
                    Some(Type::Slice(_) | Type::Array(..)) => {}
                    Some(ty) => return Err(Unsupported::RangeOver(ty.clone())),
                    None => return Err(Unsupported::RangeOver(Type::Any)),
                }
                self.exprs(key.iter().chain(value))?;
                self.expr(expr)?;
                self.stmts(body)
            }
        }
    }
}

/// Checks that the body of a colored function only uses supported
/// constructs.
pub fn validate(
    func: &FuncDecl,
    info: &FuncInfo,
    analysis: &Analysis,
) -> std::result::Result<(), ValidationError> {
    let validator = Validator { info, analysis };
    validator
        .stmts(func.body.as_deref().unwrap_or_default())
        .map_err(|unsupported| ValidationError {
            func: func.name.clone(),
            unsupported,
        })
}
