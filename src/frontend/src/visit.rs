//! Depth-first traversal over function bodies.
//!
//! Both traits visit nodes in source order. Overriding a method replaces the
//! default recursion for that node; call the matching `walk_*` function to
//! keep descending.

use crate::ast::*;

pub trait Visitor {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_ident(&mut self, _ident: &Ident) {}

    fn visit_type(&mut self, _ty: &Type) {}
}

pub fn walk_block<V: Visitor + ?Sized>(visitor: &mut V, block: &Block) {
    for stmt in block {
        visitor.visit_stmt(stmt);
    }
}

fn walk_func_type<V: Visitor + ?Sized>(visitor: &mut V, ty: &FuncType) {
    for field in ty.params.iter().chain(&ty.results) {
        for name in &field.names {
            visitor.visit_ident(name);
        }
        visitor.visit_type(&field.ty);
    }
}

fn walk_cases<V: Visitor + ?Sized>(visitor: &mut V, cases: &[CaseClause]) {
    for case in cases {
        for expr in case.exprs.iter().flatten() {
            visitor.visit_expr(expr);
        }
        walk_block(visitor, &case.body);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(visitor: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Empty | StmtKind::Branch { .. } => {}
        StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => {
            visitor.visit_expr(expr)
        }
        StmtKind::Send { chan, value } => {
            visitor.visit_expr(chan);
            visitor.visit_expr(value);
        }
        StmtKind::IncDec { expr, .. } => visitor.visit_expr(expr),
        StmtKind::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter().chain(rhs) {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::Var { names, ty, values } => {
            for name in names {
                visitor.visit_ident(name);
            }
            if let Some(ty) = ty {
                visitor.visit_type(ty);
            }
            for value in values {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Return(values) => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Block(body) => walk_block(visitor, body),
        StmtKind::Labeled { stmt, .. } => visitor.visit_stmt(stmt),
        StmtKind::If {
            init,
            cond,
            body,
            els,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            visitor.visit_expr(cond);
            walk_block(visitor, body);
            if let Some(els) = els {
                visitor.visit_stmt(els);
            }
        }
        StmtKind::Switch { init, tag, cases } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(tag) = tag {
                visitor.visit_expr(tag);
            }
            walk_cases(visitor, cases);
        }
        StmtKind::TypeSwitch { init, guard, cases } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            visitor.visit_stmt(guard);
            walk_cases(visitor, cases);
        }
        StmtKind::Select(clauses) => {
            for clause in clauses {
                if let Some(comm) = &clause.comm {
                    visitor.visit_stmt(comm);
                }
                walk_block(visitor, &clause.body);
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(cond) = cond {
                visitor.visit_expr(cond);
            }
            if let Some(post) = post {
                visitor.visit_stmt(post);
            }
            walk_block(visitor, body);
        }
        StmtKind::Range {
            key,
            value,
            expr,
            body,
            ..
        } => {
            for var in key.iter().chain(value) {
                visitor.visit_expr(var);
            }
            visitor.visit_expr(expr);
            walk_block(visitor, body);
        }
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Ident(ident) => visitor.visit_ident(ident),
        Expr::Lit(_) => {}
        Expr::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        Expr::Unary { expr, .. } | Expr::Paren(expr) => visitor.visit_expr(expr),
        Expr::Call(call) => {
            visitor.visit_expr(&call.func);
            for arg in &call.args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Index { base, indices } => {
            visitor.visit_expr(base);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        Expr::Selector { base, .. } => visitor.visit_expr(base),
        Expr::TypeAssert { expr, ty } => {
            visitor.visit_expr(expr);
            if let Some(ty) = ty {
                visitor.visit_type(ty);
            }
        }
        Expr::Composite { ty, elems } => {
            visitor.visit_type(ty);
            for elem in elems {
                if let Some(key) = &elem.key {
                    visitor.visit_expr(key);
                }
                visitor.visit_expr(&elem.value);
            }
        }
        Expr::TypeLit(ty) => visitor.visit_type(ty),
        Expr::FuncLit { ty, body } => {
            walk_func_type(visitor, ty);
            walk_block(visitor, body);
        }
    }
}

pub trait VisitorMut {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }

    fn visit_ident(&mut self, _ident: &mut Ident) {}
}

pub fn walk_block_mut<V: VisitorMut + ?Sized>(visitor: &mut V, block: &mut Block) {
    for stmt in block {
        visitor.visit_stmt(stmt);
    }
}

fn walk_cases_mut<V: VisitorMut + ?Sized>(visitor: &mut V, cases: &mut [CaseClause]) {
    for case in cases {
        for expr in case.exprs.iter_mut().flatten() {
            visitor.visit_expr(expr);
        }
        walk_block_mut(visitor, &mut case.body);
    }
}

pub fn walk_stmt_mut<V: VisitorMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Empty | StmtKind::Branch { .. } => {}
        StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => {
            visitor.visit_expr(expr)
        }
        StmtKind::Send { chan, value } => {
            visitor.visit_expr(chan);
            visitor.visit_expr(value);
        }
        StmtKind::IncDec { expr, .. } => visitor.visit_expr(expr),
        StmtKind::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter_mut().chain(rhs) {
                visitor.visit_expr(expr);
            }
        }
        StmtKind::Var { names, values, .. } => {
            for name in names {
                visitor.visit_ident(name);
            }
            for value in values {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Return(values) => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Block(body) => walk_block_mut(visitor, body),
        StmtKind::Labeled { stmt, .. } => visitor.visit_stmt(stmt),
        StmtKind::If {
            init,
            cond,
            body,
            els,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            visitor.visit_expr(cond);
            walk_block_mut(visitor, body);
            if let Some(els) = els {
                visitor.visit_stmt(els);
            }
        }
        StmtKind::Switch { init, tag, cases } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(tag) = tag {
                visitor.visit_expr(tag);
            }
            walk_cases_mut(visitor, cases);
        }
        StmtKind::TypeSwitch { init, guard, cases } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            visitor.visit_stmt(guard);
            walk_cases_mut(visitor, cases);
        }
        StmtKind::Select(clauses) => {
            for clause in clauses {
                if let Some(comm) = &mut clause.comm {
                    visitor.visit_stmt(comm);
                }
                walk_block_mut(visitor, &mut clause.body);
            }
        }
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                visitor.visit_stmt(init);
            }
            if let Some(cond) = cond {
                visitor.visit_expr(cond);
            }
            if let Some(post) = post {
                visitor.visit_stmt(post);
            }
            walk_block_mut(visitor, body);
        }
        StmtKind::Range {
            key,
            value,
            expr,
            body,
            ..
        } => {
            for var in key.iter_mut().chain(value) {
                visitor.visit_expr(var);
            }
            visitor.visit_expr(expr);
            walk_block_mut(visitor, body);
        }
    }
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match expr {
        Expr::Ident(ident) => visitor.visit_ident(ident),
        Expr::Lit(_) | Expr::TypeLit(_) => {}
        Expr::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        Expr::Unary { expr, .. } | Expr::Paren(expr) => visitor.visit_expr(expr),
        Expr::Call(call) => {
            visitor.visit_expr(&mut call.func);
            for arg in &mut call.args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Index { base, indices } => {
            visitor.visit_expr(base);
            for index in indices {
                visitor.visit_expr(index);
            }
        }
        Expr::Selector { base, .. } | Expr::TypeAssert { expr: base, .. } => {
            visitor.visit_expr(base)
        }
        Expr::Composite { elems, .. } => {
            for elem in elems {
                if let Some(key) = &mut elem.key {
                    visitor.visit_expr(key);
                }
                visitor.visit_expr(&mut elem.value);
            }
        }
        Expr::FuncLit { ty, body } => {
            for field in ty.params.iter_mut().chain(&mut ty.results) {
                for name in &mut field.names {
                    visitor.visit_ident(name);
                }
            }
            walk_block_mut(visitor, body);
        }
    }
}

struct Renumber {
    next: u32,
}

impl Renumber {
    fn fresh(&mut self) -> NodeId {
        self.next += 1;
        NodeId(self.next)
    }
}

impl VisitorMut for Renumber {
    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        stmt.id = self.fresh();
        walk_stmt_mut(self, stmt);
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        if let Expr::Call(call) = expr {
            call.id = self.fresh();
        }
        walk_expr_mut(self, expr);
    }

    fn visit_ident(&mut self, ident: &mut Ident) {
        ident.id = self.fresh();
    }
}

// ids start at 1 so that the default id never aliases a numbered node
pub(crate) fn renumber(func: &mut FuncDecl) {
    let mut renumber = Renumber { next: 0 };
    for field in func.ty.params.iter_mut().chain(&mut func.ty.results) {
        for name in &mut field.names {
            renumber.visit_ident(name);
        }
    }
    if let Some(body) = &mut func.body {
        walk_block_mut(&mut renumber, body);
    }
}
