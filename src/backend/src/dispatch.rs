//! Rewrites statement lists into instruction-pointer guarded dispatch blocks.
//!
//! A list of several statements becomes a tagless switch with one case per
//! statement, guarded by `_f.IP < end`. Every case but the last records its
//! end in the frame and falls through to the next one, so that resuming
//! with a saved instruction pointer skips every statement that already
//! completed. Loop bodies reset the instruction pointer to the start of the
//! loop when an iteration finishes.

use {
    crate::{names::Namer, spans::Spans},
    frontend::ast::{BinaryOp, Block, BranchKind, CaseClause, Expr, Stmt, StmtKind},
    velcro::vec,
};

struct Target {
    // the source label, or one allocated for the first branch that needs it
    label: Option<String>,
    is_loop: bool,
    start: i64,
}

pub struct Dispatcher<'a> {
    pub spans: &'a Spans,
    pub namer: &'a mut Namer,
    pub frame: &'a str,
    targets: Vec<Target>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(spans: &'a Spans, namer: &'a mut Namer, frame: &'a str) -> Self {
        Self {
            spans,
            namer,
            frame,
            targets: vec![],
        }
    }

    fn ip(&self) -> Expr {
        Expr::selector(Expr::ident(self.frame), "IP")
    }

    fn set_ip(&self, value: i64) -> Stmt {
        StmtKind::assign(self.ip(), Expr::int(value)).into()
    }

    pub fn block(&mut self, block: Block) -> Block {
        if block.len() <= 1 {
            return block
                .into_iter()
                .flat_map(|stmt| Vec::from(self.stmt(stmt)))
                .collect();
        }
        let last = block.len() - 1;
        let cases = block
            .into_iter()
            .enumerate()
            .map(|(i, stmt)| {
                let end = self.spans.get(&stmt).end;
                let guard = Expr::binary(BinaryOp::Lt, self.ip(), Expr::int(end));
                let compiled = Vec::from(self.stmt(stmt));
                let body = if i == last {
                    compiled
                } else {
                    let fallthrough = Stmt::from(StmtKind::Branch {
                        kind: BranchKind::Fallthrough,
                        label: None,
                    });
                    vec![..compiled, self.set_ip(end), fallthrough]
                };
                CaseClause {
                    exprs: Some(vec![guard]),
                    body,
                }
            })
            .collect();
        vec![Stmt::from(StmtKind::Switch {
            init: None,
            tag: None,
            cases,
        })]
    }

    fn stmt(&mut self, stmt: Stmt) -> Stmt {
        match stmt.kind {
            StmtKind::Empty
            | StmtKind::Expr(_)
            | StmtKind::Send { .. }
            | StmtKind::IncDec { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Return(_) => stmt,
            StmtKind::Branch { kind, label } => self.branch(kind, label),
            StmtKind::Block(body) => StmtKind::Block(self.block(body)).into(),
            StmtKind::If {
                init: None,
                cond,
                body,
                els,
            } => StmtKind::If {
                init: None,
                cond,
                body: self.block(body),
                els: els.map(|els| Box::new(self.stmt(*els))),
            }
            .into(),
            StmtKind::Labeled { label, stmt: inner } => self.target(Some(label), *inner),
            StmtKind::Switch { init: None, .. } | StmtKind::For { init: None, .. } => {
                self.target(None, stmt)
            }
            kind => unreachable!("statement not lowered before dispatch: {kind:?}"),
        }
    }

    // a statement that `break` or `continue` may refer to
    fn target(&mut self, label: Option<String>, stmt: Stmt) -> Stmt {
        let start = self.spans.get(&stmt).start;
        self.targets.push(Target {
            label,
            is_loop: matches!(stmt.kind, StmtKind::For { .. }),
            start,
        });
        let compiled: Stmt = match stmt.kind {
            StmtKind::For {
                init: None,
                cond,
                post,
                body,
            } => StmtKind::For {
                init: None,
                cond,
                post,
                body: vec![..self.block(body), self.set_ip(start)],
            }
            .into(),
            StmtKind::Switch {
                init: None,
                tag,
                cases,
            } => StmtKind::Switch {
                init: None,
                tag,
                cases: cases
                    .into_iter()
                    .map(|case| CaseClause {
                        exprs: case.exprs,
                        body: self.block(case.body),
                    })
                    .collect(),
            }
            .into(),
            kind => unreachable!("label on unsupported statement: {kind:?}"),
        };
        match self.targets.pop().and_then(|target| target.label) {
            Some(label) => StmtKind::Labeled {
                label,
                stmt: Box::new(compiled),
            }
            .into(),
            None => compiled,
        }
    }

    // Dispatch blocks are switches, so every branch names its target
    // explicitly.
    fn branch(&mut self, kind: BranchKind, label: Option<String>) -> Stmt {
        let index = self.targets.iter().rposition(|target| match label {
            Some(ref label) => target.label.as_ref() == Some(label),
            None => kind == BranchKind::Break || target.is_loop,
        });
        let Some(index) = index else {
            unreachable!("{} without a target", kind.as_str());
        };
        let target = &mut self.targets[index];
        let label = target
            .label
            .get_or_insert_with(|| self.namer.fresh("_l"))
            .clone();
        let branch = StmtKind::Branch {
            kind,
            label: Some(label),
        };
        match kind {
            BranchKind::Continue => {
                let start = target.start;
                StmtKind::Block(vec![self.set_ip(start), Stmt::from(branch)]).into()
            }
            _ => branch.into(),
        }
    }
}
