//! Rewrites that leave only the statement forms the dispatch compiler knows:
//! `for`, `if` and `switch` lose their init statements, and `range` loops
//! over slices and arrays become counted loops.

use {
    crate::names::Namer,
    frontend::ast::{BinaryOp, Block, Expr, Stmt, StmtKind},
};

pub struct Desugarer<'a> {
    pub namer: &'a mut Namer,
}

// `init` runs once, in a block enclosing `stmt`
fn hoist(init: Option<Box<Stmt>>, stmt: Stmt) -> Stmt {
    match init {
        Some(init) => StmtKind::Block(vec![*init, stmt]).into(),
        None => stmt,
    }
}

impl Desugarer<'_> {
    pub fn block(&mut self, block: Block) -> Block {
        block.into_iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn stmt(&mut self, stmt: Stmt) -> Stmt {
        self.labeled(None, stmt)
    }

    fn labeled(&mut self, label: Option<String>, stmt: Stmt) -> Stmt {
        let relabel = |stmt: Stmt| match label.clone() {
            Some(label) => StmtKind::Labeled {
                label,
                stmt: Box::new(stmt),
            }
            .into(),
            None => stmt,
        };
        match stmt.kind {
            StmtKind::Labeled { label, stmt } => self.labeled(Some(label), *stmt),
            StmtKind::Block(body) => relabel(StmtKind::Block(self.block(body)).into()),
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                let stmt = StmtKind::If {
                    init: None,
                    cond,
                    body: self.block(body),
                    els: els.map(|els| Box::new(self.stmt(*els))),
                };
                hoist(init, relabel(stmt.into()))
            }
            StmtKind::Switch { init, tag, cases } => {
                let cases = cases
                    .into_iter()
                    .map(|mut case| {
                        case.body = self.block(case.body);
                        case
                    })
                    .collect();
                let stmt = StmtKind::Switch {
                    init: None,
                    tag,
                    cases,
                };
                hoist(init, relabel(stmt.into()))
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                let stmt = StmtKind::For {
                    init: None,
                    cond,
                    post,
                    body: self.block(body),
                };
                hoist(init, relabel(stmt.into()))
            }
            StmtKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => {
                let range = self.namer.fresh("_r");
                let index = self.namer.fresh("_i");
                let bind = |var: Expr, value: Expr| -> Option<Stmt> {
                    let blank = var.as_ident().is_some_and(|ident| ident.is_blank());
                    (!blank).then(|| {
                        if define {
                            StmtKind::define(var, value).into()
                        } else {
                            StmtKind::assign(var, value).into()
                        }
                    })
                };
                let prelude = key
                    .and_then(|key| bind(key, Expr::ident(&index)))
                    .into_iter()
                    .chain(value.and_then(|value| {
                        bind(
                            value,
                            Expr::index(Expr::ident(&range), vec![Expr::ident(&index)]),
                        )
                    }));
                let body = prelude.chain(self.block(body)).collect();
                let core = StmtKind::For {
                    init: None,
                    cond: Some(Expr::binary(
                        BinaryOp::Lt,
                        Expr::ident(&index),
                        Expr::call(Expr::ident("len"), vec![Expr::ident(&range)]),
                    )),
                    post: Some(Box::new(
                        StmtKind::IncDec {
                            expr: Expr::ident(&index),
                            inc: true,
                        }
                        .into(),
                    )),
                    body,
                };
                StmtKind::Block(vec![
                    StmtKind::define(Expr::ident(&range), expr).into(),
                    StmtKind::define(Expr::ident(&index), Expr::int(0)).into(),
                    relabel(core.into()),
                ])
                .into()
            }
            kind => relabel(Stmt { id: stmt.id, kind }),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, frontend::ast::File};

    fn desugar(src: &str) -> String {
        let mut file = File::try_from(src).unwrap();
        let func = &mut file.funcs[0];
        let mut namer = Namer::new(func);
        let body = func.body.take().unwrap();
        func.body = Some(Desugarer { namer: &mut namer }.block(body));
        func.to_string()
    }

    #[test]
    fn hoists_init_statements() {
        assert_eq!(
            desugar(
                "package p\n\
                 func f() {\n\
                 \tfor i := 0; i < 3; i++ {\n\
                 \t\tif j := i; j > 1 {\n\
                 \t\t}\n\
                 \t}\n\
                 }\n"
            ),
            "func f() {\n\
             \t{\n\
             \t\ti := 0\n\
             \t\tfor ; i < 3; i++ {\n\
             \t\t\t{\n\
             \t\t\t\tj := i\n\
             \t\t\t\tif j > 1 {\n\
             \t\t\t\t}\n\
             \t\t\t}\n\
             \t\t}\n\
             \t}\n\
             }"
        );
    }

    #[test]
    fn lowers_range_loops() {
        assert_eq!(
            desugar(
                "package p\n\
                 func f(xs []int) {\n\
                 outer:\n\
                 \tfor _, x := range xs {\n\
                 \t\tprintln(x)\n\
                 \t\tcontinue outer\n\
                 \t}\n\
                 }\n"
            ),
            "func f(xs []int) {\n\
             \t{\n\
             \t\t_r0 := xs\n\
             \t\t_i0 := 0\n\
             \touter:\n\
             \t\tfor ; _i0 < len(_r0); _i0++ {\n\
             \t\t\tx := _r0[_i0]\n\
             \t\t\tprintln(x)\n\
             \t\t\tcontinue outer\n\
             \t\t}\n\
             \t}\n\
             }"
        );
    }
}
