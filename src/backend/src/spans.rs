use {
    frontend::ast::{NodeId, Stmt, StmtKind},
    std::collections::BTreeMap,
};

/// `[start, end)` on the instruction pointer axis of one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: i64,
    pub end: i64,
}

/// Spans of every statement of a function body, keyed by statement id.
///
/// Numbering starts at 1 so that an instruction pointer of 0 always means the
/// function has not run yet. A leaf statement takes one value; a compound
/// statement spans exactly its children, or one value when it has none.
#[derive(Debug, Default)]
pub struct Spans {
    spans: BTreeMap<NodeId, Span>,
    next: i64,
}

impl Spans {
    pub fn new(body: &[Stmt]) -> Self {
        let mut spans = Spans {
            spans: BTreeMap::new(),
            next: 1,
        };
        spans.stmts(body);
        spans
    }

    pub fn get(&self, stmt: &Stmt) -> Span {
        match self.spans.get(&stmt.id) {
            Some(&span) => span,
            None => unreachable!("statement {:?} has no span", stmt.id),
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let start = self.next;
        match stmt.kind {
            StmtKind::Block(ref body) => self.stmts(body),
            StmtKind::Labeled { ref stmt, .. } => self.stmt(stmt),
            StmtKind::If {
                ref body, ref els, ..
            } => {
                self.stmts(body);
                if let Some(els) = els {
                    self.stmt(els);
                }
            }
            StmtKind::Switch { ref cases, .. } => {
                for case in cases {
                    self.stmts(&case.body);
                }
            }
            StmtKind::For { ref body, .. } => self.stmts(body),
            _ => {}
        }
        if self.next == start {
            self.next += 1;
        }
        self.spans.insert(
            stmt.id,
            Span {
                start,
                end: self.next,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use {super::*, frontend::ast::File};

    #[test]
    fn nests_and_orders_spans() {
        let file = File::try_from(
            "package p\n\
             func f(n int) {\n\
             \ta := 1\n\
             \tfor ; a < n; a++ {\n\
             \t\tif a > 2 {\n\
             \t\t\tprintln(a)\n\
             \t\t} else {\n\
             \t\t}\n\
             \t\tprintln(n)\n\
             \t}\n\
             \tprintln(a)\n\
             }\n",
        )
        .unwrap();
        let body = file.funcs[0].body.as_ref().unwrap();
        let spans = Spans::new(body);
        let span = |stmt: &Stmt| {
            let Span { start, end } = spans.get(stmt);
            (start, end)
        };
        assert_eq!(span(&body[0]), (1, 2));
        assert_eq!(span(&body[1]), (2, 5));
        assert_eq!(span(&body[2]), (5, 6));

        let StmtKind::For { body: ref inner, .. } = body[1].kind else {
            panic!("expected a loop");
        };
        assert_eq!(span(&inner[0]), (2, 4));
        assert_eq!(span(&inner[1]), (4, 5));
        let StmtKind::If { els: Some(ref els), .. } = inner[0].kind else {
            panic!("expected an else branch");
        };
        // an empty block still takes one value
        assert_eq!(span(els), (3, 4));
    }
}
