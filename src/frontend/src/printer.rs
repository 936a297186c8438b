//! Renders the AST back to gofmt-style source text.

use {
    crate::ast::*,
    std::fmt::{self, Display, Write},
};

struct Printer<'a, W> {
    out: &'a mut W,
    depth: usize,
}

impl<'a, W: Write> Printer<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self { out, depth: 0 }
    }

    fn indent(&mut self) -> fmt::Result {
        self.indent_to(self.depth)
    }

    fn indent_to(&mut self, depth: usize) -> fmt::Result {
        for _ in 0..depth {
            self.out.write_char('\t')?;
        }
        Ok(())
    }

    fn list<T>(
        &mut self,
        items: &[T],
        mut item: impl FnMut(&mut Self, &T) -> fmt::Result,
    ) -> fmt::Result {
        for (i, elem) in items.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            item(self, elem)?;
        }
        Ok(())
    }

    fn ty(&mut self, ty: &Type) -> fmt::Result {
        match ty {
            Type::Named(name) => self.out.write_str(name),
            Type::Qualified { package, name } => write!(self.out, "{package}.{name}"),
            Type::Slice(elem) => {
                self.out.write_str("[]")?;
                self.ty(elem)
            }
            Type::Array { len, elem } => {
                write!(self.out, "[{len}]")?;
                self.ty(elem)
            }
            Type::Map { key, value } => {
                self.out.write_str("map[")?;
                self.ty(key)?;
                self.out.write_char(']')?;
                self.ty(value)
            }
            Type::Chan(elem) => {
                self.out.write_str("chan ")?;
                self.ty(elem)
            }
            Type::Func(func) => {
                self.out.write_str("func")?;
                self.signature(func)
            }
        }
    }

    fn fields(&mut self, fields: &[Field]) -> fmt::Result {
        self.list(fields, |p, field| {
            if !field.names.is_empty() {
                p.list(&field.names, |p, name| p.out.write_str(&name.name))?;
                p.out.write_char(' ')?;
            }
            p.ty(&field.ty)
        })
    }

    fn signature(&mut self, func: &FuncType) -> fmt::Result {
        self.out.write_char('(')?;
        self.fields(&func.params)?;
        self.out.write_char(')')?;
        match func.results.as_slice() {
            [] => Ok(()),
            [Field { names, ty }] if names.is_empty() => {
                self.out.write_char(' ')?;
                self.ty(ty)
            }
            results => {
                self.out.write_str(" (")?;
                self.fields(results)?;
                self.out.write_char(')')
            }
        }
    }

    fn lit(&mut self, lit: &Lit) -> fmt::Result {
        match lit {
            Lit::Int(int) => write!(self.out, "{int}"),
            Lit::Str(s) => {
                self.out.write_char('"')?;
                for c in s.chars() {
                    self.escaped(c, '"')?;
                }
                self.out.write_char('"')
            }
            Lit::Char(c) => {
                self.out.write_char('\'')?;
                self.escaped(*c, '\'')?;
                self.out.write_char('\'')
            }
        }
    }

    fn escaped(&mut self, c: char, quote: char) -> fmt::Result {
        match c {
            '\n' => self.out.write_str("\\n"),
            '\r' => self.out.write_str("\\r"),
            '\t' => self.out.write_str("\\t"),
            '\\' => self.out.write_str("\\\\"),
            c if c == quote => write!(self.out, "\\{c}"),
            c => self.out.write_char(c),
        }
    }

    fn operand(&mut self, expr: &Expr, parens: bool) -> fmt::Result {
        if parens {
            self.out.write_char('(')?;
            self.expr(expr)?;
            self.out.write_char(')')
        } else {
            self.expr(expr)
        }
    }

    // operand of a selector, index, call or assertion
    fn primary(&mut self, expr: &Expr) -> fmt::Result {
        let parens = matches!(
            expr,
            Expr::Binary { .. } | Expr::Unary { .. } | Expr::TypeLit(Type::Func(_))
        );
        self.operand(expr, parens)
    }

    fn expr(&mut self, expr: &Expr) -> fmt::Result {
        match expr {
            Expr::Ident(ident) => self.out.write_str(&ident.name),
            Expr::Lit(lit) => self.lit(lit),
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                let binds_looser = |expr: &Expr, or_equal: bool| match expr {
                    Expr::Binary { op, .. } => {
                        op.precedence() < prec || (or_equal && op.precedence() == prec)
                    }
                    _ => false,
                };
                self.operand(lhs, binds_looser(&**lhs, false))?;
                write!(self.out, " {} ", op.as_str())?;
                self.operand(rhs, binds_looser(&**rhs, true))
            }
            Expr::Unary { op, expr } => {
                self.out.write_str(op.as_str())?;
                let parens = match &**expr {
                    Expr::Binary { .. } => true,
                    Expr::Unary { op: inner, .. } => *op == UnaryOp::Neg && *inner == UnaryOp::Neg,
                    _ => false,
                };
                self.operand(expr, parens)
            }
            Expr::Call(call) => {
                self.primary(&call.func)?;
                self.out.write_char('(')?;
                self.list(&call.args, Self::expr)?;
                if call.ellipsis {
                    self.out.write_str("...")?;
                }
                self.out.write_char(')')
            }
            Expr::Index { base, indices } => {
                self.primary(base)?;
                self.out.write_char('[')?;
                self.list(indices, Self::expr)?;
                self.out.write_char(']')
            }
            Expr::Selector { base, field } => {
                self.primary(base)?;
                write!(self.out, ".{field}")
            }
            Expr::TypeAssert { expr, ty } => {
                self.primary(expr)?;
                self.out.write_str(".(")?;
                match ty {
                    Some(ty) => self.ty(ty)?,
                    None => self.out.write_str("type")?,
                }
                self.out.write_char(')')
            }
            Expr::Composite { ty, elems } => {
                self.ty(ty)?;
                self.out.write_char('{')?;
                self.list(elems, |p, elem| {
                    if let Some(key) = &elem.key {
                        p.expr(key)?;
                        p.out.write_str(": ")?;
                    }
                    p.expr(&elem.value)
                })?;
                self.out.write_char('}')
            }
            Expr::TypeLit(ty) => self.ty(ty),
            Expr::FuncLit { ty, body } => {
                self.out.write_str("func")?;
                self.signature(ty)?;
                self.out.write_char(' ')?;
                self.block(body)
            }
            Expr::Paren(expr) => self.operand(expr, true),
        }
    }

    fn block(&mut self, block: &Block) -> fmt::Result {
        self.out.write_str("{\n")?;
        self.depth += 1;
        self.stmts(block)?;
        self.depth -= 1;
        self.indent()?;
        self.out.write_char('}')
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> fmt::Result {
        for stmt in stmts {
            if stmt.kind == StmtKind::Empty {
                continue;
            }
            if let StmtKind::Labeled { .. } = stmt.kind {
                // labels sit one level left of the statement they name
                self.indent_to(self.depth.saturating_sub(1))?;
            } else {
                self.indent()?;
            }
            self.stmt(stmt)?;
            self.out.write_char('\n')?;
        }
        Ok(())
    }

    fn header(&mut self, init: &Option<Box<Stmt>>) -> fmt::Result {
        if let Some(init) = init {
            self.stmt(init)?;
            self.out.write_str("; ")?;
        }
        Ok(())
    }

    fn cases<T>(
        &mut self,
        clauses: &[T],
        mut label: impl FnMut(&mut Self, &T) -> Result<bool, fmt::Error>,
        body: impl Fn(&T) -> &Block,
    ) -> fmt::Result {
        self.out.write_str("{\n")?;
        for clause in clauses {
            self.indent()?;
            if !label(self, clause)? {
                self.out.write_str("default")?;
            }
            self.out.write_str(":\n")?;
            self.depth += 1;
            self.stmts(body(clause))?;
            self.depth -= 1;
        }
        self.indent()?;
        self.out.write_char('}')
    }

    fn case_clauses(&mut self, cases: &[CaseClause]) -> fmt::Result {
        self.cases(
            cases,
            |p, case| match &case.exprs {
                Some(exprs) => {
                    p.out.write_str("case ")?;
                    p.list(exprs, Self::expr)?;
                    Ok(true)
                }
                None => Ok(false),
            },
            |case| &case.body,
        )
    }

    fn stmt(&mut self, stmt: &Stmt) -> fmt::Result {
        match &stmt.kind {
            StmtKind::Empty => Ok(()),
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Send { chan, value } => {
                self.expr(chan)?;
                self.out.write_str(" <- ")?;
                self.expr(value)
            }
            StmtKind::IncDec { expr, inc } => {
                self.expr(expr)?;
                self.out.write_str(if *inc { "++" } else { "--" })
            }
            StmtKind::Assign { lhs, op, rhs } => {
                self.list(lhs, Self::expr)?;
                match op {
                    AssignOp::Define => self.out.write_str(" := ")?,
                    AssignOp::Assign => self.out.write_str(" = ")?,
                    AssignOp::Op(op) => write!(self.out, " {}= ", op.as_str())?,
                }
                self.list(rhs, Self::expr)
            }
            StmtKind::Var { names, ty, values } => {
                self.out.write_str("var ")?;
                self.list(names, |p, name| p.out.write_str(&name.name))?;
                if let Some(ty) = ty {
                    self.out.write_char(' ')?;
                    self.ty(ty)?;
                }
                if !values.is_empty() {
                    self.out.write_str(" = ")?;
                    self.list(values, Self::expr)?;
                }
                Ok(())
            }
            StmtKind::Go(expr) => {
                self.out.write_str("go ")?;
                self.expr(expr)
            }
            StmtKind::Defer(expr) => {
                self.out.write_str("defer ")?;
                self.expr(expr)
            }
            StmtKind::Return(values) => {
                self.out.write_str("return")?;
                if !values.is_empty() {
                    self.out.write_char(' ')?;
                    self.list(values, Self::expr)?;
                }
                Ok(())
            }
            StmtKind::Branch { kind, label } => {
                self.out.write_str(kind.as_str())?;
                if let Some(label) = label {
                    write!(self.out, " {label}")?;
                }
                Ok(())
            }
            StmtKind::Block(body) => self.block(body),
            StmtKind::Labeled { label, stmt } => {
                writeln!(self.out, "{label}:")?;
                self.indent()?;
                self.stmt(stmt)
            }
            StmtKind::If {
                init,
                cond,
                body,
                els,
            } => {
                self.out.write_str("if ")?;
                self.header(init)?;
                self.expr(cond)?;
                self.out.write_char(' ')?;
                self.block(body)?;
                if let Some(els) = els {
                    self.out.write_str(" else ")?;
                    self.stmt(els)?;
                }
                Ok(())
            }
            StmtKind::Switch { init, tag, cases } => {
                self.out.write_str("switch ")?;
                self.header(init)?;
                if let Some(tag) = tag {
                    self.expr(tag)?;
                    self.out.write_char(' ')?;
                }
                self.case_clauses(cases)
            }
            StmtKind::TypeSwitch { init, guard, cases } => {
                self.out.write_str("switch ")?;
                self.header(init)?;
                self.stmt(guard)?;
                self.out.write_char(' ')?;
                self.case_clauses(cases)
            }
            StmtKind::Select(clauses) => {
                self.out.write_str("select ")?;
                self.cases(
                    clauses,
                    |p, clause| match &clause.comm {
                        Some(comm) => {
                            p.out.write_str("case ")?;
                            p.stmt(comm)?;
                            Ok(true)
                        }
                        None => Ok(false),
                    },
                    |clause| &clause.body,
                )
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                self.out.write_str("for ")?;
                if init.is_some() || post.is_some() {
                    if let Some(init) = init {
                        self.stmt(init)?;
                    }
                    self.out.write_str("; ")?;
                    if let Some(cond) = cond {
                        self.expr(cond)?;
                    }
                    self.out.write_str("; ")?;
                    if let Some(post) = post {
                        self.stmt(post)?;
                        self.out.write_char(' ')?;
                    }
                } else if let Some(cond) = cond {
                    self.expr(cond)?;
                    self.out.write_char(' ')?;
                }
                self.block(body)
            }
            StmtKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => {
                self.out.write_str("for ")?;
                if let Some(key) = key {
                    self.expr(key)?;
                    if let Some(value) = value {
                        self.out.write_str(", ")?;
                        self.expr(value)?;
                    }
                    self.out.write_str(if *define { " := " } else { " = " })?;
                }
                self.out.write_str("range ")?;
                self.expr(expr)?;
                self.out.write_char(' ')?;
                self.block(body)
            }
        }
    }

    fn func(&mut self, func: &FuncDecl) -> fmt::Result {
        write!(self.out, "func {}", func.name)?;
        self.signature(&func.ty)?;
        if let Some(body) = &func.body {
            self.out.write_char(' ')?;
            self.block(body)?;
        }
        Ok(())
    }

    fn file(&mut self, file: &File) -> fmt::Result {
        writeln!(self.out, "package {}", file.package)?;
        match file.imports.as_slice() {
            [] => {}
            [import] => {
                self.out.write_str("\nimport ")?;
                self.import(import)?;
                self.out.write_char('\n')?;
            }
            imports => {
                self.out.write_str("\nimport (\n")?;
                for import in imports {
                    self.out.write_char('\t')?;
                    self.import(import)?;
                    self.out.write_char('\n')?;
                }
                self.out.write_str(")\n")?;
            }
        }
        for func in &file.funcs {
            self.out.write_char('\n')?;
            self.func(func)?;
            self.out.write_char('\n')?;
        }
        Ok(())
    }

    fn import(&mut self, import: &Import) -> fmt::Result {
        if let Some(name) = &import.name {
            write!(self.out, "{name} ")?;
        }
        self.lit(&Lit::Str(import.path.clone()))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f).ty(self)
    }
}

impl Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f).signature(self)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f).expr(self)
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f).stmt(self)
    }
}

impl Display for FuncDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f).func(self)
    }
}

impl Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new(f).file(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parenthesizes_by_precedence() {
        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::ident("b")),
            Expr::binary(BinaryOp::Sub, Expr::ident("c"), Expr::int(1)),
        );
        assert_eq!(expr.to_string(), "(a + b) * (c - 1)");

        let expr = Expr::binary(
            BinaryOp::Sub,
            Expr::ident("a"),
            Expr::binary(BinaryOp::Sub, Expr::ident("b"), Expr::ident("c")),
        );
        assert_eq!(expr.to_string(), "a - (b - c)");
    }

    #[test]
    fn prints_nested_blocks_with_tabs() {
        let stmt = Stmt::from(StmtKind::For {
            init: None,
            cond: Some(Expr::binary(BinaryOp::Lt, Expr::ident("i"), Expr::int(3))),
            post: None,
            body: vec![StmtKind::IncDec {
                expr: Expr::ident("i"),
                inc: true,
            }
            .into()],
        });
        assert_eq!(stmt.to_string(), "for i < 3 {\n\ti++\n}");
    }

    #[test]
    fn escapes_string_literals() {
        let expr = Expr::Lit(Lit::Str("a \"quoted\"\n".to_owned()));
        assert_eq!(expr.to_string(), r#""a \"quoted\"\n""#);
    }
}
