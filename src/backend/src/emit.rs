use {
    crate::compile::{CompiledFunc, OnExit, Prologue},
    frontend::ast::{
        BinaryOp, Block, Expr, File, FuncDecl, FuncType, Ident, Import, Stmt, StmtKind,
    },
    std::fmt,
};

pub const GENERATED_MARKER: &str = "// Code generated by coroc. DO NOT EDIT.";

pub const DEFAULT_OUTPUT: &str = "coroc_generated.go";

/// The generated source of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub package: String,
    pub build_tags: Option<String>,
    pub imports: Vec<Import>,
    pub funcs: Vec<CompiledFunc>,
}

impl GeneratedFile {
    pub fn new(package: &str, funcs: Vec<CompiledFunc>, build_tags: Option<String>) -> Self {
        let mut imports: Vec<Import> = funcs
            .iter()
            .flat_map(|func| func.imports.iter().cloned())
            .collect();
        imports.sort_by(|a, b| (&a.path, &a.name).cmp(&(&b.path, &b.name)));
        imports.dedup();
        Self {
            package: package.to_owned(),
            // an empty constraint is not a valid `//go:build` line
            build_tags: build_tags.filter(|tags| !tags.trim().is_empty()),
            imports,
            funcs,
        }
    }

    pub fn to_file(&self) -> File {
        File {
            package: self.package.clone(),
            imports: self.imports.clone(),
            funcs: self.funcs.iter().map(FuncDecl::from).collect(),
        }
    }
}

fn method(receiver: &str, name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::selector(Expr::ident(receiver), name), args)
}

fn usize_lit(value: usize) -> Expr {
    Expr::int(value as i64)
}

impl Prologue {
    pub fn to_stmts(&self) -> Block {
        let type_args = [&self.color.yield_ty, &self.color.resume_ty]
            .into_iter()
            .map(|ty| Expr::TypeLit(ty.into()))
            .collect();
        let load = Expr::call(
            Expr::index(
                Expr::selector(Expr::ident(&self.runtime), "LoadContext"),
                type_args,
            ),
            vec![],
        );
        let locals = self.locals.iter().map(|(name, ty)| {
            Stmt::from(StmtKind::Var {
                names: vec![Ident::new(name)],
                ty: Some(ty.into()),
                values: vec![],
            })
        });
        let restores = self
            .restores
            .iter()
            .map(|restore| {
                let value = Expr::TypeAssert {
                    expr: Box::new(method(&self.frame, "Get", vec![usize_lit(restore.index)])),
                    ty: Some((&restore.ty).into()),
                };
                Stmt::from(StmtKind::assign(Expr::ident(&restore.name), value))
            })
            .collect();
        let resumed = StmtKind::If {
            init: None,
            cond: Expr::binary(
                BinaryOp::Gt,
                Expr::selector(Expr::ident(&self.frame), "IP"),
                Expr::int(0),
            ),
            body: restores,
            els: None,
        };
        [
            Stmt::from(StmtKind::define(Expr::ident(&self.context), load)),
            Stmt::from(StmtKind::define(
                Expr::ident(&self.frame),
                method(&self.context, "Push", vec![]),
            )),
        ]
        .into_iter()
        .chain(locals)
        .chain([Stmt::from(resumed)])
        .collect()
    }
}

impl OnExit {
    /// The handler as a deferred closure.
    pub fn to_stmt(&self) -> Stmt {
        let saves = self
            .saves
            .iter()
            .map(|slot| {
                Stmt::from(StmtKind::Expr(method(
                    &self.frame,
                    "Set",
                    vec![usize_lit(slot.index), Expr::ident(&slot.name)],
                )))
            })
            .collect();
        let handler = StmtKind::If {
            init: None,
            cond: method(&self.context, "Unwinding", vec![]),
            body: saves,
            els: Some(Box::new(
                StmtKind::Block(vec![
                    StmtKind::Expr(method(&self.context, "Pop", vec![])).into()
                ])
                .into(),
            )),
        };
        let closure = Expr::FuncLit {
            ty: FuncType::default(),
            body: vec![handler.into()],
        };
        StmtKind::Defer(Expr::call(closure, vec![])).into()
    }
}

impl From<&CompiledFunc> for FuncDecl {
    fn from(func: &CompiledFunc) -> Self {
        let body = func
            .prologue
            .to_stmts()
            .into_iter()
            .chain([func.on_exit.to_stmt()])
            .chain(func.body.iter().cloned())
            .collect();
        FuncDecl {
            name: func.name.clone(),
            ty: func.ty.clone(),
            body: Some(body),
        }
    }
}

impl fmt::Display for GeneratedFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{GENERATED_MARKER}")?;
        writeln!(f)?;
        if let Some(tags) = &self.build_tags {
            writeln!(f, "//go:build {tags}")?;
            writeln!(f)?;
        }
        write!(f, "{}", self.to_file())
    }
}
