use std::path::PathBuf;

/// Identifies a statement, call or identifier within one function declaration.
///
/// Ids are assigned by [`FuncDecl::renumber`]; freshly built nodes carry the
/// default id until the enclosing function is renumbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub id: NodeId,
    pub name: String,
}

impl Ident {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeId::default(),
            name: name.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Named(String),
    Qualified { package: String, name: String },
    Slice(Box<Type>),
    Array { len: usize, elem: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    Chan(Box<Type>),
    Func(FuncType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    // empty for unnamed parameters and results
    pub names: Vec<Ident>,
    pub ty: Type,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncType {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

impl FuncType {
    pub fn named_params(&self) -> impl Iterator<Item = (&Ident, &Type)> {
        named(&self.params)
    }

    pub fn named_results(&self) -> impl Iterator<Item = (&Ident, &Type)> {
        named(&self.results)
    }

    pub fn param_types(&self) -> impl Iterator<Item = &Type> {
        unnamed(&self.params)
    }

    pub fn result_types(&self) -> impl Iterator<Item = &Type> {
        unnamed(&self.results)
    }
}

fn named(fields: &[Field]) -> impl Iterator<Item = (&Ident, &Type)> {
    fields
        .iter()
        .flat_map(|field| field.names.iter().map(move |name| (name, &field.ty)))
}

fn unnamed(fields: &[Field]) -> impl Iterator<Item = &Type> {
    fields
        .iter()
        .flat_map(|field| std::iter::repeat(&field.ty).take(field.names.len().max(1)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lit {
    Int(i64),
    Str(String),
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 5,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 3,
            BinaryOp::And => 2,
            BinaryOp::Or => 1,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 3
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Recv,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Recv => "<-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExpr {
    pub id: NodeId,
    pub func: Box<Expr>,
    pub args: Vec<Expr>,
    pub ellipsis: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub key: Option<Expr>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(Ident),
    Lit(Lit),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Call(CallExpr),
    // also covers generic instantiation, e.g. `coroutine.Yield[int, any]`
    Index {
        base: Box<Expr>,
        indices: Vec<Expr>,
    },
    Selector {
        base: Box<Expr>,
        field: String,
    },
    // `ty` is `None` for the `x.(type)` guard of a type switch
    TypeAssert {
        expr: Box<Expr>,
        ty: Option<Type>,
    },
    Composite {
        ty: Type,
        elems: Vec<Element>,
    },
    TypeLit(Type),
    FuncLit {
        ty: FuncType,
        body: Block,
    },
    Paren(Box<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(Ident::new(name))
    }

    pub fn int(value: i64) -> Self {
        Expr::Lit(Lit::Int(value))
    }

    pub fn selector(base: Expr, field: impl Into<String>) -> Self {
        Expr::Selector {
            base: Box::new(base),
            field: field.into(),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr {
            id: NodeId::default(),
            func: Box::new(func),
            args,
            ellipsis: false,
        })
    }

    pub fn index(base: Expr, indices: Vec<Expr>) -> Self {
        Expr::Index {
            base: Box::new(base),
            indices,
        }
    }

    pub fn as_ident(&self) -> Option<&Ident> {
        match self {
            Expr::Ident(ident) => Some(ident),
            Expr::Paren(expr) => expr.as_ident(),
            _ => None,
        }
    }
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Define,
    Assign,
    Op(BinaryOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Break,
    Continue,
    Goto,
    Fallthrough,
}

impl BranchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchKind::Break => "break",
            BranchKind::Continue => "continue",
            BranchKind::Goto => "goto",
            BranchKind::Fallthrough => "fallthrough",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseClause {
    // `None` for the default clause
    pub exprs: Option<Vec<Expr>>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommClause {
    // `None` for the default clause
    pub comm: Option<Box<Stmt>>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

impl From<StmtKind> for Stmt {
    fn from(kind: StmtKind) -> Self {
        Stmt {
            id: NodeId::default(),
            kind,
        }
    }
}

impl From<Stmt> for Vec<Stmt> {
    fn from(stmt: Stmt) -> Self {
        match stmt.kind {
            StmtKind::Block(body) => body,
            _ => Vec::from([stmt]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Empty,
    Expr(Expr),
    Send {
        chan: Expr,
        value: Expr,
    },
    IncDec {
        expr: Expr,
        inc: bool,
    },
    Assign {
        lhs: Vec<Expr>,
        op: AssignOp,
        rhs: Vec<Expr>,
    },
    Var {
        names: Vec<Ident>,
        ty: Option<Type>,
        values: Vec<Expr>,
    },
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    Branch {
        kind: BranchKind,
        label: Option<String>,
    },
    Block(Block),
    Labeled {
        label: String,
        stmt: Box<Stmt>,
    },
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        body: Block,
        // either a `Block` or another `If`
        els: Option<Box<Stmt>>,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<Expr>,
        cases: Vec<CaseClause>,
    },
    TypeSwitch {
        init: Option<Box<Stmt>>,
        // `x := y.(type)` or `y.(type)`
        guard: Box<Stmt>,
        cases: Vec<CaseClause>,
    },
    Select(Vec<CommClause>),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        expr: Expr,
        body: Block,
    },
}

impl StmtKind {
    pub fn assign(lhs: Expr, rhs: Expr) -> Self {
        StmtKind::Assign {
            lhs: vec![lhs],
            op: AssignOp::Assign,
            rhs: vec![rhs],
        }
    }

    pub fn define(lhs: Expr, rhs: Expr) -> Self {
        StmtKind::Assign {
            lhs: vec![lhs],
            op: AssignOp::Define,
            rhs: vec![rhs],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub name: Option<String>,
    pub path: String,
}

impl Import {
    /// The name the import is referred to by inside the file.
    pub fn local_name(&self) -> &str {
        match self.name {
            Some(ref name) => name.as_str(),
            None => self.path.rsplit('/').next().unwrap_or(&self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub name: String,
    pub ty: FuncType,
    // `None` for functions implemented outside of the source
    pub body: Option<Block>,
}

impl FuncDecl {
    /// Assigns fresh, function-unique ids to every statement, call and
    /// identifier, in source order.
    pub fn renumber(&mut self) {
        crate::visit::renumber(self);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub package: String,
    pub imports: Vec<Import>,
    pub funcs: Vec<FuncDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<File>,
}

impl Package {
    pub fn funcs(&self) -> impl Iterator<Item = (&File, &FuncDecl)> {
        self.files
            .iter()
            .flat_map(|file| file.funcs.iter().map(move |func| (file, func)))
    }
}
