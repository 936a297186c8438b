//! Executes loaded packages, with compiled functions in place of their
//! sources, and drives compiled coroutines one suspension at a time.

mod coroutine;
pub mod frame;
mod interp;
mod stdlib;
pub mod value;

pub use {
    coroutine::{drive, Context, Coroutine},
    frame::{Frame, RestoreError, Stack},
    value::Value,
};

use {
    backend::{compile::CompiledFunc, emit::GeneratedFile},
    derive_more::Display,
    frontend::ast::{FuncDecl, Import, Package},
    interp::Interp,
    middle::{
        check::{CheckError, FuncTable, COROUTINE_PACKAGE},
        types::Color,
    },
    std::{collections::BTreeMap, io::Write, rc::Rc},
    value::Func,
};

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RuntimeError {
    #[display("{_0}")]
    Link(CheckError),
    #[display("undefined: {_0}")]
    Undefined(String),
    #[display("unsupported: {_0}")]
    Unsupported(String),
    #[display("{_0}")]
    Type(String),
    #[display("runtime error: index out of range [{index}] with length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[display("runtime error: integer divide by zero")]
    DivideByZero,
    #[display("assignment to entry in nil map")]
    NilMap,
    #[display("panic: {_0}")]
    Panic(String),
    #[display("all goroutines are asleep - deadlock!")]
    Deadlock,
    #[display("{_0} is not a coroutine")]
    NotCoroutine(String),
    #[display("no coroutine context")]
    NoContext,
    #[display("coroutine color mismatch: running {expected}, called {found}")]
    ColorMismatch { expected: Color, found: Color },
    #[display("restore: {_0}")]
    Restore(RestoreError),
    #[display("write: {_0}")]
    Io(String),
}

impl std::error::Error for RuntimeError {}

impl From<CheckError> for RuntimeError {
    fn from(error: CheckError) -> Self {
        RuntimeError::Link(error)
    }
}

impl From<RestoreError> for RuntimeError {
    fn from(error: RestoreError) -> Self {
        RuntimeError::Restore(error)
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(error: std::io::Error) -> Self {
        RuntimeError::Io(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Coroutine,
    Package(usize),
    // provided by the built-in standard library shims
    External(String),
}

/// What the names of a file resolve to: its package and its imports.
#[derive(Debug)]
pub struct Unit {
    pub package: usize,
    pub imports: BTreeMap<String, ImportTarget>,
}

impl Unit {
    fn new(table: &FuncTable, package: usize, imports: &[Import]) -> Self {
        let imports = imports
            .iter()
            .map(|import| {
                let target = if import.path == COROUTINE_PACKAGE {
                    ImportTarget::Coroutine
                } else {
                    match table.resolve_import(&import.path) {
                        Some(package) => ImportTarget::Package(package),
                        None => ImportTarget::External(import.path.clone()),
                    }
                };
                (import.local_name().to_owned(), target)
            })
            .collect();
        Self { package, imports }
    }
}

#[derive(Debug)]
pub enum Code {
    Source(FuncDecl),
    Compiled(CompiledFunc),
}

#[derive(Debug)]
pub struct Function {
    pub unit: Rc<Unit>,
    pub code: Code,
}

/// Loaded packages linked with the generated files compiled from them.
#[derive(Debug)]
pub struct Program {
    package_names: Vec<String>,
    funcs: BTreeMap<(usize, String), Function>,
}

impl Program {
    /// Links `packages`; each generated file replaces the source of the
    /// functions it compiles in the package at the paired index.
    pub fn link(
        packages: &[Package],
        generated: &[(usize, GeneratedFile)],
    ) -> Result<Self, RuntimeError> {
        let table = FuncTable::new(packages)?;
        let mut funcs = BTreeMap::new();
        for (index, package) in packages.iter().enumerate() {
            for file in &package.files {
                let unit = Rc::new(Unit::new(&table, index, &file.imports));
                for func in &file.funcs {
                    funcs.insert(
                        (index, func.name.clone()),
                        Function {
                            unit: unit.clone(),
                            code: Code::Source(func.clone()),
                        },
                    );
                }
            }
        }
        for (index, file) in generated {
            for func in &file.funcs {
                let unit = Rc::new(Unit::new(&table, *index, &func.imports));
                funcs.insert(
                    (*index, func.name.clone()),
                    Function {
                        unit,
                        code: Code::Compiled(func.clone()),
                    },
                );
            }
        }
        Ok(Self {
            package_names: packages.iter().map(|package| package.name.clone()).collect(),
            funcs,
        })
    }

    pub fn package(&self, name: &str) -> Option<usize> {
        self.package_names.iter().position(|package| package == name)
    }

    pub fn function(&self, package: usize, name: &str) -> Option<&Function> {
        self.funcs.get(&(package, name.to_owned()))
    }

    /// Calls a function outside of any coroutine.
    pub fn call(
        &self,
        package: usize,
        name: &str,
        args: Vec<Value>,
        out: &mut impl Write,
    ) -> Result<Value, RuntimeError> {
        let func = Func::Named {
            package,
            name: name.to_owned(),
        };
        Interp::new(self, None, out)
            .call(&func, args)
            .map_err(|signal| signal.into_error())
    }
}
