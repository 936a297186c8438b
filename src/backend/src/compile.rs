use {
    crate::{
        desugar::Desugarer,
        dispatch::Dispatcher,
        names::Namer,
        plan,
        spans::Spans,
        Error,
    },
    frontend::ast::{Block, Expr, File, FuncDecl, FuncType, Import, Lit, StmtKind},
    middle::{
        check::{self, Binding, FuncInfo, COROUTINE_PACKAGE},
        types::{Color, Type},
        validate, Analysis,
    },
    std::collections::BTreeSet,
};

/// A slot reloaded from the frame when a call resumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restore {
    pub index: usize,
    pub name: String,
    pub ty: Type,
}

/// Entry sequence of a compiled function: load the context of its color,
/// push a frame, declare every local, and reload all slots on resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prologue {
    // local name of the coroutine package import
    pub runtime: String,
    pub context: String,
    pub frame: String,
    pub color: Color,
    pub locals: Vec<(String, Type)>,
    pub restores: Vec<Restore>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSlot {
    pub index: usize,
    pub name: String,
}

/// Runs on every exit from a compiled function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnExit {
    pub context: String,
    pub frame: String,
    pub saves: Vec<SavedSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction<'a> {
    /// Suspending: store every slot and keep the frame for resumption.
    Save(&'a [SavedSlot]),
    /// Returning: the frame is done.
    Pop,
}

impl OnExit {
    pub fn action(&self, unwinding: bool) -> ExitAction<'_> {
        if unwinding {
            ExitAction::Save(&self.saves)
        } else {
            ExitAction::Pop
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunc {
    pub name: String,
    pub ty: FuncType,
    pub color: Color,
    pub prologue: Prologue,
    pub on_exit: OnExit,
    pub body: Block,
    // imports of the source file the body still refers to
    pub imports: Vec<Import>,
}

fn ends_in_return(body: &Block) -> bool {
    matches!(
        body.last().map(|stmt| &stmt.kind),
        Some(StmtKind::Return(_))
    )
}

/// Compiles the colored function `func` of package `package`, declared in
/// `file`, into its resumable form.
pub fn compile_func(
    analysis: &Analysis,
    package: usize,
    file: &File,
    func: &FuncDecl,
    info: &FuncInfo,
    color: &Color,
) -> Result<CompiledFunc, Error> {
    validate::validate(func, info, analysis)?;

    let mut namer = Namer::new(func);
    let context = namer.unique("_c");
    let frame = namer.unique("_f");

    let mut lowered = func.clone();
    let body = lowered.body.take().unwrap_or_default();
    lowered.body = Some(Desugarer { namer: &mut namer }.block(body));
    lowered.renumber();
    let info = check::check_func(&analysis.funcs, package, file, &lowered)?;

    let mut body = lowered.body.take().unwrap_or_default();
    let plan = plan::plan(&mut body, &info, &mut namer);
    let spans = Spans::new(&body);
    let mut body = Dispatcher::new(&spans, &mut namer, &frame).block(body);
    if !func.ty.results.is_empty() && !ends_in_return(&body) {
        // the dispatch switch is not a terminating statement
        body.push(
            StmtKind::Expr(Expr::call(
                Expr::ident("panic"),
                vec![Expr::Lit(Lit::Str("unreachable".to_owned()))],
            ))
            .into(),
        );
    }

    let paths: BTreeSet<&str> = info
        .uses
        .values()
        .filter_map(|binding| match *binding {
            Binding::Import(ref path) => Some(path.as_str()),
            _ => None,
        })
        .chain([COROUTINE_PACKAGE])
        .collect();
    let mut imports: Vec<Import> = file
        .imports
        .iter()
        .filter(|import| paths.contains(import.path.as_str()))
        .cloned()
        .collect();
    if !imports.iter().any(|import| import.path == COROUTINE_PACKAGE) {
        imports.push(Import {
            name: None,
            path: COROUTINE_PACKAGE.to_owned(),
        });
    }
    let runtime = imports
        .iter()
        .find(|import| import.path == COROUTINE_PACKAGE)
        .map_or("coroutine", Import::local_name)
        .to_owned();

    Ok(CompiledFunc {
        name: func.name.clone(),
        ty: func.ty.clone(),
        color: color.clone(),
        prologue: Prologue {
            runtime,
            context: context.clone(),
            frame: frame.clone(),
            color: color.clone(),
            locals: plan
                .locals()
                .map(|slot| (slot.name.clone(), slot.ty.clone()))
                .collect(),
            restores: plan
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| Restore {
                    index,
                    name: slot.name.clone(),
                    ty: slot.ty.clone(),
                })
                .collect(),
        },
        on_exit: OnExit {
            context,
            frame,
            saves: plan
                .slots
                .into_iter()
                .enumerate()
                .map(|(index, slot)| SavedSlot {
                    index,
                    name: slot.name,
                })
                .collect(),
        },
        body,
        imports,
    })
}
