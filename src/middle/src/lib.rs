pub mod callgraph;
pub mod check;
pub mod color;
pub mod types;
pub mod validate;

use {
    callgraph::CallGraph,
    check::{Callee, CheckError, FuncId, FuncInfo, FuncTable},
    color::ColorError,
    derive_more::{Display, From},
    frontend::ast::Package,
    std::collections::BTreeMap,
    types::Color,
};

#[derive(Debug, Clone, Display, From)]
pub enum Error {
    Check(CheckError),
    Color(ColorError),
}

impl std::error::Error for Error {}

/// Whole-program facts about a set of loaded packages.
#[derive(Debug)]
pub struct Analysis {
    pub funcs: FuncTable,
    pub infos: BTreeMap<FuncId, FuncInfo>,
    pub graph: CallGraph,
    pub colors: BTreeMap<FuncId, Color>,
}

impl Analysis {
    /// Colored functions of the package at `package`, in declaration order.
    pub fn colored_in(&self, package: usize) -> impl Iterator<Item = (FuncId, &Color)> {
        self.colors
            .iter()
            .filter(move |(&id, _)| self.funcs.get(id).package == package)
            .map(|(&id, color)| (id, color))
    }

    /// Whether a call to `callee` may suspend. Calls through function values
    /// may suspend when any address-taken function of the same signature is
    /// colored.
    pub fn suspends(&self, callee: &Callee) -> bool {
        match *callee {
            Callee::Func(id) => self.colors.contains_key(&id),
            Callee::Yield(_) => true,
            Callee::Dynamic(ref signature) => self
                .infos
                .values()
                .flat_map(|info| &info.address_taken)
                .any(|&id| {
                    self.colors.contains_key(&id) && self.funcs.get(id).signature == *signature
                }),
            Callee::External { .. } | Callee::Builtin(_) | Callee::Conversion(_) => false,
        }
    }

    /// Indices of the packages that declare at least one colored function.
    pub fn colored_packages(&self) -> Vec<usize> {
        let mut packages: Vec<usize> = self
            .colors
            .keys()
            .map(|&id| self.funcs.get(id).package)
            .collect();
        packages.dedup();
        packages
    }
}

/// Resolves every function body, builds the call graph and colors it.
pub fn analyze(packages: &[Package]) -> Result<Analysis, Error> {
    let funcs = FuncTable::new(packages)?;
    let mut infos = BTreeMap::new();
    for (package_index, package) in packages.iter().enumerate() {
        for (file, func) in package.funcs() {
            let info = check::check_func(&funcs, package_index, file, func)?;
            infos.insert(info.func, info);
        }
    }
    let graph = CallGraph::build(&funcs, &infos);
    let colors = color::color(&graph, &funcs)?;
    Ok(Analysis {
        funcs,
        infos,
        graph,
        colors,
    })
}
