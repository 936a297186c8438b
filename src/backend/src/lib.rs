pub mod compile;
mod desugar;
mod dispatch;
pub mod emit;
mod names;
pub mod plan;
pub mod spans;

use {
    derive_more::{Display, From},
    emit::GeneratedFile,
    frontend::ast::Package,
    middle::{check::CheckError, validate::ValidationError, Analysis},
};

#[derive(Debug, Clone, Display, From)]
pub enum Error {
    Analysis(middle::Error),
    Validation(ValidationError),
    Check(CheckError),
}

impl std::error::Error for Error {}

/// Compiles every colored function of `packages[package]`, in declaration
/// order.
pub fn compile_package(
    analysis: &Analysis,
    packages: &[Package],
    package: usize,
    build_tags: Option<String>,
) -> Result<GeneratedFile, Error> {
    let source = &packages[package];
    let mut funcs = vec![];
    for (id, color) in analysis.colored_in(package) {
        let name = &analysis.funcs.get(id).name;
        let Some((file, func)) = source.funcs().find(|(_, func)| func.name == *name) else {
            unreachable!("colored function {name} is not declared in {}", source.name);
        };
        let info = &analysis.infos[&id];
        funcs.push(compile::compile_func(
            analysis,
            package,
            file,
            func,
            info,
            color,
        )?);
    }
    Ok(GeneratedFile::new(&source.name, funcs, build_tags))
}

/// Analyzes `packages` and compiles every package that has colored
/// functions, paired with its index.
pub fn compile(
    packages: &[Package],
    build_tags: Option<&str>,
) -> Result<Vec<(usize, GeneratedFile)>, Error> {
    let analysis = middle::analyze(packages)?;
    analysis
        .colored_packages()
        .into_iter()
        .map(|package| {
            let file =
                compile_package(&analysis, packages, package, build_tags.map(str::to_owned))?;
            Ok((package, file))
        })
        .collect()
}
