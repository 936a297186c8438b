use {
    backend::emit::GeneratedFile,
    frontend::ast::{File, Package},
    std::path::PathBuf,
};

/// Compiles the package made of `sources`, which must have colored functions.
pub fn compile(sources: &[&str], build_tags: Option<&str>) -> GeneratedFile {
    let files: Vec<File> = sources
        .iter()
        .map(|src| File::try_from(*src).unwrap())
        .collect();
    let packages = [Package {
        name: files[0].package.clone(),
        dir: PathBuf::from("p"),
        files,
    }];
    let mut generated = backend::compile(&packages, build_tags).unwrap();
    assert_eq!(generated.len(), 1);
    generated.remove(0).1
}
