use {
    crate::{
        common::{debug_println, indented_println},
        loader,
    },
    backend::emit::{GeneratedFile, DEFAULT_OUTPUT},
    frontend::ast::Package,
    middle::check::COROUTINE_PACKAGE,
    runtime::{Program, Value},
    std::{io::Write, path::PathBuf},
};

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name of the file generated in each package directory.
    pub output_filename: String,
    /// Build constraint written at the top of generated files.
    pub build_tags: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output_filename: DEFAULT_OUTPUT.to_owned(),
            build_tags: None,
        }
    }
}

fn imports_coroutine(packages: &[Package]) -> bool {
    packages
        .iter()
        .flat_map(|package| &package.files)
        .flat_map(|file| &file.imports)
        .any(|import| import.path == COROUTINE_PACKAGE)
}

/// Analyzes the loaded packages and compiles every package with colored
/// functions.
fn compile_packages(
    packages: &[Package],
    build_tags: Option<&str>,
) -> anyhow::Result<Vec<(usize, GeneratedFile)>> {
    debug_println!("building call graph");
    let analysis = middle::analyze(packages)?;
    debug_println!("coloring functions");
    for (&id, color) in &analysis.colors {
        indented_println!(1, "{}: {color}", analysis.funcs.qualified_name(id));
    }

    let mut generated = vec![];
    for package in analysis.colored_packages() {
        debug_println!("compiling package {}", packages[package].name);
        let file = backend::compile_package(
            &analysis,
            packages,
            package,
            build_tags.map(str::to_owned),
        )?;
        for func in &file.funcs {
            indented_println!(1, "compiling function {}", func.name);
        }
        generated.push((package, file));
    }
    Ok(generated)
}

/// Compiles the packages at `path`, writing one file per package that has
/// colored functions. Returns the paths written.
pub fn compile(path: &str, options: &CompileOptions) -> anyhow::Result<Vec<PathBuf>> {
    debug_println!("reading, parsing and type-checking");
    let packages = loader::load(path)?;
    if !imports_coroutine(&packages) {
        debug_println!("no file imports {COROUTINE_PACKAGE}, nothing to do");
        return Ok(vec![]);
    }

    let mut written = vec![];
    for (package, file) in compile_packages(&packages, options.build_tags.as_deref())? {
        let path = packages[package].dir.join(&options.output_filename);
        std::fs::write(&path, file.to_string())?;
        debug_println!("wrote {}", path.display());
        written.push(path);
    }
    debug_println!("done");
    Ok(written)
}

fn parse_arg(arg: &str) -> Value {
    match arg.parse() {
        Ok(n) => Value::Int(n),
        Err(_) => Value::Str(arg.to_owned()),
    }
}

/// Compiles the package of `path` in memory and drives `entry` as a
/// coroutine, printing what it yields.
pub fn run(path: &str, entry: &str, args: &[String], restart: bool) -> anyhow::Result<()> {
    debug_println!("reading, parsing and type-checking");
    let packages = loader::load(path)?;
    let generated = compile_packages(&packages, None)?;
    let program = Program::link(&packages, &generated)?;

    let package = packages
        .iter()
        .position(|package| package.funcs().any(|(_, func)| func.name == entry))
        .ok_or_else(|| anyhow::anyhow!("{path}: no function named {entry}"))?;
    let args = args.iter().map(|arg| parse_arg(arg)).collect();

    let mut stdout = std::io::stdout().lock();
    let result = runtime::drive(&program, package, entry, args, restart, &mut stdout)?;
    match result {
        Some(Value::Tuple(values)) if values.is_empty() => {}
        Some(result) => writeln!(stdout, "result: {result}")?,
        None => {}
    }
    debug_println!("done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, std::fs, tempfile::TempDir};

    const SQUARES: &str = "package main\n\
        \n\
        import \"github.com/stealthrocket/coroutine\"\n\
        \n\
        func Squares(n int) {\n\
        \tfor i := 1; i <= n; i++ {\n\
        \t\tcoroutine.Yield[int, any](i * i)\n\
        \t}\n\
        }\n";

    #[test]
    fn writes_one_file_per_colored_package() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("main.go"), SQUARES).unwrap();
        let options = CompileOptions {
            build_tags: Some("durable".to_owned()),
            ..CompileOptions::default()
        };

        let written = compile(tmp.path().to_str().unwrap(), &options).unwrap();
        assert_eq!(written, vec![tmp.path().join(DEFAULT_OUTPUT)]);
        let output = fs::read_to_string(&written[0]).unwrap();
        assert!(output.starts_with(backend::emit::GENERATED_MARKER));
        assert!(output.contains("//go:build durable"));
        assert!(output.contains("func Squares(n int)"));

        // the generated file is skipped when compiling again
        let again = compile(tmp.path().to_str().unwrap(), &options).unwrap();
        assert_eq!(fs::read_to_string(&again[0]).unwrap(), output);
    }

    #[test]
    fn rejected_functions_write_no_files() {
        let tmp = TempDir::new().unwrap();
        let valid = tmp.path().join("valid");
        let broken = tmp.path().join("broken");
        fs::create_dir(&valid).unwrap();
        fs::create_dir(&broken).unwrap();
        fs::write(valid.join("main.go"), SQUARES).unwrap();
        fs::write(
            broken.join("broken.go"),
            "package broken\n\
            \n\
            import \"github.com/stealthrocket/coroutine\"\n\
            \n\
            func Cleanup() {\n\
            \tdefer println(\"done\")\n\
            \tcoroutine.Yield[int, any](1)\n\
            }\n",
        )
        .unwrap();

        let path = format!("{}/...", tmp.path().display());
        let err = compile(&path, &CompileOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "Cleanup: not implemented: defer");
        assert!(!valid.join(DEFAULT_OUTPUT).exists());
        assert!(!broken.join(DEFAULT_OUTPUT).exists());
    }

    #[test]
    fn leaves_packages_without_coroutines_alone() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("main.go"),
            "package main\n\nfunc add(a, b int) int {\n\treturn a + b\n}\n",
        )
        .unwrap();
        let written = compile(tmp.path().to_str().unwrap(), &CompileOptions::default()).unwrap();
        assert!(written.is_empty());
        assert!(!tmp.path().join(DEFAULT_OUTPUT).exists());
    }
}
