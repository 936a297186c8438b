use {
    backend::emit::GeneratedFile,
    frontend::ast::{File, Package},
    rstest::rstest,
    rstest_reuse::{apply, template},
    runtime::Program,
    std::path::PathBuf,
};

#[template]
#[rstest]
fn examples(#[files("example_programs/*.go")] path: PathBuf) {}

#[apply(examples)]
fn run_compiled(path: PathBuf) {
    let example = ExampleProgram::from(path);
    assert_eq!(example.run(false), example.expected_output);
}

#[apply(examples)]
fn resume_from_snapshots(path: PathBuf) {
    let example = ExampleProgram::from(path);
    assert_eq!(example.run(true), example.expected_output);
}

#[apply(examples)]
fn generated_code_parses_back(path: PathBuf) {
    let example = ExampleProgram::from(path);
    for (_, generated) in &example.generated {
        let text = generated.to_string();
        let reparsed = File::try_from(text.as_str())
            .unwrap_or_else(|e| panic!("generated code does not parse: {e}\n{text}"));
        assert_eq!(reparsed.to_string(), generated.to_file().to_string());
    }
}

struct ExampleProgram {
    packages: Vec<Package>,
    generated: Vec<(usize, GeneratedFile)>,
    expected_output: String,
}

impl ExampleProgram {
    fn run(&self, restart: bool) -> String {
        let program = Program::link(&self.packages, &self.generated).unwrap();
        let mut output = Vec::new();
        runtime::drive(&program, 0, "main", vec![], restart, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }
}

impl From<PathBuf> for ExampleProgram {
    fn from(mut path: PathBuf) -> Self {
        let code = std::fs::read_to_string(&path).unwrap();
        let file = File::try_from(code.as_str()).unwrap();
        let packages = vec![Package {
            name: file.package.clone(),
            dir: path.parent().unwrap().to_path_buf(),
            files: vec![file],
        }];
        let generated = backend::compile(&packages, None).unwrap();

        path.set_extension("stdout");
        let expected_output = std::fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("failed to read expected output file at path {path:?}: {e}")
        });

        ExampleProgram {
            packages,
            generated,
            expected_output,
        }
    }
}
