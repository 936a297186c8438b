//! Finds the package directories named on the command line and parses their
//! Go files.

use {
    anyhow::{bail, Context},
    backend::emit::GENERATED_MARKER,
    frontend::ast::{File, Package},
    std::{
        collections::BTreeSet,
        path::{Component, Path, PathBuf},
    },
};

/// Relative paths are taken from the working directory, as if written
/// `./path`.
pub fn normalize(path: &str) -> String {
    if path.starts_with('/') || path.starts_with('.') {
        path.to_owned()
    } else {
        format!("./{path}")
    }
}

// directories the `...` wildcard never descends into
fn is_ignored(dir: &Path, root: &Path) -> bool {
    dir.strip_prefix(root)
        .unwrap_or(dir)
        .components()
        .any(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                name == "testdata" || name.starts_with('.') || name.starts_with('_')
            }
            _ => false,
        })
}

/// The package directories `path` refers to: the directory of a file, the
/// directory itself, or with a trailing `/...`, every directory below it
/// that contains Go files.
pub fn package_dirs(path: &str) -> anyhow::Result<Vec<PathBuf>> {
    let path = normalize(path);
    if let Some(root) = path.strip_suffix("/...") {
        let root = Path::new(root);
        let pattern = root.join("**").join("*.go");
        let pattern = pattern
            .to_str()
            .with_context(|| format!("{} is not valid UTF-8", root.display()))?;
        let mut dirs = BTreeSet::new();
        for entry in glob::glob(pattern)? {
            let file = entry?;
            if let Some(dir) = file.parent() {
                if !is_ignored(dir, root) {
                    dirs.insert(dir.to_path_buf());
                }
            }
        }
        return Ok(dirs.into_iter().collect());
    }
    let path = PathBuf::from(path);
    if path.is_file() {
        let dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        return Ok(vec![dir]);
    }
    if !path.is_dir() {
        bail!("{}: no such file or directory", path.display());
    }
    Ok(vec![path])
}

fn is_source(path: &Path, src: &str) -> bool {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    !name.ends_with("_test.go") && !src.starts_with(GENERATED_MARKER)
}

/// Parses the Go files of `dir`, or returns `None` if it has none. Test
/// files and files written by a previous compilation are skipped.
pub fn load_package(dir: &Path) -> anyhow::Result<Option<Package>> {
    let pattern = dir.join("*.go");
    let pattern = pattern
        .to_str()
        .with_context(|| format!("{} is not valid UTF-8", dir.display()))?;
    let mut paths = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    let mut files: Vec<File> = vec![];
    for path in paths {
        let src = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        if !is_source(&path, &src) {
            continue;
        }
        let file =
            File::try_from(src.as_str()).with_context(|| format!("parsing {}", path.display()))?;
        if let Some(first) = files.first() {
            if first.package != file.package {
                bail!(
                    "{}: found packages {} and {}",
                    dir.display(),
                    first.package,
                    file.package
                );
            }
        }
        files.push(file);
    }

    let Some(first) = files.first() else {
        return Ok(None);
    };
    Ok(Some(Package {
        name: first.package.clone(),
        dir: dir.to_path_buf(),
        files,
    }))
}

/// Loads every package `path` refers to.
pub fn load(path: &str) -> anyhow::Result<Vec<Package>> {
    let mut packages = vec![];
    for dir in package_dirs(path)? {
        packages.extend(load_package(&dir)?);
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, std::fs, tempfile::TempDir};

    fn write(dir: &Path, name: &str, src: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, src).unwrap();
    }

    #[rstest]
    #[case("pkg", "./pkg")]
    #[case("./pkg", "./pkg")]
    #[case("../pkg", "../pkg")]
    #[case("/abs/pkg", "/abs/pkg")]
    #[case("pkg/...", "./pkg/...")]
    fn normalizes_relative_paths(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(normalize(path), expected);
    }

    #[test]
    fn expands_wildcards_below_a_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "a/a.go", "package a\n");
        write(root, "a/b/b.go", "package b\n");
        write(root, "a/testdata/t.go", "package t\n");
        write(root, "a/_skip/s.go", "package s\n");
        write(root, "a/.hidden/h.go", "package h\n");
        write(root, "a/empty/README", "nothing\n");

        let pattern = format!("{}/a/...", root.display());
        let dirs = package_dirs(&pattern).unwrap();
        assert_eq!(dirs, vec![root.join("a"), root.join("a/b")]);
    }

    #[test]
    fn files_stand_for_their_directory() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.go", "package main\n");
        let file = tmp.path().join("main.go");
        let dirs = package_dirs(file.to_str().unwrap()).unwrap();
        assert_eq!(dirs, vec![tmp.path().to_path_buf()]);
    }

    #[test]
    fn skips_tests_and_generated_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.go", "package main\n\nfunc f() {}\n");
        write(tmp.path(), "main_test.go", "package main\n\nfunc g() {}\n");
        write(
            tmp.path(),
            "coroc_generated.go",
            &format!("{GENERATED_MARKER}\n\npackage main\n\nfunc f() {{}}\n"),
        );
        let package = load_package(tmp.path()).unwrap().unwrap();
        assert_eq!(package.name, "main");
        assert_eq!(package.files.len(), 1);
        assert_eq!(package.files[0].funcs[0].name, "f");
    }

    #[test]
    fn rejects_mixed_packages() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.go", "package a\n");
        write(tmp.path(), "b.go", "package b\n");
        let error = load_package(tmp.path()).unwrap_err();
        assert!(error.to_string().contains("found packages a and b"));
    }

    #[test]
    fn empty_directories_have_no_package() {
        let tmp = TempDir::new().unwrap();
        assert!(load_package(tmp.path()).unwrap().is_none());
        assert!(package_dirs(&format!("{}/missing", tmp.path().display())).is_err());
    }
}
