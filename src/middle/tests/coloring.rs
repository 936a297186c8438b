use {
    frontend::ast::{File, Package},
    middle::{
        analyze,
        color::ColorError,
        types::{Color, Type},
        Analysis, Error,
    },
    rstest::rstest,
    std::{collections::BTreeMap, path::PathBuf},
};

fn package(dir: &str, src: &str) -> Package {
    let file = File::try_from(src).unwrap();
    Package {
        name: file.package.clone(),
        dir: PathBuf::from(dir),
        files: vec![file],
    }
}

fn colors(analysis: &Analysis) -> BTreeMap<String, String> {
    analysis
        .colors
        .iter()
        .map(|(&id, color)| (analysis.funcs.qualified_name(id), color.to_string()))
        .collect()
}

const CHAIN: &str = "package p

import \"github.com/stealthrocket/coroutine\"

func leaf(n int) {
	coroutine.Yield[int, any](n)
}

func middle(n int) {
	leaf(n + 1)
}

func top() {
	middle(1)
}

func plain(n int) int {
	return n * 2
}

func unrelated() {
	plain(3)
}
";

#[test]
fn propagates_colors_to_every_caller() {
    let analysis = analyze(&[package("p", CHAIN)]).unwrap();
    assert_eq!(
        colors(&analysis),
        BTreeMap::from([
            ("p.leaf".to_owned(), "[int, any]".to_owned()),
            ("p.middle".to_owned(), "[int, any]".to_owned()),
            ("p.top".to_owned(), "[int, any]".to_owned()),
        ])
    );
    assert_eq!(analysis.colored_packages(), [0]);
}

#[test]
fn colors_callers_of_function_values() {
    let src = "package p

import \"github.com/stealthrocket/coroutine\"

func step() {
	coroutine.Yield[string, int](\"tick\")
}

func run() {
	f := step
	f()
}
";
    let analysis = analyze(&[package("p", src)]).unwrap();
    let expected = Color {
        yield_ty: Type::String,
        resume_ty: Type::int(),
    };
    let colored: Vec<_> = analysis.colored_in(0).map(|(_, color)| color).collect();
    assert_eq!(colored, [&expected, &expected]);
}

#[test]
fn colors_across_packages() {
    let step = "package b

import \"github.com/stealthrocket/coroutine\"

func Step(n int) {
	coroutine.Yield[int, any](n)
}
";
    let main = "package main

import \"example.com/b\"

func run() {
	b.Step(1)
}

func idle() {
}
";
    let analysis = analyze(&[package("main", main), package("b", step)]).unwrap();
    assert_eq!(
        colors(&analysis),
        BTreeMap::from([
            ("b.Step".to_owned(), "[int, any]".to_owned()),
            ("main.run".to_owned(), "[int, any]".to_owned()),
        ])
    );
    assert_eq!(analysis.colored_packages(), [0, 1]);
}

#[rstest]
#[case::two_yields("coroutine.Yield[int, any](1)\n\tcoroutine.Yield[string, any](\"x\")")]
#[case::through_callees("ints()\n\tstrings()")]
fn rejects_ambiguous_colors(#[case] body: &str) {
    let src = format!(
        "package p

import \"github.com/stealthrocket/coroutine\"

func ints() {{
	coroutine.Yield[int, any](1)
}}

func strings() {{
	coroutine.Yield[string, any](\"s\")
}}

func both() {{
	{body}
}}
"
    );
    let err = analyze(&[package("p", &src)]).unwrap_err();
    let Error::Color(ColorError::Ambiguous {
        func,
        first,
        second,
    }) = err
    else {
        panic!("expected an ambiguous color, got {err}");
    };
    assert_eq!(func, "p.both");
    let mut found = [first.to_string(), second.to_string()];
    found.sort();
    assert_eq!(found, ["[int, any]", "[string, any]"]);
}

#[test]
fn programs_without_yields_have_no_colors() {
    let analysis = analyze(&[package(
        "p",
        "package p\n\nfunc f(n int) int {\n\treturn n\n}\n",
    )])
    .unwrap();
    assert!(analysis.colors.is_empty());
    assert!(analysis.colored_packages().is_empty());
}
