mod common;

use {backend::emit::GENERATED_MARKER, frontend::ast::File, rstest::rstest};

const SQUARES: &str = "package main

import \"github.com/stealthrocket/coroutine\"

func Squares(n int) {
	for i := 1; i <= n; i++ {
		coroutine.Yield[int, any](i * i)
	}
}
";

#[test]
fn emits_resumable_functions() {
    let file = common::compile(&[SQUARES], None);
    let expected = format!(
        "{GENERATED_MARKER}

package main

import \"github.com/stealthrocket/coroutine\"

func Squares(n int) {{
	_c := coroutine.LoadContext[int, any]()
	_f := _c.Push()
	var _v0 int
	if _f.IP > 0 {{
		n = _f.Get(0).(int)
		_v0 = _f.Get(1).(int)
	}}
	defer func() {{
		if _c.Unwinding() {{
			_f.Set(0, n)
			_f.Set(1, _v0)
		}} else {{
			_c.Pop()
		}}
	}}()
	switch {{
	case _f.IP < 2:
		_v0 = 1
		_f.IP = 2
		fallthrough
	case _f.IP < 3:
		for ; _v0 <= n; _v0++ {{
			coroutine.Yield[int, any](_v0 * _v0)
			_f.IP = 2
		}}
	}}
}}
"
    );
    assert_eq!(file.to_string(), expected);
}

#[rstest]
#[case::none(None, "package main\n")]
#[case::durable(Some("durable"), "//go:build durable\n\npackage main\n")]
#[case::empty(Some(""), "package main\n")]
#[case::blank(Some("  "), "package main\n")]
fn writes_the_header_and_build_constraint(#[case] tags: Option<&str>, #[case] after_marker: &str) {
    let text = common::compile(&[SQUARES], tags).to_string();
    assert!(
        text.starts_with(&format!("{GENERATED_MARKER}\n\n{after_marker}")),
        "{text}"
    );
}

#[test]
fn keeps_only_the_imports_compiled_code_uses() {
    let src = "package p

import (
	\"fmt\"
	\"strings\"

	co \"github.com/stealthrocket/coroutine\"
)

func shout(s string) string {
	return strings.ToUpper(s)
}

func Greet(name string) {
	fmt.Println(\"hello\", name)
	co.Yield[string, any](name)
}
";
    let file = common::compile(&[src], None);
    let text = file.to_string();
    assert!(text.contains(
        "import (\n\t\"fmt\"\n\tco \"github.com/stealthrocket/coroutine\"\n)\n"
    ));
    assert!(text.contains("_c := co.LoadContext[string, any]()"));
    assert!(!text.contains("strings"));
    // uncolored functions stay in the source files
    assert!(!text.contains("func shout"));
}

#[test]
fn imports_the_runtime_for_indirectly_colored_functions() {
    let inner = "package p

import \"github.com/stealthrocket/coroutine\"

func Inner() {
	coroutine.Yield[int, any](1)
}
";
    let outer = "package p

func Outer() {
	Inner()
	Inner()
}
";
    let file = common::compile(&[inner, outer], None);
    let names: Vec<_> = file.funcs.iter().map(|func| func.name.as_str()).collect();
    assert_eq!(names, ["Inner", "Outer"]);
    assert_eq!(file.imports.len(), 1);
    assert_eq!(file.funcs[1].imports, file.imports);
    assert!(file
        .to_string()
        .contains("_c := coroutine.LoadContext[int, any]()\n\t_f := _c.Push()\n\tif _f.IP > 0 {\n\t}"));
}

#[test]
fn generated_code_parses_back() {
    let file = common::compile(&[SQUARES], Some("durable"));
    let reparsed = File::try_from(file.to_string().as_str()).unwrap();
    assert_eq!(reparsed.to_string(), file.to_file().to_string());
}
