use {
    frontend::ast::{File, Package},
    middle::{
        analyze,
        validate::{validate, Unsupported, ValidationError},
    },
    rstest::rstest,
    std::path::PathBuf,
};

// Wraps `body` in a function that also yields, so that it is colored. `g` is
// a plain function and `h` suspends.
fn validate_body(params: &str, body: &str) -> Result<(), ValidationError> {
    let src = format!(
        "package p

import \"github.com/stealthrocket/coroutine\"

func g() int {{
	return 1
}}

func h() int {{
	coroutine.Yield[int, any](0)
	return 1
}}

func f({params}) {{
	{body}
	coroutine.Yield[int, any](0)
}}
"
    );
    let file = File::try_from(src.as_str()).unwrap();
    let packages = [Package {
        name: file.package.clone(),
        dir: PathBuf::from("p"),
        files: vec![file],
    }];
    let analysis = analyze(&packages).unwrap();
    let id = analysis.funcs.lookup(0, "f").unwrap();
    assert!(analysis.colors.contains_key(&id));
    let (_, func) = packages[0].funcs().find(|(_, func)| func.name == "f").unwrap();
    validate(func, &analysis.infos[&id], &analysis)
}

#[rstest]
#[case::defer("", "defer println(1)", "defer")]
#[case::go("", "go println(1)", "go")]
#[case::label("", "here:\n\tprintln(1)", "labels not attached to for/switch/select")]
#[case::select("", "select {\n\tdefault:\n\t}", "select")]
#[case::type_switch("v any", "switch v.(type) {\n\tcase int:\n\t}", "type switch")]
#[case::inline_decl("", "var x int\n\tx++", "inline decls")]
#[case::multiple_assign("", "a, b := 1, 2\n\ta += b", "multiple assign")]
#[case::assign_to_index("xs []int", "xs[0] = 2", "assign to non-ident")]
#[case::goto("", "goto done\ndone:\n\tprintln(1)", "goto")]
#[case::fallthrough(
    "n int",
    "switch n {\n\tcase 1:\n\t\tfallthrough\n\tdefault:\n\t}",
    "fallthrough"
)]
#[case::range_over_map(
    "m map[string]int",
    "for k := range m {\n\t\tprintln(k)\n\t}",
    "for range map[string]int"
)]
#[case::range_over_string("s string", "for i := range s {\n\t\tprintln(i)\n\t}", "for range string")]
#[case::post_index("xs []int", "for i := 0; i < 3; xs[0]++ {\n\t\tprintln(i)\n\t}", "for post inc/dec index expression")]
#[case::post_assign("", "for i := 0; i < 3; i += 1 {\n\t\tprintln(i)\n\t}", "for post assignment")]
#[case::func_lit("", "h := func() {\n\t}\n\th()", "func literals")]
#[case::multiple_calls("", "println(g(), g())", "multiple function calls in an expression")]
#[case::suspending_if(
    "",
    "if h() > 0 {\n\t\tcoroutine.Yield[int, any](1)\n\t}",
    "suspending call in condition"
)]
#[case::suspending_else(
    "",
    "if h() > 0 {\n\t} else {\n\t\tcoroutine.Yield[int, any](1)\n\t}",
    "suspending call in condition"
)]
#[case::suspending_for(
    "",
    "for i := 0; i < h(); i++ {\n\t\tcoroutine.Yield[int, any](i)\n\t}",
    "suspending call in condition"
)]
#[case::suspending_tag(
    "",
    "switch h() {\n\tcase 1:\n\t\tcoroutine.Yield[int, any](1)\n\t}",
    "suspending call in condition"
)]
#[case::suspending_case(
    "n int",
    "switch n {\n\tcase h():\n\t\tcoroutine.Yield[int, any](1)\n\t}",
    "suspending call in condition"
)]
fn rejects_unsupported_constructs(#[case] params: &str, #[case] body: &str, #[case] expected: &str) {
    let err = validate_body(params, body).unwrap_err();
    assert_eq!(err.func, "f");
    assert_eq!(err.unsupported.to_string(), expected);
    assert_eq!(err.to_string(), format!("f: not implemented: {expected}"));
}

#[rstest]
#[case::loops("xs []int", "for i, x := range xs {\n\t\tprintln(i, x)\n\t}")]
#[case::labeled_loops("", "outer:\n\tfor i := 0; i < 3; i++ {\n\t\tcontinue outer\n\t}")]
#[case::switches("n int", "switch n {\n\tcase 1:\n\t\tn++\n\tdefault:\n\t\tn--\n\t}")]
#[case::builtins_are_not_counted("xs []int", "n := len(xs) + g()\n\tn++")]
#[case::conversions_are_not_counted("n int", "m := int64(n) + int64(g())\n\tm++")]
#[case::suspending_condition_with_plain_body("", "if h() > 0 {\n\t\tprintln(1)\n\t}")]
#[case::plain_condition_with_suspending_body(
    "",
    "if g() > 0 {\n\t\tcoroutine.Yield[int, any](1)\n\t}"
)]
#[case::suspending_call_in_body("", "for i := 0; i < 3; i++ {\n\t\th()\n\t}")]
fn accepts_supported_constructs(#[case] params: &str, #[case] body: &str) {
    validate_body(params, body).unwrap();
}

#[test]
fn reports_the_first_unsupported_construct() {
    let err = validate_body("", "defer println(1)\n\tgo println(2)").unwrap_err();
    assert_eq!(err.unsupported, Unsupported::Defer);
}
