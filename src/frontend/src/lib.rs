pub mod ast;
mod lexer;
mod parser;
pub mod printer;
pub mod visit;

use derive_more::Display;

#[derive(Debug, Clone, Display)]
pub enum ParseError {
    #[display("lex error: {}", _0.join(", "))]
    Lex(Vec<String>),
    #[display("parse error: {}", _0.join(", "))]
    Parse(Vec<String>),
}

impl std::error::Error for ParseError {}

fn messages<E: ToString>(errs: Vec<E>) -> Vec<String> {
    errs.iter().map(ToString::to_string).collect()
}

impl TryFrom<&str> for ast::File {
    type Error = ParseError;

    fn try_from(src: &str) -> Result<Self, Self::Error> {
        use chumsky::Parser;

        let tokens = lexer::lexer()
            .parse(src)
            .into_result()
            .map_err(|errs| ParseError::Lex(messages(errs)))?;
        let tokens = lexer::insert_semicolons(tokens);

        let mut file = parser::file_parser()
            .parse(tokens.as_slice())
            .into_result()
            .map_err(|errs| ParseError::Parse(messages(errs)))?;

        for func in &mut file.funcs {
            func.renumber();
        }
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::ast::*;

    fn parse(src: &str) -> File {
        File::try_from(src).unwrap()
    }

    #[test]
    fn inserts_semicolons_at_line_ends() {
        let file = parse(
            "package main\n\
             \n\
             import \"github.com/stealthrocket/coroutine\"\n\
             \n\
             func Squares(n int) {\n\
             \tfor i := 1; i <= n; i++ {\n\
             \t\tcoroutine.Yield[int, any](i * i)\n\
             \t}\n\
             }\n",
        );
        assert_eq!(file.package, "main");
        assert_eq!(file.imports[0].local_name(), "coroutine");
        let body = file.funcs[0].body.as_ref().unwrap();
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0].kind, StmtKind::For { .. }));
    }

    #[test]
    fn distinguishes_type_switches() {
        let file = parse(
            "package p\n\
             func f(x any) {\n\
             \tswitch v := x.(type) {\n\
             \tcase int:\n\
             \t\t_ = v\n\
             \t}\n\
             \tswitch y := 1; y {\n\
             \tcase 1, 2:\n\
             \tdefault:\n\
             \t}\n\
             }\n",
        );
        let body = file.funcs[0].body.as_ref().unwrap();
        assert!(matches!(body[0].kind, StmtKind::TypeSwitch { .. }));
        assert!(matches!(
            body[1].kind,
            StmtKind::Switch {
                init: Some(_),
                tag: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn groups_parameter_names() {
        let file = parse("package p\nfunc f(a, b int, c string) (int, error)\n");
        let ty = &file.funcs[0].ty;
        assert_eq!(ty.params.len(), 2);
        assert_eq!(ty.params[0].names.len(), 2);
        assert_eq!(ty.result_types().count(), 2);
        assert!(file.funcs[0].body.is_none());
    }

    #[test]
    fn printed_source_parses_to_the_same_tree() {
        let src = "package p\n\
                   \n\
                   import (\n\
                   \t\"fmt\"\n\
                   \tco \"github.com/stealthrocket/coroutine\"\n\
                   )\n\
                   \n\
                   func f(xs []int) (total int) {\n\
                   outer:\n\
                   \tfor _, x := range xs {\n\
                   \t\tif x > 10 {\n\
                   \t\t\tbreak outer\n\
                   \t\t} else if x < 0 {\n\
                   \t\t\tcontinue\n\
                   \t\t}\n\
                   \t\ttotal += (x + 1) * 2\n\
                   \t}\n\
                   \tfmt.Println(\"total:\", total, map[string]int{\"a\": 1})\n\
                   \tco.Yield[int, any](-total)\n\
                   \treturn\n\
                   }\n";
        let file = parse(src);
        let printed = file.to_string();
        assert_eq!(parse(&printed), file);
    }

    #[test]
    fn numbers_nodes_in_source_order() {
        let file = parse("package p\nfunc f(a int) {\n\tb := a\n\t_ = b\n}\n");
        let func = &file.funcs[0];
        assert_eq!(func.ty.params[0].names[0].id, NodeId(1));
        let body = func.body.as_ref().unwrap();
        assert_eq!(body[0].id, NodeId(2));
        let StmtKind::Assign { lhs, .. } = &body[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(lhs[0].as_ident().unwrap().id, NodeId(3));
    }

    #[test]
    fn rejects_malformed_source() {
        assert!(File::try_from("package p\nfunc f( {\n").is_err());
    }
}
