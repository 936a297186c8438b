mod common;

use {
    backend::compile::CompiledFunc,
    frontend::{
        ast::{BinaryOp, BranchKind, Expr, Lit, Stmt, StmtKind},
        visit::{walk_stmt, Visitor},
    },
    middle::types::Type,
    rstest::rstest,
};

const WALK: &str = "package p

import (
	\"fmt\"

	\"github.com/stealthrocket/coroutine\"
)

func Walk(xs []int) int {
	total := 0
	for i, x := range xs {
		if x < 0 {
			continue
		}
		coroutine.Yield[int, any](x)
		total += i
	}
	fmt.Println(total)
	return total
}
";

const SHADOW: &str = "package p

import \"github.com/stealthrocket/coroutine\"

func Shadow(a int) (out int) {
	x := a
	if x > 0 {
		x := x * 2
		coroutine.Yield[int, any](x)
		out = x
	}
	coroutine.Yield[int, any](x)
	return
}
";

fn compiled(src: &str) -> CompiledFunc {
    let mut file = common::compile(&[src], None);
    assert_eq!(file.funcs.len(), 1);
    file.funcs.remove(0)
}

fn int_lit(expr: &Expr) -> Option<i64> {
    match *expr {
        Expr::Lit(Lit::Int(value)) => Some(value),
        _ => None,
    }
}

// the `N` of `_f.IP = N`
fn ip_reset(stmt: &Stmt) -> Option<i64> {
    match &stmt.kind {
        StmtKind::Assign { lhs, rhs, .. } if lhs.len() == 1 && lhs[0].to_string() == "_f.IP" => {
            int_lit(&rhs[0])
        }
        _ => None,
    }
}

#[derive(Default)]
struct Collector {
    // case guards of every dispatch switch
    switches: Vec<Vec<(i64, Vec<Stmt>)>>,
    // ip reset at the end of every loop body, with the first guard of the body
    loops: Vec<(Option<String>, i64, Option<i64>)>,
    // target label and reset of every `continue`
    continues: Vec<(String, i64)>,
    label: Option<String>,
}

impl Collector {
    // `continue L` is preceded by the reset of the loop's instruction pointer
    fn scan_continues(&mut self, block: &[Stmt]) {
        for pair in block.windows(2) {
            if let [reset, Stmt {
                kind:
                    StmtKind::Branch {
                        kind: BranchKind::Continue,
                        label: Some(label),
                    },
                ..
            }] = pair
            {
                self.continues.push((label.clone(), ip_reset(reset).unwrap()));
            }
        }
    }
}

impl Visitor for Collector {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::If { body, .. } | StmtKind::For { body, .. } | StmtKind::Block(body) => {
                self.scan_continues(body)
            }
            StmtKind::Switch { cases, .. } => {
                for case in cases {
                    self.scan_continues(&case.body);
                }
            }
            _ => {}
        }
        match &stmt.kind {
            StmtKind::Labeled { label, .. } => self.label = Some(label.clone()),
            StmtKind::Switch {
                tag: None, cases, ..
            } => {
                let guards: Option<Vec<_>> = cases
                    .iter()
                    .map(|case| match case.exprs.as_deref() {
                        Some(
                            [Expr::Binary {
                                op: BinaryOp::Lt,
                                lhs,
                                rhs,
                            }],
                        ) if lhs.to_string() == "_f.IP" => {
                            int_lit(rhs).map(|end| (end, case.body.clone()))
                        }
                        _ => None,
                    })
                    .collect();
                self.switches.extend(guards);
            }
            StmtKind::For { body, .. } => {
                let first_guard = match body.first().map(|stmt| &stmt.kind) {
                    Some(StmtKind::Switch { cases, .. }) => cases
                        .first()
                        .and_then(|case| case.exprs.as_ref())
                        .and_then(|exprs| match exprs.first() {
                            Some(Expr::Binary { rhs, .. }) => int_lit(rhs),
                            _ => None,
                        }),
                    _ => None,
                };
                let reset = body.last().and_then(ip_reset).unwrap();
                self.loops.push((self.label.take(), reset, first_guard));
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }
}

fn collect(func: &CompiledFunc) -> Collector {
    let mut collector = Collector::default();
    collector.scan_continues(&func.body);
    for stmt in &func.body {
        collector.visit_stmt(stmt);
    }
    collector
}

#[rstest]
#[case::walk(WALK)]
#[case::shadow(SHADOW)]
fn cases_record_their_end_and_fall_through(#[case] src: &str) {
    let func = compiled(src);
    let collector = collect(&func);
    assert!(!collector.switches.is_empty());
    for cases in &collector.switches {
        assert!(cases.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert!(cases.first().is_some_and(|(end, _)| *end > 1));
        let (last, rest) = cases.split_last().unwrap();
        for (end, body) in rest {
            let [.., reset, fallthrough] = body.as_slice() else {
                panic!("case ending at {end} is too short");
            };
            assert_eq!(ip_reset(reset), Some(*end));
            assert_eq!(
                fallthrough.kind,
                StmtKind::Branch {
                    kind: BranchKind::Fallthrough,
                    label: None
                }
            );
        }
        assert!(!matches!(
            last.1.last().map(|stmt| &stmt.kind),
            Some(StmtKind::Branch {
                kind: BranchKind::Fallthrough,
                ..
            })
        ));
    }
}

#[test]
fn loops_restart_at_their_first_statement() {
    let func = compiled(WALK);
    let collector = collect(&func);
    let [(Some(label), reset, Some(first_guard))] = collector.loops.as_slice() else {
        panic!("expected one labeled loop, got {:?}", collector.loops);
    };
    // the first statement of the body spans exactly one value
    assert_eq!(*first_guard, reset + 1);
    // `continue` resets the instruction pointer before jumping
    assert_eq!(collector.continues, [(label.clone(), *reset)]);
}

#[test]
fn functions_with_results_end_in_a_panic() {
    let func = compiled(WALK);
    assert_eq!(
        func.body.last().map(ToString::to_string).as_deref(),
        Some("panic(\"unreachable\")")
    );
}

#[test]
fn shadowed_locals_get_their_own_slots() {
    let func = compiled(SHADOW);
    let restores: Vec<_> = func
        .prologue
        .restores
        .iter()
        .map(|restore| (restore.index, restore.name.as_str(), restore.ty.clone()))
        .collect();
    assert_eq!(
        restores,
        [
            (0, "a", Type::int()),
            (1, "out", Type::int()),
            (2, "_v0", Type::int()),
            (3, "_v1", Type::int()),
        ]
    );
    assert_eq!(
        func.prologue.locals,
        [("_v0".to_owned(), Type::int()), ("_v1".to_owned(), Type::int())]
    );

    let saves: Vec<_> = func
        .on_exit
        .saves
        .iter()
        .map(|slot| (slot.index, slot.name.as_str()))
        .collect();
    assert_eq!(saves, [(0, "a"), (1, "out"), (2, "_v0"), (3, "_v1")]);

    // the inner declaration writes its own variable
    let text = func.body.iter().map(ToString::to_string).collect::<String>();
    assert!(text.contains("_v1 = _v0 * 2"));
    assert!(text.contains("coroutine.Yield[int, any](_v1)"));
    assert!(text.contains("out = _v1"));
    assert!(text.contains("coroutine.Yield[int, any](_v0)"));
}

#[test]
fn slots_are_stable_across_compilations() {
    assert_eq!(compiled(SHADOW), compiled(SHADOW));
}
