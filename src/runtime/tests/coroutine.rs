use {
    frontend::ast::{File, Package},
    rstest::rstest,
    runtime::{Coroutine, Program, RestoreError, RuntimeError, Value},
    std::path::PathBuf,
};

const ECHO: &str = "package p

import \"github.com/stealthrocket/coroutine\"

func Echo(n int) int {
	total := 0
	for i := 0; i < n; i++ {
		reply := coroutine.Yield[int, int](i)
		total += reply
	}
	return total
}

func double(n int) int {
	return n * 2
}
";

fn link(src: &str) -> Program {
    let file = File::try_from(src).unwrap();
    let packages = [Package {
        name: file.package.clone(),
        dir: PathBuf::from("p"),
        files: vec![file],
    }];
    let generated = backend::compile(&packages, None).unwrap();
    Program::link(&packages, &generated).unwrap()
}

// Steps the coroutine to completion, replying with ten times each yielded
// value, and returns the yields and the result.
fn converse<'p>(
    program: &'p Program,
    mut coroutine: Coroutine<'p>,
    restart: bool,
) -> (Vec<String>, String) {
    let mut out = Vec::new();
    let mut yields = vec![];
    while coroutine.next(&mut out).unwrap() {
        let Some(&Value::Int(value)) = coroutine.recv() else {
            panic!("expected an int, got {:?}", coroutine.recv());
        };
        yields.push(value.to_string());
        if restart {
            let stack = coroutine.stack().snapshot();
            coroutine = Coroutine::restore(program, 0, "Echo", vec![Value::Int(3)], stack).unwrap();
        }
        coroutine.send(Value::Int(value * 10));
    }
    assert!(coroutine.done());
    let result = coroutine.result().unwrap().to_string();
    (yields, result)
}

#[rstest]
#[case::same_driver(false)]
#[case::fresh_driver_per_step(true)]
fn yields_return_the_values_sent(#[case] restart: bool) {
    let program = link(ECHO);
    let coroutine = Coroutine::new(&program, 0, "Echo", vec![Value::Int(3)]).unwrap();
    let (yields, result) = converse(&program, coroutine, restart);
    assert_eq!(yields, ["0", "1", "2"]);
    assert_eq!(result, "30");
}

#[test]
fn suspended_frames_hold_the_instruction_pointer_and_slots() {
    let program = link(ECHO);
    let mut coroutine = Coroutine::new(&program, 0, "Echo", vec![Value::Int(3)]).unwrap();
    assert!(coroutine.next(&mut Vec::new()).unwrap());

    let frames = coroutine.stack().frames();
    assert_eq!(frames.len(), 2);
    // `total := 0` and `i := 0` completed; the loop body has not
    assert_eq!(frames[0].ip, 3);
    assert_eq!(frames[1].ip, 1);
    let slots: Vec<_> = (0..4)
        .map(|index| frames[0].get(index).map(ToString::to_string))
        .collect();
    assert_eq!(
        slots,
        [
            Some("3".to_owned()),
            Some("0".to_owned()),
            Some("0".to_owned()),
            Some("0".to_owned())
        ]
    );
}

#[test]
fn snapshots_resume_independently() {
    let program = link(ECHO);
    let mut original = Coroutine::new(&program, 0, "Echo", vec![Value::Int(2)]).unwrap();
    let mut out = Vec::new();
    assert!(original.next(&mut out).unwrap());
    let snapshot = original.stack().snapshot();

    original.send(Value::Int(7));
    assert!(original.next(&mut out).unwrap());
    original.send(Value::Int(8));
    assert!(!original.next(&mut out).unwrap());
    assert_eq!(original.result().unwrap().to_string(), "15");

    // the snapshot still sits at the first yield
    let mut restored =
        Coroutine::restore(&program, 0, "Echo", vec![Value::Int(2)], snapshot).unwrap();
    restored.send(Value::Int(1));
    assert!(restored.next(&mut out).unwrap());
    restored.send(Value::Int(2));
    assert!(!restored.next(&mut out).unwrap());
    assert_eq!(restored.result().unwrap().to_string(), "3");
}

#[test]
fn restores_check_slot_types() {
    let program = link(ECHO);
    let mut coroutine = Coroutine::new(&program, 0, "Echo", vec![Value::Int(3)]).unwrap();
    assert!(coroutine.next(&mut Vec::new()).unwrap());

    let mut stack = coroutine.stack().snapshot();
    stack.frame_mut(0).set(1, Value::Str("zero".to_owned()));
    let mut tampered =
        Coroutine::restore(&program, 0, "Echo", vec![Value::Int(3)], stack).unwrap();
    let err = tampered.next(&mut Vec::new()).unwrap_err();
    assert!(
        matches!(
            err,
            RuntimeError::Restore(RestoreError::TypeMismatch { index: 1, .. })
        ),
        "{err}"
    );
    assert!(tampered.done());
}

#[test]
fn only_compiled_functions_are_coroutines() {
    let program = link(ECHO);
    let err = Coroutine::new(&program, 0, "double", vec![Value::Int(1)]).unwrap_err();
    assert_eq!(err, RuntimeError::NotCoroutine("double".to_owned()));
    let err = Coroutine::new(&program, 0, "missing", vec![]).unwrap_err();
    assert_eq!(err, RuntimeError::Undefined("missing".to_owned()));
}

#[test]
fn plain_calls_run_outside_coroutines() {
    let program = link(ECHO);
    let mut out = Vec::new();
    let doubled = program.call(0, "double", vec![Value::Int(21)], &mut out).unwrap();
    assert_eq!(doubled.to_string(), "42");

    // compiled functions need a context to push their frames onto
    let err = program
        .call(0, "Echo", vec![Value::Int(1)], &mut out)
        .unwrap_err();
    assert_eq!(err, RuntimeError::NoContext);
}

#[test]
fn drive_prints_each_yield() {
    let program = link(ECHO);
    let mut out = Vec::new();
    let result = runtime::drive(&program, 0, "Echo", vec![Value::Int(2)], false, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "yield: 0\nyield: 1\n");
    // nothing was sent, so every yield returned the zero value
    assert_eq!(result.unwrap().to_string(), "0");
}
