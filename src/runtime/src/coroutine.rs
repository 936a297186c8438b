use {
    crate::{
        frame::Stack,
        interp::{Interp, Signal},
        value::{Func, Value},
        Code, Program, RuntimeError,
    },
    middle::types::Color,
    std::io::Write,
};

/// State shared by every compiled call of one coroutine.
#[derive(Debug, Clone)]
pub struct Context {
    pub color: Color,
    pub stack: Stack,
    /// Set by a suspending yield until the stack has been unwound.
    pub unwinding: bool,
    pub yielded: Option<Value>,
    // handed to the suspended yield when the coroutine resumes
    pub resume: Option<Value>,
}

impl Context {
    pub fn new(color: Color) -> Self {
        Self {
            color,
            stack: Stack::default(),
            unwinding: false,
            yielded: None,
            resume: None,
        }
    }
}

/// Drives a compiled entry function: every step re-enters it from the
/// outermost frame until the next yield, or until it returns.
#[derive(Debug)]
pub struct Coroutine<'p> {
    program: &'p Program,
    entry: Func,
    args: Vec<Value>,
    context: Context,
    result: Option<Value>,
    done: bool,
}

impl<'p> Coroutine<'p> {
    pub fn new(
        program: &'p Program,
        package: usize,
        entry: &str,
        args: Vec<Value>,
    ) -> Result<Self, RuntimeError> {
        let function = program
            .function(package, entry)
            .ok_or_else(|| RuntimeError::Undefined(entry.to_owned()))?;
        let Code::Compiled(ref compiled) = function.code else {
            return Err(RuntimeError::NotCoroutine(entry.to_owned()));
        };
        Ok(Self {
            program,
            entry: Func::Named {
                package,
                name: entry.to_owned(),
            },
            args,
            context: Context::new(compiled.color.clone()),
            result: None,
            done: false,
        })
    }

    /// Picks up a coroutine from a stack saved by [`Coroutine::stack`], e.g.
    /// in another process.
    pub fn restore(
        program: &'p Program,
        package: usize,
        entry: &str,
        args: Vec<Value>,
        stack: Stack,
    ) -> Result<Self, RuntimeError> {
        let mut coroutine = Self::new(program, package, entry, args)?;
        coroutine.context.stack = stack;
        Ok(coroutine)
    }

    /// Runs until the next yield, returning `false` once the entry function
    /// has returned.
    pub fn next(&mut self, out: &mut impl Write) -> Result<bool, RuntimeError> {
        if self.done {
            return Ok(false);
        }
        self.context.stack.rewind();
        self.context.unwinding = false;
        self.context.yielded = None;
        let mut interp = Interp::new(self.program, Some(&mut self.context), out);
        match interp.call(&self.entry, self.args.clone()) {
            Ok(result) => {
                self.done = true;
                self.result = Some(result);
                Ok(false)
            }
            Err(Signal::Suspend) => Ok(true),
            Err(Signal::Error(error)) => {
                self.done = true;
                Err(error)
            }
        }
    }

    /// The value handed out by the last yield.
    pub fn recv(&self) -> Option<&Value> {
        self.context.yielded.as_ref()
    }

    /// Sets the value the suspended yield returns on the next step.
    pub fn send(&mut self, value: Value) {
        self.context.resume = Some(value);
    }

    pub fn stack(&self) -> &Stack {
        &self.context.stack
    }

    pub fn done(&self) -> bool {
        self.done
    }

    /// The return value of the entry function, once done.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }
}

/// Steps the coroutine of `entry` to completion, writing every yielded value
/// on its own line. With `restart`, each step after a yield runs on a fresh
/// driver restored from a snapshot of the stack, the way a coroutine resumes
/// in another process.
pub fn drive(
    program: &Program,
    package: usize,
    entry: &str,
    args: Vec<Value>,
    restart: bool,
    out: &mut impl Write,
) -> Result<Option<Value>, RuntimeError> {
    let mut coroutine = Coroutine::new(program, package, entry, args.clone())?;
    while coroutine.next(out)? {
        if let Some(value) = coroutine.recv() {
            writeln!(out, "yield: {value}")?;
        }
        if restart {
            let stack = coroutine.stack().snapshot();
            coroutine = Coroutine::restore(program, package, entry, args.clone(), stack)?;
        }
    }
    Ok(coroutine.result().cloned())
}
