//! The few standard library functions programs may call: printing and
//! formatting from `fmt`, plus small helpers of `strconv`, `strings` and
//! `errors`.

use {
    crate::{value::Value, RuntimeError},
    std::io::Write,
};

fn string_arg(args: &[Value], index: usize) -> Result<&str, RuntimeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        other => Err(RuntimeError::Type(format!(
            "expected a string argument, found {}",
            other.map_or_else(|| "nothing".to_owned(), Value::type_name)
        ))),
    }
}

fn int_arg(args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    match args.get(index) {
        Some(&Value::Int(n)) => Ok(n),
        other => Err(RuntimeError::Type(format!(
            "expected an integer argument, found {}",
            other.map_or_else(|| "nothing".to_owned(), Value::type_name)
        ))),
    }
}

/// `fmt.Sprint`: operands are separated by a space when neither side is a
/// string.
pub fn sprint(args: &[Value]) -> String {
    let mut s = String::new();
    for (i, arg) in args.iter().enumerate() {
        let is_str = |value: &Value| matches!(value, Value::Str(_));
        if i > 0 && !is_str(arg) && !is_str(&args[i - 1]) {
            s.push(' ');
        }
        s.push_str(&arg.to_string());
    }
    s
}

pub fn sprintln(args: &[Value]) -> String {
    let mut s = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    s.push('\n');
    s
}

fn pad(s: String, width: Option<usize>, left: bool, zero: bool) -> String {
    let Some(width) = width else {
        return s;
    };
    let len = s.chars().count();
    if len >= width {
        return s;
    }
    let fill = width - len;
    if left {
        format!("{s}{}", " ".repeat(fill))
    } else if zero {
        match s.strip_prefix('-') {
            Some(digits) => format!("-{}{digits}", "0".repeat(fill)),
            None => format!("{}{s}", "0".repeat(fill)),
        }
    } else {
        format!("{}{s}", " ".repeat(fill))
    }
}

fn verb(verb: char, arg: &Value) -> String {
    match (verb, arg) {
        ('d', Value::Int(n)) => n.to_string(),
        ('x', Value::Int(n)) => format!("{n:x}"),
        ('X', Value::Int(n)) => format!("{n:X}"),
        ('x', Value::Str(s)) => s.bytes().map(|b| format!("{b:02x}")).collect(),
        ('c', &Value::Int(n)) => u32::try_from(n)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string(),
        ('q', Value::Str(s)) => format!("{s:?}"),
        ('t', Value::Bool(b)) => b.to_string(),
        ('s' | 'v', arg) => arg.to_string(),
        ('T', arg) => arg.type_name(),
        (verb, arg) => format!("%!{verb}({}={arg})", arg.type_name()),
    }
}

/// `fmt.Sprintf`, for the common verbs with width and the `-` and `0`
/// flags.
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut s = String::new();
    let mut args = args.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            s.push(c);
            continue;
        }
        let (mut left, mut zero) = (false, false);
        while let Some(&flag @ ('-' | '0')) = chars.peek() {
            left |= flag == '-';
            zero |= flag == '0';
            chars.next();
        }
        let mut width = None;
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            width = Some(width.unwrap_or(0) * 10 + digit as usize);
            chars.next();
        }
        match chars.next() {
            None => s.push_str("%!(NOVERB)"),
            Some('%') => s.push('%'),
            Some(c) => match args.next() {
                Some(arg) => s.push_str(&pad(verb(c, arg), width, left, zero)),
                None => s.push_str(&format!("%!{c}(MISSING)")),
            },
        }
    }
    s
}

/// Calls `path.name`.
pub fn call(
    path: &str,
    name: &str,
    args: Vec<Value>,
    out: &mut dyn Write,
) -> Result<Value, RuntimeError> {
    let mut print = |s: String| -> Result<Value, RuntimeError> {
        out.write_all(s.as_bytes())?;
        Ok(Value::Tuple(vec![Value::Int(s.len() as i64), Value::Nil]))
    };
    let value = match (path, name) {
        ("fmt", "Print") => print(sprint(&args))?,
        ("fmt", "Println") => print(sprintln(&args))?,
        ("fmt", "Printf") => print(sprintf(string_arg(&args, 0)?, &args[1..]))?,
        ("fmt", "Sprint") => Value::Str(sprint(&args)),
        ("fmt", "Sprintln") => Value::Str(sprintln(&args)),
        ("fmt", "Sprintf") => Value::Str(sprintf(string_arg(&args, 0)?, &args[1..])),
        ("fmt", "Errorf") => Value::Error(sprintf(string_arg(&args, 0)?, &args[1..])),
        ("errors", "New") => Value::Error(string_arg(&args, 0)?.to_owned()),
        ("strconv", "Itoa") => Value::Str(int_arg(&args, 0)?.to_string()),
        ("strings", "Repeat") => {
            let count = usize::try_from(int_arg(&args, 1)?)
                .map_err(|_| RuntimeError::Panic("strings: negative Repeat count".to_owned()))?;
            Value::Str(string_arg(&args, 0)?.repeat(count))
        }
        ("strings", "ToUpper") => Value::Str(string_arg(&args, 0)?.to_uppercase()),
        ("strings", "ToLower") => Value::Str(string_arg(&args, 0)?.to_lowercase()),
        ("strings", "TrimSpace") => Value::Str(string_arg(&args, 0)?.trim().to_owned()),
        ("strings", "Join") => {
            let elems = args
                .first()
                .and_then(Value::items)
                .unwrap_or_default()
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>();
            Value::Str(elems.join(string_arg(&args, 1)?))
        }
        ("strings", "Contains") => {
            Value::Bool(string_arg(&args, 0)?.contains(string_arg(&args, 1)?))
        }
        ("strings", "HasPrefix") => {
            Value::Bool(string_arg(&args, 0)?.starts_with(string_arg(&args, 1)?))
        }
        ("strings", "HasSuffix") => {
            Value::Bool(string_arg(&args, 0)?.ends_with(string_arg(&args, 1)?))
        }
        _ => return Err(RuntimeError::Unsupported(format!("{path}.{name}"))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn s(value: &str) -> Value {
        Value::Str(value.to_owned())
    }

    #[rstest]
    #[case("%d-%s", vec![Value::Int(4), s("x")], "4-x")]
    #[case("%3d|%-3d|%03d", vec![Value::Int(7), Value::Int(7), Value::Int(-7)], "  7|7  |-07")]
    #[case("%v %t %q", vec![Value::Nil, Value::Bool(true), s("a")], "<nil> true \"a\"")]
    #[case("100%%", vec![], "100%")]
    #[case("%d %d", vec![Value::Int(1)], "1 %!d(MISSING)")]
    fn formats_like_printf(#[case] format: &str, #[case] args: Vec<Value>, #[case] expected: &str) {
        assert_eq!(sprintf(format, &args), expected);
    }

    #[test]
    fn separates_non_string_operands() {
        assert_eq!(sprint(&[Value::Int(1), Value::Int(2), s("a"), Value::Int(3)]), "1 2a3");
        assert_eq!(sprintln(&[s("a"), Value::Int(1)]), "a 1\n");
    }

    #[test]
    fn prints_to_the_output() {
        let mut out = vec![];
        let result = call("fmt", "Println", vec![s("hi"), Value::Int(2)], &mut out);
        assert!(result.is_ok());
        assert_eq!(String::from_utf8_lossy(&out), "hi 2\n");
        assert!(matches!(
            call("os", "Exit", vec![], &mut out),
            Err(RuntimeError::Unsupported(_))
        ));
    }
}
