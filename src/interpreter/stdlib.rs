use std::rc::Rc;

use rand::Rng;

use super::{callable::Builtin, operators::MAX_LENGTH, Callable, Environment, RuntimeError};
use crate::value::{format_number, Value};

const BUILTINS: &[(&str, Builtin)] = &[
    ("print", print),
    ("println", println),
    ("read", read),
    ("stacktrace", stacktrace),
    ("range", range),
    ("len", len),
    ("abs", abs),
    ("ceil", ceil),
    ("floor", floor),
    ("round", round),
    ("sqrt", sqrt),
    ("rnd", rnd),
    ("parse_num", parse_num),
    ("to_string", to_string),
    ("lower", lower),
    ("upper", upper),
    ("split", split),
    ("join", join),
    ("replace", replace),
    ("push", push),
    ("pop", pop),
    ("insert", insert),
    ("remove", remove),
    ("sort", sort),
];

/// Binds every builtin into the environment's globals.
pub fn install(env: &mut Environment) {
    for (name, function) in BUILTINS {
        env.define_global(name, Value::Function(Rc::new(Callable::Builtin(*name, *function))));
    }
}

fn arguments<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
) -> Result<&'a [Value; N], RuntimeError> {
    args.try_into().map_err(|_| RuntimeError::Arity {
        function: name.to_string(),
        expected: N.to_string(),
        found: args.len(),
    })
}

fn type_error(name: &str, expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::Type(format!(
        "{name} expects a {expected}, got {}",
        found.type_name()
    ))
}

fn number(name: &str, value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Number(n) => Ok(*n),
        value => Err(type_error(name, "number", value)),
    }
}

/// Truncates a Number argument toward zero. NaN and infinities are rejected.
fn integer(name: &str, value: &Value) -> Result<i64, RuntimeError> {
    let n = number(name, value)?;
    if !n.is_finite() {
        return Err(RuntimeError::Range(format!(
            "{name} expects a finite number, got {}",
            format_number(n)
        )));
    }
    Ok(n.trunc() as i64)
}

fn string<'v>(name: &str, value: &'v Value) -> Result<&'v str, RuntimeError> {
    match value {
        Value::String(s) => Ok(s),
        value => Err(type_error(name, "string", value)),
    }
}

fn list<'v>(name: &str, value: &'v Value) -> Result<&'v [Value], RuntimeError> {
    match value {
        Value::List(items) => Ok(items),
        value => Err(type_error(name, "list", value)),
    }
}

fn print(args: &[Value], env: &mut Environment) -> Result<Value, RuntimeError> {
    for value in args {
        env.write(&value.printed())?;
    }
    Ok(Value::Nil)
}

fn println(args: &[Value], env: &mut Environment) -> Result<Value, RuntimeError> {
    print(args, env)?;
    env.write("\n")?;
    Ok(Value::Nil)
}

fn read(args: &[Value], env: &mut Environment) -> Result<Value, RuntimeError> {
    arguments::<0>("read", args)?;
    Ok(env.read_line()?.map_or(Value::Nil, Value::String))
}

fn stacktrace(args: &[Value], env: &mut Environment) -> Result<Value, RuntimeError> {
    arguments::<0>("stacktrace", args)?;
    Ok(Value::List(
        env.call_stack()
            .iter()
            .map(|name| Value::String(name.clone()))
            .collect(),
    ))
}

fn range(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [start, stop, step] = arguments::<3>("range", args)?;
    let start = integer("range", start)?;
    let stop = integer("range", stop)?;
    let step = integer("range", step)?;
    if step == 0 {
        return Err(RuntimeError::Range("range step must not be zero".to_string()));
    }

    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let count = ((stop - start + step - step.signum()) / step).max(0);
    if count > MAX_LENGTH as i128 {
        return Err(RuntimeError::Range(format!(
            "range produces {count} elements, more than {MAX_LENGTH}"
        )));
    }
    let items = (0..count)
        .map(|i| Value::Number((start + i * step) as f64))
        .collect();
    Ok(Value::List(items))
}

fn len(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>("len", args)?;
    match value {
        Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::List(items) => Ok(Value::Number(items.len() as f64)),
        value => Err(type_error("len", "string or list", value)),
    }
}

fn math(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>(name, args)?;
    Ok(Value::Number(f(number(name, value)?)))
}

fn abs(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    math("abs", args, f64::abs)
}

fn ceil(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    math("ceil", args, f64::ceil)
}

fn floor(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    math("floor", args, f64::floor)
}

fn round(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    math("round", args, f64::round)
}

fn sqrt(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>("sqrt", args)?;
    let n = number("sqrt", value)?;
    if n < 0.0 {
        return Err(RuntimeError::Range(format!(
            "sqrt of negative number {}",
            format_number(n)
        )));
    }
    Ok(Value::Number(n.sqrt()))
}

fn rnd(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>("rnd", args)?;
    let n = number("rnd", value)?.trunc() as i64;
    if n <= 0 {
        return Err(RuntimeError::Range(format!(
            "rnd bound must be positive, got {n}"
        )));
    }
    Ok(Value::Number(rand::thread_rng().gen_range(0..n) as f64))
}

fn parse_num(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>("parse_num", args)?;
    let text = string("parse_num", value)?;
    Ok(text
        .trim_start()
        .parse::<f64>()
        .map_or(Value::Nil, Value::Number))
}

fn to_string(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>("to_string", args)?;
    Ok(Value::String(format_number(number("to_string", value)?)))
}

fn lower(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>("lower", args)?;
    Ok(Value::String(string("lower", value)?.to_lowercase()))
}

fn upper(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [value] = arguments::<1>("upper", args)?;
    Ok(Value::String(string("upper", value)?.to_uppercase()))
}

fn split(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [text, delimiter] = arguments::<2>("split", args)?;
    let text = string("split", text)?;
    let delimiter = string("split", delimiter)?;
    let pieces = if delimiter.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(delimiter).map(Value::from).collect()
    };
    Ok(Value::List(pieces))
}

fn join(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [items, delimiter] = arguments::<2>("join", args)?;
    let delimiter = string("join", delimiter)?;
    let pieces = list("join", items)?
        .iter()
        .map(|item| string("join", item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(pieces.join(delimiter)))
}

fn replace(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [text, from, to] = arguments::<3>("replace", args)?;
    let text = string("replace", text)?;
    let from = string("replace", from)?;
    let to = string("replace", to)?;
    if from.is_empty() {
        return Ok(Value::String(text.to_string()));
    }
    Ok(Value::String(text.replace(from, to)))
}

fn push(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [items, value] = arguments::<2>("push", args)?;
    let mut items = list("push", items)?.to_vec();
    items.push(value.clone());
    Ok(Value::List(items))
}

/// Returns the last element; the list itself is left as it was.
fn pop(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [items] = arguments::<1>("pop", args)?;
    list("pop", items)?
        .last()
        .cloned()
        .ok_or_else(|| RuntimeError::Range("pop from empty list".to_string()))
}

fn insert(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [items, index, value] = arguments::<3>("insert", args)?;
    let mut items = list("insert", items)?.to_vec();
    let index = number("insert", index)?.trunc();
    if !(0.0..=items.len() as f64).contains(&index) {
        return Err(RuntimeError::Range(format!(
            "insert index {} out of range for length {}",
            format_number(index),
            items.len()
        )));
    }
    items.insert(index as usize, value.clone());
    Ok(Value::List(items))
}

fn remove(args: &[Value], _: &mut Environment) -> Result<Value, RuntimeError> {
    let [items, index] = arguments::<2>("remove", args)?;
    let mut items = list("remove", items)?.to_vec();
    let index = number("remove", index)?.trunc();
    if !(0.0..items.len() as f64).contains(&index) {
        return Err(RuntimeError::Range(format!(
            "remove index {} out of range for length {}",
            format_number(index),
            items.len()
        )));
    }
    items.remove(index as usize);
    Ok(Value::List(items))
}

fn sort(args: &[Value], env: &mut Environment) -> Result<Value, RuntimeError> {
    let (items, comparator) = match args {
        [items] => (items, None),
        [items, comparator] => (items, Some(comparator)),
        _ => {
            return Err(RuntimeError::Arity {
                function: "sort".to_string(),
                expected: "1 or 2".to_string(),
                found: args.len(),
            })
        }
    };
    let items = list("sort", items)?.to_vec();

    let sorted = match comparator {
        None => merge_sort(items, &mut |a: &Value, b: &Value| {
            Ok(a.to_string() < b.to_string())
        })?,
        Some(Value::Function(comparator)) => merge_sort(items, &mut |a: &Value, b: &Value| {
            match comparator.call(vec![a.clone(), b.clone()], env)? {
                Value::Boolean(less) => Ok(less),
                value => Err(RuntimeError::Type(format!(
                    "sort comparator must return a boolean, got {}",
                    value.type_name()
                ))),
            }
        })?,
        Some(value) => return Err(type_error("sort", "function", value)),
    };
    Ok(Value::List(sorted))
}

/// Stable merge sort; ties keep the left run's element first.
fn merge_sort(
    mut items: Vec<Value>,
    less: &mut dyn FnMut(&Value, &Value) -> Result<bool, RuntimeError>,
) -> Result<Vec<Value>, RuntimeError> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, less)?;
    let right = merge_sort(right, less)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        if less(r, l)? {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;

    fn environment() -> (Environment, Rc<RefCell<Vec<u8>>>) {
        let stdout = Rc::new(RefCell::new(Vec::new()));
        let stdin: &'static [u8] = b"line one\n";
        let mut env = Environment::new(stdout.clone(), Rc::new(RefCell::new(stdin)));
        install(&mut env);
        (env, stdout)
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let (mut env, _) = environment();
        let Value::Function(function) = env.get(name)? else {
            panic!("{name} is not a function");
        };
        function.call(args, &mut env)
    }

    fn numbers(items: &[f64]) -> Value {
        items.iter().map(|n| Value::Number(*n)).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_print_quotes_strings_with_spaces() {
        let (mut env, stdout) = environment();
        print(&["hello there".into(), 1.0.into(), "x".into()], &mut env).unwrap();
        println(&[], &mut env).unwrap();
        assert_eq!(
            String::from_utf8(stdout.borrow().clone()).unwrap(),
            "\"hello there\"1x\n"
        );
    }

    #[test]
    fn test_read_returns_nil_at_end_of_input() {
        let (mut env, _) = environment();
        assert_eq!(read(&[], &mut env).unwrap().to_string(), "line one");
        assert!(matches!(read(&[], &mut env).unwrap(), Value::Nil));
        assert!(matches!(
            read(&[Value::Nil], &mut env),
            Err(RuntimeError::Arity { .. })
        ));
    }

    #[test]
    fn test_range() {
        let result = call("range", vec![0.0.into(), 5.0.into(), 2.0.into()]).unwrap();
        assert_eq!(result.to_string(), "[0, 2, 4]");
        let result = call("range", vec![5.0.into(), 0.0.into(), (-2.0).into()]).unwrap();
        assert_eq!(result.to_string(), "[5, 3, 1]");
        assert!(matches!(
            call("range", vec![0.0.into(), 5.0.into(), 0.0.into()]),
            Err(RuntimeError::Range(_))
        ));
    }

    #[test]
    fn test_range_near_integer_limits() {
        let result = call("range", vec![9.2e18.into(), 9.3e18.into(), 1e18.into()]).unwrap();
        assert_eq!(result.to_string(), "[9200000000000000000]");
        let result = call("range", vec![(-9.2e18).into(), (-9.3e18).into(), (-1e18).into()]).unwrap();
        assert_eq!(result.to_string(), "[-9200000000000000000]");
        assert!(matches!(
            call("range", vec![0.0.into(), 1e18.into(), 1.0.into()]),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            call("range", vec![0.0.into(), f64::NAN.into(), 1.0.into()]),
            Err(RuntimeError::Range(_))
        ));
    }

    #[test]
    fn test_math() {
        assert_eq!(call("abs", vec![(-3.0).into()]).unwrap().to_string(), "3");
        assert_eq!(call("ceil", vec![1.2.into()]).unwrap().to_string(), "2");
        assert_eq!(call("floor", vec![(-1.2).into()]).unwrap().to_string(), "-2");
        assert_eq!(call("round", vec![2.5.into()]).unwrap().to_string(), "3");
        assert_eq!(call("sqrt", vec![16.0.into()]).unwrap().to_string(), "4");
        assert!(matches!(
            call("sqrt", vec![(-1.0).into()]),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            call("abs", vec!["x".into()]),
            Err(RuntimeError::Type(_))
        ));
    }

    #[test]
    fn test_rnd_stays_in_bounds() {
        for _ in 0..100 {
            let Value::Number(n) = call("rnd", vec![3.0.into()]).unwrap() else {
                panic!("rnd returned a non-number");
            };
            assert!((0.0..3.0).contains(&n) && n.fract() == 0.0);
        }
        assert!(call("rnd", vec![0.0.into()]).is_err());
    }

    #[test]
    fn test_number_conversions() {
        assert_eq!(call("parse_num", vec!["2.5".into()]).unwrap().to_string(), "2.500000");
        assert!(matches!(
            call("parse_num", vec!["12abc".into()]).unwrap(),
            Value::Nil
        ));
        assert_eq!(call("to_string", vec![7.0.into()]).unwrap().to_string(), "7");
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("upper", vec!["abc".into()]).unwrap().to_string(), "ABC");
        let result = call("split", vec!["a,b,".into(), ",".into()]).unwrap();
        assert_eq!(result.to_string(), "[a, b, ]");
        let result = call("split", vec!["abc".into(), "".into()]).unwrap();
        assert_eq!(result.to_string(), "[a, b, c]");
        let result = call(
            "join",
            vec![Value::List(vec!["a".into(), "b".into()]), "-".into()],
        )
        .unwrap();
        assert_eq!(result.to_string(), "a-b");
        assert!(call("join", vec![numbers(&[1.0]), "-".into()]).is_err());
        let result = call("replace", vec!["aaa".into(), "aa".into(), "b".into()]).unwrap();
        assert_eq!(result.to_string(), "ba");
        let result = call("replace", vec!["abc".into(), "".into(), "x".into()]).unwrap();
        assert_eq!(result.to_string(), "abc");
    }

    #[test]
    fn test_list_functions_leave_input_alone() {
        let original = numbers(&[1.0, 2.0]);
        let pushed = call("push", vec![original.clone(), 3.0.into()]).unwrap();
        assert_eq!(pushed.to_string(), "[1, 2, 3]");
        assert_eq!(original.to_string(), "[1, 2]");
        assert_eq!(call("pop", vec![original.clone()]).unwrap().to_string(), "2");
        assert!(call("pop", vec![numbers(&[])]).is_err());
        let inserted = call("insert", vec![original.clone(), 2.0.into(), 9.0.into()]).unwrap();
        assert_eq!(inserted.to_string(), "[1, 2, 9]");
        assert!(call("insert", vec![original.clone(), 3.0.into(), 9.0.into()]).is_err());
        assert!(matches!(
            call("insert", vec![original.clone(), f64::NAN.into(), 9.0.into()]),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            call("remove", vec![original.clone(), f64::NAN.into()]),
            Err(RuntimeError::Range(_))
        ));
        let removed = call("remove", vec![original.clone(), 0.0.into()]).unwrap();
        assert_eq!(removed.to_string(), "[2]");
        assert!(call("remove", vec![original, 2.0.into()]).is_err());
    }

    #[test]
    fn test_sort_is_stable_by_rendering() {
        let result = call("sort", vec![numbers(&[10.0, 9.0, 2.0, 1.0])]).unwrap();
        assert_eq!(result.to_string(), "[1, 10, 2, 9]");
        let mixed = Value::List(vec!["1".into(), 1.0.into()]);
        let result = call("sort", vec![mixed]).unwrap();
        assert!(matches!(&result, Value::List(items) if matches!(items[0], Value::String(_))));
        assert!(matches!(
            call("sort", vec![numbers(&[1.0, 2.0]), 1.0.into()]),
            Err(RuntimeError::Type(_))
        ));
    }
}
