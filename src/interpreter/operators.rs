use super::RuntimeError;
use crate::{
    tree::{BinaryOperator, UnaryOperator},
    value::{format_number, rendered_eq, Value},
};

/// Applies a binary operator to two already evaluated operands. `and`/`or`
/// land here only from compound contexts; the evaluator short-circuits them.
pub fn binary(operator: BinaryOperator, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use BinaryOperator as Op;

    match (operator, left, right) {
        (Op::Add, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Op::Add, Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (Op::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Op::Subtract, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (Op::Subtract, Value::String(a), Value::String(b)) => match a.strip_suffix(b.as_str()) {
            Some(rest) => Ok(Value::String(rest.to_string())),
            None => Err(RuntimeError::Range(format!(
                "\"{b}\" is not a suffix of \"{a}\""
            ))),
        },
        (Op::Multiply, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (Op::Multiply, Value::String(a), Value::Number(n)) => {
            let times = repetitions(a.len(), n)?;
            Ok(Value::String(a.repeat(times)))
        }
        (Op::Multiply, Value::List(a), Value::Number(n)) => {
            let times = repetitions(a.len(), n)?;
            let mut items = Vec::with_capacity(a.len() * times);
            for _ in 0..times {
                items.extend(a.iter().cloned());
            }
            Ok(Value::List(items))
        }
        (Op::Divide, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
        (Op::Modulo, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a % b)),
        (Op::Power, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a.powf(b))),
        (Op::Equal, a, b) => Ok(Value::Boolean(rendered_eq(&a, &b))),
        (Op::NotEqual, a, b) => Ok(Value::Boolean(!rendered_eq(&a, &b))),
        (Op::Less, Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a < b)),
        (Op::LessEqual, Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a <= b)),
        (Op::Greater, Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a > b)),
        (Op::GreaterEqual, Value::Number(a), Value::Number(b)) => Ok(Value::Boolean(a >= b)),
        (
            operator @ (Op::Less | Op::LessEqual | Op::Greater | Op::GreaterEqual),
            a,
            b,
        ) => Err(RuntimeError::UnknownOperator(format!(
            "{} {operator} {}",
            a.type_name(),
            b.type_name()
        ))),
        (Op::And, a, b) => Ok(Value::Boolean(a.is_truthy() && b.is_truthy())),
        (Op::Or, a, b) => Ok(Value::Boolean(a.is_truthy() || b.is_truthy())),
        (Op::Index, container, key) => index(&container, &key),
        (Op::Slice, start, end) => Ok(Value::List(vec![start, end])),
        (operator, a, b) => Err(RuntimeError::Type(format!(
            "unsupported operand types for {operator}: {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub fn unary(operator: UnaryOperator, operand: Value) -> Result<Value, RuntimeError> {
    match (operator, operand) {
        (UnaryOperator::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOperator::Plus, Value::Number(n)) => Ok(Value::Number(n)),
        (UnaryOperator::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
        (operator, value) => Err(RuntimeError::Type(format!(
            "bad operand type for unary {operator}: {}",
            value.type_name()
        ))),
    }
}

/// Element access when `index` is a Number, slicing when it is the
/// two-element bound list built by `:`.
pub fn index(container: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (container, index) {
        (Value::List(items), Value::Number(n)) => {
            let i = position(*n, items.len())?;
            Ok(items[i].clone())
        }
        (Value::String(s), Value::Number(n)) => {
            let length = s.chars().count();
            let i = position(*n, length)?;
            Ok(Value::String(s.chars().skip(i).take(1).collect()))
        }
        (Value::List(items), Value::List(bounds)) => {
            let (start, end) = bounds_of(bounds, items.len())?;
            Ok(Value::List(items[start..end].to_vec()))
        }
        (Value::String(s), Value::List(bounds)) => {
            let (start, end) = bounds_of(bounds, s.chars().count())?;
            Ok(Value::String(s.chars().skip(start).take(end - start).collect()))
        }
        (Value::List(_) | Value::String(_), index) => Err(RuntimeError::Type(format!(
            "indices must be numbers or slices, not {}",
            index.type_name()
        ))),
        (container, _) => Err(RuntimeError::Type(format!(
            "{} is not indexable",
            container.type_name()
        ))),
    }
}

/// Longest String (in bytes) or List a single operation may build.
pub const MAX_LENGTH: usize = 1 << 28;

/// Truncates a repetition count; negative counts repeat nothing and empty
/// containers always repeat zero times.
fn repetitions(length: usize, n: f64) -> Result<usize, RuntimeError> {
    if length == 0 || n.is_nan() || n < 1.0 {
        return Ok(0);
    }
    let times = n.trunc() as usize;
    match length.checked_mul(times) {
        Some(total) if total <= MAX_LENGTH => Ok(times),
        _ => Err(RuntimeError::Range(format!(
            "repeating {length} elements {} times exceeds the length limit",
            format_number(n.trunc())
        ))),
    }
}

fn position(n: f64, length: usize) -> Result<usize, RuntimeError> {
    if !n.is_finite() {
        return Err(RuntimeError::Range(format!(
            "index {} is not a finite number",
            format_number(n)
        )));
    }
    let i = n.trunc() as i64;
    let resolved = if i < 0 { i + length as i64 } else { i };
    if resolved < 0 || resolved >= length as i64 {
        return Err(RuntimeError::Range(format!(
            "index {i} out of range for length {length}"
        )));
    }
    Ok(resolved as usize)
}

fn bounds_of(bounds: &[Value], length: usize) -> Result<(usize, usize), RuntimeError> {
    let [start, end] = bounds else {
        return Err(RuntimeError::Type(
            "a slice needs exactly two bounds".to_string(),
        ));
    };
    let start = bound(start, 0, length)?;
    let end = bound(end, length, length)?;
    Ok((start, end.max(start)))
}

fn bound(value: &Value, default: usize, length: usize) -> Result<usize, RuntimeError> {
    let i = match value {
        Value::Nil => return Ok(default),
        Value::Number(n) if n.is_nan() => {
            return Err(RuntimeError::Range("slice bound is not a number".to_string()))
        }
        Value::Number(n) => n.trunc() as i64,
        value => {
            return Err(RuntimeError::Type(format!(
                "slice bounds must be numbers, not {}",
                value.type_name()
            )))
        }
    };
    let resolved = if i < 0 { i + length as i64 } else { i };
    Ok(resolved.clamp(0, length as i64) as usize)
}

#[cfg(test)]
mod test {
    use super::*;

    fn list(items: &[f64]) -> Value {
        items.iter().map(|n| Value::Number(*n)).collect::<Vec<_>>().into()
    }

    fn slice(start: Value, end: Value) -> Value {
        Value::List(vec![start, end])
    }

    #[test]
    fn test_arithmetic() {
        let result = binary(BinaryOperator::Modulo, (-7.0).into(), 3.0.into()).unwrap();
        assert_eq!(result.to_string(), "-1");
        let result = binary(BinaryOperator::Power, 2.0.into(), 10.0.into()).unwrap();
        assert_eq!(result.to_string(), "1024");
    }

    #[test]
    fn test_string_operators() {
        let result = binary(BinaryOperator::Subtract, "file.txt".into(), ".txt".into()).unwrap();
        assert_eq!(result.to_string(), "file");
        assert!(matches!(
            binary(BinaryOperator::Subtract, "file.txt".into(), ".md".into()),
            Err(RuntimeError::Range(_))
        ));
        let result = binary(BinaryOperator::Multiply, "ab".into(), 2.9.into()).unwrap();
        assert_eq!(result.to_string(), "abab");
        let result = binary(BinaryOperator::Multiply, "ab".into(), (-1.0).into()).unwrap();
        assert_eq!(result.to_string(), "");
    }

    #[test]
    fn test_list_operators() {
        let result = binary(BinaryOperator::Add, list(&[1.0]), list(&[2.0, 3.0])).unwrap();
        assert_eq!(result.to_string(), "[1, 2, 3]");
        let result = binary(BinaryOperator::Multiply, list(&[1.0, 2.0]), 2.0.into()).unwrap();
        assert_eq!(result.to_string(), "[1, 2, 1, 2]");
    }

    #[test]
    fn test_repetition_past_length_limit() {
        assert!(matches!(
            binary(BinaryOperator::Multiply, list(&[1.0, 2.0]), 1e19.into()),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            binary(BinaryOperator::Multiply, "ab".into(), 1e300.into()),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            binary(BinaryOperator::Multiply, "ab".into(), f64::INFINITY.into()),
            Err(RuntimeError::Range(_))
        ));
        let result = binary(BinaryOperator::Multiply, list(&[]), 1e19.into()).unwrap();
        assert_eq!(result.to_string(), "[]");
        let result = binary(BinaryOperator::Multiply, "".into(), 1e300.into()).unwrap();
        assert_eq!(result.to_string(), "");
        let result = binary(BinaryOperator::Multiply, "ab".into(), f64::NAN.into()).unwrap();
        assert_eq!(result.to_string(), "");
    }

    #[test]
    fn test_mismatched_operands() {
        assert!(matches!(
            binary(BinaryOperator::Add, 1.0.into(), "a".into()),
            Err(RuntimeError::Type(_))
        ));
        assert!(matches!(
            binary(BinaryOperator::Less, "a".into(), "b".into()),
            Err(RuntimeError::UnknownOperator(_))
        ));
        assert!(matches!(
            unary(UnaryOperator::Negate, "a".into()),
            Err(RuntimeError::Type(_))
        ));
    }

    #[test]
    fn test_equality_uses_rendering() {
        let result = binary(BinaryOperator::Equal, 1.0.into(), "1".into()).unwrap();
        assert!(matches!(result, Value::Boolean(true)));
        let result = binary(BinaryOperator::NotEqual, list(&[1.0]), list(&[1.0])).unwrap();
        assert!(matches!(result, Value::Boolean(false)));
    }

    #[test]
    fn test_indexing() {
        let items = list(&[10.0, 20.0, 30.0]);
        assert_eq!(index(&items, &(-1.0).into()).unwrap().to_string(), "30");
        assert!(matches!(
            index(&items, &3.0.into()),
            Err(RuntimeError::Range(_))
        ));
        assert_eq!(index(&"héllo".into(), &1.0.into()).unwrap().to_string(), "é");
        assert!(matches!(
            index(&items, &f64::NAN.into()),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            index(&"abc".into(), &f64::INFINITY.into()),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            index(&items, &slice(f64::NAN.into(), Value::Nil)),
            Err(RuntimeError::Range(_))
        ));
        assert!(matches!(
            index(&Value::Nil, &0.0.into()),
            Err(RuntimeError::Type(_))
        ));
    }

    #[test]
    fn test_slicing_clamps() {
        let items = list(&[1.0, 2.0, 3.0, 4.0]);
        let cases = [
            (slice(Value::Nil, 2.0.into()), "[1, 2]"),
            (slice(2.0.into(), Value::Nil), "[3, 4]"),
            (slice(Value::Nil, Value::Nil), "[1, 2, 3, 4]"),
            (slice((-2.0).into(), Value::Nil), "[3, 4]"),
            (slice((-10.0).into(), 10.0.into()), "[1, 2, 3, 4]"),
            (slice(3.0.into(), 1.0.into()), "[]"),
        ];
        for (bounds, expected) in cases {
            assert_eq!(index(&items, &bounds).unwrap().to_string(), expected);
        }
        let text: Value = "hello".into();
        let result = index(&text, &slice(1.0.into(), (-1.0).into())).unwrap();
        assert_eq!(result.to_string(), "ell");
    }
}
