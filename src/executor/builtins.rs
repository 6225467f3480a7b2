//! Operators, item access and builtin functions.

use std::cmp::Ordering;

use super::output::OutputSink;
use super::value::Value;
use crate::error::{ErrorKind, RuntimeError};
use crate::parser::BinaryOp;

const MAX_RANGE_LEN: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Str,
    Int,
    Float,
    Range,
    Abs,
    Min,
    Max,
    Type,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        let builtin = match name {
            "print" => Builtin::Print,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            "int" => Builtin::Int,
            "float" => Builtin::Float,
            "range" => Builtin::Range,
            "abs" => Builtin::Abs,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "type" => Builtin::Type,
            _ => return None,
        };
        Some(builtin)
    }

    fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Range => "range",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Type => "type",
        }
    }

    pub fn call(self, args: Vec<Value>, output: &dyn OutputSink) -> Result<Value, RuntimeError> {
        match self {
            Builtin::Print => {
                let text = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                output.write_str(&text);
                output.write_str("\n");
                Ok(Value::Nil)
            }
            Builtin::Len => match self.single(args)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(RuntimeError::type_error(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            },
            Builtin::Str => Ok(Value::Str(self.single(args)?.to_string())),
            Builtin::Int => match self.single(args)? {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                    RuntimeError::new(
                        ErrorKind::ValueError,
                        format!("invalid literal for int(): '{s}'"),
                    )
                }),
                other => Err(RuntimeError::type_error(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            },
            Builtin::Float => match self.single(args)? {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Float(f) => Ok(Value::Float(f)),
                Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
                Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                    RuntimeError::new(
                        ErrorKind::ValueError,
                        format!("could not convert string to float: '{s}'"),
                    )
                }),
                other => Err(RuntimeError::type_error(format!(
                    "float() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))),
            },
            Builtin::Range => range(args),
            Builtin::Abs => match self.single(args)? {
                Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(RuntimeError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            },
            Builtin::Min => self.extreme(args, Ordering::Less),
            Builtin::Max => self.extreme(args, Ordering::Greater),
            Builtin::Type => Ok(Value::Str(self.single(args)?.type_name().to_string())),
        }
    }

    fn single(self, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
        if args.len() != 1 {
            return Err(RuntimeError::type_error(format!(
                "{}() takes exactly one argument ({} given)",
                self.name(),
                args.len()
            )));
        }
        Ok(args.remove(0))
    }

    fn extreme(self, args: Vec<Value>, wanted: Ordering) -> Result<Value, RuntimeError> {
        let items = match args.as_slice() {
            [Value::List(items)] => items.clone(),
            _ => args,
        };
        let mut best: Option<Value> = None;
        for item in items {
            best = Some(match best {
                None => item,
                Some(current) => {
                    if compare(&item, &current, self.name())? == wanted {
                        item
                    } else {
                        current
                    }
                }
            });
        }
        best.ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::ValueError,
                format!("{}() arg is an empty sequence", self.name()),
            )
        })
    }
}

fn range(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let mut bounds = Vec::with_capacity(args.len());
    for arg in &args {
        match arg {
            Value::Int(i) => bounds.push(*i),
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    other.type_name()
                )))
            }
        }
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(RuntimeError::type_error(format!(
                "range expected 1 to 3 arguments, got {}",
                bounds.len()
            )))
        }
    };
    if step == 0 {
        return Err(RuntimeError::new(
            ErrorKind::ValueError,
            "range() arg 3 must not be zero",
        ));
    }
    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    if span / step.saturating_abs() > MAX_RANGE_LEN {
        return Err(RuntimeError::new(ErrorKind::ValueError, "range too large"));
    }

    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::List(items))
}

fn overflow() -> RuntimeError {
    RuntimeError::new(ErrorKind::ValueError, "integer overflow")
}

fn zero_division(message: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::ZeroDivisionError, message)
}

fn unsupported(op: BinaryOp, lhs: &Value, rhs: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>, RuntimeError> {
    let times = usize::try_from(times.max(0)).map_err(|_| overflow())?;
    if items.len().saturating_mul(times) > MAX_RANGE_LEN as usize {
        return Err(overflow());
    }
    Ok(std::iter::repeat(items)
        .take(times)
        .flatten()
        .cloned()
        .collect())
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

/// Ordering used by comparisons and `min`/`max`.
fn compare(lhs: &Value, rhs: &Value, what: &str) -> Result<Ordering, RuntimeError> {
    let ordering = match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (as_float(lhs), as_float(rhs)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "'{what}' not supported between instances of '{}' and '{}'",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        },
    };
    // NaN compares as unordered; treat it as "not less/greater".
    Ok(ordering.unwrap_or(Ordering::Equal))
}

pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    use Value::{Float, Int, List, Str};

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(lhs == rhs)),
        BinaryOp::NotEq => return Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(lhs, rhs, op.symbol())?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, lhs, rhs) {
        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Int).ok_or_else(overflow),
        (BinaryOp::Add, Str(a), Str(b)) => Ok(Str(format!("{a}{b}"))),
        (BinaryOp::Add, List(a), List(b)) => Ok(List(a.iter().chain(b).cloned().collect())),
        (BinaryOp::Mul, Str(s), Int(n)) | (BinaryOp::Mul, Int(n), Str(s)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Str(repeat(&chars, *n)?.into_iter().collect()))
        }
        (BinaryOp::Mul, List(items), Int(n)) | (BinaryOp::Mul, Int(n), List(items)) => {
            Ok(List(repeat(items, *n)?))
        }
        (BinaryOp::Div, _, _) => match (as_float(lhs), as_float(rhs)) {
            (Some(_), Some(b)) if b == 0.0 => Err(zero_division("division by zero")),
            (Some(a), Some(b)) => Ok(Float(a / b)),
            _ => Err(unsupported(op, lhs, rhs)),
        },
        (BinaryOp::FloorDiv, Int(_), Int(0)) => {
            Err(zero_division("integer division or modulo by zero"))
        }
        (BinaryOp::FloorDiv, Int(a), Int(b)) => floor_div(*a, *b).map(Int).ok_or_else(overflow),
        (BinaryOp::Mod, Int(_), Int(0)) => Err(zero_division("integer modulo by zero")),
        (BinaryOp::Mod, Int(a), Int(b)) => floor_mod(*a, *b).map(Int).ok_or_else(overflow),
        _ => match (as_float(lhs), as_float(rhs)) {
            (Some(a), Some(b)) => match op {
                BinaryOp::Add => Ok(Float(a + b)),
                BinaryOp::Sub => Ok(Float(a - b)),
                BinaryOp::Mul => Ok(Float(a * b)),
                BinaryOp::FloorDiv if b == 0.0 => Err(zero_division("float floor division by zero")),
                BinaryOp::FloorDiv => Ok(Float((a / b).floor())),
                BinaryOp::Mod if b == 0.0 => Err(zero_division("float modulo")),
                BinaryOp::Mod => Ok(Float(a - b * (a / b).floor())),
                _ => Err(unsupported(op, lhs, rhs)),
            },
            _ => Err(unsupported(op, lhs, rhs)),
        },
    }
}

fn resolve_index(len: usize, index: &Value, what: &str) -> Result<usize, RuntimeError> {
    let Value::Int(raw) = index else {
        return Err(RuntimeError::type_error(format!(
            "{what} indices must be integers, not '{}'",
            index.type_name()
        )));
    };
    let resolved = if *raw < 0 {
        i64::try_from(len).ok().and_then(|len| len.checked_add(*raw))
    } else {
        Some(*raw)
    };
    resolved
        .and_then(|i| usize::try_from(i).ok())
        .filter(|i| *i < len)
        .ok_or_else(|| {
            RuntimeError::new(ErrorKind::IndexError, format!("{what} index out of range"))
        })
}

pub fn get_item(container: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match container {
        Value::List(items) => Ok(items[resolve_index(items.len(), index, "list")?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(chars.len(), index, "string")?;
            Ok(Value::Str(chars[i].to_string()))
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_item(container: &mut Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    match container {
        Value::List(items) => {
            let i = resolve_index(items.len(), index, "list assignment")?;
            items[i] = value;
            Ok(())
        }
        other => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

pub fn iterate(value: Value) -> Result<Vec<Value>, RuntimeError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        other => Err(RuntimeError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::OutputBuffer;

    #[test]
    fn integer_division_floors_like_python() {
        let div = |a, b| binary(BinaryOp::FloorDiv, &Value::Int(a), &Value::Int(b)).unwrap();
        let rem = |a, b| binary(BinaryOp::Mod, &Value::Int(a), &Value::Int(b)).unwrap();
        assert_eq!(div(7, 2), Value::Int(3));
        assert_eq!(div(-7, 2), Value::Int(-4));
        assert_eq!(rem(-7, 2), Value::Int(1));
        assert_eq!(rem(7, -2), Value::Int(-1));
    }

    #[test]
    fn division_by_zero_is_classified() {
        let err = binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
        let err = binary(BinaryOp::Mod, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
    }

    #[test]
    fn mixed_type_addition_is_a_type_error() {
        let err = binary(BinaryOp::Add, &Value::Int(1), &Value::Str("a".into())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn negative_indexing_and_bounds() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(get_item(&list, &Value::Int(-1)).unwrap(), Value::Int(2));
        let err = get_item(&list, &Value::Int(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexError);
    }

    #[test]
    fn print_joins_arguments_with_spaces() {
        let out = OutputBuffer::new();
        Builtin::Print
            .call(vec![Value::Str("x".into()), Value::Int(1)], &out)
            .unwrap();
        assert_eq!(out.contents(), "x 1\n");
    }

    #[test]
    fn range_variants() {
        let range = |args: Vec<i64>| {
            Builtin::Range
                .call(args.into_iter().map(Value::Int).collect(), &OutputBuffer::new())
                .unwrap()
        };
        assert_eq!(range(vec![3]).repr(), "[0, 1, 2]");
        assert_eq!(range(vec![5, 1, -2]).repr(), "[5, 3]");
        assert_eq!(range(vec![2, 2]).repr(), "[]");
    }

    #[test]
    fn strings_and_lists_repeat() {
        let text = binary(BinaryOp::Mul, &Value::Str("ab".into()), &Value::Int(3)).unwrap();
        assert_eq!(text, Value::Str("ababab".into()));
        let zeros = Value::List(vec![Value::Int(0)]);
        let list = binary(BinaryOp::Mul, &Value::Int(4), &zeros).unwrap();
        assert_eq!(list.repr(), "[0, 0, 0, 0]");
        let empty = binary(BinaryOp::Mul, &Value::Str("ab".into()), &Value::Int(-2)).unwrap();
        assert_eq!(empty, Value::Str(String::new()));
    }
}
