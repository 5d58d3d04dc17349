//! Elementwise math functions

use super::arity;
use crate::interpreter::errors::EvalError;
use crate::interpreter::workspace::Value;

/// Apply `f` to a scalar or to every observation of a series
pub fn unary(name: &str, mut args: Vec<Value>, f: impl Fn(f64) -> f64) -> Result<Value, EvalError> {
    arity(name, &args, 1, 1)?;
    match args.remove(0) {
        Value::Scalar(x) => Ok(Value::Scalar(f(x))),
        Value::Series(xs) => Ok(Value::Series(xs.into_iter().map(f).collect())),
        other => Err(EvalError::function(
            name,
            format!("a {} argument is not allowed", other.type_name()),
        )),
    }
}

/// `min(a, b)` of two scalars, or the extremum of one series (skipping NA)
pub fn extremum(name: &str, args: Vec<Value>, pick: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    arity(name, &args, 1, 2)?;
    match args.as_slice() {
        [Value::Series(xs)] => Ok(Value::Scalar(
            xs.iter()
                .copied()
                .filter(|x| !x.is_nan())
                .reduce(pick)
                .unwrap_or(f64::NAN),
        )),
        [Value::Scalar(a), Value::Scalar(b)] => {
            if a.is_nan() || b.is_nan() {
                Ok(Value::Scalar(f64::NAN))
            } else {
                Ok(Value::Scalar(pick(*a, *b)))
            }
        }
        _ => Err(EvalError::function(name, "expected one series or two scalars")),
    }
}
