//! Descriptive statistics and random draws

use rand::Rng;

use super::arity;
use crate::interpreter::errors::EvalError;
use crate::interpreter::workspace::{Value, Workspace};

fn present(name: &str, args: &[Value]) -> Result<Vec<f64>, EvalError> {
    arity(name, args, 1, 1)?;
    match &args[0] {
        Value::Series(xs) => Ok(xs.iter().copied().filter(|x| !x.is_nan()).collect()),
        Value::Scalar(x) if !x.is_nan() => Ok(vec![*x]),
        Value::Scalar(_) => Ok(Vec::new()),
        other => Err(EvalError::function(
            name,
            format!("a {} argument is not allowed", other.type_name()),
        )),
    }
}

pub fn sum(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let xs = present(name, &args)?;
    Ok(Value::Scalar(if xs.is_empty() { f64::NAN } else { xs.iter().sum() }))
}

pub fn mean(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let xs = present(name, &args)?;
    if xs.is_empty() {
        return Ok(Value::Scalar(f64::NAN));
    }
    Ok(Value::Scalar(xs.iter().sum::<f64>() / xs.len() as f64))
}

/// Sample standard deviation
pub fn sd(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    let xs = present(name, &args)?;
    if xs.len() < 2 {
        return Ok(Value::Scalar(f64::NAN));
    }
    let n = xs.len() as f64;
    let m = xs.iter().sum::<f64>() / n;
    let ss: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    Ok(Value::Scalar((ss / (n - 1.0)).sqrt()))
}

/// Count of non-missing observations
pub fn nobs(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::Scalar(present(name, &args)?.len() as f64))
}

fn bounds(name: &str, args: &[Value], default: (f64, f64)) -> Result<(f64, f64), EvalError> {
    match args {
        [] => Ok(default),
        [a, b] => Ok((a.to_number(name)?, b.to_number(name)?)),
        _ => Err(EvalError::function(name, "expected zero or two arguments")),
    }
}

fn draws(ws: &mut Workspace, series: bool, mut draw: impl FnMut(&mut Workspace) -> f64) -> Value {
    if series && ws.nobs() > 0 {
        Value::Series((0..ws.nobs()).map(|_| draw(ws)).collect())
    } else {
        Value::Scalar(draw(ws))
    }
}

/// `uniform()` or `uniform(a, b)`
pub fn uniform(name: &str, args: Vec<Value>, ws: &mut Workspace, series: bool) -> Result<Value, EvalError> {
    let (lo, hi) = bounds(name, &args, (0.0, 1.0))?;
    if hi <= lo {
        return Err(EvalError::function(name, "the upper bound must exceed the lower"));
    }
    Ok(draws(ws, series, |ws| lo + (hi - lo) * ws.rng().random::<f64>()))
}

/// `normal()` or `normal(mu, sigma)`, by the Box-Muller transform
pub fn normal(name: &str, args: Vec<Value>, ws: &mut Workspace, series: bool) -> Result<Value, EvalError> {
    let (mu, sigma) = bounds(name, &args, (0.0, 1.0))?;
    if sigma < 0.0 {
        return Err(EvalError::function(name, "the standard deviation must be non-negative"));
    }
    Ok(draws(ws, series, |ws| {
        let u1: f64 = 1.0 - ws.rng().random::<f64>();
        let u2: f64 = ws.rng().random::<f64>();
        mu + sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moments_skip_missing() {
        let xs = Value::Series(vec![1.0, f64::NAN, 3.0]);
        assert_eq!(mean("mean", vec![xs.clone()]).unwrap(), Value::Scalar(2.0));
        assert_eq!(nobs("nobs", vec![xs.clone()]).unwrap(), Value::Scalar(2.0));
        assert_eq!(sd("sd", vec![xs]).unwrap(), Value::Scalar(2.0_f64.sqrt()));
    }

    #[test]
    fn test_draws_are_reproducible_under_a_seed() {
        let mut a = Workspace::new(Some(42));
        let mut b = Workspace::new(Some(42));
        let x = normal("normal", vec![], &mut a, false).unwrap();
        let y = normal("normal", vec![], &mut b, false).unwrap();
        assert_eq!(x, y);

        a.new_dataset(5);
        match uniform("uniform", vec![Value::Scalar(2.0), Value::Scalar(3.0)], &mut a, true).unwrap() {
            Value::Series(xs) => assert!(xs.iter().all(|x| (2.0..3.0).contains(x))),
            other => panic!("expected a series, got {:?}", other),
        }
    }
}
