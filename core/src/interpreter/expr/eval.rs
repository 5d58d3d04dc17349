//! Fragment evaluation against the workspace

use super::super::errors::EvalError;
use super::super::model::Model;
use super::super::stdlib::{self, StdlibFunc};
use super::super::workspace::{Value, Workspace};
use super::{AssignOp, BinOp, Decl, Expr, Fragment, UnaryOp};

/* ===================== Public API ===================== */

/// Evaluate a fragment; assignments return the stored value
pub fn evaluate(fragment: &Fragment, ws: &mut Workspace) -> Result<Value, EvalError> {
    match fragment {
        Fragment::Eval(expr) => evaluate_value(expr, ws, false),
        Fragment::Step { name, delta } => {
            let current = match ws.get(name) {
                Some(Value::Scalar(x)) => *x,
                Some(Value::Series(_)) => {
                    let value = binary(BinOp::Add, lookup(name, ws)?, Value::Scalar(*delta))?;
                    ws.assign(name, value.clone())?;
                    return Ok(value);
                }
                Some(other) => {
                    return Err(EvalError::Type(format!(
                        "cannot increment the {} '{}'",
                        other.type_name(),
                        name
                    )))
                }
                None => return Err(EvalError::Undefined(name.clone())),
            };
            let value = Value::Scalar(current + delta);
            ws.assign(name, value.clone())?;
            Ok(value)
        }
        Fragment::Assign { decl, name, op, expr } => {
            let wants_series = matches!(decl, Some(Decl::Series))
                || matches!(ws.get(name), Some(Value::Series(_)));
            let rhs = evaluate_value(expr, ws, wants_series)?;
            let value = match op {
                AssignOp::Set => rhs,
                compound => {
                    let current = lookup(name, ws)?;
                    let bin = match compound {
                        AssignOp::Add => BinOp::Add,
                        AssignOp::Sub => BinOp::Sub,
                        AssignOp::Mul => BinOp::Mul,
                        _ => BinOp::Div,
                    };
                    binary(bin, current, rhs)?
                }
            };
            let value = coerce(*decl, name, value, ws)?;
            ws.assign(name, value.clone())?;
            Ok(value)
        }
    }
}

/// Evaluate to a scalar that must not be NA
pub fn evaluate_number(fragment: &Fragment, ws: &mut Workspace, what: &str) -> Result<f64, EvalError> {
    evaluate(fragment, ws)?.to_number(what)
}

/// Evaluate a condition: a non-NA scalar, true when non-zero
pub fn evaluate_condition(fragment: &Fragment, ws: &mut Workspace) -> Result<bool, EvalError> {
    Ok(evaluate_number(fragment, ws, "condition")? != 0.0)
}

/// Evaluate an expression; `series_hint` makes random draws produce series
pub fn evaluate_value(expr: &Expr, ws: &mut Workspace, series_hint: bool) -> Result<Value, EvalError> {
    match expr {
        Expr::Num(x) => Ok(Value::Scalar(*x)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Var(name) => lookup(name, ws),
        Expr::Accessor(name) => accessor(name, ws),
        Expr::Call { name, args } => {
            let func = StdlibFunc::from_name(name)
                .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
            let values = args
                .iter()
                .map(|arg| evaluate_value(arg, ws, series_hint))
                .collect::<Result<Vec<_>, _>>()?;
            stdlib::call(func, values, ws, series_hint)
        }
        Expr::Unary { op, expr } => {
            let value = evaluate_value(expr, ws, series_hint)?;
            match op {
                UnaryOp::Neg => map_numeric(value, "-", |x| -x),
                UnaryOp::Not => map_numeric(value, "!", |x| {
                    if x.is_nan() {
                        f64::NAN
                    } else if x == 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = evaluate_value(lhs, ws, series_hint)?;
            let r = evaluate_value(rhs, ws, series_hint)?;
            binary(*op, l, r)
        }
        Expr::Index { target, index } => {
            let container = evaluate_value(target, ws, false)?;
            let idx = evaluate_value(index, ws, false)?;
            element(container, idx)
        }
    }
}

/* ===================== Lookup ===================== */

fn lookup(name: &str, ws: &Workspace) -> Result<Value, EvalError> {
    if let Some(value) = ws.get(name) {
        return Ok(value.clone());
    }
    match name {
        "NA" => Ok(Value::Scalar(f64::NAN)),
        "pi" => Ok(Value::Scalar(std::f64::consts::PI)),
        "index" => ws
            .index_series()
            .map(Value::Series)
            .ok_or_else(|| EvalError::Data("'index' needs a dataset".to_string())),
        _ => Err(EvalError::Undefined(name.to_string())),
    }
}

fn accessor(name: &str, ws: &mut Workspace) -> Result<Value, EvalError> {
    match name {
        "nobs" => Ok(Value::Scalar(ws.nobs() as f64)),
        "pd" => Ok(Value::Scalar(ws.calendar().frequency() as f64)),
        "error" => Ok(Value::Scalar(ws.take_error() as f64)),
        "ess" => model_stat(ws, name, |m| m.ssr),
        "rsq" => model_stat(ws, name, |m| m.rsq),
        "T" => model_stat(ws, name, |m| m.nobs as f64),
        "ncoeff" => model_stat(ws, name, |m| m.ncoeff() as f64),
        _ => Err(EvalError::Undefined(format!("${}", name))),
    }
}

fn model_stat(ws: &Workspace, name: &str, f: impl Fn(&Model) -> f64) -> Result<Value, EvalError> {
    ws.last_model()
        .map(|m| Value::Scalar(f(m)))
        .ok_or_else(|| EvalError::Data(format!("${}: no model has been estimated", name)))
}

fn element(container: Value, idx: Value) -> Result<Value, EvalError> {
    if let Value::Bundle(mut map) = container {
        let key = idx
            .as_str()
            .ok_or_else(|| EvalError::Type("bundle members are selected by name".to_string()))?;
        return map
            .remove(key)
            .ok_or_else(|| EvalError::Data(format!("bundle has no member '{}'", key)));
    }
    let i = idx.to_number("index")?;
    let pick = |len: usize| -> Result<usize, EvalError> {
        if i.fract() != 0.0 || i < 1.0 || i as usize > len {
            Err(EvalError::Data(format!("index {} is out of bounds (1..{})", i, len)))
        } else {
            Ok(i as usize - 1)
        }
    };
    match container {
        Value::Series(xs) => Ok(Value::Scalar(xs[pick(xs.len())?])),
        Value::Strings(items) | Value::List(items) => {
            let k = pick(items.len())?;
            Ok(Value::Str(items[k].clone()))
        }
        other => Err(EvalError::Type(format!("cannot index a {}", other.type_name()))),
    }
}

/* ===================== Operators ===================== */

fn map_numeric(value: Value, op: &str, f: impl Fn(f64) -> f64) -> Result<Value, EvalError> {
    match value {
        Value::Scalar(x) => Ok(Value::Scalar(f(x))),
        Value::Series(xs) => Ok(Value::Series(xs.into_iter().map(f).collect())),
        other => Err(EvalError::Type(format!("'{}' is not defined for a {}", op, other.type_name()))),
    }
}

fn apply(op: BinOp, a: f64, b: f64) -> f64 {
    let truth = |t: bool| if t { 1.0 } else { 0.0 };
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Pow => a.powf(b),
        BinOp::Eq => truth(a == b),
        BinOp::Ne => truth(a != b),
        BinOp::Lt => truth(a < b),
        BinOp::Le => truth(a <= b),
        BinOp::Gt => truth(a > b),
        BinOp::Ge => truth(a >= b),
        BinOp::And => truth(a != 0.0 && b != 0.0),
        BinOp::Or => truth(a != 0.0 || b != 0.0),
    }
}

pub(crate) fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(apply(op, a, b))),
        (Value::Series(xs), Value::Scalar(b)) => {
            Ok(Value::Series(xs.into_iter().map(|a| apply(op, a, b)).collect()))
        }
        (Value::Scalar(a), Value::Series(ys)) => {
            Ok(Value::Series(ys.into_iter().map(|b| apply(op, a, b)).collect()))
        }
        (Value::Series(xs), Value::Series(ys)) => {
            if xs.len() != ys.len() {
                return Err(EvalError::Data(format!(
                    "series lengths differ ({} vs {})",
                    xs.len(),
                    ys.len()
                )));
            }
            Ok(Value::Series(
                xs.into_iter().zip(ys).map(|(a, b)| apply(op, a, b)).collect(),
            ))
        }
        (Value::Str(a), Value::Str(b)) => match op {
            BinOp::Eq => Ok(Value::Scalar(if a == b { 1.0 } else { 0.0 })),
            BinOp::Ne => Ok(Value::Scalar(if a != b { 1.0 } else { 0.0 })),
            BinOp::Add => Ok(Value::Str(a + &b)),
            _ => Err(EvalError::Type(format!("{:?} is not defined for strings", op))),
        },
        (l, r) => Err(EvalError::Type(format!(
            "{:?} is not defined for {} and {}",
            op,
            l.type_name(),
            r.type_name()
        ))),
    }
}

/// Apply a declared type to the value about to be stored
fn coerce(decl: Option<Decl>, name: &str, value: Value, ws: &Workspace) -> Result<Value, EvalError> {
    let mismatch = |want: &str, got: &Value| {
        EvalError::Type(format!(
            "cannot assign a {} to the {} '{}'",
            got.type_name(),
            want,
            name
        ))
    };
    let existing_series = matches!(ws.get(name), Some(Value::Series(_)));
    match (decl, value) {
        (Some(Decl::Series), Value::Scalar(x)) => Ok(Value::Series(vec![x; ws.nobs()])),
        (None | Some(Decl::Genr), Value::Scalar(x)) if existing_series => {
            Ok(Value::Series(vec![x; ws.nobs()]))
        }
        (Some(Decl::Series), v @ Value::Series(_)) => Ok(v),
        (Some(Decl::Series), v) => Err(mismatch("series", &v)),
        (Some(Decl::Scalar), v @ Value::Scalar(_)) => Ok(v),
        (Some(Decl::Scalar), v) => Err(mismatch("scalar", &v)),
        (Some(Decl::String), v @ Value::Str(_)) => Ok(v),
        (Some(Decl::String), v) => Err(mismatch("string", &v)),
        (Some(Decl::Strings), v @ Value::Strings(_)) => Ok(v),
        (Some(Decl::Strings), v) => Err(mismatch("strings", &v)),
        (Some(Decl::Bundle), v @ Value::Bundle(_)) => Ok(v),
        (Some(Decl::Bundle), v) => Err(mismatch("bundle", &v)),
        (None | Some(Decl::Genr), v) => Ok(v),
    }
}
