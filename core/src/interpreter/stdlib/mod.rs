//! Built-in functions callable from expressions
//!
//! Functions are resolved by name at compile time of the call site into a
//! `StdlibFunc`, then dispatched here with already-evaluated arguments.

use super::errors::EvalError;
use super::workspace::{Value, Workspace};

pub mod math;
pub mod stats;
pub mod strings;

/* ===================== Function Registry ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdlibFunc {
    Abs,
    Sqrt,
    Exp,
    Log,
    Floor,
    Ceil,
    Round,
    Int,
    Min,
    Max,
    Sum,
    Mean,
    Sd,
    Nobs,
    Uniform,
    Normal,
    Missing,
    Ok,
    Defarray,
    Defbundle,
    Nelem,
    Strlen,
    Sprintf,
}

impl StdlibFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "log" | "ln" => Self::Log,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "int" => Self::Int,
            "min" => Self::Min,
            "max" => Self::Max,
            "sum" => Self::Sum,
            "mean" => Self::Mean,
            "sd" => Self::Sd,
            "nobs" => Self::Nobs,
            "uniform" => Self::Uniform,
            "normal" => Self::Normal,
            "missing" => Self::Missing,
            "ok" => Self::Ok,
            "defarray" => Self::Defarray,
            "defbundle" => Self::Defbundle,
            "nelem" => Self::Nelem,
            "strlen" => Self::Strlen,
            "sprintf" => Self::Sprintf,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Int => "int",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Sd => "sd",
            Self::Nobs => "nobs",
            Self::Uniform => "uniform",
            Self::Normal => "normal",
            Self::Missing => "missing",
            Self::Ok => "ok",
            Self::Defarray => "defarray",
            Self::Defbundle => "defbundle",
            Self::Nelem => "nelem",
            Self::Strlen => "strlen",
            Self::Sprintf => "sprintf",
        }
    }
}

/* ===================== Dispatch ===================== */

/// Call a built-in; `series_hint` asks random generators for a full series
pub fn call(
    func: StdlibFunc,
    args: Vec<Value>,
    ws: &mut Workspace,
    series_hint: bool,
) -> Result<Value, EvalError> {
    let name = func.name();
    match func {
        StdlibFunc::Abs => math::unary(name, args, f64::abs),
        StdlibFunc::Sqrt => math::unary(name, args, f64::sqrt),
        StdlibFunc::Exp => math::unary(name, args, f64::exp),
        StdlibFunc::Log => math::unary(name, args, f64::ln),
        StdlibFunc::Floor => math::unary(name, args, f64::floor),
        StdlibFunc::Ceil => math::unary(name, args, f64::ceil),
        StdlibFunc::Round => math::unary(name, args, f64::round),
        StdlibFunc::Int => math::unary(name, args, f64::trunc),
        StdlibFunc::Min => math::extremum(name, args, f64::min),
        StdlibFunc::Max => math::extremum(name, args, f64::max),
        StdlibFunc::Missing => math::unary(name, args, |x| if x.is_nan() { 1.0 } else { 0.0 }),
        StdlibFunc::Ok => math::unary(name, args, |x| if x.is_nan() { 0.0 } else { 1.0 }),
        StdlibFunc::Sum => stats::sum(name, args),
        StdlibFunc::Mean => stats::mean(name, args),
        StdlibFunc::Sd => stats::sd(name, args),
        StdlibFunc::Nobs => stats::nobs(name, args),
        StdlibFunc::Uniform => stats::uniform(name, args, ws, series_hint),
        StdlibFunc::Normal => stats::normal(name, args, ws, series_hint),
        StdlibFunc::Defarray => strings::defarray(args),
        StdlibFunc::Defbundle => strings::defbundle(name, args),
        StdlibFunc::Nelem => strings::nelem(name, args),
        StdlibFunc::Strlen => strings::strlen(name, args),
        StdlibFunc::Sprintf => strings::sprintf(name, args),
    }
}

/// Check the argument count of a call
pub(crate) fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(EvalError::function(
            name,
            format!("expected {} argument(s), got {}", expected, args.len()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for name in ["abs", "mean", "normal", "defarray", "sprintf"] {
            let func = StdlibFunc::from_name(name).unwrap();
            assert_eq!(func.name(), name);
        }
        assert_eq!(StdlibFunc::from_name("ln"), Some(StdlibFunc::Log));
        assert_eq!(StdlibFunc::from_name("nosuch"), None);
    }
}
