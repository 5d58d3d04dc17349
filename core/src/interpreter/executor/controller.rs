//! Loop bounds and clauses
//!
//! A controller is one of a loop's init/test/delta/final slots. It resolves to
//! a number (or runs a clause for its side effect) each time the loop asks.

use super::super::errors::{EvalError, ExecResult};
use super::super::expr::{self, Fragment};
use super::super::workspace::{Value, Workspace};
use super::substitute::{mentions_marker, substitute, Marker};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Controller {
    #[default]
    Unset,
    Literal(f64),
    /// A named scalar, optionally negated (`-n`)
    Scalar { name: String, negate: bool },
    /// An observation label such as `1990:1`
    Date(String),
    Expression {
        text: String,
        fragment: Option<Fragment>,
        /// The text carries a marker of an enclosing loop and changes between entries
        needs_subst: bool,
    },
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip one pair of parentheses wrapping the whole text
fn strip_parens(text: &str) -> &str {
    let t = text.trim();
    if !(t.starts_with('(') && t.ends_with(')')) {
        return t;
    }
    let mut depth = 0;
    for (i, c) in t.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != t.len() - 1 {
                    return t;
                }
            }
            _ => {}
        }
    }
    t[1..t.len() - 1].trim()
}

impl Controller {
    /// Classify bound text; `markers` are the index names of enclosing loops
    pub fn parse<'a>(text: &str, markers: impl Iterator<Item = &'a str>) -> Controller {
        let t = strip_parens(text);
        if let Ok(x) = t.parse::<f64>() {
            return Controller::Literal(x);
        }
        let (negate, name) = match t.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, t),
        };
        if is_ident(name) {
            return Controller::Scalar {
                name: name.to_string(),
                negate,
            };
        }
        Controller::Expression {
            text: t.to_string(),
            fragment: None,
            needs_subst: mentions_marker(t, markers),
        }
    }

    /// Drop any cached compiled form
    pub fn invalidate(&mut self) {
        if let Controller::Expression { fragment, .. } = self {
            *fragment = None;
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Controller::Expression { fragment: Some(_), .. })
    }

    /// Resolve to a number that must be present
    pub fn resolve(&mut self, ws: &mut Workspace, markers: &[Marker], cache_ok: bool) -> ExecResult<f64> {
        match self {
            Controller::Literal(x) => Ok(*x),
            Controller::Scalar { name, negate } => {
                let x = ws
                    .get(name)
                    .ok_or_else(|| EvalError::Undefined(name.clone()))?
                    .to_number(name)?;
                Ok(if *negate { -x } else { x })
            }
            _ => match self.run(ws, markers, cache_ok)? {
                Value::Scalar(x) if x.is_nan() => {
                    Err(EvalError::Missing(self.describe()).into())
                }
                Value::Scalar(x) => Ok(x),
                other => Err(EvalError::NotScalar(format!(
                    "{} (a {})",
                    self.describe(),
                    other.type_name()
                ))
                .into()),
            },
        }
    }

    /// Evaluate the controller for its value or side effect
    pub fn run(&mut self, ws: &mut Workspace, markers: &[Marker], cache_ok: bool) -> ExecResult<Value> {
        match self {
            Controller::Unset => Err(EvalError::Data("loop clause is not set".to_string()).into()),
            Controller::Literal(x) => Ok(Value::Scalar(*x)),
            Controller::Date(label) => Err(EvalError::Type(format!(
                "the date '{}' is not a numeric bound",
                label
            ))
            .into()),
            Controller::Scalar { name, negate } => {
                let value = ws
                    .get(name)
                    .cloned()
                    .ok_or_else(|| EvalError::Undefined(name.clone()))?;
                match (value, *negate) {
                    (Value::Scalar(x), true) => Ok(Value::Scalar(-x)),
                    (value, false) => Ok(value),
                    (other, true) => Err(EvalError::Type(format!("cannot negate a {}", other.type_name())).into()),
                }
            }
            Controller::Expression {
                text,
                fragment,
                needs_subst,
            } => {
                if *needs_subst {
                    let source = substitute(text, markers).unwrap_or_else(|| text.clone());
                    let compiled = expr::compile(&source)?;
                    return Ok(expr::evaluate(&compiled, ws)?);
                }
                let compiled = match fragment.take() {
                    Some(f) => f,
                    None => expr::compile(text)?,
                };
                let result = expr::evaluate(&compiled, ws);
                if cache_ok {
                    *fragment = Some(compiled);
                }
                Ok(result?)
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Controller::Scalar { name, .. } => name.clone(),
            Controller::Expression { text, .. } => text.clone(),
            Controller::Date(label) => label.clone(),
            Controller::Literal(x) => x.to_string(),
            Controller::Unset => "loop bound".to_string(),
        }
    }
}
