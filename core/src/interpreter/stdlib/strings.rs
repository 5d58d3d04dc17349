//! String, array and bundle functions, plus the printf formatter shared with
//! the `printf` command

use std::collections::BTreeMap;

use super::arity;
use crate::interpreter::errors::EvalError;
use crate::interpreter::output::format_g;
use crate::interpreter::workspace::Value;

pub fn defarray(args: Vec<Value>) -> Result<Value, EvalError> {
    let items = args
        .into_iter()
        .map(|v| match v {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::function(
                "defarray",
                format!("strings arrays hold strings, got a {}", other.type_name()),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Strings(items))
}

/// `defbundle("key1", value1, "key2", value2, ...)`
pub fn defbundle(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    if args.len() % 2 != 0 {
        return Err(EvalError::function(name, "expected key/value pairs"));
    }
    let mut bundle = BTreeMap::new();
    let mut it = args.into_iter();
    while let (Some(key), Some(value)) = (it.next(), it.next()) {
        match key {
            Value::Str(k) => {
                bundle.insert(k, value);
            }
            other => {
                return Err(EvalError::function(
                    name,
                    format!("keys must be strings, got a {}", other.type_name()),
                ))
            }
        }
    }
    Ok(Value::Bundle(bundle))
}

pub fn nelem(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    arity(name, &args, 1, 1)?;
    let n = match &args[0] {
        Value::List(items) | Value::Strings(items) => items.len(),
        Value::Bundle(map) => map.len(),
        Value::Series(xs) => xs.len(),
        other => {
            return Err(EvalError::function(
                name,
                format!("a {} has no elements", other.type_name()),
            ))
        }
    };
    Ok(Value::Scalar(n as f64))
}

pub fn strlen(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    arity(name, &args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Scalar(s.chars().count() as f64)),
        other => Err(EvalError::function(
            name,
            format!("expected a string, got a {}", other.type_name()),
        )),
    }
}

pub fn sprintf(name: &str, mut args: Vec<Value>) -> Result<Value, EvalError> {
    if args.is_empty() {
        return Err(EvalError::function(name, "a format string is required"));
    }
    let fmt = match args.remove(0) {
        Value::Str(s) => s,
        other => {
            return Err(EvalError::function(
                name,
                format!("the format must be a string, got a {}", other.type_name()),
            ))
        }
    };
    format_printf(&fmt, &args).map(Value::Str)
}

/* ===================== printf ===================== */

/// Expand a C-style format with `%d %i %f %e %g %s %%`, flags `-` and `0`,
/// width and precision; `\n` and `\t` escapes are honoured
pub fn format_printf(fmt: &str, args: &[Value]) -> Result<String, EvalError> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '%' => {
                if chars.peek() == Some(&'%') {
                    chars.next();
                    out.push('%');
                    continue;
                }
                let mut left = false;
                let mut zero = false;
                while let Some(&flag) = chars.peek() {
                    match flag {
                        '-' => left = true,
                        '0' => zero = true,
                        _ => break,
                    }
                    chars.next();
                }
                let width = digits(&mut chars);
                let precision = if chars.peek() == Some(&'.') {
                    chars.next();
                    Some(digits(&mut chars).unwrap_or(0))
                } else {
                    None
                };
                let conv = chars
                    .next()
                    .ok_or_else(|| EvalError::function("printf", "incomplete conversion"))?;
                let arg = args
                    .next()
                    .ok_or_else(|| EvalError::function("printf", "not enough arguments"))?;
                let body = convert(conv, precision, arg)?;
                out.push_str(&pad(body, width.unwrap_or(0), left, zero && conv != 's'));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn digits(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<usize> {
    let mut s = String::new();
    while let Some(&d) = chars.peek() {
        if !d.is_ascii_digit() {
            break;
        }
        s.push(d);
        chars.next();
    }
    s.parse().ok()
}

fn convert(conv: char, precision: Option<usize>, arg: &Value) -> Result<String, EvalError> {
    let number = |arg: &Value| match arg {
        Value::Scalar(x) => Ok(*x),
        other => Err(EvalError::function(
            "printf",
            format!("%{} needs a scalar, got a {}", conv, other.type_name()),
        )),
    };
    Ok(match conv {
        's' => match arg {
            Value::Str(s) => s.clone(),
            Value::Scalar(x) => format_g(*x, 6),
            other => other.type_name().to_string(),
        },
        _ if matches!(arg, Value::Scalar(x) if x.is_nan()) => "NA".to_string(),
        'd' | 'i' => format!("{}", number(arg)?.trunc() as i64),
        'f' => format!("{:.*}", precision.unwrap_or(6), number(arg)?),
        'e' => c_exponent(number(arg)?, precision.unwrap_or(6)),
        'g' => format_g(number(arg)?, precision.unwrap_or(6).max(1)),
        other => {
            return Err(EvalError::function(
                "printf",
                format!("unsupported conversion %{}", other),
            ))
        }
    })
}

/// Rust writes `1.5e3`; C writes `1.500000e+03`
fn c_exponent(x: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision, x);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => s,
    }
}

fn pad(body: String, width: usize, left: bool, zero: bool) -> String {
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if left {
        format!("{}{}", body, " ".repeat(fill))
    } else if zero {
        match body.strip_prefix('-') {
            Some(rest) => format!("-{}{}", "0".repeat(fill), rest),
            None => format!("{}{}", "0".repeat(fill), body),
        }
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printf_conversions() {
        let args = vec![
            Value::Scalar(3.0),
            Value::Scalar(2.5),
            Value::Str("ab".into()),
            Value::Scalar(1500.0),
        ];
        let s = format_printf("%d|%6.2f|%-4s|%e%%\\n", &args).unwrap();
        assert_eq!(s, "3|  2.50|ab  |1.500000e+03%\n");
    }

    #[test]
    fn test_printf_zero_padding_and_missing() {
        let args = vec![Value::Scalar(-7.0), Value::Scalar(f64::NAN)];
        assert_eq!(format_printf("%05d %g", &args).unwrap(), "-0007 NA");
        assert!(format_printf("%d %d", &args[..1]).is_err());
    }

    #[test]
    fn test_defbundle_and_nelem() {
        let b = defbundle(
            "defbundle",
            vec![Value::Str("b".into()), Value::Scalar(2.0), Value::Str("a".into()), Value::Scalar(1.0)],
        )
        .unwrap();
        assert_eq!(nelem("nelem", vec![b]).unwrap(), Value::Scalar(2.0));
    }
}
