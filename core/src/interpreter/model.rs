//! Model-producing commands
//!
//! Loops treat estimation commands specially: in progressive mode their
//! coefficients are accumulated, otherwise the model is printed and registered
//! as the last model. Only ordinary least squares is provided.

use super::errors::EvalError;
use super::output::{format_g, Printer};
use super::workspace::{Value, Workspace};

/// An estimated model
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub estimator: &'static str,
    pub depvar: String,
    pub names: Vec<String>,
    pub coeff: Vec<f64>,
    pub sderr: Vec<f64>,
    pub nobs: usize,
    /// First and last observations used (0-based)
    pub sample: (usize, usize),
    pub ssr: f64,
    pub rsq: f64,
}

impl Model {
    pub fn ncoeff(&self) -> usize {
        self.coeff.len()
    }

    pub fn print(&self, ws: &Workspace, out: &mut Printer) {
        let cal = ws.calendar();
        out.line(&format!(
            "Model: {}, using observations {}-{} (n = {})",
            self.estimator,
            cal.label(self.sample.0),
            cal.label(self.sample.1),
            self.nobs
        ));
        out.line(&format!("Dependent variable: {}", self.depvar));
        out.blank();
        out.line(&format!("{:>12} {:>14} {:>14}", "", "coefficient", "std. error"));
        for ((name, b), se) in self.names.iter().zip(&self.coeff).zip(&self.sderr) {
            out.line(&format!("{:>12} {:>14} {:>14}", name, format_g(*b, 6), format_g(*se, 6)));
        }
        out.blank();
        out.line(&format!("SSR = {}, R-squared = {}", format_g(self.ssr, 6), format_g(self.rsq, 6)));
        out.blank();
    }
}

/// Estimation request parsed from `ols depvar regressors... [--quiet]`
#[derive(Debug, Clone, PartialEq)]
pub struct OlsSpec {
    pub depvar: String,
    pub regressors: Vec<String>,
    pub quiet: bool,
}

impl OlsSpec {
    pub fn parse(args: &str) -> Result<OlsSpec, EvalError> {
        let mut quiet = false;
        let mut words = Vec::new();
        for word in args.split_whitespace() {
            match word {
                "--quiet" => quiet = true,
                opt if opt.starts_with("--") => {
                    return Err(EvalError::syntax(args, format!("unknown option {}", opt)))
                }
                _ => words.push(word.to_string()),
            }
        }
        if words.len() < 2 {
            return Err(EvalError::syntax(args, "ols needs a dependent variable and at least one regressor"));
        }
        let depvar = words.remove(0);
        Ok(OlsSpec {
            depvar,
            regressors: words,
            quiet,
        })
    }
}

/// Estimate by least squares on the observations where every variable is present
pub fn ols(ws: &Workspace, spec: &OlsSpec) -> Result<Model, EvalError> {
    let y = series(ws, &spec.depvar)?;

    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();
    for word in &spec.regressors {
        if word == "const" || word == "0" {
            names.push("const".to_string());
            columns.push(vec![1.0; ws.nobs()]);
        } else if let Some(members) = ws.list(word) {
            for member in members {
                names.push(member.clone());
                columns.push(series(ws, member)?);
            }
        } else {
            names.push(word.clone());
            columns.push(series(ws, word)?);
        }
    }

    let rows: Vec<usize> = (0..ws.nobs())
        .filter(|&t| !y[t].is_nan() && columns.iter().all(|c| !c[t].is_nan()))
        .collect();
    let n = rows.len();
    let k = columns.len();
    if n <= k {
        return Err(EvalError::Data(format!(
            "ols: insufficient observations ({} for {} parameters)",
            n, k
        )));
    }

    // X'X and X'y
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for &t in &rows {
        for i in 0..k {
            xty[i] += columns[i][t] * y[t];
            for j in 0..=i {
                xtx[i][j] += columns[i][t] * columns[j][t];
            }
        }
    }
    for i in 0..k {
        for j in 0..i {
            xtx[j][i] = xtx[i][j];
        }
    }

    let inv = invert(xtx).ok_or_else(|| EvalError::Data("ols: exact collinearity among the regressors".to_string()))?;
    let coeff: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inv[i][j] * xty[j]).sum())
        .collect();

    let mut ssr = 0.0;
    let ybar = rows.iter().map(|&t| y[t]).sum::<f64>() / n as f64;
    let mut tss = 0.0;
    for &t in &rows {
        let fitted: f64 = (0..k).map(|i| coeff[i] * columns[i][t]).sum();
        ssr += (y[t] - fitted).powi(2);
        tss += (y[t] - ybar).powi(2);
    }
    let s2 = ssr / (n - k) as f64;
    let sderr = (0..k).map(|i| (s2 * inv[i][i]).max(0.0).sqrt()).collect();
    let rsq = if tss > 0.0 { 1.0 - ssr / tss } else { f64::NAN };

    Ok(Model {
        estimator: "OLS",
        depvar: spec.depvar.clone(),
        names,
        coeff,
        sderr,
        nobs: n,
        sample: (rows[0], rows[n - 1]),
        ssr,
        rsq,
    })
}

fn series(ws: &Workspace, name: &str) -> Result<Vec<f64>, EvalError> {
    match ws.get(name) {
        Some(Value::Series(xs)) => Ok(xs.clone()),
        Some(other) => Err(EvalError::Type(format!(
            "ols: '{}' is a {}, not a series",
            name,
            other.type_name()
        ))),
        None => Err(EvalError::Undefined(name.to_string())),
    }
}

/// Gauss-Jordan inversion with partial pivoting
fn invert(mut a: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let k = a.len();
    let scale = a
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot = (col..k).max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 * scale {
            return None;
        }
        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..k {
            a[col][j] /= p;
            inv[col][j] /= p;
        }
        for row in 0..k {
            if row != col {
                let factor = a[row][col];
                if factor != 0.0 {
                    for j in 0..k {
                        a[row][j] -= factor * a[col][j];
                        inv[row][j] -= factor * inv[col][j];
                    }
                }
            }
        }
    }
    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(y: Vec<f64>, x: Vec<f64>) -> Workspace {
        let mut ws = Workspace::new(Some(7));
        ws.new_dataset(y.len());
        ws.assign("y", Value::Series(y)).unwrap();
        ws.assign("x", Value::Series(x)).unwrap();
        ws
    }

    #[test]
    fn test_exact_fit_recovers_coefficients() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = x.iter().map(|v| 2.0 + 3.0 * v).collect();
        let ws = dataset(y, x);

        let spec = OlsSpec::parse("y const x").unwrap();
        let model = ols(&ws, &spec).unwrap();

        assert_eq!(model.names, vec!["const", "x"]);
        assert!((model.coeff[0] - 2.0).abs() < 1e-10);
        assert!((model.coeff[1] - 3.0).abs() < 1e-10);
        assert!(model.ssr < 1e-18);
        assert_eq!(model.nobs, 5);
    }

    #[test]
    fn test_collinear_regressors_are_rejected() {
        let ws = dataset(vec![1.0, 2.0, 4.0], vec![1.0, 1.0, 1.0]);
        let spec = OlsSpec::parse("y const x").unwrap();
        assert!(matches!(ols(&ws, &spec), Err(EvalError::Data(_))));
    }

    #[test]
    fn test_missing_rows_are_skipped() {
        let ws = dataset(
            vec![1.0, f64::NAN, 3.0, 5.0, 4.0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        );
        let model = ols(&ws, &OlsSpec::parse("y const x --quiet").unwrap()).unwrap();
        assert_eq!(model.nobs, 4);
        assert_eq!(model.sample, (0, 4));
    }
}
