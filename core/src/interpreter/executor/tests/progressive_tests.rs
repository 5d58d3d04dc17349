//! Progressive loops: accumulated print, store and model statistics

use super::helpers::*;
use crate::interpreter::LoopError;

const LINEAR_DATA: &str = "nulldata 10\nx = index\ny = 2 * x + 1\n";

#[test]
fn test_constant_scalar_has_zero_sd() {
    for k in [1, 3, 250] {
        let s = run_ok(&format!("loop {} --progressive\nc = 0.1\nprint c\nendloop\n", k));
        assert!(s.output().contains(&format!("Statistics for {} repetitions", k)));
        assert_eq!(row(&s, "c"), vec!["c", "0.1", "0"]);
    }
}

#[test]
fn test_mean_and_population_sd() {
    let s = run_ok("loop i=1..4 --progressive\nx = i\nprint x\nendloop\n");
    // values 1..4: mean 2.5, population variance 1.25
    assert_eq!(row(&s, "x"), vec!["x", "2.5", "1.11803"]);
}

#[test]
fn test_progressive_print_emits_nothing_per_pass() {
    let s = run_ok("loop 3 --progressive\na = 1\nb = 2\nprint a b\nprint \"literal\"\nendloop\n");
    let out = lines(&s);
    assert_eq!(out.iter().filter(|l| **l == "literal").count(), 3);
    assert!(!out.iter().any(|l| l.starts_with("a = ")));
    assert_eq!(row(&s, "b"), vec!["b", "2", "0"]);
}

#[test]
fn test_store_writes_one_row_per_pass() {
    let path = std::env::temp_dir().join(format!("cadence_store_{}.csv", std::process::id()));
    let script = format!(
        "loop i=1..3 --progressive\nx = i * 2\ny = NA\nstore {} x y\nendloop\n",
        path.display()
    );
    let s = run_ok(&script);
    let body = std::fs::read_to_string(&path).unwrap();
    assert_eq!(body, "x,y\n2,NA\n4,NA\n6,NA\n");
    assert!(s.output().contains("store: wrote 3 observations on 2 variables"));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_store_json() {
    let path = std::env::temp_dir().join(format!("cadence_store_{}.json", std::process::id()));
    run_ok(&format!("loop 2 --progressive\nz = 5\nstore {} z\nendloop\n", path.display()));
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["columns"], serde_json::json!(["z"]));
    assert_eq!(json["rows"], serde_json::json!([[5.0], [5.0]]));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_store_outside_progressive_loop_is_rejected() {
    let (_, err) = run_err("loop 2\nz = 1\nstore out.csv z\nendloop\n");
    assert!(matches!(err.root(), LoopError::Parse(_)));
}

#[test]
fn test_model_coefficients_accumulate() {
    let s = run_ok(&format!("{}loop 4 --progressive\nols y const x\nendloop\n", LINEAR_DATA));
    assert!(s.output().contains("OLS estimates, dependent variable y"));
    assert!(s.output().contains("Statistics for 4 repetitions"));
    let cells = row(&s, "x");
    assert_eq!(&cells[..3], &["x", "2", "0"]);
    let cells = row(&s, "const");
    assert_eq!(&cells[..3], &["const", "1", "0"]);
    // no per-pass model printout
    assert!(!s.output().contains("Model:"));
}

#[test]
fn test_item_count_change_is_fatal() {
    let (_, err) = run_err(
        "a = 1\nb = 2\nS = defarray(\"a\", \"a b\")\nloop foreach v S --progressive\nprint $v\nendloop\n",
    );
    match err.root() {
        LoopError::Schema { role, expected, got, .. } => {
            assert_eq!(*role, "print");
            assert_eq!((*expected, *got), (1, 2));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_accumulators_restart_on_reentry() {
    let script = "function sim\nloop i=1..3 --progressive\nx = i\nprint x\nendloop\nend function\nsim()\nsim()\n";
    let s = run_ok(script);
    let summaries: Vec<&str> = lines(&s)
        .into_iter()
        .filter(|l| l.trim_start().starts_with("x "))
        .collect();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0], summaries[1]);
    assert_eq!(s.output().matches("Statistics for 3 repetitions").count(), 2);
}

#[test]
fn test_nested_progressive_reports_per_outer_pass() {
    let s = run_ok("loop 2\nloop 3 --progressive\nc = 1\nprint c\nendloop\nendloop\n");
    assert_eq!(s.output().matches("Statistics for 3 repetitions").count(), 2);
}

#[test]
fn test_summaries_of_a_compiled_loop() {
    let mut lp = compile_block("loop i=1..4 --progressive\nx = i\nprint x\nendloop");
    let mut rt = test_runtime();
    crate::interpreter::executor::execute(&mut lp, &mut rt).unwrap();

    let summary = lp.summaries(1).unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].name, "x");
    assert!((summary[0].mean - 2.5).abs() < 1e-12);
    assert!((summary[0].sd - 1.25f64.sqrt()).abs() < 1e-12);
    // plain statements carry no tracker
    assert!(lp.summaries(0).is_none());
}
