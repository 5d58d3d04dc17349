//! Script output
//!
//! Everything a script prints goes through a `Printer`, which either writes to
//! stdout or collects the text so tests and embedders can inspect it.

use std::io::Write;

#[derive(Debug)]
enum Sink {
    Stdout,
    Capture(String),
}

#[derive(Debug)]
pub struct Printer {
    sink: Sink,
}

impl Printer {
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    pub fn capture() -> Self {
        Self {
            sink: Sink::Capture(String::new()),
        }
    }

    /// Write text without a trailing newline
    pub fn text(&mut self, s: &str) {
        match &mut self.sink {
            Sink::Stdout => {
                let mut out = std::io::stdout().lock();
                // A closed stdout is not a script error
                let _ = out.write_all(s.as_bytes());
                let _ = out.flush();
            }
            Sink::Capture(buf) => buf.push_str(s),
        }
    }

    pub fn line(&mut self, s: &str) {
        self.text(s);
        self.text("\n");
    }

    pub fn blank(&mut self) {
        self.text("\n");
    }

    /// Text collected so far (empty when writing to stdout)
    pub fn captured(&self) -> &str {
        match &self.sink {
            Sink::Stdout => "",
            Sink::Capture(buf) => buf,
        }
    }

    pub fn take_captured(&mut self) -> String {
        match &mut self.sink {
            Sink::Stdout => String::new(),
            Sink::Capture(buf) => std::mem::take(buf),
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::stdout()
    }
}

/// Format a number the way C's `%.*g` does; NaN prints as `NA`
pub fn format_g(x: f64, precision: usize) -> String {
    if x.is_nan() {
        return "NA".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return "0".to_string();
    }
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    if exp < -4 || exp >= p as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(&mantissa), sign, exp.abs())
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{:.*}", decimals, x))
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_g_matches_c_conventions() {
        assert_eq!(format_g(3.0, 6), "3");
        assert_eq!(format_g(0.1, 6), "0.1");
        assert_eq!(format_g(2.0 / 3.0, 6), "0.666667");
        assert_eq!(format_g(1234567.0, 6), "1.23457e+06");
        assert_eq!(format_g(0.00001234, 6), "1.234e-05");
        assert_eq!(format_g(-42.5, 6), "-42.5");
        assert_eq!(format_g(f64::NAN, 6), "NA");
    }

    #[test]
    fn test_capture_collects_lines() {
        let mut out = Printer::capture();
        out.line("a");
        out.text("b");
        out.blank();
        assert_eq!(out.captured(), "a\nb\n");
        assert_eq!(out.take_captured(), "a\nb\n");
        assert_eq!(out.captured(), "");
    }
}
