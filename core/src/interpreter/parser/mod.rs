//! Statement parser - PEST-based loop headers plus command classification
//!
//! Loop bodies are stored as text and executed later, so the parser only needs
//! to understand loop headers in full. Every other statement is classified by
//! its leading word so the engine knows which lines get special handling.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;


/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "interpreter/parser/loop.pest"]
struct LoopParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    PestError(String),
    BuildError(String),
    /// `endloop`, `endif` etc. without an opener, or an opener left unclosed
    Nesting { line: usize, message: String },
    /// An index variable reused by a nested loop
    IndexReuse { line: usize, name: String },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::PestError(msg) => write!(f, "Parse error: {}", msg),
            ParseError::BuildError(msg) => write!(f, "Invalid loop header: {}", msg),
            ParseError::Nesting { line, message } => {
                write!(f, "Nesting error on line {}: {}", line, message)
            }
            ParseError::IndexReuse { line, name } => write!(
                f,
                "Line {}: the index variable '{}' is already used by an enclosing loop",
                line, name
            ),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ParseError::PestError(err.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Loop Headers ===================== */

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopOptions {
    pub progressive: bool,
    pub verbose: bool,
    pub quiet: bool,
    /// Index loops count down from START to END
    pub decrement: bool,
}

/// What a header says about iteration, with bounds left as text
#[derive(Debug, Clone, PartialEq)]
pub enum LoopSpec {
    Count {
        times: String,
    },
    While {
        condition: String,
    },
    /// `i=START..END`; `dated` when both bounds are observation labels
    Range {
        var: String,
        start: String,
        end: String,
        dated: bool,
    },
    For {
        init: Option<String>,
        test: String,
        delta: Option<String>,
    },
    Each {
        var: String,
        words: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopHeader {
    pub spec: LoopSpec,
    pub options: LoopOptions,
}

/// Parse a `loop ...` header line
pub fn parse_header(line: &str) -> ParseResult<LoopHeader> {
    let line = line.trim();
    let mut pairs = LoopParser::parse(Rule::header, line)?;
    let header = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError(line.to_string()))?;

    let mut spec = None;
    let mut options = LoopOptions::default();
    for item in header.into_inner() {
        match item.as_rule() {
            Rule::for_spec | Rule::while_spec | Rule::each_spec | Rule::range_spec | Rule::count_spec => {
                spec = Some(build_spec(item)?)
            }
            Rule::option => match item.as_str() {
                "--progressive" => options.progressive = true,
                "--verbose" => options.verbose = true,
                "--quiet" => options.quiet = true,
                "--decr" => options.decrement = true,
                other => {
                    return Err(ParseError::BuildError(format!(
                        "unknown option '{}'",
                        other
                    )))
                }
            },
            _ => {}
        }
    }

    let spec = spec.ok_or_else(|| ParseError::BuildError(format!("'{}' has no loop type", line)))?;
    if options.decrement && !matches!(spec, LoopSpec::Range { .. }) {
        return Err(ParseError::BuildError(
            "--decr applies only to index loops".to_string(),
        ));
    }
    Ok(LoopHeader { spec, options })
}

fn build_spec(pair: Pair<Rule>) -> ParseResult<LoopSpec> {
    let rule = pair.as_rule();
    let parts: Vec<Pair<Rule>> = pair
        .into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::kw_for | Rule::kw_while | Rule::kw_foreach))
        .collect();
    let texts: Vec<&str> = parts.iter().map(|p| p.as_str().trim()).collect();

    match (rule, texts.as_slice()) {
        (Rule::count_spec, [times]) => Ok(LoopSpec::Count {
            times: times.to_string(),
        }),
        (Rule::while_spec, [condition]) => Ok(LoopSpec::While {
            condition: condition.to_string(),
        }),
        (Rule::range_spec, [var, start, end]) => {
            let dated = match (is_date_label(start), is_date_label(end)) {
                (true, true) => true,
                (false, false) => false,
                _ => {
                    return Err(ParseError::BuildError(format!(
                        "'{}..{}': both bounds must be dates or neither",
                        start, end
                    )))
                }
            };
            Ok(LoopSpec::Range {
                var: var.to_string(),
                start: start.to_string(),
                end: end.to_string(),
                dated,
            })
        }
        (Rule::for_spec, [parens]) => build_for(parens),
        (Rule::each_spec, [var, words @ ..]) if !words.is_empty() => Ok(LoopSpec::Each {
            var: var.to_string(),
            words: words.iter().map(|w| w.to_string()).collect(),
        }),
        _ => Err(ParseError::BuildError(format!("malformed {:?}", rule))),
    }
}

/// `(INIT; TEST; DELTA)`; INIT and DELTA may be empty
fn build_for(parens: &str) -> ParseResult<LoopSpec> {
    let inner = &parens[1..parens.len() - 1];
    let clauses = split_top_level(inner, ';');
    if clauses.len() != 3 {
        return Err(ParseError::BuildError(format!(
            "for loops need three clauses separated by ';', got {}",
            clauses.len()
        )));
    }
    let clause = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    let test = clause(clauses[1])
        .ok_or_else(|| ParseError::BuildError("the for-loop condition is empty".to_string()))?;
    Ok(LoopSpec::For {
        init: clause(clauses[0]),
        test,
        delta: clause(clauses[2]),
    })
}

/// Split on `sep` outside parentheses and string literals
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '(' | '[' if !in_string => depth += 1,
            ')' | ']' if !in_string => depth -= 1,
            c if c == sep && depth == 0 && !in_string => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// `YYYY:P` or `YYYY-MM-DD`
pub fn is_date_label(s: &str) -> bool {
    let all_digits = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
    if let Some((y, p)) = s.split_once(':') {
        return y.len() == 4 && all_digits(y) && all_digits(p);
    }
    let parts: Vec<&str> = s.split('-').collect();
    matches!(parts.as_slice(), [y, m, d] if y.len() == 4 && m.len() == 2 && d.len() == 2
        && all_digits(y) && all_digits(m) && all_digits(d))
}

/* ===================== Statement Classification ===================== */

/// Statement kinds the loop engine treats specially
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Loop,
    EndLoop,
    Break,
    Continue,
    If,
    Elif,
    Else,
    Endif,
    Print,
    Store,
    /// Model-producing estimation command
    Model,
    /// Assignment handled by the expression compiler
    Genr,
    Rename,
    Open,
    Ordinary,
}

/// A body line split into its catch flag and the statement proper
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub catch: bool,
    pub text: String,
}

const DECL_WORDS: [&str; 6] = ["scalar", "series", "string", "strings", "bundle", "genr"];

pub fn classify(line: &str) -> Statement {
    let mut text = line.trim();
    let mut catch = false;
    if let Some(rest) = strip_word(text, "catch") {
        catch = true;
        text = rest;
    }
    let word = first_word(text);
    let kind = match word {
        "loop" => StatementKind::Loop,
        "endloop" => StatementKind::EndLoop,
        "break" => StatementKind::Break,
        "continue" => StatementKind::Continue,
        "if" => StatementKind::If,
        "elif" => StatementKind::Elif,
        "else" => StatementKind::Else,
        "endif" => StatementKind::Endif,
        "print" => StatementKind::Print,
        "store" => StatementKind::Store,
        "ols" => StatementKind::Model,
        "rename" => StatementKind::Rename,
        "open" => StatementKind::Open,
        w if DECL_WORDS.contains(&w) => StatementKind::Genr,
        _ if is_assignment(text) => StatementKind::Genr,
        _ => StatementKind::Ordinary,
    };
    Statement {
        kind,
        catch,
        text: text.to_string(),
    }
}

pub fn is_loop_header(line: &str) -> bool {
    first_word(strip_word(line.trim(), "catch").unwrap_or(line.trim())) == "loop"
}

/// Leading word of a statement, up to whitespace or an opening parenthesis
pub fn first_word(text: &str) -> &str {
    let end = text
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(text.len());
    &text[..end]
}

/// Text after the leading word, trimmed
pub fn rest_of(text: &str) -> &str {
    text[first_word(text).len()..].trim()
}

fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(word)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// `name = ...`, `name += ...`, `name++` and friends, but not `name == ...`
fn is_assignment(text: &str) -> bool {
    let name_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    if name_len == 0 || text.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    let rest = text[name_len..].trim_start();
    if rest.starts_with("==") {
        return false;
    }
    ["=", "+=", "-=", "*=", "/=", "++", "--"]
        .iter()
        .any(|op| rest.starts_with(op))
}
