//! Marker substitution
//!
//! Index, dated and foreach loops publish a marker: `$name` in a body
//! statement is replaced by the current index, observation label or member
//! text before the statement runs. Markers of enclosing loops stay visible to
//! nested bodies.

/// A marker in scope while a loop runs
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub name: String,
    pub value: String,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Scan `text` for `$name` references, handing each name to `replace`.
/// Returns `None` when `replace` accepted none of them.
fn scan(text: &str, mut replace: impl FnMut(&str) -> Option<String>) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut found = false;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after.find(|c: char| !is_ident_char(c)).unwrap_or(after.len());
        let name = &after[..len];
        match replace(name) {
            Some(value) if !name.is_empty() => {
                out.push_str(&value);
                found = true;
            }
            _ => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }
    if !found {
        return None;
    }
    out.push_str(rest);
    Some(out)
}

/// Substitute every marker in scope in one left-to-right pass; an inner
/// loop's marker shadows an outer one of the same name.
/// Returns `None` when the text holds no marker at all.
pub fn substitute(text: &str, markers: &[Marker]) -> Option<String> {
    if !text.contains('$') {
        return None;
    }
    scan(text, |name| {
        markers
            .iter()
            .rev()
            .find(|m| m.name == name)
            .map(|m| m.value.clone())
    })
}

/// Whether `text` references any of the named markers
pub fn mentions_marker<'a>(text: &str, names: impl Iterator<Item = &'a str>) -> bool {
    if !text.contains('$') {
        return false;
    }
    let names: Vec<&str> = names.collect();
    scan(text, |name| names.contains(&name).then(String::new)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(name: &str, value: &str) -> Marker {
        Marker {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_replaces_whole_marker_only() {
        let markers = vec![marker("i", "3")];
        assert_eq!(
            substitute("x$i = $i + $ix", &markers),
            Some("x3 = 3 + $ix".to_string())
        );
        assert_eq!(substitute("y = $ix", &markers), None);
        assert_eq!(substitute("y = 1", &markers), None);
    }

    #[test]
    fn test_outer_markers_resolve_in_nested_bodies() {
        let markers = vec![marker("v", "gdp"), marker("j", "2")];
        assert_eq!(
            substitute("x_$j = $v", &markers),
            Some("x_2 = gdp".to_string())
        );
        assert_eq!(substitute("print \"$v$j\"", &markers), Some("print \"gdp2\"".to_string()));
    }

    #[test]
    fn test_accessors_are_not_markers() {
        let markers = vec![marker("i", "1")];
        assert_eq!(substitute("e = $error", &markers), None);
        assert!(!mentions_marker("e = $error", ["i"].into_iter()));
        assert!(mentions_marker("n = $i + 1", ["i"].into_iter()));
    }
}
