//! Case-insensitive `%` wildcard matching
//!
//! Name, type and provider filters accept patterns where `%` matches any run
//! of characters (including none). No other character is special, which
//! keeps the in-memory matcher and the SQL `LIKE ... ESCAPE` translation in
//! agreement.

/// The only wildcard character in filter patterns
pub const WILDCARD: char = '%';

/// Check whether a pattern contains a wildcard
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD)
}

/// Case-insensitive wildcard match of `value` against `pattern`
///
/// Case folding is ASCII-only, like SQLite `NOCASE` and `LIKE`.
pub fn matches(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_lowercase().chars().collect();
    let value: Vec<char> = value.to_ascii_lowercase().chars().collect();

    // Iterative glob matching with single-star backtracking
    let (mut p, mut v) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while v < value.len() {
        if p < pattern.len() && pattern[p] == WILDCARD {
            star = Some(p);
            p += 1;
            mark = v;
        } else if p < pattern.len() && pattern[p] == value[v] {
            p += 1;
            v += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            v = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == WILDCARD {
        p += 1;
    }
    p == pattern.len()
}

/// Check whether `value` matches any of `patterns`
pub fn matches_any<'a, I>(patterns: I, value: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    patterns.into_iter().any(|p| matches(p, value))
}

/// Translate a pattern into a SQL `LIKE` operand using `\` as the escape
pub fn to_sql_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    for c in pattern.chars() {
        match c {
            '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
