//! SQL `LIKE` / `ILIKE` pattern matching.
//!
//! Two wildcards are recognised:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! A backslash escapes the following character. Matching operates on Unicode
//! scalar values and runs in `O(value * pattern)` worst case using the
//! single-backtrack-point greedy algorithm.

use alloc::vec::Vec;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Token {
    Any,
    One,
    Char(char),
}

fn tokenize(pattern: &str, fold_case: bool) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = match c {
            '%' => {
                // consecutive % collapse
                if tokens.last() == Some(&Token::Any) {
                    continue;
                }
                Token::Any
            }
            '_' => Token::One,
            '\\' => match chars.next() {
                Some(escaped) => Token::Char(fold(escaped, fold_case)),
                None => Token::Char('\\'),
            },
            other => Token::Char(fold(other, fold_case)),
        };
        tokens.push(token);
    }
    tokens
}

#[inline]
fn fold(c: char, fold_case: bool) -> char {
    if fold_case {
        c.to_lowercase().next().unwrap_or(c)
    } else {
        c
    }
}

fn matches(value: &str, pattern: &str, fold_case: bool) -> bool {
    let text: Vec<char> = value.chars().map(|c| fold(c, fold_case)).collect();
    let tokens = tokenize(pattern, fold_case);

    let (mut ti, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < text.len() {
        match tokens.get(pi) {
            Some(Token::Any) => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(Token::One) => {
                ti += 1;
                pi += 1;
            }
            Some(Token::Char(c)) if *c == text[ti] => {
                ti += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    backtrack = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }
    tokens[pi..].iter().all(|t| *t == Token::Any)
}

/// SQL LIKE pattern matching (case-sensitive).
///
/// ```
/// use strata_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    matches(value, pattern, false)
}

/// SQL ILIKE pattern matching (case-insensitive).
pub fn ilike(value: &str, pattern: &str) -> bool {
    matches(value, pattern, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_wildcards() {
        assert!(like("hello", "hello"));
        assert!(like("hello", "%"));
        assert!(like("", "%"));
        assert!(like("hello", "h%"));
        assert!(like("hello", "%llo"));
        assert!(like("hello", "h_llo"));
        assert!(!like("hello", "h_lo"));
        assert!(!like("", "_"));
    }

    #[test]
    fn test_like_backtracking() {
        assert!(like("abcabcabd", "%abd"));
        assert!(like("mississippi", "%iss%pi"));
        assert!(!like("mississippi", "%iss%px"));
        assert!(like("aaa", "a%%a"));
    }

    #[test]
    fn test_like_escape() {
        assert!(like("100%", "100\\%"));
        assert!(!like("1000", "100\\%"));
        assert!(like("a_b", "a\\_b"));
    }

    #[test]
    fn test_ilike() {
        assert!(ilike("Hello", "hello"));
        assert!(ilike("HELLO world", "%World"));
        assert!(!like("Hello", "hello"));
    }

    #[test]
    fn test_unicode() {
        assert!(like("héllo", "h_llo"));
        assert!(ilike("ÉCOLE", "école"));
    }
}
