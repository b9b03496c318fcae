//! Dotted numeric version ordering.
//!
//! This is a lenient comparator: each `.`-separated component is read as
//! a non-negative integer, and anything that does not parse (`beta`, `rc1`,
//! an empty component) counts as `0`. Missing trailing components are
//! treated as `0` too, so `1.2` and `1.2.0` compare equal. It decides which
//! version of a package is the latest; the catalog's storage order does
//! not depend on it.

use std::cmp::Ordering;

/// Compare two dotted version strings component-wise.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = components(a);
    let b = components(b);
    let len = a.len().max(b.len());

    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn components(version: &str) -> Vec<u64> {
    version.split('.').map(leading_number).collect()
}

/// Leading decimal digits of a component; `0` when there are none.
fn leading_number(component: &str) -> u64 {
    component
        .trim()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d - b'0')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(compare("1.2.0", "1.2"), Ordering::Equal);
        assert_eq!(compare("1", "1.0.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert_eq!(compare("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare("1.9.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare("2.0", "1.9.9"), Ordering::Greater);
    }

    #[test]
    fn test_unparsable_components_are_zero() {
        assert_eq!(compare("1.x", "1.0"), Ordering::Equal);
        assert_eq!(compare("1..2", "1.0.2"), Ordering::Equal);
        assert_eq!(compare("beta", "0"), Ordering::Equal);
    }

    #[test]
    fn test_leading_digits_are_kept() {
        // "3-beta" reads as 3
        assert_eq!(compare("1.3-beta", "1.3"), Ordering::Equal);
        assert_eq!(compare("1.3-beta", "1.2"), Ordering::Greater);
    }
}
