//! Custom assertions for testing

use std::fmt::Debug;

/// Assert that a collection contains an element
pub fn assert_contains<T: PartialEq + Debug>(collection: &[T], element: &T) {
    assert!(
        collection.contains(element),
        "Collection {collection:?} does not contain element: {element:?}"
    );
}

/// Assert that a collection is sorted
pub fn assert_sorted<T: PartialOrd + Debug>(collection: &[T]) {
    for window in collection.windows(2) {
        assert!(
            window[0] <= window[1],
            "Collection not sorted at elements: {:?} > {:?}",
            window[0],
            window[1]
        );
    }
}

/// Assert a 64-character uppercase hex SHA-256 digest
pub fn assert_upper_sha256(hash: &str) {
    assert_eq!(hash.len(), 64, "digest length: {hash}");
    assert!(
        hash.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)),
        "digest is not uppercase hex: {hash}"
    );
}

/// Assert a 64-character lowercase hex SHA-256 digest
pub fn assert_lower_sha256(hash: &str) {
    assert_eq!(hash.len(), 64, "digest length: {hash}");
    assert!(
        hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
        "digest is not lowercase hex: {hash}"
    );
}

/// Assert that an error's display text contains a substring
pub fn assert_error_contains<E: std::fmt::Display>(error: &E, expected: &str) {
    let message = error.to_string();
    assert!(
        message.contains(expected),
        "Error message '{message}' does not contain '{expected}'"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_assertions() {
        assert_upper_sha256(&"AB".repeat(32));
        assert_lower_sha256(&"0f".repeat(32));
        assert_sorted(&[1, 2, 2, 5]);
        assert_contains(&["a", "b"], &"b");
    }

    #[test]
    #[should_panic(expected = "uppercase")]
    fn test_lowercase_rejected_as_upper() {
        assert_upper_sha256(&"ab".repeat(32));
    }
}
