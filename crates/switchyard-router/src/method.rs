//! Allowed-method sets for 405 responses.

use http::Method;
use smallvec::SmallVec;

/// The methods under which a path would have matched.
///
/// Sorted by method name and de-duplicated. `HEAD` is dropped whenever
/// `GET` is present, because `GET` routes answer `HEAD` implicitly.
///
/// # Example
///
/// ```rust
/// use switchyard_router::AllowedMethods;
/// use http::Method;
///
/// let allowed: AllowedMethods = [Method::POST, Method::HEAD, Method::GET, Method::POST]
///     .into_iter()
///     .collect();
///
/// assert_eq!(allowed.header_value(), "GET, POST");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedMethods {
    methods: SmallVec<[Method; 4]>,
}

impl AllowedMethods {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method, keeping the set sorted and free of duplicates.
    pub fn insert(&mut self, method: Method) {
        if method == Method::HEAD && self.contains(&Method::GET) {
            return;
        }
        if method == Method::GET {
            self.methods.retain(|m| *m != Method::HEAD);
        }
        if let Err(pos) = self
            .methods
            .binary_search_by(|m| m.as_str().cmp(method.as_str()))
        {
            self.methods.insert(pos, method);
        }
    }

    /// Returns true if `method` is in the set.
    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.methods.iter().any(|m| m == method)
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Returns the number of methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Iterates over the methods in order.
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter()
    }

    /// Renders the value of an `Allow` header.
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut value = String::with_capacity(self.methods.len() * 8);
        for (i, method) in self.methods.iter().enumerate() {
            if i > 0 {
                value.push_str(", ");
            }
            value.push_str(method.as_str());
        }
        value
    }

    /// Removes every method, keeping capacity.
    pub fn clear(&mut self) {
        self.methods.clear();
    }
}

impl FromIterator<Method> for AllowedMethods {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        let mut allowed = Self::new();
        for method in iter {
            allowed.insert(method);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_sorted_and_deduplicated() {
        let allowed: AllowedMethods = [Method::PUT, Method::DELETE, Method::PUT, Method::GET]
            .into_iter()
            .collect();
        let methods: Vec<_> = allowed.iter().cloned().collect();
        assert_eq!(methods, vec![Method::DELETE, Method::GET, Method::PUT]);
    }

    #[test]
    fn test_head_suppressed_when_get_present() {
        let mut allowed = AllowedMethods::new();
        allowed.insert(Method::HEAD);
        assert!(allowed.contains(&Method::HEAD));

        allowed.insert(Method::GET);
        assert!(!allowed.contains(&Method::HEAD));
        assert_eq!(allowed.header_value(), "GET");

        allowed.insert(Method::HEAD);
        assert_eq!(allowed.len(), 1);
    }

    #[test]
    fn test_head_kept_without_get() {
        let allowed: AllowedMethods = [Method::HEAD, Method::OPTIONS].into_iter().collect();
        assert_eq!(allowed.header_value(), "HEAD, OPTIONS");
    }

    #[test]
    fn test_empty_header_value() {
        let allowed = AllowedMethods::new();
        assert!(allowed.is_empty());
        assert_eq!(allowed.header_value(), "");
    }

    #[test]
    fn test_clear() {
        let mut allowed: AllowedMethods = [Method::GET].into_iter().collect();
        allowed.clear();
        assert!(allowed.is_empty());
    }
}
