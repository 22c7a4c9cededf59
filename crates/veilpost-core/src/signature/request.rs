//! Request view used for signature bases

/// The parts of an HTTP request (or receipt) a signature can cover.
///
/// Header names are stored lowercase; lookups are case-insensitive. Setting a
/// header that already exists replaces its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParts {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
}

impl RequestParts {
    /// Request with a method and a request target (`/path?query`).
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self { method: method.into(), target: target.into(), headers: Vec::new() }
    }

    /// Builder-style [`Self::insert_header`].
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Set a header, replacing any previous value.
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// HTTP method as given.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path and query.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        self.target.split_once('?').map_or(self.target.as_str(), |(path, _)| path)
    }

    /// Query string including the leading `?`, or `?` when absent.
    pub fn query(&self) -> String {
        self.target.split_once('?').map_or_else(|| "?".to_string(), |(_, q)| format!("?{q}"))
    }

    /// Value of a covered component, derived (`@method`, `@path`, ...) or a
    /// header.
    pub fn component(&self, name: &str) -> Option<String> {
        match name {
            "@method" => Some(self.method.to_ascii_uppercase()),
            "@path" => Some(self.path().to_string()),
            "@query" => Some(self.query()),
            "@request-target" => Some(self.target.clone()),
            "@authority" => self.header("host").map(str::to_ascii_lowercase),
            derived if derived.starts_with('@') => None,
            header => self.header(header).map(|v| v.trim().to_string()),
        }
    }
}
