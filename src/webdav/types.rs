use crate::error::Result;
use hyper::{HeaderMap, header};

/// WebDAV `Depth` header value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// Annotated result of a batch operation: which path it was issued for and
/// the outcome, returned in input order by the fan-out helpers.
pub struct BatchItem<T> {
    pub path: String,
    pub result: Result<T>,
}

/// Builds a [`HeaderMap`] while dropping any header whose value is empty,
/// matching the distilled specification's header-merge rule (`4.2`, `9`): a
/// caller can "clear" a default header by passing an empty string rather
/// than needing to special-case `None`.
#[derive(Default)]
pub struct HeaderBuilder {
    headers: HeaderMap,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: header::HeaderName, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        if value.is_empty() {
            self.headers.remove(&name);
            return self;
        }
        if let Ok(v) = header::HeaderValue::from_str(value) {
            self.headers.insert(name, v);
        }
        self
    }

    pub fn set_opt(self, name: header::HeaderName, value: Option<impl AsRef<str>>) -> Self {
        match value {
            Some(v) => self.set(name, v),
            None => self,
        }
    }

    pub fn build(self) -> HeaderMap {
        self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_builder_drops_falsy_values() {
        let headers = HeaderBuilder::new()
            .set(header::IF_MATCH, "\"etag\"")
            .set(header::IF_NONE_MATCH, "")
            .build();
        assert!(headers.contains_key(header::IF_MATCH));
        assert!(!headers.contains_key(header::IF_NONE_MATCH));
    }
}
