use core::fmt;
use url::Url;

/// Request URL builder. Path segments are percent-encoded one by one so
/// file names containing spaces or diacritics survive the round trip.
#[derive(Clone)]
pub struct Resource {
    url: Url,
}

impl Resource {
    #[must_use]
    pub fn new(uri: &str) -> Option<Resource> {
        let url = Url::parse(uri).ok()?;
        if url.cannot_be_a_base() {
            return None;
        }
        Some(Resource { url })
    }

    /// Appends a single path segment, encoding it as needed.
    pub fn push(&mut self, segment: &str) -> &mut Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        self
    }

    /// Appends a query pair, encoding key and value.
    pub fn query(&mut self, key: &str, value: &str) -> &mut Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn new_correct_some() {
        // Arrange

        // Act
        let r = Resource::new("http://localhost");

        // Assert
        assert!(r.is_some());
    }

    #[test]
    fn new_incorrect_none() {
        // Arrange

        // Act
        let r = Resource::new("http/localhost");

        // Assert
        assert!(r.is_none());
    }

    #[rstest]
    #[case("http://localhost", "x", "http://localhost/x")]
    #[case("http://localhost/", "x", "http://localhost/x")]
    #[case("http://localhost/api", "x", "http://localhost/api/x")]
    #[case("http://localhost/api/", "x", "http://localhost/api/x")]
    #[case("http://localhost", "rapport final.pdf", "http://localhost/rapport%20final.pdf")]
    #[trace]
    fn push_single_segment(#[case] base: &str, #[case] segment: &str, #[case] expected: &str) {
        // Arrange
        let mut r = Resource::new(base).unwrap();

        // Act
        r.push(segment);

        // Assert
        assert_eq!(r.to_string().as_str(), expected);
    }

    #[test]
    fn push_then_query_chain() {
        // Arrange
        let mut r = Resource::new("http://localhost").unwrap();

        // Act
        r.push("api")
            .push("browse")
            .query("path", "Clients/Acme")
            .query("search", "rapport");

        // Assert
        assert_eq!(
            r.to_string().as_str(),
            "http://localhost/api/browse?path=Clients%2FAcme&search=rapport"
        );
    }
}
