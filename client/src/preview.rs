use reqwest::Client;

/// Content types the viewer can render in place. Anything else gets an
/// error state without a single byte fetched.
pub const PREVIEWABLE_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

const UNSUPPORTED_MESSAGE: &str = "preview unavailable, download instead";

pub struct PreviewDocument {
    pub record_id: i64,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Viewer state machine. A failed load stays failed until the user opens
/// another document; there is no automatic retry.
pub enum PreviewState {
    Idle,
    Loading { record_id: i64 },
    Ready(PreviewDocument),
    Error { record_id: i64, message: String },
}

pub struct PreviewLoader {
    client: Client,
    /// Optional relay base the content URL is passed through, for
    /// deployments where the store is not reachable from the viewer.
    relay: Option<String>,
    state: PreviewState,
}

impl PreviewLoader {
    #[must_use]
    pub fn new(relay: Option<String>) -> Self {
        Self {
            client: Client::new(),
            relay,
            state: PreviewState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    /// Drops the loaded bytes and returns to idle.
    pub fn close(&mut self) {
        self.state = PreviewState::Idle;
    }

    /// The URL actually fetched: the content URL wrapped through the relay
    /// when one is configured.
    #[must_use]
    pub fn target_url(&self, content_url: &str) -> String {
        match &self.relay {
            Some(relay) => format!("{relay}{content_url}"),
            None => content_url.to_owned(),
        }
    }

    /// Opens a document for preview. Replaces whatever was shown before.
    pub async fn open(&mut self, record_id: i64, content_type: &str, content_url: &str, user: &str) {
        if !PREVIEWABLE_TYPES.contains(&content_type) {
            self.state = PreviewState::Error {
                record_id,
                message: UNSUPPORTED_MESSAGE.to_owned(),
            };
            return;
        }

        self.state = PreviewState::Loading { record_id };

        let url = self.target_url(content_url);
        let result = self.client.get(url).header("x-principal", user).send().await;
        self.state = match result {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => PreviewState::Ready(PreviewDocument {
                    record_id,
                    content_type: content_type.to_owned(),
                    bytes: bytes.to_vec(),
                }),
                Err(e) => PreviewState::Error {
                    record_id,
                    message: format!("content not read: {e}"),
                },
            },
            Ok(response) => PreviewState::Error {
                record_id,
                message: format!("content not served: {}", response.status()),
            },
            Err(e) => PreviewState::Error {
                record_id,
                message: format!("request failed: {e}"),
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn unsupported_type_errors_without_fetching() {
        // Arrange
        let mut loader = PreviewLoader::new(None);

        // Act
        // the URL is unreachable on purpose; an attempted fetch would fail
        // with a different message
        loader
            .open(7, "application/msword", "http://0.0.0.0:1/api/files/7", "alice")
            .await;

        // Assert
        match loader.state() {
            PreviewState::Error { record_id, message } => {
                assert_eq!(*record_id, 7);
                assert_eq!(message, UNSUPPORTED_MESSAGE);
            }
            _ => panic!("expected an error state"),
        }
    }

    #[tokio::test]
    async fn failed_fetch_stays_failed() {
        // Arrange
        let mut loader = PreviewLoader::new(None);

        // Act
        loader
            .open(3, "application/pdf", "http://0.0.0.0:1/api/files/3", "alice")
            .await;

        // Assert
        assert!(matches!(loader.state(), PreviewState::Error { record_id, .. } if *record_id == 3));
    }

    #[test]
    fn close_returns_to_idle() {
        // Arrange
        let mut loader = PreviewLoader::new(None);
        loader.state = PreviewState::Ready(PreviewDocument {
            record_id: 1,
            content_type: "application/pdf".to_owned(),
            bytes: vec![0u8; 8],
        });

        // Act
        loader.close();

        // Assert
        assert!(matches!(loader.state(), PreviewState::Idle));
    }

    #[rstest]
    #[case(None, "http://store/api/files/1", "http://store/api/files/1")]
    #[case(
        Some("http://relay/fetch?url="),
        "http://store/api/files/1",
        "http://relay/fetch?url=http://store/api/files/1"
    )]
    #[trace]
    fn target_url_goes_through_the_relay(
        #[case] relay: Option<&str>,
        #[case] content_url: &str,
        #[case] expected: &str,
    ) {
        // Arrange
        let loader = PreviewLoader::new(relay.map(str::to_owned));

        // Act
        let url = loader.target_url(content_url);

        // Assert
        assert_eq!(url, expected);
    }
}
