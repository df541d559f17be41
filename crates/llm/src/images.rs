//! Image reference resolution for multimodal chat content.

use std::{sync::LazyLock, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;

use crate::error::{LlmError, LlmResult};

/// Inline images arrive as `data:image/<subtype>;base64,<payload>`.
/// Claude on Bedrock accepts image/jpeg, image/png, image/gif and image/webp.
static DATA_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:(image/[a-z]*);base64,\s*").expect("data url pattern is valid"));

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves image references into base64 payloads the backend dialects accept.
pub(crate) struct ImageResolver {
    client: reqwest::Client,
}

impl ImageResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// Resolve an image reference to a `(base64 payload, media type)` pair.
    ///
    /// `data:` URIs are unpacked in place; anything else is fetched over HTTP.
    pub async fn resolve(&self, url: &str) -> LlmResult<(String, String)> {
        if let Some(captures) = DATA_URL.captures(url) {
            let media_type = captures[1].to_string();
            let payload = DATA_URL.replace(url, "").into_owned();

            return Ok((payload, media_type));
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            log::error!("Image fetch failed for {url}: {e}");
            image_fetch_error()
        })?;

        if response.status() != reqwest::StatusCode::OK {
            log::error!("Image fetch for {url} returned status {}", response.status());
            return Err(image_fetch_error());
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|content_type| content_type.starts_with("image"))
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response.bytes().await.map_err(|e| {
            log::error!("Failed to read image body from {url}: {e}");
            image_fetch_error()
        })?;

        Ok((STANDARD.encode(&bytes), media_type))
    }
}

fn image_fetch_error() -> LlmError {
    LlmError::Internal("Unable to access the image url".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unpacks_data_uri() {
        let resolver = ImageResolver::new();
        let (payload, media_type) = resolver
            .resolve("data:image/png;base64, iVBORw0KGgo=")
            .await
            .unwrap();

        assert_eq!(media_type, "image/png");
        assert_eq!(payload, "iVBORw0KGgo=");
    }

    #[tokio::test]
    async fn data_uri_without_whitespace() {
        let resolver = ImageResolver::new();
        let (payload, media_type) = resolver
            .resolve("data:image/webp;base64,AAAA")
            .await
            .unwrap();

        assert_eq!(media_type, "image/webp");
        assert_eq!(payload, "AAAA");
    }
}
