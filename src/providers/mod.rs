//! Provider implementations for the closed set of supported backends.

mod google;
mod openai;
mod openrouter;
mod xai;

pub use google::GoogleProvider;
pub use openai::OpenAIProvider;
pub use openrouter::OpenRouterProvider;
pub use xai::XaiProvider;

/// Attaches a bearer `Authorization` header unless the key is empty.
///
/// Locally hosted OpenAI-compatible endpoints reject requests carrying an
/// empty bearer token, so the header is omitted entirely in that case.
pub(crate) fn bearer(
    builder: reqwest::RequestBuilder,
    api_key: &str,
) -> reqwest::RequestBuilder {
    if api_key.is_empty() {
        builder
    } else {
        builder.header(reqwest::header::AUTHORIZATION, format!("Bearer {api_key}"))
    }
}

/// Strips a trailing slash from a configured base URL.
pub(crate) fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_base() {
        assert_eq!(trim_base("https://api.openai.com/v1/"), "https://api.openai.com/v1");
        assert_eq!(trim_base("https://api.openai.com/v1"), "https://api.openai.com/v1");
    }

    #[tokio::test]
    async fn test_bearer_omitted_for_empty_key() {
        let client = reqwest::Client::new();
        let request = bearer(client.get("http://localhost/x"), "")
            .build()
            .unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());

        let request = bearer(client.get("http://localhost/x"), "sk-test")
            .build()
            .unwrap();
        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer sk-test"
        );
    }
}
