//! Google Translate adapter (public `translate_a/single` endpoint).
//!
//! Source language is auto-detected; the target comes from the caller.

use std::time::Duration;

use async_trait::async_trait;
use digitalbot_core::{
    errors::Error,
    ports::{Translation, Translator},
    Result,
};
use tracing::debug;

const ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Longest text accepted in one request; the GET endpoint rejects huge URLs.
pub const MAX_INPUT_CHARS: usize = 4000;

#[derive(Clone, Debug)]
pub struct GoogleTranslateClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslateClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoint(ENDPOINT, timeout)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslateClient {
    async fn translate(&self, text: &str, target: &str) -> Result<Translation> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("nothing to translate".to_string()));
        }
        if text.chars().count() > MAX_INPUT_CHARS {
            return Err(Error::InvalidInput(format!(
                "text longer than {MAX_INPUT_CHARS} characters"
            )));
        }

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| Error::External(format!("translate request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "translate failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("translate json error: {e}")))?;

        let translation = parse_response(&v)?;
        debug!(source = %translation.source_lang, target, "translated text");
        Ok(translation)
    }
}

/// Parse the nested-array payload:
/// `[[["translated", "original", ...], ...], null, "en", ...]`.
pub fn parse_response(v: &serde_json::Value) -> Result<Translation> {
    let segments = v
        .get(0)
        .and_then(|s| s.as_array())
        .ok_or_else(|| Error::External("translate response has no segments".to_string()))?;

    let mut text = String::new();
    let mut original = String::new();
    for seg in segments {
        if let Some(t) = seg.get(0).and_then(|t| t.as_str()) {
            text.push_str(t);
        }
        if let Some(o) = seg.get(1).and_then(|o| o.as_str()) {
            original.push_str(o);
        }
    }

    if text.trim().is_empty() {
        return Err(Error::External("translate returned empty text".to_string()));
    }

    let source_lang = v
        .get(2)
        .and_then(|s| s.as_str())
        .unwrap_or("auto")
        .to_string();

    Ok(Translation {
        original,
        source_lang,
        text,
    })
}

/// Persian display name of a language code, if known.
pub fn language_name_fa(code: &str) -> Option<&'static str> {
    let base = code.split(['-', '_']).next().unwrap_or(code);
    Some(match base.to_ascii_lowercase().as_str() {
        "fa" => "فارسی",
        "en" => "انگلیسی",
        "ar" => "عربی",
        "tr" => "ترکی",
        "fr" => "فرانسوی",
        "de" => "آلمانی",
        "es" => "اسپانیایی",
        "it" => "ایتالیایی",
        "ru" => "روسی",
        "zh" => "چینی",
        "ja" => "ژاپنی",
        "ko" => "کره‌ای",
        "hi" => "هندی",
        "ur" => "اردو",
        "ps" => "پشتو",
        "ku" | "ckb" => "کردی",
        "az" => "آذربایجانی",
        "hy" => "ارمنی",
        "pt" => "پرتغالی",
        "nl" => "هلندی",
        "sv" => "سوئدی",
        "pl" => "لهستانی",
        "uk" => "اوکراینی",
        "he" | "iw" => "عبری",
        "el" => "یونانی",
        "id" => "اندونزیایی",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_multi_segment_response() {
        let v = json!([
            [
                ["سلام، ", "Hello, ", null, null, 10],
                ["حالت چطوره؟", "how are you?", null, null, 10]
            ],
            null,
            "en"
        ]);
        let t = parse_response(&v).unwrap();
        assert_eq!(t.text, "سلام، حالت چطوره؟");
        assert_eq!(t.original, "Hello, how are you?");
        assert_eq!(t.source_lang, "en");
    }

    #[test]
    fn missing_language_defaults_to_auto() {
        let v = json!([[["x", "y"]]]);
        assert_eq!(parse_response(&v).unwrap().source_lang, "auto");
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_response(&json!({"error": 1})).is_err());
        assert!(parse_response(&json!([[["", "y"]], null, "en"])).is_err());
    }

    #[test]
    fn language_names() {
        assert_eq!(language_name_fa("en"), Some("انگلیسی"));
        assert_eq!(language_name_fa("zh-CN"), Some("چینی"));
        assert_eq!(language_name_fa("xx"), None);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_request() {
        let client = GoogleTranslateClient::with_endpoint("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = client.translate("   ", "fa").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
