//! Diagnosis extraction over an OpenAI-compatible chat-completions endpoint.
//!
//! Works against any server exposing `POST {base_url}/chat/completions`
//! (a local Ollama instance serves one at `http://localhost:11434/v1`). Calls are
//! blocking, one per note, bounded by the configured timeout. Every fault is
//! reported to the converter as [`Extraction::Failed`]; nothing propagates
//! past the row.

mod error;

pub use error::{ExtractorError, ExtractorResult};

use emr_core::{DiagnosisExtractor, Extraction};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a clinical coding assistant. \
Read the clinical note and reply with the single primary diagnosis it describes, \
as a short label such as \"Bronchitis\". \
Reply with the label only, with no punctuation, explanation or formatting. \
If the note does not describe a diagnosis, reply exactly: No Diagnosis Found";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractorConfig {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl ExtractorConfig {
    /// # Errors
    ///
    /// Returns `ExtractorError::Config` if `base_url` is not an http(s) URL or
    /// `model` is blank.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> ExtractorResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let model = model.into().trim().to_string();

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ExtractorError::Config(format!(
                "base URL must start with http:// or https://, got '{base_url}'"
            )));
        }
        if model.is_empty() {
            return Err(ExtractorError::Config("model name is required".into()));
        }

        Ok(Self {
            base_url,
            model,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a chat-completions response body.
fn parse_completion(body: &str) -> ExtractorResult<String> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(ExtractorError::EmptyResponse)
}

/// Blocking HTTP diagnosis extractor.
pub struct LlmExtractor {
    client: Client,
    config: ExtractorConfig,
}

impl LlmExtractor {
    pub fn new(config: ExtractorConfig) -> ExtractorResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ExtractorError::Client)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Ask the model for the primary diagnosis in `note` and return its raw reply.
    pub fn complete(&self, note: &str) -> ExtractorResult<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: EXTRACTION_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: note,
                },
            ],
            temperature: 0.0,
        };

        let mut request = self.client.post(self.config.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(ExtractorError::Request)?;
        let status = response.status();
        let text = response.text().map_err(ExtractorError::Request)?;
        if !status.is_success() {
            return Err(ExtractorError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_completion(&text)
    }
}

impl DiagnosisExtractor for LlmExtractor {
    fn extract(&self, note: &str) -> Extraction {
        match self.complete(note) {
            Ok(label) => {
                let extraction = Extraction::from_label(&label);
                tracing::debug!(label = extraction.as_label(), "diagnosis extracted");
                extraction
            }
            Err(e) => {
                tracing::warn!(
                    model = %self.config.model,
                    error = %e,
                    "diagnosis extraction failed"
                );
                Extraction::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve exactly one HTTP response, returning the request body it received.
    fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/v1", listener.local_addr().expect("addr"));
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("content length");
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).expect("read body");

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .expect("write response");
            String::from_utf8(request_body).expect("utf8 body")
        });
        (url, handle)
    }

    fn extractor(base_url: &str) -> LlmExtractor {
        let config = ExtractorConfig::new(base_url, "llama3")
            .expect("config")
            .with_timeout(Duration::from_secs(5));
        LlmExtractor::new(config).expect("client")
    }

    #[test]
    fn config_validates_url_and_model() {
        assert!(ExtractorConfig::new("localhost:11434", "llama3").is_err());
        assert!(ExtractorConfig::new("http://localhost:11434/v1", " ").is_err());
        let config = ExtractorConfig::new("http://localhost:11434/v1/", "llama3").expect("config");
        assert_eq!(config.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn blank_api_key_is_ignored() {
        let config = ExtractorConfig::new("http://localhost:11434/v1", "llama3")
            .expect("config")
            .with_api_key(Some("  ".into()));
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn parses_first_choice_content() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":" Bronchitis\n"}}]}"#;
        assert_eq!(parse_completion(body).expect("parse"), "Bronchitis");
    }

    #[test]
    fn empty_or_malformed_responses_are_errors() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(ExtractorError::EmptyResponse)
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":"  "}}]}"#),
            Err(ExtractorError::EmptyResponse)
        ));
        assert!(matches!(
            parse_completion("not json"),
            Err(ExtractorError::ResponseParse(_))
        ));
    }

    #[test]
    fn extracts_label_from_live_endpoint() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"\"Bronchitis\""}}]}"#,
        );

        let extraction = extractor(&url).extract("patient has persistent cough");
        assert_eq!(extraction, Extraction::Diagnosis("Bronchitis".into()));

        let request: serde_json::Value =
            serde_json::from_str(&server.join().expect("server thread")).expect("request json");
        assert_eq!(request["model"], "llama3");
        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][1]["content"], "patient has persistent cough");
    }

    #[test]
    fn not_found_reply_maps_to_not_found() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"No Diagnosis Found"}}]}"#,
        );
        assert_eq!(extractor(&url).extract("routine check-up"), Extraction::NotFound);
        server.join().expect("server thread");
        assert!(EXTRACTION_SYSTEM_PROMPT.ends_with(emr_core::constants::NO_DIAGNOSIS_FOUND));
    }

    #[test]
    fn server_errors_map_to_failed() {
        let (url, server) =
            serve_once("500 Internal Server Error", r#"{"error":"model not loaded"}"#);
        let extraction = extractor(&url).extract("persistent cough");
        server.join().expect("server thread");
        match extraction {
            Extraction::Failed(reason) => assert!(reason.contains("500")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn connection_refused_maps_to_failed() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let extraction = extractor(&format!("http://127.0.0.1:{port}/v1")).extract("cough");
        assert!(matches!(extraction, Extraction::Failed(_)));
    }
}
