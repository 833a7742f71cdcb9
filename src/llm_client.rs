//! Client for the upstream local model host.
//!
//! Two calls: a catalog probe (`GET /api/tags`) and a streaming generation
//! call. Both are grounded in `embedder.rs`'s `HttpEmbedder` — same
//! `reqwest::Client`, same retry shape for the catalog probe — but
//! generation forwards fragments as they arrive via `bytes_stream()` instead
//! of buffering a complete response, since the whole point of talking to a
//! streaming model host is incremental delivery.

use anyhow::{Context, Result};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;

/// One line of an Ollama-style `/api/generate` streaming response.
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

pub struct LlmClient {
    base_url: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// List model names known to the upstream host. Used only to populate a
    /// model-selection UI; failures here are not fatal to serving.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("model catalog request failed to send")?;
        if !response.status().is_success() {
            anyhow::bail!("model catalog endpoint returned status {}", response.status());
        }
        let body: serde_json::Value = response.json().await.context("invalid model catalog response")?;
        let models = body["models"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    /// Open a streaming generation call. Returns a fragment stream the
    /// caller forwards as `token` events without further buffering. The
    /// first connection error (refused connection, non-2xx before any byte)
    /// is the caller's signal to raise `llm_unavailable`; a break mid-stream
    /// after tokens have already been yielded is `generation_stream_broken`.
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        temperature: f64,
    ) -> Result<impl Stream<Item = Result<String>>> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": model,
                "prompt": prompt,
                "stream": true,
                "options": { "temperature": temperature },
            }))
            .send()
            .await
            .context("generation request failed to send")?;

        if !response.status().is_success() {
            anyhow::bail!("generation endpoint returned status {}", response.status());
        }

        // Unfold the raw byte stream into complete NDJSON lines, parse each
        // into a fragment, and stop reading further bytes once upstream
        // reports `done` or the connection ends. State: (byte stream, line
        // buffer, pending parsed lines, finished flag).
        let state = (Box::pin(response.bytes_stream()), Vec::<u8>::new(), Vec::<Vec<u8>>::new(), false);

        let token_stream = stream::unfold(state, |mut st| async move {
            loop {
                let (bytes, buffer, pending, finished) = &mut st;
                if let Some(line) = pending.pop() {
                    match serde_json::from_slice::<GenerateChunk>(&line) {
                        Ok(parsed) => {
                            if parsed.done {
                                *finished = true;
                            }
                            if !parsed.response.is_empty() {
                                return Some((Ok(parsed.response), st));
                            }
                            continue;
                        }
                        Err(err) => {
                            *finished = true;
                            return Some((Err(anyhow::anyhow!("malformed generation chunk: {err}")), st));
                        }
                    }
                }
                if *finished {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        let mut lines = Vec::new();
                        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            let line = line[..line.len() - 1].to_vec();
                            if !line.is_empty() {
                                lines.push(line);
                            }
                        }
                        lines.reverse();
                        *pending = lines;
                    }
                    Some(Err(err)) => {
                        *finished = true;
                        return Some((Err(anyhow::anyhow!("generation stream broken: {err}")), st));
                    }
                    None => {
                        // Upstream closed the connection. A final fragment
                        // with no trailing newline is still sitting in
                        // `buffer` — flush it as one last line instead of
                        // silently dropping it.
                        if !buffer.is_empty() {
                            *pending = vec![std::mem::take(buffer)];
                        }
                        *finished = true;
                        continue;
                    }
                }
            }
        });

        Ok(token_stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_chunk_defaults_on_missing_fields() {
        let chunk: GenerateChunk = serde_json::from_str("{}").unwrap();
        assert_eq!(chunk.response, "");
        assert!(!chunk.done);
    }

    #[test]
    fn generate_chunk_parses_response_and_done() {
        let chunk: GenerateChunk = serde_json::from_str(r#"{"response":"hi","done":true}"#).unwrap();
        assert_eq!(chunk.response, "hi");
        assert!(chunk.done);
    }

    /// The upstream host can close its connection right after writing the
    /// last NDJSON line with no trailing `\n`. That fragment must still reach
    /// the caller instead of being dropped along with the now-empty buffer.
    #[tokio::test]
    async fn generate_stream_flushes_final_fragment_without_trailing_newline() {
        use axum::routing::post;
        use axum::Router;

        async fn handler() -> axum::body::Body {
            // No trailing newline after the final line, on purpose.
            axum::body::Body::from("{\"response\":\"hello\",\"done\":false}\n{\"response\":\" world\",\"done\":true}")
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/api/generate", post(handler));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = LlmClient::new(format!("http://{addr}"));
        let mut stream = client.generate_stream("test-model", "prompt", 0.1).await.unwrap();

        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "hello world");
    }
}
