use crate::engine::error::PlayError;
use crate::engine::Backend;
use crate::model::{RunConfig, RunResponse, Target};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Url};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// HTTP access to the playground backend.
pub struct PlaygroundClient {
    http: reqwest::Client,
    run_url: Url,
    format_url: Url,
    compile_url: Url,
}

impl PlaygroundClient {
    pub fn new(cfg: &RunConfig) -> Result<Self> {
        let mut base = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid base URL: {}", cfg.base_url))?;
        // Endpoints resolve below the base path, so it must end with a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut builder = reqwest::Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(timeout) = cfg.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;

        Ok(Self {
            http,
            run_url: base.join("run").context("build /run URL")?,
            format_url: base.join("format").context("build /format URL")?,
            compile_url: base.join("compile").context("build /compile URL")?,
        })
    }

    fn compile_url_for(&self, target: Target) -> Url {
        let mut url = self.compile_url.clone();
        url.query_pairs_mut()
            .append_pair("target", target.as_query_str());
        url
    }
}

/// Turn a non-success response into an application error carrying its body.
async fn application_error(resp: reqwest::Response) -> PlayError {
    let status = resp.status().as_u16();
    match resp.text().await {
        Ok(body) => PlayError::Application { status, body },
        Err(e) => PlayError::Transport(e),
    }
}

#[async_trait]
impl Backend for PlaygroundClient {
    #[tracing::instrument(skip_all, fields(bytes = source.len()))]
    async fn run(&self, source: &str) -> Result<RunResponse, PlayError> {
        let resp = self
            .http
            .post(self.run_url.clone())
            .form(&[("code", source)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(application_error(resp).await);
        }
        let body = resp.text().await?;
        let parsed: RunResponse =
            serde_json::from_str(&body).map_err(|e| PlayError::Malformed(e.to_string()))?;
        tracing::debug!(
            output_len = parsed.output.len(),
            error_len = parsed.error.len(),
            "run response"
        );
        Ok(parsed)
    }

    #[tracing::instrument(skip_all, fields(bytes = source.len()))]
    async fn format(&self, source: &str) -> Result<String, PlayError> {
        let resp = self
            .http
            .post(self.format_url.clone())
            .header(header::CONTENT_TYPE, TEXT_PLAIN)
            .body(source.to_owned())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(application_error(resp).await);
        }
        Ok(resp.text().await?)
    }

    #[tracing::instrument(skip_all, fields(bytes = source.len(), target = target.as_query_str()))]
    async fn compile(&self, source: &str, target: Target) -> Result<Bytes, PlayError> {
        let resp = self
            .http
            .post(self.compile_url_for(target))
            .header(header::CONTENT_TYPE, TEXT_PLAIN)
            .body(source.to_owned())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(application_error(resp).await);
        }
        let wasm = resp.bytes().await?;
        tracing::debug!(module_len = wasm.len(), "compile response");
        Ok(wasm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config(base_url: String) -> RunConfig {
        RunConfig {
            base_url,
            user_agent: "goplay-cli/test".into(),
            connect_timeout: None,
            max_source_bytes: crate::model::DEFAULT_MAX_SOURCE_BYTES,
            target: Target::Wasm,
        }
    }

    #[tokio::test]
    async fn run_posts_form_encoded_code() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/run")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body("code=a%0Ab");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"output":"5\n","error":""}"#);
            })
            .await;

        let client = PlaygroundClient::new(&config(server.base_url())).unwrap();
        let resp = client.run("a\nb").await.unwrap();
        assert_eq!(resp.output, "5\n");
        assert_eq!(resp.error, "");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn run_with_non_json_body_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/run");
                then.status(200).body("<html>oops</html>");
            })
            .await;

        let client = PlaygroundClient::new(&config(server.base_url())).unwrap();
        let err = client.run("x").await.unwrap_err();
        assert!(matches!(err, PlayError::Malformed(_)));
    }

    #[tokio::test]
    async fn format_error_carries_body_and_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/format")
                    .header("content-type", TEXT_PLAIN)
                    .body("package");
                then.status(400).body("unexpected token");
            })
            .await;

        let client = PlaygroundClient::new(&config(server.base_url())).unwrap();
        match client.format("package").await.unwrap_err() {
            PlayError::Application { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "unexpected token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn compile_sends_target_and_returns_bytes() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/compile")
                    .query_param("target", "wasi");
                then.status(200)
                    .header("content-type", "application/wasm")
                    .body(b"\0asm\x01\0\0\0".to_vec());
            })
            .await;

        let client = PlaygroundClient::new(&config(server.base_url())).unwrap();
        let bytes = client.compile("package main", Target::Wasi).await.unwrap();
        assert_eq!(&bytes[..4], b"\0asm");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn base_path_prefix_is_kept() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/play/format");
                then.status(200).body("package main\n");
            })
            .await;

        let client = PlaygroundClient::new(&config(server.url("/play"))).unwrap();
        assert_eq!(client.format("package main").await.unwrap(), "package main\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        // Port 9 (discard) is not expected to be listening on the loopback interface.
        let client = PlaygroundClient::new(&config("http://127.0.0.1:9".into())).unwrap();
        let err = client.run("x").await.unwrap_err();
        assert!(matches!(err, PlayError::Transport(_)));
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(PlaygroundClient::new(&config("not a url".into())).is_err());
    }
}
