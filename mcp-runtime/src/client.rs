use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

use dooray_core::envelope::{self, ApiResponse, Page};
use dooray_core::error::DoorayError;

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Bearer token plus base endpoint, resolved once at startup and read-only
/// for the rest of the process lifetime.
#[derive(Clone, Debug)]
pub struct Credential {
    pub token: String,
    pub base_url: String,
}

/// Authenticated client for the Dooray REST API.
///
/// Redirect-following is disabled on the underlying client: the drive
/// endpoints answer 307 pointing at the storage tier, and the second leg
/// must replay method, body, and auth header unchanged, while an initial
/// 2xx means no second leg at all. Both rules are business logic here, not
/// generic HTTP semantics.
pub struct DoorayClient {
    http: reqwest::Client,
    credential: Credential,
}

/// Authoritative response of a raw-media download, headers uninterpreted.
/// Filename extraction from `content_disposition` is the caller's concern.
#[derive(Debug)]
pub struct FileDownload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
}

impl DoorayClient {
    pub fn new(credential: Credential) -> Result<Self, DoorayError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DoorayError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, credential })
    }

    pub fn base_url(&self) -> &str {
        &self.credential.base_url
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, DoorayError> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, DoorayError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, DoorayError> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, DoorayError> {
        self.request(Method::PATCH, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, DoorayError> {
        self.request(Method::DELETE, path, &[], None).await
    }

    /// Same as [`DoorayClient::get`] but keeps the wire `totalCount` next to
    /// the unwrapped list.
    pub async fn get_paginated(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Page, DoorayError> {
        let response = self.send(Method::GET, path, query, None).await?;
        envelope::unwrap_paginated(response)
    }

    /// Issues one authenticated JSON request and unwraps the envelope.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, DoorayError> {
        let response = self.send(method, path, query, body).await?;
        envelope::unwrap(response)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, DoorayError> {
        let url = self.endpoint(path, query)?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(AUTHORIZATION, self.auth_header())
            .timeout(CALL_TIMEOUT);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_send_error)?;
        tracing::debug!(method = %method, path, status = response.status().as_u16(), "dooray api call");
        Self::parse_envelope(response).await
    }

    /// Two-step raw-media download (`GET`): an initial request with
    /// redirects disabled, then at most one replay against the 307
    /// `Location`. An initial 2xx is already authoritative.
    pub async fn download_file(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<FileDownload, DoorayError> {
        let url = self.endpoint(path, query)?;
        let initial = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.auth_header())
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await
            .map_err(map_send_error)?;

        let response = match transfer_redirect_target(&initial)? {
            None => initial,
            Some(location) => self
                .http
                .get(location)
                .header(AUTHORIZATION, self.auth_header())
                .timeout(TRANSFER_TIMEOUT)
                .send()
                .await
                .map_err(map_send_error)?,
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(DoorayError::Authentication);
        }
        if !status.is_success() {
            return Err(DoorayError::remote_status(
                status.as_u16(),
                "unexpected status",
                None,
            ));
        }

        let content_type = header_string(&response, CONTENT_TYPE.as_str());
        let content_disposition = header_string(&response, CONTENT_DISPOSITION.as_str());
        let content_length =
            header_string(&response, CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok());
        let bytes = response.bytes().await.map_err(|e| {
            DoorayError::transport(format!("failed to read download body: {e}"))
        })?;

        Ok(FileDownload {
            bytes: bytes.to_vec(),
            content_type,
            content_disposition,
            content_length,
        })
    }

    /// Two-step multipart upload (`POST`). The file bytes are kept for the
    /// duration of the call so the 307 leg can replay an identical body.
    pub async fn upload_file(
        &self,
        path: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<Value, DoorayError> {
        let url = self.endpoint(path, &[])?;
        let initial = self.send_upload_leg(url, &bytes, filename).await?;

        let response = match transfer_redirect_target(&initial)? {
            None => initial,
            Some(location) => self.send_upload_leg(location, &bytes, filename).await?,
        };

        let parsed = Self::parse_envelope(response).await?;
        envelope::unwrap(parsed)
    }

    async fn send_upload_leg(
        &self,
        url: Url,
        bytes: &[u8],
        filename: &str,
    ) -> Result<reqwest::Response, DoorayError> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.http
            .post(url)
            .header(AUTHORIZATION, self.auth_header())
            .timeout(TRANSFER_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)
    }

    async fn parse_envelope(response: reqwest::Response) -> Result<ApiResponse, DoorayError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(DoorayError::Authentication);
        }
        let bytes = response.bytes().await.map_err(|e| {
            DoorayError::transport(format!("failed to read API response body: {e}"))
        })?;

        if !status.is_success() {
            let raw_body: Option<Value> = serde_json::from_slice(&bytes).ok();
            let message = raw_body
                .as_ref()
                .and_then(envelope_message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(DoorayError::remote_status(status.as_u16(), message, raw_body));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| DoorayError::transport(format!("malformed API response: {e}")))
    }

    fn endpoint(&self, path: &str, query: &[(String, String)]) -> Result<Url, DoorayError> {
        let raw = format!(
            "{}{}",
            self.credential.base_url.trim_end_matches('/'),
            path
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| DoorayError::transport(format!("invalid API URL '{raw}': {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn auth_header(&self) -> String {
        format!("dooray-api {}", self.credential.token)
    }
}

/// Classifies the first leg of a transfer: `None` means the response is
/// already authoritative, `Some(url)` names the storage location to replay
/// against. Anything that is neither 2xx nor a 307-with-Location is a fault.
fn transfer_redirect_target(initial: &reqwest::Response) -> Result<Option<Url>, DoorayError> {
    let status = initial.status();
    if status.is_success() {
        return Ok(None);
    }
    if status == StatusCode::TEMPORARY_REDIRECT {
        if let Some(location) = initial
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            let target = initial.url().join(location).map_err(|e| {
                DoorayError::transport(format!("invalid redirect location '{location}': {e}"))
            })?;
            return Ok(Some(target));
        }
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(DoorayError::Authentication);
    }
    tracing::warn!(status = status.as_u16(), "transfer leg returned unexpected status");
    Err(DoorayError::remote_status(
        status.as_u16(),
        "unexpected status",
        None,
    ))
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn envelope_message(body: &Value) -> Option<String> {
    let message = body.pointer("/header/message")?.as_str()?;
    if message.trim().is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

fn map_send_error(err: reqwest::Error) -> DoorayError {
    if err.is_timeout() {
        DoorayError::transport(format!("request timed out: {err}"))
    } else {
        DoorayError::transport(format!("failed to reach Dooray API: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{http_stub, json_response, redirect_response};
    use serde_json::json;

    fn client(base_url: &str) -> DoorayClient {
        DoorayClient::new(Credential {
            token: "test-token".to_string(),
            base_url: base_url.to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn get_unwraps_the_envelope_and_sends_auth_header() {
        let body = json!({
            "header": { "success": true, "message": "" },
            "result": { "id": "42", "name": "Alice" }
        });
        let (base, stub) = http_stub(vec![json_response("200 OK", &body.to_string())]).await;

        let payload = client(&base).get("/common/v1/members/me", &[]).await.unwrap();
        assert_eq!(payload, json!({ "id": "42", "name": "Alice" }));

        let seen = stub.await.unwrap();
        assert!(seen[0].starts_with("GET /common/v1/members/me"));
        assert!(seen[0].to_ascii_lowercase().contains("authorization: dooray-api test-token"));
    }

    #[tokio::test]
    async fn envelope_failure_on_http_200_is_a_remote_error() {
        let body = json!({
            "header": { "success": false, "message": "task does not exist" },
            "result": null
        });
        let (base, stub) = http_stub(vec![json_response("200 OK", &body.to_string())]).await;

        let err = client(&base)
            .get("/project/v1/projects/1/posts/9", &[])
            .await
            .unwrap_err();
        match err {
            DoorayError::Remote { message, status_code, .. } => {
                assert_eq!(message, "task does not exist");
                assert_eq!(status_code, None);
            }
            other => panic!("expected Remote, got {other:?}"),
        }
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_maps_to_remote_with_status_and_raw_body() {
        let body = json!({
            "header": { "success": false, "message": "project not found" },
            "result": null
        });
        let (base, stub) = http_stub(vec![json_response("404 Not Found", &body.to_string())]).await;

        let err = client(&base).get("/project/v1/projects/zzz", &[]).await.unwrap_err();
        match err {
            DoorayError::Remote { message, status_code, raw_body } => {
                assert_eq!(message, "project not found");
                assert_eq!(status_code, Some(404));
                assert!(raw_body.is_some());
            }
            other => panic!("expected Remote, got {other:?}"),
        }
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn http_401_surfaces_as_authentication() {
        let (base, stub) = http_stub(vec![json_response("401 Unauthorized", "{}")]).await;

        let err = client(&base).get("/common/v1/members/me", &[]).await.unwrap_err();
        assert!(matches!(err, DoorayError::Authentication));
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn download_uses_the_first_response_when_no_redirect_occurred() {
        let response = "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Disposition: attachment; filename=\"report.pdf\"\r\nContent-Length: 9\r\nConnection: close\r\n\r\nfile-body".to_string();
        let (base, stub) = http_stub(vec![response]).await;

        let download = client(&base)
            .download_file(
                "/drive/v1/drives/d1/files/f1",
                &[("media".to_string(), "raw".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(download.bytes, b"file-body");
        assert_eq!(download.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(
            download.content_disposition.as_deref(),
            Some("attachment; filename=\"report.pdf\"")
        );
        assert_eq!(download.content_length, Some(9));

        let seen = stub.await.unwrap();
        assert_eq!(seen.len(), 1, "a 2xx first leg must not trigger a follow-up");
        assert!(seen[0].contains("media=raw"));
    }

    #[tokio::test]
    async fn download_follows_a_307_and_replays_the_method() {
        let file = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello".to_string();
        let (base, stub) =
            http_stub(vec![redirect_response("/storage/blob-1"), file]).await;

        let download = client(&base)
            .download_file("/drive/v1/drives/d1/files/f1", &[])
            .await
            .unwrap();
        assert_eq!(download.bytes, b"hello");

        let seen = stub.await.unwrap();
        assert_eq!(seen.len(), 2, "a 307 first leg must trigger exactly one follow-up");
        assert!(seen[1].starts_with("GET /storage/blob-1"));
        assert!(
            seen[1].to_ascii_lowercase().contains("authorization: dooray-api test-token"),
            "the replayed leg must carry the same auth header"
        );
    }

    #[tokio::test]
    async fn upload_follows_a_307_and_replays_method_and_body() {
        let done = json!({
            "header": { "success": true, "message": "" },
            "result": { "id": "f1" }
        });
        let (base, stub) = http_stub(vec![
            redirect_response("/storage/up-1"),
            json_response("200 OK", &done.to_string()),
        ])
        .await;

        let payload = client(&base)
            .upload_file(
                "/drive/v1/drives/d1/files",
                b"file contents".to_vec(),
                "report.txt",
            )
            .await
            .unwrap();
        assert_eq!(payload, json!({ "id": "f1" }));

        let seen = stub.await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("POST /drive/v1/drives/d1/files"));
        assert!(seen[1].starts_with("POST /storage/up-1"));
        assert!(seen[0].contains("filename=\"report.txt\""));
        assert!(
            seen[1].contains("filename=\"report.txt\"") && seen[1].contains("file contents"),
            "the storage leg must replay the identical multipart body"
        );
    }

    #[tokio::test]
    async fn upload_with_a_2xx_first_leg_skips_the_second_request() {
        let done = json!({
            "header": { "success": true, "message": "" },
            "result": { "id": "f2" }
        });
        let (base, stub) = http_stub(vec![json_response("200 OK", &done.to_string())]).await;

        let payload = client(&base)
            .upload_file("/drive/v1/drives/d1/files", b"x".to_vec(), "a.txt")
            .await
            .unwrap();
        assert_eq!(payload, json!({ "id": "f2" }));
        assert_eq!(stub.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transfer_rejects_a_non_redirect_non_2xx_status() {
        let (base, stub) = http_stub(vec![
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        ])
        .await;

        let err = client(&base)
            .download_file("/drive/v1/drives/d1/files/f1", &[])
            .await
            .unwrap_err();
        match err {
            DoorayError::Remote { message, status_code, .. } => {
                assert_eq!(message, "unexpected status");
                assert_eq!(status_code, Some(500));
            }
            other => panic!("expected Remote, got {other:?}"),
        }
        stub.await.unwrap();
    }

    #[tokio::test]
    async fn connection_failure_is_a_transport_fault() {
        // Port 9 (discard) is expected to refuse connections.
        let err = client("http://127.0.0.1:9")
            .get("/common/v1/members/me", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DoorayError::Transport { .. }));
    }
}
