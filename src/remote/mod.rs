//! Remote workspace-files client (spec.md §4.4).
//!
//! Wraps a `reqwest::Client` with metadata caching, size-based strategy
//! selection (direct vs. signed URL), and retry (via [`crate::retry`]).

mod types;

pub use types::{FileInfo, ObjectKind, SignedUrl};

use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;

use crate::config::SIGNED_URL_THRESHOLD_BYTES;
use crate::error::{WsfsError, WsfsResult};
use crate::metacache::MetadataCache;
use crate::retry::{execute_with_retry, RetryPolicy};

/// Base URL and bearer token are sourced from the standard remote-SDK
/// environment variables (spec.md §6, Environment) — this client does not
/// parse them itself beyond reading the two variables below.
const HOST_ENV: &str = "WSFS_HOST";
const TOKEN_ENV: &str = "WSFS_TOKEN";

pub struct RemoteClient {
    http: Client,
    base_url: String,
    token: String,
    meta: Arc<MetadataCache>,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct ObjectInfoResponse {
    wsfs_object_info: WsfsObjectInfo,
}

#[derive(Deserialize)]
struct WsfsObjectInfo {
    object_info: types::RawObjectInfo,
    signed_url: Option<SignedUrl>,
}

#[derive(Deserialize)]
struct ListFilesResponse {
    objects: Vec<WsfsObjectInfo>,
}

#[derive(Deserialize)]
struct NewFilesResponse {
    signed_urls: Vec<SignedUrl>,
}

impl RemoteClient {
    pub fn new(meta: Arc<MetadataCache>) -> WsfsResult<Self> {
        let base_url = std::env::var(HOST_ENV)
            .map_err(|_| WsfsError::InvalidArgument(format!("{HOST_ENV} is not set")))?;
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| WsfsError::InvalidArgument(format!("{TOKEN_ENV} is not set")))?;
        let http = Client::builder()
            .build()
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            token,
            meta,
            retry: RetryPolicy::default(),
        })
    }

    #[cfg(test)]
    fn with_base_url(base_url: String, meta: Arc<MetadataCache>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            token: "test-token".to_string(),
            meta,
            retry: RetryPolicy::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> WsfsResult<reqwest::Response> {
        let never = std::future::pending::<()>();
        execute_with_retry(&self.retry, never, || {
            let req = build().bearer_auth(&self.token);
            async move { req.send().await }
        })
        .await
        .map_err(|e| WsfsError::Remote(e.to_string()))
    }

    /// GET `object-info?path=...`. Negative-caches 404s.
    pub async fn stat(&self, path: &str) -> WsfsResult<FileInfo> {
        let (cached, present) = self.meta.get(path);
        if present {
            return cached.ok_or_else(|| WsfsError::NotFound(path.to_string()));
        }

        let url = self.url("/api/2.0/workspace-files/object-info");
        let path_owned = path.to_string();
        let response = self
            .execute(|| {
                self.http
                    .get(&url)
                    .query(&[("path", path_owned.as_str())])
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            self.meta.set(path, None);
            return Err(WsfsError::NotFound(path.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        let body: ObjectInfoResponse = response
            .json()
            .await
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        let info = FileInfo::from_raw(body.wsfs_object_info.object_info, body.wsfs_object_info.signed_url);
        self.meta.set(path, Some(info.clone()));
        Ok(info)
    }

    /// GET `list-files?path=...`, sorted by name ascending.
    pub async fn read_dir(&self, path: &str) -> WsfsResult<Vec<FileInfo>> {
        let url = self.url("/api/2.0/workspace-files/list-files");
        let path_owned = path.to_string();
        let response = self
            .execute(|| {
                self.http
                    .get(&url)
                    .query(&[("path", path_owned.as_str())])
            })
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.meta.set(path, None);
            return Err(WsfsError::NotFound(path.to_string()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        let body: ListFilesResponse = response
            .json()
            .await
            .map_err(|e| WsfsError::Remote(e.to_string()))?;

        let mut infos: Vec<FileInfo> = body
            .objects
            .into_iter()
            .map(|o| FileInfo::from_raw(o.object_info, o.signed_url))
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        for info in &infos {
            self.meta.set(&info.path, Some(info.clone()));
        }
        Ok(infos)
    }

    /// Reads the full content of `path`, choosing export vs. signed-URL
    /// download based on the stat'd size (spec.md §4.4).
    pub async fn read_all(&self, path: &str) -> WsfsResult<Bytes> {
        let info = self.stat(path).await?;
        if info.size >= SIGNED_URL_THRESHOLD_BYTES {
            if let Some(signed) = &info.signed_url {
                match self.download_signed(signed).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(_) => {
                        // Fall back to export on signed-URL failure.
                    }
                }
            }
        }
        self.export(path).await
    }

    async fn export(&self, path: &str) -> WsfsResult<Bytes> {
        #[derive(Deserialize)]
        struct ExportResponse {
            content: String,
        }
        let url = self.url("/api/2.0/workspace/export");
        let path_owned = path.to_string();
        let response = self
            .execute(|| self.http.get(&url).query(&[("path", path_owned.as_str())]))
            .await?
            .error_for_status()
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        let body: ExportResponse = response
            .json()
            .await
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(body.content)
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        Ok(Bytes::from(decoded))
    }

    async fn download_signed(&self, signed: &SignedUrl) -> WsfsResult<Bytes> {
        let url = signed.url.clone();
        let headers = signed.headers.clone();
        let response = self
            .execute(move || {
                let mut req = self.http.get(&url);
                for (k, v) in &headers {
                    req = req.header(k, v);
                }
                req
            })
            .await?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(WsfsError::Remote("signed url expired or forbidden".to_string()));
        }
        response
            .error_for_status()
            .map_err(|e| WsfsError::Remote(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| WsfsError::Remote(e.to_string()))
    }

    /// Writes the full content of `path`, choosing import vs. signed-URL
    /// upload based on payload size (spec.md §4.4). Invalidates metadata
    /// for `path` and its parent on success.
    pub async fn write(&self, path: &str, data: Bytes) -> WsfsResult<()> {
        let result = if data.len() as u64 >= SIGNED_URL_THRESHOLD_BYTES {
            match self.write_via_signed_url(path, data.clone()).await {
                Ok(()) => Ok(()),
                Err(_) => self.import_file(path, data).await,
            }
        } else {
            self.import_file(path, data).await
        };
        if result.is_ok() {
            self.meta.invalidate(path);
        }
        result
    }

    async fn import_file(&self, path: &str, data: Bytes) -> WsfsResult<()> {
        let url = self.url(&format!(
            "/api/2.0/workspace-files/import-file/{}",
            urlencode(path)
        ));
        self.execute(move || {
            self.http
                .post(&url)
                .query(&[("overwrite", "true")])
                .body(data.clone())
        })
        .await?
        .error_for_status()
        .map_err(|e| WsfsError::Remote(e.to_string()))?;
        Ok(())
    }

    async fn write_via_signed_url(&self, path: &str, data: Bytes) -> WsfsResult<()> {
        #[derive(serde::Serialize)]
        struct NewFilesRequest<'a> {
            path: &'a str,
        }
        let url = self.url("/api/2.0/workspace-files/new-files");
        let body = NewFilesRequest { path };
        let response = self
            .execute(|| self.http.post(&url).json(&body))
            .await?
            .error_for_status()
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        let parsed: NewFilesResponse = response
            .json()
            .await
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        let signed = parsed
            .signed_urls
            .first()
            .ok_or_else(|| WsfsError::Remote("no signed upload url returned".to_string()))?;

        let upload_url = signed.url.clone();
        let headers = signed.headers.clone();
        let response = self
            .execute(move || {
                let mut req = self.http.put(&upload_url).body(data.clone());
                for (k, v) in &headers {
                    req = req.header(k, v);
                }
                req
            })
            .await?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(WsfsError::Remote("signed upload url expired or forbidden".to_string()));
        }
        response
            .error_for_status()
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        Ok(())
    }

    pub async fn delete(&self, path: &str, recursive: bool) -> WsfsResult<()> {
        #[derive(serde::Serialize)]
        struct DeleteRequest<'a> {
            path: &'a str,
            recursive: bool,
        }
        let url = self.url("/api/2.0/workspace/delete");
        let body = DeleteRequest { path, recursive };
        self.run_mutation(Method::POST, &url, &body).await?;
        self.invalidate_path_and_parent(path);
        Ok(())
    }

    pub async fn mkdir(&self, path: &str) -> WsfsResult<()> {
        #[derive(serde::Serialize)]
        struct MkdirRequest<'a> {
            path: &'a str,
        }
        let url = self.url("/api/2.0/workspace/mkdirs");
        let body = MkdirRequest { path };
        self.run_mutation(Method::POST, &url, &body).await?;
        self.invalidate_path_and_parent(path);
        Ok(())
    }

    pub async fn rename(&self, source: &str, destination: &str) -> WsfsResult<()> {
        #[derive(serde::Serialize)]
        struct RenameRequest<'a> {
            source_path: &'a str,
            destination_path: &'a str,
        }
        let url = self.url("/api/2.0/workspace/rename");
        let body = RenameRequest {
            source_path: source,
            destination_path: destination,
        };
        self.run_mutation(Method::POST, &url, &body).await?;
        self.invalidate_path_and_parent(source);
        self.invalidate_path_and_parent(destination);
        Ok(())
    }

    async fn run_mutation<B: serde::Serialize>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> WsfsResult<()> {
        let json = serde_json::to_value(body).map_err(|e| WsfsError::Remote(e.to_string()))?;
        self.execute(|| self.http.request(method.clone(), url).json(&json))
            .await?
            .error_for_status()
            .map_err(|e| WsfsError::Remote(e.to_string()))?;
        Ok(())
    }

    fn invalidate_path_and_parent(&self, path: &str) {
        self.meta.invalidate(path);
        let (parent, _) = crate::pathutil::split(path);
        self.meta.invalidate(parent);
    }
}

fn urlencode(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(server: &mockito::ServerGuard) -> RemoteClient {
        let meta = Arc::new(MetadataCache::new(100, Duration::from_secs(5)));
        RemoteClient::with_base_url(server.url(), meta)
    }

    #[tokio::test]
    async fn stat_caches_hit_and_negative() {
        let mut server = mockito::Server::new_async().await;
        let c = client(&server);

        let m = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/2\.0/workspace-files/object-info".into()))
            .match_query(mockito::Matcher::UrlEncoded("path".into(), "a.txt".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"wsfs_object_info":{"object_info":{"path":"a.txt","object_type":"FILE","size":3,"modified_at":1000},"signed_url":null}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let info = c.stat("a.txt").await.unwrap();
        assert_eq!(info.size, 3);
        // Second call should be served from cache; mock `expect(1)` enforces this.
        let info2 = c.stat("a.txt").await.unwrap();
        assert_eq!(info2.size, 3);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn stat_404_is_negative_cached_as_not_found() {
        let mut server = mockito::Server::new_async().await;
        let c = client(&server);
        let _m = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/2\.0/workspace-files/object-info".into()))
            .with_status(404)
            .create_async()
            .await;
        let err = c.stat("missing.txt").await.unwrap_err();
        assert!(matches!(err, WsfsError::NotFound(_)));
    }
}
