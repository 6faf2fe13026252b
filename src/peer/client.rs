// Directory Client - HTTP calls from a peer to the directory server

use crate::directory::{
    CredentialsRequest, DisconnectRequest, FileQuery, FilesResponse, HeartbeatRequest,
    HeartbeatResponse, LoginResponse, MessageResponse, ShareFilesRequest,
};
use crate::registry::{FileEntry, PeerAddress};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Directory client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ClientError {
    /// Status code the directory answered with, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Thin client for the directory routes
#[derive(Clone, Debug)]
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
    ) -> Result<String, ClientError> {
        let body = CredentialsRequest::new(username, password, &address.host, address.port);
        let response: MessageResponse = self.post("register", &body).await?;
        Ok(response.message)
    }

    /// Log in and return the username confirmed by the directory
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        address: &PeerAddress,
    ) -> Result<String, ClientError> {
        let body = CredentialsRequest::new(username, password, &address.host, address.port);
        let response: LoginResponse = self.post("login", &body).await?;
        Ok(response.username)
    }

    /// Returns false when the directory no longer knows the peer
    pub async fn heartbeat(&self, username: &str, address: &PeerAddress) -> Result<bool, ClientError> {
        let body = HeartbeatRequest::new(username, &address.host, address.port);
        let response: HeartbeatResponse = self.post("heartbeat", &body).await?;
        Ok(response.known)
    }

    pub async fn disconnect(&self, username: &str) -> Result<(), ClientError> {
        let _: MessageResponse = self.post("disconnect", &DisconnectRequest::new(username)).await?;
        Ok(())
    }

    /// Replace the announced file set
    pub async fn share_files(
        &self,
        username: &str,
        filenames: Vec<String>,
        address: &PeerAddress,
    ) -> Result<(), ClientError> {
        let body = ShareFilesRequest::new(username, filenames, &address.host, address.port);
        let _: MessageResponse = self.post("share_files", &body).await?;
        Ok(())
    }

    pub async fn list_files(&self, query: &FileQuery) -> Result<Vec<FileEntry>, ClientError> {
        self.files("files", query).await
    }

    pub async fn search_files(&self, query: &FileQuery) -> Result<Vec<FileEntry>, ClientError> {
        self.files("search_files", query).await
    }

    async fn files(&self, path: &str, query: &FileQuery) -> Result<Vec<FileEntry>, ClientError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(query)
            .send()
            .await?;
        let files: FilesResponse = Self::decode(response).await?;
        Ok(files.into_entries())
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "directory request");
        let response = self.client.post(self.endpoint(path)).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let message = match response.json::<MessageResponse>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

/// Whether the directory refused because the peer row no longer exists
pub fn is_unknown_peer(err: &ClientError) -> bool {
    err.status() == Some(StatusCode::NOT_FOUND.as_u16())
}
