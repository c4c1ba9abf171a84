use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, RequestBuilder, Response};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::models::{
    AuthResponse, ChatRequest, ChatResponse, Credentials, CurrentUser, StatusFilter, Task,
    TaskDraft, TaskId, TaskPatch,
};

#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list_tasks(&self, filter: StatusFilter) -> Result<Vec<Task>, AppError>;
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, AppError>;
    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, AppError>;
    async fn toggle_task(&self, id: &TaskId) -> Result<Task, AppError>;
    async fn delete_task(&self, id: &TaskId) -> Result<(), AppError>;
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn signup(&self, credentials: &Credentials) -> Result<AuthResponse, AppError>;
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AppError>;
    async fn logout(&self) -> Result<(), AppError>;
    async fn current_user(&self) -> Result<CurrentUser, AppError>;
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, AppError>;
}

/// REST client for the to-do backend.
///
/// The session token is sent as the `access_token` cookie on every call.
pub struct HttpClient {
    client: Client,
    base_url: String,
    access_token: RwLock<Option<String>>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: RwLock::new(config.access_token.clone()),
        })
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AppError> {
        let request = match self.access_token.read().await.as_deref() {
            Some(token) => request.header(COOKIE, format!("access_token={}", token)),
            None => request,
        };

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!("request failed with {}: {}", status, body);
            return Err(AppError::from_response(status, &body));
        }

        Ok(response)
    }

    async fn store_token(&self, auth: &AuthResponse) {
        if let Some(token) = &auth.access_token {
            *self.access_token.write().await = Some(token.clone());
        }
    }
}

/// Decodes a single task body, refusing one that carries no id.
///
/// `operation` names the request in the error, e.g. "creation".
async fn decode_task(response: Response, operation: &str) -> Result<Task, AppError> {
    let value: serde_json::Value = response.json().await?;
    match value.get("id") {
        None | Some(serde_json::Value::Null) => {
            return Err(AppError::InvalidResponse(format!(
                "Task {} failed - response has no id",
                operation
            )));
        }
        Some(_) => {}
    }
    serde_json::from_value(value)
        .map_err(|e| AppError::InvalidResponse(format!("Failed to parse task: {}", e)))
}

#[async_trait]
impl TaskApi for HttpClient {
    async fn list_tasks(&self, filter: StatusFilter) -> Result<Vec<Task>, AppError> {
        let url = self.url(&format!("/tasks?status={}", filter.as_str()));
        debug!("GET {}", url);
        let response = self.send(self.client.get(&url)).await?;
        let tasks = response.json::<Vec<Task>>().await?;
        Ok(tasks)
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, AppError> {
        let url = self.url("/tasks");
        debug!("POST {}", url);
        let response = self.send(self.client.post(&url).json(draft)).await?;
        decode_task(response, "creation").await
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, AppError> {
        let url = self.url(&format!("/tasks/{}", id));
        debug!("PATCH {}", url);
        let response = self.send(self.client.patch(&url).json(patch)).await?;
        decode_task(response, "update").await
    }

    async fn toggle_task(&self, id: &TaskId) -> Result<Task, AppError> {
        let url = self.url(&format!("/tasks/{}/toggle", id));
        debug!("POST {}", url);
        let response = self.send(self.client.post(&url)).await?;
        decode_task(response, "toggle").await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), AppError> {
        let url = self.url(&format!("/tasks/{}", id));
        debug!("DELETE {}", url);
        // Body is an ack at most; nothing in it is needed.
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthApi for HttpClient {
    async fn signup(&self, credentials: &Credentials) -> Result<AuthResponse, AppError> {
        let url = self.url("/auth/signup");
        let response = self.send(self.client.post(&url).json(credentials)).await?;
        let auth = response.json::<AuthResponse>().await?;
        self.store_token(&auth).await;
        Ok(auth)
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, AppError> {
        let url = self.url("/auth/login");
        let response = self.send(self.client.post(&url).json(credentials)).await?;
        let auth = response.json::<AuthResponse>().await?;
        self.store_token(&auth).await;
        Ok(auth)
    }

    async fn logout(&self) -> Result<(), AppError> {
        let url = self.url("/auth/logout");
        self.send(self.client.post(&url)).await?;
        *self.access_token.write().await = None;
        Ok(())
    }

    async fn current_user(&self) -> Result<CurrentUser, AppError> {
        let url = self.url("/auth/me");
        let response = self.send(self.client.get(&url)).await?;
        Ok(response.json::<CurrentUser>().await?)
    }
}

#[async_trait]
impl ChatApi for HttpClient {
    async fn send_message(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let url = self.url("/chat/");
        debug!("POST {}", url);
        let response = self.send(self.client.post(&url).json(request)).await?;
        Ok(response.json::<ChatResponse>().await?)
    }
}
