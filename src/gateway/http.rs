use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::TaskGateway;
use super::dto::ErrorBody;
use crate::config::ClientConfig;
use crate::error::AppError;
use crate::models::{AuthResponse, Credential, LoginRequest, NewTask, RegisterRequest, Task, TaskPatch, TaskQuery};

/// Whether a request may be re-sent after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Idempotent,
    Never,
}

pub struct HttpGateway {
    client: Client,
    config: ClientConfig,
}

impl HttpGateway {
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn task_url(&self, id: &str) -> Result<Url, AppError> {
        let mut url = self.config.endpoint("tasks")?;
        url.path_segments_mut()
            .map_err(|_| AppError::Config("task endpoint cannot carry an id".to_string()))?
            .push(id);
        Ok(url)
    }

    fn authorize(builder: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
        match credential {
            Some(credential) => builder.header("Authorization", credential.bearer_header()),
            None => builder,
        }
    }

    /// Sends the request built by `build`, re-sending idempotent requests on
    /// transport failure up to `max_retries` times.
    async fn send<F>(&self, build: F, retry: Retry) -> Result<Response, AppError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.send_counted(build, retry).await.map(|(response, _)| response)
    }

    /// Like `send`, also returning which attempt (1-based) got the response.
    async fn send_counted<F>(&self, build: F, retry: Retry) -> Result<(Response, u32), AppError>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = match retry {
            Retry::Idempotent => self.config.max_retries + 1,
            Retry::Never => 1,
        };

        let mut last_error = AppError::Network("request was never sent".to_string());
        for attempt in 1..=attempts {
            match build().send().await {
                Ok(response) => return Ok((response, attempt)),
                Err(e) => {
                    last_error = if e.is_timeout() {
                        AppError::Timeout(self.config.request_timeout)
                    } else {
                        AppError::from(e)
                    };
                    if attempt < attempts && last_error.is_transient() {
                        warn!("transport error (attempt {}/{}): {}", attempt, attempts, last_error);
                        continue;
                    }
                    break;
                }
            }
        }
        Err(last_error)
    }

    async fn check_status(response: Response) -> Result<Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!("service rejected request: {} {}", status, body);
        Err(AppError::from_status(status, ErrorBody::extract(&body)))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
        let response = Self::check_status(response).await?;
        let body_text = response.text().await?;
        serde_json::from_str(&body_text)
            .map_err(|e| AppError::Decode(format!("Failed to parse service response: {}", e)))
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, AppError> {
        let url = self.config.endpoint("auth/login")?;
        let response = self
            .send(|| self.client.post(url.clone()).json(req), Retry::Idempotent)
            .await?;
        Self::read_json(response).await
    }

    async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse, AppError> {
        let url = self.config.endpoint("auth/register")?;
        // Creates an account, so never re-sent.
        let response = self
            .send(|| self.client.post(url.clone()).json(req), Retry::Never)
            .await?;
        Self::read_json(response).await
    }

    async fn check_auth(&self, credential: &Credential) -> Result<(), AppError> {
        let url = self.config.endpoint("auth/health")?;
        let response = self
            .send(
                || Self::authorize(self.client.get(url.clone()), Some(credential)),
                Retry::Idempotent,
            )
            .await?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn list_tasks(
        &self,
        credential: Option<&Credential>,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, AppError> {
        let url = self.config.endpoint("tasks")?;
        let params = query.to_params();
        let response = self
            .send(
                || Self::authorize(self.client.get(url.clone()).query(&params), credential),
                Retry::Idempotent,
            )
            .await?;
        Self::read_json(response).await
    }

    async fn get_task(&self, credential: Option<&Credential>, id: &str) -> Result<Task, AppError> {
        let url = self.task_url(id)?;
        let response = self
            .send(
                || Self::authorize(self.client.get(url.clone()), credential),
                Retry::Idempotent,
            )
            .await?;
        Self::read_json(response).await
    }

    async fn create_task(&self, credential: Option<&Credential>, task: &NewTask) -> Result<Task, AppError> {
        let url = self.config.endpoint("tasks")?;
        let response = self
            .send(
                || Self::authorize(self.client.post(url.clone()).json(task), credential),
                Retry::Never,
            )
            .await?;
        Self::read_json(response).await
    }

    async fn update_task(
        &self,
        credential: Option<&Credential>,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, AppError> {
        let url = self.task_url(id)?;
        let response = self
            .send(
                || Self::authorize(self.client.put(url.clone()).json(patch), credential),
                Retry::Idempotent,
            )
            .await?;
        Self::read_json(response).await
    }

    async fn delete_task(&self, credential: Option<&Credential>, id: &str) -> Result<(), AppError> {
        let url = self.task_url(id)?;
        let (response, attempt) = self
            .send_counted(
                || Self::authorize(self.client.delete(url.clone()), credential),
                Retry::Idempotent,
            )
            .await?;
        match Self::check_status(response).await {
            Ok(_) => Ok(()),
            // An earlier attempt whose response was lost already removed it.
            Err(AppError::NotFound) if attempt > 1 => {
                debug!("task {} already gone on attempt {}", id, attempt);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
