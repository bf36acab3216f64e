//! GitHub REST proxy
//!
//! The front-end publishes generated sites to the user's own GitHub account.
//! The browser holds the OAuth token; this proxy forwards it as-is and never
//! stores it. GitHub's response body and status are passed through so the
//! client sees the real API result.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("stavitel/", env!("CARGO_PKG_VERSION"));

/// Thin client over the GitHub REST API
///
/// The base URL is injected so tests can point it at a local mock server.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GithubClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn list_repos(&self, token: &str) -> ApiResult<(StatusCode, Value)> {
        let response = self
            .http
            .get(format!("{}/user/repos?sort=updated&per_page=100", self.base_url))
            .bearer_auth(token)
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(upstream_error)?;
        passthrough(response).await
    }

    pub async fn create_repo(&self, token: &str, body: &Value) -> ApiResult<(StatusCode, Value)> {
        let response = self
            .http
            .post(format!("{}/user/repos", self.base_url))
            .bearer_auth(token)
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", USER_AGENT)
            .json(body)
            .send()
            .await
            .map_err(upstream_error)?;
        passthrough(response).await
    }

    pub async fn put_contents(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        path: &str,
        body: &Value,
    ) -> ApiResult<(StatusCode, Value)> {
        let response = self
            .http
            .put(format!(
                "{}/repos/{}/{}/contents/{}",
                self.base_url, owner, repo, path
            ))
            .bearer_auth(token)
            .header("Accept", GITHUB_ACCEPT)
            .header("User-Agent", USER_AGENT)
            .json(body)
            .send()
            .await
            .map_err(upstream_error)?;
        passthrough(response).await
    }
}

fn upstream_error(err: reqwest::Error) -> ApiError {
    tracing::error!(error = %err, "GitHub API request failed");
    ApiError::Internal("GitHub API request failed".to_string())
}

async fn passthrough(response: reqwest::Response) -> ApiResult<(StatusCode, Value)> {
    let status = StatusCode::from_u16(response.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap_or_else(|_| json!({}));
    Ok((status, body))
}

/// Extract the user's OAuth token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)
}

/// List the authenticated user's repositories
pub async fn list_repos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let token = bearer_token(&headers)?;
    let (status, body) = state.github.list_repos(token).await?;
    Ok((status, Json(body)))
}

#[derive(Debug, Deserialize)]
pub struct CreateRepoRequest {
    pub name: String,
    #[serde(default)]
    pub private: bool,
    pub description: Option<String>,
}

/// Create a repository under the authenticated user's account
pub async fn create_repo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRepoRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let token = bearer_token(&headers)?;
    if req.name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    let mut body = json!({
        "name": req.name,
        "private": req.private,
        "auto_init": true,
    });
    if let Some(description) = &req.description {
        body["description"] = json!(description);
    }

    let (status, body) = state.github.create_repo(token, &body).await?;
    Ok((status, Json(body)))
}

#[derive(Debug, Deserialize)]
pub struct PutContentsRequest {
    pub owner: String,
    pub repo: String,
    pub path: String,
    /// Base64-encoded file content, as GitHub expects it
    pub content: String,
    pub message: String,
    pub sha: Option<String>,
    pub branch: Option<String>,
}

/// Create or update a file in a repository
pub async fn put_contents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PutContentsRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let token = bearer_token(&headers)?;
    if req.owner.is_empty() || req.repo.is_empty() || req.path.is_empty() {
        return Err(ApiError::BadRequest(
            "owner, repo and path are required".to_string(),
        ));
    }

    let mut body = json!({
        "message": req.message,
        "content": req.content,
    });
    if let Some(sha) = &req.sha {
        body["sha"] = json!(sha);
    }
    if let Some(branch) = &req.branch {
        body["branch"] = json!(branch);
    }

    let (status, body) = state
        .github
        .put_contents(token, &req.owner, &req.repo, &req.path, &body)
        .await?;
    Ok((status, Json(body)))
}
