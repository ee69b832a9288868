//! GitHub API client.
//!
//! Thin transport over the GraphQL v4 API for reads and a mix of GraphQL
//! mutations and REST v3 endpoints for writes. Pagination and transient
//! retries are handled here; callers see typed results and the error
//! taxonomy in [`crate::error::AppError`].

use crate::error::AppError;
use crate::models::PrState;
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GithubClientConfig {
    /// REST/GraphQL API root.
    pub api_base: String,

    /// Bearer token.
    pub token: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Attempts per request for transient failures.
    pub max_attempts: u32,
}

impl Default for GithubClientConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: String::new(),
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

/// Login GitHub substitutes for deleted accounts.
const GHOST_LOGIN: &str = "ghost";

/// Page size for PR listings.
const PR_PAGE_SIZE: i64 = 50;

/// Rate budget learned from response headers.
#[derive(Debug, Default)]
struct RateState {
    remaining: Option<i64>,
    reset_at: Option<DateTime<Utc>>,
}

/// One page of a PR listing, newest-activity first.
#[derive(Debug, Clone)]
pub struct PrPage {
    pub nodes: Vec<PrSummary>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// PR listing row.
#[derive(Debug, Clone)]
pub struct PrSummary {
    pub node_id: String,
    pub number: i64,
    pub title: String,
    pub state: PrState,
    pub draft: bool,
    pub author: String,
    pub branch: String,
    pub labels: Vec<String>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
}

/// A submitted review.
#[derive(Debug, Clone)]
pub struct ReviewData {
    pub id: String,
    pub database_id: Option<i64>,
    /// Normalised to lowercase (approved, changes_requested, ...).
    pub state: String,
    pub body: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
}

/// A review thread with its comments and resolution state.
#[derive(Debug, Clone)]
pub struct ReviewThreadData {
    pub thread_id: String,
    pub is_resolved: bool,
    pub comments: Vec<ReviewCommentData>,
}

/// One inline review comment.
#[derive(Debug, Clone)]
pub struct ReviewCommentData {
    pub id: String,
    pub database_id: Option<i64>,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub file: Option<String>,
    pub line: Option<i64>,
    pub url: Option<String>,
}

/// One conversation-tab comment.
#[derive(Debug, Clone)]
pub struct IssueCommentData {
    pub id: String,
    pub database_id: Option<i64>,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
    pub thumbs_up_by: Vec<String>,
}

/// One commit on the PR branch.
#[derive(Debug, Clone)]
pub struct CommitData {
    pub id: String,
    pub oid: String,
    pub message: String,
    pub author: String,
    pub committed_at: DateTime<Utc>,
}

/// One CI check run or legacy status context on the head commit.
#[derive(Debug, Clone)]
pub struct CheckData {
    pub id: String,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
}

/// Everything the sync engine needs for one PR.
#[derive(Debug, Clone)]
pub struct PrDetail {
    pub pr: PrSummary,
    pub reviews: Vec<ReviewData>,
    pub threads: Vec<ReviewThreadData>,
    pub issue_comments: Vec<IssueCommentData>,
    pub commits: Vec<CommitData>,
    pub checks: Vec<CheckData>,
}

/// Result of a comment-producing mutation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedComment {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Review event for `add_review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewEvent {
    fn graphql_value(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::RequestChanges => "REQUEST_CHANGES",
            Self::Comment => "COMMENT",
        }
    }

    /// Parse the CLI spelling (`approve`, `request-changes`, `comment`).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Self::Approve),
            "request-changes" => Some(Self::RequestChanges),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }
}

/// Split `owner/name`.
pub fn split_repo(repo: &str) -> Result<(&str, &str), AppError> {
    let mut parts = repo.splitn(2, '/');
    match (parts.next(), parts.next()) {
        (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(AppError::validation_field(
            format!("invalid repo slug '{}': expected owner/name", repo),
            "repo",
        )),
    }
}

/// GitHub API client. Stateless apart from the bearer token and the rate
/// budget learned from response headers.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    config: Arc<GithubClientConfig>,
    rate: Arc<Mutex<RateState>>,
}

impl GithubClient {
    /// Create a new client.
    pub fn new(config: GithubClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| AppError::auth("invalid token format"))?;
        headers.insert(header::AUTHORIZATION, token_value);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("firewatch"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
            rate: Arc::new(Mutex::new(RateState::default())),
        })
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Fail fast when the learned rate budget is exhausted.
    fn check_rate_budget(&self) -> Result<(), AppError> {
        let rate = self.rate.lock().expect("rate lock poisoned");
        if let (Some(0), Some(reset_at)) = (rate.remaining, rate.reset_at) {
            if Utc::now() < reset_at {
                return Err(AppError::rate_limit(Some(reset_at)));
            }
        }
        Ok(())
    }

    fn record_rate_headers(&self, response: &Response) {
        let headers = response.headers();
        let get_i64 = |name: &str| -> Option<i64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
        };

        let mut rate = self.rate.lock().expect("rate lock poisoned");
        if let Some(remaining) = get_i64("x-ratelimit-remaining") {
            rate.remaining = Some(remaining);
        }
        if let Some(reset) = get_i64("x-ratelimit-reset") {
            rate.reset_at = Utc.timestamp_opt(reset, 0).single();
        }
    }

    fn rate_reset(&self) -> Option<DateTime<Utc>> {
        self.rate.lock().expect("rate lock poisoned").reset_at
    }

    /// Send a request, retrying transient failures with backoff + jitter.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<Response, AppError> {
        let mut attempt = 1u32;
        loop {
            self.check_rate_budget()?;

            let cloned = request
                .try_clone()
                .ok_or_else(|| AppError::internal("request body is not replayable"))?;

            match cloned.send().await {
                Ok(response) => {
                    self.record_rate_headers(&response);
                    if response.status().is_server_error() && attempt < self.config.max_attempts {
                        log::debug!(
                            "{} returned {}, retrying (attempt {})",
                            endpoint,
                            response.status(),
                            attempt
                        );
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    let app: AppError = err.into();
                    if app.is_transient() && attempt < self.config.max_attempts {
                        log::debug!("{} failed ({}), retrying (attempt {})", endpoint, app, attempt);
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(app);
                }
            }
        }
    }

    /// Map a REST response to the error taxonomy and decode the body.
    async fn handle_rest<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("failed to parse response: {}", e)));
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.rest_error(status, endpoint, &body))
    }

    /// Map a REST response where the body is irrelevant.
    async fn handle_rest_unit(&self, response: Response, endpoint: &str) -> Result<(), AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.rest_error(status, endpoint, &body))
    }

    fn rest_error(&self, status: StatusCode, endpoint: &str, body: &str) -> AppError {
        match status {
            StatusCode::UNAUTHORIZED => {
                AppError::auth("GitHub rejected the token (401); re-authenticate")
            }
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                let exhausted = {
                    let rate = self.rate.lock().expect("rate lock poisoned");
                    rate.remaining == Some(0)
                };
                if exhausted || body.contains("rate limit") {
                    AppError::rate_limit(self.rate_reset())
                } else {
                    AppError::api_full("access denied", status.as_u16(), endpoint)
                }
            }
            StatusCode::NOT_FOUND => AppError::not_found(endpoint),
            StatusCode::CONFLICT => AppError::conflict(truncate(body, 200)),
            StatusCode::UNPROCESSABLE_ENTITY if body.contains("already") => {
                AppError::conflict(truncate(body, 200))
            }
            _ => AppError::api_full(truncate(body, 200), status.as_u16(), endpoint),
        }
    }

    async fn rest<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, AppError> {
        let url = self.rest_url(path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = self.execute(request, path).await?;
        self.handle_rest(response, path).await
    }

    async fn rest_unit(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        let url = self.rest_url(path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = self.execute(request, path).await?;
        self.handle_rest_unit(response, path).await
    }

    /// Run a GraphQL query or mutation.
    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, AppError> {
        let url = self.rest_url("/graphql");
        let request = self
            .client
            .post(&url)
            .json(&json!({ "query": query, "variables": variables }));
        let response = self.execute(request, "/graphql").await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.rest_error(status, "/graphql", &body));
        }

        let envelope: wire::GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("failed to parse GraphQL response: {}", e)))?;

        if let Some(errors) = envelope.errors {
            if let Some(first) = errors.first() {
                return Err(self.graphql_error(first));
            }
        }
        envelope
            .data
            .ok_or_else(|| AppError::api("GraphQL response carried no data"))
    }

    fn graphql_error(&self, error: &wire::GraphQlError) -> AppError {
        match error.kind.as_deref() {
            Some("NOT_FOUND") => AppError::not_found(error.message.clone()),
            Some("RATE_LIMITED") => AppError::rate_limit(self.rate_reset()),
            Some("FORBIDDEN") => AppError::api_full(error.message.clone(), 403, "/graphql"),
            _ if error.message.contains("already reacted") => {
                AppError::conflict(error.message.clone())
            }
            _ => AppError::api(error.message.clone()),
        }
    }

    // === Reads ===

    /// One page of PRs in the given states, newest-activity first. The
    /// caller drives the page loop via the returned cursor.
    pub async fn list_pull_requests(
        &self,
        repo: &str,
        states: &[PrState],
        cursor: Option<&str>,
    ) -> Result<PrPage, AppError> {
        let (owner, name) = split_repo(repo)?;
        let gql_states: Vec<&str> = states
            .iter()
            .map(|s| match s {
                // Draft is a flag on OPEN in the GitHub schema
                PrState::Open | PrState::Draft => "OPEN",
                PrState::Closed => "CLOSED",
                PrState::Merged => "MERGED",
            })
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        const QUERY: &str = r#"
            query($owner: String!, $name: String!, $states: [PullRequestState!], $first: Int!, $after: String) {
              repository(owner: $owner, name: $name) {
                pullRequests(states: $states, first: $first, after: $after,
                             orderBy: { field: UPDATED_AT, direction: DESC }) {
                  pageInfo { endCursor hasNextPage }
                  nodes {
                    id
                    number
                    title
                    state
                    isDraft
                    updatedAt
                    url
                    headRefName
                    author { login }
                    labels(first: 20) { nodes { name } }
                  }
                }
              }
            }
        "#;

        let data: wire::RepositoryPrs = self
            .graphql(
                QUERY,
                json!({
                    "owner": owner,
                    "name": name,
                    "states": gql_states,
                    "first": PR_PAGE_SIZE,
                    "after": cursor,
                }),
            )
            .await?;

        let connection = data
            .repository
            .ok_or_else(|| AppError::not_found_with_id("repository", repo))?
            .pull_requests;

        let nodes = connection
            .nodes
            .into_iter()
            .map(wire::PrNode::into_summary)
            .collect();

        Ok(PrPage {
            nodes,
            end_cursor: connection.page_info.end_cursor,
            has_next_page: connection.page_info.has_next_page,
        })
    }

    /// Full child collections for one PR.
    pub async fn fetch_pr_detail(&self, repo: &str, number: i64) -> Result<PrDetail, AppError> {
        let (owner, name) = split_repo(repo)?;

        const QUERY: &str = r#"
            query($owner: String!, $name: String!, $number: Int!) {
              repository(owner: $owner, name: $name) {
                pullRequest(number: $number) {
                  id
                  number
                  title
                  state
                  isDraft
                  updatedAt
                  url
                  headRefName
                  author { login }
                  labels(first: 20) { nodes { name } }
                  reviews(first: 50) {
                    pageInfo { endCursor hasNextPage }
                    nodes {
                      id
                      databaseId
                      state
                      body
                      createdAt
                      url
                      author { login }
                    }
                  }
                  reviewThreads(first: 50) {
                    pageInfo { endCursor hasNextPage }
                    nodes {
                      id
                      isResolved
                      comments(first: 50) {
                        nodes {
                          id
                          databaseId
                          body
                          createdAt
                          path
                          line
                          url
                          author { login }
                        }
                      }
                    }
                  }
                  comments(first: 100) {
                    pageInfo { endCursor hasNextPage }
                    nodes {
                      id
                      databaseId
                      body
                      createdAt
                      url
                      author { login }
                      reactions(first: 100, content: THUMBS_UP) {
                        nodes { user { login } }
                      }
                    }
                  }
                  commits(first: 100) {
                    nodes {
                      commit {
                        id
                        oid
                        message
                        committedDate
                        author { user { login } name }
                      }
                    }
                  }
                  statusCheckRollup: commits(last: 1) {
                    nodes {
                      commit {
                        statusCheckRollup {
                          contexts(first: 50) {
                            nodes {
                              __typename
                              ... on CheckRun {
                                id
                                name
                                status
                                conclusion
                                startedAt
                                detailsUrl
                              }
                              ... on StatusContext {
                                id
                                context
                                state
                                createdAt
                                targetUrl
                              }
                            }
                          }
                        }
                      }
                    }
                  }
                }
              }
            }
        "#;

        let data: wire::RepositoryPrDetail = self
            .graphql(QUERY, json!({ "owner": owner, "name": name, "number": number }))
            .await?;

        let node = data
            .repository
            .and_then(|r| r.pull_request)
            .ok_or_else(|| {
                AppError::not_found_with_id("pull request", format!("{}#{}", repo, number))
            })?;

        let mut detail = node.into_detail();

        // Follow child-collection pagination so callers never see a cursor.
        if detail.reviews_cursor.is_some() {
            self.page_reviews(repo, number, &mut detail).await?;
        }
        if detail.threads_cursor.is_some() {
            self.page_review_threads(repo, number, &mut detail).await?;
        }
        if detail.comments_cursor.is_some() {
            self.page_issue_comments(repo, number, &mut detail).await?;
        }

        Ok(detail.detail)
    }

    async fn page_reviews(
        &self,
        repo: &str,
        number: i64,
        paged: &mut wire::PagedDetail,
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        const QUERY: &str = r#"
            query($owner: String!, $name: String!, $number: Int!, $after: String) {
              repository(owner: $owner, name: $name) {
                pullRequest(number: $number) {
                  reviews(first: 50, after: $after) {
                    pageInfo { endCursor hasNextPage }
                    nodes {
                      id databaseId state body createdAt url author { login }
                    }
                  }
                }
              }
            }
        "#;
        while let Some(cursor) = paged.reviews_cursor.take() {
            let data: wire::RepositoryReviewsPage = self
                .graphql(
                    QUERY,
                    json!({ "owner": owner, "name": name, "number": number, "after": cursor }),
                )
                .await?;
            let connection = data
                .repository
                .and_then(|r| r.pull_request)
                .map(|p| p.reviews)
                .ok_or_else(|| AppError::api("review page vanished mid-pagination"))?;
            paged
                .detail
                .reviews
                .extend(connection.nodes.into_iter().map(wire::ReviewNode::into_data));
            if connection.page_info.has_next_page {
                paged.reviews_cursor = connection.page_info.end_cursor;
            }
        }
        Ok(())
    }

    async fn page_review_threads(
        &self,
        repo: &str,
        number: i64,
        paged: &mut wire::PagedDetail,
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        const QUERY: &str = r#"
            query($owner: String!, $name: String!, $number: Int!, $after: String) {
              repository(owner: $owner, name: $name) {
                pullRequest(number: $number) {
                  reviewThreads(first: 50, after: $after) {
                    pageInfo { endCursor hasNextPage }
                    nodes {
                      id
                      isResolved
                      comments(first: 50) {
                        nodes {
                          id databaseId body createdAt path line url author { login }
                        }
                      }
                    }
                  }
                }
              }
            }
        "#;
        while let Some(cursor) = paged.threads_cursor.take() {
            let data: wire::RepositoryThreadsPage = self
                .graphql(
                    QUERY,
                    json!({ "owner": owner, "name": name, "number": number, "after": cursor }),
                )
                .await?;
            let connection = data
                .repository
                .and_then(|r| r.pull_request)
                .map(|p| p.review_threads)
                .ok_or_else(|| AppError::api("thread page vanished mid-pagination"))?;
            paged
                .detail
                .threads
                .extend(connection.nodes.into_iter().map(wire::ThreadNode::into_data));
            if connection.page_info.has_next_page {
                paged.threads_cursor = connection.page_info.end_cursor;
            }
        }
        Ok(())
    }

    async fn page_issue_comments(
        &self,
        repo: &str,
        number: i64,
        paged: &mut wire::PagedDetail,
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        const QUERY: &str = r#"
            query($owner: String!, $name: String!, $number: Int!, $after: String) {
              repository(owner: $owner, name: $name) {
                pullRequest(number: $number) {
                  comments(first: 100, after: $after) {
                    pageInfo { endCursor hasNextPage }
                    nodes {
                      id databaseId body createdAt url author { login }
                      reactions(first: 100, content: THUMBS_UP) {
                        nodes { user { login } }
                      }
                    }
                  }
                }
              }
            }
        "#;
        while let Some(cursor) = paged.comments_cursor.take() {
            let data: wire::RepositoryCommentsPage = self
                .graphql(
                    QUERY,
                    json!({ "owner": owner, "name": name, "number": number, "after": cursor }),
                )
                .await?;
            let connection = data
                .repository
                .and_then(|r| r.pull_request)
                .map(|p| p.comments)
                .ok_or_else(|| AppError::api("comment page vanished mid-pagination"))?;
            paged.detail.issue_comments.extend(
                connection
                    .nodes
                    .into_iter()
                    .map(wire::IssueCommentNode::into_data),
            );
            if connection.page_info.has_next_page {
                paged.comments_cursor = connection.page_info.end_cursor;
            }
        }
        Ok(())
    }

    /// Map every review comment to its containing thread.
    pub async fn review_thread_map(
        &self,
        repo: &str,
        number: i64,
    ) -> Result<HashMap<String, String>, AppError> {
        let (owner, name) = split_repo(repo)?;
        const QUERY: &str = r#"
            query($owner: String!, $name: String!, $number: Int!, $after: String) {
              repository(owner: $owner, name: $name) {
                pullRequest(number: $number) {
                  reviewThreads(first: 100, after: $after) {
                    pageInfo { endCursor hasNextPage }
                    nodes {
                      id
                      comments(first: 100) { nodes { id } }
                    }
                  }
                }
              }
            }
        "#;

        let mut map = HashMap::new();
        let mut cursor: Option<String> = None;
        loop {
            let data: wire::RepositoryThreadIdsPage = self
                .graphql(
                    QUERY,
                    json!({ "owner": owner, "name": name, "number": number, "after": cursor }),
                )
                .await?;
            let connection = data
                .repository
                .and_then(|r| r.pull_request)
                .map(|p| p.review_threads)
                .ok_or_else(|| {
                    AppError::not_found_with_id("pull request", format!("{}#{}", repo, number))
                })?;
            for thread in connection.nodes {
                for comment in thread.comments.nodes {
                    map.insert(comment.id, thread.id.clone());
                }
            }
            if connection.page_info.has_next_page {
                cursor = connection.page_info.end_cursor;
            } else {
                break;
            }
        }
        Ok(map)
    }

    /// Node id of a PR by number.
    pub async fn pr_node_id(&self, repo: &str, number: i64) -> Result<String, AppError> {
        let (owner, name) = split_repo(repo)?;
        const QUERY: &str = r#"
            query($owner: String!, $name: String!, $number: Int!) {
              repository(owner: $owner, name: $name) {
                pullRequest(number: $number) { id }
              }
            }
        "#;
        let data: wire::RepositoryPrId = self
            .graphql(QUERY, json!({ "owner": owner, "name": name, "number": number }))
            .await?;
        data.repository
            .and_then(|r| r.pull_request)
            .map(|p| p.id)
            .ok_or_else(|| {
                AppError::not_found_with_id("pull request", format!("{}#{}", repo, number))
            })
    }

    // === Writes ===

    /// Submit a review on a PR.
    pub async fn add_review(
        &self,
        repo: &str,
        number: i64,
        event: ReviewEvent,
        body: Option<&str>,
    ) -> Result<CreatedComment, AppError> {
        let pr_id = self.pr_node_id(repo, number).await?;
        const MUTATION: &str = r#"
            mutation($input: AddPullRequestReviewInput!) {
              addPullRequestReview(input: $input) {
                pullRequestReview { id url }
              }
            }
        "#;
        let data: wire::AddReviewData = self
            .graphql(
                MUTATION,
                json!({ "input": {
                    "pullRequestId": pr_id,
                    "event": event.graphql_value(),
                    "body": body,
                }}),
            )
            .await?;
        let review = data
            .add_pull_request_review
            .and_then(|r| r.pull_request_review)
            .ok_or_else(|| AppError::api("review mutation returned no review"))?;
        Ok(CreatedComment {
            id: review.id,
            url: review.url,
        })
    }

    /// Post a conversation-tab comment.
    pub async fn add_issue_comment(
        &self,
        pr_node_id: &str,
        body: &str,
    ) -> Result<CreatedComment, AppError> {
        const MUTATION: &str = r#"
            mutation($input: AddCommentInput!) {
              addComment(input: $input) {
                commentEdge { node { id url } }
              }
            }
        "#;
        let data: wire::AddCommentData = self
            .graphql(
                MUTATION,
                json!({ "input": { "subjectId": pr_node_id, "body": body } }),
            )
            .await?;
        let node = data
            .add_comment
            .and_then(|c| c.comment_edge)
            .map(|e| e.node)
            .ok_or_else(|| AppError::api("comment mutation returned no comment"))?;
        Ok(CreatedComment {
            id: node.id,
            url: node.url,
        })
    }

    /// Reply inside a review thread.
    pub async fn add_review_thread_reply(
        &self,
        thread_id: &str,
        body: &str,
    ) -> Result<CreatedComment, AppError> {
        const MUTATION: &str = r#"
            mutation($input: AddPullRequestReviewThreadReplyInput!) {
              addPullRequestReviewThreadReply(input: $input) {
                comment { id url }
              }
            }
        "#;
        let data: wire::AddThreadReplyData = self
            .graphql(
                MUTATION,
                json!({ "input": {
                    "pullRequestReviewThreadId": thread_id,
                    "body": body,
                }}),
            )
            .await?;
        let comment = data
            .add_pull_request_review_thread_reply
            .and_then(|r| r.comment)
            .ok_or_else(|| AppError::api("thread reply mutation returned no comment"))?;
        Ok(CreatedComment {
            id: comment.id,
            url: comment.url,
        })
    }

    /// Resolve a review thread.
    pub async fn resolve_review_thread(&self, thread_id: &str) -> Result<(), AppError> {
        const MUTATION: &str = r#"
            mutation($input: ResolveReviewThreadInput!) {
              resolveReviewThread(input: $input) {
                thread { id isResolved }
              }
            }
        "#;
        let _: serde_json::Value = self
            .graphql(MUTATION, json!({ "input": { "threadId": thread_id } }))
            .await?;
        Ok(())
    }

    /// Add a thumbs-up reaction. Returns whether the reaction was newly
    /// added; reacting twice is success.
    pub async fn add_reaction(&self, comment_node_id: &str) -> Result<bool, AppError> {
        const MUTATION: &str = r#"
            mutation($input: AddReactionInput!) {
              addReaction(input: $input) {
                reaction { id }
              }
            }
        "#;
        let result: Result<serde_json::Value, AppError> = self
            .graphql(
                MUTATION,
                json!({ "input": { "subjectId": comment_node_id, "content": "THUMBS_UP" } }),
            )
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(AppError::Conflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Add labels to a PR.
    pub async fn add_labels(
        &self,
        repo: &str,
        number: i64,
        labels: &[String],
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/issues/{}/labels", owner, name, number);
        let _: serde_json::Value = self
            .rest(Method::POST, &path, Some(json!({ "labels": labels })))
            .await?;
        Ok(())
    }

    /// Remove one label from a PR.
    pub async fn remove_labels(
        &self,
        repo: &str,
        number: i64,
        labels: &[String],
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        for label in labels {
            let path = format!(
                "/repos/{}/{}/issues/{}/labels/{}",
                owner, name, number, label
            );
            match self.rest_unit(Method::DELETE, &path, None).await {
                Ok(()) => {}
                // Removing an absent label is a no-op, not a failure
                Err(AppError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Request reviews from users.
    pub async fn request_reviewers(
        &self,
        repo: &str,
        number: i64,
        reviewers: &[String],
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/pulls/{}/requested_reviewers", owner, name, number);
        let _: serde_json::Value = self
            .rest(Method::POST, &path, Some(json!({ "reviewers": reviewers })))
            .await?;
        Ok(())
    }

    /// Withdraw review requests.
    pub async fn remove_reviewers(
        &self,
        repo: &str,
        number: i64,
        reviewers: &[String],
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/pulls/{}/requested_reviewers", owner, name, number);
        self.rest_unit(Method::DELETE, &path, Some(json!({ "reviewers": reviewers })))
            .await
    }

    /// Add assignees.
    pub async fn add_assignees(
        &self,
        repo: &str,
        number: i64,
        assignees: &[String],
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/issues/{}/assignees", owner, name, number);
        let _: serde_json::Value = self
            .rest(Method::POST, &path, Some(json!({ "assignees": assignees })))
            .await?;
        Ok(())
    }

    /// Remove assignees.
    pub async fn remove_assignees(
        &self,
        repo: &str,
        number: i64,
        assignees: &[String],
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/issues/{}/assignees", owner, name, number);
        self.rest_unit(Method::DELETE, &path, Some(json!({ "assignees": assignees })))
            .await
    }

    /// Set the milestone by number.
    pub async fn set_milestone(
        &self,
        repo: &str,
        number: i64,
        milestone: i64,
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/issues/{}", owner, name, number);
        let _: serde_json::Value = self
            .rest(Method::PATCH, &path, Some(json!({ "milestone": milestone })))
            .await?;
        Ok(())
    }

    /// Clear the milestone.
    pub async fn clear_milestone(&self, repo: &str, number: i64) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/issues/{}", owner, name, number);
        let _: serde_json::Value = self
            .rest(
                Method::PATCH,
                &path,
                Some(json!({ "milestone": serde_json::Value::Null })),
            )
            .await?;
        Ok(())
    }

    /// Edit title/body/base of a PR.
    pub async fn edit_pull_request(
        &self,
        repo: &str,
        number: i64,
        title: Option<&str>,
        body: Option<&str>,
        base: Option<&str>,
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/pulls/{}", owner, name, number);

        let mut patch = serde_json::Map::new();
        if let Some(title) = title {
            patch.insert("title".into(), json!(title));
        }
        if let Some(body) = body {
            patch.insert("body".into(), json!(body));
        }
        if let Some(base) = base {
            patch.insert("base".into(), json!(base));
        }
        if patch.is_empty() {
            return Err(AppError::validation("nothing to edit"));
        }

        let _: serde_json::Value = self
            .rest(Method::PATCH, &path, Some(serde_json::Value::Object(patch)))
            .await?;
        Ok(())
    }

    /// Convert a PR to draft.
    pub async fn convert_to_draft(&self, pr_node_id: &str) -> Result<(), AppError> {
        const MUTATION: &str = r#"
            mutation($input: ConvertPullRequestToDraftInput!) {
              convertPullRequestToDraft(input: $input) {
                pullRequest { id isDraft }
              }
            }
        "#;
        let _: serde_json::Value = self
            .graphql(MUTATION, json!({ "input": { "pullRequestId": pr_node_id } }))
            .await?;
        Ok(())
    }

    /// Mark a draft PR ready for review.
    pub async fn mark_ready(&self, pr_node_id: &str) -> Result<(), AppError> {
        const MUTATION: &str = r#"
            mutation($input: MarkPullRequestReadyForReviewInput!) {
              markPullRequestReadyForReview(input: $input) {
                pullRequest { id isDraft }
              }
            }
        "#;
        let _: serde_json::Value = self
            .graphql(MUTATION, json!({ "input": { "pullRequestId": pr_node_id } }))
            .await?;
        Ok(())
    }

    /// Close a PR.
    pub async fn close_pull_request(&self, pr_node_id: &str) -> Result<(), AppError> {
        const MUTATION: &str = r#"
            mutation($input: ClosePullRequestInput!) {
              closePullRequest(input: $input) {
                pullRequest { id state }
              }
            }
        "#;
        let _: serde_json::Value = self
            .graphql(MUTATION, json!({ "input": { "pullRequestId": pr_node_id } }))
            .await?;
        Ok(())
    }

    /// Edit an issue comment by REST id.
    pub async fn edit_issue_comment(
        &self,
        repo: &str,
        rest_id: i64,
        body: &str,
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/issues/comments/{}", owner, name, rest_id);
        let _: serde_json::Value = self
            .rest(Method::PATCH, &path, Some(json!({ "body": body })))
            .await?;
        Ok(())
    }

    /// Delete an issue comment by REST id.
    pub async fn delete_issue_comment(&self, repo: &str, rest_id: i64) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/issues/comments/{}", owner, name, rest_id);
        self.rest_unit(Method::DELETE, &path, None).await
    }

    /// Edit a review comment by REST id.
    pub async fn edit_review_comment(
        &self,
        repo: &str,
        rest_id: i64,
        body: &str,
    ) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/pulls/comments/{}", owner, name, rest_id);
        let _: serde_json::Value = self
            .rest(Method::PATCH, &path, Some(json!({ "body": body })))
            .await?;
        Ok(())
    }

    /// Delete a review comment by REST id.
    pub async fn delete_review_comment(&self, repo: &str, rest_id: i64) -> Result<(), AppError> {
        let (owner, name) = split_repo(repo)?;
        let path = format!("/repos/{}/{}/pulls/comments/{}", owner, name, rest_id);
        self.rest_unit(Method::DELETE, &path, None).await
    }
}

/// Exponential backoff with jitter: 500ms, 1s, 2s ... plus 0-250ms.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 500u64.saturating_mul(1 << (attempt.saturating_sub(1).min(4)));
    let jitter = rand::thread_rng().gen_range(0..250);
    Duration::from_millis(base + jitter)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

/// Wire shapes of the GraphQL responses.
mod wire {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct GraphQlResponse<T> {
        pub data: Option<T>,
        pub errors: Option<Vec<GraphQlError>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct GraphQlError {
        pub message: String,
        #[serde(rename = "type")]
        pub kind: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PageInfo {
        pub end_cursor: Option<String>,
        pub has_next_page: bool,
    }

    #[derive(Debug, Deserialize)]
    pub struct Actor {
        pub login: String,
    }

    fn login(actor: &Option<Actor>) -> String {
        actor
            .as_ref()
            .map(|a| a.login.clone())
            .unwrap_or_else(|| GHOST_LOGIN.to_string())
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct NamedNode {
        pub name: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Nodes<T> {
        #[serde(default)]
        pub nodes: Vec<T>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Connection<T> {
        #[serde(rename = "pageInfo")]
        pub page_info: PageInfo,
        #[serde(default)]
        pub nodes: Vec<T>,
    }

    // --- PR listing ---

    #[derive(Debug, Deserialize)]
    pub struct RepositoryPrs {
        pub repository: Option<PrsRepository>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PrsRepository {
        pub pull_requests: Connection<PrNode>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PrNode {
        pub id: String,
        pub number: i64,
        pub title: String,
        pub state: String,
        pub is_draft: bool,
        pub updated_at: DateTime<Utc>,
        pub url: String,
        pub head_ref_name: String,
        pub author: Option<Actor>,
        pub labels: Option<Nodes<NamedNode>>,
    }

    impl PrNode {
        pub fn into_summary(self) -> PrSummary {
            let state = match self.state.as_str() {
                "OPEN" if self.is_draft => PrState::Draft,
                "OPEN" => PrState::Open,
                "MERGED" => PrState::Merged,
                _ => PrState::Closed,
            };
            PrSummary {
                state,
                draft: self.is_draft,
                author: login(&self.author),
                branch: self.head_ref_name,
                labels: self
                    .labels
                    .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
                    .unwrap_or_default(),
                node_id: self.id,
                number: self.number,
                title: self.title,
                updated_at: self.updated_at,
                url: self.url,
            }
        }
    }

    // --- PR detail ---

    #[derive(Debug, Deserialize)]
    pub struct RepositoryPrDetail {
        pub repository: Option<DetailRepository>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DetailRepository {
        pub pull_request: Option<PrDetailNode>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PrDetailNode {
        pub id: String,
        pub number: i64,
        pub title: String,
        pub state: String,
        pub is_draft: bool,
        pub updated_at: DateTime<Utc>,
        pub url: String,
        pub head_ref_name: String,
        pub author: Option<Actor>,
        pub labels: Option<Nodes<NamedNode>>,
        pub reviews: Connection<ReviewNode>,
        pub review_threads: Connection<ThreadNode>,
        pub comments: Connection<IssueCommentNode>,
        pub commits: Nodes<CommitEdge>,
        pub status_check_rollup: Option<Nodes<RollupCommitEdge>>,
    }

    /// Detail plus any unexhausted child cursors.
    pub struct PagedDetail {
        pub detail: PrDetail,
        pub reviews_cursor: Option<String>,
        pub threads_cursor: Option<String>,
        pub comments_cursor: Option<String>,
    }

    impl PrDetailNode {
        pub fn into_detail(self) -> PagedDetail {
            let state = match self.state.as_str() {
                "OPEN" if self.is_draft => PrState::Draft,
                "OPEN" => PrState::Open,
                "MERGED" => PrState::Merged,
                _ => PrState::Closed,
            };
            let pr = PrSummary {
                state,
                draft: self.is_draft,
                author: login(&self.author),
                branch: self.head_ref_name,
                labels: self
                    .labels
                    .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
                    .unwrap_or_default(),
                node_id: self.id,
                number: self.number,
                title: self.title,
                updated_at: self.updated_at,
                url: self.url,
            };

            let reviews_cursor = self
                .reviews
                .page_info
                .has_next_page
                .then(|| self.reviews.page_info.end_cursor.clone())
                .flatten();
            let threads_cursor = self
                .review_threads
                .page_info
                .has_next_page
                .then(|| self.review_threads.page_info.end_cursor.clone())
                .flatten();
            let comments_cursor = self
                .comments
                .page_info
                .has_next_page
                .then(|| self.comments.page_info.end_cursor.clone())
                .flatten();

            let checks = self
                .status_check_rollup
                .map(|nodes| {
                    nodes
                        .nodes
                        .into_iter()
                        .filter_map(|edge| edge.commit.status_check_rollup)
                        .flat_map(|rollup| rollup.contexts.nodes)
                        .map(CheckContext::into_data)
                        .collect()
                })
                .unwrap_or_default();

            PagedDetail {
                detail: PrDetail {
                    pr,
                    reviews: self
                        .reviews
                        .nodes
                        .into_iter()
                        .map(ReviewNode::into_data)
                        .collect(),
                    threads: self
                        .review_threads
                        .nodes
                        .into_iter()
                        .map(ThreadNode::into_data)
                        .collect(),
                    issue_comments: self
                        .comments
                        .nodes
                        .into_iter()
                        .map(IssueCommentNode::into_data)
                        .collect(),
                    commits: self
                        .commits
                        .nodes
                        .into_iter()
                        .map(CommitEdge::into_data)
                        .collect(),
                    checks,
                },
                reviews_cursor,
                threads_cursor,
                comments_cursor,
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ReviewNode {
        pub id: String,
        pub database_id: Option<i64>,
        pub state: String,
        pub body: Option<String>,
        pub created_at: DateTime<Utc>,
        pub url: Option<String>,
        pub author: Option<Actor>,
    }

    impl ReviewNode {
        pub fn into_data(self) -> ReviewData {
            ReviewData {
                state: self.state.to_lowercase(),
                author: login(&self.author),
                id: self.id,
                database_id: self.database_id,
                body: self.body.filter(|b| !b.is_empty()),
                created_at: self.created_at,
                url: self.url,
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadNode {
        pub id: String,
        pub is_resolved: bool,
        pub comments: Nodes<ReviewCommentNode>,
    }

    impl ThreadNode {
        pub fn into_data(self) -> ReviewThreadData {
            ReviewThreadData {
                thread_id: self.id,
                is_resolved: self.is_resolved,
                comments: self
                    .comments
                    .nodes
                    .into_iter()
                    .map(ReviewCommentNode::into_data)
                    .collect(),
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ReviewCommentNode {
        pub id: String,
        pub database_id: Option<i64>,
        pub body: String,
        pub created_at: DateTime<Utc>,
        pub path: Option<String>,
        pub line: Option<i64>,
        pub url: Option<String>,
        pub author: Option<Actor>,
    }

    impl ReviewCommentNode {
        pub fn into_data(self) -> ReviewCommentData {
            ReviewCommentData {
                author: login(&self.author),
                id: self.id,
                database_id: self.database_id,
                body: self.body,
                created_at: self.created_at,
                file: self.path,
                line: self.line,
                url: self.url,
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct IssueCommentNode {
        pub id: String,
        pub database_id: Option<i64>,
        pub body: String,
        pub created_at: DateTime<Utc>,
        pub url: Option<String>,
        pub author: Option<Actor>,
        pub reactions: Option<Nodes<ReactionNode>>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ReactionNode {
        pub user: Option<Actor>,
    }

    impl IssueCommentNode {
        pub fn into_data(self) -> IssueCommentData {
            IssueCommentData {
                author: login(&self.author),
                thumbs_up_by: self
                    .reactions
                    .map(|r| {
                        r.nodes
                            .iter()
                            .filter_map(|n| n.user.as_ref().map(|u| u.login.clone()))
                            .collect()
                    })
                    .unwrap_or_default(),
                id: self.id,
                database_id: self.database_id,
                body: self.body,
                created_at: self.created_at,
                url: self.url,
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct CommitEdge {
        pub commit: CommitNode,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CommitNode {
        pub id: String,
        pub oid: String,
        pub message: String,
        pub committed_date: DateTime<Utc>,
        pub author: Option<CommitAuthor>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct CommitAuthor {
        pub user: Option<Actor>,
        pub name: Option<String>,
    }

    impl CommitEdge {
        pub fn into_data(self) -> CommitData {
            let author = self
                .commit
                .author
                .as_ref()
                .and_then(|a| a.user.as_ref().map(|u| u.login.clone()))
                .or_else(|| self.commit.author.as_ref().and_then(|a| a.name.clone()))
                .unwrap_or_else(|| GHOST_LOGIN.to_string());
            CommitData {
                author,
                id: self.commit.id,
                oid: self.commit.oid,
                message: self.commit.message,
                committed_at: self.commit.committed_date,
            }
        }
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct RollupCommitEdge {
        pub commit: RollupCommit,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RollupCommit {
        pub status_check_rollup: Option<Rollup>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Rollup {
        pub contexts: Nodes<CheckContext>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "__typename")]
    pub enum CheckContext {
        CheckRun {
            id: String,
            name: String,
            status: String,
            conclusion: Option<String>,
            #[serde(rename = "startedAt")]
            started_at: Option<DateTime<Utc>>,
            #[serde(rename = "detailsUrl")]
            details_url: Option<String>,
        },
        StatusContext {
            id: String,
            context: String,
            state: String,
            #[serde(rename = "createdAt")]
            created_at: DateTime<Utc>,
            #[serde(rename = "targetUrl")]
            target_url: Option<String>,
        },
    }

    impl Default for CheckContext {
        fn default() -> Self {
            CheckContext::CheckRun {
                id: String::new(),
                name: String::new(),
                status: String::new(),
                conclusion: None,
                started_at: None,
                details_url: None,
            }
        }
    }

    impl CheckContext {
        pub fn into_data(self) -> CheckData {
            match self {
                Self::CheckRun {
                    id,
                    name,
                    status,
                    conclusion,
                    started_at,
                    details_url,
                } => CheckData {
                    id,
                    name,
                    status: status.to_lowercase(),
                    conclusion: conclusion.map(|c| c.to_lowercase()),
                    created_at: started_at.unwrap_or_else(Utc::now),
                    url: details_url,
                },
                Self::StatusContext {
                    id,
                    context,
                    state,
                    created_at,
                    target_url,
                } => CheckData {
                    id,
                    name: context,
                    status: "completed".to_string(),
                    conclusion: Some(state.to_lowercase()),
                    created_at,
                    url: target_url,
                },
            }
        }
    }

    // --- Child-collection pages ---

    #[derive(Debug, Deserialize)]
    pub struct RepositoryReviewsPage {
        pub repository: Option<ReviewsPageRepo>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ReviewsPageRepo {
        pub pull_request: Option<ReviewsPagePr>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReviewsPagePr {
        pub reviews: Connection<ReviewNode>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RepositoryThreadsPage {
        pub repository: Option<ThreadsPageRepo>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadsPageRepo {
        pub pull_request: Option<ThreadsPagePr>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadsPagePr {
        pub review_threads: Connection<ThreadNode>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RepositoryCommentsPage {
        pub repository: Option<CommentsPageRepo>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CommentsPageRepo {
        pub pull_request: Option<CommentsPagePr>,
    }

    #[derive(Debug, Deserialize)]
    pub struct CommentsPagePr {
        pub comments: Connection<IssueCommentNode>,
    }

    #[derive(Debug, Deserialize)]
    pub struct RepositoryThreadIdsPage {
        pub repository: Option<ThreadIdsRepo>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadIdsRepo {
        pub pull_request: Option<ThreadIdsPr>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ThreadIdsPr {
        pub review_threads: Connection<ThreadIdNode>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ThreadIdNode {
        pub id: String,
        pub comments: Nodes<IdOnly>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct IdOnly {
        pub id: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct RepositoryPrId {
        pub repository: Option<PrIdRepo>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PrIdRepo {
        pub pull_request: Option<IdOnly>,
    }

    // --- Mutations ---

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddReviewData {
        pub add_pull_request_review: Option<AddReviewPayload>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddReviewPayload {
        pub pull_request_review: Option<IdUrl>,
    }

    #[derive(Debug, Deserialize)]
    pub struct IdUrl {
        pub id: String,
        pub url: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddCommentData {
        pub add_comment: Option<AddCommentPayload>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddCommentPayload {
        pub comment_edge: Option<CommentEdge>,
    }

    #[derive(Debug, Deserialize)]
    pub struct CommentEdge {
        pub node: IdUrl,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddThreadReplyData {
        pub add_pull_request_review_thread_reply: Option<AddThreadReplyPayload>,
    }

    #[derive(Debug, Deserialize)]
    pub struct AddThreadReplyPayload {
        pub comment: Option<IdUrl>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_repo() {
        assert_eq!(split_repo("octo/widgets").unwrap(), ("octo", "widgets"));
        assert!(split_repo("octo").is_err());
        assert!(split_repo("octo/widgets/extra").is_err());
        assert!(split_repo("/widgets").is_err());
    }

    #[test]
    fn test_review_event_parse() {
        assert_eq!(ReviewEvent::parse("approve"), Some(ReviewEvent::Approve));
        assert_eq!(
            ReviewEvent::parse("request-changes"),
            Some(ReviewEvent::RequestChanges)
        );
        assert_eq!(ReviewEvent::parse("comment"), Some(ReviewEvent::Comment));
        assert_eq!(ReviewEvent::parse("LGTM"), None);
    }

    #[test]
    fn test_pr_node_state_mapping() {
        let raw = serde_json::json!({
            "id": "PR_x",
            "number": 7,
            "title": "t",
            "state": "OPEN",
            "isDraft": true,
            "updatedAt": "2025-01-02T03:00:00Z",
            "url": "https://github.com/octo/widgets/pull/7",
            "headRefName": "feature",
            "author": { "login": "alice" },
            "labels": { "nodes": [ { "name": "bug" } ] }
        });
        let node: wire::PrNode = serde_json::from_value(raw).unwrap();
        let summary = node.into_summary();
        assert_eq!(summary.state, PrState::Draft);
        assert_eq!(summary.labels, vec!["bug".to_string()]);
        assert_eq!(summary.author, "alice");
    }

    #[test]
    fn test_deleted_author_becomes_ghost() {
        let raw = serde_json::json!({
            "id": "PRR_x",
            "databaseId": 5,
            "state": "CHANGES_REQUESTED",
            "body": "",
            "createdAt": "2025-01-02T03:00:00Z",
            "url": null,
            "author": null
        });
        let node: wire::ReviewNode = serde_json::from_value(raw).unwrap();
        let review = node.into_data();
        assert_eq!(review.author, "ghost");
        assert_eq!(review.state, "changes_requested");
        assert!(review.body.is_none());
    }

    #[test]
    fn test_check_context_variants() {
        let raw = serde_json::json!({
            "__typename": "StatusContext",
            "id": "SC_x",
            "context": "ci/lint",
            "state": "SUCCESS",
            "createdAt": "2025-01-02T03:00:00Z",
            "targetUrl": null
        });
        let ctx: wire::CheckContext = serde_json::from_value(raw).unwrap();
        let check = ctx.into_data();
        assert_eq!(check.name, "ci/lint");
        assert_eq!(check.conclusion.as_deref(), Some("success"));
    }

    #[test]
    fn test_backoff_grows() {
        // Bounds only; jitter makes exact values nondeterministic.
        let first = backoff_delay(1);
        let third = backoff_delay(3);
        assert!(first >= Duration::from_millis(500));
        assert!(first < Duration::from_millis(800));
        assert!(third >= Duration::from_millis(2000));
    }
}
