use async_trait::async_trait;
use reqwest::{Request, Response};

/// Transport used for every feed request; lets callers wrap or replace the
/// underlying `reqwest` client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
