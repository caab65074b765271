//! `profiles` table access through PostgREST.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::ProfileService;
use gatehouse_types::{Profile, ProfileChanges};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde_json::json;

use crate::client::SupabaseClient;
use crate::mappers::failure_from_response;

const PROFILES: &str = "/profiles";
/// Asks PostgREST for a single object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
/// PostgREST code for "zero rows where exactly one was requested".
const NO_ROWS: &str = "PGRST116";

/// [`ProfileService`] backed by the project's `profiles` table.
#[derive(Debug, Clone)]
pub struct SupabaseProfileAdapter {
    client: SupabaseClient,
}

impl SupabaseProfileAdapter {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn request(&self, method: reqwest::Method, user_id: Option<&str>) -> reqwest::RequestBuilder {
        let mut url = self.client.rest_url(PROFILES);
        if let Some(user_id) = user_id {
            url.query_pairs_mut()
                .append_pair("user_id", &format!("eq.{user_id}"));
        }
        self.client
            .http()
            .request(method, url)
            .bearer_auth(self.client.bearer_token())
            .header(ACCEPT, SINGLE_OBJECT)
    }

    async fn single(response: reqwest::Response, action: &str) -> Result<Profile> {
        if !response.status().is_success() {
            let failure = failure_from_response(response).await;
            bail!("Failed to {action} profile: {failure}");
        }
        response
            .json::<Profile>()
            .await
            .with_context(|| format!("Failed to decode {action}d profile"))
    }
}

#[async_trait]
impl ProfileService for SupabaseProfileAdapter {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let response = self
            .request(reqwest::Method::GET, Some(user_id))
            .query(&[("select", "*")])
            .send()
            .await
            .context("Failed to fetch profile")?;

        if response.status() == StatusCode::NOT_ACCEPTABLE {
            return Ok(None);
        }
        if !response.status().is_success() {
            let failure = failure_from_response(response).await;
            if failure.code.as_deref() == Some(NO_ROWS) {
                return Ok(None);
            }
            bail!("Failed to fetch profile: {failure}");
        }
        let profile = response
            .json::<Profile>()
            .await
            .context("Failed to decode profile")?;
        Ok(Some(profile))
    }

    async fn create_profile(&self, user_id: &str) -> Result<Profile> {
        let response = self
            .request(reqwest::Method::POST, None)
            .header("Prefer", "return=representation")
            .json(&json!({ "user_id": user_id }))
            .send()
            .await
            .context("Failed to create profile")?;
        Self::single(response, "create").await
    }

    async fn update_profile(&self, user_id: &str, changes: ProfileChanges) -> Result<Profile> {
        let mut body = serde_json::to_value(&changes).context("Failed to encode profile")?;
        body["updated_at"] = json!(Utc::now());

        let response = self
            .request(reqwest::Method::PATCH, Some(user_id))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .context("Failed to update profile")?;
        Self::single(response, "update").await
    }
}
