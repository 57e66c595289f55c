use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use shared::{
    domain::{MessageId, RoomKey},
    error::{ApiError, ErrorCode},
    protocol::{HistoryEntry, RosterEntry, SelfProfile, SendMessageRequest},
};
use tracing::debug;

use crate::{config::ClientSettings, ChatBackend};

/// [`ChatBackend`] over the classroom REST API.
#[derive(Clone)]
pub struct HttpChatBackend {
    http: Client,
    server_url: String,
    auth_token: Option<String>,
}

impl HttpChatBackend {
    pub fn new(server_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.server_url.clone(), settings.auth_token.clone())
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn messages_url(&self, room: &RoomKey) -> String {
        match &room.lesson_id {
            Some(lesson_id) => format!(
                "{}/classrooms/{}/lessons/{}/messages",
                self.server_url, room.classroom_id, lesson_id
            ),
            None => format!(
                "{}/classrooms/{}/messages",
                self.server_url, room.classroom_id
            ),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turns a non-success response into an [`ApiError`], taken from the body
/// when the server sent an envelope and derived from the status otherwise.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        ApiError::new(
            ErrorCode::from_status(status.as_u16()),
            format!("server returned {status}: {body}"),
        )
    });
    Err(api_error.into())
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn fetch_roster(&self, room: &RoomKey) -> Result<Vec<RosterEntry>> {
        let url = format!("{}/classrooms/{}/members", self.server_url, room.classroom_id);
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .with_context(|| format!("failed to fetch roster: {url}"))?;
        let roster: Vec<RosterEntry> = check_status(response).await?.json().await?;
        debug!(classroom_id = %room.classroom_id, count = roster.len(), "http: roster fetched");
        Ok(roster)
    }

    async fn fetch_history(&self, room: &RoomKey, limit: u32) -> Result<Vec<HistoryEntry>> {
        let url = self.messages_url(room);
        let response = self
            .authorized(self.http.get(&url))
            .query(&[("limit", limit)])
            .send()
            .await
            .with_context(|| format!("failed to fetch history: {url}"))?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn fetch_self_profile(&self) -> Result<SelfProfile> {
        let url = format!("{}/me", self.server_url);
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .with_context(|| format!("failed to fetch profile: {url}"))?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn send_message(
        &self,
        room: &RoomKey,
        request: SendMessageRequest,
    ) -> Result<HistoryEntry> {
        let url = self.messages_url(room);
        let response = self
            .authorized(self.http.post(&url))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to send message: {url}"))?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        let url = format!("{}/messages/{}", self.server_url, message_id);
        let response = self
            .authorized(self.http.delete(&url))
            .send()
            .await
            .with_context(|| format!("failed to delete message: {url}"))?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
