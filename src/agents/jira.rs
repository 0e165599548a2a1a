//! Jira issue creation over the REST API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ticket::TicketDraft;
use crate::error::{Result, TriageError};

/// Longest summary Jira accepts
const SUMMARY_LIMIT: usize = 255;

/// Where and how to file issues. Credentials are read from the named env vars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraSettings {
    pub server: Option<String>,
    pub username_env: String,
    pub token_env: String,
    pub project_key: String,
    pub issue_type: String,
}

impl Default for JiraSettings {
    fn default() -> Self {
        Self {
            server: None,
            username_env: "JIRA_USERNAME".to_string(),
            token_env: "JIRA_API_TOKEN".to_string(),
            project_key: "STS".to_string(),
            issue_type: "Story".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

pub struct JiraClient {
    client: Client,
    server: String,
    username: String,
    token: String,
    project_key: String,
    issue_type: String,
}

impl JiraClient {
    /// Build a client, reading credentials from the environment
    pub fn new(settings: &JiraSettings) -> Result<Self> {
        let server = settings
            .server
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| TriageError::Jira("no server configured".to_string()))?;
        let username = std::env::var(&settings.username_env)
            .map_err(|_| TriageError::Jira(format!("missing {} environment variable", settings.username_env)))?;
        let token = std::env::var(&settings.token_env)
            .map_err(|_| TriageError::Jira(format!("missing {} environment variable", settings.token_env)))?;

        Self::with_credentials(settings, server, username, token)
    }

    pub fn with_credentials(
        settings: &JiraSettings,
        server: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TriageError::Jira(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server: server.into(),
            username: username.into(),
            token: token.into(),
            project_key: settings.project_key.clone(),
            issue_type: settings.issue_type.clone(),
        })
    }

    fn issue_url(&self) -> String {
        format!("{}/rest/api/2/issue", self.server.trim_end_matches('/'))
    }

    pub fn issue_payload(&self, draft: &TicketDraft) -> Value {
        let summary: String = draft.summary.chars().take(SUMMARY_LIMIT).collect();
        json!({
            "fields": {
                "project": { "key": self.project_key },
                "summary": summary,
                "description": draft.description,
                "issuetype": { "name": self.issue_type },
            }
        })
    }

    /// File the draft; returns the new issue key
    pub async fn create_issue(&self, draft: &TicketDraft) -> Result<String> {
        let response = self
            .client
            .post(self.issue_url())
            .basic_auth(&self.username, Some(&self.token))
            .json(&self.issue_payload(draft))
            .send()
            .await
            .map_err(|e| TriageError::Jira(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TriageError::Jira(format!("{}: {}", status.as_u16(), body)));
        }

        let created: CreatedIssue = response
            .json()
            .await
            .map_err(|e| TriageError::Jira(format!("unexpected response: {}", e)))?;

        log::info!("Created Jira issue {}", created.key);
        Ok(created.key)
    }
}

impl std::fmt::Debug for JiraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraClient")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .field("project_key", &self.project_key)
            .finish()
    }
}
