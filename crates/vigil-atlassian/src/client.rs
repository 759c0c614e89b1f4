use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_core::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

const JIRA_ISSUE_PATH: &str = "/rest/api/2/issue";
const CONFLUENCE_CONTENT_PATH: &str = "/wiki/rest/api/content";

/// Credentials and placement for Jira issues and Confluence pages.
///
/// Jira and Confluence Cloud share one account, so a single email/API token
/// pair authenticates both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlassianConfig {
    pub jira_base_url: String,
    pub confluence_base_url: String,
    pub email: String,
    pub api_token: String,
    pub jira_project_key: String,
    pub jira_issue_type: String,
    pub confluence_space_key: String,
    pub confluence_parent_page_id: Option<String>,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

impl Default for AtlassianConfig {
    fn default() -> Self {
        Self {
            jira_base_url: String::new(),
            confluence_base_url: String::new(),
            email: String::new(),
            api_token: String::new(),
            jira_project_key: "INC".to_string(),
            jira_issue_type: "Task".to_string(),
            confluence_space_key: String::new(),
            confluence_parent_page_id: None,
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl AtlassianConfig {
    /// Names of required settings that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("jira_base_url", &self.jira_base_url),
            ("confluence_base_url", &self.confluence_base_url),
            ("email", &self.email),
            ("api_token", &self.api_token),
            ("jira_project_key", &self.jira_project_key),
            ("jira_issue_type", &self.jira_issue_type),
            ("confluence_space_key", &self.confluence_space_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraIssueRef {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfluencePageRef {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct JiraCreateIssueResponse {
    key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfluenceLinks {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    webui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfluenceCreatePageResponse {
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "_links")]
    links: ConfluenceLinks,
}

#[derive(Clone)]
pub struct AtlassianClient {
    http: reqwest::Client,
    config: AtlassianConfig,
    jira_base_url: String,
    confluence_base_url: String,
}

impl AtlassianClient {
    pub fn new(config: AtlassianConfig) -> Result<Self> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            bail!("atlassian configuration incomplete: missing {}", missing.join(", "));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("vigil-incident-monitor"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create atlassian api client")?;

        Ok(Self {
            http,
            jira_base_url: config.jira_base_url.trim().trim_end_matches('/').to_string(),
            confluence_base_url: config
                .confluence_base_url
                .trim()
                .trim_end_matches('/')
                .to_string(),
            config,
        })
    }

    pub fn config(&self) -> &AtlassianConfig {
        &self.config
    }

    /// Creates one Jira issue labelled `incident` and `postmortem`.
    pub async fn create_jira_issue(
        &self,
        summary: &str,
        description: &str,
    ) -> Result<JiraIssueRef> {
        let payload = json!({
            "fields": {
                "project": { "key": self.config.jira_project_key },
                "summary": summary,
                "description": description,
                "issuetype": { "name": self.config.jira_issue_type },
                "labels": ["incident", "postmortem"],
            }
        });
        let url = format!("{}{JIRA_ISSUE_PATH}", self.jira_base_url);
        let response: JiraCreateIssueResponse = self
            .request_json("jira create issue", || {
                self.authorized(self.http.post(&url)).json(&payload)
            })
            .await?;
        let key = response
            .key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("jira create issue response did not include key"))?;
        Ok(JiraIssueRef {
            url: format!("{}/browse/{key}", self.jira_base_url),
            key,
        })
    }

    /// Creates a Confluence page whose body uses the storage representation.
    pub async fn create_confluence_page(
        &self,
        title: &str,
        storage_body: &str,
    ) -> Result<ConfluencePageRef> {
        let mut payload = json!({
            "type": "page",
            "title": title,
            "space": { "key": self.config.confluence_space_key },
            "body": {
                "storage": { "value": storage_body, "representation": "storage" }
            },
        });
        if let Some(parent) = self
            .config
            .confluence_parent_page_id
            .as_deref()
            .map(str::trim)
            .filter(|parent| !parent.is_empty())
        {
            payload["ancestors"] = Value::Array(vec![json!({ "id": parent })]);
        }

        let url = format!("{}{CONFLUENCE_CONTENT_PATH}", self.confluence_base_url);
        let response: ConfluenceCreatePageResponse = self
            .request_json("confluence create page", || {
                self.authorized(self.http.post(&url)).json(&payload)
            })
            .await?;
        let id = response
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("confluence create page response did not include id"))?;
        let url = match (response.links.base, response.links.webui) {
            (Some(base), Some(webui)) => format!("{}{webui}", base.trim_end_matches('/')),
            (None, Some(webui)) => format!("{}/wiki{webui}", self.confluence_base_url),
            _ => format!(
                "{}/wiki/pages/viewpage.action?pageId={id}",
                self.confluence_base_url
            ),
        };
        Ok(ConfluencePageRef {
            title: response.title.unwrap_or_else(|| title.to_string()),
            id,
            url,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.config.email, Some(&self.config.api_token))
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let max_attempts = self.config.retry_max_attempts.max(1);
        let base_delay_ms = self.config.retry_base_delay_ms.max(1);
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode {operation} response"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(base_delay_ms, attempt, retry_after)).await;
                        continue;
                    }
                    bail!(
                        "{operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(base_delay_ms, attempt, None)).await;
                        continue;
                    }
                    return Err(error).with_context(|| format!("{operation} request failed"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
