//! Contentful Delivery API source
//!
//! Entries of content types `blogPost` and `portfolioProject`; linked assets
//! and entries are resolved from the response's `includes`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::content::{BlogPost, ContentError, ContentSource, PortfolioProject};

const USER_AGENT: &str = concat!("xma-site/", env!("CARGO_PKG_VERSION"));
const POST_TYPE: &str = "blogPost";
const PROJECT_TYPE: &str = "portfolioProject";

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    items: Vec<Entry>,
    #[serde(default)]
    includes: Includes,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default, rename = "Asset")]
    assets: Vec<Entry>,
    #[serde(default, rename = "Entry")]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    sys: Sys,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Sys {
    id: String,
}

impl Includes {
    /// Follow a `{"sys": {"type": "Link", ...}}` reference
    fn resolve(&self, link: &Value) -> Option<&Entry> {
        let sys = link.get("sys")?;
        let id = sys.get("id")?.as_str()?;
        let pool = match sys.get("linkType")?.as_str()? {
            "Asset" => &self.assets,
            "Entry" => &self.entries,
            _ => return None,
        };
        pool.iter().find(|e| e.sys.id == id)
    }

    fn asset_url(&self, link: &Value) -> Option<String> {
        let url = self
            .resolve(link)?
            .fields
            .get("file")?
            .get("url")?
            .as_str()?;
        Some(if url.starts_with("//") {
            format!("https:{}", url)
        } else {
            url.to_string()
        })
    }

    /// Plain string, or the name/title of a linked entry
    fn label(&self, value: &Value) -> Option<String> {
        if let Some(s) = value.as_str() {
            return Some(s.to_string());
        }
        let entry = self.resolve(value)?;
        ["name", "title"]
            .iter()
            .find_map(|k| entry.fields.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    }
}

fn str_field(fields: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(fields: &serde_json::Map<String, Value>, key: &str) -> Vec<String> {
    fields
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Contentful date fields come as full RFC 3339, minute precision, or a bare date
pub fn parse_cms_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Flatten a rich-text document (or plain string) to text
///
/// Top-level blocks are separated by blank lines.
pub fn rich_text_to_plain(value: &Value) -> String {
    fn inline(node: &Value, out: &mut String) {
        if node.get("nodeType").and_then(Value::as_str) == Some("text") {
            if let Some(text) = node.get("value").and_then(Value::as_str) {
                out.push_str(text);
            }
            return;
        }
        if let Some(children) = node.get("content").and_then(Value::as_array) {
            for child in children {
                inline(child, out);
            }
        }
    }

    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) => value
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .map(|block| {
                        let mut text = String::new();
                        inline(block, &mut text);
                        text
                    })
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn to_post(entry: &Entry, includes: &Includes) -> Option<BlogPost> {
    let f = &entry.fields;
    Some(BlogPost {
        slug: str_field(f, "slug")?,
        title: str_field(f, "title")?,
        excerpt: str_field(f, "excerpt").unwrap_or_default(),
        body: f.get("body").map(rich_text_to_plain).unwrap_or_default(),
        category: f.get("category").and_then(|v| includes.label(v)),
        tags: string_list(f, "tags"),
        published_at: str_field(f, "publishedAt").and_then(|d| parse_cms_date(&d)),
        author: f.get("author").and_then(|v| includes.label(v)),
        cover_image: f.get("coverImage").and_then(|v| includes.asset_url(v)),
    })
}

fn to_project(entry: &Entry, includes: &Includes) -> Option<PortfolioProject> {
    let f = &entry.fields;
    Some(PortfolioProject {
        slug: str_field(f, "slug")?,
        title: str_field(f, "title")?,
        client: str_field(f, "client"),
        summary: str_field(f, "summary").unwrap_or_default(),
        services: string_list(f, "services"),
        industry: str_field(f, "industry"),
        featured: f.get("featured").and_then(Value::as_bool).unwrap_or(false),
        published_at: str_field(f, "publishedAt").and_then(|d| parse_cms_date(&d)),
        cover_image: f.get("coverImage").and_then(|v| includes.asset_url(v)),
    })
}

/// Contentful client
pub struct ContentfulSource {
    http_client: reqwest::Client,
    entries_url: String,
    access_token: String,
}

impl ContentfulSource {
    pub fn new(
        api_base: &str,
        space_id: &str,
        environment: &str,
        access_token: String,
    ) -> Result<Self, ContentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ContentError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            entries_url: format!(
                "{}/spaces/{}/environments/{}/entries",
                api_base.trim_end_matches('/'),
                space_id,
                environment
            ),
            access_token,
        })
    }

    async fn fetch(&self, content_type: &str, slug: Option<&str>) -> Result<EntriesResponse, ContentError> {
        let mut query = vec![
            ("content_type", content_type.to_string()),
            ("order", "-fields.publishedAt".to_string()),
            ("include", "2".to_string()),
        ];
        if let Some(slug) = slug {
            query.push(("fields.slug", slug.to_string()));
            query.push(("limit", "1".to_string()));
        }

        tracing::debug!(content_type, slug, "Fetching Contentful entries");

        let response = self
            .http_client
            .get(&self.entries_url)
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| ContentError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ContentError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ContentError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl ContentSource for ContentfulSource {
    fn provider(&self) -> &'static str {
        "contentful"
    }

    async fn list_posts(&self) -> Result<Vec<BlogPost>, ContentError> {
        let response = self.fetch(POST_TYPE, None).await?;
        Ok(response
            .items
            .iter()
            .filter_map(|e| to_post(e, &response.includes))
            .collect())
    }

    async fn get_post(&self, slug: &str) -> Result<Option<BlogPost>, ContentError> {
        let response = self.fetch(POST_TYPE, Some(slug)).await?;
        Ok(response
            .items
            .iter()
            .find_map(|e| to_post(e, &response.includes)))
    }

    async fn list_projects(&self) -> Result<Vec<PortfolioProject>, ContentError> {
        let response = self.fetch(PROJECT_TYPE, None).await?;
        Ok(response
            .items
            .iter()
            .filter_map(|e| to_project(e, &response.includes))
            .collect())
    }

    async fn get_project(&self, slug: &str) -> Result<Option<PortfolioProject>, ContentError> {
        let response = self.fetch(PROJECT_TYPE, Some(slug)).await?;
        Ok(response
            .items
            .iter()
            .find_map(|e| to_project(e, &response.includes)))
    }
}
