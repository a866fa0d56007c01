//! Sanity query API source
//!
//! GROQ projections shape documents into [`BlogPost`] / [`PortfolioProject`]
//! directly, so responses deserialize without a mapping layer.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::content::{BlogPost, ContentError, ContentSource, PortfolioProject};

const USER_AGENT: &str = concat!("xma-site/", env!("CARGO_PKG_VERSION"));

const POST_PROJECTION: &str = r#"{
  "slug": slug.current,
  title,
  "excerpt": coalesce(excerpt, ""),
  "body": coalesce(pt::text(body), ""),
  "category": category->title,
  "tags": coalesce(tags, []),
  publishedAt,
  "author": author->name,
  "coverImage": mainImage.asset->url
}"#;

const PROJECT_PROJECTION: &str = r#"{
  "slug": slug.current,
  title,
  client,
  "summary": coalesce(summary, ""),
  "services": coalesce(services, []),
  industry,
  "featured": coalesce(featured, false),
  publishedAt,
  "coverImage": mainImage.asset->url
}"#;

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

fn list_query(doc_type: &str, projection: &str) -> String {
    format!(
        r#"*[_type == "{}" && defined(slug.current)] | order(publishedAt desc) {}"#,
        doc_type, projection
    )
}

fn by_slug_query(doc_type: &str, projection: &str) -> String {
    format!(
        r#"*[_type == "{}" && slug.current == $slug][0] {}"#,
        doc_type, projection
    )
}

/// Sanity client
pub struct SanitySource {
    http_client: reqwest::Client,
    query_url: String,
    token: Option<String>,
}

impl SanitySource {
    pub fn new(
        project_id: &str,
        dataset: &str,
        api_version: &str,
        token: Option<String>,
        api_base: Option<&str>,
    ) -> Result<Self, ContentError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ContentError::NetworkError(e.to_string()))?;

        let base = match api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}.apicdn.sanity.io", project_id),
        };

        Ok(Self {
            http_client,
            query_url: format!(
                "{}/v{}/data/query/{}",
                base,
                api_version.trim_start_matches('v'),
                dataset
            ),
            token,
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        groq: &str,
        slug: Option<&str>,
    ) -> Result<T, ContentError> {
        let mut params = vec![("query", groq.to_string())];
        if let Some(slug) = slug {
            // GROQ parameters are JSON literals
            let literal = serde_json::to_string(slug)
                .map_err(|e| ContentError::ParseError(e.to_string()))?;
            params.push(("$slug", literal));
        }

        let mut request = self.http_client.get(&self.query_url).query(&params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContentError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ContentError::ApiError(status.as_u16(), error_text));
        }

        let body: QueryResponse<T> = response
            .json()
            .await
            .map_err(|e| ContentError::ParseError(e.to_string()))?;
        Ok(body.result)
    }
}

#[async_trait]
impl ContentSource for SanitySource {
    fn provider(&self) -> &'static str {
        "sanity"
    }

    async fn list_posts(&self) -> Result<Vec<BlogPost>, ContentError> {
        self.query(&list_query("post", POST_PROJECTION), None).await
    }

    async fn get_post(&self, slug: &str) -> Result<Option<BlogPost>, ContentError> {
        self.query(&by_slug_query("post", POST_PROJECTION), Some(slug))
            .await
    }

    async fn list_projects(&self) -> Result<Vec<PortfolioProject>, ContentError> {
        self.query(&list_query("project", PROJECT_PROJECTION), None)
            .await
    }

    async fn get_project(&self, slug: &str) -> Result<Option<PortfolioProject>, ContentError> {
        self.query(&by_slug_query("project", PROJECT_PROJECTION), Some(slug))
            .await
    }
}
