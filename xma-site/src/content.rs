//! Blog and portfolio content
//!
//! Content comes from a CMS behind the [`ContentSource`] trait. Contentful
//! and Sanity both exist as sources; configuration picks exactly one, they
//! are never merged. Filtering and ranking here are pure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CMS access errors
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioProject {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// Read access to published content
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Provider name for logs and /health
    fn provider(&self) -> &'static str;

    async fn list_posts(&self) -> Result<Vec<BlogPost>, ContentError>;

    async fn get_post(&self, slug: &str) -> Result<Option<BlogPost>, ContentError>;

    async fn list_projects(&self) -> Result<Vec<PortfolioProject>, ContentError>;

    async fn get_project(&self, slug: &str) -> Result<Option<PortfolioProject>, ContentError>;
}

/// Blog listing filter; all set criteria must match
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive substring of title or excerpt
    #[serde(rename = "q")]
    pub search: Option<String>,
}

impl PostFilter {
    pub fn matches(&self, post: &BlogPost) -> bool {
        let category_ok = match non_blank(&self.category) {
            Some(category) => post
                .category
                .as_deref()
                .map(|c| c.eq_ignore_ascii_case(category))
                .unwrap_or(false),
            None => true,
        };
        let tag_ok = match non_blank(&self.tag) {
            Some(tag) => post.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)),
            None => true,
        };
        let search_ok = match non_blank(&self.search) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                post.title.to_lowercase().contains(&needle)
                    || post.excerpt.to_lowercase().contains(&needle)
            }
            None => true,
        };
        category_ok && tag_ok && search_ok
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Newest first; undated entries last
fn newest_first(a: &Option<DateTime<Utc>>, b: &Option<DateTime<Utc>>) -> std::cmp::Ordering {
    b.cmp(a)
}

pub fn filter_posts(posts: Vec<BlogPost>, filter: &PostFilter) -> Vec<BlogPost> {
    let mut posts: Vec<_> = posts.into_iter().filter(|p| filter.matches(p)).collect();
    posts.sort_by(|a, b| newest_first(&a.published_at, &b.published_at));
    posts
}

/// Other posts sharing the category or tags of `slug`, best matches first
///
/// Score is shared tags plus two for a shared category; ties go to the newer post.
pub fn related_posts(posts: &[BlogPost], slug: &str, limit: usize) -> Vec<BlogPost> {
    let Some(current) = posts.iter().find(|p| p.slug == slug) else {
        return Vec::new();
    };

    let mut scored: Vec<(usize, &BlogPost)> = posts
        .iter()
        .filter(|p| p.slug != slug)
        .map(|p| {
            let shared_tags = p
                .tags
                .iter()
                .filter(|t| current.tags.iter().any(|c| c.eq_ignore_ascii_case(t)))
                .count();
            let same_category = match (&p.category, &current.category) {
                (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => 2,
                _ => 0,
            };
            (shared_tags + same_category, p)
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| newest_first(&a.published_at, &b.published_at))
    });
    scored.into_iter().take(limit).map(|(_, p)| p.clone()).collect()
}

/// Projects sorted newest first, optionally only featured ones
pub fn filter_projects(projects: Vec<PortfolioProject>, featured_only: bool) -> Vec<PortfolioProject> {
    let mut projects: Vec<_> = projects
        .into_iter()
        .filter(|p| !featured_only || p.featured)
        .collect();
    projects.sort_by(|a, b| newest_first(&a.published_at, &b.published_at));
    projects
}

pub fn featured_projects(projects: Vec<PortfolioProject>) -> Vec<PortfolioProject> {
    filter_projects(projects, true)
}
