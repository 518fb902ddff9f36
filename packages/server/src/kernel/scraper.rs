//! Site scraper - fetches a pantry website and distills it to Markdown.
//!
//! Static HTML only (no JavaScript rendering). The landing page is reduced
//! to Markdown with navigation chrome dropped at conversion time; when the
//! result says little about food assistance, the most promising same-domain
//! subpages (hours, programs, get-help style paths) are pulled in and
//! appended before the content goes to extraction.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::kernel::traits::BaseWebScraper;

/// Pages below this many Markdown characters are treated as empty.
const MIN_CONTENT_CHARS: usize = 20;

/// Keyword hits needed before a landing page counts as relevant on its own.
const RELEVANT_HITS: usize = 3;

/// Maximum same-domain subpages fetched when the landing page is thin.
const MAX_SUBPAGES: usize = 5;

/// Terms that indicate food-assistance content.
const RELEVANCE_KEYWORDS: [&str; 8] = [
    "food", "pantry", "hours", "eligib", "distribution", "donat", "assistance", "groceries",
];

/// Path fragments that mark a subpage as worth visiting on a thin site.
const PROMISING_PATHS: [&str; 8] = [
    "food", "pantry", "hour", "service", "program", "help", "assist", "about",
];

/// Landmarks tried, in order, as the content root of a page.
const CONTENT_ROOTS: [&str; 4] = ["main", "article", "[role='main']", "#content"];

/// Tags dropped during Markdown conversion - navigation chrome and
/// non-content elements.
const SKIP_TAGS: [&str; 8] = [
    "nav", "header", "footer", "aside", "form", "script", "style", "noscript",
];

/// Browser-like User-Agent; some pantry sites reject obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct SiteScraper {
    client: reqwest::Client,
}

impl SiteScraper {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to build scraper HTTP client")?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("Bad status from {url}"))?;

        response.text().await.context("Failed to read response body")
    }

    /// Reduce a page to Markdown. The first content landmark found becomes
    /// the conversion root (falling back to the whole document); chrome
    /// tags are skipped during conversion rather than stripped from the
    /// HTML. An unconvertible page yields an empty string, which callers
    /// treat as no usable content.
    ///
    /// `Html` is not Send, so parsing stays inside this function and only
    /// owned Markdown escapes.
    fn page_markdown(html: &str) -> String {
        let document = Html::parse_document(html);
        let root = CONTENT_ROOTS
            .iter()
            .filter_map(|landmark| Selector::parse(landmark).ok())
            .find_map(|selector| document.select(&selector).next().map(|el| el.html()))
            .unwrap_or_else(|| document.html());

        htmd::HtmlToMarkdown::builder()
            .skip_tags(SKIP_TAGS.to_vec())
            .build()
            .convert(&root)
            .unwrap_or_default()
    }

    /// Same-domain subpage links worth visiting, most promising first.
    /// Links whose path mentions assistance-related fragments sort ahead
    /// of the rest; assets, feeds, and auth pages are dropped.
    fn subpage_links(html: &str, base: &Url) -> Vec<Url> {
        let document = Html::parse_document(html);
        let Ok(anchors) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut scored: Vec<(usize, Url)> = document
            .select(&anchors)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .filter_map(|mut link| {
                link.set_fragment(None);
                link.set_query(None);
                (link.domain() == base.domain()
                    && matches!(link.scheme(), "http" | "https")
                    && crawlable_path(link.path())
                    && seen.insert(link.to_string()))
                .then_some(link)
            })
            .map(|link| {
                let path = link.path().to_lowercase();
                let hits = PROMISING_PATHS.iter().filter(|p| path.contains(*p)).count();
                (hits, link)
            })
            .collect();

        // Stable sort: equal scores keep document order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, link)| link).collect()
    }
}

/// Parse a scrape target, assuming https when the scheme is missing
/// (place-search results often carry bare hostnames).
fn parse_url(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        Ok(url) => anyhow::bail!("Unsupported URL scheme '{}'", url.scheme()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{raw}")).context("Invalid URL")
        }
        Err(e) => Err(e).context("Invalid URL"),
    }
}

/// Paths that cannot contain pantry information: static assets, feeds,
/// and auth flows.
fn crawlable_path(path: &str) -> bool {
    let path = path.to_lowercase();
    let asset = [
        ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".css", ".js", ".xml", ".ico",
    ]
    .iter()
    .any(|ext| path.ends_with(ext));
    let blocked = ["/wp-admin", "/login", "/signin", "/logout", "/cart", "/feed", "/rss"]
        .iter()
        .any(|fragment| path.contains(fragment));

    !(asset || blocked)
}

/// Count food-assistance keyword hits in Markdown content.
fn relevance_score(markdown: &str) -> usize {
    let lower = markdown.to_lowercase();
    RELEVANCE_KEYWORDS
        .iter()
        .map(|kw| lower.matches(kw).count())
        .sum()
}

#[async_trait]
impl BaseWebScraper for SiteScraper {
    async fn scrape(&self, url: &str) -> Result<Option<String>> {
        let base = parse_url(url)?;
        debug!(url = %base, "Scraping page");

        let html = self.fetch(&base).await?;
        let mut markdown = Self::page_markdown(&html);

        if markdown.trim().len() < MIN_CONTENT_CHARS {
            warn!(url = %base, "Page has no usable content");
            return Ok(None);
        }

        if relevance_score(&markdown) >= RELEVANT_HITS {
            return Ok(Some(markdown));
        }

        // Thin landing page: append the most promising subpages before
        // handing the content to extraction.
        let links = Self::subpage_links(&html, &base);
        debug!(url = %base, candidate_links = links.len(), "Low relevance, crawling subpages");

        let mut visited: HashSet<String> = HashSet::from([base.to_string()]);
        for link in links {
            if visited.len() > MAX_SUBPAGES {
                break;
            }
            if !visited.insert(link.to_string()) {
                continue;
            }

            match self.fetch(&link).await {
                Ok(sub_html) => {
                    let sub_markdown = Self::page_markdown(&sub_html);
                    if sub_markdown.trim().len() >= MIN_CONTENT_CHARS {
                        markdown.push_str("\n\n---\n\n");
                        markdown.push_str(&sub_markdown);
                    }
                }
                Err(e) => debug!(url = %link, error = %e, "Subpage fetch failed"),
            }
        }

        Ok(Some(markdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_markdown_uses_content_landmark() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Food Pantry</h1><p>Pantry hours: Mon-Fri 9-5</p></main>
            <footer>Copyright</footer>
        </body></html>"#;

        let markdown = SiteScraper::page_markdown(html);
        assert!(markdown.contains("Pantry hours"));
        assert!(!markdown.contains("Home"));
        assert!(!markdown.contains("Copyright"));
    }

    #[test]
    fn page_markdown_skips_chrome_without_landmark() {
        let html = r#"<html><body>
            <nav>Menu links everywhere</nav>
            <p>Food pantry open Mondays</p>
            <script>analytics()</script>
        </body></html>"#;

        let markdown = SiteScraper::page_markdown(html);
        assert!(markdown.contains("Food pantry open Mondays"));
        assert!(!markdown.contains("Menu links"));
        assert!(!markdown.contains("analytics"));
    }

    #[test]
    fn subpage_links_stay_on_domain_and_drop_assets() {
        let html = r#"<html><body>
            <a href="/contact">Contact</a>
            <a href="/food-pantry/">Food Pantry</a>
            <a href="https://other.com/page">Other site</a>
            <a href="/brochure.pdf">Brochure</a>
            <a href="/login">Login</a>
        </body></html>"#;
        let base = Url::parse("https://example.com").unwrap();

        let links = SiteScraper::subpage_links(html, &base);
        let paths: Vec<&str> = links.iter().map(Url::path).collect();

        assert!(paths.contains(&"/contact"));
        assert!(paths.contains(&"/food-pantry/"));
        assert!(!links.iter().any(|l| l.domain() == Some("other.com")));
        assert!(!paths.iter().any(|p| p.ends_with(".pdf")));
        assert!(!paths.contains(&"/login"));
    }

    #[test]
    fn subpage_links_rank_promising_paths_first() {
        let html = r#"<html><body>
            <a href="/news">News</a>
            <a href="/food-pantry-hours">Hours</a>
            <a href="/team">Team</a>
        </body></html>"#;
        let base = Url::parse("https://example.com").unwrap();

        let links = SiteScraper::subpage_links(html, &base);
        assert_eq!(links[0].path(), "/food-pantry-hours");
    }

    #[test]
    fn subpage_links_dedup_after_stripping_query() {
        let html = r#"<html><body>
            <a href="/hours?ref=nav">Hours</a>
            <a href="/hours#today">Hours again</a>
        </body></html>"#;
        let base = Url::parse("https://example.com").unwrap();

        let links = SiteScraper::subpage_links(html, &base);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].path(), "/hours");
    }

    #[test]
    fn parse_url_assumes_https() {
        assert_eq!(parse_url("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(parse_url("http://example.com").unwrap().scheme(), "http");
        assert!(parse_url("ftp://example.com").is_err());
    }

    #[test]
    fn crawlable_path_blocks_assets_and_auth() {
        assert!(!crawlable_path("/logo.PNG"));
        assert!(!crawlable_path("/wp-admin/options"));
        assert!(!crawlable_path("/feed"));
        assert!(crawlable_path("/get-help"));
        assert!(crawlable_path("/about"));
    }

    #[test]
    fn relevance_score_counts_keyword_hits() {
        let relevant = "Our food pantry is open Mon-Fri. Pantry hours may vary. Eligibility: all.";
        assert!(relevance_score(relevant) >= RELEVANT_HITS);

        let irrelevant = "Welcome to our church homepage.";
        assert!(relevance_score(irrelevant) < RELEVANT_HITS);
    }
}
