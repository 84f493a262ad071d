//! Screener-style document source.
//!
//! Discovers a company's published documents by scraping its page on a
//! screener-style site: the annual-reports section plus any anchors
//! labelled as transcripts or presentations. Link extraction is
//! regex-based; the page markup is simple enough that a DOM parser
//! buys nothing.
//!
//! Download URLs frequently point at the exchanges themselves, which
//! reject requests without a matching Referer, so the referer is chosen
//! per target domain. Bodies under a minimum size are rejected as error
//! pages.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SourceError, SourceResult};
use crate::traits::source::DocumentSource;
use crate::types::config::YearRange;
use crate::types::job::{DocumentKind, DocumentLink};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Document source backed by a screener-style company page.
pub struct ScreenerSource {
    client: reqwest::Client,
    base_url: Url,
    user_agent: String,
    min_body_bytes: usize,
}

impl ScreenerSource {
    /// Create a source rooted at the given site.
    pub fn new(base_url: &str) -> SourceResult<Self> {
        let base_url = Url::parse(base_url).map_err(|_| SourceError::InvalidUrl {
            url: base_url.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            min_body_bytes: 1024,
        })
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the minimum acceptable document body size.
    pub fn with_min_body_bytes(mut self, bytes: usize) -> Self {
        self.min_body_bytes = bytes;
        self
    }

    async fn get_text(&self, url: &str) -> SourceResult<String> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "company page request failed");
                SourceError::Http {
                    url: url.to_string(),
                    source: Box::new(e),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| SourceError::Http {
            url: url.to_string(),
            source: Box::new(e),
        })
    }

    fn resolve(&self, href: &str) -> SourceResult<Url> {
        self.base_url
            .join(href)
            .map_err(|_| SourceError::InvalidUrl {
                url: href.to_string(),
            })
    }
}

#[async_trait]
impl DocumentSource for ScreenerSource {
    async fn discover(
        &self,
        identifier: &str,
        range: &YearRange,
    ) -> SourceResult<Vec<DocumentLink>> {
        let page_url = self.resolve(&format!("company/{identifier}/"))?;
        info!(url = %page_url, identifier = %identifier, "discovering documents");

        let html = self.get_text(page_url.as_str()).await?;

        let mut links = Vec::new();
        let mut seen_urls = HashSet::new();
        let mut used_paths = HashSet::new();

        collect_annual_reports(&html, range, &mut links, &mut seen_urls, &mut used_paths);
        collect_labelled_documents(
            &html,
            identifier,
            range,
            &mut links,
            &mut seen_urls,
            &mut used_paths,
        );

        info!(
            identifier = %identifier,
            documents = links.len(),
            "discovery complete"
        );
        Ok(links)
    }

    async fn download(&self, link: &DocumentLink) -> SourceResult<Bytes> {
        let full_url = if link.url.starts_with("http") {
            Url::parse(&link.url).map_err(|_| SourceError::InvalidUrl {
                url: link.url.clone(),
            })?
        } else {
            self.resolve(&link.url)?
        };

        let referer = referer_for(&full_url, self.base_url.as_str());
        debug!(url = %full_url, referer = %referer, "downloading document");

        let response = self
            .client
            .get(full_url.clone())
            .header("User-Agent", &self.user_agent)
            .header("Referer", referer)
            .send()
            .await
            .map_err(|e| SourceError::Http {
                url: link.url.clone(),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: link.url.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| SourceError::Http {
            url: link.url.clone(),
            source: Box::new(e),
        })?;

        // Exchanges serve small HTML error pages with a 200 status.
        if bytes.len() < self.min_body_bytes {
            return Err(SourceError::TooSmall {
                url: link.url.clone(),
                size: bytes.len(),
            });
        }

        Ok(bytes)
    }

    fn name(&self) -> &str {
        "screener"
    }
}

/// Pull annual-report links out of the page's annual-reports section.
fn collect_annual_reports(
    html: &str,
    range: &YearRange,
    links: &mut Vec<DocumentLink>,
    seen_urls: &mut HashSet<String>,
    used_paths: &mut HashSet<PathBuf>,
) {
    let Some(section) = annual_reports_section(html) else {
        debug!("no annual-reports section on page");
        return;
    };

    let item_pattern = regex::Regex::new(r"(?s)<li[^>]*>(.*?)</li>").unwrap();
    let href_pattern = regex::Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).unwrap();

    for item in item_pattern.captures_iter(section) {
        let item_html = &item[1];
        let year = extract_year(&strip_tags(item_html));
        if !range.contains(year) {
            continue;
        }

        let Some(href) = href_pattern.captures(item_html).map(|c| c[1].to_string()) else {
            continue;
        };
        if !seen_urls.insert(href.clone()) {
            continue;
        }

        let year_label = year.map_or_else(|| "Unknown_Year".to_string(), |y| y.to_string());
        let path = unique_path(
            used_paths,
            PathBuf::from("Annual_Reports")
                .join(&year_label)
                .join(format!("Annual_Report_{year_label}.pdf")),
        );
        links.push(DocumentLink::new(href, path, DocumentKind::AnnualReport));
    }
}

/// Pull transcript and presentation links out of the page's anchors.
fn collect_labelled_documents(
    html: &str,
    identifier: &str,
    range: &YearRange,
    links: &mut Vec<DocumentLink>,
    seen_urls: &mut HashSet<String>,
    used_paths: &mut HashSet<PathBuf>,
) {
    let anchor_pattern =
        regex::Regex::new(r#"(?s)<a[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap();
    let symbol = sanitize_component(&identifier.to_uppercase());

    for anchor in anchor_pattern.captures_iter(html) {
        let href = anchor[1].to_string();
        let text = strip_tags(&anchor[2]).trim().to_lowercase();

        let kind = if text.contains("transcript") {
            DocumentKind::Transcript
        } else if text == "ppt" {
            DocumentKind::Presentation
        } else {
            continue;
        };

        // Exchange links only; consolidated variants duplicate content.
        if !href.starts_with("http") || href.contains("consolidated") {
            continue;
        }
        if !seen_urls.insert(href.clone()) {
            continue;
        }

        // Year and month live in the text around the anchor, not in it.
        let context = surrounding_text(html, anchor.get(0).unwrap());
        let year = extract_year(&context);
        if !range.contains(year) {
            continue;
        }
        let year_label = year.map_or_else(|| "Unknown_Year".to_string(), |y| y.to_string());
        let month = extract_month(&context).unwrap_or("General");
        let label = kind.label();

        let path = unique_path(
            used_paths,
            PathBuf::from(&year_label)
                .join(label)
                .join(format!("{symbol}_{month}_{year_label}_{label}.pdf")),
        );
        links.push(DocumentLink::new(href, path, kind));
    }
}

/// The slice of the page holding the annual-reports list.
fn annual_reports_section(html: &str) -> Option<&str> {
    let start = html.find(r#"id="annual-reports""#)?;
    let rest = &html[start..];
    let end = rest.find("</ul>").map_or(rest.len(), |i| i + "</ul>".len());
    Some(&rest[..end])
}

fn strip_tags(html: &str) -> String {
    let tag_pattern = regex::Regex::new(r"<[^>]+>").unwrap();
    tag_pattern.replace_all(html, " ").to_string()
}

fn extract_year(text: &str) -> Option<i32> {
    let year_pattern = regex::Regex::new(r"\b(20\d{2})\b").unwrap();
    year_pattern
        .captures(text)
        .and_then(|c| c[1].parse().ok())
}

fn extract_month(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let month_pattern = regex::Regex::new(r"\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\b")
        .unwrap();
    let found = month_pattern.captures(&lower)?[1].to_string();
    MONTHS
        .iter()
        .position(|m| *m == found)
        .map(|i| MONTH_LABELS[i])
}

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Text around an anchor, for year/month metadata. Starts at the
/// enclosing list item so a neighbouring row's date cannot bleed in.
fn surrounding_text(html: &str, anchor: regex::Match<'_>) -> String {
    let before = &html[..anchor.start()];
    let floor = anchor.start().saturating_sub(250);
    let floor = (0..=floor)
        .rev()
        .find(|i| html.is_char_boundary(*i))
        .unwrap_or(0);
    let start = before.rfind("<li").map_or(floor, |li| li.max(floor));
    strip_tags(&html[start..anchor.end()])
}

/// Strip characters that are unsafe in file names.
fn sanitize_component(name: &str) -> String {
    let unsafe_pattern = regex::Regex::new(r#"[\\/*?:"<>|]"#).unwrap();
    unsafe_pattern.replace_all(name, "").trim().to_string()
}

/// Suffix a path with a counter until it is unique within this
/// discovery pass.
fn unique_path(used: &mut HashSet<PathBuf>, candidate: PathBuf) -> PathBuf {
    if used.insert(candidate.clone()) {
        return candidate;
    }
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parent = candidate.parent().map(PathBuf::from).unwrap_or_default();
    for counter in 1.. {
        let next = parent.join(format!("{stem}_{counter}.pdf"));
        if used.insert(next.clone()) {
            return next;
        }
    }
    unreachable!()
}

/// Exchange sites reject downloads without a matching Referer.
fn referer_for<'a>(url: &Url, base: &'a str) -> &'a str {
    match url.host_str() {
        Some(host) if host.contains("bseindia") => "https://www.bseindia.com/",
        Some(host) if host.contains("nseindia") => "https://www.nseindia.com/",
        _ => base,
    }
}
