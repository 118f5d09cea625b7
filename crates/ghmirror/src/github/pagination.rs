//! `Link` header parsing and the lazy paginated entity stream.
//!
//! GitHub advertises further pages through the `Link` response header:
//!
//! ```text
//! <https://api.github.com/repos/a/x/issues?per_page=100&page=2>; rel="next",
//! <https://api.github.com/repos/a/x/issues?per_page=100&page=3>; rel="last"
//! ```
//!
//! A missing header, or one without a well-formed `rel="next"` entry, ends
//! the sequence.

use std::collections::VecDeque;

use futures_util::Stream;
use futures_util::stream;
use serde_json::Value;

use super::client::GitHubClient;
use crate::http::HttpResponse;
use crate::model::Entity;

/// Fixed page size requested from list endpoints.
pub const PAGE_SIZE: usize = 100;

/// Relations extracted from a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPagination {
    /// URL of the next page (from rel="next").
    pub next: Option<String>,
    /// URL of the last page (from rel="last").
    pub last: Option<String>,
}

impl LinkPagination {
    /// Page number of the last page, if advertised.
    pub fn last_page(&self) -> Option<u32> {
        self.last.as_deref().and_then(extract_page_from_url)
    }

    /// Page number of the next page, if advertised.
    pub fn next_page(&self) -> Option<u32> {
        self.next.as_deref().and_then(extract_page_from_url)
    }
}

/// Parse a `Link` header into its `next` and `last` relations.
///
/// Entries that are not of the form `<url>; rel="name"` are ignored.
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut info = LinkPagination::default();

    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.len() >= 2 && segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some(rel_type)) = (url, rel) {
            if url.is_empty() {
                continue;
            }
            match rel_type {
                "next" => info.next = Some(url.to_string()),
                "last" => info.last = Some(url.to_string()),
                _ => {}
            }
        }
    }

    info
}

/// Link relations advertised by a response, empty when absent.
pub fn response_links(response: &HttpResponse) -> LinkPagination {
    response
        .header("link")
        .map(parse_link_header)
        .unwrap_or_default()
}

/// Extract the `page` query parameter from a URL.
pub(crate) fn extract_page_from_url(url: &str) -> Option<u32> {
    let query_start = url.find('?')?;
    let query = &url[query_start + 1..];

    for param in query.split('&') {
        if let Some(value) = param.strip_prefix("page=") {
            return value.parse().ok();
        }
    }

    None
}

/// Objects contained in a list response body.
///
/// Non-array bodies and non-object elements are skipped with a warning.
pub(crate) fn page_entities(response: &HttpResponse) -> Vec<Entity> {
    match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Array(items)) => items.into_iter().filter_map(Entity::from_value).collect(),
        Ok(_) => {
            tracing::warn!(status = response.status, "Expected a JSON array page");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(status = response.status, error = %e, "Unparseable page body");
            Vec::new()
        }
    }
}

struct Cursor {
    next_url: Option<String>,
    page: u32,
    buffer: VecDeque<Entity>,
}

/// Lazily walk every page starting at `first_url`.
///
/// `None` produces an empty stream. Each page is requested only once the
/// previous page's items have been consumed. A failed request ends the
/// stream; an unsuccessful status yields no items but still follows any
/// advertised `next` link.
pub(crate) fn paginate<'a>(
    client: &'a GitHubClient,
    first_url: Option<String>,
    extra_header: Option<(&'a str, &'a str)>,
) -> impl Stream<Item = Entity> + use<'a> {
    let cursor = Cursor {
        next_url: first_url,
        page: 0,
        buffer: VecDeque::new(),
    };

    stream::unfold(cursor, move |mut cursor| async move {
        loop {
            if let Some(entity) = cursor.buffer.pop_front() {
                return Some((entity, cursor));
            }

            let url = cursor.next_url.take()?;
            let response = client.request(&url, &[], extra_header).await?;
            cursor.page += 1;

            if response.is_success() {
                cursor.buffer.extend(page_entities(&response));
            } else {
                tracing::warn!(url = %url, status = response.status, "Page request failed");
            }
            tracing::debug!(
                url = %url,
                page = cursor.page,
                items = cursor.buffer.len(),
                "Fetched page"
            );

            cursor.next_url = response_links(&response).next;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_next_and_last() {
        let header = r#"<https://api.github.com/repos/a/x/issues?per_page=100&page=2>; rel="next", <https://api.github.com/repos/a/x/issues?per_page=100&page=3>; rel="last""#;

        let info = parse_link_header(header);
        assert_eq!(
            info.next.as_deref(),
            Some("https://api.github.com/repos/a/x/issues?per_page=100&page=2")
        );
        assert_eq!(info.next_page(), Some(2));
        assert_eq!(info.last_page(), Some(3));
    }

    #[test]
    fn last_page_link_has_prev_and_first_only() {
        let header = r#"<https://api.github.com/repos/a/x/issues?page=2>; rel="prev", <https://api.github.com/repos/a/x/issues?page=1>; rel="first""#;

        let info = parse_link_header(header);
        assert_eq!(info.next, None);
        assert_eq!(info.last, None);
    }

    #[test]
    fn malformed_headers_yield_nothing() {
        for header in ["", "garbage", "<>; rel=\"next\"", "https://x?page=2; rel=\"next\"", "<https://x?page=2>"] {
            let info = parse_link_header(header);
            assert_eq!(info, LinkPagination::default(), "{header:?}");
        }
    }

    #[test]
    fn extract_page_from_url_reads_page_param() {
        assert_eq!(extract_page_from_url("https://api.github.com/repos?page=5"), Some(5));
        assert_eq!(
            extract_page_from_url("https://api.github.com/repos?per_page=100&page=3"),
            Some(3)
        );
        assert_eq!(extract_page_from_url("https://api.github.com/repos?per_page=100"), None);
        assert_eq!(extract_page_from_url("https://api.github.com/repos"), None);
    }

    #[test]
    fn page_entities_skips_non_objects() {
        let response = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: br#"[{"id": 1}, 2, {"id": 3}]"#.to_vec(),
        };
        let items = page_entities(&response);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id(), Some(3));

        let object = HttpResponse {
            body: br#"{"message": "Not Found"}"#.to_vec(),
            ..response
        };
        assert!(page_entities(&object).is_empty());
    }
}
