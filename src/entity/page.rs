// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Deserialize;

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData<T> {
    /// Entries of this page.
    pub data: Vec<T>,
    /// Total number of pages.
    #[serde(default)]
    pub total_pages: u32,
    /// Total number of entries.
    #[serde(default)]
    pub total_elements: u64,
    /// Whether a further page exists.
    #[serde(default)]
    pub has_next: bool,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Paging parameters of listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// Entries per page.
    pub page_size: u32,
    /// Zero-based page index.
    pub page: u32,
    /// Optional text filter.
    pub text_search: Option<String>,
    /// Optional sort property and direction.
    pub sort: Option<(String, SortOrder)>,
}

impl PageLink {
    /// Default page size used when walking all pages.
    pub const DEFAULT_PAGE_SIZE: u32 = 1000;

    /// Creates a link to the first page.
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            page: 0,
            text_search: None,
            sort: None,
        }
    }

    /// Sets the text filter.
    #[must_use]
    pub fn with_text_search(mut self, text: impl Into<String>) -> Self {
        self.text_search = Some(text.into());
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn with_sort(mut self, property: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((property.into(), order));
        self
    }

    /// Returns a link to the following page.
    #[must_use]
    pub fn next_page(&self) -> Self {
        Self {
            page: self.page + 1,
            ..self.clone()
        }
    }

    /// Renders the query string (without leading `?`).
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut query = format!("pageSize={}&page={}", self.page_size, self.page);
        if let Some(text) = self.text_search.as_deref().filter(|t| !t.is_empty()) {
            query.push_str("&textSearch=");
            query.push_str(&urlencoding::encode(text));
        }
        if let Some((property, order)) = &self.sort {
            query.push_str(&format!(
                "&sortProperty={}&sortOrder={}",
                urlencoding::encode(property),
                order.as_str()
            ));
        }
        query
    }
}

impl Default for PageLink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_SIZE)
    }
}

/// Paging parameters with an optional time window, used for alarms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePageLink {
    /// Paging part.
    pub page_link: PageLink,
    /// Window start, ms since epoch.
    pub start_time: Option<i64>,
    /// Window end, ms since epoch.
    pub end_time: Option<i64>,
}

impl TimePageLink {
    /// Page size used by alarm helpers.
    pub const DEFAULT_PAGE_SIZE: u32 = 100;

    /// Creates an unbounded time page link.
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page_link: PageLink::new(page_size),
            start_time: None,
            end_time: None,
        }
    }

    /// Restricts the time window.
    #[must_use]
    pub fn with_window(mut self, start_time: i64, end_time: i64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    /// Renders the query string (without leading `?`).
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut query = self.page_link.to_query();
        if let Some(start) = self.start_time {
            query.push_str(&format!("&startTime={start}"));
        }
        if let Some(end) = self.end_time {
            query.push_str(&format!("&endTime={end}"));
        }
        query
    }
}

impl Default for TimePageLink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_link_query() {
        let link = PageLink::new(50)
            .with_text_search("press line")
            .with_sort("createdTime", SortOrder::Desc);
        assert_eq!(
            link.to_query(),
            "pageSize=50&page=0&textSearch=press%20line&sortProperty=createdTime&sortOrder=DESC"
        );
        assert_eq!(link.next_page().page, 1);
    }

    #[test]
    fn time_page_link_query() {
        assert_eq!(TimePageLink::default().to_query(), "pageSize=100&page=0");
        assert_eq!(
            TimePageLink::new(10).with_window(1, 2).to_query(),
            "pageSize=10&page=0&startTime=1&endTime=2"
        );
    }

    #[test]
    fn page_data_format() {
        let page: PageData<String> = serde_json::from_value(serde_json::json!({
            "data": ["a", "b"],
            "totalPages": 3,
            "totalElements": 5,
            "hasNext": true
        }))
        .unwrap();
        assert_eq!(page.data, ["a", "b"]);
        assert!(page.has_next);
    }
}
