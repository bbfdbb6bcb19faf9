//! Catalog search with dual-strategy querying and cursor bookkeeping.
//!
//! A free-text query is ambiguous upstream: it can be a literal name search
//! or a tag. The aggregator runs both interpretations, merges the results,
//! and keeps whichever pagination cursor belongs to the richer strategy.
//! Creator-scoped searches instead walk pages greedily up to hard caps,
//! because the API cannot filter a creator's output server-side the way the
//! browse views can.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, instrument, warn};
use url::Url;

use crate::api::types::{Model, SearchPage, TagPage};
use crate::api::{ApiError, CatalogClient, parse_model_url};
use crate::filter::content::{ContentLevel, matches_content_levels};
use crate::filter::preview::has_displayable_preview;
use crate::filter::refine::{apply_extra_filters, matches_query};

/// Literal-strategy result counts below this switch the page to tag results.
const DUAL_STRATEGY_THRESHOLD: usize = 5;
/// Page size for browse searches.
const PAGE_LIMIT: u32 = 20;
/// Page size for creator-scoped searches.
const CREATOR_PAGE_LIMIT: u32 = 100;
/// Greedy creator walk stops after this many pages.
const CREATOR_PAGE_CAP: usize = 50;
/// Greedy creator walk stops after accumulating this many raw items.
const CREATOR_ITEM_CAP: usize = 5000;
/// Tag-resolution lookups ask for the top few candidates.
const TAG_LOOKUP_LIMIT: u32 = 5;

/// Everything a search request depends on. Cloned into the resulting state
/// so follow-up pages re-apply the same filters.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub query: String,
    /// Model type filter; `None` means all types.
    pub model_type: Option<String>,
    pub sort: Option<String>,
    pub period: Option<String>,
    pub creator: Option<String>,
    /// Raw comma/newline-separated literal tag requirements.
    pub tag_filter: String,
    pub tag_categories: Vec<String>,
    /// Base-model filter; `None` or `"Any"` means any.
    pub base_model: Option<String>,
    /// Content-level selection; empty means all levels.
    pub content_levels: Vec<ContentLevel>,
}

/// The result set plus enough bookkeeping to page and refine it.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    /// Currently visible items (after any local refinement).
    pub items: Vec<Model>,
    /// Every item fetched so far, before keyword refinement.
    pub all_items: Vec<Model>,
    /// Cursor for the next page, absolute URL. `None` when exhausted.
    pub next_page: Option<String>,
    /// URL of the first page, kept so the view can jump back.
    pub first_page: Option<String>,
    pub filters: SearchFilters,
    pub selected_index: Option<usize>,
}

impl SearchState {
    /// The selected item, when the index is in bounds.
    #[must_use]
    pub fn selected(&self) -> Option<&Model> {
        self.selected_index.and_then(|i| self.items.get(i))
    }
}

/// Issues catalog searches through a shared [`CatalogClient`].
///
/// Holds a per-process tag-resolution cache so repeated queries for the same
/// text cost one tag lookup total.
#[derive(Debug)]
pub struct SearchAggregator {
    client: Arc<CatalogClient>,
    tag_cache: Mutex<std::collections::HashMap<String, String>>,
}

impl SearchAggregator {
    #[must_use]
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self {
            client,
            tag_cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Runs a search and builds a fresh state.
    ///
    /// Creator-scoped searches walk pages greedily (capped); otherwise the
    /// query runs as both a literal search and a resolved-tag search and the
    /// results are merged.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ApiError`] when every strategy fails; a
    /// partially failed merge degrades instead of erroring.
    #[instrument(skip(self, api_key), fields(query = %filters.query))]
    pub async fn search(
        &self,
        filters: SearchFilters,
        api_key: &str,
    ) -> Result<SearchState, ApiError> {
        if filters.creator.as_deref().is_some_and(|c| !c.trim().is_empty()) {
            return self.search_creator(filters, api_key).await;
        }

        let query = filters.query.trim().to_string();
        let literal_url = build_search_url(self.client.config().api_base.as_str(), &filters, None);

        if query.is_empty() {
            let page = self.client.get_json::<SearchPage>(&literal_url, api_key).await?;
            return Ok(state_from_items(page.items, page.metadata.next_page, literal_url, filters));
        }

        let tag = self.resolve_tag(&query, api_key).await;
        let tag_url = build_search_url(
            self.client.config().api_base.as_str(),
            &filters,
            Some(tag.as_str()),
        );

        let literal_page = self.fetch_page(&literal_url, api_key).await;
        let tag_page = self.fetch_page(&tag_url, api_key).await;
        let (literal_page, tag_page) = match (literal_page, tag_page) {
            (Err(e), Err(_)) => return Err(e),
            (l, t) => (
                l.unwrap_or_else(|_| SearchPage::default()),
                t.unwrap_or_else(|_| SearchPage::default()),
            ),
        };

        // A thin literal result means the text was really a tag.
        if literal_page.items.len() < DUAL_STRATEGY_THRESHOLD && !tag_page.items.is_empty() {
            debug!(
                literal = literal_page.items.len(),
                tag = tag_page.items.len(),
                "literal results below threshold, using tag strategy"
            );
            return Ok(state_from_items(
                tag_page.items,
                tag_page.metadata.next_page,
                tag_url,
                filters,
            ));
        }

        // Merge: literal order first, tag items appended, ids deduplicated.
        let mut seen: HashSet<i64> = HashSet::new();
        let mut merged = Vec::new();
        for item in literal_page.items.into_iter().chain(tag_page.items) {
            match item.id {
                Some(id) if !seen.insert(id) => {}
                _ => merged.push(item),
            }
        }

        // The richer strategy's cursor wins; ties keep the literal one.
        let literal_total = literal_page.metadata.total_items.unwrap_or(0);
        let tag_total = tag_page.metadata.total_items.unwrap_or(0);
        let (next, first) = if tag_total > literal_total {
            (tag_page.metadata.next_page, tag_url)
        } else {
            (literal_page.metadata.next_page, literal_url)
        };

        Ok(state_from_items(merged, next, first, filters))
    }

    /// Greedy creator walk: follow `nextPage` until the cursor runs out or a
    /// cap trips, filtering and deduplicating as pages arrive.
    #[instrument(skip(self, api_key), fields(creator = filters.creator.as_deref().unwrap_or("")))]
    async fn search_creator(
        &self,
        filters: SearchFilters,
        api_key: &str,
    ) -> Result<SearchState, ApiError> {
        let first_url = build_search_url(self.client.config().api_base.as_str(), &filters, None);
        let mut url = first_url.clone();
        let mut seen: HashSet<i64> = HashSet::new();
        let mut collected = Vec::new();
        let mut raw_count = 0usize;

        for page_no in 0..CREATOR_PAGE_CAP {
            let page = match self.fetch_page(&url, api_key).await {
                Ok(page) => page,
                Err(e) if page_no == 0 => return Err(e),
                Err(_) => SearchPage::default(),
            };
            raw_count += page.items.len();

            for item in page.items {
                if let Some(id) = item.id {
                    if !seen.insert(id) {
                        continue;
                    }
                }
                if is_visible(&item, &filters.content_levels) {
                    collected.push(item);
                }
            }

            match page.metadata.next_page {
                Some(next) if raw_count < CREATOR_ITEM_CAP => url = next,
                _ => break,
            }
        }

        debug!(kept = collected.len(), raw = raw_count, "creator walk finished");
        // The whole creator output is already in memory; no cursor remains.
        let mut state = state_from_items(collected, None, first_url, filters);
        state.next_page = None;
        Ok(state)
    }

    /// Follows the stored next-page cursor, appending filtered new items.
    /// No-op when the state has no cursor.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ApiError`] when the page fetch fails; the
    /// state is left untouched in that case.
    #[instrument(skip(self, state, api_key))]
    pub async fn next_page(&self, state: &mut SearchState, api_key: &str) -> Result<(), ApiError> {
        let Some(url) = state.next_page.clone() else {
            return Ok(());
        };
        let page = self.client.get_json::<SearchPage>(&url, api_key).await?;

        let mut seen: HashSet<i64> =
            state.all_items.iter().filter_map(|m| m.id).collect();
        for item in page.items {
            if let Some(id) = item.id {
                if !seen.insert(id) {
                    continue;
                }
            }
            if is_visible(&item, &state.filters.content_levels) {
                state.all_items.push(item);
            }
        }

        state.next_page = page.metadata.next_page;
        state.items = apply_state_filters(&state.all_items, &state.filters);
        state.selected_index = None;
        Ok(())
    }

    /// Refetches the first page, resetting the accumulated result set.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`ApiError`] when the fetch fails.
    #[instrument(skip(self, state, api_key))]
    pub async fn first_page(&self, state: &mut SearchState, api_key: &str) -> Result<(), ApiError> {
        let Some(url) = state.first_page.clone() else {
            return Ok(());
        };
        let page = self.client.get_json::<SearchPage>(&url, api_key).await?;
        let filters = state.filters.clone();
        *state = state_from_items(page.items, page.metadata.next_page, url, filters);
        Ok(())
    }

    /// Narrows the visible items by a keyword, purely locally. An empty
    /// needle restores the full fetched set.
    pub fn refine(&self, state: &mut SearchState, needle: &str) {
        let base = apply_state_filters(&state.all_items, &state.filters);
        let needle = needle.trim().to_lowercase();
        state.items = if needle.is_empty() {
            base
        } else {
            base.into_iter().filter(|m| matches_query(m, &needle)).collect()
        };
        state.selected_index = None;
    }

    /// Loads a single model from a pasted catalog URL into a fresh state.
    ///
    /// # Errors
    ///
    /// [`ApiError::BlockedUrl`] when the text is not a model-page URL,
    /// otherwise whatever the model fetch returns.
    #[instrument(skip(self, api_key))]
    pub async fn load_by_url(&self, url: &str, api_key: &str) -> Result<SearchState, ApiError> {
        let Some((model_id, _version_id)) = parse_model_url(url) else {
            return Err(ApiError::blocked(url));
        };
        let model = self.client.fetch_model_by_id(model_id, api_key).await?;
        Ok(SearchState {
            items: vec![model.clone()],
            all_items: vec![model],
            next_page: None,
            first_page: None,
            filters: SearchFilters::default(),
            selected_index: Some(0),
        })
    }

    /// Resolves free text to the best-matching tag name, caching the answer.
    /// Falls back to the raw text when the lookup fails or returns nothing.
    async fn resolve_tag(&self, query: &str, api_key: &str) -> String {
        let key = query.to_lowercase();
        if let Some(hit) = self
            .tag_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return hit.clone();
        }

        let mut url = match Url::parse(&format!("{}/tags", self.client.config().api_base)) {
            Ok(url) => url,
            Err(_) => return query.to_string(),
        };
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("limit", &TAG_LOOKUP_LIMIT.to_string());

        let resolved = match self.client.get_json::<TagPage>(url.as_str(), api_key).await {
            Ok(page) => page
                .items
                .into_iter()
                .max_by_key(|t| t.model_count)
                .and_then(|t| t.name)
                .unwrap_or_else(|| query.to_string()),
            Err(e) => {
                warn!(error = %e, "tag resolution failed, using raw query");
                query.to_string()
            }
        };

        self.tag_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, resolved.clone());
        resolved
    }

    /// Fetches one search page, logging and propagating errors to the caller
    /// for strategy-level handling.
    async fn fetch_page(&self, url: &str, api_key: &str) -> Result<SearchPage, ApiError> {
        match self.client.get_json::<SearchPage>(url, api_key).await {
            Ok(page) => Ok(page),
            Err(e) => {
                warn!(url, error = %e, "search page fetch failed");
                Err(e)
            }
        }
    }

}

/// Visible means the content-level filter passes and the card has something
/// to show.
fn is_visible(model: &Model, levels: &[ContentLevel]) -> bool {
    matches_content_levels(model, levels) && has_displayable_preview(model, levels)
}

/// Assembles a state from freshly fetched items, applying the visibility
/// and local filters.
fn state_from_items(
    items: Vec<Model>,
    next_page: Option<String>,
    first_page: String,
    filters: SearchFilters,
) -> SearchState {
    let all_items: Vec<Model> = items
        .into_iter()
        .filter(|m| is_visible(m, &filters.content_levels))
        .collect();
    let visible = apply_state_filters(&all_items, &filters);
    SearchState {
        items: visible,
        all_items,
        next_page,
        first_page: Some(first_page),
        filters,
        selected_index: None,
    }
}

fn apply_state_filters(items: &[Model], filters: &SearchFilters) -> Vec<Model> {
    apply_extra_filters(
        items,
        &filters.tag_categories,
        &filters.tag_filter,
        filters.base_model.as_deref(),
    )
}

/// Builds a search URL for the filters; `tag` switches the request to the
/// tag strategy instead of the literal query.
fn build_search_url(api_base: &str, filters: &SearchFilters, tag: Option<&str>) -> String {
    let mut url = match Url::parse(&format!("{api_base}/models")) {
        Ok(url) => url,
        // The api_base is validated at config time; a parse failure here
        // still yields a string the client's URL guard will reject loudly.
        Err(_) => return format!("{api_base}/models"),
    };

    let creator = filters.creator.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let limit = if creator.is_some() { CREATOR_PAGE_LIMIT } else { PAGE_LIMIT };

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("limit", &limit.to_string());
        if let Some(sort) = filters.sort.as_deref().filter(|s| !s.is_empty()) {
            pairs.append_pair("sort", sort);
        }
        if let Some(period) = filters.period.as_deref().filter(|p| !p.is_empty()) {
            pairs.append_pair("period", period);
        }
        let wants_mature = filters
            .content_levels
            .iter()
            .any(|l| *l > ContentLevel::Pg);
        if creator.is_some() || wants_mature {
            pairs.append_pair("nsfw", "true");
        }
        if let Some(kind) = filters.model_type.as_deref().filter(|t| !t.is_empty() && *t != "All") {
            pairs.append_pair("types", kind);
        }
        if let Some(creator) = creator {
            pairs.append_pair("username", creator);
        }
        if let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) {
            pairs.append_pair("tag", tag);
        } else {
            let query = filters.query.trim();
            if !query.is_empty() {
                pairs.append_pair("query", query);
            }
        }
    }

    url.to_string()
}
