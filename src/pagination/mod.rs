//! Paged presentation of scrape results and the navigation state behind it

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use tracing::debug;

use crate::cache::{Clock, TtlCache};
use crate::models::{ScrapeOutcome, ScrapeResult};

pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Above this many pages the controls switch from buttons to a select menu
pub const MAX_BUTTON_PAGES: usize = 3;

pub const SELECT_MENU_ID: &str = "select_page";
const BUTTON_ID_PREFIX: &str = "page_";

/// Identity of a rendered surface (a posted message, a terminal view...)
pub type SurfaceId = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no paged view is bound to surface {0}")]
    UnknownSurface(SurfaceId),
    #[error("page {requested} requested but only {page_count} pages exist")]
    PageOutOfRange { requested: usize, page_count: usize },
    #[error("malformed navigation event: {0}")]
    Malformed(String),
}

/// Splits `items` into consecutive pages of `size`; the last page may be shorter.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageButton {
    pub custom_id: String,
    pub label: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub description: String,
    pub value: String,
}

/// Control surface shown under a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Controls {
    Buttons(Vec<PageButton>),
    Menu {
        custom_id: String,
        placeholder: String,
        options: Vec<MenuOption>,
    },
}

impl Controls {
    /// Buttons for up to [`MAX_BUTTON_PAGES`] pages, a select menu beyond that.
    ///
    /// Every control addresses a page in `0..page_count`.
    pub fn for_pages(current: usize, page_count: usize) -> Self {
        if page_count <= MAX_BUTTON_PAGES {
            Self::Buttons(
                (0..page_count)
                    .map(|i| PageButton {
                        custom_id: format!("{BUTTON_ID_PREFIX}{i}"),
                        label: (i + 1).to_string(),
                        active: i == current,
                    })
                    .collect(),
            )
        } else {
            Self::Menu {
                custom_id: SELECT_MENU_ID.to_string(),
                placeholder: format!("Select Page (1-{page_count})"),
                options: (0..page_count)
                    .map(|i| MenuOption {
                        label: format!("Page {}", i + 1),
                        description: format!("View page {} of product status", i + 1),
                        value: i.to_string(),
                    })
                    .collect(),
            }
        }
    }
}

/// Navigation raised by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    /// A page button was pressed
    Button { custom_id: String },
    /// An entry was chosen from the page menu
    Select { custom_id: String, values: Vec<String> },
}

impl NavigationEvent {
    /// Page index carried by the event.
    pub fn page_index(&self) -> Result<usize, NavigationError> {
        let raw = match self {
            Self::Button { custom_id } => custom_id
                .strip_prefix(BUTTON_ID_PREFIX)
                .ok_or_else(|| NavigationError::Malformed(custom_id.clone()))?,
            Self::Select { custom_id, values } => {
                if custom_id != SELECT_MENU_ID {
                    return Err(NavigationError::Malformed(custom_id.clone()));
                }
                values
                    .first()
                    .ok_or_else(|| NavigationError::Malformed("empty selection".to_string()))?
            }
        };
        raw.parse()
            .map_err(|_| NavigationError::Malformed(raw.to_string()))
    }
}

/// Text of one page plus the controls to show under it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub content: String,
    pub controls: Controls,
}

fn render_result(result: &ScrapeResult) -> String {
    match &result.outcome {
        ScrapeOutcome::Failure { error } => format!(
            "[{}] 🚫 **{}** - Error: {}\n{}",
            result.id, result.name, error, result.url
        ),
        ScrapeOutcome::Success { price, stock, .. } => {
            let status = if result.is_out_of_stock() { "🔴" } else { "🟢" };
            format!(
                "[{}] {} **{}**\nPrice: `{}`\nStock: `{}`\n{}",
                result.id, status, result.name, price, stock, result.url
            )
        }
    }
}

/// Status summary for page `index` (zero-based) of `page_count`.
pub fn render_page(items: &[ScrapeResult], index: usize, page_count: usize) -> String {
    let lines: Vec<String> = items.iter().map(render_result).collect();
    format!(
        "📊 **Product Status Summary (Page {}/{})**\n\n{}",
        index + 1,
        page_count,
        lines.join("\n\n")
    )
}

/// Pages of one result list and the page currently shown
#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pages: Vec<Vec<ScrapeResult>>,
    current: usize,
}

impl PageView {
    /// `None` when there is nothing to page through.
    pub fn new(results: &[ScrapeResult], page_size: usize) -> Option<Self> {
        let pages = chunk(results, page_size);
        if pages.is_empty() {
            return None;
        }
        Some(Self { pages, current: 0 })
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn render(&self) -> RenderedPage {
        RenderedPage {
            content: render_page(&self.pages[self.current], self.current, self.pages.len()),
            controls: Controls::for_pages(self.current, self.pages.len()),
        }
    }

    pub fn go_to(&mut self, index: usize) -> Result<RenderedPage, NavigationError> {
        if index >= self.pages.len() {
            return Err(NavigationError::PageOutOfRange {
                requested: index,
                page_count: self.pages.len(),
            });
        }
        self.current = index;
        Ok(self.render())
    }
}

/// Page views keyed by the surface showing them.
///
/// Views are never closed explicitly; they expire once their surface has not
/// been navigated for the TTL and are reaped by [`PageViewRegistry::sweep`].
pub struct PageViewRegistry {
    views: TtlCache<SurfaceId, PageView>,
}

impl PageViewRegistry {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            views: TtlCache::new(ttl, clock),
        }
    }

    /// Binds `view` to `surface` and renders its first page.
    pub fn open(&mut self, surface: SurfaceId, view: PageView) -> RenderedPage {
        let page = view.render();
        self.views.insert(surface, view);
        page
    }

    pub fn current(&self, surface: SurfaceId) -> Option<&PageView> {
        self.views.get(&surface)
    }

    pub fn navigate(
        &mut self,
        surface: SurfaceId,
        event: &NavigationEvent,
    ) -> Result<RenderedPage, NavigationError> {
        let index = event.page_index()?;
        let page_count = self
            .views
            .get(&surface)
            .ok_or(NavigationError::UnknownSurface(surface))?
            .page_count();
        if index >= page_count {
            return Err(NavigationError::PageOutOfRange {
                requested: index,
                page_count,
            });
        }

        // only a valid move restarts the view's lifetime
        let view = self
            .views
            .get_mut(&surface)
            .ok_or(NavigationError::UnknownSurface(surface))?;
        debug!("Surface {} moving to page {}", surface, index + 1);
        view.go_to(index)
    }

    /// Forgets views whose surface has gone quiet.
    pub fn sweep(&mut self) -> usize {
        self.views.sweep()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
