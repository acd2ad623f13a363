//! Page-number pagination over ordered listings.
//!
//! The paginator never sees the items themselves: it resolves the requested
//! page against the total count and hands back the `LIMIT`/`OFFSET` window
//! the store should read.

use serde::Serialize;

/// Default number of items per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// The slice of an ordered result set that makes up one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u32,
}

/// Resolves page numbers for a result set of `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    total: u64,
    per_page: u32,
}

impl Paginator {
    /// `per_page` is clamped to at least one item.
    pub fn new(total: u64, per_page: u32) -> Self {
        Self {
            total,
            per_page: per_page.max(1),
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Number of pages; an empty result set still has one (empty) page.
    pub fn num_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.per_page)).max(1)
    }

    /// Resolve the raw `page` query value to a valid 1-based page number.
    ///
    /// Missing or non-numeric values give the first page, values below one are
    /// clamped to the first page and values past the end to the last one.
    pub fn resolve(&self, raw: Option<&str>) -> u64 {
        let last = self.num_pages();
        let Some(raw) = raw.map(str::trim) else {
            return 1;
        };
        match raw.parse::<i64>() {
            Ok(number) if number < 1 => 1,
            Ok(number) => (number as u64).min(last),
            // Too large for i64 but still a positive whole number.
            Err(_) if is_unsigned_digits(raw) => last,
            Err(_) => 1,
        }
    }

    /// Window for a page number previously produced by [`Paginator::resolve`].
    pub fn window(&self, number: u64) -> PageWindow {
        let number = number.clamp(1, self.num_pages());
        PageWindow {
            offset: (number - 1) * u64::from(self.per_page),
            limit: self.per_page,
        }
    }

    /// Wrap the items read for `number` into a [`Page`].
    pub fn page<T>(&self, number: u64, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: number.clamp(1, self.num_pages()),
            num_pages: self.num_pages(),
            total_count: self.total,
            per_page: self.per_page,
        }
    }
}

/// One page of an ordered listing plus the metadata needed for controls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }

    pub fn previous_page_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_page_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total_count: self.total_count,
            per_page: self.per_page,
        }
    }
}

fn is_unsigned_digits(raw: &str) -> bool {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|byte| byte.is_ascii_digit())
}
