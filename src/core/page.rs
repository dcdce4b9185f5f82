// Row-range projection over a dataset with clamped (start, limit) parameters.
use crate::core::table::{Dataset, Row};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PageRequest {
    pub start: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            start: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Clamps raw parameters: a missing or negative start becomes 0, a missing
    /// or non-positive limit becomes `DEFAULT_LIMIT`, and limits above
    /// `MAX_LIMIT` are capped.
    pub fn new(start: Option<i64>, limit: Option<i64>) -> Self {
        let start = start
            .filter(|start| *start > 0)
            .map(|start| usize::try_from(start).unwrap_or(usize::MAX))
            .unwrap_or(0);
        let limit = match limit {
            Some(limit) if limit > 0 => usize::try_from(limit)
                .unwrap_or(MAX_LIMIT)
                .min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        };
        Self { start, limit }
    }

    /// Same clamping as `new`, for string-encoded query parameters; values
    /// that do not parse as integers count as missing.
    pub fn from_query(start: Option<&str>, limit: Option<&str>) -> Self {
        Self::new(start.and_then(parse_int), limit.and_then(parse_int))
    }
}

fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

#[derive(Debug, PartialEq)]
pub struct Page<'a> {
    pub rows: &'a [Row],
    pub total: usize,
    pub start: usize,
    pub limit: usize,
}

impl Page<'_> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exclusive end index of the returned range.
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.rows.len())
    }
}

pub fn page(dataset: &Dataset, request: PageRequest) -> Page<'_> {
    let all = dataset.rows();
    let total = all.len();
    let start = request.start.min(total);
    let end = request.start.saturating_add(request.limit).min(total);
    Page {
        rows: &all[start..end],
        total,
        start: request.start,
        limit: request.limit,
    }
}
