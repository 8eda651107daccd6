use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// 1-based pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_no: u64,
    pub page_size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_no: 1,
            page_size: 20,
        }
    }
}

impl PageRequest {
    pub fn new(page_no: u64, page_size: u64) -> Self {
        Self { page_no, page_size }
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.page_no == 0 {
            return Err(DataError::InvalidQuery("page_no starts at 1".into()));
        }
        if self.page_size == 0 {
            return Err(DataError::InvalidQuery("page_size must be positive".into()));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        self.page_no.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// A page of results with pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page_no: u64,
    pub page_size: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_count: u64) -> Self {
        Self {
            items,
            total_count,
            page_no: request.page_no,
            page_size: request.page_size,
        }
    }

    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            0
        } else {
            self.total_count.div_ceil(self.page_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_no: self.page_no,
            page_size: self.page_size,
        }
    }
}
