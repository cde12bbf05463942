//! # Repositories
//!
//! Repository layer encapsulating SeaORM operations per table. Handlers and
//! pipeline services go through these types rather than touching entities
//! directly, keeping query shape and status bookkeeping in one place.

pub mod api_endpoint;
pub mod api_registration;
pub mod build_record;
pub mod deployment;
pub mod generation_job;

pub use api_endpoint::ApiEndpointRepository;
pub use api_registration::ApiRegistrationRepository;
pub use build_record::BuildRecordRepository;
pub use deployment::DeploymentRepository;
pub use generation_job::GenerationJobRepository;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Pagination query parameters. Pages are 1-based.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams, ToSchema)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl PageParams {
    pub fn page(&self) -> u64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    pub fn size(&self) -> u64 {
        self.size
            .filter(|s| *s >= 1)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> u64 {
        (self.page() - 1) * self.size()
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: None,
            size: None,
        }
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PageParams) -> Self {
        let size = params.size();
        Self {
            items,
            total,
            page: params.page(),
            size,
            pages: total.div_ceil(size),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
            pages: self.pages,
        }
    }
}
