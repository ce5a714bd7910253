//! API request handlers

pub mod health;
pub mod hosts;
pub mod interfaces;
pub mod links;
pub mod networks;
pub mod sync;

use std::sync::Arc;

use serde::Deserialize;
use utoipa::IntoParams;

use crate::lease::LeaseService;
use crate::storage::{PageRequest, Repositories};
use crate::sync::SyncAssembler;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub leases: Arc<LeaseService>,
    pub assembler: Arc<SyncAssembler>,
}

/// Pagination query parameters accepted by list endpoints
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
pub struct ListQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (at most 500)
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl From<ListQuery> for PageRequest {
    fn from(query: ListQuery) -> Self {
        PageRequest::new(query.page, query.per_page.min(500))
    }
}
