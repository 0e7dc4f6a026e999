//! REST API client module for Galaxy Digital.
//!
//! This module provides the `ApiClient` for fetching volunteers, hours and
//! opportunities. Requests authenticate with a bearer token obtained from
//! `users/login`, are cached per request, and list endpoints are walked with
//! `since_id` pagination.

pub mod client;
pub mod error;
pub mod pagination;
pub mod retry;

pub use client::{ApiClient, DateRange, DEFAULT_BASE_URL};
pub use error::ApiError;
pub use pagination::{Collected, FetchLimit, PAGE_SIZE};
pub use retry::RetryPolicy;
