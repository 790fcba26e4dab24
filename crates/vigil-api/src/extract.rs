//! `Path` and `Query` wrappers whose rejections render as [`ApiError`], so
//! a malformed id or query string still gets the JSON envelope.

use axum::extract::{FromRequestParts, Path, Query};

use crate::error::ApiError;

#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
