//! `{data, meta}` response envelope used by the generated routes.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Envelope<T, M = ()> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<M>,
}

/// Pagination block of list responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub count: u64,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

pub type Reply<T, M = ()> = (StatusCode, Json<Envelope<T, M>>);

fn reply<T: Serialize, M: Serialize>(status: StatusCode, data: T, meta: Option<M>) -> Reply<T, M> {
    (status, Json(Envelope { data, meta }))
}

/// 201 with the stored document.
pub fn created<T: Serialize>(data: T) -> Reply<T> {
    reply(StatusCode::CREATED, data, None)
}

pub fn ok<T: Serialize>(data: T) -> Reply<T> {
    reply(StatusCode::OK, data, None)
}

/// One page of `total` matches starting at `offset`.
pub fn page<T: Serialize>(data: Vec<T>, total: u64, offset: u64, limit: u64) -> Reply<Vec<T>, PageMeta> {
    let meta = PageMeta {
        count: data.len() as u64,
        total,
        offset,
        limit,
    };
    reply(StatusCode::OK, data, Some(meta))
}
