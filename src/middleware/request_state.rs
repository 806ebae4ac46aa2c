//! Per-request instrumentation state.
//!
//! The state lives in a tokio task-local cell that the hook middleware
//! opens around each request, so requests served concurrently, on one
//! worker thread or many, never see each other's tags or start time.
//! Code running outside such a scope simply observes "no state".

use std::cell::RefCell;
use std::future::Future;
use std::time::Instant;

tokio::task_local! {
    static REQUEST_STATE: RefCell<RequestState>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState {
    /// `None` until the before-request hook runs.
    pub start_time: Option<Instant>,
    /// `"name:value"` tags in insertion order. Duplicates are kept.
    pub tags: Vec<String>,
}

impl RequestState {
    pub fn started_now() -> Self {
        Self {
            start_time: Some(Instant::now()),
            tags: Vec::new(),
        }
    }
}

/// Run `fut` with a fresh, empty request state.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    REQUEST_STATE
        .scope(RefCell::new(RequestState::default()), fut)
        .await
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<R>(f: impl FnOnce() -> R) -> R {
    REQUEST_STATE.sync_scope(RefCell::new(RequestState::default()), f)
}

/// Replace the current state. Returns `false` outside a request scope.
pub(crate) fn replace(state: RequestState) -> bool {
    REQUEST_STATE
        .try_with(|cell| {
            *cell.borrow_mut() = state;
        })
        .is_ok()
}

/// Remove and return the current state, leaving an empty one behind.
pub(crate) fn take() -> Option<RequestState> {
    REQUEST_STATE.try_with(|cell| cell.take()).ok()
}

/// Append tags and return the full list, or `None` outside a scope.
pub(crate) fn append_tags(tags: &[String]) -> Option<Vec<String>> {
    REQUEST_STATE
        .try_with(|cell| {
            let mut state = cell.borrow_mut();
            state.tags.extend_from_slice(tags);
            state.tags.clone()
        })
        .ok()
}

pub(crate) fn tags() -> Vec<String> {
    REQUEST_STATE
        .try_with(|cell| cell.borrow().tags.clone())
        .unwrap_or_default()
}
