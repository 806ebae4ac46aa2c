use axum::{
    extract::{Request, State},
    middleware::{self as axum_mw, Next},
    response::Response,
    Router,
};
use std::sync::Arc;

use super::request_state;

/// Runs before the handler, with the incoming request.
pub type BeforeRequest = Arc<dyn Fn(&Request) + Send + Sync>;

/// Runs after the handler, with the outgoing response; returns the
/// response to send on.
pub type AfterRequest = Arc<dyn Fn(Response) -> Response + Send + Sync>;

/// The two registration points a host framework offers for request
/// lifecycle callbacks.
pub trait LifecycleHooks {
    fn before_request(&mut self, hook: BeforeRequest);
    fn after_request(&mut self, hook: AfterRequest);
}

/// Lifecycle hooks for an axum [`Router`].
///
/// All hooks run inside a single middleware layer that also opens the
/// per-request state scope, so state written by a before hook is visible
/// to the handler and to the after hooks of the same request only.
///
/// Before hooks run in registration order; after hooks in reverse.
#[derive(Clone, Default)]
pub struct HookChain {
    before: Vec<BeforeRequest>,
    after: Vec<AfterRequest>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the chain on every route of `router`.
    pub fn attach<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum_mw::from_fn_with_state(Arc::new(self), run_hooks))
    }
}

impl LifecycleHooks for HookChain {
    fn before_request(&mut self, hook: BeforeRequest) {
        self.before.push(hook);
    }

    fn after_request(&mut self, hook: AfterRequest) {
        self.after.push(hook);
    }
}

async fn run_hooks(State(chain): State<Arc<HookChain>>, req: Request, next: Next) -> Response {
    request_state::scope(async move {
        for hook in &chain.before {
            hook(&req);
        }

        let mut response = next.run(req).await;

        for hook in chain.after.iter().rev() {
            response = hook(response);
        }
        response
    })
    .await
}
