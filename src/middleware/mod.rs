pub mod hooks;
pub mod request_state;

pub use hooks::{AfterRequest, BeforeRequest, HookChain, LifecycleHooks};
pub use request_state::RequestState;
