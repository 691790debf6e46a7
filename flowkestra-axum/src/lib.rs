//! Axum integration for the flowkestra flow engine.
//!
//! Mount the routes returned by [`FlowkestraAxumExt::axum_router`] into your
//! application; the engine is pulled out of the router state through
//! [`FromRef`].

pub use flowkestra_core::ErrorResponse;
pub use flowkestra_flow::FlowEngine;
use axum::extract::FromRef;

pub mod helpers;

pub use helpers::*;

/// Ready-made router state holding only the engine.
#[derive(Clone)]
pub struct FlowkestraState {
    pub engine: FlowEngine,
}

impl From<FlowEngine> for FlowkestraState {
    fn from(engine: FlowEngine) -> Self {
        Self { engine }
    }
}

impl FromRef<FlowkestraState> for FlowEngine {
    fn from_ref(state: &FlowkestraState) -> Self {
        state.engine.clone()
    }
}

pub trait FlowkestraAxumExt {
    /// Routes for `POST /flow/execute` and `GET /flow/callback`.
    fn axum_router<AppState>(&self) -> axum::Router<AppState>
    where
        AppState: Clone + Send + Sync + 'static,
        FlowEngine: FromRef<AppState>;
}

impl FlowkestraAxumExt for FlowEngine {
    fn axum_router<AppState>(&self) -> axum::Router<AppState>
    where
        AppState: Clone + Send + Sync + 'static,
        FlowEngine: FromRef<AppState>,
    {
        use axum::routing::{get, post};
        axum::Router::new()
            .route(
                "/flow/execute",
                post(helpers::axum_execute_handler::<AppState>),
            )
            .route(
                "/flow/callback",
                get(helpers::axum_callback_handler::<AppState>),
            )
    }
}
