pub mod error;
pub mod model;
pub mod routes;
pub mod server;
pub mod state;

pub use error::*;
pub use model::*;
pub use routes::*;
pub use server::*;
pub use state::*;

#[cfg(test)]
mod tests {
    use super::{
        router, run_web_server, web_event_name, AllowedTransitionsResponse, AppState, ErrorBody,
        HistoryResponse, JobListResponse, JobView, TransitionRequestBody, TransitionResponse,
        WebError,
    };
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_types() {
        let _ = TypeId::of::<WebError>();
        let _ = TypeId::of::<ErrorBody>();
        let _ = TypeId::of::<AppState>();
        let _ = TypeId::of::<JobView>();
        let _ = TypeId::of::<JobListResponse>();
        let _ = TypeId::of::<TransitionRequestBody>();
        let _ = TypeId::of::<TransitionResponse>();
        let _ = TypeId::of::<AllowedTransitionsResponse>();
        let _ = TypeId::of::<HistoryResponse>();
    }

    #[test]
    fn crate_root_reexports_helpers_and_handlers() {
        let _event_name = web_event_name;
        let _router: fn(AppState) -> axum::Router = router;
        let _run_server = run_web_server;
    }
}
