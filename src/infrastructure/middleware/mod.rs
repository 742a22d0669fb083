// Request identity: middleware that builds the viewer and the handler extractor

pub mod viewer_context_extractor;
pub mod viewer_context_middleware;

pub use viewer_context_extractor::Vc;
pub use viewer_context_middleware::{viewer_context_middleware, ViewerContext};
