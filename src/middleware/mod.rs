pub mod branch;
pub mod cors;
pub mod pipeline;
pub mod request_logging;
pub mod rewrite;

pub use branch::{is_authorized, ConditionalBranch, Guard};
pub use cors::CorsConfig;
pub use pipeline::{Handler, HandlerOutcome, Pipeline, PipelineBuilder};
pub use request_logging::{request_logging, RequestId};
pub use rewrite::{PathAppendUid, PathStripPrefix, QueryInject};
