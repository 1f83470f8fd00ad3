pub mod request_ctx;
pub mod request_flow;

pub use request_ctx::{Operation, RequestCtx};
pub use request_flow::{FlowOutput, RequestFlow, RequestState};
