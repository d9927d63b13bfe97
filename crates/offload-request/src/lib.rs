//! The submission-side state machine: [`WorkRequest`]'s lifecycle,
//! the [`ResultHandler`] extension point, and the loop that drives a
//! request's result pipe to a final value.

mod handler;
mod request;

pub use handler::FlatteningHandler;
pub use handler::Handler;
pub use handler::ResultHandler;
pub use handler::run_handler;
pub use request::RequestState;
pub use request::WorkRequest;
