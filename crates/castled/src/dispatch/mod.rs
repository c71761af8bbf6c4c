//! Request dispatch for inbound bus messages.
//!
//! The dispatcher turns each message arriving on the request topic into at
//! most one outbound envelope on the response topic:
//!
//! ```json
//! {"id":"req-1","payload":{"action":"get_clipboard","params":{}}}
//! ```
//!
//! A request that names a registered operation and completes produces a
//! `response` envelope carrying the operation's result map. A request that is
//! well-formed but cannot be served (no action, unknown action, failing
//! operation) produces an `error` envelope. Both are correlated through
//! `payload.requestId`. Messages that are not decodable JSON objects with a
//! string `id` cannot be correlated and are dropped after logging.

mod dispatcher;
mod errors;
mod request;

pub use self::dispatcher::{DispatchOutcome, Dispatcher};
pub use self::errors::{DecodeError, DispatchError};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
