//! Request handlers for the query service.

pub(crate) mod cameras;
pub(crate) mod middleware;
mod prelude;
