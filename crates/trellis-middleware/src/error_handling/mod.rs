//! Error handling middleware for transforming errors into responses.
//!
//! Handlers and middleware signal failure by returning an [`HttpError`].
//! [`ErrorHandling`] then decides what the client sees, and [`thrown`] lets
//! outer middleware recover the original error. Panics are converted with
//! [`catch_panic`] and tower errors with [`handle_error`].

mod handler;
mod http_error;
mod panic;

pub use handler::{ErrorHandling, OnError};
pub use http_error::{HttpError, Thrown, thrown};
pub(crate) use panic::panic_message;
pub use panic::{catch_panic, handle_error};
