//! Panic recovery middleware.
//!
//! Innermost stage. Handler panics are caught here and converted into
//! ordinary [`Failure::Panic`] values, so every outer stage observes a
//! panicking handler exactly like a failing one: the error-response stage
//! writes the standard 500 body and the logger records the outcome.
//!
//! The backtrace is captured by a panic hook at the moment of the panic,
//! so it points at the panicking frame rather than at the recovery code.
//! Hooks chain: whatever hook was installed before stays active.

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{PipelineResult, Request};
use futures_util::FutureExt;
use portico_core::context::RequestContext;
use portico_core::error::{Error, Failure, PanicError};
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|cell| {
                *cell.borrow_mut() = Some(Backtrace::force_capture().to_string());
            });
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|cell| cell.borrow_mut().take())
        .unwrap_or_default()
}

/// Renders the panic payload: `&str` and `String` payloads verbatim,
/// anything else as a placeholder.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Middleware that converts panics into failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    /// Creates the recovery middleware and installs the backtrace hook.
    #[must_use]
    pub fn new() -> Self {
        install_panic_hook();
        Self
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            match AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    // A payload that is already a classified error is kept
                    // as-is, so `panic_any(Error::...)` keeps its status and
                    // code through classification.
                    let error = match payload.downcast_ref::<Error>() {
                        Some(error) => error.clone(),
                        None => {
                            let message = panic_message(payload.as_ref());
                            Error::internal_server().with_param("reason", &message)
                        }
                    };
                    Err(Failure::Panic(PanicError::new(error, take_backtrace())))
                }
            }
        })
    }
}
