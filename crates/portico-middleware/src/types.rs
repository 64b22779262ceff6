//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use portico_core::error::Failure;

/// The HTTP request type used in the middleware pipeline.
///
/// The body is fully buffered before the pipeline runs, so stages such as
/// the debug dump can inspect it without consuming anything.
pub type Request = http::Request<Bytes>;

/// The outcome of a stage or handler.
///
/// `Ok(())` means the response has been (or will be) written through the
/// context's writer. `Err` carries a [`Failure`] for the error-response
/// stage to classify and emit.
pub type PipelineResult = Result<(), Failure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_is_inspectable() {
        let request: Request = http::Request::builder()
            .uri("/test")
            .body(Bytes::from_static(b"{\"a\":1}"))
            .unwrap();
        assert_eq!(&request.body()[..], b"{\"a\":1}");
    }
}
