//! Request ID middleware helpers for Tower-compatible stacks.
//!
//! # Design
//! - Provides dedicated layers for generating and propagating `x-request-id`.
//! - Keeps layer construction separate from logging initialisation.

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Factory for the `x-request-id` generator layer.
#[must_use]
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// Layer that copies the request's `x-request-id` onto the response.
#[must_use]
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
