//! Shared HTTP constants (headers, problem URIs).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

pub(crate) const PROBLEM_INTERNAL: &str = "/problems/internal";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "/problems/bad-request";
pub(crate) const PROBLEM_POLICY: &str = "/problems/request-rejected";
pub(crate) const PROBLEM_NOT_FOUND: &str = "/problems/not-found";
pub(crate) const PROBLEM_SERVICE_UNAVAILABLE: &str = "/problems/service-unavailable";
