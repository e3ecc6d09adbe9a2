//! VoiceMatch API gateway client
//!
//! - `ApiClient` issues bearer-authenticated JSON requests under the `/api`
//!   prefix and turns every non-success response into `ClientError::Api`.
//! - `VoiceMatchApi` is the typed seam the controllers depend on; the HTTP
//!   client implements it, tests substitute a fake or a mock.

mod client;
mod endpoints;
mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::ApiClient;
pub use traits::VoiceMatchApi;

#[cfg(any(test, feature = "testing"))]
pub use traits::MockVoiceMatchApi;
