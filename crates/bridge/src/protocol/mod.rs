//! Standard-side protocol types: bodies, length bounds and errors.
//!
//! - **Bodies** ([`body`]): the pull-based body types handed to and returned by
//!   handlers
//!   - [`body::IncomingBody`]: a native request source seen as an `http_body::Body`
//!   - [`body::RequestBody`]: the possibly absent request body
//!   - [`body::ResponseBody`]: the single-consumer response body
//!
//! - **Length bounds** ([`LengthBound`], [`BodySizeLimit`]): how much of a
//!   request body may be read
//!
//! - **Errors**: [`BridgeError`] on top of [`RequestError`] and [`BodyError`]

mod error;
pub use error::BodyError;
pub use error::BoxError;
pub use error::BridgeError;
pub use error::InvalidLimit;
pub use error::ReaderError;
pub use error::RequestError;

mod limit;
pub use limit::BodySizeLimit;
pub use limit::LengthBound;

pub mod body;
