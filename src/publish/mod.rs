//! Publishing tracked items to the social-media endpoint.
//!
//! Each item's [`ProcessFlag`](crate::storage::ProcessFlag) moves
//! `Pending(0) -> Retrying(1..9) -> {Done(-1), Abandoned(10)}`; the two
//! terminal states are never selected or changed again.

mod multipart;
mod publisher;

pub use multipart::{encode_multipart, BoundaryCollision, FilePart, MultipartBody, BOUNDARY};
pub use publisher::{build_request_body, publish_pending, PublishError, PublishReport, PublishTarget};
