//! Object storage upload.
//!
//! [`StorageUploader`] stages finished artifacts and streams them, one at a
//! time, to an [`ObjectStore`]. The default store is [`S3ObjectStore`], an
//! S3-compatible client signing requests with AWS Signature Version 4.
//! Credentials are chosen once through [`CredentialSource`]; temporary
//! credentials from the ambient chain are refreshed shortly before expiry.

mod credentials;
mod error;
mod s3;
mod sigv4;
mod traits;
mod types;
mod uploader;
mod xml;

pub use credentials::{CredentialEnv, CredentialSource, ResolvedCredentials};
pub use error::StorageError;
pub use s3::S3ObjectStore;
pub use traits::ObjectStore;
pub use types::{ObjectAcl, PutObjectRequest, UploadDestination, UploadedObject};
pub use uploader::{object_key, StorageUploader, DEFAULT_CONTENT_TYPE};
