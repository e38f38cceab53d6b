//! Types for the storage module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Canned ACL applied to uploaded objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectAcl {
    Private,
    #[default]
    PublicRead,
}

impl ObjectAcl {
    /// Value of the `x-amz-acl` header.
    pub fn as_header_value(&self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
        }
    }
}

/// Where a batch of artifacts is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDestination {
    pub bucket: String,
    /// Key prefix; empty means the bucket root.
    pub directory: String,
}

impl UploadDestination {
    pub fn new(bucket: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            directory: directory.into(),
        }
    }
}

/// A single streaming PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub content_type: String,
    pub acl: ObjectAcl,
}

/// An artifact that reached the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub key: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
}
