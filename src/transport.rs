use crate::command::Part;
use crate::error::S3Error;
use crate::select_request::SelectRequest;
use crate::types::{CompleteMultipartUploadResult, CopyObjectResult, ObjectStat};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::{HeaderMap, StatusCode};

/// Response body delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, S3Error>>;

/// Status and headers of the response the event stream arrived in.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

pub struct EventStreamResponse {
    pub head: ResponseHead,
    pub body: ByteStream,
}

/// The remote calls compose and select are built on.
///
/// [`S3Client`](crate::S3Client) implements them on top of reqwest. Any other
/// implementation only has to map its own errors into [`S3Error`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn stat_object(
        &self,
        bucket: &str,
        object: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectStat, S3Error>;

    /// Server side copy in a single request.
    async fn copy_object(
        &self,
        bucket: &str,
        object: &str,
        headers: HeaderMap,
    ) -> Result<CopyObjectResult, S3Error>;

    /// Returns the upload id.
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        headers: HeaderMap,
    ) -> Result<String, S3Error>;

    /// Returns the ETag of the copied part.
    async fn upload_part_copy(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        headers: HeaderMap,
    ) -> Result<String, S3Error>;

    /// `parts` must be sorted by part number.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<CompleteMultipartUploadResult, S3Error>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> Result<(), S3Error>;

    async fn select_object_content(
        &self,
        bucket: &str,
        object: &str,
        request: &SelectRequest,
    ) -> Result<EventStreamResponse, S3Error>;
}
