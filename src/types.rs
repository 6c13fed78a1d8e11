use crate::error::S3Error;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

/// Metadata of an object as returned by a HEAD request.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectStat {
    /// Size of the object in bytes.
    pub size: u64,
    /// Opaque content identity, used as the `x-amz-copy-source-if-match` guard
    /// while composing.
    pub etag: String,
    pub last_modified: Option<String>,
    pub version_id: Option<String>,
    pub content_type: Option<String>,
    /// `x-amz-meta-*` headers without their prefix.
    pub metadata: HashMap<String, String>,
}

trait GetAndConvertHeaders {
    fn get_and_convert<T: FromStr>(&self, header: &str) -> Option<T>;
    fn get_string(&self, header: &str) -> Option<String>;
}

impl GetAndConvertHeaders for http::header::HeaderMap {
    fn get_and_convert<T: FromStr>(&self, header: &str) -> Option<T> {
        self.get(header)?.to_str().ok()?.parse::<T>().ok()
    }
    fn get_string(&self, header: &str) -> Option<String> {
        Some(self.get(header)?.to_str().ok()?.to_owned())
    }
}

impl TryFrom<&http::HeaderMap> for ObjectStat {
    type Error = S3Error;

    fn try_from(headers: &http::HeaderMap) -> Result<Self, Self::Error> {
        let size = headers
            .get_and_convert("content-length")
            .ok_or(S3Error::MissingHeader("content-length"))?;
        let etag = headers
            .get_string("etag")
            .ok_or(S3Error::MissingHeader("etag"))?;

        let metadata = headers
            .iter()
            .filter_map(|(key, value)| {
                let name = key.as_str().strip_prefix("x-amz-meta-")?;
                Some((name.to_owned(), value.to_str().ok()?.to_owned()))
            })
            .collect();

        Ok(Self {
            size,
            etag,
            last_modified: headers.get_string("last-modified"),
            version_id: headers.get_string("x-amz-version-id"),
            content_type: headers.get_string("content-type"),
            metadata,
        })
    }
}

/// Returns the `x-amz-version-id` response header, if any.
pub(crate) fn version_id(headers: &http::HeaderMap) -> Option<String> {
    headers.get_string("x-amz-version-id")
}

#[derive(Deserialize, Debug)]
pub(crate) struct InitiateMultipartUploadResponse {
    #[serde(rename = "Bucket")]
    _bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct CopyPartResult {
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CopyObjectResult {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "LastModified")]
    pub last_modified: Option<String>,
    /// Taken from the `x-amz-version-id` header, not the body.
    #[serde(skip)]
    pub version_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "Location")]
    pub location: Option<String>,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    /// Taken from the `x-amz-version-id` header, not the body.
    #[serde(skip)]
    pub version_id: Option<String>,
}

/// The XML body S3 sends along with failed requests. Copy and complete
/// requests may also return it with a `200 OK`.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ErrorResponse {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl ErrorResponse {
    pub(crate) fn into_error(body: &str, status: u16) -> S3Error {
        match quick_xml::de::from_str::<ErrorResponse>(body) {
            Ok(err) => S3Error::Service {
                status,
                code: err.code,
                message: err.message,
            },
            Err(_) => S3Error::HttpFailWithBody(status, body.to_string()),
        }
    }
}

/// Deserializes a success body, turning an embedded `<Error>` document into
/// an error.
pub(crate) fn from_xml_body<'de, T>(body: &'de str, status: u16) -> Result<T, S3Error>
where
    T: Deserialize<'de>,
{
    if body.contains("<Error>") {
        return Err(ErrorResponse::into_error(body, status));
    }
    Ok(quick_xml::de::from_str(body)?)
}

/// Result of a compose, either from the single copy shortcut or from a
/// completed multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeObjectResult {
    pub bucket: String,
    pub object: String,
    pub etag: String,
    pub version_id: Option<String>,
    /// Only the single copy path reports it.
    pub last_modified: Option<String>,
}
