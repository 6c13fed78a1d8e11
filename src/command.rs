use crate::constants::EMPTY_PAYLOAD_SHA;
use http::HeaderMap;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub part_number: u32,
    pub etag: String,
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            self.part_number,
            quick_xml::escape::escape(self.etag.as_str())
        )
    }
}

#[derive(Debug)]
pub(crate) struct CompleteMultipartUploadData<'a> {
    pub parts: &'a [Part],
}

impl fmt::Display for CompleteMultipartUploadData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<CompleteMultipartUpload>")?;
        for part in self.parts {
            write!(f, "{}", part)?;
        }
        write!(f, "</CompleteMultipartUpload>")
    }
}

/// One S3 REST call. `headers` are caller provided request headers, which are
/// signed together with the ones the client adds.
#[derive(Debug)]
pub(crate) enum Command<'a> {
    HeadObject {
        version_id: Option<&'a str>,
    },
    CopyObject {
        headers: &'a HeaderMap,
    },
    InitiateMultipartUpload {
        headers: &'a HeaderMap,
    },
    UploadPartCopy {
        upload_id: &'a str,
        part_number: u32,
        headers: &'a HeaderMap,
    },
    CompleteMultipartUpload {
        upload_id: &'a str,
        data: CompleteMultipartUploadData<'a>,
    },
    AbortMultipartUpload {
        upload_id: &'a str,
    },
    SelectObjectContent {
        request: String,
    },
}

impl Command<'_> {
    pub(crate) fn http_method(&self) -> http::Method {
        match self {
            Command::HeadObject { .. } => http::Method::HEAD,
            Command::CopyObject { .. } | Command::UploadPartCopy { .. } => http::Method::PUT,
            Command::InitiateMultipartUpload { .. }
            | Command::CompleteMultipartUpload { .. }
            | Command::SelectObjectContent { .. } => http::Method::POST,
            Command::AbortMultipartUpload { .. } => http::Method::DELETE,
        }
    }

    pub(crate) fn body(&self) -> Vec<u8> {
        match self {
            Command::CompleteMultipartUpload { data, .. } => data.to_string().into_bytes(),
            Command::SelectObjectContent { request } => request.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn content_type(&self) -> Option<&'static str> {
        match self {
            Command::CompleteMultipartUpload { .. } | Command::SelectObjectContent { .. } => {
                Some("application/xml")
            }
            _ => None,
        }
    }

    /// Only commands with a body carry a `Content-MD5`.
    pub(crate) fn needs_content_md5(&self) -> bool {
        matches!(
            self,
            Command::CompleteMultipartUpload { .. } | Command::SelectObjectContent { .. }
        )
    }

    /// Caller provided headers to merge into the signed request.
    pub(crate) fn extra_headers(&self) -> Option<&HeaderMap> {
        match self {
            Command::CopyObject { headers }
            | Command::InitiateMultipartUpload { headers }
            | Command::UploadPartCopy { headers, .. } => Some(headers),
            _ => None,
        }
    }

    /// Raw query string, parameters are percent-encoded by the caller.
    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Command::HeadObject {
                version_id: Some(version_id),
            } => vec![("versionId", version_id.to_string())],
            Command::UploadPartCopy {
                upload_id,
                part_number,
                ..
            } => vec![
                ("partNumber", part_number.to_string()),
                ("uploadId", upload_id.to_string()),
            ],
            Command::CompleteMultipartUpload { upload_id, .. }
            | Command::AbortMultipartUpload { upload_id } => {
                vec![("uploadId", upload_id.to_string())]
            }
            _ => Vec::new(),
        }
    }

    /// Value-less sub-resources like `?uploads`.
    pub(crate) fn sub_resource(&self) -> Option<&'static str> {
        match self {
            Command::InitiateMultipartUpload { .. } => Some("uploads"),
            Command::SelectObjectContent { .. } => Some("select&select-type=2"),
            _ => None,
        }
    }
}

pub(crate) fn sha256_hex(body: &[u8]) -> String {
    if body.is_empty() {
        return EMPTY_PAYLOAD_SHA.to_string();
    }
    hex::encode(Sha256::digest(body))
}
