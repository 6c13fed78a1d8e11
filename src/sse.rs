use crate::error::S3Error;
use crate::md5_url_encode;
use base64::engine::general_purpose;
use base64::Engine;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::fmt::{Debug, Formatter};

/// Customer provided 256 bit key for SSE-C.
#[derive(Clone)]
pub struct SseCustomerKey {
    key_b64: String,
    key_md5_b64: String,
}

impl Debug for SseCustomerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SseCustomerKey(<hidden>)")
    }
}

impl SseCustomerKey {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            key_b64: general_purpose::STANDARD.encode(key),
            key_md5_b64: md5_url_encode(key),
        }
    }

    fn insert(&self, headers: &mut HeaderMap, prefix: &str) -> Result<(), S3Error> {
        for (suffix, value) in [
            ("algorithm", "AES256"),
            ("key", self.key_b64.as_str()),
            ("key-md5", self.key_md5_b64.as_str()),
        ] {
            headers.insert(
                HeaderName::try_from(format!("{}-{}", prefix, suffix))?,
                HeaderValue::from_str(value)?,
            );
        }
        Ok(())
    }

    /// Headers to write, or read, an object encrypted with this key.
    pub(crate) fn headers(&self, headers: &mut HeaderMap) -> Result<(), S3Error> {
        self.insert(headers, "x-amz-server-side-encryption-customer")
    }

    /// Headers to read a copy source encrypted with this key.
    pub(crate) fn copy_source_headers(&self, headers: &mut HeaderMap) -> Result<(), S3Error> {
        self.insert(headers, "x-amz-copy-source-server-side-encryption-customer")
    }
}

/// Server side encryption of the composed object.
#[derive(Debug, Clone)]
pub enum Sse {
    /// SSE-S3, `AES256` with S3 managed keys.
    S3,
    /// SSE-KMS. `context` is the JSON encryption context, it is base64 encoded
    /// on the wire.
    Kms {
        key_id: Option<String>,
        context: Option<String>,
    },
    Customer(SseCustomerKey),
}

impl Sse {
    pub(crate) fn headers(&self, headers: &mut HeaderMap) -> Result<(), S3Error> {
        let sse = HeaderName::from_static("x-amz-server-side-encryption");
        match self {
            Sse::S3 => {
                headers.insert(sse, HeaderValue::from_static("AES256"));
            }
            Sse::Kms { key_id, context } => {
                headers.insert(sse, HeaderValue::from_static("aws:kms"));
                if let Some(key_id) = key_id {
                    headers.insert(
                        HeaderName::from_static("x-amz-server-side-encryption-aws-kms-key-id"),
                        HeaderValue::from_str(key_id)?,
                    );
                }
                if let Some(context) = context {
                    headers.insert(
                        HeaderName::from_static("x-amz-server-side-encryption-context"),
                        HeaderValue::try_from(general_purpose::STANDARD.encode(context))?,
                    );
                }
            }
            Sse::Customer(key) => key.headers(headers)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_customer_key_headers() {
        let key = SseCustomerKey::new(&[7u8; 32]);
        let mut headers = HeaderMap::new();
        key.copy_source_headers(&mut headers).unwrap();
        assert_eq!(
            headers["x-amz-copy-source-server-side-encryption-customer-algorithm"],
            "AES256"
        );
        assert_eq!(
            headers["x-amz-copy-source-server-side-encryption-customer-key"],
            general_purpose::STANDARD.encode([7u8; 32]).as_str()
        );
        assert!(format!("{:?}", key).contains("<hidden>"));
    }

    #[test]
    fn test_kms_headers() {
        let mut headers = HeaderMap::new();
        Sse::Kms {
            key_id: Some("my-key".to_string()),
            context: None,
        }
        .headers(&mut headers)
        .unwrap();
        assert_eq!(headers["x-amz-server-side-encryption"], "aws:kms");
        assert_eq!(
            headers["x-amz-server-side-encryption-aws-kms-key-id"],
            "my-key"
        );
    }
}
