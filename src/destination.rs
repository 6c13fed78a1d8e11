use crate::error::S3Error;
use crate::sse::Sse;
use crate::validate::{check_bucket_name, check_object_name};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionMode {
    Governance,
    Compliance,
}

impl RetentionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionMode::Governance => "GOVERNANCE",
            RetentionMode::Compliance => "COMPLIANCE",
        }
    }
}

/// Object lock retention, mode and date always travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub mode: RetentionMode,
    pub retain_until: OffsetDateTime,
}

/// The object a compose writes to.
#[derive(Debug, Clone)]
pub struct CopyDestination {
    pub bucket: String,
    pub object: String,
    /// Replaces the metadata of the source objects, keys without the
    /// `x-amz-meta-` prefix.
    pub user_metadata: Option<BTreeMap<String, String>>,
    pub tags: Option<BTreeMap<String, String>>,
    pub sse: Option<Sse>,
    pub retention: Option<Retention>,
    pub legal_hold: Option<bool>,
    /// Sent as they are, e.g. `content-type` or `cache-control`.
    pub extra_headers: HeaderMap,
}

impl CopyDestination {
    pub fn new<B, O>(bucket: B, object: O) -> Self
    where
        B: Into<String>,
        O: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            user_metadata: None,
            tags: None,
            sse: None,
            retention: None,
            legal_hold: None,
            extra_headers: HeaderMap::new(),
        }
    }

    pub fn user_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.user_metadata = Some(metadata);
        self
    }

    pub fn tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn sse(mut self, sse: Sse) -> Self {
        self.sse = Some(sse);
        self
    }

    pub fn retention(mut self, mode: RetentionMode, retain_until: OffsetDateTime) -> Self {
        self.retention = Some(Retention { mode, retain_until });
        self
    }

    pub fn legal_hold(mut self, on: bool) -> Self {
        self.legal_hold = Some(on);
        self
    }

    pub fn extra_headers(mut self, headers: HeaderMap) -> Self {
        self.extra_headers = headers;
        self
    }

    pub fn validate(&self) -> Result<(), S3Error> {
        check_bucket_name(&self.bucket)?;
        check_object_name(&self.object)?;

        if let Some(tags) = &self.tags {
            if tags.len() > 10 {
                return Err(S3Error::InvalidArgument(format!(
                    "at most 10 tags are allowed, got {}",
                    tags.len()
                )));
            }
            for (key, value) in tags {
                if key.is_empty() || key.chars().count() > 128 || value.chars().count() > 256 {
                    return Err(S3Error::InvalidArgument(format!(
                        "invalid tag '{}': keys need 1 to 128 and values up to 256 characters",
                        key
                    )));
                }
            }
        }

        if let Some(metadata) = &self.user_metadata {
            for key in metadata.keys() {
                HeaderName::try_from(format!("x-amz-meta-{}", key))?;
            }
        }

        Ok(())
    }

    /// Headers for the single copy request and for initiating the multipart
    /// upload.
    pub(crate) fn headers(&self) -> Result<HeaderMap, S3Error> {
        let mut headers = self.extra_headers.clone();

        if let Some(metadata) = &self.user_metadata {
            headers.insert(
                HeaderName::from_static("x-amz-metadata-directive"),
                HeaderValue::from_static("REPLACE"),
            );
            for (key, value) in metadata {
                headers.insert(
                    HeaderName::try_from(format!("x-amz-meta-{}", key.to_lowercase()))?,
                    HeaderValue::from_str(value)?,
                );
            }
        }

        if let Some(tags) = &self.tags {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(tags.iter())
                .finish();
            headers.insert(
                HeaderName::from_static("x-amz-tagging"),
                HeaderValue::try_from(encoded)?,
            );
            headers.insert(
                HeaderName::from_static("x-amz-tagging-directive"),
                HeaderValue::from_static("REPLACE"),
            );
        }

        if let Some(sse) = &self.sse {
            sse.headers(&mut headers)?;
        }

        if let Some(retention) = &self.retention {
            headers.insert(
                HeaderName::from_static("x-amz-object-lock-mode"),
                HeaderValue::from_static(retention.mode.as_str()),
            );
            let until = retention
                .retain_until
                .to_offset(UtcOffset::UTC)
                .format(&Rfc3339)?;
            headers.insert(
                HeaderName::from_static("x-amz-object-lock-retain-until-date"),
                HeaderValue::try_from(until)?,
            );
        }

        if let Some(on) = self.legal_hold {
            headers.insert(
                HeaderName::from_static("x-amz-object-lock-legal-hold"),
                HeaderValue::from_static(if on { "ON" } else { "OFF" }),
            );
        }

        Ok(headers)
    }

    /// S3 needs the SSE-C key of the destination on every upload part copy.
    pub(crate) fn part_headers(&self) -> Result<HeaderMap, S3Error> {
        let mut headers = HeaderMap::new();
        if let Some(Sse::Customer(key)) = &self.sse {
            key.headers(&mut headers)?;
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::SseCustomerKey;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    #[test]
    fn test_destination_headers() {
        let dest = CopyDestination::new("bucket", "key")
            .user_metadata(BTreeMap::from([("Owner".to_string(), "me".to_string())]))
            .tags(BTreeMap::from([
                ("project".to_string(), "blue sky".to_string()),
                ("team".to_string(), "a&b".to_string()),
            ]))
            .retention(
                RetentionMode::Governance,
                datetime!(2030-01-02 03:04:05 UTC),
            )
            .legal_hold(true);
        dest.validate().unwrap();

        let headers = dest.headers().unwrap();
        assert_eq!(headers["x-amz-metadata-directive"], "REPLACE");
        assert_eq!(headers["x-amz-meta-owner"], "me");
        assert_eq!(headers["x-amz-tagging"], "project=blue+sky&team=a%26b");
        assert_eq!(headers["x-amz-object-lock-mode"], "GOVERNANCE");
        assert_eq!(
            headers["x-amz-object-lock-retain-until-date"],
            "2030-01-02T03:04:05Z"
        );
        assert_eq!(headers["x-amz-object-lock-legal-hold"], "ON");
    }

    #[test]
    fn test_part_headers_only_carry_ssec() {
        let dest = CopyDestination::new("bucket", "key").sse(Sse::S3);
        assert!(dest.part_headers().unwrap().is_empty());
        assert_eq!(dest.headers().unwrap()["x-amz-server-side-encryption"], "AES256");

        let dest = CopyDestination::new("bucket", "key")
            .sse(Sse::Customer(SseCustomerKey::new(&[1u8; 32])));
        let headers = dest.part_headers().unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(
            headers["x-amz-server-side-encryption-customer-algorithm"],
            "AES256"
        );
    }

    #[test]
    fn test_validate_rejects_too_many_tags() {
        let tags = (0..11)
            .map(|i| (format!("k{}", i), "v".to_string()))
            .collect::<BTreeMap<_, _>>();
        let dest = CopyDestination::new("bucket", "key").tags(tags);
        assert!(matches!(dest.validate(), Err(S3Error::InvalidArgument(_))));
    }
}
