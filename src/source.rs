use crate::constants::HTTP_DATE;
use crate::error::S3Error;
use crate::signature::uri_encode;
use crate::sse::SseCustomerKey;
use crate::validate::{check_bucket_name, check_object_name};
use http::{HeaderMap, HeaderName, HeaderValue};
use time::{OffsetDateTime, UtcOffset};

/// One input object of a compose.
#[derive(Debug, Clone)]
pub struct CopySource {
    pub bucket: String,
    pub object: String,
    pub version_id: Option<String>,
    /// Inclusive `(start, end)` byte range to copy instead of the full object.
    pub range: Option<(u64, u64)>,
    /// Copy only if the source still has this ETag. Filled in with the ETag
    /// fetched while composing, unless set explicitly.
    pub match_etag: Option<String>,
    pub not_match_etag: Option<String>,
    pub modified_since: Option<OffsetDateTime>,
    pub unmodified_since: Option<OffsetDateTime>,
    /// Key the source object is encrypted with.
    pub ssec: Option<SseCustomerKey>,
}

impl CopySource {
    pub fn new<B, O>(bucket: B, object: O) -> Self
    where
        B: Into<String>,
        O: Into<String>,
    {
        Self {
            bucket: bucket.into(),
            object: object.into(),
            version_id: None,
            range: None,
            match_etag: None,
            not_match_etag: None,
            modified_since: None,
            unmodified_since: None,
            ssec: None,
        }
    }

    pub fn version_id<S: Into<String>>(mut self, version_id: S) -> Self {
        self.version_id = Some(version_id.into());
        self
    }

    /// Copies the bytes `start..=end` only.
    pub fn range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn match_etag<S: Into<String>>(mut self, etag: S) -> Self {
        self.match_etag = Some(etag.into());
        self
    }

    pub fn not_match_etag<S: Into<String>>(mut self, etag: S) -> Self {
        self.not_match_etag = Some(etag.into());
        self
    }

    pub fn modified_since(mut self, at: OffsetDateTime) -> Self {
        self.modified_since = Some(at);
        self
    }

    pub fn unmodified_since(mut self, at: OffsetDateTime) -> Self {
        self.unmodified_since = Some(at);
        self
    }

    pub fn ssec(mut self, key: SseCustomerKey) -> Self {
        self.ssec = Some(key);
        self
    }

    pub fn validate(&self) -> Result<(), S3Error> {
        check_bucket_name(&self.bucket)?;
        check_object_name(&self.object)?;
        if let Some((start, end)) = self.range {
            if start > end {
                return Err(S3Error::InvalidSourceRange {
                    object: format!("{}/{}", self.bucket, self.object),
                    start,
                    end,
                });
            }
        }
        Ok(())
    }

    /// `/bucket/key[?versionId=..]` as expected by `x-amz-copy-source`.
    pub(crate) fn copy_source(&self) -> String {
        let mut source = format!("/{}/{}", self.bucket, uri_encode(&self.object, false));
        if let Some(version_id) = &self.version_id {
            source.push_str("?versionId=");
            source.push_str(&uri_encode(version_id, true));
        }
        source
    }

    /// Every header a copy request reading this source needs, except the
    /// byte range.
    pub(crate) fn headers(&self) -> Result<HeaderMap, S3Error> {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(
            HeaderName::from_static("x-amz-copy-source"),
            HeaderValue::try_from(self.copy_source())?,
        );

        if let Some(etag) = &self.match_etag {
            headers.insert(
                HeaderName::from_static("x-amz-copy-source-if-match"),
                HeaderValue::from_str(etag)?,
            );
        }
        if let Some(etag) = &self.not_match_etag {
            headers.insert(
                HeaderName::from_static("x-amz-copy-source-if-none-match"),
                HeaderValue::from_str(etag)?,
            );
        }
        if let Some(at) = self.modified_since {
            headers.insert(
                HeaderName::from_static("x-amz-copy-source-if-modified-since"),
                HeaderValue::try_from(http_date(at)?)?,
            );
        }
        if let Some(at) = self.unmodified_since {
            headers.insert(
                HeaderName::from_static("x-amz-copy-source-if-unmodified-since"),
                HeaderValue::try_from(http_date(at)?)?,
            );
        }
        if let Some(key) = &self.ssec {
            key.copy_source_headers(&mut headers)?;
        }

        Ok(headers)
    }
}

fn http_date(at: OffsetDateTime) -> Result<String, S3Error> {
    Ok(at.to_offset(UtcOffset::UTC).format(HTTP_DATE)?)
}
