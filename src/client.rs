use crate::command::{sha256_hex, Command, CompleteMultipartUploadData, Part};
use crate::constants::LONG_DATE_TIME;
use crate::credentials::Credentials;
use crate::destination::CopyDestination;
use crate::error::S3Error;
use crate::planner::PartConstraints;
use crate::select::{decode_event_stream, SelectResults};
use crate::select_request::SelectRequest;
use crate::signature::{uri_encode, RequestSigner};
use crate::source::CopySource;
use crate::transport::{EventStreamResponse, ResponseHead, Transport};
use crate::types::{
    from_xml_body, version_id, CompleteMultipartUploadResult, ComposeObjectResult,
    CopyObjectResult, CopyPartResult, ErrorResponse, InitiateMultipartUploadResponse, ObjectStat,
};
use crate::{compose, md5_url_encode, Region};
use async_trait::async_trait;
use futures_util::StreamExt;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::debug;
use url::Url;

static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// `https://host/bucket/key` instead of `https://bucket.host/key`
    pub path_style: bool,
    pub part_constraints: PartConstraints,
}

impl ClientOptions {
    /// Reads `S3_PATH_STYLE`, defaults to `false`.
    pub fn try_from_env() -> Result<Self, S3Error> {
        let path_style = match env::var("S3_PATH_STYLE") {
            Ok(value) => value.parse::<bool>().map_err(|_| {
                S3Error::InvalidArgument(format!(
                    "S3_PATH_STYLE cannot be parsed as bool: '{}'",
                    value
                ))
            })?,
            Err(_) => false,
        };
        Ok(Self {
            path_style,
            ..Default::default()
        })
    }
}

/// Connection to an S3 compatible endpoint. Unlike most clients, it is not
/// bound to a single bucket, compose reads and writes across buckets.
#[derive(Debug, Clone)]
pub struct S3Client {
    pub host: Url,
    pub region: Region,
    pub credentials: Credentials,
    options: ClientOptions,
}

impl S3Client {
    pub fn new(
        host: Url,
        region: Region,
        credentials: Credentials,
        options: Option<ClientOptions>,
    ) -> Result<Self, S3Error> {
        if host.host_str().is_none() {
            return Err(S3Error::HostMissing(host.to_string()));
        }
        let options = options.unwrap_or_default();
        options.part_constraints.validate()?;

        Ok(Self {
            host,
            region,
            credentials,
            options,
        })
    }

    /// Builds the client from `S3_URL`, `S3_REGION`, `S3_ACCESS_KEY_ID`,
    /// `S3_ACCESS_KEY_SECRET`, `S3_SESSION_TOKEN` and `S3_PATH_STYLE`.
    pub fn try_from_env() -> Result<Self, S3Error> {
        let host = env::var("S3_URL")?.parse::<Url>()?;
        let region = Region::try_from_env()?;
        let credentials = Credentials::try_from_env()?;
        let options = ClientOptions::try_from_env()?;
        Self::new(host, region, credentials, Some(options))
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Composes `sources`, in order, into `destination` without downloading
    /// anything. See [`compose::compose_object`].
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(bucket = %destination.bucket, object = %destination.object)
    )]
    pub async fn compose_object(
        &self,
        destination: &CopyDestination,
        sources: Vec<CopySource>,
    ) -> Result<ComposeObjectResult, S3Error> {
        compose::compose_object(self, &self.options.part_constraints, destination, sources).await
    }

    /// Runs `request` against one object and collects the whole event stream.
    #[tracing::instrument(level = "debug", skip_all, fields(bucket = bucket, object = object))]
    pub async fn select_object_content(
        &self,
        bucket: &str,
        object: &str,
        request: &SelectRequest,
    ) -> Result<SelectResults, S3Error> {
        let res = Transport::select_object_content(self, bucket, object, request).await?;
        decode_event_stream(res.head, res.body).await
    }

    fn host_domain(&self) -> Result<String, S3Error> {
        // an IP has no domain, `host_str` covers both
        let host = self
            .host
            .host_str()
            .ok_or_else(|| S3Error::HostMissing(self.host.to_string()))?;
        match self.host.port() {
            Some(port) => Ok(format!("{}:{}", host, port)),
            None => Ok(host.to_string()),
        }
    }

    fn get_client() -> Result<&'static reqwest::Client, S3Error> {
        if let Some(client) = CLIENT.get() {
            return Ok(client);
        }

        let mut builder = reqwest::Client::builder()
            .brotli(true)
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(600))
            .use_rustls_tls();
        if env::var("S3_DANGER_ALLOW_INSECURE").as_deref() == Ok("true") {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;
        Ok(CLIENT.get_or_init(|| client))
    }

    async fn send_request(
        &self,
        command: Command<'_>,
        bucket: &str,
        object: &str,
    ) -> Result<reqwest::Response, S3Error> {
        let url = self.build_url(&command, bucket, object)?;
        let body = command.body();
        let headers = self.build_headers(&command, &url, bucket, &body)?;
        debug!("{} {}", command.http_method(), url);

        let res = Self::get_client()?
            .request(command.http_method(), url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(res)
    }

    fn build_url(&self, command: &Command<'_>, bucket: &str, object: &str) -> Result<Url, S3Error> {
        let mut url = if self.options.path_style {
            format!("{}://{}/{}", self.host.scheme(), self.host_domain()?, bucket)
        } else {
            format!("{}://{}.{}", self.host.scheme(), bucket, self.host_domain()?)
        };

        url.push('/');
        url.push_str(&uri_encode(object.strip_prefix('/').unwrap_or(object), false));

        if let Some(sub_resource) = command.sub_resource() {
            url.push('?');
            url.push_str(sub_resource);
        }

        let mut url = Url::parse(&url)?;

        let query = command.query();
        if !query.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in query {
                query_pairs.append_pair(key, &value);
            }
        }

        Ok(url)
    }

    fn build_headers(
        &self,
        command: &Command<'_>,
        url: &Url,
        bucket: &str,
        body: &[u8],
    ) -> Result<HeaderMap, S3Error> {
        let payload_sha256 = sha256_hex(body);
        let now = OffsetDateTime::now_utc();

        let mut headers = match command.extra_headers() {
            Some(extra) => extra.clone(),
            None => HeaderMap::with_capacity(8),
        };

        let domain = self.host_domain()?;
        if self.options.path_style {
            headers.insert(HOST, HeaderValue::from_str(domain.as_str())?);
        } else {
            headers.insert(HOST, HeaderValue::try_from(format!("{}.{}", bucket, domain))?);
        }

        match command {
            // Garage rejects, and Minio ignores, `content-length: 0` on these
            Command::HeadObject { .. } | Command::AbortMultipartUpload { .. } => {}
            _ => {
                headers.insert(CONTENT_LENGTH, HeaderValue::try_from(body.len().to_string())?);
            }
        }
        if let Some(content_type) = command.content_type() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if command.needs_content_md5() {
            headers.insert(
                HeaderName::from_static("content-md5"),
                HeaderValue::try_from(md5_url_encode(body))?,
            );
        }

        headers.insert(
            HeaderName::from_static("x-amz-content-sha256"),
            HeaderValue::from_str(&payload_sha256)?,
        );
        headers.insert(
            HeaderName::from_static("x-amz-date"),
            HeaderValue::try_from(now.format(LONG_DATE_TIME)?)?,
        );
        if let Some(token) = &self.credentials.session_token {
            headers.insert(
                HeaderName::from_static("x-amz-security-token"),
                HeaderValue::from_str(token.as_ref())?,
            );
        }

        let signer = RequestSigner {
            credentials: &self.credentials,
            region: &self.region,
            datetime: now,
        };
        let authorization =
            signer.authorization(&command.http_method(), url, &headers, &payload_sha256)?;
        headers.insert(AUTHORIZATION, HeaderValue::try_from(authorization)?);

        // The RFC2822 format is somewhat malleable and can break the signature.
        // `x-amz-date` is signed already, so `Date` is added afterwards.
        headers.insert(DATE, HeaderValue::try_from(now.format(&Rfc2822)?)?);

        Ok(headers)
    }
}

async fn error_from_response(res: reqwest::Response) -> S3Error {
    let status = res.status().as_u16();
    match res.text().await {
        Ok(body) => ErrorResponse::into_error(&body, status),
        Err(err) => S3Error::from(err),
    }
}

#[async_trait]
impl Transport for S3Client {
    async fn stat_object(
        &self,
        bucket: &str,
        object: &str,
        version_id: Option<&str>,
    ) -> Result<ObjectStat, S3Error> {
        let res = self
            .send_request(Command::HeadObject { version_id }, bucket, object)
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }
        ObjectStat::try_from(res.headers())
    }

    async fn copy_object(
        &self,
        bucket: &str,
        object: &str,
        headers: HeaderMap,
    ) -> Result<CopyObjectResult, S3Error> {
        let res = self
            .send_request(Command::CopyObject { headers: &headers }, bucket, object)
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }

        let status = res.status().as_u16();
        let version_id = version_id(res.headers());
        let body = res.text().await?;
        let mut result = from_xml_body::<CopyObjectResult>(&body, status)?;
        result.version_id = version_id;
        Ok(result)
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        headers: HeaderMap,
    ) -> Result<String, S3Error> {
        let res = self
            .send_request(
                Command::InitiateMultipartUpload { headers: &headers },
                bucket,
                object,
            )
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }

        let status = res.status().as_u16();
        let body = res.text().await?;
        let upload = from_xml_body::<InitiateMultipartUploadResponse>(&body, status)?;
        debug!("multipart upload {} for key {}", upload.upload_id, upload.key);
        Ok(upload.upload_id)
    }

    async fn upload_part_copy(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        part_number: u32,
        headers: HeaderMap,
    ) -> Result<String, S3Error> {
        let command = Command::UploadPartCopy {
            upload_id,
            part_number,
            headers: &headers,
        };
        let res = self.send_request(command, bucket, object).await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }

        let status = res.status().as_u16();
        let body = res.text().await?;
        Ok(from_xml_body::<CopyPartResult>(&body, status)?.etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
        parts: &[Part],
    ) -> Result<CompleteMultipartUploadResult, S3Error> {
        let command = Command::CompleteMultipartUpload {
            upload_id,
            data: CompleteMultipartUploadData { parts },
        };
        let res = self.send_request(command, bucket, object).await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }

        let status = res.status().as_u16();
        let version_id = version_id(res.headers());
        let body = res.text().await?;
        let mut result = from_xml_body::<CompleteMultipartUploadResult>(&body, status)?;
        result.version_id = version_id;
        Ok(result)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        object: &str,
        upload_id: &str,
    ) -> Result<(), S3Error> {
        let res = self
            .send_request(Command::AbortMultipartUpload { upload_id }, bucket, object)
            .await?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(res).await)
        }
    }

    async fn select_object_content(
        &self,
        bucket: &str,
        object: &str,
        request: &SelectRequest,
    ) -> Result<EventStreamResponse, S3Error> {
        request.validate()?;
        let command = Command::SelectObjectContent {
            request: request.to_xml()?,
        };
        let res = self.send_request(command, bucket, object).await?;
        if !res.status().is_success() {
            return Err(error_from_response(res).await);
        }

        let head = ResponseHead {
            status: res.status(),
            headers: res.headers().clone(),
        };
        let body = res
            .bytes_stream()
            .map(|chunk| chunk.map_err(S3Error::from))
            .boxed();
        Ok(EventStreamResponse { head, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client(host: &str, path_style: bool) -> S3Client {
        S3Client::new(
            host.parse().unwrap(),
            Region::new("us-east-1"),
            Credentials::new("AKIDEXAMPLE", "secret"),
            Some(ClientOptions {
                path_style,
                ..Default::default()
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_path_style_url() {
        let client = client("http://127.0.0.1:9000", true);
        let headers = HeaderMap::new();
        let command = Command::UploadPartCopy {
            upload_id: "abc+1",
            part_number: 3,
            headers: &headers,
        };
        let url = client
            .build_url(&command, "bucket", "/dir/my file.csv")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/bucket/dir/my%20file.csv?partNumber=3&uploadId=abc%2B1"
        );
    }

    #[test]
    fn test_virtual_host_url() {
        let client = client("https://s3.example.com", false);
        let headers = HeaderMap::new();
        let url = client
            .build_url(
                &Command::InitiateMultipartUpload { headers: &headers },
                "bucket",
                "key",
            )
            .unwrap();
        assert_eq!(url.as_str(), "https://bucket.s3.example.com/key?uploads");

        let url = client
            .build_url(
                &Command::SelectObjectContent {
                    request: String::new(),
                },
                "bucket",
                "data.csv",
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://bucket.s3.example.com/data.csv?select&select-type=2"
        );
    }

    #[test]
    fn test_signed_headers() {
        let client = client("http://localhost:9000", true);
        let mut extra = HeaderMap::new();
        extra.insert(
            HeaderName::from_static("x-amz-copy-source"),
            HeaderValue::from_static("/src/key"),
        );
        let command = Command::CopyObject { headers: &extra };
        let url = client.build_url(&command, "bucket", "key").unwrap();
        let headers = client
            .build_headers(&command, &url, "bucket", &command.body())
            .unwrap();

        assert_eq!(headers[HOST], "localhost:9000");
        assert_eq!(headers[CONTENT_LENGTH], "0");
        assert_eq!(headers["x-amz-copy-source"], "/src/key");
        assert!(!headers.contains_key("content-md5"));

        let auth = headers[AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(auth.contains(
            "SignedHeaders=content-length;host;x-amz-content-sha256;x-amz-copy-source;x-amz-date,"
        ));
        assert!(headers.contains_key(DATE));
    }

    #[test]
    fn test_body_headers() {
        let mut client = client("https://s3.example.com", false);
        client.credentials = client.credentials.clone().with_session_token("token");

        let parts = vec![Part {
            part_number: 1,
            etag: "\"a\"".to_string(),
        }];
        let command = Command::CompleteMultipartUpload {
            upload_id: "abc",
            data: CompleteMultipartUploadData { parts: &parts },
        };
        let url = client.build_url(&command, "bucket", "key").unwrap();
        let body = command.body();
        let headers = client.build_headers(&command, &url, "bucket", &body).unwrap();

        assert_eq!(headers[HOST], "bucket.s3.example.com");
        assert_eq!(headers[CONTENT_TYPE], "application/xml");
        assert_eq!(headers["content-md5"], md5_url_encode(&body).as_str());
        assert_eq!(headers["x-amz-content-sha256"], sha256_hex(&body).as_str());
        assert_eq!(headers["x-amz-security-token"], "token");
        assert!(headers[AUTHORIZATION]
            .to_str()
            .unwrap()
            .contains("x-amz-security-token"));
    }

    #[test]
    fn test_head_has_no_content_length() {
        let client = client("http://localhost:9000", true);
        let command = Command::HeadObject {
            version_id: Some("v1"),
        };
        let url = client.build_url(&command, "bucket", "key").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/bucket/key?versionId=v1");
        let headers = client.build_headers(&command, &url, "bucket", &[]).unwrap();
        assert!(!headers.contains_key(CONTENT_LENGTH));
    }

    #[test]
    fn test_invalid_options() {
        let res = S3Client::new(
            "http://localhost:9000".parse().unwrap(),
            Region::new("us-east-1"),
            Credentials::new("key", "secret"),
            Some(ClientOptions {
                path_style: true,
                part_constraints: PartConstraints {
                    max_part_size: 1,
                    ..Default::default()
                },
            }),
        );
        assert!(matches!(res, Err(S3Error::InvalidArgument(_))));
    }
}
