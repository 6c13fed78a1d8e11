//! Server side compose of many source objects into one destination object.

use crate::command::Part;
use crate::destination::CopyDestination;
use crate::error::S3Error;
use crate::planner::{plan_sources, ComposePlan, PartConstraints, SourceSize};
use crate::source::CopySource;
use crate::transport::Transport;
use crate::types::ComposeObjectResult;
use futures_util::future::{join_all, try_join_all};
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error};

/// Composes `sources`, in order, into `destination`.
///
/// Sizes and ETags of all sources are fetched first. Each source is then
/// guarded with `x-amz-copy-source-if-match` on its fetched ETag, unless it
/// already carries one, so a source replaced in the meantime fails the
/// compose instead of producing a mixed object.
///
/// A single whole source that fits into one copy request is copied with
/// `CopyObject`. Everything else goes through a multipart upload built from
/// `UploadPartCopy` requests which all run concurrently. If any of them
/// fails, the upload is aborted and the error of the lowest failed part is
/// returned.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(bucket = %destination.bucket, object = %destination.object, sources = sources.len())
)]
pub async fn compose_object<T>(
    transport: &T,
    constraints: &PartConstraints,
    destination: &CopyDestination,
    mut sources: Vec<CopySource>,
) -> Result<ComposeObjectResult, S3Error>
where
    T: Transport + ?Sized,
{
    constraints.validate()?;
    if sources.is_empty() {
        return Err(S3Error::NoComposeSources);
    }
    if sources.len() as u64 > constraints.max_parts_count {
        return Err(S3Error::TooManyComposeSources(
            sources.len(),
            constraints.max_parts_count,
        ));
    }
    for source in &sources {
        source.validate()?;
    }
    destination.validate()?;

    let stats = try_join_all(sources.iter().map(|source| {
        transport.stat_object(&source.bucket, &source.object, source.version_id.as_deref())
    }))
    .await?;

    let sizes = sources
        .iter()
        .zip(&stats)
        .map(|(source, stat)| SourceSize {
            object_size: stat.size,
            range: source.range,
        })
        .collect::<Vec<_>>();
    let plan = plan_sources(&sizes, constraints)?;
    debug!(
        "compose plan: {} bytes in {} parts",
        plan.total_size, plan.part_count
    );

    for (source, stat) in sources.iter_mut().zip(stats) {
        source.match_etag.get_or_insert(stat.etag);
    }

    let whole_single_source = sources.len() == 1
        && sources[0].range.is_none()
        && plan.part_count == 1
        && plan.total_size <= constraints.max_part_size;
    if whole_single_source || plan.total_size == 0 {
        debug!("composing with a single copy request");
        return copy_single(transport, destination, &sources[0]).await;
    }

    let tasks = upload_part_tasks(&sources, &plan, destination)?;
    let upload_id = transport
        .initiate_multipart_upload(&destination.bucket, &destination.object, destination.headers()?)
        .await?;
    debug!("initiated multipart upload {}", upload_id);

    ComposeSession {
        transport,
        bucket: &destination.bucket,
        object: &destination.object,
        upload_id,
    }
    .run(tasks)
    .await
}

async fn copy_single<T>(
    transport: &T,
    destination: &CopyDestination,
    source: &CopySource,
) -> Result<ComposeObjectResult, S3Error>
where
    T: Transport + ?Sized,
{
    let mut headers = destination.headers()?;
    headers.extend(source.headers()?);

    let res = transport
        .copy_object(&destination.bucket, &destination.object, headers)
        .await?;
    Ok(ComposeObjectResult {
        bucket: destination.bucket.clone(),
        object: destination.object.clone(),
        etag: res.etag,
        version_id: res.version_id,
        last_modified: res.last_modified,
    })
}

#[derive(Debug)]
struct UploadPartTask {
    part_number: u32,
    source_index: usize,
    headers: HeaderMap,
}

/// One task per split, numbered from 1 across all sources in order.
fn upload_part_tasks(
    sources: &[CopySource],
    plan: &ComposePlan,
    destination: &CopyDestination,
) -> Result<Vec<UploadPartTask>, S3Error> {
    let part_headers = destination.part_headers()?;
    let mut tasks = Vec::with_capacity(plan.part_count as usize);
    let mut part_number = 0;

    for (source_index, (source, source_plan)) in sources.iter().zip(&plan.sources).enumerate() {
        let source_headers = source.headers()?;
        for split in &source_plan.splits {
            part_number += 1;
            let mut headers = source_headers.clone();
            headers.insert(
                HeaderName::from_static("x-amz-copy-source-range"),
                HeaderValue::try_from(split.header_value(source_plan.offset))?,
            );
            headers.extend(part_headers.clone());
            tasks.push(UploadPartTask {
                part_number,
                source_index,
                headers,
            });
        }
    }

    Ok(tasks)
}

/// An initiated multipart upload that must end in either a complete or an
/// abort.
struct ComposeSession<'a, T: ?Sized> {
    transport: &'a T,
    bucket: &'a str,
    object: &'a str,
    upload_id: String,
}

impl<T> ComposeSession<'_, T>
where
    T: Transport + ?Sized,
{
    async fn run(self, tasks: Vec<UploadPartTask>) -> Result<ComposeObjectResult, S3Error> {
        let parts = match self.copy_parts(tasks).await {
            Ok(parts) => parts,
            Err(err) => {
                self.abort().await;
                return Err(err);
            }
        };

        match self
            .transport
            .complete_multipart_upload(self.bucket, self.object, &self.upload_id, &parts)
            .await
        {
            Ok(res) => {
                debug!("completed multipart upload {}", self.upload_id);
                Ok(ComposeObjectResult {
                    bucket: self.bucket.to_string(),
                    object: self.object.to_string(),
                    etag: res.etag,
                    version_id: res.version_id,
                    last_modified: None,
                })
            }
            Err(err) => {
                self.abort().await;
                Err(err)
            }
        }
    }

    /// Runs all part copies and waits for every one of them. The parts come
    /// back sorted by part number.
    async fn copy_parts(&self, tasks: Vec<UploadPartTask>) -> Result<Vec<Part>, S3Error> {
        let count = tasks.len();
        let results = join_all(tasks.into_iter().map(|task| async move {
            let res = self
                .transport
                .upload_part_copy(
                    self.bucket,
                    self.object,
                    &self.upload_id,
                    task.part_number,
                    task.headers,
                )
                .await;
            (task.part_number, task.source_index, res)
        }))
        .await;

        let mut parts = Vec::with_capacity(count);
        let mut first_err: Option<(u32, S3Error)> = None;
        for (part_number, source_index, res) in results {
            match res {
                Ok(etag) => parts.push(Part { part_number, etag }),
                Err(err) => {
                    debug!(
                        "part {} copying from source {} failed: {}",
                        part_number, source_index, err
                    );
                    if first_err.as_ref().is_none_or(|(n, _)| part_number < *n) {
                        first_err = Some((part_number, err));
                    }
                }
            }
        }

        if let Some((part_number, err)) = first_err {
            debug!(
                "{} of {} parts failed, reporting part {}",
                count - parts.len(),
                count,
                part_number
            );
            return Err(err);
        }

        parts.sort_by_key(|part| part.part_number);
        Ok(parts)
    }

    /// Failing to abort is logged only, the error that led here is the one
    /// the caller gets.
    async fn abort(&self) {
        match self
            .transport
            .abort_multipart_upload(self.bucket, self.object, &self.upload_id)
            .await
        {
            Ok(()) => debug!("aborted multipart upload {}", self.upload_id),
            Err(err) => error!(
                "aborting multipart upload {} of {}/{}: {}",
                self.upload_id, self.bucket, self.object, err
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select_request::SelectRequest;
    use crate::transport::EventStreamResponse;
    use crate::types::{CompleteMultipartUploadResult, CopyObjectResult, ObjectStat};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Stat(String),
        Copy(HeaderMap),
        Initiate,
        UploadPart(u32, String),
        Complete(Vec<u32>),
        Abort,
    }

    #[derive(Default)]
    struct MockTransport {
        sizes: HashMap<String, u64>,
        fail_part: Option<u32>,
        fail_complete: bool,
        fail_abort: bool,
        calls: Mutex<Vec<Call>>,
    }

    impl MockTransport {
        fn new(sizes: &[(&str, u64)]) -> Self {
            Self {
                sizes: sizes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                ..Default::default()
            }
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| pred(c)).count()
        }
    }

    fn internal_error() -> S3Error {
        S3Error::Service {
            status: 500,
            code: "InternalError".to_string(),
            message: "We encountered an internal error".to_string(),
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn stat_object(
            &self,
            _bucket: &str,
            object: &str,
            _version_id: Option<&str>,
        ) -> Result<ObjectStat, S3Error> {
            self.record(Call::Stat(object.to_string()));
            match self.sizes.get(object) {
                Some(size) => Ok(ObjectStat {
                    size: *size,
                    etag: format!("\"etag-{}\"", object),
                    ..Default::default()
                }),
                None => Err(S3Error::Service {
                    status: 404,
                    code: "NoSuchKey".to_string(),
                    message: "The specified key does not exist.".to_string(),
                }),
            }
        }

        async fn copy_object(
            &self,
            _bucket: &str,
            _object: &str,
            headers: HeaderMap,
        ) -> Result<CopyObjectResult, S3Error> {
            self.record(Call::Copy(headers));
            Ok(CopyObjectResult {
                etag: "\"copied\"".to_string(),
                last_modified: Some("2024-01-01T00:00:00.000Z".to_string()),
                version_id: None,
            })
        }

        async fn initiate_multipart_upload(
            &self,
            _bucket: &str,
            _object: &str,
            _headers: HeaderMap,
        ) -> Result<String, S3Error> {
            self.record(Call::Initiate);
            Ok("upload-1".to_string())
        }

        async fn upload_part_copy(
            &self,
            _bucket: &str,
            _object: &str,
            upload_id: &str,
            part_number: u32,
            headers: HeaderMap,
        ) -> Result<String, S3Error> {
            assert_eq!(upload_id, "upload-1");
            // higher part numbers finish first
            tokio::time::sleep(Duration::from_millis(
                40u64.saturating_sub(part_number as u64 * 5),
            ))
            .await;

            let range = headers["x-amz-copy-source-range"]
                .to_str()
                .unwrap()
                .to_string();
            self.record(Call::UploadPart(part_number, range));

            if self.fail_part == Some(part_number) {
                return Err(internal_error());
            }
            Ok(format!("\"part-{}\"", part_number))
        }

        async fn complete_multipart_upload(
            &self,
            bucket: &str,
            object: &str,
            _upload_id: &str,
            parts: &[Part],
        ) -> Result<CompleteMultipartUploadResult, S3Error> {
            self.record(Call::Complete(
                parts.iter().map(|p| p.part_number).collect(),
            ));
            if self.fail_complete {
                return Err(internal_error());
            }
            Ok(CompleteMultipartUploadResult {
                location: None,
                bucket: bucket.to_string(),
                key: object.to_string(),
                etag: format!("\"final-{}\"", parts.len()),
                version_id: Some("v1".to_string()),
            })
        }

        async fn abort_multipart_upload(
            &self,
            _bucket: &str,
            _object: &str,
            _upload_id: &str,
        ) -> Result<(), S3Error> {
            self.record(Call::Abort);
            if self.fail_abort {
                return Err(S3Error::HttpFailWithBody(503, "slow down".to_string()));
            }
            Ok(())
        }

        async fn select_object_content(
            &self,
            _bucket: &str,
            _object: &str,
            _request: &SelectRequest,
        ) -> Result<EventStreamResponse, S3Error> {
            unreachable!("compose never selects")
        }
    }

    fn constraints() -> PartConstraints {
        PartConstraints {
            abs_min_part_size: 5,
            max_part_size: 10,
            max_parts_count: 10_000,
            max_multipart_object_size: 1_000_000,
        }
    }

    fn dest() -> CopyDestination {
        CopyDestination::new("dest", "out")
    }

    #[tokio::test]
    async fn test_single_source_shortcut() {
        let transport = MockTransport::new(&[("a", 8)]);
        let res = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "a")],
        )
        .await
        .unwrap();

        assert_eq!(res.etag, "\"copied\"");
        assert_eq!(res.bucket, "dest");
        assert_eq!(res.object, "out");

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::Stat("a".to_string()));
        match &calls[1] {
            Call::Copy(headers) => {
                assert_eq!(headers["x-amz-copy-source"], "/src/a");
                assert_eq!(headers["x-amz-copy-source-if-match"], "\"etag-a\"");
                assert!(!headers.contains_key("x-amz-copy-source-range"));
            }
            call => panic!("expected a copy, got {:?}", call),
        }
    }

    #[tokio::test]
    async fn test_empty_source_is_copied() {
        let transport = MockTransport::new(&[("empty", 0)]);
        compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "empty")],
        )
        .await
        .unwrap();

        assert_eq!(transport.count(|c| matches!(c, Call::Copy(_))), 1);
        assert_eq!(transport.count(|c| matches!(c, Call::Initiate)), 0);
    }

    #[tokio::test]
    async fn test_multipart_completes_sorted() {
        let transport = MockTransport::new(&[("a", 25), ("b", 7)]);
        let res = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "a"), CopySource::new("src", "b")],
        )
        .await
        .unwrap();

        assert_eq!(res.etag, "\"final-4\"");
        assert_eq!(res.version_id.as_deref(), Some("v1"));
        assert_eq!(res.last_modified, None);

        let calls = transport.calls();
        let uploads = calls
            .iter()
            .filter_map(|c| match c {
                Call::UploadPart(n, range) => Some((*n, range.as_str())),
                _ => None,
            })
            .collect::<Vec<_>>();
        // finished in reverse order
        assert_eq!(
            uploads,
            vec![
                (4, "bytes=0-6"),
                (3, "bytes=17-24"),
                (2, "bytes=9-16"),
                (1, "bytes=0-8"),
            ]
        );
        assert_eq!(calls.last(), Some(&Call::Complete(vec![1, 2, 3, 4])));
        assert_eq!(transport.count(|c| matches!(c, Call::Initiate)), 1);
        assert_eq!(transport.count(|c| matches!(c, Call::Abort)), 0);
    }

    #[tokio::test]
    async fn test_ranged_single_source_uses_multipart() {
        let transport = MockTransport::new(&[("a", 30)]);
        compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "a").range(10, 19)],
        )
        .await
        .unwrap();

        let calls = transport.calls();
        assert!(calls.contains(&Call::UploadPart(1, "bytes=10-19".to_string())));
        assert_eq!(calls.last(), Some(&Call::Complete(vec![1])));
        assert_eq!(transport.count(|c| matches!(c, Call::Copy(_))), 0);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_failed_part_aborts_once() {
        let mut transport = MockTransport::new(&[("a", 25), ("b", 7)]);
        transport.fail_part = Some(2);
        transport.fail_abort = true;

        let err = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "a"), CopySource::new("src", "b")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, S3Error::Service { status: 500, .. }));
        // every part settled before the abort
        assert_eq!(transport.count(|c| matches!(c, Call::UploadPart(..))), 4);
        assert_eq!(transport.count(|c| matches!(c, Call::Abort)), 1);
        assert_eq!(transport.count(|c| matches!(c, Call::Complete(_))), 0);
        assert_eq!(transport.calls().last(), Some(&Call::Abort));
        assert!(logs_contain("aborting multipart upload upload-1 of dest/out"));
    }

    #[tokio::test]
    async fn test_failed_complete_aborts() {
        let mut transport = MockTransport::new(&[("a", 12)]);
        transport.fail_complete = true;

        let err = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "a")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, S3Error::Service { status: 500, .. }));
        assert_eq!(transport.count(|c| matches!(c, Call::Complete(_))), 1);
        assert_eq!(transport.count(|c| matches!(c, Call::Abort)), 1);
    }

    #[tokio::test]
    async fn test_validation_before_any_request() {
        let transport = MockTransport::new(&[("a", 8)]);

        let err = compose_object(&transport, &constraints(), &dest(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::NoComposeSources));

        let err = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("Invalid_Bucket", "a")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, S3Error::InvalidBucketName(..)));

        let err = compose_object(
            &transport,
            &constraints(),
            &CopyDestination::new("dest", ""),
            vec![CopySource::new("src", "a")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, S3Error::InvalidObjectName(..)));

        let limits = PartConstraints {
            max_parts_count: 2,
            ..constraints()
        };
        let sources = vec![CopySource::new("src", "a"); 3];
        let err = compose_object(&transport, &limits, &dest(), sources)
            .await
            .unwrap_err();
        assert!(matches!(err, S3Error::TooManyComposeSources(3, 2)));

        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_planning_errors_before_writes() {
        let transport = MockTransport::new(&[("a", 25), ("b", 7), ("tiny", 3)]);
        let limits = PartConstraints {
            max_parts_count: 3,
            ..constraints()
        };

        let err = compose_object(
            &transport,
            &limits,
            &dest(),
            vec![CopySource::new("src", "a"), CopySource::new("src", "b")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, S3Error::TooManyParts { count: 4, max: 3 }));

        let err = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "tiny"), CopySource::new("src", "a")],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, S3Error::SourceTooSmall { index: 0, .. }));

        let err = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "b").range(2, 7)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, S3Error::SourceRangeOutOfBounds { index: 0, .. }));

        assert!(transport
            .calls()
            .iter()
            .all(|c| matches!(c, Call::Stat(_))));
    }

    #[tokio::test]
    async fn test_missing_source_fails_fast() {
        let transport = MockTransport::new(&[("a", 25)]);
        let err = compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "a"), CopySource::new("src", "gone")],
        )
        .await
        .unwrap_err();

        match err {
            S3Error::Service { status, code, .. } => {
                assert_eq!(status, 404);
                assert_eq!(code, "NoSuchKey");
            }
            err => panic!("unexpected error: {}", err),
        }
        assert_eq!(transport.count(|c| matches!(c, Call::Initiate)), 0);
    }

    #[tokio::test]
    async fn test_explicit_etag_guard_is_kept() {
        let transport = MockTransport::new(&[("a", 8)]);
        compose_object(
            &transport,
            &constraints(),
            &dest(),
            vec![CopySource::new("src", "a").match_etag("\"mine\"")],
        )
        .await
        .unwrap();

        match &transport.calls()[1] {
            Call::Copy(headers) => {
                assert_eq!(headers["x-amz-copy-source-if-match"], "\"mine\"")
            }
            call => panic!("expected a copy, got {:?}", call),
        }
    }
}
