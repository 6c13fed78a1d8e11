// Copyright 2024 Sebastian Dobe <sebastiandobe@mailbox.org>

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

use base64::engine::general_purpose;
use base64::Engine;
use std::env;

/// S3 connection, your main entrypoint
pub use crate::client::{ClientOptions, S3Client};
/// Server side compose on top of any [`Transport`]
pub use crate::compose::compose_object;
/// S3 Credentials
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials, SessionToken};
/// Target and inputs of a compose
pub use crate::destination::{CopyDestination, Retention, RetentionMode};
pub use crate::source::CopySource;
pub use crate::sse::{Sse, SseCustomerKey};
/// Specialized S3 Error type which wraps errors from different sources
pub use crate::error::S3Error;
/// Part size planning
pub use crate::planner::{
    calculate_even_splits, parts_required, plan_sources, ComposePlan, PartConstraints, PartRange,
    SourcePlan, SourceSize,
};
/// Select object content
pub use crate::select::{decode_event_stream, SelectProgress, SelectResults};
pub use crate::select_request::{
    CompressionType, CsvInput, CsvOutput, FileHeaderInfo, InputFormat, JsonType, OutputFormat,
    QuoteFields, ScanRange, SelectRequest,
};
/// The remote calls compose and select are built on
pub use crate::transport::{ByteStream, EventStreamResponse, ResponseHead, Transport};
pub use crate::command::Part;
/// Specialized Response objects
pub use crate::types::{
    CompleteMultipartUploadResult, ComposeObjectResult, CopyObjectResult, ObjectStat,
};
pub use crate::validate::{check_bucket_name, check_object_name};

mod client;
mod command;
mod compose;
mod constants;
mod credentials;
mod destination;
mod error;
mod planner;
pub mod prelude;
mod select;
mod select_request;
mod signature;
mod source;
mod sse;
mod transport;
mod types;
mod validate;

/// S3 Region Wrapper
#[derive(Debug, Clone)]
pub struct Region(pub String);

impl Region {
    pub fn new<S>(region: S) -> Self
    where
        S: Into<String>,
    {
        Self(region.into())
    }

    pub fn try_from_env() -> Result<Self, S3Error> {
        Ok(Self(env::var("S3_REGION")?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn md5_url_encode(s: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(s).as_ref())
}
