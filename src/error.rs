use thiserror::Error;

#[derive(Error, Debug)]
pub enum S3Error {
    #[error("credentials: {0}")]
    Credentials(String),
    #[error("env var missing: {0}")]
    EnvVarMissing(#[from] std::env::VarError),
    #[error("from utf8: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),
    #[error("header to string: {0}")]
    HeaderToStr(#[from] http::header::ToStrError),
    #[error("sha2 invalid length: {0}")]
    HmacInvalidLength(#[from] sha2::digest::InvalidLength),
    #[error("S3_URL must have a host: '{0}'")]
    HostMissing(String),
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),
    #[error("http: {0}")]
    Http(#[from] http::Error),
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("missing header in response: {0}")]
    MissingHeader(&'static str),
    #[error("request: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("serde xml: {0}")]
    SerdeXml(#[from] quick_xml::de::DeError),
    #[error("serde xml serialize: {0}")]
    SerdeXmlSer(#[from] quick_xml::se::SeError),
    #[error("S3 returned HTTP {status} {code}: {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Time format error: {0}")]
    TimeFormatError(#[from] time::error::Format),
    #[error("url parse: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Utf8 decoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    // input validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid bucket name '{0}': {1}")]
    InvalidBucketName(String, &'static str),
    #[error("invalid object name '{0}': {1}")]
    InvalidObjectName(String, &'static str),
    #[error("invalid copy source range for {object}: start {start} > end {end}")]
    InvalidSourceRange { object: String, start: u64, end: u64 },
    #[error("compose needs at least one source")]
    NoComposeSources,
    #[error("compose got {0} sources, at most {1} are allowed")]
    TooManyComposeSources(usize, u64),

    // planning
    #[error("copy source {index} has invalid segment-to-copy [{start}, {end}] (size is {size})")]
    SourceRangeOutOfBounds {
        index: usize,
        start: u64,
        end: u64,
        size: u64,
    },
    #[error("copy source {index} is too small ({size} bytes) and is not the last source, minimum is {min}")]
    SourceTooSmall { index: usize, size: u64, min: u64 },
    #[error("composed object size {size} exceeds the maximum of {max}")]
    ObjectTooLarge { size: u64, max: u64 },
    #[error("compose needs {count} parts, at most {max} are allowed")]
    TooManyParts { count: u64, max: u64 },

    // event stream
    #[error("{section} crc mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        section: &'static str,
        expected: u32,
        computed: u32,
    },
    #[error("unexpected content type '{0}' for {1} event")]
    UnexpectedContentType(String, &'static str),
    #[error("select error {code}: {message}")]
    SelectError { code: String, message: String },
    #[error("event stream ended without an End event")]
    TruncatedEventStream,
    #[error("malformed event stream: {0}")]
    MalformedEventStream(&'static str),
}
