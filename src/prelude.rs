pub use crate::client::{ClientOptions, S3Client};
pub use crate::credentials::{AccessKeyId, AccessKeySecret, Credentials};
pub use crate::destination::CopyDestination;
pub use crate::error::S3Error;
pub use crate::select_request::{InputFormat, OutputFormat, SelectRequest};
pub use crate::source::CopySource;
pub use crate::transport::Transport;
pub use crate::Region;
