pub const LONG_DATE_TIME: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year][month][day]T[hour][minute][second]Z");
pub const EMPTY_PAYLOAD_SHA: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Every part except the last one of a multipart upload must be at least 5 MiB.
pub const ABS_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
/// 5 GiB, which is also the largest object a single copy request may produce.
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;
pub const MAX_PARTS_COUNT: u64 = 10_000;
/// 5 TiB
pub const MAX_MULTIPART_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

/// IMF-fixdate of RFC 7231, always in GMT.
pub const HTTP_DATE: &[time::format_description::BorrowedFormatItem<'static>] = time::macros::format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);
