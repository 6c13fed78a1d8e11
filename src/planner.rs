//! Splits compose sources into upload-part-copy byte ranges.
//!
//! Everything in here is pure, the orchestrator in [`crate::compose`] feeds
//! it with the sizes it fetched and turns the plan into requests.

use crate::constants::{
    ABS_MIN_PART_SIZE, MAX_MULTIPART_OBJECT_SIZE, MAX_PARTS_COUNT, MAX_PART_SIZE,
};
use crate::error::S3Error;

/// Size and count limits of a multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartConstraints {
    /// Minimum size of every part but the last one.
    pub abs_min_part_size: u64,
    /// Maximum size of a single part and of a single copy request.
    pub max_part_size: u64,
    pub max_parts_count: u64,
    pub max_multipart_object_size: u64,
}

impl Default for PartConstraints {
    fn default() -> Self {
        Self {
            abs_min_part_size: ABS_MIN_PART_SIZE,
            max_part_size: MAX_PART_SIZE,
            max_parts_count: MAX_PARTS_COUNT,
            max_multipart_object_size: MAX_MULTIPART_OBJECT_SIZE,
        }
    }
}

impl PartConstraints {
    /// An even split of anything larger than `max_part_size` yields parts of
    /// more than `max_part_size / 2` bytes, which must still satisfy the
    /// minimum.
    pub fn validate(&self) -> Result<(), S3Error> {
        if self.abs_min_part_size == 0 || self.max_parts_count == 0 {
            return Err(S3Error::InvalidArgument(
                "part constraints must not be zero".to_string(),
            ));
        }
        if self.max_part_size < self.abs_min_part_size.saturating_mul(2) {
            return Err(S3Error::InvalidArgument(format!(
                "max part size {} must be at least twice the min part size {}",
                self.max_part_size, self.abs_min_part_size
            )));
        }
        if self.max_multipart_object_size < self.max_part_size {
            return Err(S3Error::InvalidArgument(format!(
                "max object size {} is smaller than the max part size {}",
                self.max_multipart_object_size, self.max_part_size
            )));
        }
        Ok(())
    }
}

/// Inclusive byte range, `end` is the last byte copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub start: u64,
    pub end: u64,
}

impl PartRange {
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `bytes=start-end` with both bounds moved by `offset`.
    pub fn header_value(&self, offset: u64) -> String {
        format!("bytes={}-{}", offset + self.start, offset + self.end)
    }
}

pub fn parts_required(copy_size: u64, constraints: &PartConstraints) -> u64 {
    copy_size.div_ceil(constraints.max_part_size)
}

/// Splits `[0, copy_size)` into `parts_required` ranges whose lengths differ
/// by at most one byte. The first `copy_size % n` ranges get the extra byte.
pub fn calculate_even_splits(copy_size: u64, constraints: &PartConstraints) -> Vec<PartRange> {
    let count = parts_required(copy_size, constraints);
    if count == 0 {
        return Vec::new();
    }

    let base = copy_size / count;
    let remainder = copy_size % count;

    let mut splits = Vec::with_capacity(count as usize);
    let mut next_start = 0;
    for i in 0..count {
        let len = if i < remainder { base + 1 } else { base };
        splits.push(PartRange {
            start: next_start,
            end: next_start + len - 1,
        });
        next_start += len;
    }
    splits
}

/// What the planner needs to know about one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSize {
    /// Actual size of the source object.
    pub object_size: u64,
    /// Optional inclusive range to copy instead of the full object.
    pub range: Option<(u64, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePlan {
    /// Where the copied segment starts inside the source object.
    pub offset: u64,
    pub copy_size: u64,
    /// Relative to `offset`.
    pub splits: Vec<PartRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposePlan {
    pub sources: Vec<SourcePlan>,
    pub total_size: u64,
    pub part_count: u64,
}

/// Validates every source against the constraints and computes its splits.
///
/// Only the last source may be smaller than `abs_min_part_size`, mirroring
/// the "last part may be small" rule of multipart uploads.
pub fn plan_sources(
    sources: &[SourceSize],
    constraints: &PartConstraints,
) -> Result<ComposePlan, S3Error> {
    let last = sources.len().saturating_sub(1);
    let mut total_size: u64 = 0;
    let mut part_count: u64 = 0;
    let mut plans = Vec::with_capacity(sources.len());

    for (index, source) in sources.iter().enumerate() {
        let (offset, copy_size) = match source.range {
            Some((start, end)) => {
                if start > end || end >= source.object_size {
                    return Err(S3Error::SourceRangeOutOfBounds {
                        index,
                        start,
                        end,
                        size: source.object_size,
                    });
                }
                (start, end - start + 1)
            }
            None => (0, source.object_size),
        };

        if copy_size < constraints.abs_min_part_size && index != last {
            return Err(S3Error::SourceTooSmall {
                index,
                size: copy_size,
                min: constraints.abs_min_part_size,
            });
        }

        total_size = total_size.saturating_add(copy_size);
        if total_size > constraints.max_multipart_object_size {
            return Err(S3Error::ObjectTooLarge {
                size: total_size,
                max: constraints.max_multipart_object_size,
            });
        }

        part_count += parts_required(copy_size, constraints);
        if part_count > constraints.max_parts_count {
            return Err(S3Error::TooManyParts {
                count: part_count,
                max: constraints.max_parts_count,
            });
        }

        plans.push(SourcePlan {
            offset,
            copy_size,
            splits: calculate_even_splits(copy_size, constraints),
        });
    }

    Ok(ComposePlan {
        sources: plans,
        total_size,
        part_count,
    })
}
