use crate::error::S3Error;
use std::net::Ipv4Addr;

/// Checks a bucket name against the S3 naming rules for new buckets.
pub fn check_bucket_name(name: &str) -> Result<(), S3Error> {
    let fail = |reason| Err(S3Error::InvalidBucketName(name.to_string(), reason));

    if name.len() < 3 || name.len() > 63 {
        return fail("must be between 3 and 63 characters long");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return fail("may only contain lowercase letters, digits, '.' and '-'");
    }

    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return fail("must begin and end with a letter or digit");
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return fail("must not contain '..', '.-' or '-.'");
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return fail("must not be formatted as an IP address");
    }

    Ok(())
}

/// Object keys are 1 to 1024 bytes of UTF-8.
pub fn check_object_name(name: &str) -> Result<(), S3Error> {
    if name.is_empty() {
        return Err(S3Error::InvalidObjectName(
            name.to_string(),
            "must not be empty",
        ));
    }
    if name.len() > 1024 {
        return Err(S3Error::InvalidObjectName(
            name.to_string(),
            "must not be longer than 1024 bytes",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_names() {
        for ok in ["abc", "my-bucket.logs", "0-bucket-9", "a".repeat(63).as_str()] {
            assert!(check_bucket_name(ok).is_ok(), "{} should be valid", ok);
        }
        for bad in [
            "ab",
            "a".repeat(64).as_str(),
            "My-Bucket",
            "bucket_name",
            "-bucket",
            "bucket.",
            "my..bucket",
            "my.-bucket",
            "192.168.5.4",
        ] {
            assert!(check_bucket_name(bad).is_err(), "{} should be invalid", bad);
        }
    }

    #[test]
    fn test_object_names() {
        assert!(check_object_name("a/b/c.csv").is_ok());
        assert!(check_object_name("").is_err());
        assert!(check_object_name(&"x".repeat(1025)).is_err());
    }
}
