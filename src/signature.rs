//! AWS Signature Version 4 for S3 requests signed in the `Authorization` header.

use crate::constants::LONG_DATE_TIME;
use crate::credentials::Credentials;
use crate::error::S3Error;
use crate::Region;
use hmac::Hmac;
use http::HeaderMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::digest::Mac;
use sha2::{Digest, Sha256};
use time::macros::format_description;
use time::OffsetDateTime;
use url::Url;

const SHORT_DATE: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]");

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Everything but the unreserved characters `A-Z a-z 0-9 - . _ ~` and `/`.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const COMPONENT_SET: &AsciiSet = &PATH_SET.add(b'/');

/// Percent-encodes `s` the way SigV4 expects. Object keys keep their `/`,
/// query components and header values embedding a key do not.
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let set = if encode_slash { COMPONENT_SET } else { PATH_SET };
    utf8_percent_encode(s, set).to_string()
}

fn canonical_uri(url: &Url) -> String {
    // `Url` applies its own percent-encoding, which differs from AWS's
    let decoded = percent_decode_str(url.path()).decode_utf8_lossy();
    uri_encode(&decoded, false)
}

fn canonical_query(url: &Url) -> String {
    let mut pairs = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_headers(headers: &HeaderMap) -> Result<String, S3Error> {
    let mut lines = Vec::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        lines.push(format!("{}:{}", name.as_str(), value.to_str()?.trim()));
    }
    lines.sort();
    Ok(lines.join("\n"))
}

/// `HeaderName`s are always lowercase already.
pub fn signed_headers(headers: &HeaderMap) -> String {
    let mut names = headers.keys().map(|k| k.as_str()).collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();
    names.join(";")
}

pub fn canonical_request(
    method: &http::Method,
    url: &Url,
    headers: &HeaderMap,
    payload_sha256: &str,
) -> Result<String, S3Error> {
    Ok(format!(
        "{}\n{}\n{}\n{}\n\n{}\n{}",
        method.as_str(),
        canonical_uri(url),
        canonical_query(url),
        canonical_headers(headers)?,
        signed_headers(headers),
        payload_sha256
    ))
}

/// Signing input for one request at one point in time.
pub(crate) struct RequestSigner<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a Region,
    pub datetime: OffsetDateTime,
}

impl RequestSigner<'_> {
    fn scope(&self) -> Result<String, S3Error> {
        Ok(format!(
            "{}/{}/s3/aws4_request",
            self.datetime.format(SHORT_DATE)?,
            self.region.as_str(),
        ))
    }

    fn string_to_sign(&self, canonical_request: &str) -> Result<String, S3Error> {
        let hashed = Sha256::digest(canonical_request.as_bytes());
        Ok(format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            self.datetime.format(LONG_DATE_TIME)?,
            self.scope()?,
            hex::encode(hashed)
        ))
    }

    fn signing_key(&self) -> Result<Vec<u8>, S3Error> {
        let secret = format!("AWS4{}", self.credentials.access_key_secret.as_ref());
        let date = self.datetime.format(SHORT_DATE)?;

        let mut key = secret.into_bytes();
        for step in [
            date.as_bytes(),
            self.region.as_str().as_bytes(),
            b"s3".as_slice(),
            b"aws4_request".as_slice(),
        ] {
            key = hmac_sha256(&key, step)?;
        }
        Ok(key)
    }

    /// Signs the request described by `method`, `url` and `headers`. Every
    /// header in the map becomes a signed header.
    pub fn authorization(
        &self,
        method: &http::Method,
        url: &Url,
        headers: &HeaderMap,
        payload_sha256: &str,
    ) -> Result<String, S3Error> {
        let canonical = canonical_request(method, url, headers, payload_sha256)?;
        let string_to_sign = self.string_to_sign(&canonical)?;
        let signature = hex::encode(hmac_sha256(&self.signing_key()?, string_to_sign.as_bytes())?);

        Ok(format!(
            "{} Credential={}/{},SignedHeaders={},Signature={}",
            ALGORITHM,
            self.credentials.access_key_id.as_ref(),
            self.scope()?,
            signed_headers(headers),
            signature,
        ))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, S3Error> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
