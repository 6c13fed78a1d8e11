//! Decoder for the binary event stream `SelectObjectContent` answers with.
//!
//! Every message is framed as
//!
//! ```text
//! [4 total length][4 headers length][4 prelude crc]
//! [headers][payload]
//! [4 message crc]
//! ```
//!
//! with all integers big-endian and both checksums CRC32. The message CRC
//! covers everything from the total length through the payload.

use crate::error::S3Error;
use crate::transport::ResponseHead;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

const PRELUDE_LEN: usize = 12;
const MESSAGE_CRC_LEN: usize = 4;
const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Parsed body of a `Progress` or `Stats` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SelectProgress {
    #[serde(rename = "BytesScanned")]
    pub bytes_scanned: u64,
    #[serde(rename = "BytesProcessed")]
    pub bytes_processed: u64,
    #[serde(rename = "BytesReturned")]
    pub bytes_returned: u64,
}

/// Everything a select produced.
#[derive(Debug, Default)]
pub struct SelectResults {
    records: BytesMut,
    progress: Option<String>,
    stats: Option<String>,
    response: Option<ResponseHead>,
}

impl SelectResults {
    pub(crate) fn set_records(&mut self, payload: &[u8]) {
        self.records.extend_from_slice(payload);
    }

    pub(crate) fn set_progress(&mut self, xml: String) {
        self.progress = Some(xml);
    }

    pub(crate) fn set_stats(&mut self, xml: String) {
        self.stats = Some(xml);
    }

    pub(crate) fn set_response(&mut self, head: ResponseHead) {
        self.response = Some(head);
    }

    /// Concatenated payloads of all `Records` events.
    pub fn records(&self) -> &[u8] {
        &self.records
    }

    pub fn into_records(self) -> Bytes {
        self.records.freeze()
    }

    /// The last `Progress` document received.
    pub fn progress_xml(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn stats_xml(&self) -> Option<&str> {
        self.stats.as_deref()
    }

    pub fn progress(&self) -> Result<Option<SelectProgress>, S3Error> {
        match &self.progress {
            Some(xml) => Ok(Some(quick_xml::de::from_str(xml)?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> Result<Option<SelectProgress>, S3Error> {
        match &self.stats {
            Some(xml) => Ok(Some(quick_xml::de::from_str(xml)?)),
            None => Ok(None),
        }
    }

    /// Status and headers of the HTTP response, set once the stream ended
    /// properly.
    pub fn response(&self) -> Option<&ResponseHead> {
        self.response.as_ref()
    }
}

#[derive(Debug)]
struct Message {
    headers: HashMap<String, String>,
    payload: Bytes,
}

#[derive(Debug, PartialEq)]
enum Event {
    Error { code: String, message: String },
    Records,
    Progress,
    Stats,
    End,
    Unknown(String),
}

impl Message {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn event(&self) -> Event {
        match self.header(":message-type") {
            Some("error") => Event::Error {
                code: self.header(":error-code").unwrap_or_default().to_string(),
                message: self.header(":error-message").unwrap_or_default().to_string(),
            },
            Some("event") => match self.header(":event-type") {
                Some("Records") => Event::Records,
                Some("Progress") => Event::Progress,
                Some("Stats") => Event::Stats,
                Some("End") => Event::End,
                Some(other) => Event::Unknown(other.to_string()),
                None => Event::Unknown(String::new()),
            },
            other => Event::Unknown(other.unwrap_or_default().to_string()),
        }
    }

    /// Payload of a `Progress` or `Stats` event as text.
    fn xml_payload(&self, event: &'static str) -> Result<String, S3Error> {
        match self.header(":content-type") {
            Some("text/xml") => Ok(String::from_utf8(self.payload.to_vec())?),
            other => Err(S3Error::UnexpectedContentType(
                other.unwrap_or_default().to_string(),
                event,
            )),
        }
    }
}

struct EventStreamReader<S> {
    body: S,
    buf: BytesMut,
}

impl<S> EventStreamReader<S>
where
    S: Stream<Item = Result<Bytes, S3Error>> + Unpin,
{
    fn new(body: S) -> Self {
        Self {
            body,
            buf: BytesMut::new(),
        }
    }

    /// Pulls chunks until at least `len` bytes are buffered.
    async fn fill(&mut self, len: usize) -> Result<(), S3Error> {
        while self.buf.len() < len {
            match self.body.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk?),
                None => return Err(S3Error::TruncatedEventStream),
            }
        }
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Message, S3Error> {
        self.fill(PRELUDE_LEN).await?;

        let mut prelude = &self.buf[..PRELUDE_LEN];
        let total_len = prelude.get_u32() as usize;
        let headers_len = prelude.get_u32() as usize;
        let expected = prelude.get_u32();
        let computed = crc32fast::hash(&self.buf[..8]);
        if expected != computed {
            return Err(S3Error::CrcMismatch {
                section: "prelude",
                expected,
                computed,
            });
        }

        if total_len < PRELUDE_LEN + headers_len + MESSAGE_CRC_LEN {
            return Err(S3Error::MalformedEventStream(
                "message length is smaller than its headers",
            ));
        }
        if total_len > MAX_MESSAGE_LEN {
            return Err(S3Error::MalformedEventStream("message exceeds 16 MiB"));
        }

        self.fill(total_len).await?;
        let frame = self.buf.split_to(total_len).freeze();

        let crc_at = total_len - MESSAGE_CRC_LEN;
        let mut tail = &frame[crc_at..];
        let expected = tail.get_u32();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&frame[..crc_at]);
        let computed = hasher.finalize();
        if expected != computed {
            return Err(S3Error::CrcMismatch {
                section: "message",
                expected,
                computed,
            });
        }

        let headers_end = PRELUDE_LEN + headers_len;
        let headers = decode_headers(&frame[PRELUDE_LEN..headers_end])?;
        let payload = frame.slice(headers_end..crc_at);

        Ok(Message { headers, payload })
    }
}

/// Header entries are `[1 name len][name][1 value type][2 value len][value]`.
/// Select only sends string values, so the type byte is not looked at.
fn decode_headers(mut raw: &[u8]) -> Result<HashMap<String, String>, S3Error> {
    let mut headers = HashMap::new();

    while raw.has_remaining() {
        let name_len = raw.get_u8() as usize;
        if raw.remaining() < name_len + 3 {
            return Err(S3Error::MalformedEventStream(
                "header name exceeds the header section",
            ));
        }
        let name = std::str::from_utf8(&raw[..name_len])?.to_string();
        raw.advance(name_len);

        let _value_type = raw.get_u8();
        let value_len = raw.get_u16() as usize;
        if raw.remaining() < value_len {
            return Err(S3Error::MalformedEventStream(
                "header value exceeds the header section",
            ));
        }
        let value = std::str::from_utf8(&raw[..value_len])?.to_string();
        raw.advance(value_len);

        headers.insert(name, value);
    }

    Ok(headers)
}

/// Reads the event stream to its `End` message and collects what it carried.
///
/// An error message aborts with [`S3Error::SelectError`]. A stream that stops
/// before `End` is [`S3Error::TruncatedEventStream`], even at a message
/// boundary.
pub async fn decode_event_stream<S>(head: ResponseHead, body: S) -> Result<SelectResults, S3Error>
where
    S: Stream<Item = Result<Bytes, S3Error>> + Unpin,
{
    let mut reader = EventStreamReader::new(body);
    let mut results = SelectResults::default();

    loop {
        let message = reader.next_message().await?;
        match message.event() {
            Event::Error { code, message } => {
                return Err(S3Error::SelectError { code, message });
            }
            Event::End => {
                debug!(
                    "select event stream ended with {} bytes of records",
                    results.records.len()
                );
                results.set_response(head);
                return Ok(results);
            }
            Event::Records => results.set_records(&message.payload),
            Event::Progress => results.set_progress(message.xml_payload("Progress")?),
            Event::Stats => results.set_stats(message.xml_payload("Stats")?),
            Event::Unknown(event_type) => {
                warn!("skipping unknown select event type '{}'", event_type);
            }
        }
    }
}
