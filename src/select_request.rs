//! Request body of `SelectObjectContent`.

use crate::error::S3Error;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Bzip2,
}

impl CompressionType {
    fn as_str(&self) -> &'static str {
        match self {
            CompressionType::None => "NONE",
            CompressionType::Gzip => "GZIP",
            CompressionType::Bzip2 => "BZIP2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileHeaderInfo {
    /// First line holds column names usable in the expression.
    Use,
    /// First line holds column names, but columns are addressed by position.
    Ignore,
    None,
}

impl FileHeaderInfo {
    fn as_str(&self) -> &'static str {
        match self {
            FileHeaderInfo::Use => "USE",
            FileHeaderInfo::Ignore => "IGNORE",
            FileHeaderInfo::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Document,
    Lines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteFields {
    Always,
    AsNeeded,
}

#[derive(Debug, Clone, Default)]
pub struct CsvInput {
    pub file_header_info: Option<FileHeaderInfo>,
    pub record_delimiter: Option<String>,
    pub field_delimiter: Option<String>,
    pub quote_character: Option<String>,
    pub quote_escape_character: Option<String>,
    pub comments: Option<String>,
    pub allow_quoted_record_delimiter: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct CsvOutput {
    pub quote_fields: Option<QuoteFields>,
    pub record_delimiter: Option<String>,
    pub field_delimiter: Option<String>,
    pub quote_character: Option<String>,
    pub quote_escape_character: Option<String>,
}

#[derive(Debug, Clone)]
pub enum InputFormat {
    Csv(CsvInput),
    Json(JsonType),
    Parquet,
}

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Csv(CsvOutput),
    Json { record_delimiter: Option<String> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

/// A SQL query over a single CSV, JSON or Parquet object.
#[derive(Debug, Clone)]
pub struct SelectRequest {
    pub expression: String,
    pub input: InputFormat,
    pub compression: CompressionType,
    pub output: OutputFormat,
    /// Ask S3 to send `Progress` events while scanning.
    pub request_progress: bool,
    pub scan_range: Option<ScanRange>,
}

impl SelectRequest {
    pub fn new<S: Into<String>>(expression: S, input: InputFormat, output: OutputFormat) -> Self {
        Self {
            expression: expression.into(),
            input,
            compression: CompressionType::None,
            output,
            request_progress: false,
            scan_range: None,
        }
    }

    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn request_progress(mut self, enabled: bool) -> Self {
        self.request_progress = enabled;
        self
    }

    pub fn scan_range(mut self, start: Option<u64>, end: Option<u64>) -> Self {
        self.scan_range = Some(ScanRange { start, end });
        self
    }

    pub fn validate(&self) -> Result<(), S3Error> {
        if self.expression.trim().is_empty() {
            return Err(S3Error::InvalidArgument(
                "select expression must not be empty".to_string(),
            ));
        }
        if matches!(self.input, InputFormat::Parquet) && self.compression != CompressionType::None
        {
            return Err(S3Error::InvalidArgument(
                "parquet input does not support compression".to_string(),
            ));
        }
        if let Some(ScanRange {
            start: Some(start),
            end: Some(end),
        }) = self.scan_range
        {
            if start > end {
                return Err(S3Error::InvalidArgument(format!(
                    "scan range start {} is after its end {}",
                    start, end
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn to_xml(&self) -> Result<String, S3Error> {
        let input = match &self.input {
            InputFormat::Csv(csv) => InputXml {
                compression_type: self.compression.as_str(),
                csv: Some(CsvInputXml {
                    file_header_info: csv.file_header_info.map(|i| i.as_str()),
                    record_delimiter: csv.record_delimiter.as_deref(),
                    field_delimiter: csv.field_delimiter.as_deref(),
                    quote_character: csv.quote_character.as_deref(),
                    quote_escape_character: csv.quote_escape_character.as_deref(),
                    comments: csv.comments.as_deref(),
                    allow_quoted_record_delimiter: csv.allow_quoted_record_delimiter,
                }),
                json: None,
                parquet: None,
            },
            InputFormat::Json(json_type) => InputXml {
                compression_type: self.compression.as_str(),
                csv: None,
                json: Some(JsonInputXml {
                    json_type: match json_type {
                        JsonType::Document => "DOCUMENT",
                        JsonType::Lines => "LINES",
                    },
                }),
                parquet: None,
            },
            InputFormat::Parquet => InputXml {
                compression_type: self.compression.as_str(),
                csv: None,
                json: None,
                parquet: Some(ParquetXml {}),
            },
        };

        let output = match &self.output {
            OutputFormat::Csv(csv) => OutputXml {
                csv: Some(CsvOutputXml {
                    quote_fields: csv.quote_fields.map(|q| match q {
                        QuoteFields::Always => "ALWAYS",
                        QuoteFields::AsNeeded => "ASNEEDED",
                    }),
                    record_delimiter: csv.record_delimiter.as_deref(),
                    field_delimiter: csv.field_delimiter.as_deref(),
                    quote_character: csv.quote_character.as_deref(),
                    quote_escape_character: csv.quote_escape_character.as_deref(),
                }),
                json: None,
            },
            OutputFormat::Json { record_delimiter } => OutputXml {
                csv: None,
                json: Some(JsonOutputXml {
                    record_delimiter: record_delimiter.as_deref(),
                }),
            },
        };

        let body = SelectXml {
            expression: &self.expression,
            expression_type: "SQL",
            input,
            output,
            request_progress: RequestProgressXml {
                enabled: self.request_progress,
            },
            scan_range: self.scan_range.map(|r| ScanRangeXml {
                start: r.start,
                end: r.end,
            }),
        };
        Ok(quick_xml::se::to_string(&body)?)
    }
}

#[derive(Serialize)]
#[serde(rename = "SelectObjectContentRequest")]
struct SelectXml<'a> {
    #[serde(rename = "Expression")]
    expression: &'a str,
    #[serde(rename = "ExpressionType")]
    expression_type: &'static str,
    #[serde(rename = "InputSerialization")]
    input: InputXml<'a>,
    #[serde(rename = "OutputSerialization")]
    output: OutputXml<'a>,
    #[serde(rename = "RequestProgress")]
    request_progress: RequestProgressXml,
    #[serde(rename = "ScanRange", skip_serializing_if = "Option::is_none")]
    scan_range: Option<ScanRangeXml>,
}

#[derive(Serialize)]
struct InputXml<'a> {
    #[serde(rename = "CompressionType")]
    compression_type: &'static str,
    #[serde(rename = "CSV", skip_serializing_if = "Option::is_none")]
    csv: Option<CsvInputXml<'a>>,
    #[serde(rename = "JSON", skip_serializing_if = "Option::is_none")]
    json: Option<JsonInputXml>,
    #[serde(rename = "Parquet", skip_serializing_if = "Option::is_none")]
    parquet: Option<ParquetXml>,
}

#[derive(Serialize)]
struct CsvInputXml<'a> {
    #[serde(rename = "FileHeaderInfo", skip_serializing_if = "Option::is_none")]
    file_header_info: Option<&'static str>,
    #[serde(rename = "RecordDelimiter", skip_serializing_if = "Option::is_none")]
    record_delimiter: Option<&'a str>,
    #[serde(rename = "FieldDelimiter", skip_serializing_if = "Option::is_none")]
    field_delimiter: Option<&'a str>,
    #[serde(rename = "QuoteCharacter", skip_serializing_if = "Option::is_none")]
    quote_character: Option<&'a str>,
    #[serde(rename = "QuoteEscapeCharacter", skip_serializing_if = "Option::is_none")]
    quote_escape_character: Option<&'a str>,
    #[serde(rename = "Comments", skip_serializing_if = "Option::is_none")]
    comments: Option<&'a str>,
    #[serde(
        rename = "AllowQuotedRecordDelimiter",
        skip_serializing_if = "Option::is_none"
    )]
    allow_quoted_record_delimiter: Option<bool>,
}

#[derive(Serialize)]
struct JsonInputXml {
    #[serde(rename = "Type")]
    json_type: &'static str,
}

#[derive(Serialize)]
struct ParquetXml {}

#[derive(Serialize)]
struct OutputXml<'a> {
    #[serde(rename = "CSV", skip_serializing_if = "Option::is_none")]
    csv: Option<CsvOutputXml<'a>>,
    #[serde(rename = "JSON", skip_serializing_if = "Option::is_none")]
    json: Option<JsonOutputXml<'a>>,
}

#[derive(Serialize)]
struct CsvOutputXml<'a> {
    #[serde(rename = "QuoteFields", skip_serializing_if = "Option::is_none")]
    quote_fields: Option<&'static str>,
    #[serde(rename = "RecordDelimiter", skip_serializing_if = "Option::is_none")]
    record_delimiter: Option<&'a str>,
    #[serde(rename = "FieldDelimiter", skip_serializing_if = "Option::is_none")]
    field_delimiter: Option<&'a str>,
    #[serde(rename = "QuoteCharacter", skip_serializing_if = "Option::is_none")]
    quote_character: Option<&'a str>,
    #[serde(rename = "QuoteEscapeCharacter", skip_serializing_if = "Option::is_none")]
    quote_escape_character: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonOutputXml<'a> {
    #[serde(rename = "RecordDelimiter", skip_serializing_if = "Option::is_none")]
    record_delimiter: Option<&'a str>,
}

#[derive(Serialize)]
struct RequestProgressXml {
    #[serde(rename = "Enabled")]
    enabled: bool,
}

#[derive(Serialize)]
struct ScanRangeXml {
    #[serde(rename = "Start", skip_serializing_if = "Option::is_none")]
    start: Option<u64>,
    #[serde(rename = "End", skip_serializing_if = "Option::is_none")]
    end: Option<u64>,
}
