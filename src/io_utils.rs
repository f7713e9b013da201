//! I/O utilities for CSV reading, writing, encoding, and delimiter resolution.
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: the ordered candidate list used when decoding ticket
//!   exports, BOM sniffing, and output transcoding via `encoding_rs`.
//! - **Reader/writer construction**: `open_csv_reader` and `open_csv_writer`.

use std::{
    borrow::Cow,
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Encodings tried, in order, when a ticket export carries no BOM.
pub const DEFAULT_ENCODING_CANDIDATES: &[&str] = &["utf-8", "latin1", "utf-16"];

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Resolves every label up front so a typo fails before any file is touched.
pub fn resolve_encoding_list<S: AsRef<str>>(labels: &[S]) -> Result<Vec<&'static Encoding>> {
    if labels.is_empty() {
        return Err(anyhow!("At least one input encoding must be configured"));
    }
    labels
        .iter()
        .map(|label| resolve_encoding(Some(label.as_ref())))
        .collect()
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Detects a byte-order mark, returning the encoding it pins and the bytes after it.
pub fn sniff_bom(bytes: &[u8]) -> Option<(&'static Encoding, &[u8])> {
    Encoding::for_bom(bytes).map(|(encoding, len)| (encoding, &bytes[len..]))
}

/// Strict decode: any malformed sequence rejects the candidate.
pub fn decode_strict<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Result<Cow<'a, str>> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| anyhow!("malformed {} byte sequence", encoding.name()))
}

/// BOM-less UTF-16 decodes almost any even-length byte run, so a decoded
/// header without the delimiter is treated as a misdecode.
pub fn plausible_decode(text: &str, encoding: &'static Encoding, delimiter: u8) -> bool {
    if encoding != UTF_16LE && encoding != UTF_16BE {
        return true;
    }
    text.lines()
        .next()
        .is_some_and(|header| header.contains(char::from(delimiter)))
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_writer(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = Box::new(BufWriter::new(
        File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
    ));

    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    buffer: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }

    fn flush_buffer(&mut self, force: bool) -> io::Result<()> {
        match std::str::from_utf8(&self.buffer) {
            Ok(valid) => {
                let text = valid.to_owned();
                self.encode_and_write(&text)?;
                self.buffer.clear();
                Ok(())
            }
            Err(err) => {
                if err.error_len().is_some() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Invalid UTF-8 sequence in output stream",
                    ));
                }
                let valid_up_to = err.valid_up_to();
                if valid_up_to > 0 {
                    let text = String::from_utf8_lossy(&self.buffer[..valid_up_to]).into_owned();
                    self.encode_and_write(&text)?;
                    self.buffer.drain(..valid_up_to);
                }
                if force && !self.buffer.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Incomplete UTF-8 sequence at end of output stream",
                    ));
                }
                Ok(())
            }
        }
    }

    fn encode_and_write(&mut self, text: &str) -> io::Result<()> {
        let (encoded, _output_encoding, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.flush_buffer(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer(true)?;
        self.inner.flush()
    }
}
