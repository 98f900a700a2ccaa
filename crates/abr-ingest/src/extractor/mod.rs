//! Streaming extraction of [`EntityRecord`]s from ABR bulk extract XML
//!
//! A [`RecordStream`] pulls events from a `quick-xml` reader and feeds them
//! to a [`RecordMachine`], yielding records lazily. Memory use is one
//! read buffer, the open-element path and the record under construction,
//! independent of file size.
//!
//! ```no_run
//! use abr_ingest::extractor::RecordStream;
//!
//! # fn main() -> abr_ingest::Result<()> {
//! for record in RecordStream::open("data/xml/20260101_Public01.xml")? {
//!     let record = record?;
//!     tracing::debug!(abn = %record.abn, "Extracted record");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A malformed document surfaces as a single [`IngestError::Parse`], after
//! which the stream is exhausted.

pub mod machine;
pub mod rules;

pub use machine::{ExtractorState, RecordMachine};
pub use rules::{NameOrder, RECORD_ELEMENT};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};
use crate::models::EntityRecord;

/// Read buffer for file-backed streams
const FILE_BUFFER_BYTES: usize = 64 * 1024;

/// Lazy iterator of records from one XML document
pub struct RecordStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    machine: RecordMachine,
    source: PathBuf,
    finished: bool,
}

impl RecordStream<BufReader<File>> {
    /// Stream records from an XML file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, NameOrder::default())
    }

    pub fn open_with(path: impl AsRef<Path>, name_order: NameOrder) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| IngestError::parse(path, 0, format!("cannot open file: {}", e)))?;
        Ok(Self::from_reader(
            BufReader::with_capacity(FILE_BUFFER_BYTES, file),
            path,
            name_order,
        ))
    }
}

impl<'a> RecordStream<&'a [u8]> {
    /// Stream records from an in-memory document
    pub fn from_xml(xml: &'a str) -> Self {
        Self::from_reader(xml.as_bytes(), "<memory>", NameOrder::default())
    }
}

impl<R: BufRead> RecordStream<R> {
    pub fn from_reader(reader: R, source: impl Into<PathBuf>, name_order: NameOrder) -> Self {
        Self {
            reader: Reader::from_reader(reader),
            buf: Vec::with_capacity(8 * 1024),
            machine: RecordMachine::new(name_order),
            source: source.into(),
            finished: false,
        }
    }

    fn byte_position(&self) -> u64 {
        self.reader.buffer_position().try_into().unwrap_or(u64::MAX)
    }

    fn fail(&mut self, message: impl Into<String>) -> IngestError {
        self.finished = true;
        IngestError::parse(self.source.clone(), self.byte_position(), message)
    }

    /// Advance until the next complete record or end of document
    fn next_record(&mut self) -> Result<Option<EntityRecord>> {
        loop {
            self.buf.clear();
            let step = match self.reader.read_event_into(&mut self.buf) {
                Err(e) => Step::Fail(e.to_string()),
                Ok(Event::Start(start)) => match decode_start(&start) {
                    Ok((name, attributes)) => {
                        self.machine.open(&name, &attributes);
                        Step::Continue
                    },
                    Err(message) => Step::Fail(message),
                },
                Ok(Event::Empty(start)) => match decode_start(&start) {
                    Ok((name, attributes)) => {
                        self.machine.open(&name, &attributes);
                        Step::from(self.machine.close())
                    },
                    Err(message) => Step::Fail(message),
                },
                Ok(Event::Text(text)) => match text.unescape() {
                    Ok(text) => {
                        self.machine.text(&text);
                        Step::Continue
                    },
                    Err(e) => Step::Fail(e.to_string()),
                },
                Ok(Event::CData(cdata)) => {
                    self.machine.text(&String::from_utf8_lossy(&cdata));
                    Step::Continue
                },
                Ok(Event::End(_)) => Step::from(self.machine.close()),
                Ok(Event::Eof) if self.machine.depth() > 0 => Step::Fail(format!(
                    "unexpected end of document with {} element(s) still open",
                    self.machine.depth()
                )),
                Ok(Event::Eof) => Step::End,
                Ok(_) => Step::Continue,
            };

            match step {
                Step::Continue => continue,
                Step::Record(record) => return Ok(Some(record)),
                Step::End => {
                    self.finished = true;
                    return Ok(None);
                },
                Step::Fail(message) => return Err(self.fail(message)),
            }
        }
    }
}

/// Outcome of handling one reader event
enum Step {
    Continue,
    Record(EntityRecord),
    End,
    Fail(String),
}

impl From<Option<EntityRecord>> for Step {
    fn from(record: Option<EntityRecord>) -> Self {
        record.map_or(Step::Continue, Step::Record)
    }
}

/// Element name plus the attributes any rule reads
fn decode_start(
    start: &BytesStart<'_>,
) -> std::result::Result<(String, Vec<(String, String)>), String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    if rules::attribute_rules_for(&name).next().is_some() {
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            attributes.push((key, value.into_owned()));
        }
    }

    Ok((name, attributes))
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<EntityRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        self.next_record().transpose()
    }
}
