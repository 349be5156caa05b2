/// Streaming parser for Apple Health `export.xml` documents.
///
/// Export structure (abridged):
///   <HealthData locale="en_US">
///     <ExportDate value="2024-01-01 10:00:00 -0800"/>
///     <Me HKCharacteristicTypeIdentifierDateOfBirth="..." .../>
///     <Record type="HKQuantityTypeIdentifierStepCount" unit="count" value="42"
///             startDate="..." endDate="...">
///       <MetadataEntry key="..." value="..."/>
///     </Record>
///     <Workout workoutActivityType="..." duration="..." ...>
///       <WorkoutStatistics .../>
///     </Workout>
///   </HealthData>
///
/// Every element becomes a record of its own tag, nested ones included.
/// Attributes become fields; text content is ignored.
use std::collections::HashSet;
use std::io::BufRead;
use std::str;

use indicatif::ProgressBar;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{Result, VitalisError};
use crate::model::ExportData;

/// How many elements to process between progress bar updates.
const PROGRESS_STRIDE: u64 = 4096;

pub struct ExportParser {
    include_tags: Option<HashSet<String>>,
    progress: ProgressBar,
}

impl Default for ExportParser {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ExportParser {
    /// With `include_tags == None` every tag is kept.
    pub fn new(include_tags: Option<&[String]>) -> Self {
        Self {
            include_tags: include_tags.map(|tags| tags.iter().cloned().collect()),
            progress: ProgressBar::hidden(),
        }
    }

    /// Report the running element count on `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn finish_progress(&self) {
        self.progress.finish_and_clear();
    }

    fn wants(&self, tag: &str) -> bool {
        self.include_tags
            .as_ref()
            .map_or(true, |tags| tags.contains(tag))
    }

    pub fn parse(&self, input: &[u8]) -> Result<ExportData> {
        self.parse_reader(input)
    }

    pub fn parse_reader<R: BufRead>(&self, input: R) -> Result<ExportData> {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);

        let mut data = ExportData::new();
        let mut buf = Vec::new();
        let mut elements: u64 = 0;
        // quick-xml reports Eof without checking for unclosed elements.
        let mut depth: usize = 0;

        loop {
            match reader.read_event_into(&mut buf) {
                Err(e) => {
                    return Err(VitalisError::Xml {
                        source: e,
                        position: reader.buffer_position(),
                    })
                }
                Ok(Event::Eof) => {
                    if depth > 0 {
                        return Err(malformed(
                            &reader,
                            format!("unexpected end of document with {depth} element(s) open"),
                        ));
                    }
                    break;
                }
                Ok(Event::Start(ref e)) => {
                    check_root(&reader, depth, elements)?;
                    self.visit(&mut data, e, &mut elements)?;
                    depth += 1;
                }
                Ok(Event::Empty(ref e)) => {
                    check_root(&reader, depth, elements)?;
                    self.visit(&mut data, e, &mut elements)?;
                }
                Ok(Event::End(_)) => depth = depth.saturating_sub(1),
                Ok(Event::Text(_)) | Ok(Event::CData(_)) if depth == 0 => {
                    return Err(malformed(
                        &reader,
                        "content outside the root element".to_string(),
                    ));
                }
                _ => {}
            }
            buf.clear();
        }

        self.progress.set_position(elements);
        tracing::debug!(elements, tags = data.tables().len(), "parsed export document");
        Ok(data)
    }

    fn visit(&self, data: &mut ExportData, e: &BytesStart, elements: &mut u64) -> Result<()> {
        *elements += 1;
        if *elements % PROGRESS_STRIDE == 0 {
            self.progress.set_position(*elements);
        }

        let name = e.name();
        let tag = str::from_utf8(name.as_ref())
            .map_err(|err| VitalisError::Parse(format!("invalid tag name: {err}")))?;
        if self.wants(tag) {
            data.push(tag, attributes(e));
        }
        Ok(())
    }
}

/// A second element at depth zero means a second root.
fn check_root<R>(reader: &Reader<R>, depth: usize, elements: u64) -> Result<()> {
    if depth == 0 && elements > 0 {
        return Err(malformed(reader, "multiple root elements".to_string()));
    }
    Ok(())
}

fn malformed<R>(reader: &Reader<R>, message: String) -> VitalisError {
    VitalisError::Parse(format!(
        "malformed document at byte {}: {message}",
        reader.buffer_position()
    ))
}

/// Extract attributes from an XML element in document order.
/// Attributes that fail to decode are skipped.
fn attributes(e: &BytesStart) -> Vec<(String, String)> {
    e.attributes()
        .filter_map(|a| {
            let attr = a.ok()?;
            let key = str::from_utf8(attr.key.as_ref()).ok()?.to_string();
            let value = attr.unescape_value().ok()?.to_string();
            Some((key, value))
        })
        .collect()
}
