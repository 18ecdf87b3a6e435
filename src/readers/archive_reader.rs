use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{ProcessingError, Result};
use crate::models::MergedRecord;
use crate::utils::constants::DEFAULT_BUFFER_SIZE;

/// One line of a merged archive, split on commas but not yet typed.
#[derive(Debug, Clone)]
pub struct ArchiveLine {
    pub line: u64,
    pub fields: StringRecord,
}

impl ArchiveLine {
    pub fn decode(&self) -> Result<MergedRecord> {
        MergedRecord::from_csv_record(&self.fields, self.line)
    }

    /// The line as it appears in the archive. Merged lines never need quoting,
    /// so rejoining the fields reproduces the original text.
    pub fn raw(&self) -> String {
        self.fields.iter().collect::<Vec<_>>().join(",")
    }
}

/// Reads a yearly archive. The archive is a concatenation of gzip members
/// (one per appended station file), so a multi-member decoder is required.
pub struct ArchiveReader<R: Read> {
    records: StringRecordsIntoIter<R>,
}

impl ArchiveReader<BufReader<MultiGzDecoder<File>>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::with_capacity(
            DEFAULT_BUFFER_SIZE,
            MultiGzDecoder::new(file),
        )))
    }
}

impl<R: Read> ArchiveReader<R> {
    pub fn from_reader(reader: R) -> Self {
        let records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader)
            .into_records();
        Self { records }
    }
}

impl<R: Read> Iterator for ArchiveReader<R> {
    type Item = Result<ArchiveLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|result| {
            let fields = result.map_err(classify)?;
            let line = fields.position().map(|p| p.line()).unwrap_or_default();
            Ok(ArchiveLine { line, fields })
        })
    }
}

/// A line that is not valid UTF-8 is a bad record, not a broken archive. The
/// reader has already moved past it, so iteration can continue.
fn classify(e: csv::Error) -> ProcessingError {
    if let csv::ErrorKind::Utf8 { pos, err } = e.kind() {
        return ProcessingError::InvalidRecord {
            line: pos.as_ref().map(|p| p.line()).unwrap_or_default(),
            reason: format!("invalid UTF-8: {}", err),
        };
    }
    ProcessingError::Csv(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::OpenOptions;
    use std::io::{Cursor, Write};

    const MERGED: &str = "032040:99999,2005,01,01,00,12.3,4.5,1013.2,180,5.2,4,0.0,0";

    #[test]
    fn test_lines_keep_numbers_and_text() -> Result<()> {
        let data = format!("{}\n{}\n", MERGED, MERGED);
        let lines = ArchiveReader::from_reader(Cursor::new(data)).collect::<Result<Vec<_>>>()?;

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[1].line, 2);
        assert_eq!(lines[0].raw(), MERGED);
        assert_eq!(lines[0].decode()?.station_id.to_string(), "032040:99999");
        Ok(())
    }

    #[test]
    fn test_short_lines_are_returned_not_rejected() -> Result<()> {
        let data = "032040:99999,2005,01\n";
        let lines = ArchiveReader::from_reader(Cursor::new(data)).collect::<Result<Vec<_>>>()?;
        assert_eq!(lines[0].fields.len(), 3);
        assert!(lines[0].decode().is_err());
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_is_record_level() {
        let mut data = format!("{}\n", MERGED).into_bytes();
        data.extend_from_slice(b"032040:99999,2005,01,01,01,\xff\xfe,4.5\n");
        data.extend_from_slice(format!("{}\n", MERGED).as_bytes());

        let items: Vec<_> = ArchiveReader::from_reader(Cursor::new(data)).collect();

        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        match &items[1] {
            Err(e @ ProcessingError::InvalidRecord { line: 2, .. }) => {
                assert!(e.is_record_level())
            }
            other => panic!("unexpected item: {:?}", other),
        }
        assert_eq!(items[2].as_ref().unwrap().line, 3);
    }

    #[test]
    fn test_reads_across_gzip_members() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("2005.csv.gz");

        for _ in 0..3 {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            writeln!(encoder, "{}", MERGED)?;
            encoder.finish()?;
        }

        let lines = ArchiveReader::open(&path)?.collect::<Result<Vec<_>>>()?;
        assert_eq!(lines.len(), 3);
        Ok(())
    }
}
