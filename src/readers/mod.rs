pub mod archive_reader;
pub mod isd_lite_reader;

pub use archive_reader::{ArchiveLine, ArchiveReader};
pub use isd_lite_reader::{parse_line, IsdLiteReader, LineOutcome, ParsedLine, FIELD_LAYOUT};
