use std::fs::{File, OpenOptions};
use std::path::Path;

use log::debug;

use super::features::{FlowFeatures, FLOW_HEADER};
use crate::error::{FlowError, Result};

/// CSV writer for feature rows. The header goes out at most once per file.
pub struct FlowCsvWriter {
    writer: csv::Writer<File>,
    rows: usize,
}

impl FlowCsvWriter {
    /// Opens `path` for appending; the header is written only if the file is new or empty.
    pub fn append<P: AsRef<Path>>(path: P, header: &[&str]) -> Result<Self> {
        let path = check_arguments(path.as_ref(), header)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        Self::with_file(file, header, is_empty)
    }

    /// Truncates `path` and writes the header.
    pub fn create<P: AsRef<Path>>(path: P, header: &[&str]) -> Result<Self> {
        let path = check_arguments(path.as_ref(), header)?;
        let file = File::create(path)?;
        Self::with_file(file, header, true)
    }

    fn with_file(file: File, header: &[&str], write_header: bool) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if write_header {
            writer.write_record(header)?;
        }
        Ok(Self { writer, rows: 0 })
    }

    pub fn write(&mut self, features: &FlowFeatures) -> Result<()> {
        self.writer.serialize(features)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        debug!("flushed {} flow rows", self.rows);
        Ok(())
    }
}

fn check_arguments<'a>(path: &'a Path, header: &[&str]) -> Result<&'a Path> {
    if path.as_os_str().is_empty() {
        return Err(FlowError::MissingArgument("output path"));
    }
    if header.is_empty() {
        return Err(FlowError::MissingArgument("header"));
    }
    Ok(path)
}

/// The default header, for callers that do not supply their own.
pub fn default_header() -> &'static [&'static str] {
    &FLOW_HEADER
}
