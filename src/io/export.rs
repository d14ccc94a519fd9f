//! CSV export for session samples.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::session::Sample;

/// Column header for CSV telemetry export.
const HEADER: &str = "time,variable,value_reference,value,kind";

/// Exports session samples to a CSV file at the given path.
///
/// Writes a header row followed by one row per sample, in the order the
/// samples occurred. Produces deterministic output for identical inputs.
///
/// # Arguments
///
/// * `samples` - Injected and received values of a session
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(samples: &[Sample], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(samples, buf)
}

/// Writes session samples as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(samples: &[Sample], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(','))?;

    for s in samples {
        wtr.write_record(&[
            format!("{:.6}", s.time),
            s.variable.clone(),
            s.value_reference.to_string(),
            s.value.to_string(),
            s.kind.as_str().to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
