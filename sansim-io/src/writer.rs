//! File writers for reduced 1D results.

use crate::{Error, Result};
use sansim_algorithms::ReducedData;
use sansim_core::model::encode_non_finite;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output format for reduced data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated columns.
    Csv,
    /// Sentinel-encoded JSON document.
    Json,
}

impl OutputFormat {
    /// Picks the format from a file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(OutputFormat::Csv),
            Some("json") => Ok(OutputFormat::Json),
            other => Err(Error::InvalidFormat(format!(
                "unsupported output extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

/// Writes reduced data as CSV: `q,intensity,sigma_i,q_mean,sigma_q,fsubs`,
/// plus a `model` column when a model curve is present.
pub fn write_csv<W: Write>(mut writer: W, data: &ReducedData) -> Result<()> {
    let model = data.model.as_deref();
    if model.is_some() {
        writeln!(writer, "q,intensity,sigma_i,q_mean,sigma_q,fsubs,model")?;
    } else {
        writeln!(writer, "q,intensity,sigma_i,q_mean,sigma_q,fsubs")?;
    }

    for (k, b) in data.bins.iter().enumerate() {
        write!(
            writer,
            "{},{},{},{},{},{}",
            b.q, b.intensity, b.sigma_intensity, b.q_mean, b.sigma_q, b.transmission
        )?;
        match model.and_then(|m| m.get(k)) {
            Some(m) => writeln!(writer, ",{}", encode_non_finite(*m))?,
            None => writeln!(writer)?,
        }
    }

    writer.flush()?;
    Ok(())
}

/// Writes reduced data as pretty-printed JSON.
pub fn write_json<W: Write>(mut writer: W, data: &ReducedData) -> Result<()> {
    let mut encoded = data.clone();
    for b in &mut encoded.bins {
        for v in [
            &mut b.q,
            &mut b.intensity,
            &mut b.sum_sq,
            &mut b.sigma_intensity,
            &mut b.q_mean,
            &mut b.sigma_q,
        ] {
            *v = encode_non_finite(*v);
        }
    }
    if let Some(model) = encoded.model.as_mut() {
        for v in model.iter_mut() {
            *v = encode_non_finite(*v);
        }
    }
    serde_json::to_writer_pretty(&mut writer, &encoded)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Writer for reduced data output files.
pub struct ReducedDataWriter {
    writer: BufWriter<File>,
    format: OutputFormat,
}

impl ReducedDataWriter {
    /// Creates a writer, choosing the format from the extension.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let format = OutputFormat::from_path(&path)?;
        Self::create_with_format(path, format)
    }

    /// Creates a writer with an explicit format.
    pub fn create_with_format<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer, format })
    }

    /// Writes one result.
    pub fn write(&mut self, data: &ReducedData) -> Result<()> {
        match self.format {
            OutputFormat::Csv => write_csv(&mut self.writer, data),
            OutputFormat::Json => write_json(&mut self.writer, data),
        }
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
