//! CSV output of per-event score records.

use crate::error::Result;
use flashmatch_algorithms::ScoreRecord;
use flashmatch_core::Metric;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for [`ScoreRecord`] rows.
///
/// One row per record: event identity, hypothesis and corrected flash
/// position, then `observed, mean, spread, term` for every metric, then the
/// score and the score the input row carried (empty if none).
pub struct ScoreCsvWriter<W: Write> {
    writer: W,
}

impl ScoreCsvWriter<BufWriter<File>> {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ScoreCsvWriter<W> {
    /// Wraps an arbitrary sink.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes the header and all records.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_records(&mut self, records: &[ScoreRecord]) -> Result<()> {
        write!(
            self.writer,
            "index,distance_bin,charge_x,charge_x_gl,hypothesis,corrected_flash_y,corrected_flash_z"
        )?;
        for metric in Metric::ALL {
            write!(
                self.writer,
                ",{metric}_observed,{metric}_mean,{metric}_spread,{metric}_term"
            )?;
        }
        writeln!(self.writer, ",score,previous_score,fallback")?;

        for r in records {
            write!(
                self.writer,
                "{},{},{},{},{},{},{}",
                r.index,
                r.distance_bin,
                r.charge_x,
                r.charge_x_gl,
                r.hypothesis,
                r.corrected_flash_y,
                r.corrected_flash_z
            )?;
            for t in &r.terms {
                write!(
                    self.writer,
                    ",{},{},{},{}",
                    t.observed, t.mean, t.spread, t.term
                )?;
            }
            let previous = r.previous_score.map(|s| s.to_string()).unwrap_or_default();
            writeln!(
                self.writer,
                ",{},{},{}",
                r.score,
                previous,
                u8::from(r.used_fallback())
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Returns the underlying sink.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}
