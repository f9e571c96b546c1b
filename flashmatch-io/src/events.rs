//! Reader for the matched charge/flash sample.

use crate::error::{Error, Result};
use crate::table::{data_lines, field, Delimiter, Header};
use flashmatch_core::SliceEvent;
use log::info;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Reads [`SliceEvent`]s from a headered delimited file.
///
/// Columns are matched by name and may appear in any order:
/// `slices, true_nus, mcT0, charge_x, charge_y, charge_z, charge_x_gl,
/// charge_slope, flash_yb, flash_zb, y_skew, z_skew, flash_slope, flash_rr,
/// flash_ratio, petoq`, plus an optional `score`.
pub struct EventCsvReader {
    path: PathBuf,
    delimiter: Delimiter,
}

struct Columns {
    slices: usize,
    true_nus: usize,
    mc_t0: usize,
    charge_x: usize,
    charge_y: usize,
    charge_z: usize,
    charge_x_gl: usize,
    charge_slope: usize,
    flash_yb: usize,
    flash_zb: usize,
    y_skew: usize,
    z_skew: usize,
    flash_slope: usize,
    flash_rr: usize,
    flash_ratio: usize,
    petoq: usize,
    score: Option<usize>,
}

impl Columns {
    fn from_header(header: &Header) -> Result<Self> {
        Ok(Self {
            slices: header.require("slices")?,
            true_nus: header.require("true_nus")?,
            mc_t0: header.require("mcT0")?,
            charge_x: header.require("charge_x")?,
            charge_y: header.require("charge_y")?,
            charge_z: header.require("charge_z")?,
            charge_x_gl: header.require("charge_x_gl")?,
            charge_slope: header.require("charge_slope")?,
            flash_yb: header.require("flash_yb")?,
            flash_zb: header.require("flash_zb")?,
            y_skew: header.require("y_skew")?,
            z_skew: header.require("z_skew")?,
            flash_slope: header.require("flash_slope")?,
            flash_rr: header.require("flash_rr")?,
            flash_ratio: header.require("flash_ratio")?,
            petoq: header.require("petoq")?,
            score: header.optional("score"),
        })
    }

    fn parse(&self, fields: &[&str], line: usize) -> Result<SliceEvent> {
        let f = |index: usize, name: &str| field::<f64>(fields, index, line, name);
        Ok(SliceEvent {
            slices: field(fields, self.slices, line, "slices")?,
            true_nus: field(fields, self.true_nus, line, "true_nus")?,
            mc_t0: f(self.mc_t0, "mcT0")?,
            charge_x: f(self.charge_x, "charge_x")?,
            charge_y: f(self.charge_y, "charge_y")?,
            charge_z: f(self.charge_z, "charge_z")?,
            charge_x_gl: f(self.charge_x_gl, "charge_x_gl")?,
            charge_slope: f(self.charge_slope, "charge_slope")?,
            flash_yb: f(self.flash_yb, "flash_yb")?,
            flash_zb: f(self.flash_zb, "flash_zb")?,
            y_skew: f(self.y_skew, "y_skew")?,
            z_skew: f(self.z_skew, "z_skew")?,
            flash_slope: f(self.flash_slope, "flash_slope")?,
            flash_rr: f(self.flash_rr, "flash_rr")?,
            flash_ratio: f(self.flash_ratio, "flash_ratio")?,
            petoq: f(self.petoq, "petoq")?,
            score: self.score.map(|i| f(i, "score")).transpose()?,
        })
    }
}

impl EventCsvReader {
    /// Reader for a comma-separated file.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            delimiter: Delimiter::Comma,
        }
    }

    /// Sets the field delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Reads every row in file order.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, a required column is
    /// missing or a row does not parse.
    pub fn read_events(&self) -> Result<Vec<SliceEvent>> {
        let text = std::fs::read_to_string(&self.path)?;
        let events = parse_events(&text, self.delimiter)?;
        info!("Read {} events from {}", events.len(), self.path.display());
        Ok(events)
    }
}

/// Parses a headered event table held in memory.
///
/// # Errors
/// See [`EventCsvReader::read_events`].
pub fn parse_events(text: &str, delimiter: Delimiter) -> Result<Vec<SliceEvent>> {
    let mut lines = data_lines(text);
    let (_, header) = lines
        .next()
        .ok_or_else(|| Error::format(1, "missing header"))?;
    let columns = Columns::from_header(&Header::parse(header, delimiter))?;
    let rows: Vec<(usize, &str)> = lines.collect();
    rows.par_iter()
        .map(|&(line, row)| columns.parse(&delimiter.split(row), line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "slices,true_nus,mcT0,charge_x,charge_y,charge_z,charge_x_gl,\
        charge_slope,flash_yb,flash_zb,y_skew,z_skew,flash_slope,flash_rr,flash_ratio,petoq";

    #[test]
    fn test_read_events_by_column_name() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "1,1,0.5,100,10,200,-100,0.1,12,203,0.3,0.4,0.12,80,0.5,2.1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "2,1,0.5,50,0,0,50,0,0,0,1,1,0,40,0.3,1.9").unwrap();

        let events = EventCsvReader::open(file.path()).read_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].slices, 1);
        assert_relative_eq!(events[0].charge_x_gl, -100.0);
        assert_relative_eq!(events[0].flash_ratio, 0.5);
        assert_eq!(events[0].score, None);
        assert_eq!(events[1].slices, 2);
        assert!(!events[1].passes_quality());
    }

    #[test]
    fn test_column_order_and_optional_score() {
        let text = "score petoq flash_ratio flash_rr flash_slope z_skew y_skew flash_zb flash_yb \
            charge_slope charge_x_gl charge_z charge_y charge_x mcT0 true_nus slices\n\
            7.5 2 0.4 60 0 1 1 0 0 0 30 0 0 30 1.0 1 1\n";
        let events = parse_events(text, Delimiter::Whitespace).unwrap();
        assert_eq!(events[0].score, Some(7.5));
        assert_relative_eq!(events[0].charge_x, 30.0);
        assert_relative_eq!(events[0].mc_t0, 1.0);
    }

    #[test]
    fn test_missing_column_and_bad_row() {
        assert!(matches!(
            parse_events("slices,true_nus\n1,1\n", Delimiter::Comma),
            Err(Error::MissingColumn("mcT0"))
        ));
        let text = format!("{HEADER}\n1,1,0.5,abc,0,0,0,0,0,0,1,1,0,1,0.5,1\n");
        match parse_events(&text, Delimiter::Comma) {
            Err(Error::InvalidFormat { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }
}
