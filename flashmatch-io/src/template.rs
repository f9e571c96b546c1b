//! JSON persistence of generated templates.

use crate::error::Result;
use flashmatch_algorithms::{BandFit, Corrections, ScoreSummary, TemplateRun, TemplateTables};
use flashmatch_core::TemplateConfig;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Correction coefficients rounded for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedCoefficients {
    /// y offset, ascending powers.
    pub y: Vec<f64>,
    /// z offset, ascending powers.
    pub z: Vec<f64>,
}

/// Everything a downstream matcher needs from a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    /// Configuration the templates were generated with.
    pub config: TemplateConfig,
    /// The six per-bin tables.
    pub tables: TemplateTables,
    /// Full-precision corrections.
    pub corrections: Corrections,
    /// Rounded correction coefficients.
    pub reported: ReportedCoefficients,
    /// rr and ratio band fits.
    pub bands: Vec<BandFit>,
    /// Score histograms, scatter plots and counters of the generation run.
    pub summary: ScoreSummary,
}

impl TemplateDocument {
    /// Collect the persistent outputs of a run.
    #[must_use]
    pub fn from_run(config: &TemplateConfig, run: &TemplateRun) -> Self {
        Self {
            config: config.clone(),
            tables: run.tables.clone(),
            corrections: run.corrections.clone(),
            reported: ReportedCoefficients {
                y: run.corrections.y.reported().coefficients().to_vec(),
                z: run.corrections.z.reported().coefficients().to_vec(),
            },
            bands: run.bands.clone(),
            summary: run.summary.clone(),
        }
    }

    /// Load a document written by [`TemplateWriter`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded, or if the
    /// tables do not cover every metric with one binning.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut doc: Self = serde_json::from_reader(reader)?;
        doc.tables = TemplateTables::new(doc.tables.iter().cloned().collect())?;
        Ok(doc)
    }
}

/// Writer for template documents.
pub struct TemplateWriter {
    writer: BufWriter<File>,
}

impl TemplateWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Writes the document as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if encoding or writing fails.
    pub fn write(&mut self, doc: &TemplateDocument) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, doc)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        info!(
            "Wrote {} tables and {} band fits",
            doc.tables.iter().count(),
            doc.bands.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashmatch_algorithms::{BinnedStatistics, Polynomial, PolynomialCorrection};
    use flashmatch_core::Metric;
    use tempfile::NamedTempFile;

    fn document() -> TemplateDocument {
        let config = TemplateConfig::sbnd().with_drift(100.0, 2);
        let tables = Metric::ALL
            .iter()
            .map(|&metric| {
                let mut stats =
                    BinnedStatistics::new(metric, config.binning(), config.axes.get(metric));
                for (x, v) in [(10.0, 0.2), (20.0, 0.4), (60.0, 0.5), (70.0, 0.9)] {
                    stats.accumulate(x, v);
                }
                stats.derive(config.profile_errors)
            })
            .collect();
        let zero = |label| PolynomialCorrection::new(label, Polynomial::zero(2), 10.0);
        let corrections = Corrections {
            y: zero("y"),
            z: zero("z"),
        };
        TemplateDocument {
            reported: ReportedCoefficients {
                y: vec![0.0; 3],
                z: vec![0.0; 3],
            },
            tables: TemplateTables::new(tables).unwrap(),
            corrections,
            bands: Vec::new(),
            summary: ScoreSummary::new(&config),
            config,
        }
    }

    #[test]
    fn test_write_then_load() {
        let mut doc = document();
        doc.corrections.y =
            PolynomialCorrection::new("y", Polynomial::new(vec![1.234_56, -0.012_345, 1e-4]), 10.0);
        doc.summary.scores.fill(3.5);
        doc.summary.global_scatter.fill(-120.0, 3.5);
        doc.summary.previous_scatter.fill(-120.0, 8.0);
        doc.summary.scored = 1;
        let file = NamedTempFile::new().unwrap();
        TemplateWriter::create(file.path()).unwrap().write(&doc).unwrap();

        let loaded = TemplateDocument::load(file.path()).unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(
            loaded.corrections.y.polynomial().coefficients(),
            &[1.234_56, -0.012_345, 1e-4]
        );
        assert_eq!(loaded.tables.get(Metric::Petoq).len(), 2);
        assert_eq!(loaded.summary.global_scatter.entries(), 1);
        assert_eq!(loaded.summary.previous_scatter, doc.summary.previous_scatter);
    }

    #[test]
    fn test_load_rejects_incomplete_tables() {
        let mut value: serde_json::Value = serde_json::to_value(document()).unwrap();
        value["tables"]["tables"]
            .as_array_mut()
            .unwrap()
            .truncate(5);
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), value.to_string()).unwrap();
        assert!(matches!(
            TemplateDocument::load(file.path()),
            Err(crate::Error::CoreError(_))
        ));
    }
}
