//! Tables for electron-lifetime equalization.

use crate::error::{Error, Result};
use crate::table::{data_lines, field, flag, Delimiter, Header};
use flashmatch_algorithms::lifetime::{EqualizedHit, RunLifetimes, TrackHit};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Reads calorimetric hits from a headered CSV.
///
/// Required columns: `run, cryostat, tpc, wire, time, dqdx, pitch,
/// track_max_time_east, track_max_time_west, selected`.
///
/// # Errors
/// Returns an error if the file cannot be read, a column is missing or a
/// row does not parse.
pub fn read_track_hits<P: AsRef<Path>>(path: P) -> Result<Vec<TrackHit>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let hits = parse_track_hits(&text)?;
    info!("Read {} hits from {}", hits.len(), path.as_ref().display());
    Ok(hits)
}

fn parse_track_hits(text: &str) -> Result<Vec<TrackHit>> {
    let mut lines = data_lines(text);
    let (_, header) = lines
        .next()
        .ok_or_else(|| Error::format(1, "missing header"))?;
    let header = Header::parse(header, Delimiter::Comma);
    let columns = [
        header.require("run")?,
        header.require("cryostat")?,
        header.require("tpc")?,
        header.require("wire")?,
        header.require("time")?,
        header.require("dqdx")?,
        header.require("pitch")?,
        header.require("track_max_time_east")?,
        header.require("track_max_time_west")?,
        header.require("selected")?,
    ];
    let rows: Vec<(usize, &str)> = lines.collect();
    rows.par_iter()
        .map(|&(line, row)| -> Result<TrackHit> {
            let f = Delimiter::Comma.split(row);
            Ok(TrackHit {
                run: field(&f, columns[0], line, "run")?,
                cryostat: field(&f, columns[1], line, "cryostat")?,
                tpc: field(&f, columns[2], line, "tpc")?,
                wire: field(&f, columns[3], line, "wire")?,
                time: field(&f, columns[4], line, "time")?,
                dqdx: field(&f, columns[5], line, "dqdx")?,
                pitch: field(&f, columns[6], line, "pitch")?,
                track_max_time_east: field(&f, columns[7], line, "track_max_time_east")?,
                track_max_time_west: field(&f, columns[8], line, "track_max_time_west")?,
                selected: flag(&f, columns[9], line, "selected")?,
            })
        })
        .collect()
}

/// Reads per-run lifetimes from a whitespace table `run tau0 tau1 tau2 tau3`
/// (ms) whose first line is a header.
///
/// # Errors
/// Returns an error if the file cannot be read or a row does not parse.
pub fn read_lifetimes<P: AsRef<Path>>(path: P) -> Result<HashMap<u32, RunLifetimes>> {
    let text = std::fs::read_to_string(path)?;
    parse_lifetimes(&text)
}

fn parse_lifetimes(text: &str) -> Result<HashMap<u32, RunLifetimes>> {
    let mut table = HashMap::new();
    for (line, row) in data_lines(text).skip(1) {
        let f = Delimiter::Whitespace.split(row);
        if f.len() < 5 {
            return Err(Error::format(line, format!("expected 5 fields, got {}", f.len())));
        }
        let run: u32 = field(&f, 0, line, "run")?;
        let mut taus = [0.0; 4];
        for (i, tau) in taus.iter_mut().enumerate() {
            *tau = field(&f, i + 1, line, "lifetime")?;
        }
        if table.insert(run, RunLifetimes(taus)).is_some() {
            warn!("run {run} listed twice in lifetime table; keeping line {line}");
        }
    }
    Ok(table)
}

/// Writes equalized hits as CSV.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_equalized_hits<P: AsRef<Path>>(path: P, hits: &[EqualizedHit]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(
        writer,
        "run,cryostat,tpc_east,wire,time,pitch,crossing_t0,drift_time,dqdx,dqdx_corr"
    )?;
    for h in hits {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{}",
            h.run,
            h.cryostat,
            u8::from(h.tpc_east),
            h.wire,
            h.time,
            h.pitch,
            h.crossing_t0,
            h.drift_time,
            h.dqdx_uncorrected,
            h.dqdx_corrected
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_read_hits_and_lifetimes() {
        let dir = tempdir().unwrap();
        let hits_path = dir.path().join("hits.csv");
        std::fs::write(
            &hits_path,
            "run,cryostat,tpc,wire,time,dqdx,pitch,track_max_time_east,track_max_time_west,selected\n\
             9000,0,1,240,2500.5,1200,0.31,4200,4210,1\n\
             9000,1,3,17,2600,900,0.3,4100,4150,false\n",
        )
        .unwrap();
        let hits = read_track_hits(&hits_path).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].selected && hits[0].tpc_east());
        assert_relative_eq!(hits[0].time, 2500.5);
        assert!(!hits[1].selected && !hits[1].tpc_east());

        let taus_path = dir.path().join("lifetimes.txt");
        std::fs::write(&taus_path, "run tau0 tau1 tau2 tau3\n9000 3.1 3.2 4.1 4.2\n9001\t5 5 5 5\n")
            .unwrap();
        let taus = read_lifetimes(&taus_path).unwrap();
        assert_eq!(taus.len(), 2);
        assert_relative_eq!(taus[&9000].get(1, false), 4.2);
    }

    #[test]
    fn test_short_lifetime_row_is_rejected() {
        match parse_lifetimes("run tau0 tau1 tau2 tau3\n9000 3.1 3.2\n") {
            Err(Error::InvalidFormat { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_write_equalized_hits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let hit = EqualizedHit {
            run: 1,
            cryostat: 0,
            tpc_east: true,
            wire: 2,
            time: 3.0,
            pitch: 0.3,
            crossing_t0: 4.0,
            drift_time: 5.0,
            dqdx_uncorrected: 6.0,
            dqdx_corrected: 7.0,
        };
        write_equalized_hits(&path, &[hit]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1), Some("1,0,1,2,3,0.3,4,5,6,7"));
    }
}
