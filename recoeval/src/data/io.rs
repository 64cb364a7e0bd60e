use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::data::unit::{Unit, UnitInput};
use crate::error::{EvalError, EvalResult};
use crate::evaluation::batch::UnitReport;

pub const FILE_VERSION: u32 = 1;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

fn check_version(found: u32) -> EvalResult<()> {
    if found != FILE_VERSION {
        return Err(EvalError::UnsupportedVersion { found, expected: FILE_VERSION });
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
pub struct UnitFile {
    pub version: u32,
    pub units: Vec<UnitInput>,
}

impl UnitFile {
    pub fn new(units: Vec<UnitInput>) -> Self {
        Self { version: FILE_VERSION, units }
    }
}

#[derive(Serialize)]
pub struct ReportFile<'a> {
    pub version: u32,
    pub reports: &'a [UnitReport],
}

#[derive(Encode, Decode)]
struct SnapshotFile {
    version: u32,
    units: Vec<Unit>,
}

// --- JSON (human-readable) ---
pub fn save_json<P: AsRef<Path>>(path: P, units: &[UnitInput]) -> EvalResult<()> {
    let mut f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut f, &UnitFile::new(units.to_vec()))?;
    f.flush()?;
    Ok(())
}

pub fn load_json<P: AsRef<Path>>(path: P) -> EvalResult<Vec<UnitInput>> {
    let f = BufReader::new(File::open(path)?);
    let uf: UnitFile = serde_json::from_reader(f)?;
    check_version(uf.version)?;
    Ok(uf.units)
}

pub fn save_reports_json<P: AsRef<Path>>(path: P, reports: &[UnitReport]) -> EvalResult<()> {
    let mut f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut f, &ReportFile { version: FILE_VERSION, reports })?;
    f.flush()?;
    Ok(())
}

// --- Bincode + optional zstd compression ---
pub fn save_bincode<P: AsRef<Path>>(path: P, units: &[Unit], compress: bool) -> EvalResult<()> {
    let f = File::create(path)?;
    let snapshot = SnapshotFile { version: FILE_VERSION, units: units.to_vec() };
    if compress {
        let mut zw = zstd::Encoder::new(f, 3)?;
        bincode::encode_into_std_write(snapshot, &mut zw, bincode::config::standard())?;
        zw.finish()?;
    } else {
        let mut bw = BufWriter::new(f);
        bincode::encode_into_std_write(snapshot, &mut bw, bincode::config::standard())?;
        bw.flush()?;
    }
    Ok(())
}

/// Loads a snapshot written by [`save_bincode`], compressed or not.
pub fn load_bincode<P: AsRef<Path>>(path: P) -> EvalResult<Vec<Unit>> {
    let mut reader = BufReader::new(File::open(path)?);
    let compressed = reader.fill_buf()?.starts_with(&ZSTD_MAGIC);

    let snapshot: SnapshotFile = if compressed {
        let mut zr = zstd::Decoder::with_buffer(reader)?;
        bincode::decode_from_std_read(&mut zr, bincode::config::standard())?
    } else {
        bincode::decode_from_std_read(&mut reader, bincode::config::standard())?
    };
    check_version(snapshot.version)?;
    Ok(snapshot.units)
}
