//! Decoding of the binary dump format.
//!
//! A record consists of a header, optional metadata and the atom data in chunks:
//!
//! | field                    | size                                  |
//! |--------------------------|---------------------------------------|
//! | timestep or `-len(magic)` | 8                                    |
//! | magic, endian, revision, timestep | `len(magic)` + 4 + 4 + 8 (only if negative) |
//! | natoms                   | 8                                     |
//! | triclinic                | 4                                     |
//! | boundary                 | 6 × 4                                 |
//! | box                      | 6 × 8                                 |
//! | tilt                     | 3 × 8 (only if triclinic)             |
//! | ncols                    | 4                                     |
//! | units, time, columns     | variable (only if revision > 1)       |
//! | nchunk                   | 4                                     |
//! | chunk                    | 4 + n × 8, repeated nchunk times      |
//!
//! All values are in the native byte order of the writing machine.

use std::io::Read;

use ndarray::Array2;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::reader::{
    read_bytes, read_count, read_f64, read_f64s, read_i32, read_i64, read_string, read_u8,
    skip_bytes, try_read_i64,
};
use crate::Frame;

/// The endian marker written by a little-endian machine, as read on a little-endian machine.
const ENDIAN_MARKER: i32 = 0x0001;

/// How strictly the chunks of a binary frame are checked against the frame's atom count.
///
/// Chunks holding more rows than the frame has atoms are always rejected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChunkCheck {
    /// Accept chunks that fill fewer than `natoms` rows. The missing rows are left zero.
    #[default]
    Permissive,
    /// Require the chunks to fill exactly `natoms` rows.
    Exact,
}

/// The header layout, decided once from the revision of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Revisions up to 1: no metadata after the column count, no column names.
    Bare,
    /// Revisions from 2: units, time and column names follow the column count.
    Described,
}

impl Layout {
    fn for_revision(revision: i32) -> Self {
        if revision > 1 {
            Layout::Described
        } else {
            Layout::Bare
        }
    }
}

#[derive(Debug)]
struct Header {
    timestep: i64,
    natoms: usize,
    bounds: [f64; 6],
    tilt: [f64; 3],
    ncols: usize,
    columns: Vec<String>,
}

/// Reads the leading word and, for the extended layout, the magic string that follows it.
///
/// Returns the timestep and revision of the record.
fn read_preamble<R: Read>(file: &mut R) -> Result<Option<(i64, i32)>> {
    let Some(lead) = try_read_i64(file)? else {
        return Ok(None);
    };
    if lead >= 0 {
        return Ok(Some((lead, 0)));
    }

    let magic_len = lead
        .checked_neg()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(Error::InvalidValue {
            what: "magic string length",
            value: lead,
        })?;
    let magic = read_string(file, magic_len)?;
    let endian = read_i32(file)?;
    if endian != ENDIAN_MARKER {
        warn!(endian, "unexpected endian marker, the dump may be from another architecture");
    }
    let revision = read_i32(file)?;
    let timestep = read_i64(file)?;
    trace!(magic = %magic, revision, "read extended preamble");
    Ok(Some((timestep, revision)))
}

/// Reads the units, time and column names of a [`Layout::Described`] header.
fn read_description<R: Read>(file: &mut R) -> Result<Vec<String>> {
    let nunits = read_count(file, "units length")?;
    if nunits > 0 {
        let units = read_string(file, nunits)?;
        trace!(units = %units, "skipping units");
    }

    if read_u8(file)? != 0 {
        let time = read_f64(file)?;
        trace!(time, "skipping time");
    }

    let ncolumns = read_count(file, "column names length")?;
    let columns = read_string(file, ncolumns)?;
    Ok(columns.split_whitespace().map(String::from).collect())
}

fn read_header<R: Read>(file: &mut R) -> Result<Option<Header>> {
    let Some((timestep, revision)) = read_preamble(file)? else {
        return Ok(None);
    };
    let layout = Layout::for_revision(revision);

    let natoms = read_i64(file)?;
    let natoms = usize::try_from(natoms).map_err(|_| Error::InvalidValue {
        what: "number of atoms",
        value: natoms,
    })?;
    let triclinic = read_i32(file)? != 0;
    let mut boundary = [0i32; 6];
    for code in &mut boundary {
        *code = read_i32(file)?;
    }
    let mut bounds = [0.0; 6];
    read_f64s(file, &mut bounds)?;
    let mut tilt = [0.0; 3];
    if triclinic {
        read_f64s(file, &mut tilt)?;
    }
    let ncols = read_count(file, "number of columns")?;

    let columns = match layout {
        Layout::Bare => Vec::new(),
        Layout::Described => read_description(file)?,
    };
    if !columns.is_empty() && columns.len() != ncols {
        return Err(Error::ColumnNames {
            expected: ncols,
            found: columns.len(),
        });
    }

    debug!(timestep, natoms, ncols, revision, ?boundary, "read binary frame header");
    Ok(Some(Header {
        timestep,
        natoms,
        bounds,
        tilt,
        ncols,
        columns,
    }))
}

/// The number of rows held by a chunk of `n` values.
fn chunk_rows(chunk: usize, n: usize, ncols: usize) -> Result<usize> {
    if ncols == 0 {
        return match n {
            0 => Ok(0),
            _ => Err(Error::Chunk(format!(
                "chunk {chunk} holds {n} values, but the frame has no columns"
            ))),
        };
    }
    if n % ncols != 0 {
        return Err(Error::Chunk(format!(
            "chunk {chunk} holds {n} values, which is not a multiple of {ncols} columns"
        )));
    }
    Ok(n / ncols)
}

fn read_chunks<R: Read>(
    file: &mut R,
    natoms: usize,
    ncols: usize,
    chunk_check: ChunkCheck,
) -> Result<Array2<f64>> {
    let len = Frame::data_len(natoms, ncols)?;
    let nchunk = read_count(file, "chunk count")?;
    // Values are collected chunk by chunk, so memory follows the bytes that are really there.
    let mut values = Vec::new();
    let mut row = 0;
    for chunk in 0..nchunk {
        let n = read_count(file, "chunk length")?;
        let nrows = chunk_rows(chunk, n, ncols)?;
        if row + nrows > natoms {
            return Err(Error::Chunk(format!(
                "chunk {chunk} holds {nrows} rows, but only {} of {natoms} rows remain",
                natoms - row
            )));
        }
        trace!(chunk, nrows, "reading chunk");

        let bytes = read_bytes(file, n * std::mem::size_of::<f64>())?;
        values.extend(bytes.chunks_exact(std::mem::size_of::<f64>()).map(|b| {
            let mut word = [0u8; 8];
            word.copy_from_slice(b);
            f64::from_ne_bytes(word)
        }));
        row += nrows;
    }

    if row != natoms {
        match chunk_check {
            ChunkCheck::Exact => {
                return Err(Error::RowCount {
                    expected: natoms,
                    found: row,
                })
            }
            ChunkCheck::Permissive => {
                warn!(natoms, filled = row, "chunks did not fill every atom row");
                values
                    .try_reserve_exact(len - values.len())
                    .map_err(|_| Error::InvalidValue {
                        what: "number of atoms",
                        value: natoms as i64,
                    })?;
                values.resize(len, 0.0);
            }
        }
    }
    Ok(Array2::from_shape_vec((natoms, ncols), values)?)
}

/// Reads one [`Frame`] from a binary dump.
///
/// Returns [`None`] if fewer than 8 bytes remain in the stream.
pub fn read_frame<R: Read>(file: &mut R, chunk_check: ChunkCheck) -> Result<Option<Frame>> {
    let Some(header) = read_header(file)? else {
        return Ok(None);
    };
    let data = read_chunks(file, header.natoms, header.ncols, chunk_check)?;
    Ok(Some(Frame::new(
        header.timestep,
        header.bounds,
        header.tilt,
        data,
        header.columns,
    )))
}

/// Advances past one record of a binary dump without decoding its atom data, returning its
/// timestep.
pub fn skip_frame<R: Read>(file: &mut R) -> Result<Option<i64>> {
    let Some(header) = read_header(file)? else {
        return Ok(None);
    };
    let nchunk = read_count(file, "chunk count")?;
    for _ in 0..nchunk {
        let n = read_count(file, "chunk length")?;
        skip_bytes(file, n as u64 * std::mem::size_of::<f64>() as u64)?;
    }
    Ok(Some(header.timestep))
}
