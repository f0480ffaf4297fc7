//! Decoding of the line-oriented text dump format.
//!
//! A record is a header of `ITEM: <KEYWORD>` lines, each followed by its value lines, closed by
//! an `ITEM: ATOMS <columns...>` line and `natoms` rows of whitespace-separated numbers.
//!
//! ```text
//! ITEM: TIMESTEP
//! 0
//! ITEM: NUMBER OF ATOMS
//! 2
//! ITEM: BOX BOUNDS pp pp pp
//! 0.0 16.8
//! 0.0 16.8
//! 0.0 16.8
//! ITEM: ATOMS id type x y z
//! 1 1 0.0 0.0 0.0
//! 2 1 1.2 0.4 3.3
//! ```

use std::io::{self, BufRead};
use std::str::FromStr;

use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::Frame;

const ITEM_MARKER: &str = "ITEM:";

/// Keywords longer than this carry the `xy xz yz` suffix of a triclinic box.
const TRICLINIC_KEYWORD_LEN: usize = 20;

const ROWS_PREALLOCATED: usize = 1 << 16;

/// A header item, as announced by an `ITEM:` line.
#[derive(Debug, PartialEq)]
enum Item<'l> {
    Units,
    Time,
    Timestep,
    NumberOfAtoms,
    BoxBounds { triclinic: bool },
    Atoms { columns: &'l str },
}

impl<'l> Item<'l> {
    fn parse(line: &'l str) -> Result<Self> {
        let keyword = line
            .strip_prefix(ITEM_MARKER)
            .ok_or_else(|| Error::MalformedHeader(line.to_owned()))?
            .trim();

        let item = match keyword {
            "UNITS" => Item::Units,
            "TIME" => Item::Time,
            "TIMESTEP" => Item::Timestep,
            "NUMBER OF ATOMS" => Item::NumberOfAtoms,
            k if k.starts_with("BOX") => Item::BoxBounds {
                triclinic: k.len() > TRICLINIC_KEYWORD_LEN,
            },
            k if k.starts_with("ATOMS") => Item::Atoms {
                columns: &k["ATOMS".len()..],
            },
            k => return Err(Error::UnknownItem(k.to_owned())),
        };
        Ok(item)
    }
}

struct Header {
    timestep: i64,
    natoms: usize,
    bounds: [f64; 6],
    tilt: [f64; 3],
    columns: Vec<String>,
}

fn parse_value<T: FromStr>(value: &str, what: &'static str) -> Result<T> {
    value.parse().map_err(|_| Error::Parse {
        what,
        value: value.to_owned(),
    })
}

/// Reads the next line of a record, where running out of lines means the record is cut short.
fn next_line<R: BufRead>(reader: &mut R, line: &mut String) -> Result<()> {
    line.clear();
    if reader.read_line(line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended inside a frame header",
        )
        .into());
    }
    Ok(())
}

fn read_box<R: BufRead>(
    reader: &mut R,
    line: &mut String,
    triclinic: bool,
) -> Result<([f64; 6], [f64; 3])> {
    let mut bounds = [0.0; 6];
    let mut tilt = [0.0; 3];
    for i in 0..3 {
        next_line(reader, line)?;
        let mut values = line.split_whitespace();
        let mut next = || {
            let value = values.next().ok_or_else(|| Error::Parse {
                what: "box bounds",
                value: line.trim().to_owned(),
            })?;
            parse_value::<f64>(value, "box bounds")
        };
        bounds[2 * i] = next()?;
        bounds[2 * i + 1] = next()?;
        if triclinic {
            tilt[i] = next()?;
        }
    }
    Ok((bounds, tilt))
}

fn read_header<R: BufRead>(reader: &mut R, line: &mut String) -> Result<Option<Header>> {
    line.clear();
    reader.read_line(line)?;
    if line.trim().is_empty() {
        return Ok(None);
    }

    let mut timestep = None;
    let mut natoms = None;
    let mut bounds = [0.0; 6];
    let mut tilt = [0.0; 3];
    let mut current = line.trim().to_owned();

    let columns: Vec<String> = loop {
        match Item::parse(&current)? {
            Item::Units | Item::Time => next_line(reader, line)?,
            Item::Timestep => {
                next_line(reader, line)?;
                timestep = Some(parse_value::<i64>(line.trim(), "timestep")?);
            }
            Item::NumberOfAtoms => {
                next_line(reader, line)?;
                let n = parse_value::<i64>(line.trim(), "number of atoms")?;
                let n = usize::try_from(n).map_err(|_| Error::InvalidValue {
                    what: "number of atoms",
                    value: n,
                })?;
                natoms = Some(n);
            }
            Item::BoxBounds { triclinic } => (bounds, tilt) = read_box(reader, line, triclinic)?,
            Item::Atoms { columns } => {
                break columns.split_whitespace().map(String::from).collect();
            }
        }

        next_line(reader, line)?;
        current.clear();
        current.push_str(line.trim());
        if !current.starts_with(ITEM_MARKER) {
            return Err(Error::MalformedHeader(current));
        }
    };

    let header = Header {
        timestep: timestep.ok_or(Error::MissingItem("TIMESTEP"))?,
        natoms: natoms.ok_or(Error::MissingItem("NUMBER OF ATOMS"))?,
        bounds,
        tilt,
        columns,
    };
    debug!(
        timestep = header.timestep,
        natoms = header.natoms,
        ncols = header.columns.len(),
        "read text frame header"
    );
    Ok(Some(header))
}

fn read_rows<R: BufRead>(
    reader: &mut R,
    line: &mut String,
    natoms: usize,
    ncols: usize,
) -> Result<Array2<f64>> {
    // Values are collected as rows come in, so memory follows the rows that are really there.
    let len = Frame::data_len(natoms, ncols)?;
    let mut values = Vec::with_capacity(len.min(ROWS_PREALLOCATED * ncols));
    for row in 0..natoms {
        line.clear();
        if reader.read_line(line)? == 0 {
            return Err(Error::TruncatedData {
                expected: natoms,
                found: row,
            });
        }
        let mut found = 0;
        for field in line.split_whitespace() {
            if found < ncols {
                values.push(parse_value(field, "atom value")?);
            }
            found += 1;
        }
        if found != ncols {
            return Err(Error::RowLength {
                row,
                expected: ncols,
                found,
            });
        }
    }
    Ok(Array2::from_shape_vec((natoms, ncols), values)?)
}

/// Reads one [`Frame`] from a text dump.
///
/// Returns [`None`] if the stream is exhausted, which is signalled by an empty first line.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<Frame>> {
    let mut line = String::new();
    let Some(header) = read_header(reader, &mut line)? else {
        return Ok(None);
    };
    let data = read_rows(reader, &mut line, header.natoms, header.columns.len())?;
    Ok(Some(Frame::new(
        header.timestep,
        header.bounds,
        header.tilt,
        data,
        header.columns,
    )))
}

/// Advances past one record of a text dump, returning its timestep.
pub fn skip_frame<R: BufRead>(reader: &mut R) -> Result<Option<i64>> {
    let mut line = String::new();
    let Some(header) = read_header(reader, &mut line)? else {
        return Ok(None);
    };
    for row in 0..header.natoms {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::TruncatedData {
                expected: header.natoms,
                found: row,
            });
        }
    }
    Ok(Some(header.timestep))
}
