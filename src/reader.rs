//! Fixed-size reads for the binary dump format.
//!
//! All values are stored in the native byte order of the machine that wrote the dump.

use std::io::{self, Read};

use crate::error::{Error, Result};

pub(crate) fn read_f64s<R: Read>(file: &mut R, buf: &mut [f64]) -> io::Result<()> {
    for value in buf {
        *value = read_f64(file)?
    }
    Ok(())
}

macro_rules! read_ne {
    ($name:ident, $ty:ty) => {
        pub(crate) fn $name<R: Read>(file: &mut R) -> io::Result<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            file.read_exact(&mut buf)?;
            Ok(<$ty>::from_ne_bytes(buf))
        }
    };
}

read_ne!(read_f64, f64);
read_ne!(read_i64, i64);
read_ne!(read_i32, i32);
read_ne!(read_u8, u8);

/// Read the first 8 bytes of a record, or [`None`] if the stream ends before them.
///
/// A stream holding between 1 and 7 bytes is treated as exhausted as well.
pub(crate) fn try_read_i64<R: Read>(file: &mut R) -> io::Result<Option<i64>> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => return Ok(None),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(Some(i64::from_ne_bytes(buf)))
}

/// Read exactly `n` bytes.
///
/// The buffer only grows with the bytes that are actually there, so a corrupt length cannot
/// request more memory than the stream holds.
pub(crate) fn read_bytes<R: Read>(file: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    file.by_ref().take(n as u64).read_to_end(&mut buf)?;
    if buf.len() < n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {n} bytes, but the stream ended after {}", buf.len()),
        ));
    }
    Ok(buf)
}

pub(crate) fn read_string<R: Read>(file: &mut R, n: usize) -> Result<String> {
    let bytes = read_bytes(file, n)?;
    let s = std::str::from_utf8(&bytes)?;
    Ok(s.to_owned())
}

/// Discard exactly `n` bytes, failing if the stream ends early.
pub(crate) fn skip_bytes<R: Read>(file: &mut R, n: u64) -> io::Result<()> {
    let skipped = io::copy(&mut file.take(n), &mut io::sink())?;
    if skipped < n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("could only skip {skipped} of {n} bytes"),
        ));
    }
    Ok(())
}

/// Read a 32-bit count and check that it is not negative.
pub(crate) fn read_count<R: Read>(file: &mut R, what: &'static str) -> Result<usize> {
    let value = read_i32(file)?;
    usize::try_from(value).map_err(|_| Error::InvalidValue {
        what,
        value: value as i64,
    })
}
