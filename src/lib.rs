use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use glam::{DMat3, DVec3};
use ndarray::{Array2, ArrayView1, Axis};
use tracing::debug;

pub use crate::binary::ChunkCheck;
pub use crate::error::{Error, Result};
pub use crate::selection::{FrameSelection, Range};
pub use crate::sequence::{dumpfile, dumpfiles, FirstFrames, Frames};

pub mod binary;
mod error;
mod reader;
pub mod selection;
mod sequence;
pub mod text;

/// One decoded snapshot of a trajectory.
///
/// Two frames compare equal when their `timestep`, `natoms` and `columns` match. The box, tilt
/// and atom data are floating point payloads and are left out of the comparison; compare those
/// with a tolerance where needed.
#[derive(Debug, Clone)]
pub struct Frame {
    timestep: i64,
    natoms: i64,
    bounds: [f64; 6],
    tilt: [f64; 3],
    data: Array2<f64>,
    columns: Vec<String>,
}

impl Frame {
    pub(crate) fn new(
        timestep: i64,
        bounds: [f64; 6],
        tilt: [f64; 3],
        data: Array2<f64>,
        columns: Vec<String>,
    ) -> Self {
        debug_assert!(columns.is_empty() || columns.len() == data.ncols());
        Self {
            timestep,
            natoms: data.nrows() as i64,
            bounds,
            tilt,
            data,
            columns,
        }
    }

    /// The number of values in the atom data of a frame, or an error if a matrix of that size
    /// could never be allocated.
    pub(crate) fn data_len(natoms: usize, ncols: usize) -> Result<usize> {
        natoms
            .checked_mul(ncols)
            .filter(|&len| len <= isize::MAX as usize / std::mem::size_of::<f64>())
            .ok_or(Error::InvalidValue {
                what: "number of atoms",
                value: i64::try_from(natoms).unwrap_or(i64::MAX),
            })
    }

    pub fn timestep(&self) -> i64 {
        self.timestep
    }

    pub fn natoms(&self) -> i64 {
        self.natoms
    }

    /// The bounding box edges as `[xlo, xhi, ylo, yhi, zlo, zhi]`.
    pub fn bounds(&self) -> &[f64; 6] {
        &self.bounds
    }

    /// The shear factors `[xy, xz, yz]`. All zero for an orthogonal box.
    pub fn tilt(&self) -> &[f64; 3] {
        &self.tilt
    }

    /// The per-atom values, one row per atom and one column per field.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    /// The field names of the columns of [`Frame::data`].
    ///
    /// Empty if the dump did not record any names, as is the case for older binary dumps.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_triclinic(&self) -> bool {
        self.tilt != [0.0; 3]
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::UnknownColumn(name.to_owned()))
    }

    /// Returns the column of [`Frame::data`] with the field `name`.
    pub fn col(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        if self.columns.is_empty() {
            return Err(Error::NoColumns);
        }
        let idx = self.column_index(name)?;
        Ok(self.data.column(idx))
    }

    /// Returns an `natoms × names.len()` matrix holding the requested columns in request order.
    ///
    /// Names may repeat, each occurrence is looked up on its own.
    pub fn cols(&self, names: &[&str]) -> Result<Array2<f64>> {
        if self.columns.is_empty() {
            return Err(Error::NoColumns);
        }
        if names.is_empty() {
            return Err(Error::NoColumnsRequested);
        }
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.data.select(Axis(1), &indices))
    }

    /// Iterate over the rows of three columns as vectors, e.g. `frame.coords("x", "y", "z")`.
    pub fn coords<'f>(
        &'f self,
        x: &str,
        y: &str,
        z: &str,
    ) -> Result<impl Iterator<Item = DVec3> + 'f> {
        let (x, y, z) = (self.col(x)?, self.col(y)?, self.col(z)?);
        Ok((0..self.data.nrows()).map(move |i| DVec3::new(x[i], y[i], z[i])))
    }

    // The bounds of a triclinic box enclose the tilted cell, so the tilt extents are removed
    // again to recover the cell edges.
    fn edges(&self) -> [f64; 6] {
        let [xlo, xhi, ylo, yhi, zlo, zhi] = self.bounds;
        let [xy, xz, yz] = self.tilt;
        let xmin = 0.0f64.min(xy).min(xz).min(xy + xz);
        let xmax = 0.0f64.max(xy).max(xz).max(xy + xz);
        [
            xlo - xmin,
            xhi - xmax,
            ylo - 0.0f64.min(yz),
            yhi - 0.0f64.max(yz),
            zlo,
            zhi,
        ]
    }

    /// The lower corner of the simulation cell.
    pub fn origin(&self) -> DVec3 {
        let [xlo, _, ylo, _, zlo, _] = self.edges();
        DVec3::new(xlo, ylo, zlo)
    }

    /// The edge lengths `(lx, ly, lz)` of the simulation cell.
    pub fn lengths(&self) -> DVec3 {
        let [xlo, xhi, ylo, yhi, zlo, zhi] = self.edges();
        DVec3::new(xhi - xlo, yhi - ylo, zhi - zlo)
    }

    /// The cell matrix, with the lattice vectors `a`, `b` and `c` as its columns.
    pub fn cell(&self) -> DMat3 {
        let l = self.lengths();
        let [xy, xz, yz] = self.tilt;
        DMat3::from_cols(
            DVec3::new(l.x, 0.0, 0.0),
            DVec3::new(xy, l.y, 0.0),
            DVec3::new(xz, yz, l.z),
        )
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.timestep == other.timestep
            && self.natoms == other.natoms
            && self.columns == other.columns
    }
}

/// The on-disk encoding of a dump.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The line-oriented `ITEM:` format.
    #[default]
    Text,
    /// The compact binary format.
    Binary,
}

impl Format {
    pub fn read_frame<R: BufRead>(
        self,
        reader: &mut R,
        chunk_check: ChunkCheck,
    ) -> Result<Option<Frame>> {
        match self {
            Format::Text => text::read_frame(reader),
            Format::Binary => binary::read_frame(reader, chunk_check),
        }
    }

    pub fn skip_frame<R: BufRead>(self, reader: &mut R) -> Result<Option<i64>> {
        match self {
            Format::Text => text::skip_frame(reader),
            Format::Binary => binary::skip_frame(reader),
        }
    }
}

#[derive(Debug)]
pub struct DumpReader<R> {
    pub file: R,
    format: Format,
    chunk_check: ChunkCheck,
    step: usize,
}

impl DumpReader<BufReader<File>> {
    /// Open the dump at `path`, failing with [`Error::MissingSource`] if there is no such file.
    pub fn open<P: AsRef<Path>>(path: P, format: Format) -> Result<Self> {
        let file = sequence::open_source(path.as_ref())?;
        Ok(Self::new(file, format))
    }
}

impl<R: BufRead> DumpReader<R> {
    pub fn new(reader: R, format: Format) -> Self {
        Self {
            file: reader,
            format,
            chunk_check: ChunkCheck::default(),
            step: 0,
        }
    }

    /// Set how strictly the chunks of a binary frame are checked against its atom count.
    pub fn with_chunk_check(mut self, chunk_check: ChunkCheck) -> Self {
        self.chunk_check = chunk_check;
        self
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// The number of records that have been read or skipped so far.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Reads and returns the next [`Frame`], or [`None`] once the stream is exhausted.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.format.read_frame(&mut self.file, self.chunk_check)?;
        if frame.is_some() {
            self.step += 1;
        }
        Ok(frame)
    }

    /// Advances past the next record without decoding its atom data, returning its timestep.
    pub fn skip_frame(&mut self) -> Result<Option<i64>> {
        let timestep = self.format.skip_frame(&mut self.file)?;
        if timestep.is_some() {
            self.step += 1;
        }
        Ok(timestep)
    }

    /// A convenience function to read all remaining frames in a trajectory.
    ///
    /// Use [`DumpReader::into_frames`] to go through a long trajectory one frame at a time
    /// instead.
    pub fn read_all_frames(&mut self) -> Result<Box<[Frame]>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.read_frame()? {
            frames.push(frame);
        }
        Ok(frames.into_boxed_slice())
    }

    /// Append [`Frame`]s to the `frames` buffer according to a [`FrameSelection`].
    ///
    /// Frame indices count from the current position of the reader. Frames that are not selected
    /// are skipped without decoding their atom data. Returns the number of frames that were read.
    pub fn read_frames(
        &mut self,
        frames: &mut impl Extend<Frame>,
        frame_selection: &FrameSelection,
    ) -> Result<usize> {
        let mut n = 0;
        for idx in 0.. {
            match frame_selection.is_included(idx) {
                Some(true) => match self.read_frame()? {
                    Some(frame) => frames.extend(Some(frame)),
                    None => break,
                },
                Some(false) => {
                    if self.skip_frame()?.is_none() {
                        break;
                    }
                    continue;
                }
                None => break,
            }
            n += 1;
        }
        debug!(n, "read selected frames");
        Ok(n)
    }

    /// Turn this reader into a lazy sequence of its remaining frames.
    pub fn into_frames(self) -> Frames<R> {
        Frames::new(self)
    }
}

impl<R: BufRead + Seek> DumpReader<R> {
    /// Rewind to the start of the trajectory.
    pub fn home(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.step = 0;
        Ok(())
    }

    /// Returns the byte offsets at which the records of this trajectory start, scanning at most
    /// `until` records from the current position.
    ///
    /// The position of the reader is restored afterwards.
    pub fn determine_offsets(&mut self, until: Option<usize>) -> Result<Box<[u64]>> {
        let start_pos = self.file.stream_position()?;
        let step = self.step;

        let mut offsets = Vec::new();
        while until.map_or(true, |until| offsets.len() < until) {
            let offset = self.file.stream_position()?;
            if self.skip_frame()?.is_none() {
                break;
            }
            offsets.push(offset);
        }

        self.file.seek(SeekFrom::Start(start_pos))?;
        self.step = step;

        Ok(offsets.into_boxed_slice())
    }

    /// Seeks to `offset`, then reads and returns the [`Frame`] that starts there.
    pub fn read_frame_at_offset(&mut self, offset: u64) -> Result<Option<Frame>> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.read_frame()
    }

    /// Returns the first frame with the given `timestep`, searching from the start of the
    /// trajectory.
    ///
    /// Timesteps increase through a dump, so the search gives up at the first larger timestep.
    pub fn find_timestep(&mut self, timestep: i64) -> Result<Option<Frame>> {
        self.home()?;
        loop {
            let offset = self.file.stream_position()?;
            match self.skip_frame()? {
                Some(t) if t == timestep => {
                    // Step back onto the record that was just skipped.
                    self.step -= 1;
                    return self.read_frame_at_offset(offset);
                }
                Some(t) if t > timestep => return Ok(None),
                Some(_) => {}
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn frame() -> Frame {
        Frame::new(
            100,
            [0.0, 10.0, 0.0, 20.0, 0.0, 30.0],
            [0.0; 3],
            array![[1.0, 0.5, 0.25], [2.0, 1.5, 1.25], [3.0, 2.5, 2.25]],
            vec!["id".into(), "x".into(), "y".into()],
        )
    }

    #[test]
    fn single_column() {
        let frame = frame();
        assert_eq!(frame.col("x").unwrap(), array![0.5, 1.5, 2.5]);
        assert_eq!(frame.col("id").unwrap(), frame.data().column(0));
    }

    #[test]
    fn columns_in_request_order() {
        let frame = frame();
        let yx = frame.cols(&["y", "x"]).unwrap();
        assert_eq!(yx.dim(), (3, 2));
        assert_eq!(yx.column(0), frame.col("y").unwrap());
        assert_eq!(yx.column(1), frame.col("x").unwrap());

        let xx = frame.cols(&["x", "x"]).unwrap();
        assert_eq!(xx.column(0), xx.column(1));
    }

    #[test]
    fn lookup_errors() {
        let frame = frame();
        assert!(matches!(frame.cols(&[]), Err(Error::NoColumnsRequested)));
        assert!(matches!(frame.col("vx"), Err(Error::UnknownColumn(c)) if c == "vx"));
        assert!(matches!(frame.cols(&["x", "vx"]), Err(Error::UnknownColumn(_))));

        let unnamed = Frame::new(0, [0.0; 6], [0.0; 3], Array2::zeros((2, 3)), Vec::new());
        assert!(matches!(unnamed.col("x"), Err(Error::NoColumns)));
        assert!(matches!(unnamed.cols(&[]), Err(Error::NoColumns)));
        assert!(unnamed.cols(&["x"]).unwrap_err().is_lookup());
    }

    #[test]
    fn equality_ignores_payload() {
        let a = frame();
        let b = Frame::new(
            100,
            [1.0; 6],
            [0.1, 0.2, 0.3],
            Array2::ones((3, 3)),
            vec!["id".into(), "x".into(), "y".into()],
        );
        assert_eq!(a, b);

        let c = Frame::new(
            150,
            *a.bounds(),
            *a.tilt(),
            a.data().clone(),
            a.columns().to_vec(),
        );
        assert_ne!(a, c);
    }

    #[test]
    fn orthogonal_cell() {
        let frame = frame();
        assert!(!frame.is_triclinic());
        assert_eq!(frame.lengths(), DVec3::new(10.0, 20.0, 30.0));
        assert_eq!(frame.cell(), DMat3::from_diagonal(DVec3::new(10.0, 20.0, 30.0)));
        assert_eq!(frame.origin(), DVec3::ZERO);
    }

    #[test]
    fn triclinic_cell() {
        // A 10 × 10 × 10 cell with xy = 2 and yz = -1, written as its bounding box.
        let frame = Frame::new(
            0,
            [0.0, 12.0, -1.0, 10.0, 0.0, 10.0],
            [2.0, 0.0, -1.0],
            Array2::zeros((0, 0)),
            Vec::new(),
        );
        assert!(frame.is_triclinic());
        assert_eq!(frame.origin(), DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(frame.lengths(), DVec3::new(10.0, 10.0, 10.0));
        let cell = frame.cell();
        assert_eq!(cell.y_axis, DVec3::new(2.0, 10.0, 0.0));
        assert_eq!(cell.z_axis, DVec3::new(0.0, -1.0, 10.0));
    }

    #[test]
    fn coords_from_named_columns() {
        let frame = frame();
        let coords: Vec<_> = frame.coords("x", "y", "id").unwrap().collect();
        assert_eq!(coords[2], DVec3::new(2.5, 2.25, 3.0));
        assert!(frame.coords("x", "y", "z").is_err());
    }
}
