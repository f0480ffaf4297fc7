//! Lazy sequences of [`Frame`]s over one or more dump streams.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::iter::FusedIterator;
use std::path::Path;

use tracing::debug;

use crate::binary::ChunkCheck;
use crate::error::{Error, Result};
use crate::{DumpReader, Format, Frame};

/// Every frame of a single stream, in the order they are stored.
///
/// The stream is dropped as soon as it is exhausted or an error is returned, after which the
/// iterator only returns [`None`].
#[derive(Debug)]
pub struct Frames<R> {
    reader: Option<DumpReader<R>>,
}

impl<R: BufRead> Frames<R> {
    pub fn new(reader: DumpReader<R>) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

impl<R: BufRead> Iterator for Frames<R> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        match reader.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                debug!(nframes = reader.step(), "reached the end of the dump");
                self.reader = None;
                None
            }
            Err(err) => {
                self.reader = None;
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> FusedIterator for Frames<R> {}

/// The first frame of each stream in a list of streams.
///
/// Each source is opened when it is reached, and dropped once its first frame is decoded. A
/// source that fails to open ends the sequence with that error, without touching the sources
/// after it.
#[derive(Debug)]
pub struct FirstFrames<I> {
    sources: Option<I>,
    format: Format,
    chunk_check: ChunkCheck,
    index: usize,
}

impl<I> FirstFrames<I> {
    pub fn new(sources: I, format: Format) -> Self {
        Self {
            sources: Some(sources),
            format,
            chunk_check: ChunkCheck::default(),
            index: 0,
        }
    }

    pub fn with_chunk_check(mut self, chunk_check: ChunkCheck) -> Self {
        self.chunk_check = chunk_check;
        self
    }

    fn read_first<R: BufRead>(&self, source: Result<R>) -> Result<Frame> {
        let mut reader = DumpReader::new(source?, self.format).with_chunk_check(self.chunk_check);
        reader
            .read_frame()?
            .ok_or(Error::EmptySource { index: self.index })
    }
}

impl<I, R> Iterator for FirstFrames<I>
where
    I: Iterator<Item = Result<R>>,
    R: BufRead,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.sources.as_mut()?.next();
        let Some(source) = source else {
            self.sources = None;
            return None;
        };
        let frame = self.read_first(source);
        if frame.is_err() {
            self.sources = None;
        }
        self.index += 1;
        Some(frame)
    }
}

impl<I, R> FusedIterator for FirstFrames<I>
where
    I: Iterator<Item = Result<R>>,
    R: BufRead,
{
}

pub(crate) fn open_source(path: &Path) -> Result<BufReader<File>> {
    if !path.is_file() {
        return Err(Error::MissingSource(path.to_path_buf()));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Every frame in the dump file at `path`.
///
/// Fails with [`Error::MissingSource`] right away if there is no such file.
pub fn dumpfile<P: AsRef<Path>>(path: P, format: Format) -> Result<Frames<BufReader<File>>> {
    let reader = DumpReader::new(open_source(path.as_ref())?, format);
    Ok(reader.into_frames())
}

/// The first frame of each dump file in `paths`, in order.
///
/// Each path is checked when the sequence reaches it: a missing file yields
/// [`Error::MissingSource`] after the frames of the files before it have been returned.
pub fn dumpfiles<I>(
    paths: I,
    format: Format,
) -> FirstFrames<impl Iterator<Item = Result<BufReader<File>>>>
where
    I: IntoIterator,
    I::Item: AsRef<Path>,
{
    let sources = paths.into_iter().map(|path| open_source(path.as_ref()));
    FirstFrames::new(sources, format)
}
