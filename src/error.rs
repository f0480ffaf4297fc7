use std::io;
use std::path::PathBuf;
use std::str::Utf8Error;

use ndarray::ShapeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not locate dump file {0}")]
    MissingSource(PathBuf),
    #[error("source {index} does not contain a frame")]
    EmptySource { index: usize },

    #[error("unrecognized header item '{0}'")]
    UnknownItem(String),
    #[error("malformed header, expected an 'ITEM:' line but found '{0}'")]
    MalformedHeader(String),
    #[error("frame header is missing the '{0}' item")]
    MissingItem(&'static str),
    #[error("could not parse {what} from '{value}'")]
    Parse { what: &'static str, value: String },
    #[error("row {row} has {found} values, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("expected {expected} atom rows, but the stream ended after {found}")]
    TruncatedData { expected: usize, found: usize },

    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: i64 },
    #[error("malformed chunk: {0}")]
    Chunk(String),
    #[error("chunks filled {found} atom rows, expected {expected}")]
    RowCount { expected: usize, found: usize },
    #[error("header names {found} columns, but the frame has {expected}")]
    ColumnNames { expected: usize, found: usize },
    #[error("atom data does not fit its frame: {0}")]
    Shape(#[from] ShapeError),
    #[error("string in binary header is not valid UTF-8: {0}")]
    Encoding(#[from] Utf8Error),

    #[error("no column names were recorded for this frame")]
    NoColumns,
    #[error("no column names were requested")]
    NoColumnsRequested,
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

impl Error {
    /// Whether this is one of the errors returned by a column lookup on a
    /// [`Frame`](crate::Frame).
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Error::NoColumns | Error::NoColumnsRequested | Error::UnknownColumn(_)
        )
    }

    /// Whether the underlying stream ended before a record was complete.
    pub fn is_truncated(&self) -> bool {
        match self {
            Error::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
            Error::TruncatedData { .. } => true,
            _ => false,
        }
    }
}
