//! Summarize molecular-dynamics dump trajectories, one line per frame.
use std::io::{BufWriter, Write};
use std::num::{NonZeroU64, ParseIntError};
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use mdtrajectory::{
    dumpfiles, ChunkCheck, DumpReader, Format, Frame, FrameSelection, Range, Result,
};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

fn frame_selection_parser(selection: &str) -> std::result::Result<FrameSelection, ParseIntError> {
    let mut components = selection.split(':');
    let start = components
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .transpose()?;
    let end = components
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .transpose()?;
    let step = components
        .next()
        .filter(|s| !s.is_empty())
        .map(NonZeroU64::from_str)
        .transpose()?;
    Ok(FrameSelection::Range(Range::new(start, end, step)))
}

/// Print the timestep, atom count and box of each frame in one or more dump files.
#[derive(Parser)]
struct Args {
    /// Input dump files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Read the binary format instead of the text format.
    #[arg(short, long)]
    binary: bool,

    /// Read only the first frame of each input, treating every file as a single snapshot.
    #[arg(long)]
    first: bool,

    /// Frame selection in the format `start:stop:step`. Each of these values optional.
    ///
    /// - `:100` will select the first 100 frames.
    ///
    /// - `:100:2` will select every second frame from the the first 100 frames, 50 in total.
    #[arg(short, long, value_parser = frame_selection_parser)]
    frames: Option<FrameSelection>,

    /// Also print the mean of this column for every frame.
    #[arg(short, long)]
    column: Option<String>,

    /// Require the chunks of a binary frame to fill exactly as many rows as it has atoms.
    #[arg(long)]
    strict: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors.
    #[arg(short, long)]
    quiet: bool,
}

fn setup_logging(verbosity: u8, quiet: bool) {
    let level_filter = if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(level_filter)
        .with(stderr_layer)
        .init();
}

fn summarize(out: &mut impl Write, frame: &Frame, column: Option<&str>) -> Result<()> {
    let [xlo, xhi, ylo, yhi, zlo, zhi] = frame.bounds();
    let [xy, xz, yz] = frame.tilt();
    write!(
        out,
        "{}\t{}\t{xlo} {xhi} {ylo} {yhi} {zlo} {zhi}",
        frame.timestep(),
        frame.natoms()
    )?;
    if frame.is_triclinic() {
        write!(out, "\t{xy} {xz} {yz}")?;
    }
    if let Some(name) = column {
        let mean = frame.col(name)?.mean().unwrap_or(f64::NAN);
        write!(out, "\t{mean}")?;
    }
    writeln!(out)?;
    Ok(())
}

/// Writes a summary line for every frame it is extended with, instead of collecting them.
///
/// The first error is kept and later frames are dropped.
struct Summary<'c, W> {
    out: W,
    column: Option<&'c str>,
    error: Option<mdtrajectory::Error>,
}

impl<'c, W: Write> Summary<'c, W> {
    fn new(out: W, column: Option<&'c str>) -> Self {
        Self {
            out,
            column,
            error: None,
        }
    }

    fn finish(self) -> Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.out),
        }
    }
}

impl<W: Write> Extend<Frame> for Summary<'_, W> {
    fn extend<T: IntoIterator<Item = Frame>>(&mut self, frames: T) {
        for frame in frames {
            if self.error.is_some() {
                return;
            }
            if let Err(err) = summarize(&mut self.out, &frame, self.column) {
                self.error = Some(err);
            }
        }
    }
}

/// Summarizes the selected frames of a sequence of first frames, one per source.
///
/// An error is reported even when it comes from a source that is not selected.
fn summarize_first<W: Write>(
    summary: &mut Summary<'_, W>,
    frames: impl Iterator<Item = Result<Frame>>,
    frame_selection: &FrameSelection,
) -> Result<usize> {
    let mut n = 0;
    for (idx, frame) in frames.enumerate() {
        let frame = frame?;
        match frame_selection.is_included(idx) {
            Some(true) => summary.extend(Some(frame)),
            Some(false) => continue,
            None => break,
        }
        n += 1;
    }
    Ok(n)
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose, args.quiet);

    let format = if args.binary {
        Format::Binary
    } else {
        Format::Text
    };
    let chunk_check = if args.strict {
        ChunkCheck::Exact
    } else {
        ChunkCheck::Permissive
    };
    let frame_selection = args.frames.unwrap_or_default();

    let mut summary = Summary::new(
        BufWriter::new(std::io::stdout().lock()),
        args.column.as_deref(),
    );
    let mut n = 0;

    if args.first {
        let frames = dumpfiles(&args.inputs, format).with_chunk_check(chunk_check);
        n += summarize_first(&mut summary, frames, &frame_selection)?;
    } else {
        for path in &args.inputs {
            let mut reader = DumpReader::open(path, format)?.with_chunk_check(chunk_check);
            n += reader.read_frames(&mut summary, &frame_selection)?;
        }
    }

    summary.finish()?.flush()?;
    info!(n, "summarized frames");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use mdtrajectory::{Error, FirstFrames};

    use super::*;

    fn record(timestep: i64) -> String {
        format!(
            "ITEM: TIMESTEP\n{timestep}\nITEM: NUMBER OF ATOMS\n2\n\
             ITEM: BOX BOUNDS pp pp pp\n0 1\n0 2\n0 3\nITEM: ATOMS id x\n1 0.5\n2 1.5\n"
        )
    }

    #[test]
    fn frame_selection_syntax() {
        let FrameSelection::Range(range) = frame_selection_parser(":100:2").unwrap() else {
            panic!("expected a range");
        };
        assert_eq!(range.start, 0);
        assert_eq!(range.end, Some(100));
        assert_eq!(range.step.get(), 2);
        assert!(frame_selection_parser("1:2:0").is_err());
        assert!(frame_selection_parser("a:").is_err());
    }

    #[test]
    fn summary_lines_for_selected_frames() {
        let dump = [record(0), record(10), record(20)].concat();
        let mut reader = DumpReader::new(dump.as_bytes(), Format::Text);
        let mut summary = Summary::new(Vec::new(), Some("x"));
        let selection = frame_selection_parser("::2").unwrap();

        assert_eq!(reader.read_frames(&mut summary, &selection).unwrap(), 2);
        let out = String::from_utf8(summary.finish().unwrap()).unwrap();
        assert_eq!(out, "0\t2\t0 1 0 2 0 3\t1\n20\t2\t0 1 0 2 0 3\t1\n");
    }

    #[test]
    fn unknown_column_is_reported() {
        let text = record(0);
        let mut reader = DumpReader::new(text.as_bytes(), Format::Text);
        let mut summary = Summary::new(Vec::new(), Some("vx"));
        reader.read_frames(&mut summary, &FrameSelection::All).unwrap();
        assert!(matches!(summary.finish(), Err(Error::UnknownColumn(c)) if c == "vx"));
    }

    #[test]
    fn failing_source_outside_the_selection() {
        let missing = PathBuf::from("missing.txt");
        let sources: Vec<Result<Cursor<String>>> = vec![
            Err(Error::MissingSource(missing.clone())),
            Ok(Cursor::new(record(50))),
        ];
        let frames = FirstFrames::new(sources.into_iter(), Format::Text);
        let mut summary = Summary::new(Vec::new(), None);
        let selection = frame_selection_parser("1:").unwrap();

        let result = summarize_first(&mut summary, frames, &selection);
        assert!(matches!(result, Err(Error::MissingSource(p)) if p == missing));
        assert!(summary.finish().unwrap().is_empty());
    }
}
