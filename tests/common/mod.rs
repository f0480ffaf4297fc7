#![allow(dead_code)]

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use mdtrajectory::Frame;

pub const BOX_UPPER_BOUND: f64 = 16.795961913825074;

pub const COLUMNS: [&str; 11] = [
    "id", "type", "x", "y", "z", "xu", "yu", "zu", "vx", "vy", "vz",
];

/// The snapshot that a test trajectory is generated from, encodable in both dump formats.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestep: i64,
    pub bounds: [f64; 6],
    pub tilt: Option<[f64; 3]>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// A tiny linear congruential generator, so trajectories are reproducible.
fn lcg(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (*state >> 11) as f64 / (1u64 << 53) as f64
}

impl Snapshot {
    /// A cubic box of `natoms` atoms with the usual `id type x y z xu yu zu vx vy vz` columns.
    pub fn cubic(timestep: i64, natoms: usize) -> Self {
        let mut state = timestep as u64 + 1;
        let rows = (0..natoms)
            .map(|i| {
                let mut row = vec![(i + 1) as f64, 1.0];
                let pos: Vec<f64> = (0..3).map(|_| lcg(&mut state) * BOX_UPPER_BOUND).collect();
                row.extend(&pos);
                row.extend(&pos);
                row.extend((0..3).map(|_| lcg(&mut state) * 2.0 - 1.0));
                row
            })
            .collect();
        Self {
            timestep,
            bounds: [0.0, BOX_UPPER_BOUND, 0.0, BOX_UPPER_BOUND, 0.0, BOX_UPPER_BOUND],
            tilt: None,
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn triclinic(mut self, tilt: [f64; 3]) -> Self {
        self.tilt = Some(tilt);
        self
    }

    pub fn natoms(&self) -> usize {
        self.rows.len()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        writeln!(out, "ITEM: UNITS\nlj").unwrap();
        writeln!(out, "ITEM: TIMESTEP\n{}", self.timestep).unwrap();
        writeln!(out, "ITEM: TIME\n{}", self.timestep as f64 * 0.005).unwrap();
        writeln!(out, "ITEM: NUMBER OF ATOMS\n{}", self.natoms()).unwrap();
        match self.tilt {
            None => writeln!(out, "ITEM: BOX BOUNDS pp pp pp").unwrap(),
            Some(_) => writeln!(out, "ITEM: BOX BOUNDS xy xz yz pp pp pp").unwrap(),
        }
        for i in 0..3 {
            write!(out, "{} {}", self.bounds[2 * i], self.bounds[2 * i + 1]).unwrap();
            if let Some(tilt) = self.tilt {
                write!(out, " {}", tilt[i]).unwrap();
            }
            writeln!(out).unwrap();
        }
        writeln!(out, "ITEM: ATOMS {}", self.columns.join(" ")).unwrap();
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", fields.join(" ")).unwrap();
        }
        out
    }

    /// Encode as a binary record of the given `revision` (0 for the legacy layout), with at most
    /// `chunk_rows` atom rows per chunk.
    pub fn to_binary(&self, revision: i32, chunk_rows: usize) -> Vec<u8> {
        let mut out = Vec::new();
        if revision == 0 {
            out.extend(self.timestep.to_ne_bytes());
        } else {
            let magic = b"DUMPATOM";
            out.extend((-(magic.len() as i64)).to_ne_bytes());
            out.extend(magic);
            out.extend(1i32.to_ne_bytes());
            out.extend(revision.to_ne_bytes());
            out.extend(self.timestep.to_ne_bytes());
        }
        out.extend((self.natoms() as i64).to_ne_bytes());
        out.extend((self.tilt.is_some() as i32).to_ne_bytes());
        for _ in 0..6 {
            out.extend(0i32.to_ne_bytes());
        }
        for v in self.bounds {
            out.extend(v.to_ne_bytes());
        }
        if let Some(tilt) = self.tilt {
            for v in tilt {
                out.extend(v.to_ne_bytes());
            }
        }
        let ncols = self.columns.len() as i32;
        out.extend(ncols.to_ne_bytes());
        if revision > 1 {
            out.extend(2i32.to_ne_bytes());
            out.extend(b"lj");
            out.push(1);
            out.extend((self.timestep as f64 * 0.005).to_ne_bytes());
            let names = self.columns.join(" ");
            out.extend((names.len() as i32).to_ne_bytes());
            out.extend(names.as_bytes());
        }
        let chunks: Vec<_> = self.rows.chunks(chunk_rows.max(1)).collect();
        out.extend((chunks.len() as i32).to_ne_bytes());
        for chunk in chunks {
            out.extend(((chunk.len() as i32) * ncols).to_ne_bytes());
            for v in chunk.iter().flatten() {
                out.extend(v.to_ne_bytes());
            }
        }
        out
    }
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
}

/// Assert that two frames describe the same snapshot, comparing the payloads with a tolerance.
pub fn assert_same_snapshot(a: &Frame, b: &Frame) {
    assert_eq!(a, b, "timestep, natoms or columns differ");
    for (x, y) in a.bounds().iter().zip(b.bounds()) {
        assert!(approx_eq(*x, *y), "box differs: {x} vs {y}");
    }
    for (x, y) in a.tilt().iter().zip(b.tilt()) {
        assert!(approx_eq(*x, *y), "tilt differs: {x} vs {y}");
    }
    assert_eq!(a.data().dim(), b.data().dim());
    for (x, y) in a.data().iter().zip(b.data()) {
        assert!(approx_eq(*x, *y), "data differs: {x} vs {y}");
    }
}

/// Write each of `contents` to its own file in `dir`, returning the paths in order.
pub fn write_files(dir: &Path, ext: &str, contents: &[Vec<u8>]) -> Vec<PathBuf> {
    contents
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            let path = dir.join(format!("dump.{i}.{ext}"));
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(bytes).unwrap();
            path
        })
        .collect()
}
