//! ASCII PLY point clouds.
//!
//! The header is fixed:
//!
//! ```text
//! ply
//! format ascii 1.0
//! element vertex <N>
//! property float x
//! property float y
//! property float z
//! end_header
//! ```
//!
//! followed by one `x y z` line per point in cloud order. Values are written
//! with their shortest round-trip representation, without rescaling.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use scan_core::pointcloud::point::PointCloud;

#[derive(Debug, Error)]
pub enum PlyError {
    #[error("point cloud is empty, nothing to write")]
    EmptyCloud,
    #[error("failed to write {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed PLY header: {0}")]
    MalformedHeader(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    pub format: String,
    pub vertex_count: usize,
    pub properties: Vec<String>,
}

pub fn write_ply_to<W: Write>(cloud: &PointCloud, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "end_header")?;
    for (x, y, z, _) in cloud.iter() {
        writeln!(writer, "{} {} {}", x, y, z)?;
    }
    Ok(())
}

/// Writes `cloud` to `path` and returns the number of vertices written.
///
/// The data goes to a sibling `.tmp` file first and is renamed into place,
/// so a failed write leaves no partial PLY behind.
pub fn write_ply(cloud: &PointCloud, path: &Path) -> Result<usize, PlyError> {
    if cloud.is_empty() {
        return Err(PlyError::EmptyCloud);
    }

    let io_err = |source: io::Error| PlyError::Io {
        path: path.to_path_buf(),
        source,
    };

    let tmp_path = path.with_extension("ply.tmp");
    let result = File::create(&tmp_path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write_ply_to(cloud, &mut writer)?;
        writer.flush()
    });
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err(e));
    }
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_err(e));
    }

    log::info!("saved {} points to {}", cloud.len(), path.display());
    Ok(cloud.len())
}

pub fn read_ply_header(path: &Path) -> Result<PlyHeader, PlyError> {
    let file = File::open(path).map_err(|source| PlyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_header(BufReader::new(file)).map_err(|e| match e {
        PlyError::Io { source, .. } => PlyError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

pub fn parse_header<R: BufRead>(reader: R) -> Result<PlyHeader, PlyError> {
    let mut lines = reader.lines();
    let mut next_line = || -> Result<Option<String>, PlyError> {
        lines.next().transpose().map_err(|source| PlyError::Io {
            path: PathBuf::new(),
            source,
        })
    };

    if next_line()?.as_deref() != Some("ply") {
        return Err(PlyError::MalformedHeader("missing 'ply' magic".to_string()));
    }

    let mut format = None;
    let mut vertex_count = None;
    let mut properties = Vec::new();
    loop {
        let Some(line) = next_line()? else {
            return Err(PlyError::MalformedHeader("missing end_header".to_string()));
        };
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("end_header") => break,
            Some("format") => format = Some(tokens.collect::<Vec<_>>().join(" ")),
            Some("element") => {
                if tokens.next() == Some("vertex") {
                    let count = tokens
                        .next()
                        .and_then(|n| n.parse().ok())
                        .ok_or_else(|| PlyError::MalformedHeader(line.clone()))?;
                    vertex_count = Some(count);
                }
            }
            Some("property") => {
                if let Some(name) = tokens.last() {
                    properties.push(name.to_string());
                }
            }
            Some("comment") | None => {}
            Some(_) => return Err(PlyError::MalformedHeader(line.clone())),
        }
    }

    Ok(PlyHeader {
        format: format.ok_or_else(|| PlyError::MalformedHeader("missing format".to_string()))?,
        vertex_count: vertex_count
            .ok_or_else(|| PlyError::MalformedHeader("missing vertex element".to_string()))?,
        properties,
    })
}
