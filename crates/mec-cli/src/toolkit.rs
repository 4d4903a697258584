//! Volume metadata through the external toolkit.
//!
//! Implements the geometry provider capability by invoking the toolkit's
//! own metadata utilities, so the compiler never parses volume headers
//! itself.

use std::path::Path;
use std::process::Command;

use mec_core::{ErrorInfo, MecError};
use mec_geom::{Affine, SliceTiming, Volume, VolumeReader};

fn reader_error(code: &str, message: impl Into<String>, path: &Path) -> MecError {
    MecError::Geometry(
        ErrorInfo::new(code, message.into()).with_context("path", path.display().to_string()),
    )
}

/// [`VolumeReader`] backed by the toolkit's metadata utilities.
#[derive(Debug, Default)]
pub struct ToolkitReader;

impl ToolkitReader {
    fn run(&self, program: &str, args: &[&str], path: &Path) -> Result<String, MecError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| reader_error("metadata_reader_unavailable", err.to_string(), path))?;
        if !output.status.success() {
            return Err(reader_error(
                "metadata_reader_failed",
                format!("{program} exited with {}", output.status),
                path,
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|err| reader_error("metadata_reader_failed", err.to_string(), path))
    }

    fn numbers(&self, text: &str, path: &Path) -> Result<Vec<f64>, MecError> {
        text.split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    reader_error(
                        "metadata_parse_failed",
                        format!("'{token}' is not numeric"),
                        path,
                    )
                })
            })
            .collect()
    }
}

impl VolumeReader for ToolkitReader {
    fn affine(&self, path: &Path) -> Result<Affine, MecError> {
        let spec = format!("{}::IJK_TO_DICOM_REAL", path.display());
        let text = self.run("cat_matvec", &["-ONELINE", &spec], path)?;
        let values = self.numbers(&text, path)?;
        if values.len() != 12 {
            return Err(reader_error(
                "metadata_parse_failed",
                format!("expected 12 affine entries, found {}", values.len()),
                path,
            ));
        }
        let mut rows = [[0.0; 4]; 4];
        for (i, chunk) in values.chunks(4).enumerate() {
            rows[i].copy_from_slice(chunk);
        }
        rows[3] = [0.0, 0.0, 0.0, 1.0];
        Ok(Affine(rows))
    }

    fn voxel_dims(&self, path: &Path) -> Result<[f64; 3], MecError> {
        let arg = path.display().to_string();
        let text = self.run("3dinfo", &["-adi", "-adj", "-adk", &arg], path)?;
        let values = self.numbers(&text, path)?;
        if values.len() != 3 {
            return Err(reader_error(
                "metadata_parse_failed",
                format!("expected 3 voxel dimensions, found {}", values.len()),
                path,
            ));
        }
        Ok([values[0], values[1], values[2]])
    }

    fn slice_timing(&self, path: &Path) -> Result<SliceTiming, MecError> {
        let arg = path.display().to_string();
        let text = self.run("3dinfo", &["-tr", "-nk", &arg], path)?;
        let values = self.numbers(&text, path)?;
        if values.len() != 2 || values[1] < 1.0 {
            return Err(reader_error(
                "metadata_parse_failed",
                "expected repetition time and slice count",
                path,
            ));
        }
        let slice_count = values[1] as usize;
        Ok(SliceTiming {
            slice_duration: values[0] / slice_count as f64,
            slice_count,
        })
    }

    fn first_volume(&self, path: &Path) -> Result<Volume, MecError> {
        let arg = path.display().to_string();
        let text = self.run("3dinfo", &["-ni", "-nj", "-nk", &arg], path)?;
        let dims = self.numbers(&text, path)?;
        if dims.len() != 3 || dims.iter().any(|&d| d < 1.0) {
            return Err(reader_error(
                "metadata_parse_failed",
                "expected 3 grid extents",
                path,
            ));
        }
        let shape = [dims[0] as usize, dims[1] as usize, dims[2] as usize];
        let frame = format!("{arg}[0]");
        let dump = self.run("3dmaskdump", &["-noijk", &frame], path)?;
        let data = self.numbers(&dump, path)?;
        Volume::new(data, shape)
    }
}
