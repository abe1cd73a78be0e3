//! Array containers read and written by the search driver.

use byteorder::{ByteOrder, LittleEndian};
use ndarray::{Array2, ArrayView2};
use npyz::WriterBuilder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{FdmtError, Result};

/// Read a 2-D C-order `.npy` power matrix `[N_f, N_t]` (f4 or f8).
pub fn read_power_npy(path: &Path) -> Result<Array2<f32>> {
    let file = File::open(path)?;
    let npy = npyz::NpyFile::new(BufReader::new(file))
        .map_err(|e| FdmtError::Npy(format!("invalid NPY file '{}': {}", path.display(), e)))?;

    let shape = npy.shape().to_vec();
    if shape.len() != 2 {
        return Err(FdmtError::shape(format!(
            "'{}' has {} dimensions, expected 2",
            path.display(),
            shape.len()
        )));
    }
    if matches!(npy.order(), npyz::Order::Fortran) {
        return Err(FdmtError::Npy(format!(
            "'{}' is Fortran-ordered; save it in C order",
            path.display()
        )));
    }
    let type_str = match npy.dtype() {
        npyz::DType::Plain(ts) => ts.to_string(),
        other => {
            return Err(FdmtError::Npy(format!(
                "'{}' has unsupported dtype {:?}",
                path.display(),
                other
            )))
        }
    };
    let values: Vec<f32> = match type_str.get(1..) {
        Some("f4") => npy
            .into_vec::<f32>()
            .map_err(|e| FdmtError::Npy(e.to_string()))?,
        Some("f8") => npy
            .into_vec::<f64>()
            .map_err(|e| FdmtError::Npy(e.to_string()))?
            .into_iter()
            .map(|v| v as f32)
            .collect(),
        _ => {
            return Err(FdmtError::Npy(format!(
                "'{}' has dtype {type_str}; expected float32 or float64",
                path.display()
            )))
        }
    };
    let (rows, cols) = (shape[0] as usize, shape[1] as usize);
    Array2::from_shape_vec((rows, cols), values).map_err(|e| FdmtError::shape(e.to_string()))
}

/// Read headerless little-endian f32 samples stored time-major
/// (`n_chan` samples per spectrum) and return them as `[N_f, N_t]`.
pub fn read_power_raw(path: &Path, n_chan: usize) -> Result<Array2<f32>> {
    if n_chan == 0 {
        return Err(FdmtError::config("channel count must be positive"));
    }
    let bytes = fs::read(path)?;
    if bytes.len() % 4 != 0 {
        return Err(FdmtError::shape(format!(
            "'{}' is {} bytes, not a whole number of f32 samples",
            path.display(),
            bytes.len()
        )));
    }
    let mut samples = vec![0.0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(&bytes, &mut samples);
    if samples.len() % n_chan != 0 {
        return Err(FdmtError::shape(format!(
            "{} samples do not fill whole spectra of {n_chan} channels",
            samples.len()
        )));
    }
    let n_time = samples.len() / n_chan;
    let time_major = Array2::from_shape_vec((n_time, n_chan), samples)
        .map_err(|e| FdmtError::shape(e.to_string()))?;
    Ok(time_major.t().as_standard_layout().into_owned())
}

/// Write a 2-D matrix as a float32 `.npy` file.
pub fn write_npy_2d(path: &Path, values: ArrayView2<'_, f64>) -> Result<()> {
    let (rows, cols) = values.dim();
    let file = BufWriter::new(File::create(path)?);
    let mut writer = npyz::WriteOptions::<f32>::new()
        .default_dtype()
        .shape(&[rows as u64, cols as u64])
        .writer(file)
        .begin_nd()?;
    for &v in values.iter() {
        writer.push(&(v as f32))?;
    }
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    #[test]
    fn npy_round_trip_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmt.npy");
        let dmt = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as f64);
        write_npy_2d(&path, dmt.view()).unwrap();
        let back = read_power_npy(&path).unwrap();
        assert_eq!(back.dim(), (3, 5));
        assert_eq!(back[[2, 4]], 14.0);
        assert_eq!(back[[1, 0]], 5.0);
    }

    #[test]
    fn raw_samples_are_transposed_to_channel_major() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block.raw");
        let mut file = File::create(&path).unwrap();
        // three spectra of four channels, value = 10 * t + c
        for t in 0..3 {
            for c in 0..4 {
                file.write_f32::<LittleEndian>((10 * t + c) as f32).unwrap();
            }
        }
        file.flush().unwrap();
        let image = read_power_raw(&path, 4).unwrap();
        assert_eq!(image.dim(), (4, 3));
        assert_eq!(image[[3, 2]], 23.0);
        assert_eq!(image[[1, 0]], 1.0);
        assert!(matches!(read_power_raw(&path, 5), Err(FdmtError::Shape(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_power_npy(Path::new("/nonexistent/fdmt/input.npy")).unwrap_err();
        assert!(matches!(err, FdmtError::Io(_)));
    }
}
