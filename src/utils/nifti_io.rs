//! NIfTI-1 讀寫
//!
//! Volumes are always held as 4D `[x, y, z, t]` float32 arrays. A 3D image is
//! a 4D array with a single frame, and is written back as 3D.

use crate::utils::error::{PrepError, Result};
use ndarray::{Array3, Array4, ArrayView3, Axis, Ix4};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// 一個載入記憶體的影像與其原始 header
#[derive(Debug, Clone)]
pub struct Volume {
    pub data: Array4<f32>,
    pub header: NiftiHeader,
}

impl Volume {
    pub fn new(data: Array4<f32>, header: NiftiHeader) -> Self {
        Self { data, header }
    }

    /// 由一組 3D frame 組成 4D 影像
    pub fn from_frames(frames: &[Array3<f32>], header: NiftiHeader) -> Result<Self> {
        let first = frames
            .first()
            .ok_or_else(|| PrepError::shape("cannot stack an empty list of frames"))?;
        let (nx, ny, nz) = first.dim();

        let mut data = Array4::<f32>::zeros((nx, ny, nz, frames.len()));
        for (t, frame) in frames.iter().enumerate() {
            if frame.dim() != (nx, ny, nz) {
                return Err(PrepError::shape(format!(
                    "frame {} has shape {:?}, expected {:?}",
                    t,
                    frame.dim(),
                    (nx, ny, nz)
                )));
            }
            data.index_axis_mut(Axis(3), t).assign(frame);
        }

        Ok(Self { data, header })
    }

    pub fn frames(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    pub fn spatial_shape(&self) -> (usize, usize, usize) {
        let (nx, ny, nz, _) = self.data.dim();
        (nx, ny, nz)
    }

    pub fn frame(&self, t: usize) -> Result<ArrayView3<'_, f32>> {
        if t >= self.frames() {
            return Err(PrepError::shape(format!(
                "frame {} requested but the image has {} frames",
                t,
                self.frames()
            )));
        }
        Ok(self.data.index_axis(Axis(3), t))
    }
}

pub fn load_volume<P: AsRef<Path>>(path: P) -> Result<Volume> {
    let path = path.as_ref();
    tracing::debug!("Reading NIfTI image {}", path.display());

    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header().clone();
    let array = obj.into_volume().into_ndarray::<f32>()?;

    let data = match array.ndim() {
        3 => array.insert_axis(Axis(3)),
        4 => array,
        n => {
            return Err(PrepError::shape(format!(
                "{} has {} dimensions, only 3D and 4D images are supported",
                path.display(),
                n
            )))
        }
    };

    let data = data
        .into_dimensionality::<Ix4>()
        .map_err(|e| PrepError::shape(e.to_string()))?;

    Ok(Volume { data, header })
}

/// 寫出影像；副檔名為 `.gz` 時自動壓縮
pub fn save_volume<P: AsRef<Path>>(path: P, volume: &Volume) -> Result<()> {
    let path = path.as_ref();
    let mut header = volume.header.clone();
    // 資料已經是換算後的 float32
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;

    let writer = WriterOptions::new(path).reference_header(&header);
    if volume.frames() == 1 {
        writer.write_nifti(&volume.data.index_axis(Axis(3), 0))?;
    } else {
        writer.write_nifti(&volume.data)?;
    }

    tracing::debug!(
        "Wrote {} ({:?} x {} frames)",
        path.display(),
        volume.spatial_shape(),
        volume.frames()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_4d_image_survives_write_and_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dwi.nii.gz");

        let data = Array4::from_shape_fn((3, 4, 2, 5), |(x, y, z, t)| {
            (x + 10 * y + 100 * z + 1000 * t) as f32
        });
        save_volume(&path, &Volume::new(data.clone(), NiftiHeader::default())).unwrap();

        let loaded = load_volume(&path).unwrap();
        assert_eq!(loaded.data.dim(), (3, 4, 2, 5));
        assert_eq!(loaded.data[[2, 3, 1, 4]], data[[2, 3, 1, 4]]);
        assert_eq!(loaded.frame(4).unwrap()[[1, 2, 0]], 4021.0);
    }

    #[test]
    fn test_3d_image_is_loaded_as_single_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mask.nii");

        let data = Array4::from_elem((2, 2, 2, 1), 1.0f32);
        save_volume(&path, &Volume::new(data, NiftiHeader::default())).unwrap();

        let loaded = load_volume(&path).unwrap();
        assert_eq!(loaded.frames(), 1);
        assert_eq!(loaded.spatial_shape(), (2, 2, 2));
        assert!(loaded.frame(1).is_err());
    }

    #[test]
    fn test_from_frames_rejects_mismatched_shapes() {
        let frames = vec![Array3::<f32>::zeros((2, 2, 2)), Array3::<f32>::zeros((2, 2, 3))];
        assert!(Volume::from_frames(&frames, NiftiHeader::default()).is_err());
        assert!(Volume::from_frames(&[], NiftiHeader::default()).is_err());
    }
}
