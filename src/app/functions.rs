//! dMRI 前處理用的數值 helper
//!
//! Every file-producing helper writes into an explicit output directory and
//! names its result after the input's base name (`dwi.nii.gz` →
//! `dwi_avg_b0.nii.gz`). The pure array versions are exposed alongside so
//! they can be used without touching the filesystem.

use crate::interfaces::command::split_filename;
use crate::utils::error::{PrepError, Result};
use crate::utils::nifti_io::{load_volume, save_volume, Volume};
use crate::utils::text_io::{load_bvecs, load_matrix, load_vector, save_bvecs, save_matrix};
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array, Array3, Axis, Dimension, Zip};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

/// b0 平均時視為 b=0 的最大 b-value
pub const DEFAULT_MAX_B: f64 = 10.0;

fn derived_name(input: &Path, suffix: &str, out_dir: &Path) -> PathBuf {
    let (_, base, _) = split_filename(input);
    out_dir.join(format!("{}{}", base, suffix))
}

pub fn b0_indices(bvals: &[f64]) -> Vec<usize> {
    bvals
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == 0.0)
        .map(|(i, _)| i)
        .collect()
}

pub fn nonb0_indices(bvals: &[f64]) -> Vec<usize> {
    bvals
        .iter()
        .enumerate()
        .filter(|(_, b)| **b != 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// 未指定參考 volume 時使用第一個
pub fn check_ref_num(ref_num: Option<usize>) -> usize {
    ref_num.unwrap_or(0)
}

/// 以每個 volume 的仿射矩陣之反矩陣旋轉 b-vectors
pub fn rotate_vectors(bvecs: &[[f64; 3]], matrices: &[Matrix4<f64>]) -> Result<Vec<[f64; 3]>> {
    if bvecs.len() != matrices.len() {
        return Err(PrepError::shape(format!(
            "{} b-vectors but {} matrices",
            bvecs.len(),
            matrices.len()
        )));
    }

    bvecs
        .iter()
        .zip(matrices)
        .enumerate()
        .map(|(i, (bvec, matrix))| -> Result<[f64; 3]> {
            if bvec.iter().all(|v| *v == 0.0) {
                return Ok(*bvec);
            }
            let inverse = matrix.try_inverse().ok_or_else(|| PrepError::ProcessingError {
                message: format!("matrix {} is singular", i),
            })?;
            let rotation = inverse.fixed_view::<3, 3>(0, 0).into_owned();
            let rotated = rotation * Vector3::new(bvec[0], bvec[1], bvec[2]);
            let norm = rotated.norm();
            if norm == 0.0 {
                return Err(PrepError::ProcessingError {
                    message: format!("b-vector {} vanished after rotation", i),
                });
            }
            let rotated = rotated / norm;
            Ok([rotated[0], rotated[1], rotated[2]])
        })
        .collect()
}

/// 讀入 b-vectors 與矩陣檔，寫出 `<name>_rotated.bvec`
pub fn rotate_bvecs(in_bvec: &Path, in_matrix: &[PathBuf], out_dir: &Path) -> Result<PathBuf> {
    let bvecs = load_bvecs(in_bvec)?;
    let matrices = in_matrix
        .iter()
        .map(load_matrix)
        .collect::<Result<Vec<_>>>()?;

    let rotated = rotate_vectors(&bvecs, &matrices)?;
    let out_file = derived_name(in_bvec, "_rotated.bvec", out_dir);
    save_bvecs(&out_file, &rotated)?;

    tracing::info!("🧭 Rotated {} b-vectors into {}", rotated.len(), out_file.display());
    Ok(out_file)
}

/// 平均所有 `b <= max_b` 的 volume
pub fn average_b0(volume: &Volume, bvals: &[f64], max_b: f64) -> Result<Array3<f32>> {
    if bvals.len() != volume.frames() {
        return Err(PrepError::shape(format!(
            "{} b-values for an image with {} volumes",
            bvals.len(),
            volume.frames()
        )));
    }

    let selected: Vec<usize> = bvals
        .iter()
        .enumerate()
        .filter(|(_, b)| **b <= max_b)
        .map(|(i, _)| i)
        .collect();
    if selected.is_empty() {
        return Err(PrepError::ProcessingError {
            message: format!("no volume has b <= {}", max_b),
        });
    }

    let mut sum = Array3::<f32>::zeros(volume.spatial_shape());
    for &t in &selected {
        sum += &volume.frame(t)?;
    }
    Ok(sum / selected.len() as f32)
}

/// 寫出 `<name>_avg_b0.nii.gz`
pub fn b0_average(in_dwi: &Path, in_bval: &Path, max_b: f64, out_dir: &Path) -> Result<PathBuf> {
    let volume = load_volume(in_dwi)?;
    let bvals = load_vector(in_bval)?;
    let average = average_b0(&volume, &bvals, max_b)?;

    let out_file = derived_name(in_dwi, "_avg_b0.nii.gz", out_dir);
    save_volume(&out_file, &Volume::from_frames(&[average], volume.header)?)?;

    tracing::info!("📊 Averaged b0 volumes of {} into {}", in_dwi.display(), out_file.display());
    Ok(out_file)
}

/// 每個 non-b0 volume 的初始矩陣
///
/// When `in_xfms` is missing or does not hold one matrix per volume, identity
/// matrices `init_%04d.mat` are written for every non-b0 index.
pub fn check_init_xfms(bvals: &[f64], in_xfms: Option<&[PathBuf]>, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let non_b0 = nonb0_indices(bvals);

    match in_xfms {
        Some(xfms) if xfms.len() == bvals.len() => Ok(non_b0.iter().map(|&i| xfms[i].clone()).collect()),
        _ => non_b0
            .iter()
            .map(|i| -> Result<PathBuf> {
                let xfm_file = out_dir.join(format!("init_{:04}.mat", i));
                save_matrix(&xfm_file, &Matrix4::identity())?;
                Ok(xfm_file)
            })
            .collect(),
    }
}

/// 仿射矩陣的 Jacobian 行列式（取絕對值）
pub fn xfm_jacobian(matrices: &[Matrix4<f64>]) -> Vec<f64> {
    matrices.iter().map(|m| m.determinant().abs()).collect()
}

pub fn xfm_jacobian_files(in_xfms: &[PathBuf]) -> Result<Vec<f64>> {
    let matrices = in_xfms.iter().map(load_matrix).collect::<Result<Vec<_>>>()?;
    Ok(xfm_jacobian(&matrices))
}

/// 將 non-b0 的矩陣插回完整序列，b0 使用單位矩陣；寫出 `eccorr_%04d.mat`
pub fn recompose_xfm(bvals: &[f64], in_xfms: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>> {
    let expected = nonb0_indices(bvals).len();
    if expected != in_xfms.len() {
        return Err(PrepError::shape(format!(
            "{} non-b0 volumes but {} matrices",
            expected,
            in_xfms.len()
        )));
    }

    let mut xfms = in_xfms.iter();
    let mut out_files = Vec::with_capacity(bvals.len());
    for (i, b) in bvals.iter().enumerate() {
        let matrix = if *b == 0.0 {
            Matrix4::identity()
        } else {
            match xfms.next() {
                Some(path) => load_matrix(path)?,
                None => return Err(PrepError::shape(format!("no matrix left for volume {}", i))),
            }
        };
        let out_file = out_dir.join(format!("eccorr_{:04}.mat", i));
        save_matrix(&out_file, &matrix)?;
        out_files.push(out_file);
    }
    Ok(out_files)
}

/// 以校正後的 volume 取代原本的 non-b0 volume
pub fn replace_nonb0(volume: &mut Volume, bvals: &[f64], corrected: &[Array3<f32>]) -> Result<()> {
    if bvals.len() != volume.frames() {
        return Err(PrepError::shape(format!(
            "{} b-values for an image with {} volumes",
            bvals.len(),
            volume.frames()
        )));
    }
    let dwis = nonb0_indices(bvals);
    if dwis.len() != corrected.len() {
        return Err(PrepError::shape(format!(
            "{} diffusion weighted volumes but {} corrected volumes",
            dwis.len(),
            corrected.len()
        )));
    }

    for (&t, frame) in dwis.iter().zip(corrected) {
        if frame.dim() != volume.spatial_shape() {
            return Err(PrepError::shape(format!(
                "corrected volume for index {} has shape {:?}, expected {:?}",
                t,
                frame.dim(),
                volume.spatial_shape()
            )));
        }
        volume.data.index_axis_mut(Axis(3), t).assign(frame);
    }
    Ok(())
}

/// 寫出 `<name>_eccorrect.nii.gz`
pub fn recompose_dwi(in_dwi: &Path, in_bval: &Path, in_corrected: &[PathBuf], out_dir: &Path) -> Result<PathBuf> {
    let mut volume = load_volume(in_dwi)?;
    let bvals = load_vector(in_bval)?;
    let corrected = in_corrected
        .iter()
        .map(|path| -> Result<Array3<f32>> { Ok(load_volume(path)?.frame(0)?.to_owned()) })
        .collect::<Result<Vec<_>>>()?;

    replace_nonb0(&mut volume, &bvals, &corrected)?;

    let out_file = derived_name(in_dwi, "_eccorrect.nii.gz", out_dir);
    save_volume(&out_file, &volume)?;
    tracing::info!("🧩 Recomposed {} corrected volumes into {}", corrected.len(), out_file.display());
    Ok(out_file)
}

/// 將相位差線性縮放到 `[-π, π]`；最小/最大值取自整個陣列
pub fn rescale_phase<D: Dimension>(data: &Array<f32, D>) -> Result<Array<f32, D>> {
    let (min, max) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max <= min {
        return Err(PrepError::ProcessingError {
            message: "phase image is constant and cannot be rescaled".to_string(),
        });
    }

    let (min, range) = (min as f64, (max - min) as f64);
    Ok(data.mapv(|v| ((2.0 * PI * (v as f64 - min) / range) - PI) as f32))
}

/// Siemens 相位影像轉為弧度
///
/// Two files are subtracted as `second - first`. A single file with exactly
/// two frames yields `frame1 - frame0`; any other single file is rescaled
/// as a whole and keeps all of its frames.
pub fn siemens2rads(in_files: &[PathBuf], out_dir: &Path) -> Result<PathBuf> {
    let rads = match in_files {
        [single] => {
            let volume = load_volume(single)?;
            if volume.frames() == 2 {
                let difference = &volume.frame(1)? - &volume.frame(0)?;
                Volume::from_frames(&[rescale_phase(&difference)?], volume.header)?
            } else {
                Volume::new(rescale_phase(&volume.data)?, volume.header)
            }
        }
        [phase1, phase2] => {
            let volume1 = load_volume(phase1)?;
            let volume2 = load_volume(phase2)?;
            if volume1.spatial_shape() != volume2.spatial_shape() {
                return Err(PrepError::shape(format!(
                    "phase images differ in shape: {:?} vs {:?}",
                    volume1.spatial_shape(),
                    volume2.spatial_shape()
                )));
            }
            let difference = &volume2.frame(0)? - &volume1.frame(0)?;
            Volume::from_frames(&[rescale_phase(&difference)?], volume1.header)?
        }
        other => {
            return Err(PrepError::shape(format!(
                "expected one or two phase images, got {}",
                other.len()
            )))
        }
    };

    let out_file = derived_name(&in_files[0], "_rads.nii.gz", out_dir);
    save_volume(&out_file, &rads)?;
    tracing::debug!("Wrote {} phase frame(s) in radians to {}", rads.frames(), out_file.display());
    Ok(out_file)
}

/// rad → rad/s，寫出 `<name>_radsec.nii.gz`
pub fn rads2radsec(in_file: &Path, delta_te: f64, out_dir: &Path) -> Result<PathBuf> {
    if delta_te <= 0.0 {
        return Err(PrepError::InvalidConfigValueError {
            field: "delta_te".to_string(),
            value: delta_te.to_string(),
            reason: "echo time difference must be positive".to_string(),
        });
    }

    let mut volume = load_volume(in_file)?;
    volume.data.mapv_inplace(|v| (v as f64 / delta_te) as f32);

    let out_file = derived_name(in_file, "_radsec.nii.gz", out_dir);
    save_volume(&out_file, &volume)?;
    Ok(out_file)
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// 減去遮罩內的中位數；沒有遮罩時使用全部 voxel
pub fn demean(volume: &mut Volume, mask: Option<&Array3<f32>>) -> Result<f32> {
    let shape = volume.spatial_shape();
    let mask = match mask {
        Some(m) if m.dim() != shape => {
            return Err(PrepError::shape(format!(
                "mask has shape {:?}, expected {:?}",
                m.dim(),
                shape
            )))
        }
        Some(m) => m.mapv(|v| v > 0.0),
        None => Array3::from_elem(shape, true),
    };

    let mut inside = Vec::new();
    for frame in volume.data.axis_iter(Axis(3)) {
        Zip::from(&frame).and(&mask).for_each(|&v, &m| {
            if m {
                inside.push(v);
            }
        });
    }
    let center = median(&mut inside).ok_or_else(|| PrepError::ProcessingError {
        message: "mask is empty".to_string(),
    })?;

    for mut frame in volume.data.axis_iter_mut(Axis(3)) {
        Zip::from(&mut frame).and(&mask).for_each(|v, &m| {
            if m {
                *v -= center;
            }
        });
    }
    Ok(center)
}

/// 寫出 `<name>_demean.nii.gz`
pub fn demean_image(in_file: &Path, in_mask: Option<&Path>, out_dir: &Path) -> Result<PathBuf> {
    let mut volume = load_volume(in_file)?;
    let mask = match in_mask {
        Some(path) => Some(load_volume(path)?.frame(0)?.to_owned()),
        None => None,
    };

    let center = demean(&mut volume, mask.as_ref())?;
    tracing::debug!("Subtracted median {} from {}", center, in_file.display());

    let out_file = derived_name(in_file, "_demean.nii.gz", out_dir);
    save_volume(&out_file, &volume)?;
    Ok(out_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nifti::NiftiHeader;

    fn volume_of(frames: &[Array3<f32>]) -> Volume {
        Volume::from_frames(frames, NiftiHeader::default()).unwrap()
    }

    fn rotation_z(angle: f64) -> Matrix4<f64> {
        let (s, c) = angle.sin_cos();
        Matrix4::new(
            c, -s, 0.0, 0.0, //
            s, c, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[test]
    fn test_b0_and_nonb0_indices() {
        let bvals = [0.0, 1000.0, 0.0, 1000.0, 5.0];
        assert_eq!(b0_indices(&bvals), vec![0, 2]);
        assert_eq!(nonb0_indices(&bvals), vec![1, 3, 4]);
        assert_eq!(check_ref_num(None), 0);
        assert_eq!(check_ref_num(Some(3)), 3);
    }

    #[test]
    fn test_rotation_keeps_zero_vectors_and_normalises() {
        let bvecs = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let matrices = [rotation_z(0.3), rotation_z(PI / 2.0)];
        let rotated = rotate_vectors(&bvecs, &matrices).unwrap();

        assert_eq!(rotated[0], [0.0, 0.0, 0.0]);
        // 反旋轉 90 度：x 軸轉到 -y
        assert!((rotated[1][0]).abs() < 1e-12);
        assert!((rotated[1][1] + 1.0).abs() < 1e-12);
        let norm: f64 = rotated[1].iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_rejects_count_mismatch() {
        let err = rotate_vectors(&[[1.0, 0.0, 0.0]], &[]).unwrap_err();
        assert!(matches!(err, PrepError::ShapeError { .. }));
    }

    #[test]
    fn test_jacobian_is_absolute_determinant() {
        let mut scale = Matrix4::identity();
        scale[(0, 0)] = -2.0;
        scale[(1, 1)] = 1.5;
        let jacobians = xfm_jacobian(&[Matrix4::identity(), scale]);
        assert!((jacobians[0] - 1.0).abs() < 1e-12);
        assert!((jacobians[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_b0_uses_low_bvalues() {
        let frames = [
            Array3::from_elem((2, 2, 1), 2.0),
            Array3::from_elem((2, 2, 1), 100.0),
            Array3::from_elem((2, 2, 1), 4.0),
        ];
        let volume = volume_of(&frames);
        let avg = average_b0(&volume, &[0.0, 1000.0, 5.0], DEFAULT_MAX_B).unwrap();
        assert!(avg.iter().all(|v| (*v - 3.0).abs() < 1e-6));

        assert!(average_b0(&volume, &[0.0, 1000.0], DEFAULT_MAX_B).is_err());
        assert!(average_b0(&volume, &[500.0, 1000.0, 700.0], DEFAULT_MAX_B).is_err());
    }

    #[test]
    fn test_replace_nonb0_checks_counts() {
        let frames = [Array3::zeros((2, 1, 1)), Array3::zeros((2, 1, 1)), Array3::zeros((2, 1, 1))];
        let mut volume = volume_of(&frames);
        let bvals = [0.0, 1000.0, 1000.0];

        let corrected = [Array3::from_elem((2, 1, 1), 7.0)];
        assert!(replace_nonb0(&mut volume, &bvals, &corrected).is_err());

        let corrected = [Array3::from_elem((2, 1, 1), 7.0), Array3::from_elem((2, 1, 1), 8.0)];
        replace_nonb0(&mut volume, &bvals, &corrected).unwrap();
        assert_eq!(volume.data[[0, 0, 0, 0]], 0.0);
        assert_eq!(volume.data[[0, 0, 0, 1]], 7.0);
        assert_eq!(volume.data[[1, 0, 0, 2]], 8.0);
    }

    #[test]
    fn test_rescale_phase_spans_minus_pi_to_pi() {
        let data = Array3::from_shape_vec((3, 1, 1), vec![0.0, 2048.0, 4096.0]).unwrap();
        let rads = rescale_phase(&data).unwrap();
        assert!((rads[[0, 0, 0]] as f64 + PI).abs() < 1e-5);
        assert!((rads[[1, 0, 0]]).abs() < 1e-5);
        assert!((rads[[2, 0, 0]] as f64 - PI).abs() < 1e-5);

        assert!(rescale_phase(&Array3::from_elem((2, 2, 2), 1.0)).is_err());
    }

    #[test]
    fn test_demean_subtracts_median_inside_mask() {
        let data = Array3::from_shape_vec((4, 1, 1), vec![1.0, 2.0, 10.0, 50.0]).unwrap();
        let mask = Array3::from_shape_vec((4, 1, 1), vec![1.0, 1.0, 1.0, 0.0]).unwrap();
        let mut volume = volume_of(&[data]);

        let center = demean(&mut volume, Some(&mask)).unwrap();
        assert_eq!(center, 2.0);
        let values: Vec<f32> = volume.data.iter().cloned().collect();
        assert_eq!(values, vec![-1.0, 0.0, 8.0, 50.0]);
    }

    #[test]
    fn test_demean_without_mask_uses_all_voxels() {
        let data = Array3::from_shape_vec((4, 1, 1), vec![1.0, 2.0, 4.0, 9.0]).unwrap();
        let mut volume = volume_of(&[data]);
        assert_eq!(demean(&mut volume, None).unwrap(), 3.0);
    }
}
