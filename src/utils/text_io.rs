//! 純文字數值表格的讀寫 (FSL `.mat`、`.bval`、`.bvec`)
//!
//! Tables are whitespace separated. Blank lines and lines starting with `#`
//! are skipped. Values are written with 15 decimals.

use crate::utils::error::{PrepError, Result};
use nalgebra::Matrix4;
use std::fmt::Write as _;
use std::path::Path;

/// 讀取表格，每一行為一個 Vec
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    parse_table(&content, &path.display().to_string())
}

pub fn parse_table(content: &str, origin: &str) -> Result<Vec<Vec<f64>>> {
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let row = trimmed
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|e| PrepError::ParseError {
                    path: origin.to_string(),
                    line: idx + 1,
                    message: format!("'{}' is not a number ({})", token, e),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(PrepError::ParseError {
                    path: origin.to_string(),
                    line: idx + 1,
                    message: format!("expected {} columns, found {}", first.len(), row.len()),
                });
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

/// 讀取一維數列（例如 b-values），不論存成一列或一欄
pub fn load_vector<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let table = load_table(path)?;
    Ok(table.into_iter().flatten().collect())
}

/// 讀取 b-vectors，回傳每個 volume 一個方向
///
/// Accepts the FSL layout (3 rows, one column per volume) as well as the
/// transposed layout (one row of 3 per volume).
pub fn load_bvecs<P: AsRef<Path>>(path: P) -> Result<Vec<[f64; 3]>> {
    let path = path.as_ref();
    let table = load_table(path)?;

    if table.len() == 3 {
        let n = table[0].len();
        return Ok((0..n)
            .map(|i| [table[0][i], table[1][i], table[2][i]])
            .collect());
    }

    if table.iter().all(|row| row.len() == 3) && !table.is_empty() {
        return Ok(table.iter().map(|row| [row[0], row[1], row[2]]).collect());
    }

    Err(PrepError::ParseError {
        path: path.display().to_string(),
        line: 1,
        message: "b-vectors must have 3 rows or 3 columns".to_string(),
    })
}

/// 以 FSL 版面（3 列）寫出 b-vectors
pub fn save_bvecs<P: AsRef<Path>>(path: P, bvecs: &[[f64; 3]]) -> Result<()> {
    let rows: Vec<Vec<f64>> = (0..3)
        .map(|axis| bvecs.iter().map(|v| v[axis]).collect())
        .collect();
    save_table(path, &rows)
}

pub fn save_table<P: AsRef<Path>>(path: P, rows: &[Vec<f64>]) -> Result<()> {
    let mut out = String::new();
    for row in rows {
        let line = row
            .iter()
            .map(|v| format!("{:.15}", v))
            .collect::<Vec<_>>()
            .join(" ");
        // 寫入 String 不會失敗
        let _ = writeln!(out, "{}", line);
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// 讀取 4x4 仿射矩陣
pub fn load_matrix<P: AsRef<Path>>(path: P) -> Result<Matrix4<f64>> {
    let path = path.as_ref();
    let table = load_table(path)?;
    if table.len() != 4 || table.iter().any(|row| row.len() != 4) {
        return Err(PrepError::ParseError {
            path: path.display().to_string(),
            line: 1,
            message: format!("expected a 4x4 matrix, found {} rows", table.len()),
        });
    }
    let values: Vec<f64> = table.into_iter().flatten().collect();
    Ok(Matrix4::from_row_slice(&values))
}

pub fn save_matrix<P: AsRef<Path>>(path: P, matrix: &Matrix4<f64>) -> Result<()> {
    let rows: Vec<Vec<f64>> = (0..4)
        .map(|r| (0..4).map(|c| matrix[(r, c)]).collect())
        .collect();
    save_table(path, &rows)
}
