// Row mapper: reads the CSV file and posts one ROI per valid row. Every row
// is independent; a bad row or a failed post is logged and the import moves
// on to the next row.

use crate::session::RoiTarget;
use crate::shapes::{Ellipse, Line, Polygon, Rectangle, Shape, ShapeKind};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Columns every file needs, whatever the row types.
pub const REQUIRED_COLUMNS: [&str; 2] = ["image_id", "type"];

/// Raw CSV row. Every cell is optional text; conversion happens in
/// [`parse_row`] so that a bad cell only costs its own row.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RoiRecord {
    pub image_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "X")]
    pub x: Option<String>,
    #[serde(rename = "Y")]
    pub y: Option<String>,
    #[serde(rename = "Width")]
    pub width: Option<String>,
    #[serde(rename = "Height")]
    pub height: Option<String>,
    #[serde(rename = "X_points")]
    pub x_points: Option<String>,
    #[serde(rename = "Y_points")]
    pub y_points: Option<String>,
    #[serde(rename = "X1")]
    pub x1: Option<String>,
    #[serde(rename = "Y1")]
    pub y1: Option<String>,
    #[serde(rename = "X2")]
    pub x2: Option<String>,
    #[serde(rename = "Y2")]
    pub y2: Option<String>,
}

/// Why a row could not be turned into a shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing value for column '{0}'")]
    MissingField(&'static str),
    #[error("column '{field}' is not an integer: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("ROI type '{0}' not supported")]
    UnsupportedType(String),
    #[error("column '{field}' has an invalid point: {value:?}")]
    InvalidPoint { field: &'static str, value: String },
    #[error("number of X_points ({x}) and Y_points ({y}) does not match")]
    PointCountMismatch { x: usize, y: usize },
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// A row that was turned into a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub image_id: i64,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedRoi {
    pub line: u64,
    pub image_id: i64,
    pub kind: ShapeKind,
    pub roi_id: i64,
}

/// A row that never became a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

/// A row whose shape the server rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRow {
    pub line: u64,
    pub image_id: i64,
    pub reason: String,
}

/// Outcome of an import, one entry per data row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub submitted: Vec<SubmittedRoi>,
    /// Rows that could not be parsed into a shape.
    pub skipped: Vec<SkippedRow>,
    pub failed: Vec<FailedRow>,
}

impl ImportReport {
    pub fn rows(&self) -> usize {
        self.submitted.len() + self.skipped.len() + self.failed.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ROI(s) added, {} row(s) skipped, {} row(s) failed to upload.",
            self.submitted.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, RowError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RowError::MissingField(field)),
    }
}

/// Integer cell. A finite decimal such as `12.0` is truncated the way an
/// integer cast would; values outside the `i64` range are rejected.
fn int_field(field: &'static str, value: &Option<String>) -> Result<i64, RowError> {
    let raw = required(field, value)?;
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(n);
    }
    // `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
    const UPPER: f64 = i64::MAX as f64;
    const LOWER: f64 = i64::MIN as f64;
    match raw.parse::<f64>().map(f64::trunc) {
        Ok(f) if f.is_finite() && f >= LOWER && f < UPPER => Ok(f as i64),
        _ => Err(RowError::InvalidNumber {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Comma-separated integer list, e.g. `"10, 20,30"`.
fn point_list(field: &'static str, value: &Option<String>) -> Result<Vec<i64>, RowError> {
    required(field, value)?
        .split(',')
        .map(|token| {
            token.trim().parse::<i64>().map_err(|_| RowError::InvalidPoint {
                field,
                value: token.trim().to_string(),
            })
        })
        .collect()
}

fn label(record: &RoiRecord) -> Option<String> {
    record
        .text
        .as_ref()
        .filter(|t| !t.trim().is_empty())
        .cloned()
}

/// Turn one record into the image id and the shape to attach to it.
pub fn parse_row(record: &RoiRecord) -> Result<ParsedRow, RowError> {
    let image_id = int_field("image_id", &record.image_id)?;
    let kind = required("type", &record.kind)?
        .parse::<ShapeKind>()
        .map_err(RowError::UnsupportedType)?;
    let label = label(record);

    let shape = match kind {
        ShapeKind::Rectangle => Shape::Rectangle(Rectangle {
            x: int_field("X", &record.x)?,
            y: int_field("Y", &record.y)?,
            width: int_field("Width", &record.width)?,
            height: int_field("Height", &record.height)?,
            z: None,
            label,
        }),
        ShapeKind::Ellipse => Shape::Ellipse(Ellipse {
            x: int_field("X", &record.x)?,
            y: int_field("Y", &record.y)?,
            width: int_field("Width", &record.width)?,
            height: int_field("Height", &record.height)?,
            z: None,
            label,
        }),
        ShapeKind::Line => Shape::Line(Line {
            x1: int_field("X1", &record.x1)?,
            y1: int_field("Y1", &record.y1)?,
            x2: int_field("X2", &record.x2)?,
            y2: int_field("Y2", &record.y2)?,
            z: None,
            label,
        }),
        ShapeKind::Polygon => {
            let xs = point_list("X_points", &record.x_points)?;
            let ys = point_list("Y_points", &record.y_points)?;
            if xs.len() != ys.len() {
                return Err(RowError::PointCountMismatch {
                    x: xs.len(),
                    y: ys.len(),
                });
            }
            Shape::Polygon(Polygon {
                points: xs.into_iter().zip(ys).collect(),
                z: None,
                label,
            })
        }
    };

    Ok(ParsedRow { image_id, shape })
}

/// Read `path` and post every valid row to `target`.
pub fn add_rois_from_csv<T: RoiTarget + ?Sized>(target: &T, path: &Path) -> Result<ImportReport> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    tracing::info!("importing ROIs from {}", path.display());
    add_rois_from_reader(target, file)
}

/// Same as [`add_rois_from_csv`] for any CSV source.
pub fn add_rois_from_reader<T: RoiTarget + ?Sized, R: Read>(target: &T, source: R) -> Result<ImportReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(source);
    let headers = rdr.headers().context("Failed to read CSV header")?.clone();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("CSV file is missing required column(s): {}", missing.join(", "));
    }

    let records = rdr
        .records()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read CSV rows")?;

    let progress = ProgressBar::new(records.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut report = ImportReport::default();
    for record in &records {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let parsed = record
            .deserialize::<RoiRecord>(Some(&headers))
            .map_err(|e| RowError::Malformed(e.to_string()))
            .and_then(|r| parse_row(&r));

        match parsed {
            Ok(ParsedRow { image_id, shape }) => match target.post_roi(image_id, &shape) {
                Ok(roi_id) => {
                    progress.suspend(|| {
                        tracing::info!("ROI of type {} added to image {image_id}", shape.kind())
                    });
                    report.submitted.push(SubmittedRoi {
                        line,
                        image_id,
                        kind: shape.kind(),
                        roi_id,
                    });
                }
                Err(e) => {
                    progress.suspend(|| {
                        tracing::error!("Error adding ROI to image {image_id} (line {line}): {e:#}")
                    });
                    report.failed.push(FailedRow {
                        line,
                        image_id,
                        reason: format!("{e:#}"),
                    });
                }
            },
            Err(e) => {
                progress.suspend(|| tracing::warn!("Skipping row at line {line}: {e}"));
                report.skipped.push(SkippedRow {
                    line,
                    reason: e.to_string(),
                });
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    tracing::info!("import finished: {}", report.summary());
    Ok(report)
}
