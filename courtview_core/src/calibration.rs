//! The "SPACE" Engine - Pixel to Court Homography
//!
//! Maps ground points from image-pixel space onto a flat real-world
//! rectangle (the court) with a 3×3 perspective transform computed from
//! four point correspondences.
//!
//! ```text
//!   pixel space (camera)                 court space (meters)
//!
//!     0 ─────────── 1                    0 ───── 1
//!    /               \                   │       │
//!   /                 \      H           │       │
//!  3 ───────────────── 2   ─────►        │       │
//!                                        3 ───── 2
//! ```
//!
//! The transformer is either `NotCalibrated` or `Ready`. Transforms before
//! calibration return `None`; they never approximate.

use geo::{Intersects, LineString, Point, Polygon};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Tolerance used when checking that a loaded matrix reproduces its vertices.
const VERTEX_TOLERANCE: f64 = 1e-3;

/// Homogeneous weights closer to zero than this map to infinity.
const MIN_PROJECTIVE_WEIGHT: f64 = 1e-12;

/// Calibration errors
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// Source points are missing, non-finite or degenerate
    #[error("Invalid calibration input: {0}")]
    InvalidCalibrationInput(String),

    /// A persisted calibration is missing fields or is inconsistent
    #[error("Calibration load error: {0}")]
    CalibrationLoadError(String),

    /// Save was requested before any calibration exists
    #[error("Transformer is not calibrated")]
    NotCalibrated,

    #[error("Calibration storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalibrationError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidCalibrationInput(msg.into())
    }

    fn load(msg: impl Into<String>) -> Self {
        Self::CalibrationLoadError(msg.into())
    }
}

/// Size and orientation of the real-world target rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetShape {
    /// Short side of the court in meters
    pub width: f64,

    /// Long side of the court in meters
    pub length: f64,

    /// Camera looks along the long side (court appears upright)
    pub vertical: bool,
}

impl Default for TargetShape {
    fn default() -> Self {
        // Volleyball court
        Self {
            width: 9.0,
            length: 18.0,
            vertical: true,
        }
    }
}

impl TargetShape {
    /// Corners of the target rectangle in source-vertex order
    /// (top-left, top-right, bottom-right, bottom-left).
    pub fn vertices(&self) -> [Point2<f64>; 4] {
        let (w, l) = (self.width, self.length);
        if self.vertical {
            [
                Point2::new(0.0, 0.0),
                Point2::new(w, 0.0),
                Point2::new(w, l),
                Point2::new(0.0, l),
            ]
        } else {
            [
                Point2::new(0.0, 0.0),
                Point2::new(0.0, w),
                Point2::new(l, w),
                Point2::new(l, 0.0),
            ]
        }
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(self.width) || !valid(self.length) {
            return Err(CalibrationError::invalid(format!(
                "target shape must be positive, got {} x {}",
                self.width, self.length
            )));
        }
        Ok(())
    }
}

/// Persisted calibration record.
///
/// Serialized as plain JSON arrays so the file stays hand-editable:
///
/// ```json
/// {
///   "source_vertices": [[412, 250], [868, 250], [1130, 690], [150, 690]],
///   "target_vertices": [[0, 0], [9, 0], [9, 18], [0, 18]],
///   "transform_matrix": [[..], [..], [..]],
///   "vertical": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Four pixel-space corners, in visual order
    pub source_vertices: Vec<[f64; 2]>,

    /// Four court-space corners. Older files omit them; they are then
    /// recovered by projecting the source vertices.
    #[serde(default)]
    pub target_vertices: Vec<[f64; 2]>,

    /// Row-major 3×3 homography (source → target)
    pub transform_matrix: Vec<Vec<f64>>,

    /// Orientation flag used to derive the target vertices
    #[serde(default = "default_vertical")]
    pub vertical: bool,
}

fn default_vertical() -> bool {
    true
}

/// A complete, validated calibration.
#[derive(Debug, Clone)]
pub struct Calibration {
    source_vertices: [Point2<f64>; 4],
    target_vertices: [Point2<f64>; 4],
    matrix: Matrix3<f64>,
    vertical: bool,
    /// Source quadrilateral for containment tests
    polygon: Polygon<f64>,
}

impl Calibration {
    fn new(
        source_vertices: [Point2<f64>; 4],
        target_vertices: [Point2<f64>; 4],
        matrix: Matrix3<f64>,
        vertical: bool,
    ) -> Self {
        let ring: Vec<(f64, f64)> = source_vertices.iter().map(|p| (p.x, p.y)).collect();
        let polygon = Polygon::new(LineString::from(ring), vec![]);

        Self {
            source_vertices,
            target_vertices,
            matrix,
            vertical,
            polygon,
        }
    }

    /// Pixel-space corners.
    pub fn source_vertices(&self) -> &[Point2<f64>; 4] {
        &self.source_vertices
    }

    /// Court-space corners.
    pub fn target_vertices(&self) -> &[Point2<f64>; 4] {
        &self.target_vertices
    }

    /// The source → target homography.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn vertical(&self) -> bool {
        self.vertical
    }

    /// Inside-or-on-boundary test against the source quadrilateral.
    pub fn contains(&self, point: &Point2<f64>) -> bool {
        self.polygon.intersects(&Point::new(point.x, point.y))
    }

    /// Homogeneous projection `[x', y', w'] = M·[x, y, 1]`.
    pub fn project(&self, point: &Point2<f64>) -> Option<Point2<f64>> {
        project(&self.matrix, point)
    }

    fn to_data(&self) -> CalibrationData {
        let rows = (0..3)
            .map(|r| (0..3).map(|c| self.matrix[(r, c)]).collect())
            .collect();

        CalibrationData {
            source_vertices: self.source_vertices.iter().map(|p| [p.x, p.y]).collect(),
            target_vertices: self.target_vertices.iter().map(|p| [p.x, p.y]).collect(),
            transform_matrix: rows,
            vertical: self.vertical,
        }
    }
}

/// Two-state calibration flag.
#[derive(Debug, Clone, Default)]
pub enum CalibrationState {
    #[default]
    NotCalibrated,
    Ready(Calibration),
}

/// Converts ground points from pixel space to court space.
///
/// Immutable once calibrated; share it behind an `Arc` and call
/// [`transform`](Self::transform) from any number of readers.
#[derive(Debug, Clone, Default)]
pub struct CoordinateTransformer {
    state: CalibrationState,
}

impl CoordinateTransformer {
    /// Creates an uncalibrated transformer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transformer from persisted data.
    pub fn from_data(data: CalibrationData) -> Result<Self, CalibrationError> {
        let mut transformer = Self::new();
        transformer.load_calibration(data)?;
        Ok(transformer)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, CalibrationState::Ready(_))
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Returns the active calibration, if any.
    pub fn calibration(&self) -> Option<&Calibration> {
        match &self.state {
            CalibrationState::Ready(calibration) => Some(calibration),
            CalibrationState::NotCalibrated => None,
        }
    }

    /// Computes a calibration from four picked pixel corners.
    ///
    /// # Arguments
    /// * `source_points` - Exactly four corners: top-left, top-right,
    ///   bottom-right, bottom-left
    /// * `shape` - Court dimensions and orientation
    ///
    /// On failure the previous state is kept.
    pub fn calibrate(
        &mut self,
        source_points: &[Point2<f64>],
        shape: TargetShape,
    ) -> Result<(), CalibrationError> {
        let source = four_points(source_points).map_err(CalibrationError::invalid)?;
        shape.validate()?;
        check_non_degenerate(&source)?;

        let target = shape.vertices();
        let matrix = perspective_transform(&source, &target).ok_or_else(|| {
            CalibrationError::invalid("source points are degenerate (singular system)")
        })?;

        self.state = CalibrationState::Ready(Calibration::new(source, target, matrix, shape.vertical));
        info!(vertical = shape.vertical, "Calibration computed");
        Ok(())
    }

    /// Replaces the calibration with persisted data.
    ///
    /// Everything is validated before the state is touched, so a failed
    /// load leaves the transformer exactly as it was.
    pub fn load_calibration(&mut self, data: CalibrationData) -> Result<(), CalibrationError> {
        let source = parse_vertices(&data.source_vertices)
            .map_err(|e| CalibrationError::load(format!("source_vertices: {e}")))?;
        let matrix = parse_matrix(&data.transform_matrix)?;

        if matrix.try_inverse().is_none() {
            return Err(CalibrationError::load("transform_matrix is singular"));
        }

        let target = if data.target_vertices.is_empty() {
            let mut projected = [Point2::origin(); 4];
            for (slot, vertex) in projected.iter_mut().zip(source.iter()) {
                *slot = project(&matrix, vertex).ok_or_else(|| {
                    CalibrationError::load("transform_matrix sends a source vertex to infinity")
                })?;
            }
            projected
        } else {
            let target = parse_vertices(&data.target_vertices)
                .map_err(|e| CalibrationError::load(format!("target_vertices: {e}")))?;
            for (s, t) in source.iter().zip(target.iter()) {
                let mapped = project(&matrix, s);
                let consistent = mapped
                    .map(|m| (m - t).norm() <= VERTEX_TOLERANCE * (1.0 + t.coords.norm()))
                    .unwrap_or(false);
                if !consistent {
                    return Err(CalibrationError::load(
                        "transform_matrix does not map source_vertices onto target_vertices",
                    ));
                }
            }
            target
        };

        self.state = CalibrationState::Ready(Calibration::new(source, target, matrix, data.vertical));
        Ok(())
    }

    /// Exports the active calibration for persistence.
    pub fn save_calibration(&self) -> Result<CalibrationData, CalibrationError> {
        self.calibration()
            .map(Calibration::to_data)
            .ok_or(CalibrationError::NotCalibrated)
    }

    /// Maps one pixel-space point into court space.
    ///
    /// Returns `None` when not calibrated, when the point lies outside the
    /// calibration quadrilateral and `allow_extrapolation` is false, or when
    /// the point projects to infinity.
    pub fn transform(&self, point: Point2<f64>, allow_extrapolation: bool) -> Option<Point2<f64>> {
        let calibration = self.calibration()?;

        if !allow_extrapolation && !calibration.contains(&point) {
            return None;
        }

        calibration.project(&point)
    }

    /// Maps a batch of points with the same extrapolation policy.
    pub fn transform_many(
        &self,
        points: &[Point2<f64>],
        allow_extrapolation: bool,
    ) -> Vec<Option<Point2<f64>>> {
        points
            .iter()
            .map(|p| self.transform(*p, allow_extrapolation))
            .collect()
    }
}

/// Solves the 8-unknown linear system for the homography that maps each
/// `src[i]` onto `dst[i]`, with `h33` fixed to 1.
///
/// Returns `None` when the system is singular.
pub fn perspective_transform(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);

        // u = (h11 x + h12 y + h13) / (h31 x + h32 y + 1)
        a[(i, 0)] = x;
        a[(i, 1)] = y;
        a[(i, 2)] = 1.0;
        a[(i, 6)] = -x * u;
        a[(i, 7)] = -y * u;
        b[i] = u;

        // v = (h21 x + h22 y + h23) / (h31 x + h32 y + 1)
        a[(i + 4, 3)] = x;
        a[(i + 4, 4)] = y;
        a[(i + 4, 5)] = 1.0;
        a[(i + 4, 6)] = -x * v;
        a[(i + 4, 7)] = -y * v;
        b[i + 4] = v;
    }

    let h = a.lu().solve(&b)?;
    let matrix = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);

    if matrix.iter().all(|v| v.is_finite()) {
        Some(matrix)
    } else {
        None
    }
}

fn project(matrix: &Matrix3<f64>, point: &Point2<f64>) -> Option<Point2<f64>> {
    let mapped = matrix * Vector3::new(point.x, point.y, 1.0);
    if mapped.z.abs() < MIN_PROJECTIVE_WEIGHT {
        return None;
    }
    Some(Point2::new(mapped.x / mapped.z, mapped.y / mapped.z))
}

fn four_points(points: &[Point2<f64>]) -> Result<[Point2<f64>; 4], String> {
    let quad: [Point2<f64>; 4] = points
        .try_into()
        .map_err(|_| format!("expected exactly 4 points, got {}", points.len()))?;
    if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err("points must be finite".to_string());
    }
    Ok(quad)
}

fn parse_vertices(raw: &[[f64; 2]]) -> Result<[Point2<f64>; 4], String> {
    let points: Vec<Point2<f64>> = raw.iter().map(|[x, y]| Point2::new(*x, *y)).collect();
    four_points(&points)
}

fn parse_matrix(rows: &[Vec<f64>]) -> Result<Matrix3<f64>, CalibrationError> {
    if rows.len() != 3 || rows.iter().any(|row| row.len() != 3) {
        return Err(CalibrationError::load("transform_matrix must be 3x3"));
    }

    let matrix = Matrix3::from_fn(|r, c| rows[r][c]);
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::load("transform_matrix has non-finite entries"));
    }
    Ok(matrix)
}

/// Rejects quadrilaterals where any three corners are (nearly) collinear.
fn check_non_degenerate(quad: &[Point2<f64>; 4]) -> Result<(), CalibrationError> {
    let span = quad
        .iter()
        .flat_map(|a| quad.iter().map(move |b| (a - b).norm()))
        .fold(0.0_f64, f64::max);
    if span == 0.0 {
        return Err(CalibrationError::invalid("all source points coincide"));
    }

    let min_area = 1e-9 * span * span;
    for skip in 0..4 {
        let tri: Vec<&Point2<f64>> = quad
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, p)| p)
            .collect();
        let (ab, ac) = (tri[1] - tri[0], tri[2] - tri[0]);
        let twice_area = (ab.x * ac.y - ab.y * ac.x).abs();
        if twice_area < min_area {
            return Err(CalibrationError::invalid("three source points are collinear"));
        }
    }
    Ok(())
}

/// File-backed calibration persistence, keyed by source name.
///
/// The key is the file stem of the source (`test.mp4` → `<dir>/test.json`),
/// so a calibration follows its video or camera around.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    dir: PathBuf,
}

impl CalibrationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the calibration file for a source.
    pub fn path_for(&self, source: &str) -> PathBuf {
        let stem = Path::new(source)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("default");
        self.dir.join(format!("{stem}.json"))
    }

    pub fn exists(&self, source: &str) -> bool {
        self.path_for(source).is_file()
    }

    /// Reads the raw calibration record for a source.
    pub fn load(&self, source: &str) -> Result<CalibrationData, CalibrationError> {
        let path = self.path_for(source);
        let text = fs::read_to_string(&path).map_err(|e| {
            CalibrationError::load(format!("cannot read {}: {e}", path.display()))
        })?;
        let data = serde_json::from_str(&text).map_err(|e| {
            CalibrationError::load(format!("malformed {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "Calibration loaded");
        Ok(data)
    }

    /// Loads and applies a calibration in one step.
    pub fn load_into(
        &self,
        source: &str,
        transformer: &mut CoordinateTransformer,
    ) -> Result<(), CalibrationError> {
        let data = self.load(source)?;
        transformer.load_calibration(data)
    }

    /// Writes a calibration record, creating the directory if needed.
    pub fn save(&self, source: &str, data: &CalibrationData) -> Result<PathBuf, CalibrationError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(source);
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)?;
        info!(path = %path.display(), "Calibration saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// A court seen in perspective: far edge narrower than the near edge.
    fn trapezoid() -> Vec<Point2<f64>> {
        vec![
            Point2::new(400.0, 200.0),
            Point2::new(880.0, 200.0),
            Point2::new(1150.0, 680.0),
            Point2::new(130.0, 680.0),
        ]
    }

    fn calibrated(shape: TargetShape) -> CoordinateTransformer {
        let mut transformer = CoordinateTransformer::new();
        transformer.calibrate(&trapezoid(), shape).unwrap();
        transformer
    }

    #[test]
    fn test_uncalibrated_transform_returns_none() {
        let transformer = CoordinateTransformer::new();
        assert!(!transformer.is_ready());
        assert!(transformer.transform(Point2::new(500.0, 500.0), true).is_none());
    }

    #[test]
    fn test_save_before_calibration_fails() {
        let transformer = CoordinateTransformer::new();
        assert!(matches!(
            transformer.save_calibration(),
            Err(CalibrationError::NotCalibrated)
        ));
    }

    #[test]
    fn test_vertices_map_to_target_corners() {
        for vertical in [true, false] {
            let shape = TargetShape { vertical, ..TargetShape::default() };
            let transformer = calibrated(shape);

            for (src, dst) in trapezoid().iter().zip(shape.vertices().iter()) {
                let mapped = transformer.transform(*src, false).unwrap();
                assert_relative_eq!(mapped.x, dst.x, epsilon = 1e-6);
                assert_relative_eq!(mapped.y, dst.y, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_horizontal_target_vertex_order() {
        let shape = TargetShape { width: 9.0, length: 18.0, vertical: false };
        let v = shape.vertices();
        assert_eq!(v[1], Point2::new(0.0, 9.0));
        assert_eq!(v[2], Point2::new(18.0, 9.0));
        assert_eq!(v[3], Point2::new(18.0, 0.0));
    }

    #[test]
    fn test_outside_point_respects_extrapolation_flag() {
        let transformer = calibrated(TargetShape::default());
        let outside = Point2::new(5.0, 5.0);

        assert!(transformer.transform(outside, false).is_none());
        assert!(transformer.transform(outside, true).is_some());
    }

    #[test]
    fn test_inside_point_lands_inside_court() {
        let transformer = calibrated(TargetShape::default());
        let p = transformer.transform(Point2::new(640.0, 500.0), false).unwrap();

        assert!(p.x > 0.0 && p.x < 9.0);
        assert!(p.y > 0.0 && p.y < 18.0);
    }

    #[test]
    fn test_boundary_point_counts_as_inside() {
        let transformer = calibrated(TargetShape::default());
        // Midpoint of the bottom edge
        let p = transformer.transform(Point2::new(640.0, 680.0), false).unwrap();
        assert_relative_eq!(p.y, 18.0, epsilon = 1e-6);
    }

    #[test]
    fn test_wrong_point_count_rejected() {
        let mut transformer = CoordinateTransformer::new();
        let three = &trapezoid()[..3];

        let result = transformer.calibrate(three, TargetShape::default());
        assert!(matches!(result, Err(CalibrationError::InvalidCalibrationInput(_))));
        assert!(!transformer.is_ready());
    }

    #[test]
    fn test_collinear_points_rejected() {
        let mut transformer = CoordinateTransformer::new();
        let line = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(20.0, 20.0),
            Point2::new(0.0, 50.0),
        ];

        let result = transformer.calibrate(&line, TargetShape::default());
        assert!(matches!(result, Err(CalibrationError::InvalidCalibrationInput(_))));
    }

    #[test]
    fn test_failed_calibration_keeps_previous_state() {
        let mut transformer = calibrated(TargetShape::default());
        let before = transformer.transform(Point2::new(640.0, 500.0), false);

        let coincident = [Point2::new(1.0, 1.0); 4];
        assert!(transformer.calibrate(&coincident, TargetShape::default()).is_err());
        assert_eq!(transformer.transform(Point2::new(640.0, 500.0), false), before);
    }

    #[test]
    fn test_save_load_round_trip() {
        let original = calibrated(TargetShape::default());
        let data = original.save_calibration().unwrap();
        let restored = CoordinateTransformer::from_data(data).unwrap();

        for p in [
            Point2::new(640.0, 500.0),
            Point2::new(10.0, 10.0),
            Point2::new(1200.0, 700.0),
        ] {
            let a = original.transform(p, true).unwrap();
            let b = restored.transform(p, true).unwrap();
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_load_without_target_vertices_recovers_them() {
        let mut data = calibrated(TargetShape::default()).save_calibration().unwrap();
        data.target_vertices.clear();

        let restored = CoordinateTransformer::from_data(data).unwrap();
        let target = restored.calibration().unwrap().target_vertices();
        assert_relative_eq!(target[2].x, 9.0, epsilon = 1e-6);
        assert_relative_eq!(target[2].y, 18.0, epsilon = 1e-6);
    }

    #[test]
    fn test_malformed_load_is_rejected_atomically() {
        let good = calibrated(TargetShape::default()).save_calibration().unwrap();

        let mut missing_vertex = good.clone();
        missing_vertex.source_vertices.pop();

        let mut bad_shape = good.clone();
        bad_shape.transform_matrix[1].pop();

        let mut non_finite = good.clone();
        non_finite.transform_matrix[0][0] = f64::NAN;

        let mut singular = good.clone();
        singular.transform_matrix = vec![vec![0.0; 3]; 3];

        let mut inconsistent = good.clone();
        inconsistent.target_vertices[2] = [100.0, 100.0];

        let mut transformer = CoordinateTransformer::new();
        for data in [missing_vertex, bad_shape, non_finite, singular, inconsistent] {
            let result = transformer.load_calibration(data);
            assert!(matches!(result, Err(CalibrationError::CalibrationLoadError(_))));
            assert!(!transformer.is_ready());
        }
    }

    #[test]
    fn test_transform_many() {
        let transformer = calibrated(TargetShape::default());
        let results = transformer.transform_many(
            &[Point2::new(640.0, 500.0), Point2::new(0.0, 0.0)],
            false,
        );
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    #[test]
    fn test_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("courtview-cal-{}", uuid::Uuid::new_v4()));
        let store = CalibrationStore::new(&dir);
        assert_eq!(store.path_for("videos/test.mp4"), dir.join("test.json"));
        assert!(!store.exists("test.mp4"));

        let data = calibrated(TargetShape::default()).save_calibration().unwrap();
        store.save("test.mp4", &data).unwrap();
        assert!(store.exists("test.mp4"));

        let mut transformer = CoordinateTransformer::new();
        store.load_into("test.mp4", &mut transformer).unwrap();
        assert!(transformer.is_ready());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_store_missing_file_is_load_error() {
        let store = CalibrationStore::new(std::env::temp_dir().join("courtview-missing"));
        assert!(matches!(
            store.load("nope.mp4"),
            Err(CalibrationError::CalibrationLoadError(_))
        ));
    }
}
