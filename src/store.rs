//! Live detection configuration store.
//!
//! `ConfigStore` is the single source of truth for every tunable detection
//! parameter. The operator panel writes single fields through `set`; the render
//! loop reads one snapshot per tick through `begin_tick`. Writes landing mid-tick
//! are seen on the next tick only.
//!
//! Architecture changes are deferred: `set("input.mobileNetArchitecture", ..)`
//! records a pending marker that the loop consumes at the start of a tick.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{OverlayError, Result};

// ----------------------------------------------------------------------------
// Enumerated parameters
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "single-pose", alias = "single")]
    Single,
    #[serde(rename = "multi-pose", alias = "multi")]
    Multi,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Single => "single-pose",
            Algorithm::Multi => "multi-pose",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "single-pose" | "single" => Ok(Algorithm::Single),
            "multi-pose" | "multi" => Ok(Algorithm::Multi),
            other => Err(OverlayError::InvalidConfig(format!(
                "unknown algorithm {:?} (expected single-pose or multi-pose)",
                other
            ))),
        }
    }
}

/// MobileNet width multiplier of the pose model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Architecture {
    MobileNet101,
    MobileNet100,
    MobileNet075,
    MobileNet050,
}

impl Architecture {
    pub const ALL: [Architecture; 4] = [
        Architecture::MobileNet101,
        Architecture::MobileNet100,
        Architecture::MobileNet075,
        Architecture::MobileNet050,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::MobileNet101 => "1.01",
            Architecture::MobileNet100 => "1.00",
            Architecture::MobileNet075 => "0.75",
            Architecture::MobileNet050 => "0.50",
        }
    }

    /// Short tag used in model file names.
    pub fn tag(self) -> &'static str {
        match self {
            Architecture::MobileNet101 => "101",
            Architecture::MobileNet100 => "100",
            Architecture::MobileNet075 => "075",
            Architecture::MobileNet050 => "050",
        }
    }

    pub fn multiplier(self) -> f32 {
        match self {
            Architecture::MobileNet101 => 1.01,
            Architecture::MobileNet100 => 1.0,
            Architecture::MobileNet075 => 0.75,
            Architecture::MobileNet050 => 0.5,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.01" => Ok(Architecture::MobileNet101),
            "1.00" | "1.0" | "1" => Ok(Architecture::MobileNet100),
            "0.75" => Ok(Architecture::MobileNet075),
            "0.50" | "0.5" => Ok(Architecture::MobileNet050),
            other => Err(OverlayError::InvalidConfig(format!(
                "unsupported architecture {:?} (expected one of 1.01, 1.00, 0.75, 0.50)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Architecture {
    type Error = OverlayError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Architecture> for String {
    fn from(value: Architecture) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum OutputStride {
    Eight,
    Sixteen,
    ThirtyTwo,
}

impl OutputStride {
    pub fn as_u32(self) -> u32 {
        match self {
            OutputStride::Eight => 8,
            OutputStride::Sixteen => 16,
            OutputStride::ThirtyTwo => 32,
        }
    }
}

impl TryFrom<u32> for OutputStride {
    type Error = OverlayError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            8 => Ok(OutputStride::Eight),
            16 => Ok(OutputStride::Sixteen),
            32 => Ok(OutputStride::ThirtyTwo),
            other => Err(OverlayError::InvalidConfig(format!(
                "unsupported output stride {} (expected 8, 16 or 32)",
                other
            ))),
        }
    }
}

impl From<OutputStride> for u32 {
    fn from(value: OutputStride) -> Self {
        value.as_u32()
    }
}

// ----------------------------------------------------------------------------
// DetectionConfig
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InputConfig {
    pub mobile_net_architecture: Architecture,
    pub output_stride: OutputStride,
    pub image_scale_factor: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mobile_net_architecture: Architecture::MobileNet075,
            output_stride: OutputStride::Sixteen,
            image_scale_factor: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SinglePoseConfig {
    pub min_pose_confidence: f32,
    pub min_part_confidence: f32,
}

impl Default for SinglePoseConfig {
    fn default() -> Self {
        Self {
            min_pose_confidence: 0.1,
            min_part_confidence: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MultiPoseConfig {
    pub max_pose_detections: u32,
    pub min_pose_confidence: f32,
    pub min_part_confidence: f32,
    pub nms_radius: f32,
}

impl Default for MultiPoseConfig {
    fn default() -> Self {
        Self {
            max_pose_detections: 5,
            min_pose_confidence: 0.15,
            min_part_confidence: 0.1,
            nms_radius: 30.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputConfig {
    pub show_video: bool,
    pub show_skeleton: bool,
    pub show_points: bool,
    /// Draw a "searching" ring when no pose is confident.
    pub show_searching: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            show_video: true,
            show_skeleton: true,
            show_points: true,
            show_searching: false,
        }
    }
}

/// Every tunable detection parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectionConfig {
    pub algorithm: Algorithm,
    pub input: InputConfig,
    pub single_pose_detection: SinglePoseConfig,
    pub multi_pose_detection: MultiPoseConfig,
    pub output: OutputConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Multi,
            input: InputConfig::default(),
            single_pose_detection: SinglePoseConfig::default(),
            multi_pose_detection: MultiPoseConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Confidence thresholds of the active algorithm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub min_pose_confidence: f32,
    pub min_part_confidence: f32,
}

impl DetectionConfig {
    pub fn thresholds(&self) -> Thresholds {
        match self.algorithm {
            Algorithm::Single => Thresholds {
                min_pose_confidence: self.single_pose_detection.min_pose_confidence,
                min_part_confidence: self.single_pose_detection.min_part_confidence,
            },
            Algorithm::Multi => Thresholds {
                min_pose_confidence: self.multi_pose_detection.min_pose_confidence,
                min_part_confidence: self.multi_pose_detection.min_part_confidence,
            },
        }
    }

    /// Check the range constraints of every field.
    pub fn validate(&self) -> Result<()> {
        check_scale_factor(self.input.image_scale_factor)?;
        check_unit("singlePoseDetection.minPoseConfidence", self.single_pose_detection.min_pose_confidence)?;
        check_unit("singlePoseDetection.minPartConfidence", self.single_pose_detection.min_part_confidence)?;
        check_unit("multiPoseDetection.minPoseConfidence", self.multi_pose_detection.min_pose_confidence)?;
        check_unit("multiPoseDetection.minPartConfidence", self.multi_pose_detection.min_part_confidence)?;
        check_max_detections(self.multi_pose_detection.max_pose_detections)?;
        check_nms_radius(self.multi_pose_detection.nms_radius)?;
        Ok(())
    }
}

fn check_unit(path: &str, value: f32) -> Result<f32> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(OverlayError::InvalidConfig(format!(
            "{} must be within [0, 1], got {}",
            path, value
        )))
    }
}

fn check_scale_factor(value: f32) -> Result<f32> {
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(OverlayError::InvalidConfig(format!(
            "input.imageScaleFactor must be within (0, 1], got {}",
            value
        )))
    }
}

fn check_max_detections(value: u32) -> Result<u32> {
    if value >= 1 {
        Ok(value)
    } else {
        Err(OverlayError::InvalidConfig(
            "multiPoseDetection.maxPoseDetections must be at least 1".to_string(),
        ))
    }
}

fn check_nms_radius(value: f32) -> Result<f32> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(OverlayError::InvalidConfig(format!(
            "multiPoseDetection.nmsRadius must be a non-negative number, got {}",
            value
        )))
    }
}

// ----------------------------------------------------------------------------
// Field paths
// ----------------------------------------------------------------------------

/// Addressable fields of `DetectionConfig`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigField {
    Algorithm,
    Architecture,
    OutputStride,
    ImageScaleFactor,
    SingleMinPoseConfidence,
    SingleMinPartConfidence,
    MultiMaxPoseDetections,
    MultiMinPoseConfidence,
    MultiMinPartConfidence,
    MultiNmsRadius,
    ShowVideo,
    ShowSkeleton,
    ShowPoints,
    ShowSearching,
}

/// Control hint for a panel binding a field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldHint {
    Options(&'static [&'static str]),
    Range {
        min: f32,
        max: f32,
        step: Option<f32>,
    },
    Toggle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub field: ConfigField,
    pub path: &'static str,
    pub value: String,
    pub hint: FieldHint,
}

const UNIT_RANGE: FieldHint = FieldHint::Range {
    min: 0.0,
    max: 1.0,
    step: None,
};

impl ConfigField {
    pub const ALL: [ConfigField; 14] = [
        ConfigField::Algorithm,
        ConfigField::Architecture,
        ConfigField::OutputStride,
        ConfigField::ImageScaleFactor,
        ConfigField::SingleMinPoseConfidence,
        ConfigField::SingleMinPartConfidence,
        ConfigField::MultiMaxPoseDetections,
        ConfigField::MultiMinPoseConfidence,
        ConfigField::MultiMinPartConfidence,
        ConfigField::MultiNmsRadius,
        ConfigField::ShowVideo,
        ConfigField::ShowSkeleton,
        ConfigField::ShowPoints,
        ConfigField::ShowSearching,
    ];

    pub fn path(self) -> &'static str {
        match self {
            ConfigField::Algorithm => "algorithm",
            ConfigField::Architecture => "input.mobileNetArchitecture",
            ConfigField::OutputStride => "input.outputStride",
            ConfigField::ImageScaleFactor => "input.imageScaleFactor",
            ConfigField::SingleMinPoseConfidence => "singlePoseDetection.minPoseConfidence",
            ConfigField::SingleMinPartConfidence => "singlePoseDetection.minPartConfidence",
            ConfigField::MultiMaxPoseDetections => "multiPoseDetection.maxPoseDetections",
            ConfigField::MultiMinPoseConfidence => "multiPoseDetection.minPoseConfidence",
            ConfigField::MultiMinPartConfidence => "multiPoseDetection.minPartConfidence",
            ConfigField::MultiNmsRadius => "multiPoseDetection.nmsRadius",
            ConfigField::ShowVideo => "output.showVideo",
            ConfigField::ShowSkeleton => "output.showSkeleton",
            ConfigField::ShowPoints => "output.showPoints",
            ConfigField::ShowSearching => "output.showSearching",
        }
    }

    pub fn hint(self) -> FieldHint {
        match self {
            ConfigField::Algorithm => FieldHint::Options(&["single-pose", "multi-pose"]),
            ConfigField::Architecture => FieldHint::Options(&["1.01", "1.00", "0.75", "0.50"]),
            ConfigField::OutputStride => FieldHint::Options(&["8", "16", "32"]),
            ConfigField::ImageScaleFactor => FieldHint::Range {
                min: 0.2,
                max: 1.0,
                step: None,
            },
            ConfigField::MultiMaxPoseDetections => FieldHint::Range {
                min: 1.0,
                max: 20.0,
                step: Some(1.0),
            },
            ConfigField::MultiNmsRadius => FieldHint::Range {
                min: 0.0,
                max: 40.0,
                step: None,
            },
            ConfigField::SingleMinPoseConfidence
            | ConfigField::SingleMinPartConfidence
            | ConfigField::MultiMinPoseConfidence
            | ConfigField::MultiMinPartConfidence => UNIT_RANGE,
            ConfigField::ShowVideo
            | ConfigField::ShowSkeleton
            | ConfigField::ShowPoints
            | ConfigField::ShowSearching => FieldHint::Toggle,
        }
    }

    fn read(self, config: &DetectionConfig) -> String {
        match self {
            ConfigField::Algorithm => config.algorithm.to_string(),
            ConfigField::Architecture => config.input.mobile_net_architecture.to_string(),
            ConfigField::OutputStride => config.input.output_stride.as_u32().to_string(),
            ConfigField::ImageScaleFactor => config.input.image_scale_factor.to_string(),
            ConfigField::SingleMinPoseConfidence => {
                config.single_pose_detection.min_pose_confidence.to_string()
            }
            ConfigField::SingleMinPartConfidence => {
                config.single_pose_detection.min_part_confidence.to_string()
            }
            ConfigField::MultiMaxPoseDetections => {
                config.multi_pose_detection.max_pose_detections.to_string()
            }
            ConfigField::MultiMinPoseConfidence => {
                config.multi_pose_detection.min_pose_confidence.to_string()
            }
            ConfigField::MultiMinPartConfidence => {
                config.multi_pose_detection.min_part_confidence.to_string()
            }
            ConfigField::MultiNmsRadius => config.multi_pose_detection.nms_radius.to_string(),
            ConfigField::ShowVideo => config.output.show_video.to_string(),
            ConfigField::ShowSkeleton => config.output.show_skeleton.to_string(),
            ConfigField::ShowPoints => config.output.show_points.to_string(),
            ConfigField::ShowSearching => config.output.show_searching.to_string(),
        }
    }
}

impl FromStr for ConfigField {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        let path = s.trim();
        ConfigField::ALL
            .iter()
            .copied()
            .find(|field| field.path() == path)
            .ok_or_else(|| OverlayError::InvalidConfig(format!("unknown field {:?}", path)))
    }
}

/// A parsed, range-checked value, tagged with the field it belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Assignment {
    Algorithm(Algorithm),
    Architecture(Architecture),
    OutputStride(OutputStride),
    ImageScaleFactor(f32),
    SingleMinPoseConfidence(f32),
    SingleMinPartConfidence(f32),
    MultiMaxPoseDetections(u32),
    MultiMinPoseConfidence(f32),
    MultiMinPartConfidence(f32),
    MultiNmsRadius(f32),
    ShowVideo(bool),
    ShowSkeleton(bool),
    ShowPoints(bool),
    ShowSearching(bool),
}

impl Assignment {
    fn field(self) -> ConfigField {
        match self {
            Assignment::Algorithm(_) => ConfigField::Algorithm,
            Assignment::Architecture(_) => ConfigField::Architecture,
            Assignment::OutputStride(_) => ConfigField::OutputStride,
            Assignment::ImageScaleFactor(_) => ConfigField::ImageScaleFactor,
            Assignment::SingleMinPoseConfidence(_) => ConfigField::SingleMinPoseConfidence,
            Assignment::SingleMinPartConfidence(_) => ConfigField::SingleMinPartConfidence,
            Assignment::MultiMaxPoseDetections(_) => ConfigField::MultiMaxPoseDetections,
            Assignment::MultiMinPoseConfidence(_) => ConfigField::MultiMinPoseConfidence,
            Assignment::MultiMinPartConfidence(_) => ConfigField::MultiMinPartConfidence,
            Assignment::MultiNmsRadius(_) => ConfigField::MultiNmsRadius,
            Assignment::ShowVideo(_) => ConfigField::ShowVideo,
            Assignment::ShowSkeleton(_) => ConfigField::ShowSkeleton,
            Assignment::ShowPoints(_) => ConfigField::ShowPoints,
            Assignment::ShowSearching(_) => ConfigField::ShowSearching,
        }
    }

    fn apply(self, config: &mut DetectionConfig) {
        match self {
            Assignment::Algorithm(v) => config.algorithm = v,
            Assignment::Architecture(v) => config.input.mobile_net_architecture = v,
            Assignment::OutputStride(v) => config.input.output_stride = v,
            Assignment::ImageScaleFactor(v) => config.input.image_scale_factor = v,
            Assignment::SingleMinPoseConfidence(v) => {
                config.single_pose_detection.min_pose_confidence = v
            }
            Assignment::SingleMinPartConfidence(v) => {
                config.single_pose_detection.min_part_confidence = v
            }
            Assignment::MultiMaxPoseDetections(v) => {
                config.multi_pose_detection.max_pose_detections = v
            }
            Assignment::MultiMinPoseConfidence(v) => {
                config.multi_pose_detection.min_pose_confidence = v
            }
            Assignment::MultiMinPartConfidence(v) => {
                config.multi_pose_detection.min_part_confidence = v
            }
            Assignment::MultiNmsRadius(v) => config.multi_pose_detection.nms_radius = v,
            Assignment::ShowVideo(v) => config.output.show_video = v,
            Assignment::ShowSkeleton(v) => config.output.show_skeleton = v,
            Assignment::ShowPoints(v) => config.output.show_points = v,
            Assignment::ShowSearching(v) => config.output.show_searching = v,
        }
    }
}

fn parse_number(path: &str, raw: &str) -> Result<f32> {
    let value: f32 = raw.trim().parse().map_err(|_| {
        OverlayError::InvalidConfig(format!("{} expects a number, got {:?}", path, raw))
    })?;
    if !value.is_finite() {
        return Err(OverlayError::InvalidConfig(format!(
            "{} expects a finite number, got {:?}",
            path, raw
        )));
    }
    Ok(value)
}

fn parse_flag(path: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        other => Err(OverlayError::InvalidConfig(format!(
            "{} expects true or false, got {:?}",
            path, other
        ))),
    }
}

fn parse_assignment(field: ConfigField, raw: &str) -> Result<Assignment> {
    let path = field.path();
    let unit = |raw: &str| parse_number(path, raw).and_then(|v| check_unit(path, v));
    Ok(match field {
        ConfigField::Algorithm => Assignment::Algorithm(raw.parse()?),
        ConfigField::Architecture => Assignment::Architecture(raw.parse()?),
        ConfigField::OutputStride => {
            let stride: u32 = raw.trim().parse().map_err(|_| {
                OverlayError::InvalidConfig(format!("{} expects 8, 16 or 32, got {:?}", path, raw))
            })?;
            Assignment::OutputStride(OutputStride::try_from(stride)?)
        }
        ConfigField::ImageScaleFactor => {
            Assignment::ImageScaleFactor(check_scale_factor(parse_number(path, raw)?)?)
        }
        ConfigField::SingleMinPoseConfidence => Assignment::SingleMinPoseConfidence(unit(raw)?),
        ConfigField::SingleMinPartConfidence => Assignment::SingleMinPartConfidence(unit(raw)?),
        ConfigField::MultiMinPoseConfidence => Assignment::MultiMinPoseConfidence(unit(raw)?),
        ConfigField::MultiMinPartConfidence => Assignment::MultiMinPartConfidence(unit(raw)?),
        ConfigField::MultiMaxPoseDetections => {
            let count: u32 = raw.trim().parse().map_err(|_| {
                OverlayError::InvalidConfig(format!("{} expects an integer, got {:?}", path, raw))
            })?;
            Assignment::MultiMaxPoseDetections(check_max_detections(count)?)
        }
        ConfigField::MultiNmsRadius => {
            Assignment::MultiNmsRadius(check_nms_radius(parse_number(path, raw)?)?)
        }
        ConfigField::ShowVideo => Assignment::ShowVideo(parse_flag(path, raw)?),
        ConfigField::ShowSkeleton => Assignment::ShowSkeleton(parse_flag(path, raw)?),
        ConfigField::ShowPoints => Assignment::ShowPoints(parse_flag(path, raw)?),
        ConfigField::ShowSearching => Assignment::ShowSearching(parse_flag(path, raw)?),
    })
}

// ----------------------------------------------------------------------------
// ConfigStore
// ----------------------------------------------------------------------------

/// Snapshot handed to the render loop at the start of a tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickConfig {
    pub config: DetectionConfig,
    /// Architecture requested since the previous tick, consumed by this read.
    pub pending_architecture: Option<Architecture>,
}

struct StoreState {
    config: DetectionConfig,
    pending_architecture: Option<Architecture>,
}

struct StoreInner {
    state: RwLock<StoreState>,
    version: AtomicU64,
    architecture_dirty: AtomicBool,
}

/// Shared handle to the live configuration. Clones refer to the same store.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

impl ConfigStore {
    pub fn new(initial: DetectionConfig) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState {
                    config: initial,
                    pending_architecture: None,
                }),
                version: AtomicU64::new(0),
                architecture_dirty: AtomicBool::new(false),
            }),
        })
    }

    /// Current configuration snapshot.
    pub fn get(&self) -> DetectionConfig {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    /// Parse and assign a single field. Rejected values leave the store unchanged.
    pub fn set(&self, path: &str, value: &str) -> Result<()> {
        let field: ConfigField = path.parse()?;
        let assignment = parse_assignment(field, value)?;

        let mut state = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        assignment.apply(&mut state.config);
        if let Assignment::Architecture(architecture) = assignment {
            state.pending_architecture = Some(architecture);
            self.inner.architecture_dirty.store(true, Ordering::Release);
        }
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        log::debug!("config {} = {}", field.path(), field.read(&state.config));
        Ok(())
    }

    /// Read the per-tick snapshot and consume any pending architecture change.
    pub fn begin_tick(&self) -> TickConfig {
        if self.inner.architecture_dirty.swap(false, Ordering::AcqRel) {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let pending_architecture = state.pending_architecture.take();
            return TickConfig {
                config: state.config.clone(),
                pending_architecture,
            };
        }
        TickConfig {
            config: self.get(),
            pending_architecture: None,
        }
    }

    /// Whether an architecture change is waiting for the next tick.
    pub fn has_pending_architecture(&self) -> bool {
        self.inner.architecture_dirty.load(Ordering::Acquire)
    }

    /// Number of accepted writes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Every field with its current value and panel hint.
    pub fn fields(&self) -> Vec<FieldDescriptor> {
        let config = self.get();
        ConfigField::ALL
            .iter()
            .map(|&field| FieldDescriptor {
                field,
                path: field.path(),
                value: field.read(&config),
                hint: field.hint(),
            })
            .collect()
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState {
                    config: DetectionConfig::default(),
                    pending_architecture: None,
                }),
                version: AtomicU64::new(0),
                architecture_dirty: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_panel_defaults() {
        let config = DetectionConfig::default();
        assert_eq!(config.algorithm, Algorithm::Multi);
        assert_eq!(config.input.mobile_net_architecture, Architecture::MobileNet075);
        assert_eq!(config.input.output_stride.as_u32(), 16);
        assert_eq!(config.multi_pose_detection.max_pose_detections, 5);
        assert_eq!(config.thresholds().min_pose_confidence, 0.15);
        assert!(!config.output.show_searching);
        config.validate().unwrap();
    }

    #[test]
    fn set_updates_single_field_and_bumps_version() {
        let store = ConfigStore::default();
        store.set("multiPoseDetection.nmsRadius", "20").unwrap();
        assert_eq!(store.get().multi_pose_detection.nms_radius, 20.0);
        assert_eq!(store.version(), 1);

        store.set("algorithm", "single-pose").unwrap();
        let config = store.get();
        assert_eq!(config.algorithm, Algorithm::Single);
        assert_eq!(config.thresholds().min_part_confidence, 0.5);
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn rejected_values_leave_store_unchanged() {
        let store = ConfigStore::default();
        let before = store.get();

        assert!(store.set("singlePoseDetection.minPoseConfidence", "1.5").is_err());
        assert!(store.set("input.mobileNetArchitecture", "2.0").is_err());
        assert!(store.set("input.outputStride", "12").is_err());
        assert!(store.set("input.imageScaleFactor", "0").is_err());
        assert!(store.set("multiPoseDetection.maxPoseDetections", "0").is_err());
        assert!(store.set("multiPoseDetection.nmsRadius", "-1").is_err());
        assert!(store.set("output.showVideo", "maybe").is_err());
        assert!(store.set("output.missing", "true").is_err());

        assert_eq!(store.get(), before);
        assert_eq!(store.version(), 0);
        assert!(!store.has_pending_architecture());
    }

    #[test]
    fn architecture_change_is_consumed_once() {
        let store = ConfigStore::default();
        store.set("input.mobileNetArchitecture", "0.50").unwrap();
        assert!(store.has_pending_architecture());
        assert_eq!(
            store.get().input.mobile_net_architecture,
            Architecture::MobileNet050
        );

        let first = store.begin_tick();
        assert_eq!(first.pending_architecture, Some(Architecture::MobileNet050));
        assert!(!store.has_pending_architecture());

        let second = store.begin_tick();
        assert_eq!(second.pending_architecture, None);
    }

    #[test]
    fn latest_architecture_request_wins() {
        let store = ConfigStore::default();
        store.set("input.mobileNetArchitecture", "1.01").unwrap();
        store.set("input.mobileNetArchitecture", "0.50").unwrap();
        let tick = store.begin_tick();
        assert_eq!(tick.pending_architecture, Some(Architecture::MobileNet050));
    }

    #[test]
    fn clones_share_state() {
        let panel = ConfigStore::default();
        let reader = panel.clone();
        panel.set("output.showPoints", "off").unwrap();
        assert!(!reader.get().output.show_points);
    }

    #[test]
    fn fields_cover_every_path() {
        let store = ConfigStore::default();
        let fields = store.fields();
        assert_eq!(fields.len(), ConfigField::ALL.len());
        let stride = fields
            .iter()
            .find(|f| f.path == "input.outputStride")
            .unwrap();
        assert_eq!(stride.value, "16");
        assert_eq!(stride.hint, FieldHint::Options(&["8", "16", "32"]));
        for field in ConfigField::ALL {
            assert_eq!(field.path().parse::<ConfigField>().unwrap(), field);
        }
    }

    #[test]
    fn each_assignment_writes_only_its_own_field() {
        let defaults = DetectionConfig::default();
        for field in ConfigField::ALL {
            let assignment = parse_assignment(field, &field.read(&defaults)).unwrap();
            assert_eq!(assignment.field(), field);
            let mut config = defaults.clone();
            assignment.apply(&mut config);
            assert_eq!(config, defaults, "{}", field.path());
        }

        let mut config = defaults.clone();
        parse_assignment(ConfigField::SingleMinPartConfidence, "0.3")
            .unwrap()
            .apply(&mut config);
        assert_eq!(config.single_pose_detection.min_part_confidence, 0.3);
        assert_eq!(
            config.multi_pose_detection.min_part_confidence,
            defaults.multi_pose_detection.min_part_confidence
        );
    }

    #[test]
    fn new_rejects_out_of_range_initial_config() {
        let mut config = DetectionConfig::default();
        config.multi_pose_detection.min_part_confidence = -0.1;
        assert!(ConfigStore::new(config).is_err());
    }

    #[test]
    fn detection_config_reads_camel_case_toml() {
        let raw = r#"
            algorithm = "single-pose"
            [input]
            mobileNetArchitecture = "1.01"
            outputStride = 8
            [multiPoseDetection]
            nmsRadius = 12.5
        "#;
        let config: DetectionConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.algorithm, Algorithm::Single);
        assert_eq!(config.input.mobile_net_architecture, Architecture::MobileNet101);
        assert_eq!(config.input.output_stride, OutputStride::Eight);
        assert_eq!(config.input.image_scale_factor, 0.5);
        assert_eq!(config.multi_pose_detection.nms_radius, 12.5);
        assert_eq!(config.multi_pose_detection.max_pose_detections, 5);
    }
}
