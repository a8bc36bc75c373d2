// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use thiserror::Error;

/// Maximum number of temporal layers any backend can be asked for.
pub const TS_MAX_LAYERS: usize = 8;
/// Maximum number of spatial layers any backend can be asked for.
pub const SS_MAX_LAYERS: usize = 4;
/// Size of the flattened spatial × temporal layer index space.
pub const MAX_LAYERS: usize = 32;

/// Upper bound of the generic quantizer scale shared by all codecs.
pub const MAX_GENERIC_QUANTIZER: u32 = 63;

/// Largest frame width or height any backend accepts.
pub const MAX_FRAME_DIMENSION: u32 = 65536;
/// Largest stream or layer bitrate, in kbps. Native layer bitrates are `int`.
pub const MAX_BITRATE_KBPS: u64 = i32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    Vp8,
    Vp9,
    Av1,
    Unknown,
}

impl CodecType {
    /// Interprets a numeric codec id. Anything out of range is `Unknown`.
    pub fn from_id(id: u32) -> Self {
        match id {
            0 => Self::Vp8,
            1 => Self::Vp9,
            2 => Self::Av1,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlgorithmId {
    #[default]
    Default,
    DerivedLibvpxVp8,
    DerivedLibvpxVp9,
    DerivedAomAv1,
    Unknown,
}

impl AlgorithmId {
    pub fn from_id(id: u32) -> Self {
        match id {
            0 => Self::Default,
            1 => Self::DerivedLibvpxVp8,
            2 => Self::DerivedLibvpxVp9,
            3 => Self::DerivedAomAv1,
            _ => Self::Unknown,
        }
    }

    /// Whether this algorithm can drive the given codec's backend.
    pub fn is_compatible_with(&self, codec: CodecType) -> bool {
        match self {
            Self::Default => true,
            Self::DerivedLibvpxVp8 => codec == CodecType::Vp8,
            Self::DerivedLibvpxVp9 => codec == CodecType::Vp9,
            Self::DerivedAomAv1 => codec == CodecType::Av1,
            Self::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateControlMode {
    #[default]
    ConstantBitrate,
    VariableBitrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    #[default]
    Key,
    Inter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameParams {
    pub frame_type: FrameType,
    pub spatial_layer_id: usize,
    pub temporal_layer_id: usize,
}

impl FrameParams {
    pub fn key() -> Self {
        Self { frame_type: FrameType::Key, ..Default::default() }
    }
    pub fn inter() -> Self {
        Self { frame_type: FrameType::Inter, ..Default::default() }
    }
    pub fn with_layers(mut self, spatial_layer_id: usize, temporal_layer_id: usize) -> Self {
        self.spatial_layer_id = spatial_layer_id;
        self.temporal_layer_id = temporal_layer_id;
        self
    }

    /// Checks the layer ids against a `spatial_layers` × `temporal_layers` grid.
    pub fn validate_layers(&self, spatial_layers: usize, temporal_layers: usize) -> Result<(), RateControlError> {
        if self.spatial_layer_id >= spatial_layers || self.temporal_layer_id >= temporal_layers {
            return Err(RateControlError::InvalidParameter(format!(
                "layer ids ({}, {}) outside configured grid {spatial_layers}x{temporal_layers}",
                self.spatial_layer_id, self.temporal_layer_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopFilterLevels {
    pub luma: [i32; 2],
    pub chroma_u: i32,
    pub chroma_v: i32,
}

impl LoopFilterLevels {
    pub fn uniform(level: i32) -> Self {
        Self { luma: [level, level], chroma_u: level, chroma_v: level }
    }
    /// Same layout as the native `int[4]` array: luma0, luma1, u, v.
    pub fn to_array(&self) -> [i32; 4] {
        [self.luma[0], self.luma[1], self.chroma_u, self.chroma_v]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CdefInfo {
    pub strength_y: i32,
    pub strength_uv: i32,
    pub damping: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentationData {
    pub segmentation_map: Vec<u8>,
    pub delta_q: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameDropDecision {
    #[default]
    Ok,
    Drop,
}

/// Codec-agnostic encoder configuration handed to every backend.
///
/// Quantizers are on the generic 0..=63 scale, buffer sizes are in
/// milliseconds of buffered data and bitrates in kbps. Per-layer arrays are
/// indexed by `spatial * temporal_layer_count + temporal`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateControllerConfig {
    pub width: u32,
    pub height: u32,
    pub max_quantizer: u32,
    pub min_quantizer: u32,
    pub target_bandwidth_kbps: u64,
    pub buffer_initial_size_ms: u64,
    pub buffer_optimal_size_ms: u64,
    pub buffer_size_ms: u64,
    pub undershoot_pct: u32,
    pub overshoot_pct: u32,
    pub max_intra_bitrate_pct: u32,
    pub max_inter_bitrate_pct: u32,
    pub frame_rate: f64,
    pub spatial_layer_count: usize,
    pub temporal_layer_count: usize,
    pub max_quantizer_per_layer: [u32; MAX_LAYERS],
    pub min_quantizer_per_layer: [u32; MAX_LAYERS],
    pub target_bitrate_per_layer_kbps: [u32; MAX_LAYERS],
    pub scaling_factor_num: [u32; SS_MAX_LAYERS],
    pub scaling_factor_den: [u32; SS_MAX_LAYERS],
    pub frame_rate_decimator: [u32; TS_MAX_LAYERS],
    pub rate_control_mode: RateControlMode,
    /// Must stay zero.
    pub reserved: [u32; 32],
}

impl Default for RateControllerConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            max_quantizer: MAX_GENERIC_QUANTIZER,
            min_quantizer: 0,
            target_bandwidth_kbps: 0,
            buffer_initial_size_ms: 0,
            buffer_optimal_size_ms: 0,
            buffer_size_ms: 0,
            undershoot_pct: 0,
            overshoot_pct: 0,
            max_intra_bitrate_pct: 0,
            max_inter_bitrate_pct: 0,
            frame_rate: 0.0,
            spatial_layer_count: 1,
            temporal_layer_count: 1,
            max_quantizer_per_layer: [0; MAX_LAYERS],
            min_quantizer_per_layer: [0; MAX_LAYERS],
            target_bitrate_per_layer_kbps: [0; MAX_LAYERS],
            scaling_factor_num: [0; SS_MAX_LAYERS],
            scaling_factor_den: [0; SS_MAX_LAYERS],
            frame_rate_decimator: [0; TS_MAX_LAYERS],
            rate_control_mode: RateControlMode::ConstantBitrate,
            reserved: [0; 32],
        }
    }
}

impl RateControllerConfig {
    /// Single-layer real-time CBR configuration used by the encode pipelines.
    pub fn rtc_defaults(width: u32, height: u32, target_bandwidth_kbps: u64) -> Self {
        let mut config = Self {
            width,
            height,
            max_quantizer: 56,
            min_quantizer: 10,
            target_bandwidth_kbps,
            buffer_initial_size_ms: 600,
            buffer_optimal_size_ms: 500,
            buffer_size_ms: 1000,
            undershoot_pct: 25,
            overshoot_pct: 50,
            max_intra_bitrate_pct: 300,
            max_inter_bitrate_pct: 50,
            frame_rate: 60.0,
            ..Default::default()
        };
        config.apply_default_layering();
        config
    }

    pub fn layer_count(&self) -> usize {
        self.spatial_layer_count * self.temporal_layer_count
    }

    pub fn layer_index(&self, spatial_layer_id: usize, temporal_layer_id: usize) -> usize {
        spatial_layer_id * self.temporal_layer_count + temporal_layer_id
    }

    /// Fills the per-layer arrays from the aggregate settings: default
    /// temporal decimator ladder, cumulative layer bitrates and per-layer
    /// quantizer bounds. Scaling factors that are unset, or that still hold a
    /// default ladder generated for another layer count, become the default
    /// spatial ladder (full resolution on the top layer, halving downwards).
    /// Factors set by the caller are kept.
    pub fn apply_default_layering(&mut self) {
        let num_sl = self.spatial_layer_count.clamp(1, SS_MAX_LAYERS);
        let num_tl = self.temporal_layer_count.clamp(1, TS_MAX_LAYERS);

        if self.has_default_scaling_ladder() {
            self.scaling_factor_num = [0; SS_MAX_LAYERS];
            self.scaling_factor_den = [0; SS_MAX_LAYERS];
        }
        for sl in 0..num_sl {
            if self.scaling_factor_num[sl] == 0 || self.scaling_factor_den[sl] == 0 {
                self.scaling_factor_num[sl] = 1;
                self.scaling_factor_den[sl] = 1 << (num_sl - 1 - sl);
            }
        }
        for sl in num_sl..SS_MAX_LAYERS {
            self.scaling_factor_num[sl] = 0;
            self.scaling_factor_den[sl] = 0;
        }

        self.frame_rate_decimator = [0; TS_MAX_LAYERS];
        let decimators = crate::layers::init_layered_framerate(num_tl);
        self.frame_rate_decimator[..num_tl].copy_from_slice(&decimators[..num_tl]);

        let allocation = crate::layers::LayerAllocation::new(
            num_sl,
            num_tl,
            self.target_bandwidth_kbps,
            &self.scaling_factor_num[..num_sl],
            &self.scaling_factor_den[..num_sl],
        );
        self.target_bitrate_per_layer_kbps = [0; MAX_LAYERS];
        for sl in 0..num_sl {
            for tl in 0..num_tl {
                let idx = sl * num_tl + tl;
                self.target_bitrate_per_layer_kbps[idx] = allocation.bitrate_kbps(sl, tl).unwrap_or(0);
                self.max_quantizer_per_layer[idx] = self.max_quantizer;
                self.min_quantizer_per_layer[idx] = self.min_quantizer;
            }
        }
    }

    /// True when the scaling factors are all unset or form the ladder that
    /// `apply_default_layering` generates for some layer count.
    fn has_default_scaling_ladder(&self) -> bool {
        let set = (0..SS_MAX_LAYERS)
            .take_while(|&sl| self.scaling_factor_num[sl] != 0 && self.scaling_factor_den[sl] != 0)
            .count();
        let rest_unset = (set..SS_MAX_LAYERS).all(|sl| self.scaling_factor_num[sl] == 0 && self.scaling_factor_den[sl] == 0);
        rest_unset && (0..set).all(|sl| self.scaling_factor_num[sl] == 1 && self.scaling_factor_den[sl] == 1 << (set - 1 - sl))
    }

    /// Checks the codec-independent ranges. Codec-specific limits are checked
    /// by the adapters on top of this.
    pub fn validate(&self) -> Result<(), RateControlError> {
        fn invalid(msg: String) -> Result<(), RateControlError> {
            Err(RateControlError::InvalidParameter(msg))
        }

        if self.width == 0 || self.height == 0 {
            return invalid(format!("frame size {}x{} must be positive", self.width, self.height));
        }
        if self.width > MAX_FRAME_DIMENSION || self.height > MAX_FRAME_DIMENSION {
            return invalid(format!("frame size {}x{} exceeds {MAX_FRAME_DIMENSION}", self.width, self.height));
        }
        if self.max_quantizer > MAX_GENERIC_QUANTIZER || self.min_quantizer > self.max_quantizer {
            return invalid(format!("quantizer range {}..={} outside 0..={MAX_GENERIC_QUANTIZER}", self.min_quantizer, self.max_quantizer));
        }
        if self.target_bandwidth_kbps == 0 {
            return invalid("target bandwidth must be positive".into());
        }
        if self.target_bandwidth_kbps > MAX_BITRATE_KBPS {
            return invalid(format!("target bandwidth {} kbps exceeds {MAX_BITRATE_KBPS}", self.target_bandwidth_kbps));
        }
        if self.buffer_initial_size_ms > self.buffer_size_ms {
            return invalid(format!("initial buffer {} ms exceeds buffer size {} ms", self.buffer_initial_size_ms, self.buffer_size_ms));
        }
        if self.buffer_optimal_size_ms > self.buffer_size_ms {
            return invalid(format!("optimal buffer {} ms exceeds buffer size {} ms", self.buffer_optimal_size_ms, self.buffer_size_ms));
        }
        if self.undershoot_pct > 100 || self.overshoot_pct > 100 {
            return invalid(format!("undershoot {}% / overshoot {}% outside 0..=100", self.undershoot_pct, self.overshoot_pct));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return invalid(format!("frame rate {} must be positive", self.frame_rate));
        }
        if !(1..=SS_MAX_LAYERS).contains(&self.spatial_layer_count) {
            return invalid(format!("spatial layer count {} outside 1..={SS_MAX_LAYERS}", self.spatial_layer_count));
        }
        if !(1..=TS_MAX_LAYERS).contains(&self.temporal_layer_count) {
            return invalid(format!("temporal layer count {} outside 1..={TS_MAX_LAYERS}", self.temporal_layer_count));
        }
        for sl in 0..self.spatial_layer_count {
            if self.scaling_factor_den[sl] == 0 || self.scaling_factor_num[sl] == 0 {
                return invalid(format!("spatial layer {sl} has scaling factor {}/{}", self.scaling_factor_num[sl], self.scaling_factor_den[sl]));
            }
        }
        for tl in 0..self.temporal_layer_count {
            if self.frame_rate_decimator[tl] == 0 {
                return invalid(format!("temporal layer {tl} has a zero frame rate decimator"));
            }
        }
        for idx in 0..self.layer_count() {
            let (min_q, max_q) = (self.min_quantizer_per_layer[idx], self.max_quantizer_per_layer[idx]);
            if max_q > MAX_GENERIC_QUANTIZER || min_q > max_q {
                return invalid(format!("layer {idx} quantizer range {min_q}..={max_q} outside 0..={MAX_GENERIC_QUANTIZER}"));
            }
            if self.target_bitrate_per_layer_kbps[idx] as u64 > MAX_BITRATE_KBPS {
                return invalid(format!("layer {idx} target bitrate {} kbps exceeds {MAX_BITRATE_KBPS}", self.target_bitrate_per_layer_kbps[idx]));
            }
        }
        if self.reserved.iter().any(|&r| r != 0) {
            return invalid("reserved fields must be zero".into());
        }
        Ok(())
    }

    /// Checks per-frame layer ids against the configured layer grid.
    pub fn validate_frame(&self, params: &FrameParams) -> Result<(), RateControlError> {
        params.validate_layers(self.spatial_layer_count, self.temporal_layer_count)
    }
}

/// The nine entry points the dynamically loaded AV1 engine must export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Av1Symbol {
    InitConfig,
    CreateController,
    UpdateConfig,
    ComputeQp,
    GetQp,
    GetLoopFilterLevel,
    PostEncodeUpdate,
    GetSegmentationData,
    GetCdefInfo,
}

impl Av1Symbol {
    pub const ALL: [Av1Symbol; 9] = [
        Self::InitConfig,
        Self::CreateController,
        Self::UpdateConfig,
        Self::ComputeQp,
        Self::GetQp,
        Self::GetLoopFilterLevel,
        Self::PostEncodeUpdate,
        Self::GetSegmentationData,
        Self::GetCdefInfo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::InitConfig          => "av1_ratecontrol_rtc_init_ratecontrol_config",
            Self::CreateController    => "av1_ratecontrol_rtc_create",
            Self::UpdateConfig        => "av1_ratecontrol_rtc_update",
            Self::ComputeQp           => "av1_ratecontrol_rtc_compute_qp",
            Self::GetQp               => "av1_ratecontrol_rtc_get_qp",
            Self::GetLoopFilterLevel  => "av1_ratecontrol_rtc_get_loop_filter_level",
            Self::PostEncodeUpdate    => "av1_ratecontrol_rtc_post_encode_update",
            Self::GetSegmentationData => "av1_ratecontrol_rtc_get_segmentation",
            Self::GetCdefInfo         => "av1_ratecontrol_rtc_get_cdef_info",
        }
    }

    /// Load error code. `-1` is the library open failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::CreateController    => -2,
            Self::InitConfig          => -3,
            Self::UpdateConfig        => -4,
            Self::ComputeQp           => -5,
            Self::PostEncodeUpdate    => -6,
            Self::GetQp               => -7,
            Self::GetLoopFilterLevel  => -8,
            Self::GetSegmentationData => -9,
            Self::GetCdefInfo         => -10,
        }
    }
}

/// Lifecycle state of a [`crate::RateController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Initialized,
    FrameInFlight,
    Destroyed,
}

/// Status kinds reported across the rate-control boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    Warning,
    Error,
    Failed,
    InvalidParameter,
    UnsupportedCodec,
    Unimplemented,
    UnsupportedRateControlMode,
    Unknown,
    BackendLibraryUnavailable,
    BackendSymbolMissing,
}

impl Status {
    pub fn code(&self) -> i32 {
        *self as i32
    }
    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }
}

impl<T> From<&Result<T, RateControlError>> for Status {
    fn from(result: &Result<T, RateControlError>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RateControlError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
    #[error("Rate control mode {mode:?} is not supported by the {codec:?} backend")]
    UnsupportedRateControlMode { codec: CodecType, mode: RateControlMode },
    #[error("Not implemented: {0}")]
    Unimplemented(&'static str),
    #[error("Not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("Backend library {path} could not be opened: {reason}")]
    BackendLibraryUnavailable { path: String, reason: String },
    #[error("Backend library is missing symbol {} (code {})", .0.name(), .0.code())]
    BackendSymbolMissing(Av1Symbol),
    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState { operation: &'static str, state: ControllerState },
    #[error("Rate control engine failed: {0}")]
    Failed(String),
    #[error("Unknown rate control error: {0}")]
    Unknown(String),
}

impl RateControlError {
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidParameter(_)                 => Status::InvalidParameter,
            Self::UnsupportedCodec(_)                 => Status::UnsupportedCodec,
            Self::UnsupportedRateControlMode { .. }   => Status::UnsupportedRateControlMode,
            Self::Unimplemented(_)                    => Status::Unimplemented,
            Self::Unsupported(_)                      => Status::Warning,
            Self::BackendLibraryUnavailable { .. }    => Status::BackendLibraryUnavailable,
            Self::BackendSymbolMissing(_)             => Status::BackendSymbolMissing,
            Self::InvalidState { .. }                 => Status::Error,
            Self::Failed(_)                           => Status::Failed,
            Self::Unknown(_)                          => Status::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_defaults_are_valid() {
        let config = RateControllerConfig::rtc_defaults(1280, 720, 2000);
        config.validate().unwrap();
        assert_eq!(config.target_bitrate_per_layer_kbps[0], 2000);
        assert_eq!(config.frame_rate_decimator[0], 1);
        assert_eq!(config.max_quantizer_per_layer[0], 56);
        assert_eq!(config.min_quantizer_per_layer[0], 10);
    }

    #[test]
    fn initial_buffer_larger_than_buffer_is_rejected() {
        let mut config = RateControllerConfig::rtc_defaults(640, 480, 500);
        config.buffer_initial_size_ms = config.buffer_size_ms + 1;
        let err = config.validate().unwrap_err();
        assert_eq!(err.status(), Status::InvalidParameter);
    }

    #[test]
    fn optimal_buffer_larger_than_buffer_is_rejected() {
        let mut config = RateControllerConfig::rtc_defaults(640, 480, 500);
        config.buffer_optimal_size_ms = 5000;
        assert!(matches!(config.validate(), Err(RateControlError::InvalidParameter(_))));
    }

    #[test]
    fn reserved_must_be_zero() {
        let mut config = RateControllerConfig::rtc_defaults(640, 480, 500);
        config.reserved[7] = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_scaling_denominator_is_rejected() {
        let mut config = RateControllerConfig::rtc_defaults(640, 480, 500);
        config.scaling_factor_den[0] = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn frame_layers_must_fit_grid() {
        let mut config = RateControllerConfig::rtc_defaults(640, 480, 500);
        config.temporal_layer_count = 2;
        config.apply_default_layering();
        assert!(config.validate_frame(&FrameParams::inter().with_layers(0, 1)).is_ok());
        assert!(config.validate_frame(&FrameParams::inter().with_layers(0, 2)).is_err());
        assert!(config.validate_frame(&FrameParams::inter().with_layers(1, 0)).is_err());
    }

    #[test]
    fn default_ladder_follows_spatial_layer_count() {
        let mut config = RateControllerConfig::rtc_defaults(1280, 720, 2100);
        config.spatial_layer_count = 3;
        config.apply_default_layering();
        assert_eq!(&config.scaling_factor_den[..3], &[4, 2, 1]);
        assert_eq!(&config.target_bitrate_per_layer_kbps[..3], &[100, 400, 1600]);

        config.spatial_layer_count = 2;
        config.apply_default_layering();
        assert_eq!(config.scaling_factor_den, [2, 1, 0, 0]);
        assert_eq!(config.scaling_factor_num, [1, 1, 0, 0]);
    }

    #[test]
    fn explicit_scaling_factors_are_kept() {
        let mut config = RateControllerConfig::rtc_defaults(1280, 720, 2000);
        config.spatial_layer_count = 2;
        config.scaling_factor_num[..2].copy_from_slice(&[2, 1]);
        config.scaling_factor_den[..2].copy_from_slice(&[3, 1]);
        config.apply_default_layering();
        assert_eq!(&config.scaling_factor_num[..2], &[2, 1]);
        assert_eq!(&config.scaling_factor_den[..2], &[3, 1]);
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let mut config = RateControllerConfig::rtc_defaults(640, 480, 500);
        config.target_bandwidth_kbps = 10_000_000_000_000;
        assert!(matches!(config.validate(), Err(RateControlError::InvalidParameter(_))));

        let mut config = RateControllerConfig::rtc_defaults(70_000, 70_000, 500);
        config.scaling_factor_num[0] = 70_000;
        config.scaling_factor_den[0] = 70_000;
        assert!(matches!(config.validate(), Err(RateControlError::InvalidParameter(_))));

        let mut config = RateControllerConfig::rtc_defaults(640, 480, 500);
        config.temporal_layer_count = 2;
        config.apply_default_layering();
        config.target_bitrate_per_layer_kbps[1] = u32::MAX;
        assert!(matches!(config.validate(), Err(RateControlError::InvalidParameter(_))));
    }

    #[test]
    fn symbol_codes_follow_load_errors() {
        assert_eq!(Av1Symbol::CreateController.code(), -2);
        assert_eq!(Av1Symbol::InitConfig.code(), -3);
        assert_eq!(Av1Symbol::PostEncodeUpdate.code(), -6);
        assert_eq!(Av1Symbol::GetQp.code(), -7);
        assert_eq!(Av1Symbol::GetLoopFilterLevel.code(), -8);
        assert_eq!(Av1Symbol::GetCdefInfo.code(), -10);
    }

    #[test]
    fn symbol_codes_are_distinct() {
        let mut codes: Vec<i32> = Av1Symbol::ALL.iter().map(|s| s.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 9);
        assert!(codes.iter().all(|&c| c < -1));
    }

    #[test]
    fn unsupported_maps_to_warning() {
        assert_eq!(RateControlError::Unsupported("loop filter").status(), Status::Warning);
        assert_eq!(Status::from(&Ok::<(), RateControlError>(())), Status::Success);
        assert_eq!(Status::InvalidParameter.code(), 4);
    }

    #[test]
    fn unknown_codec_ids() {
        assert_eq!(CodecType::from_id(1), CodecType::Vp9);
        assert_eq!(CodecType::from_id(3), CodecType::Unknown);
        assert_eq!(CodecType::from_id(42), CodecType::Unknown);
        assert!(AlgorithmId::Default.is_compatible_with(CodecType::Vp8));
        assert!(!AlgorithmId::DerivedLibvpxVp9.is_compatible_with(CodecType::Av1));
    }
}
