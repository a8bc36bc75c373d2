// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

pub(crate) mod engine;
pub mod vp8;
pub mod vp9;
pub mod av1;

use crate::options::ControllerOptions;
use crate::types::*;

/// Capability set every codec adapter implements.
///
/// Calls arrive already ordered by [`crate::RateController`]; adapters only
/// check what they need to stay memory safe and to honor their codec limits.
#[enum_dispatch::enum_dispatch(RateControllerBackend)]
pub trait RateControllerInterface {
    fn codec_type(&self) -> CodecType;

    fn init(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError>;
    fn update_config(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError>;

    fn compute_qp(&mut self, params: &FrameParams) -> Result<FrameDropDecision, RateControlError>;
    fn get_qp(&self) -> Result<i32, RateControlError>;
    fn get_loop_filter_level(&self) -> Result<LoopFilterLevels, RateControlError>;
    fn post_encode_update(&mut self, encoded_frame_size: u64) -> Result<(), RateControlError>;

    fn get_cdef_info(&self) -> Result<CdefInfo, RateControlError> {
        Err(RateControlError::Unsupported("CDEF info"))
    }
    fn get_segmentation_data(&self) -> Result<SegmentationData, RateControlError> {
        Err(RateControlError::Unsupported("segmentation data"))
    }

    /// Tears down the native engine. Safe to call more than once.
    fn release(&mut self);
}

#[enum_dispatch::enum_dispatch]
pub enum RateControllerBackend {
    Vp8(vp8::Vp8RateController),
    Vp9(vp9::Vp9RateController),
    Av1(av1::Av1RateController),
}

pub struct BackendFactory;

impl BackendFactory {
    /// Builds the adapter for `codec`. No I/O happens here; the AV1 library
    /// is opened lazily by the adapter's `init`.
    ///
    /// `CodecType::Unknown` selects the AV1 adapter.
    pub fn create(codec: CodecType, options: &ControllerOptions) -> RateControllerBackend {
        match codec {
            CodecType::Vp8 => RateControllerBackend::Vp8(vp8::Vp8RateController::new()),
            CodecType::Vp9 => RateControllerBackend::Vp9(vp9::Vp9RateController::new()),
            CodecType::Av1 => RateControllerBackend::Av1(av1::Av1RateController::new(options)),
            CodecType::Unknown => {
                log::warn!("Unknown codec requested, falling back to the AV1 rate controller");
                RateControllerBackend::Av1(av1::Av1RateController::new(options))
            }
        }
    }

    /// Numeric entry point, `id` is a codec id (0 = VP8, 1 = VP9, 2 = AV1).
    pub fn create_from_id(id: u32, options: &ControllerOptions) -> RateControllerBackend {
        Self::create(CodecType::from_id(id), options)
    }
}

/// Codec-specific limits checked on top of [`RateControllerConfig::validate`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct BackendLimits {
    pub codec: CodecType,
    pub max_spatial_layers: usize,
    pub max_temporal_layers: usize,
    pub supports_vbr: bool,
}

impl BackendLimits {
    pub fn validate(&self, config: &RateControllerConfig) -> Result<(), RateControlError> {
        config.validate()?;
        if config.spatial_layer_count > self.max_spatial_layers {
            return Err(RateControlError::InvalidParameter(format!(
                "{:?} supports at most {} spatial layers, got {}", self.codec, self.max_spatial_layers, config.spatial_layer_count
            )));
        }
        if config.temporal_layer_count > self.max_temporal_layers {
            return Err(RateControlError::InvalidParameter(format!(
                "{:?} supports at most {} temporal layers, got {}", self.codec, self.max_temporal_layers, config.temporal_layer_count
            )));
        }
        if config.rate_control_mode == RateControlMode::VariableBitrate && !self.supports_vbr {
            return Err(RateControlError::UnsupportedRateControlMode { codec: self.codec, mode: config.rate_control_mode });
        }
        if config.layer_count() > 1 {
            for sl in 0..config.spatial_layer_count {
                let mut prev = 0;
                for tl in 0..config.temporal_layer_count {
                    let bitrate = config.target_bitrate_per_layer_kbps[config.layer_index(sl, tl)];
                    if bitrate == 0 || bitrate < prev {
                        return Err(RateControlError::InvalidParameter(format!(
                            "layer ({sl}, {tl}) target bitrate {bitrate} kbps must be positive and cumulative"
                        )));
                    }
                    prev = bitrate;
                }
            }
        }
        Ok(())
    }
}

/// Generic (min, max) quantizers of a flattened layer. Layers left at 0..=0
/// inherit the stream-wide bounds.
pub(crate) fn layer_quantizers(config: &RateControllerConfig, idx: usize) -> (u32, u32) {
    let (min_q, max_q) = (config.min_quantizer_per_layer[idx], config.max_quantizer_per_layer[idx]);
    if min_q == 0 && max_q == 0 {
        (config.min_quantizer, config.max_quantizer)
    } else {
        (min_q, max_q)
    }
}

fn not_initialized(operation: &'static str) -> RateControlError {
    RateControlError::InvalidState { operation, state: ControllerState::Uninitialized }
}

fn no_frame(operation: &'static str) -> RateControlError {
    RateControlError::Failed(format!("{operation} called before any QP was computed"))
}
