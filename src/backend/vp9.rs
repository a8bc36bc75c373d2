// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use super::engine::{CodecProfile, EngineConfig, RtcEngine};
use super::{BackendLimits, RateControllerInterface};
use crate::types::*;

/// Generic 0..=63 quantizer to VP9 qindex.
static QUANTIZER_TO_QINDEX: [u32; 64] = [
      0,   4,   8,  12,  16,  20,  24,  28,  32,  36,  40,  44,  48,  52,  56,  60,
     64,  68,  72,  76,  80,  84,  88,  92,  96, 100, 104, 108, 112, 116, 120, 124,
    128, 132, 136, 140, 144, 148, 152, 156, 160, 164, 168, 172, 176, 180, 184, 188,
    192, 196, 200, 204, 208, 212, 216, 220, 224, 228, 232, 236, 240, 244, 249, 255,
];

static VP9_PROFILE: CodecProfile = CodecProfile {
    name: "vp9",
    max_qindex: 255,
    q_step_growth: 1.02431,
    key_enumerator: 2_700_000.0,
    inter_enumerator: 1_800_000.0,
    quantizer_to_qindex: &QUANTIZER_TO_QINDEX,
    has_loop_filter: true,
};

const LIMITS: BackendLimits = BackendLimits {
    codec: CodecType::Vp9,
    max_spatial_layers: 3,
    max_temporal_layers: 5,
    supports_vbr: true,
};

#[derive(Debug, Default)]
pub struct Vp9RateController {
    engine: Option<RtcEngine>,
}

impl Vp9RateController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateControllerInterface for Vp9RateController {
    fn codec_type(&self) -> CodecType { CodecType::Vp9 }

    fn init(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError> {
        LIMITS.validate(config)?;
        log::debug!(
            "VP9 rate control: {}x{} @ {} kbps, {}x{} layers, {:?}",
            config.width, config.height, config.target_bandwidth_kbps, config.spatial_layer_count, config.temporal_layer_count, config.rate_control_mode
        );
        self.engine = Some(RtcEngine::new(&VP9_PROFILE, EngineConfig::from_generic(&VP9_PROFILE, config)));
        Ok(())
    }

    fn update_config(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError> {
        LIMITS.validate(config)?;
        let engine = self.engine.as_mut().ok_or_else(|| super::not_initialized("update_config"))?;
        engine.update(EngineConfig::from_generic(&VP9_PROFILE, config));
        Ok(())
    }

    fn compute_qp(&mut self, params: &FrameParams) -> Result<FrameDropDecision, RateControlError> {
        let engine = self.engine.as_mut().ok_or_else(|| super::not_initialized("compute_qp"))?;
        engine.compute_qp(params)?;
        Ok(FrameDropDecision::Ok)
    }

    fn get_qp(&self) -> Result<i32, RateControlError> {
        let engine = self.engine.as_ref().ok_or_else(|| super::not_initialized("get_qp"))?;
        engine.qindex().map(|q| q as i32).ok_or_else(|| super::no_frame("get_qp"))
    }

    fn get_loop_filter_level(&self) -> Result<LoopFilterLevels, RateControlError> {
        let engine = self.engine.as_ref().ok_or_else(|| super::not_initialized("get_loop_filter_level"))?;
        engine.loop_filter_level().map(LoopFilterLevels::uniform).ok_or_else(|| super::no_frame("get_loop_filter_level"))
    }

    fn post_encode_update(&mut self, encoded_frame_size: u64) -> Result<(), RateControlError> {
        let engine = self.engine.as_mut().ok_or_else(|| super::not_initialized("post_encode_update"))?;
        engine.post_encode_update(encoded_frame_size);
        Ok(())
    }

    fn release(&mut self) {
        self.engine = None;
    }
}
