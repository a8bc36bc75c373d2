// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use super::engine::{CodecProfile, EngineConfig, RtcEngine};
use super::{BackendLimits, RateControllerInterface};
use crate::types::*;

/// Generic 0..=63 quantizer to VP8 qindex.
static Q_TRANS: [u32; 64] = [
     0,  1,  2,  3,  4,  5,  7,  8,  9, 10, 12, 13, 15, 17, 18, 19,
    20, 21, 23, 24, 25, 26, 27, 28, 29, 30, 31, 33, 35, 37, 39, 41,
    43, 45, 47, 49, 51, 53, 55, 57, 59, 61, 64, 67, 70, 73, 76, 79,
    82, 85, 88, 91, 94, 97,100,103,106,109,112,115,118,121,124,127,
];

static VP8_PROFILE: CodecProfile = CodecProfile {
    name: "vp8",
    max_qindex: 127,
    q_step_growth: 1.03414,
    key_enumerator: 2_700_000.0,
    inter_enumerator: 1_800_000.0,
    quantizer_to_qindex: &Q_TRANS,
    has_loop_filter: false,
};

const LIMITS: BackendLimits = BackendLimits {
    codec: CodecType::Vp8,
    max_spatial_layers: 1,
    max_temporal_layers: 5,
    supports_vbr: false,
};

#[derive(Debug, Default)]
pub struct Vp8RateController {
    engine: Option<RtcEngine>,
}

impl Vp8RateController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateControllerInterface for Vp8RateController {
    fn codec_type(&self) -> CodecType { CodecType::Vp8 }

    fn init(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError> {
        LIMITS.validate(config)?;
        log::debug!("VP8 rate control: {}x{} @ {} kbps, {} temporal layers", config.width, config.height, config.target_bandwidth_kbps, config.temporal_layer_count);
        self.engine = Some(RtcEngine::new(&VP8_PROFILE, EngineConfig::from_generic(&VP8_PROFILE, config)));
        Ok(())
    }

    fn update_config(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError> {
        LIMITS.validate(config)?;
        let engine = self.engine.as_mut().ok_or_else(|| super::not_initialized("update_config"))?;
        engine.update(EngineConfig::from_generic(&VP8_PROFILE, config));
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
        Err(RateControlError::Unsupported("VP8 loop filter level"))
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
