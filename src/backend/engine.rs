// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

//! One-pass real-time rate control engine backing the VP8 and VP9 adapters.
//!
//! The model follows the classic libvpx RTC controller: an HRD buffer tracked
//! in bits per layer, a per-frame bit target derived from the buffer level, a
//! bits-per-macroblock estimate for every qindex scaled by a rate correction
//! factor, and a correction factor update from the real size of each frame.

use crate::types::{FrameParams, FrameType, RateControlError, RateControlMode, RateControllerConfig, MAX_LAYERS, SS_MAX_LAYERS, TS_MAX_LAYERS};

/// Fixed point scale of the bits-per-macroblock values.
const BPER_MB_NORMBITS: u32 = 9;
const FRAME_OVERHEAD_BITS: i64 = 200;
const MIN_RATE_CORRECTION: f64 = 0.005;
const MAX_RATE_CORRECTION: f64 = 50.0;
const MIN_KEYFRAME_BOOST: i64 = 32;

/// Codec-specific constants of the native quantizer scale.
#[derive(Debug)]
pub(crate) struct CodecProfile {
    pub name: &'static str,
    pub max_qindex: u32,
    /// Growth of the quantizer step size per qindex.
    pub q_step_growth: f64,
    pub key_enumerator: f64,
    pub inter_enumerator: f64,
    /// Maps the generic 0..=63 quantizer onto the native qindex.
    pub quantizer_to_qindex: &'static [u32; 64],
    pub has_loop_filter: bool,
}

impl CodecProfile {
    pub fn qindex(&self, quantizer: u32) -> u32 {
        self.quantizer_to_qindex[quantizer.min(63) as usize]
    }

    fn q_step(&self, qindex: u32) -> f64 {
        self.q_step_growth.powi(qindex.min(self.max_qindex) as i32)
    }

    /// Expected bits per macroblock at `qindex`, scaled by `BPER_MB_NORMBITS`.
    fn bits_per_mb(&self, frame_type: FrameType, qindex: u32, correction_factor: f64) -> f64 {
        let q = self.q_step(qindex);
        let mut enumerator = match frame_type {
            FrameType::Key => self.key_enumerator,
            FrameType::Inter => self.inter_enumerator,
        };
        enumerator += enumerator * q / 4096.0;
        enumerator * correction_factor / q
    }
}

/// Engine configuration in native units (bps, native qindex, ms).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EngineConfig {
    pub width: u32,
    pub height: u32,
    pub target_bandwidth_bps: i64,
    pub buffer_initial_ms: i64,
    pub buffer_optimal_ms: i64,
    pub buffer_size_ms: i64,
    pub undershoot_pct: i64,
    pub overshoot_pct: i64,
    pub max_intra_bitrate_pct: i64,
    pub max_inter_bitrate_pct: i64,
    pub frame_rate: f64,
    pub spatial_layers: usize,
    pub temporal_layers: usize,
    pub layer_target_bitrate_kbps: [u32; MAX_LAYERS],
    pub layer_best_qindex: [u32; MAX_LAYERS],
    pub layer_worst_qindex: [u32; MAX_LAYERS],
    pub scaling_factor_num: [u32; SS_MAX_LAYERS],
    pub scaling_factor_den: [u32; SS_MAX_LAYERS],
    pub ts_rate_decimator: [u32; TS_MAX_LAYERS],
    pub variable_bitrate: bool,
}

impl EngineConfig {
    /// Converts a generic configuration into `profile`'s native units. A zero
    /// intra bitrate cap is replaced by the cap derived from the optimal buffer.
    pub fn from_generic(profile: &CodecProfile, config: &RateControllerConfig) -> Self {
        let max_intra_bitrate_pct = match config.max_intra_bitrate_pct {
            0 => crate::layers::max_keyframe_size_pct(config.buffer_optimal_size_ms, config.frame_rate),
            pct => pct,
        };

        let mut layer_best_qindex = [0; MAX_LAYERS];
        let mut layer_worst_qindex = [0; MAX_LAYERS];
        for idx in 0..config.layer_count() {
            let (min_q, max_q) = super::layer_quantizers(config, idx);
            layer_best_qindex[idx] = profile.qindex(min_q);
            layer_worst_qindex[idx] = profile.qindex(max_q);
        }

        Self {
            width: config.width,
            height: config.height,
            target_bandwidth_bps: (config.target_bandwidth_kbps.saturating_mul(1000)).min(i64::MAX as u64) as i64,
            buffer_initial_ms: config.buffer_initial_size_ms.min(i64::MAX as u64) as i64,
            buffer_optimal_ms: config.buffer_optimal_size_ms.min(i64::MAX as u64) as i64,
            buffer_size_ms: config.buffer_size_ms.min(i64::MAX as u64) as i64,
            undershoot_pct: config.undershoot_pct as i64,
            overshoot_pct: config.overshoot_pct as i64,
            max_intra_bitrate_pct: max_intra_bitrate_pct as i64,
            max_inter_bitrate_pct: config.max_inter_bitrate_pct as i64,
            frame_rate: config.frame_rate,
            spatial_layers: config.spatial_layer_count,
            temporal_layers: config.temporal_layer_count,
            layer_target_bitrate_kbps: config.target_bitrate_per_layer_kbps,
            layer_best_qindex,
            layer_worst_qindex,
            scaling_factor_num: config.scaling_factor_num,
            scaling_factor_den: config.scaling_factor_den,
            ts_rate_decimator: config.frame_rate_decimator,
            variable_bitrate: config.rate_control_mode == RateControlMode::VariableBitrate,
        }
    }
}

#[derive(Debug, Clone)]
struct LayerContext {
    target_bandwidth: i64,
    frame_rate: f64,
    avg_frame_bandwidth: i64,
    starting_buffer_level: i64,
    optimal_buffer_level: i64,
    maximum_buffer_size: i64,
    buffer_level: i64,
    bits_off_target: i64,
    rate_correction_factor: [f64; 2],
    best_qindex: u32,
    worst_qindex: u32,
    macroblocks: u64,
    frames_since_key: u64,
    frames_encoded: u64,
}

impl LayerContext {
    fn new() -> Self {
        Self {
            target_bandwidth: 0,
            frame_rate: 0.0,
            avg_frame_bandwidth: 0,
            starting_buffer_level: 0,
            optimal_buffer_level: 0,
            maximum_buffer_size: 0,
            buffer_level: 0,
            bits_off_target: 0,
            rate_correction_factor: [1.0, 1.0],
            best_qindex: 0,
            worst_qindex: 0,
            macroblocks: 1,
            frames_since_key: 0,
            frames_encoded: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameContext {
    layer: usize,
    frame_type: FrameType,
    qindex: u32,
}

/// Bits held by a buffer of `ms` milliseconds at `bandwidth` bps.
fn buffer_bits(ms: i64, bandwidth: i64) -> i64 {
    ms.saturating_mul(bandwidth) / 1000
}

fn correction_slot(frame_type: FrameType) -> usize {
    match frame_type {
        FrameType::Key => 0,
        FrameType::Inter => 1,
    }
}

#[derive(Debug)]
pub(crate) struct RtcEngine {
    profile: &'static CodecProfile,
    config: EngineConfig,
    layers: Vec<LayerContext>,
    current: Option<FrameContext>,
}

impl RtcEngine {
    pub fn new(profile: &'static CodecProfile, config: EngineConfig) -> Self {
        let mut engine = Self { profile, config, layers: Vec::new(), current: None };
        engine.configure_layers(true);
        engine
    }

    /// Applies a new configuration while keeping buffer levels and
    /// correction factors of the layers that still exist.
    pub fn update(&mut self, config: EngineConfig) {
        let reset = config.spatial_layers != self.config.spatial_layers || config.temporal_layers != self.config.temporal_layers;
        self.config = config;
        self.configure_layers(reset);
    }

    fn configure_layers(&mut self, reset: bool) {
        let cfg = &self.config;
        let num_layers = cfg.spatial_layers * cfg.temporal_layers;
        if reset || self.layers.len() != num_layers {
            self.layers = vec![LayerContext::new(); num_layers];
        }

        for sl in 0..cfg.spatial_layers {
            let num = cfg.scaling_factor_num[sl].max(1) as u64;
            let den = cfg.scaling_factor_den[sl].max(1) as u64;
            let width = (cfg.width as u64 * num).div_ceil(den);
            let height = (cfg.height as u64 * num).div_ceil(den);
            let macroblocks = width.div_ceil(16).saturating_mul(height.div_ceil(16)).max(1);

            let mut prev: Option<(i64, f64)> = None;
            for tl in 0..cfg.temporal_layers {
                let idx = sl * cfg.temporal_layers + tl;
                let target_bandwidth = if num_layers == 1 {
                    cfg.target_bandwidth_bps
                } else {
                    cfg.layer_target_bitrate_kbps[idx] as i64 * 1000
                };
                let frame_rate = cfg.frame_rate / cfg.ts_rate_decimator[tl].max(1) as f64;
                let avg_frame_bandwidth = match prev {
                    Some((prev_bw, prev_fps)) if frame_rate > prev_fps => ((target_bandwidth - prev_bw) as f64 / (frame_rate - prev_fps)).round() as i64,
                    _ => (target_bandwidth as f64 / frame_rate).round() as i64,
                };
                prev = Some((target_bandwidth, frame_rate));

                let lc = &mut self.layers[idx];
                let fresh = lc.frames_encoded == 0 && lc.target_bandwidth == 0;
                lc.target_bandwidth = target_bandwidth;
                lc.frame_rate = frame_rate;
                lc.avg_frame_bandwidth = avg_frame_bandwidth.max(1);
                lc.starting_buffer_level = buffer_bits(cfg.buffer_initial_ms, target_bandwidth);
                lc.optimal_buffer_level = if cfg.buffer_optimal_ms == 0 { target_bandwidth / 8 } else { buffer_bits(cfg.buffer_optimal_ms, target_bandwidth) };
                lc.maximum_buffer_size = if cfg.buffer_size_ms == 0 { target_bandwidth / 8 } else { buffer_bits(cfg.buffer_size_ms, target_bandwidth) };
                lc.best_qindex = cfg.layer_best_qindex[idx].min(self.profile.max_qindex);
                lc.worst_qindex = cfg.layer_worst_qindex[idx].clamp(lc.best_qindex, self.profile.max_qindex);
                lc.macroblocks = macroblocks;
                if fresh {
                    lc.buffer_level = lc.starting_buffer_level;
                    lc.bits_off_target = lc.starting_buffer_level;
                } else {
                    lc.bits_off_target = lc.bits_off_target.min(lc.maximum_buffer_size);
                    lc.buffer_level = lc.buffer_level.min(lc.maximum_buffer_size);
                }
            }
        }
    }

    fn keyframe_target(&self, lc: &LayerContext) -> i64 {
        let target = if lc.frames_encoded == 0 {
            lc.starting_buffer_level / 2
        } else {
            let frame_rate = lc.frame_rate;
            let mut boost = MIN_KEYFRAME_BOOST.max((2.0 * frame_rate - 16.0) as i64);
            if (lc.frames_since_key as f64) < frame_rate / 2.0 {
                boost = (boost as f64 * lc.frames_since_key as f64 / (frame_rate / 2.0)) as i64;
            }
            16i64.saturating_add(boost).saturating_mul(lc.avg_frame_bandwidth) >> 4
        };
        if self.config.max_intra_bitrate_pct > 0 {
            target.min(lc.avg_frame_bandwidth.saturating_mul(self.config.max_intra_bitrate_pct) / 100)
        } else {
            target
        }
    }

    fn interframe_target(&self, lc: &LayerContext) -> i64 {
        let cfg = &self.config;
        let min_frame_target = (lc.avg_frame_bandwidth >> 4).max(FRAME_OVERHEAD_BITS);
        let mut target = lc.avg_frame_bandwidth;

        if cfg.variable_bitrate {
            // Spread the accumulated surplus/deficit over two seconds.
            let window = (lc.frame_rate * 2.0).max(1.0);
            let correction = ((lc.bits_off_target - lc.starting_buffer_level) as f64 / window) as i64;
            target += correction.clamp(-target / 2, target / 2);
        } else {
            let diff = lc.optimal_buffer_level - lc.buffer_level;
            let one_pct_bits = 1 + lc.optimal_buffer_level / 100;
            if diff > 0 {
                let pct_low = (diff / one_pct_bits).min(cfg.undershoot_pct);
                target -= target * pct_low / 200;
            } else if diff < 0 {
                let pct_high = (-diff / one_pct_bits).min(cfg.overshoot_pct);
                target += target * pct_high / 200;
            }
        }
        if cfg.max_inter_bitrate_pct > 0 {
            target = target.min(lc.avg_frame_bandwidth.saturating_mul(cfg.max_inter_bitrate_pct) / 100);
        }
        target.max(min_frame_target)
    }

    /// Picks the qindex whose estimated size is closest to `target_bits`.
    fn regulate_q(&self, lc: &LayerContext, frame_type: FrameType, target_bits: i64) -> u32 {
        let correction = lc.rate_correction_factor[correction_slot(frame_type)];
        let target_bits_per_mb = ((target_bits.max(0) as f64) * (1u64 << BPER_MB_NORMBITS) as f64) / lc.macroblocks as f64;

        let mut q = lc.best_qindex;
        let mut last_error = f64::MAX;
        for qindex in lc.best_qindex..=lc.worst_qindex {
            let bits_per_mb = self.profile.bits_per_mb(frame_type, qindex, correction);
            q = qindex;
            if bits_per_mb <= target_bits_per_mb {
                if target_bits_per_mb - bits_per_mb > last_error {
                    q = qindex - 1;
                }
                break;
            }
            last_error = bits_per_mb - target_bits_per_mb;
        }
        q
    }

    /// Picks the qindex of the next frame. Layer ids outside the configured
    /// grid are rejected.
    pub fn compute_qp(&mut self, params: &FrameParams) -> Result<u32, RateControlError> {
        params.validate_layers(self.config.spatial_layers, self.config.temporal_layers)?;
        let frame_type = params.frame_type;
        let layer = params.spatial_layer_id * self.config.temporal_layers + params.temporal_layer_id;
        let lc = self.layers.get(layer).ok_or_else(|| RateControlError::InvalidParameter(format!("no state for layer {layer}")))?;
        let target = match frame_type {
            FrameType::Key => self.keyframe_target(lc),
            FrameType::Inter => self.interframe_target(lc),
        };
        let qindex = self.regulate_q(lc, frame_type, target).clamp(lc.best_qindex, lc.worst_qindex);
        log::trace!("{}: layer {layer} {frame_type:?} target {target} bits -> qindex {qindex}", self.profile.name);

        self.current = Some(FrameContext { layer, frame_type, qindex });
        Ok(qindex)
    }

    pub fn qindex(&self) -> Option<u32> {
        self.current.map(|c| c.qindex)
    }

    /// Loop filter strength for the last computed frame, picked from the qindex.
    pub fn loop_filter_level(&self) -> Option<i32> {
        if !self.profile.has_loop_filter {
            return None;
        }
        let frame = self.current?;
        let q = frame.qindex as i64;
        let mut level = (q * 20723 + 1015158 + (1 << 17)) >> 18;
        if frame.frame_type == FrameType::Key {
            level -= 4;
        }
        Some(level.clamp(0, 63) as i32)
    }

    pub fn post_encode_update(&mut self, encoded_frame_size: u64) {
        let Some(frame) = self.current else { return; };
        let actual_bits = (encoded_frame_size.saturating_mul(8)).min(i64::MAX as u64) as i64;

        self.update_rate_correction(frame, actual_bits);

        // The frame is part of every higher temporal layer of its spatial layer.
        let num_tl = self.config.temporal_layers;
        let sl = frame.layer / num_tl;
        let variable = self.config.variable_bitrate;
        for tl in frame.layer % num_tl..num_tl {
            let lc = &mut self.layers[sl * num_tl + tl];
            lc.bits_off_target = lc.bits_off_target.saturating_add(lc.avg_frame_bandwidth - actual_bits);
            if !variable {
                lc.bits_off_target = lc.bits_off_target.min(lc.maximum_buffer_size);
            }
            lc.buffer_level = lc.bits_off_target;
        }

        let lc = &mut self.layers[frame.layer];
        lc.frames_encoded += 1;
        lc.frames_since_key = match frame.frame_type {
            FrameType::Key => 1,
            FrameType::Inter => lc.frames_since_key + 1,
        };
    }

    fn update_rate_correction(&mut self, frame: FrameContext, actual_bits: i64) {
        let profile = self.profile;
        let lc = &mut self.layers[frame.layer];
        let slot = correction_slot(frame.frame_type);
        let factor = lc.rate_correction_factor[slot];

        let projected_bits = profile.bits_per_mb(frame.frame_type, frame.qindex, factor) * lc.macroblocks as f64 / (1u64 << BPER_MB_NORMBITS) as f64;
        if projected_bits <= 0.0 {
            return;
        }
        let mut correction = 100.0 * actual_bits as f64 / projected_bits;
        let adjustment_limit = 0.25 + 0.5 * (0.01 * correction).log10().abs().min(1.0);

        let factor = if correction > 102.0 {
            correction = 100.0 + (correction - 100.0) * adjustment_limit;
            (factor * correction / 100.0).min(MAX_RATE_CORRECTION)
        } else if correction < 99.0 {
            correction = 100.0 - (100.0 - correction) * adjustment_limit;
            (factor * correction / 100.0).max(MIN_RATE_CORRECTION)
        } else {
            factor
        };
        lc.rate_correction_factor[slot] = factor;
    }

    #[cfg(test)]
    fn buffer_level(&self, layer: usize) -> i64 {
        self.layers[layer].buffer_level
    }
}
