// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

//! Bitrate and frame-rate split across spatial/temporal layers.

use crate::types::{SS_MAX_LAYERS, TS_MAX_LAYERS};

/// Lowest keyframe clamp, three frames worth of the average frame budget.
const MIN_INTRA_SIZE_PCT: u32 = 300;

/// Cumulative share of the spatial layer's bitrate carried up to and
/// including each temporal layer, for 1..=4 temporal layers.
const CUMULATIVE_TEMPORAL_SHARE: [&[f64]; 4] = [
    &[1.0],
    &[0.6, 1.0],
    &[0.4, 0.6, 1.0],
    &[0.25, 0.4, 0.6, 1.0],
];

/// Default dyadic decimator ladder: the top layer runs at the full rate and
/// every layer below it at half the rate of the one above (`..., 4, 2, 1`).
pub fn init_layered_framerate(num_temporal_layers: usize) -> [u32; TS_MAX_LAYERS] {
    let num_tl = num_temporal_layers.clamp(1, TS_MAX_LAYERS);
    let mut decimators = [0u32; TS_MAX_LAYERS];
    for (tl, decimator) in decimators.iter_mut().enumerate().take(num_tl) {
        *decimator = 1 << (num_tl - 1 - tl);
    }
    decimators
}

/// Effective frame rate of each temporal layer.
pub fn layered_frame_rates(base_frame_rate: f64, decimators: &[u32]) -> Vec<f64> {
    decimators.iter().map(|&d| base_frame_rate / d.max(1) as f64).collect()
}

fn cumulative_temporal_share(num_tl: usize, tl: usize) -> f64 {
    if num_tl <= CUMULATIVE_TEMPORAL_SHARE.len() {
        CUMULATIVE_TEMPORAL_SHARE[num_tl - 1][tl]
    } else {
        0.6f64.powi((num_tl - 1 - tl) as i32)
    }
}

/// Keyframe size clamp as a percentage of the per-frame average, derived from
/// how many frames the optimal buffer level holds. Never below 300%.
pub fn max_keyframe_size_pct(optimal_buffer_size_ms: u64, max_frame_rate: f64) -> u32 {
    let target_size_per_frame = optimal_buffer_size_ms as f64 * 0.5;
    let target_size_kbyte = (target_size_per_frame * max_frame_rate / 1000.0) as u32;
    MIN_INTRA_SIZE_PCT.max(target_size_kbyte.saturating_mul(100))
}

/// Per-layer target bitrates (kbps) for a spatial × temporal grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerAllocation {
    num_spatial: usize,
    num_temporal: usize,
    bitrates: [[u32; TS_MAX_LAYERS]; SS_MAX_LAYERS],
}

impl LayerAllocation {
    /// Splits `total_kbps` over spatial layers in proportion to their pixel
    /// count (the square of the scaling factor), then cumulatively over the
    /// temporal layers of each spatial layer. The top temporal layer of every
    /// spatial layer carries that spatial layer's whole share, and the spatial
    /// shares sum to `total_kbps` exactly.
    pub fn new(num_spatial: usize, num_temporal: usize, total_kbps: u64, scaling_num: &[u32], scaling_den: &[u32]) -> Self {
        let num_sl = num_spatial.clamp(1, SS_MAX_LAYERS);
        let num_tl = num_temporal.clamp(1, TS_MAX_LAYERS);
        let total = total_kbps.min(u32::MAX as u64) as u32;

        let area = |sl: usize| -> f64 {
            let num = scaling_num.get(sl).copied().unwrap_or(1).max(1) as f64;
            let den = scaling_den.get(sl).copied().unwrap_or(1).max(1) as f64;
            (num / den) * (num / den)
        };
        let total_area: f64 = (0..num_sl).map(area).sum();

        let mut bitrates = [[0u32; TS_MAX_LAYERS]; SS_MAX_LAYERS];
        let mut assigned = 0u32;
        for sl in 0..num_sl {
            let spatial_kbps = if sl == num_sl - 1 {
                total - assigned
            } else {
                ((total as f64 * area(sl) / total_area + 1e-9).floor() as u32).min(total - assigned)
            };
            assigned += spatial_kbps;

            for tl in 0..num_tl {
                bitrates[sl][tl] = if tl == num_tl - 1 {
                    spatial_kbps
                } else {
                    (spatial_kbps as f64 * cumulative_temporal_share(num_tl, tl)).round() as u32
                };
            }
        }

        Self { num_spatial: num_sl, num_temporal: num_tl, bitrates }
    }

    pub fn num_spatial(&self) -> usize { self.num_spatial }
    pub fn num_temporal(&self) -> usize { self.num_temporal }

    /// Cumulative target of (`spatial_layer`, `temporal_layer`), `None` outside the grid.
    pub fn bitrate_kbps(&self, spatial_layer: usize, temporal_layer: usize) -> Option<u32> {
        if spatial_layer >= self.num_spatial || temporal_layer >= self.num_temporal {
            return None;
        }
        Some(self.bitrates[spatial_layer][temporal_layer])
    }

    /// Bitrate of a whole spatial layer (its top temporal layer).
    pub fn spatial_bitrate_kbps(&self, spatial_layer: usize) -> Option<u32> {
        self.bitrate_kbps(spatial_layer, self.num_temporal - 1)
    }
}
