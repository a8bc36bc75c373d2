// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

//! C ABI of libaom's real-time rate control (`av1/ratectrl_rtc.h` C wrapper).

#![allow(non_camel_case_types)]

use std::ffi::{c_int, c_void};

pub const AOM_MAX_SS_LAYERS: usize = 4;
pub const AOM_MAX_TS_LAYERS: usize = 8;
pub const AOM_MAX_LAYERS: usize = AOM_MAX_SS_LAYERS * AOM_MAX_TS_LAYERS;

pub const AOM_KEY_FRAME: c_int = 0;
pub const AOM_INTER_FRAME: c_int = 1;

pub type AomFrameDropDecision = c_int;
pub const AOM_FRAME_DROP_OK: AomFrameDropDecision = 0;
pub const AOM_FRAME_DROP_DROP: AomFrameDropDecision = 1;

/// Opaque `AV1RateControlRTC *`.
pub type AomAv1RateControlRtcHandle = *mut c_void;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AomAv1RateControlRtcConfig {
    pub width: c_int,
    pub height: c_int,
    pub is_screen: bool,
    pub max_quantizer: c_int,
    pub min_quantizer: c_int,
    pub target_bandwidth: i64,
    pub buf_initial_sz: i64,
    pub buf_optimal_sz: i64,
    pub buf_sz: i64,
    pub undershoot_pct: c_int,
    pub overshoot_pct: c_int,
    pub max_intra_bitrate_pct: c_int,
    pub max_inter_bitrate_pct: c_int,
    pub frame_drop_thresh: c_int,
    pub max_consec_drop_ms: c_int,
    pub framerate: f64,
    pub layer_target_bitrate: [c_int; AOM_MAX_LAYERS],
    pub ts_rate_decimator: [c_int; AOM_MAX_TS_LAYERS],
    pub aq_mode: c_int,
    pub ss_number_layers: c_int,
    pub ts_number_layers: c_int,
    pub max_quantizers: [c_int; AOM_MAX_LAYERS],
    pub min_quantizers: [c_int; AOM_MAX_LAYERS],
    pub scaling_factor_num: [c_int; AOM_MAX_SS_LAYERS],
    pub scaling_factor_den: [c_int; AOM_MAX_SS_LAYERS],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AomAv1FrameParamsRtc {
    pub frame_type: c_int,
    pub spatial_layer_id: c_int,
    pub temporal_layer_id: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AomAv1LoopfilterLevel {
    pub filter_level: [c_int; 2],
    pub filter_level_u: c_int,
    pub filter_level_v: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AomAv1CdefInfo {
    pub cdef_strength_y: c_int,
    pub cdef_strength_uv: c_int,
    pub damping: c_int,
}

/// Views into buffers owned by the native controller, valid until its next call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AomAv1SegmentationData {
    pub segmentation_map: *const u8,
    pub segmentation_map_size: usize,
    pub delta_q: *const c_int,
    pub delta_q_size: usize,
}

impl Default for AomAv1SegmentationData {
    fn default() -> Self {
        Self { segmentation_map: std::ptr::null(), segmentation_map_size: 0, delta_q: std::ptr::null(), delta_q_size: 0 }
    }
}

pub type av1_ratecontrol_rtc_init_ratecontrol_config_fn = unsafe extern "C" fn(config: *mut AomAv1RateControlRtcConfig);
pub type av1_ratecontrol_rtc_create_fn = unsafe extern "C" fn(config: *const AomAv1RateControlRtcConfig) -> AomAv1RateControlRtcHandle;
pub type av1_ratecontrol_rtc_update_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle, config: *const AomAv1RateControlRtcConfig) -> bool;
pub type av1_ratecontrol_rtc_compute_qp_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle, params: *const AomAv1FrameParamsRtc) -> AomFrameDropDecision;
pub type av1_ratecontrol_rtc_get_qp_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle) -> c_int;
pub type av1_ratecontrol_rtc_get_loop_filter_level_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle) -> AomAv1LoopfilterLevel;
pub type av1_ratecontrol_rtc_post_encode_update_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle, encoded_frame_size: u64);
pub type av1_ratecontrol_rtc_get_segmentation_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle, data: *mut AomAv1SegmentationData) -> bool;
pub type av1_ratecontrol_rtc_get_cdef_info_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle) -> AomAv1CdefInfo;
pub type av1_ratecontrol_rtc_destroy_fn = unsafe extern "C" fn(controller: AomAv1RateControlRtcHandle);

/// Optional export, controllers are leaked when the library lacks it.
pub const AV1_RATECONTROL_RTC_DESTROY: &str = "av1_ratecontrol_rtc_destroy";
