// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

//! In-process stand-in for the AV1 rate control library.
//!
//! The exports are plain `extern "C"` functions served through a
//! [`LibraryOpener`], so the whole dynamic loading path runs without a real
//! libaom build. The fake engine keeps a simple leaky-bucket buffer and
//! derives its QP from the buffer fullness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::{c_int, c_void};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mebo_rc::backend::av1::ffi::*;
use mebo_rc::*;

pub const FAKE_LIBRARY_PATH: &str = "/fake/libaom.so";

pub static DESTROYED: AtomicUsize = AtomicUsize::new(0);

pub const SEGMENTATION_MAP: [u8; 6] = [0, 1, 2, 3, 1, 0];
pub const DELTA_Q: [c_int; 8] = [0, -8, 4, 12, 0, 0, 0, 0];

struct FakeController {
    config: AomAv1RateControlRtcConfig,
    buffer_bits: i64,
    qp: c_int,
    frame_type: c_int,
    segmentation_map: Vec<u8>,
    delta_q: Vec<c_int>,
}

impl FakeController {
    fn avg_frame_bits(&self) -> i64 {
        (self.config.target_bandwidth as f64 * 1000.0 / self.config.framerate) as i64
    }
    fn bits_per_ms(&self) -> i64 {
        self.config.target_bandwidth
    }
}

unsafe fn controller<'a>(handle: AomAv1RateControlRtcHandle) -> &'a mut FakeController {
    unsafe { &mut *(handle as *mut FakeController) }
}

unsafe extern "C" fn init_config(config: *mut AomAv1RateControlRtcConfig) {
    let config = unsafe { &mut *config };
    *config = AomAv1RateControlRtcConfig::default();
    config.max_quantizer = 63;
    config.undershoot_pct = 50;
    config.overshoot_pct = 50;
    config.framerate = 30.0;
    config.ss_number_layers = 1;
    config.ts_number_layers = 1;
}

unsafe extern "C" fn create(config: *const AomAv1RateControlRtcConfig) -> AomAv1RateControlRtcHandle {
    let config = unsafe { *config };
    let controller = FakeController {
        config,
        buffer_bits: config.buf_initial_sz * config.target_bandwidth,
        qp: 0,
        frame_type: AOM_KEY_FRAME,
        segmentation_map: SEGMENTATION_MAP.to_vec(),
        delta_q: DELTA_Q.to_vec(),
    };
    Box::into_raw(Box::new(controller)) as AomAv1RateControlRtcHandle
}

unsafe extern "C" fn update(handle: AomAv1RateControlRtcHandle, config: *const AomAv1RateControlRtcConfig) -> bool {
    let rc = unsafe { controller(handle) };
    rc.config = unsafe { *config };
    true
}

unsafe extern "C" fn compute_qp(handle: AomAv1RateControlRtcHandle, params: *const AomAv1FrameParamsRtc) -> AomFrameDropDecision {
    let rc = unsafe { controller(handle) };
    let params = unsafe { *params };

    if params.frame_type != AOM_KEY_FRAME && rc.buffer_bits < -(rc.config.buf_sz * rc.bits_per_ms()) {
        // a skipped frame refills the buffer
        rc.buffer_bits += rc.avg_frame_bits();
        return AOM_FRAME_DROP_DROP;
    }

    let optimal = (rc.config.buf_optimal_sz * rc.bits_per_ms()).max(1) as f64;
    let fullness = rc.buffer_bits as f64 / optimal;
    let mut qindex = 128.0 - 64.0 * (fullness - 1.0);
    if params.frame_type == AOM_KEY_FRAME {
        qindex -= 20.0;
    }
    let best = rc.config.min_quantizer * 4;
    let worst = (rc.config.max_quantizer * 4 + 3).min(255);
    rc.qp = (qindex.round() as c_int).clamp(best, worst);
    rc.frame_type = params.frame_type;
    AOM_FRAME_DROP_OK
}

unsafe extern "C" fn get_qp(handle: AomAv1RateControlRtcHandle) -> c_int {
    unsafe { controller(handle) }.qp
}

unsafe extern "C" fn get_loop_filter_level(handle: AomAv1RateControlRtcHandle) -> AomAv1LoopfilterLevel {
    let qp = unsafe { controller(handle) }.qp;
    AomAv1LoopfilterLevel { filter_level: [qp / 8, qp / 8], filter_level_u: qp / 10, filter_level_v: qp / 10 }
}

unsafe extern "C" fn post_encode_update(handle: AomAv1RateControlRtcHandle, encoded_frame_size: u64) {
    let rc = unsafe { controller(handle) };
    rc.buffer_bits += rc.avg_frame_bits() - encoded_frame_size as i64 * 8;
    rc.buffer_bits = rc.buffer_bits.min(rc.config.buf_sz * rc.bits_per_ms());
}

unsafe extern "C" fn get_segmentation(handle: AomAv1RateControlRtcHandle, data: *mut AomAv1SegmentationData) -> bool {
    let rc = unsafe { controller(handle) };
    let data = unsafe { &mut *data };
    data.segmentation_map = rc.segmentation_map.as_ptr();
    data.segmentation_map_size = rc.segmentation_map.len();
    data.delta_q = rc.delta_q.as_ptr();
    data.delta_q_size = rc.delta_q.len();
    true
}

unsafe extern "C" fn get_cdef_info(handle: AomAv1RateControlRtcHandle) -> AomAv1CdefInfo {
    let qp = unsafe { controller(handle) }.qp;
    AomAv1CdefInfo { cdef_strength_y: qp / 16, cdef_strength_uv: qp / 32, damping: 3 + qp / 64 }
}

unsafe extern "C" fn destroy(handle: AomAv1RateControlRtcHandle) {
    drop(unsafe { Box::from_raw(handle as *mut FakeController) });
    DESTROYED.fetch_add(1, Ordering::SeqCst);
}

fn exports() -> Vec<(&'static str, usize)> {
    vec![
        (Av1Symbol::InitConfig.name(), init_config as usize),
        (Av1Symbol::CreateController.name(), create as usize),
        (Av1Symbol::UpdateConfig.name(), update as usize),
        (Av1Symbol::ComputeQp.name(), compute_qp as usize),
        (Av1Symbol::GetQp.name(), get_qp as usize),
        (Av1Symbol::GetLoopFilterLevel.name(), get_loop_filter_level as usize),
        (Av1Symbol::PostEncodeUpdate.name(), post_encode_update as usize),
        (Av1Symbol::GetSegmentationData.name(), get_segmentation as usize),
        (Av1Symbol::GetCdefInfo.name(), get_cdef_info as usize),
        (AV1_RATECONTROL_RTC_DESTROY, destroy as usize),
    ]
}

struct FakeLibrary(HashMap<&'static str, usize>);

impl LoadedLibrary for FakeLibrary {
    fn symbol(&self, name: &str) -> Option<*mut c_void> {
        self.0.get(name).map(|&address| address as *mut c_void)
    }
}

/// Serves the fake exports for [`FAKE_LIBRARY_PATH`] and fails every other path.
#[derive(Default)]
pub struct FakeOpener {
    pub missing: Option<Av1Symbol>,
    pub opens: Arc<AtomicUsize>,
}

impl LibraryOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, String> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if path != Path::new(FAKE_LIBRARY_PATH) {
            return Err(format!("{}: cannot open shared object file", path.display()));
        }
        let table = exports().into_iter().filter(|(name, _)| self.missing.map(|s| s.name()) != Some(*name)).collect();
        Ok(Box::new(FakeLibrary(table)))
    }
}

/// Options resolving the AV1 library through a private cache over [`FakeOpener`].
pub fn fake_av1_options(missing: Option<Av1Symbol>) -> (ControllerOptions, Arc<SymbolCache>, Arc<AtomicUsize>) {
    let opens = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(SymbolCache::new(Box::new(FakeOpener { missing, opens: opens.clone() })));
    let options = ControllerOptions::default()
        .with_library_path(FAKE_LIBRARY_PATH)
        .with_symbol_cache(cache.clone());
    (options, cache, opens)
}

pub fn fake_av1_controller() -> RateController {
    let (options, _, _) = fake_av1_options(None);
    RateController::with_options(CodecType::Av1, AlgorithmId::Default, options)
}
