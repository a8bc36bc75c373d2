// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

pub mod ffi;
pub mod loader;

use std::ffi::c_int;
use std::path::PathBuf;
use std::ptr::NonNull;
use std::sync::Arc;

use self::ffi::*;
use self::loader::{Av1Library, SymbolCache};
use super::{BackendLimits, RateControllerInterface};
use crate::options::ControllerOptions;
use crate::types::*;

const LIMITS: BackendLimits = BackendLimits {
    codec: CodecType::Av1,
    max_spatial_layers: AOM_MAX_SS_LAYERS,
    max_temporal_layers: AOM_MAX_TS_LAYERS,
    supports_vbr: false,
};

/// A controller created by the loaded library.
struct NativeController {
    handle: NonNull<std::ffi::c_void>,
    library: Arc<Av1Library>,
}

// SAFETY: the native controller has no thread affinity. `RateController`
// needs `&mut self` for every call, so it is never used from two threads at once.
unsafe impl Send for NativeController {}

impl Drop for NativeController {
    fn drop(&mut self) {
        if let Some(destroy) = self.library.destroy {
            log::debug!("Destroying native AV1 rate controller {:?}", self.handle);
            // SAFETY: `handle` came from this library's create call and is dropped once.
            unsafe { destroy(self.handle.as_ptr()) };
        }
    }
}

/// AV1 adapter over a dynamically loaded libaom rate controller.
pub struct Av1RateController {
    library_path: PathBuf,
    cache: Arc<SymbolCache>,
    native: Option<NativeController>,
    /// Spatial × temporal layers of the active configuration.
    grid: (usize, usize),
}

impl Av1RateController {
    /// Records where the library lives. Nothing is opened before `init`.
    pub fn new(options: &ControllerOptions) -> Self {
        Self {
            library_path: options.av1_library_path(),
            cache: options.symbol_cache(),
            native: None,
            grid: (0, 0),
        }
    }

    pub fn library_path(&self) -> &std::path::Path {
        &self.library_path
    }

    fn native(&self, operation: &'static str) -> Result<&NativeController, RateControlError> {
        self.native.as_ref().ok_or_else(|| super::not_initialized(operation))
    }
}

fn to_c_int<T: TryInto<c_int> + Copy + std::fmt::Display>(value: T, field: &str) -> Result<c_int, RateControlError> {
    value.try_into().map_err(|_| RateControlError::InvalidParameter(format!("{field} {value} does not fit the AV1 engine")))
}

/// Converts `config` into the native layout. Runs before anything is called
/// in the library, so a field that doesn't fit fails without side effects.
fn translate_config(config: &RateControllerConfig) -> Result<AomAv1RateControlRtcConfig, RateControlError> {
    let mut native = AomAv1RateControlRtcConfig::default();
    native.width = to_c_int(config.width, "width")?;
    native.height = to_c_int(config.height, "height")?;
    native.max_quantizer = config.max_quantizer as c_int;
    native.min_quantizer = config.min_quantizer as c_int;
    native.target_bandwidth = config.target_bandwidth_kbps.min(i64::MAX as u64) as i64;
    native.buf_initial_sz = config.buffer_initial_size_ms.min(i64::MAX as u64) as i64;
    native.buf_optimal_sz = config.buffer_optimal_size_ms.min(i64::MAX as u64) as i64;
    native.buf_sz = config.buffer_size_ms.min(i64::MAX as u64) as i64;
    native.undershoot_pct = config.undershoot_pct as c_int;
    native.overshoot_pct = config.overshoot_pct as c_int;
    native.max_intra_bitrate_pct = match config.max_intra_bitrate_pct {
        0 => to_c_int(crate::layers::max_keyframe_size_pct(config.buffer_optimal_size_ms, config.frame_rate), "max intra bitrate pct")?,
        pct => to_c_int(pct, "max intra bitrate pct")?,
    };
    native.max_inter_bitrate_pct = to_c_int(config.max_inter_bitrate_pct, "max inter bitrate pct")?;
    native.framerate = config.frame_rate;
    native.ss_number_layers = config.spatial_layer_count as c_int;
    native.ts_number_layers = config.temporal_layer_count as c_int;

    for idx in 0..config.layer_count() {
        let (min_q, max_q) = super::layer_quantizers(config, idx);
        native.max_quantizers[idx] = max_q as c_int;
        native.min_quantizers[idx] = min_q as c_int;
        native.layer_target_bitrate[idx] = to_c_int(config.target_bitrate_per_layer_kbps[idx], "layer target bitrate")?;
    }
    if config.layer_count() == 1 {
        native.layer_target_bitrate[0] = to_c_int(config.target_bandwidth_kbps, "target bandwidth")?;
    }
    for tl in 0..config.temporal_layer_count {
        native.ts_rate_decimator[tl] = to_c_int(config.frame_rate_decimator[tl], "frame rate decimator")?;
    }
    for sl in 0..config.spatial_layer_count {
        native.scaling_factor_num[sl] = to_c_int(config.scaling_factor_num[sl], "scaling factor")?;
        native.scaling_factor_den[sl] = to_c_int(config.scaling_factor_den[sl], "scaling factor")?;
    }
    Ok(native)
}

/// Takes the fields the generic config doesn't carry from the library's defaults.
fn with_library_defaults(library: &Av1Library, mut native: AomAv1RateControlRtcConfig) -> AomAv1RateControlRtcConfig {
    let mut defaults = AomAv1RateControlRtcConfig::default();
    // SAFETY: the library only writes defaults into the struct we own.
    unsafe { (library.init_config)(&mut defaults) };
    native.is_screen = defaults.is_screen;
    native.frame_drop_thresh = defaults.frame_drop_thresh;
    native.max_consec_drop_ms = defaults.max_consec_drop_ms;
    native.aq_mode = defaults.aq_mode;
    native
}

impl RateControllerInterface for Av1RateController {
    fn codec_type(&self) -> CodecType { CodecType::Av1 }

    fn init(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError> {
        LIMITS.validate(config)?;
        let translated = translate_config(config)?;
        let library = self.cache.load(&self.library_path)?;
        let native_config = with_library_defaults(&library, translated);

        // SAFETY: `native_config` is fully initialized and outlives the call.
        let handle = unsafe { (library.create)(&native_config) };
        let Some(handle) = NonNull::new(handle) else {
            log::error!("{} returned no controller", Av1Symbol::CreateController.name());
            return Err(RateControlError::Failed("AV1 engine refused to create a controller".into()));
        };
        log::debug!(
            "AV1 rate control: {}x{} @ {} kbps, {}x{} layers via {}",
            config.width, config.height, config.target_bandwidth_kbps, config.spatial_layer_count, config.temporal_layer_count, library.path().display()
        );
        self.native = Some(NativeController { handle, library });
        self.grid = (config.spatial_layer_count, config.temporal_layer_count);
        Ok(())
    }

    fn update_config(&mut self, config: &RateControllerConfig) -> Result<(), RateControlError> {
        LIMITS.validate(config)?;
        let translated = translate_config(config)?;
        let native = self.native("update_config")?;
        let native_config = with_library_defaults(&native.library, translated);

        // SAFETY: `handle` is live until `native` is dropped.
        if unsafe { (native.library.update)(native.handle.as_ptr(), &native_config) } {
            self.grid = (config.spatial_layer_count, config.temporal_layer_count);
            Ok(())
        } else {
            log::error!("{} rejected the new configuration", Av1Symbol::UpdateConfig.name());
            Err(RateControlError::Failed("AV1 engine rejected the configuration".into()))
        }
    }

    fn compute_qp(&mut self, params: &FrameParams) -> Result<FrameDropDecision, RateControlError> {
        let native = self.native("compute_qp")?;
        params.validate_layers(self.grid.0, self.grid.1)?;
        let frame_params = AomAv1FrameParamsRtc {
            frame_type: match params.frame_type {
                FrameType::Key => AOM_KEY_FRAME,
                FrameType::Inter => AOM_INTER_FRAME,
            },
            spatial_layer_id: params.spatial_layer_id as c_int,
            temporal_layer_id: params.temporal_layer_id as c_int,
        };
        // SAFETY: `handle` is live and `frame_params` outlives the call.
        match unsafe { (native.library.compute_qp)(native.handle.as_ptr(), &frame_params) } {
            AOM_FRAME_DROP_OK => Ok(FrameDropDecision::Ok),
            AOM_FRAME_DROP_DROP => Ok(FrameDropDecision::Drop),
            other => Err(RateControlError::Unknown(format!("AV1 engine returned frame drop decision {other}"))),
        }
    }

    fn get_qp(&self) -> Result<i32, RateControlError> {
        let native = self.native("get_qp")?;
        // SAFETY: `handle` is live.
        Ok(unsafe { (native.library.get_qp)(native.handle.as_ptr()) })
    }

    fn get_loop_filter_level(&self) -> Result<LoopFilterLevels, RateControlError> {
        let native = self.native("get_loop_filter_level")?;
        // SAFETY: `handle` is live.
        let lf = unsafe { (native.library.get_loop_filter_level)(native.handle.as_ptr()) };
        Ok(LoopFilterLevels { luma: lf.filter_level, chroma_u: lf.filter_level_u, chroma_v: lf.filter_level_v })
    }

    fn post_encode_update(&mut self, encoded_frame_size: u64) -> Result<(), RateControlError> {
        let native = self.native("post_encode_update")?;
        // SAFETY: `handle` is live.
        unsafe { (native.library.post_encode_update)(native.handle.as_ptr(), encoded_frame_size) };
        Ok(())
    }

    fn get_cdef_info(&self) -> Result<CdefInfo, RateControlError> {
        let native = self.native("get_cdef_info")?;
        // SAFETY: `handle` is live.
        let cdef = unsafe { (native.library.get_cdef_info)(native.handle.as_ptr()) };
        Ok(CdefInfo { strength_y: cdef.cdef_strength_y, strength_uv: cdef.cdef_strength_uv, damping: cdef.damping })
    }

    fn get_segmentation_data(&self) -> Result<SegmentationData, RateControlError> {
        let native = self.native("get_segmentation_data")?;
        let mut data = AomAv1SegmentationData::default();
        // SAFETY: `handle` is live and `data` outlives the call.
        if !unsafe { (native.library.get_segmentation)(native.handle.as_ptr(), &mut data) } {
            return Err(RateControlError::Unsupported("segmentation is disabled in the AV1 engine"));
        }

        // SAFETY: on success the engine points both views at buffers of the
        // reported sizes that stay valid until its next call.
        let segmentation_map = match (data.segmentation_map.is_null(), data.segmentation_map_size) {
            (false, size) if size > 0 => unsafe { std::slice::from_raw_parts(data.segmentation_map, size) }.to_vec(),
            _ => Vec::new(),
        };
        let delta_q = match (data.delta_q.is_null(), data.delta_q_size) {
            (false, size) if size > 0 => unsafe { std::slice::from_raw_parts(data.delta_q, size) }.to_vec(),
            _ => Vec::new(),
        };
        Ok(SegmentationData { segmentation_map, delta_q })
    }

    fn release(&mut self) {
        self.native = None;
        self.grid = (0, 0);
    }
}
