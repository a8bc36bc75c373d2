// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use crate::backend::{BackendFactory, RateControllerBackend, RateControllerInterface};
use crate::options::ControllerOptions;
use crate::types::*;

/// Codec-agnostic rate controller driving one encode stream.
///
/// Per frame the encoder calls [`compute_qp`](Self::compute_qp), reads the QP
/// and the filter hints, encodes, and reports the real size through
/// [`post_encode_update`](Self::post_encode_update). Calls out of order are
/// rejected with [`RateControlError::InvalidState`].
pub struct RateController {
    inner: RateControllerBackend,
    algorithm: AlgorithmId,
    state: ControllerState,
    config: Option<RateControllerConfig>,
    qp_available: bool,
}

impl RateController {
    pub fn new(codec: CodecType, algorithm: AlgorithmId) -> Self {
        Self::with_options(codec, algorithm, ControllerOptions::default())
    }

    /// Unknown codecs are served by the AV1 backend, see [`codec_type`](Self::codec_type).
    pub fn with_options(codec: CodecType, algorithm: AlgorithmId, options: ControllerOptions) -> Self {
        Self {
            inner: BackendFactory::create(codec, &options),
            algorithm,
            state: ControllerState::Uninitialized,
            config: None,
            qp_available: false,
        }
    }

    /// Numeric entry point taking a codec id and an algorithm id.
    pub fn from_ids(codec_id: u32, algorithm_id: u32, options: ControllerOptions) -> Self {
        Self::with_options(CodecType::from_id(codec_id), AlgorithmId::from_id(algorithm_id), options)
    }

    /// Codec of the backend actually in use.
    pub fn codec_type(&self) -> CodecType { self.inner.codec_type() }
    pub fn algorithm(&self) -> AlgorithmId { self.algorithm }
    pub fn state(&self) -> ControllerState { self.state }
    pub fn config(&self) -> Option<&RateControllerConfig> { self.config.as_ref() }

    fn expect_state(&self, operation: &'static str, allowed: &[ControllerState]) -> Result<(), RateControlError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(RateControlError::InvalidState { operation, state: self.state })
        }
    }

    fn expect_qp(&self, operation: &'static str) -> Result<(), RateControlError> {
        self.expect_state(operation, &[ControllerState::Initialized, ControllerState::FrameInFlight])?;
        if !self.qp_available {
            return Err(RateControlError::InvalidState { operation, state: self.state });
        }
        Ok(())
    }

    /// Validates `config` and starts the engine. A failed init leaves the
    /// controller uninitialized so it can be retried.
    pub fn init(&mut self, config: RateControllerConfig) -> Result<(), RateControlError> {
        self.expect_state("init", &[ControllerState::Uninitialized])?;
        let codec = self.codec_type();
        if !self.algorithm.is_compatible_with(codec) {
            return Err(RateControlError::UnsupportedCodec(format!("algorithm {:?} cannot drive {codec:?}", self.algorithm)));
        }
        self.inner.init(&config)?;

        log::info!("{codec:?} rate controller initialized: {}x{} @ {} kbps", config.width, config.height, config.target_bandwidth_kbps);
        self.config = Some(config);
        self.state = ControllerState::Initialized;
        Ok(())
    }

    /// Replaces the configuration between frames. On error the previous
    /// configuration stays active.
    pub fn update_config(&mut self, config: RateControllerConfig) -> Result<(), RateControlError> {
        self.expect_state("update_config", &[ControllerState::Initialized])?;
        self.inner.update_config(&config)?;
        log::debug!("{:?} rate controller reconfigured: {} kbps", self.codec_type(), config.target_bandwidth_kbps);
        self.config = Some(config);
        Ok(())
    }

    /// Starts a frame. On [`FrameDropDecision::Drop`] the frame must not be
    /// encoded and no size is reported for it.
    pub fn compute_qp(&mut self, params: FrameParams) -> Result<FrameDropDecision, RateControlError> {
        self.expect_state("compute_qp", &[ControllerState::Initialized])?;
        if let Some(config) = &self.config {
            config.validate_frame(&params)?;
        }

        let decision = self.inner.compute_qp(&params)?;
        match decision {
            FrameDropDecision::Ok => {
                self.qp_available = true;
                self.state = ControllerState::FrameInFlight;
            }
            FrameDropDecision::Drop => {
                log::debug!("Frame dropped by rate control (layer {}/{})", params.spatial_layer_id, params.temporal_layer_id);
                self.qp_available = false;
            }
        }
        Ok(decision)
    }

    /// QP of the last computed frame, on the codec's native scale.
    pub fn get_qp(&self) -> Result<i32, RateControlError> {
        self.expect_qp("get_qp")?;
        self.inner.get_qp()
    }

    pub fn get_loop_filter_level(&self) -> Result<LoopFilterLevels, RateControlError> {
        self.expect_qp("get_loop_filter_level")?;
        self.inner.get_loop_filter_level()
    }

    pub fn get_cdef_info(&self) -> Result<CdefInfo, RateControlError> {
        self.expect_qp("get_cdef_info")?;
        self.inner.get_cdef_info()
    }

    pub fn get_segmentation_data(&self) -> Result<SegmentationData, RateControlError> {
        self.expect_qp("get_segmentation_data")?;
        self.inner.get_segmentation_data()
    }

    /// Reports the encoded size in bytes of the frame in flight.
    pub fn post_encode_update(&mut self, encoded_frame_size: u64) -> Result<(), RateControlError> {
        self.expect_state("post_encode_update", &[ControllerState::FrameInFlight])?;
        self.inner.post_encode_update(encoded_frame_size)?;
        self.state = ControllerState::Initialized;
        Ok(())
    }

    /// Frees the backend. Every later call fails with `InvalidState`.
    pub fn release(&mut self) {
        if self.state != ControllerState::Destroyed {
            self.inner.release();
            self.state = ControllerState::Destroyed;
            self.qp_available = false;
        }
    }
}

impl Drop for RateController {
    fn drop(&mut self) {
        self.release();
    }
}
