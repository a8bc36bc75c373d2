// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use mebo_rc::*;
use std::io::Write;

/// Rough encoder stand-in: frame size shrinks as the QP grows.
fn simulated_frame_size(qp: i32, max_qp: i32, frame_type: FrameType, complexity: f64) -> u64 {
    let scale = 2f64.powf(-8.0 * qp as f64 / max_qp.max(1) as f64);
    let base = match frame_type {
        FrameType::Key => 400_000.0,
        FrameType::Inter => 60_000.0,
    };
    (base * scale * complexity).max(64.0) as u64
}

fn main() {
    let _time = std::time::Instant::now();

    let _ = simple_log::new(simple_log::LogConfig::default());

    let mut args = std::env::args().skip(1);
    let codec = match args.next().as_deref() {
        Some("vp8") => CodecType::Vp8,
        Some("av1") => CodecType::Av1,
        _ => CodecType::Vp9,
    };
    let mut options = ControllerOptions::default();
    if let Some(path) = args.next() {
        options = options.with_library_path(path);
    }
    let max_qp = if codec == CodecType::Vp8 { 127 } else { 255 };
    let frames = 120;

    let mut config = RateControllerConfig::rtc_defaults(1280, 720, 1500);
    config.frame_rate = 30.0;
    config.temporal_layer_count = if codec == CodecType::Vp8 { 1 } else { 3 };
    config.apply_default_layering();

    let mut rc = RateController::with_options(codec, AlgorithmId::Default, options);
    if let Err(e) = rc.init(config.clone()) {
        log::error!("Failed to initialize {codec:?} rate control: {e} ({:?})", e.status());
        std::process::exit(1);
    }

    let mut total_bytes = 0u64;
    for frame in 0..frames {
        let temporal_layer = match (config.temporal_layer_count, frame % 4) {
            (1, _) => 0,
            (_, 0) => 0,
            (_, 2) => 1,
            _ => 2,
        };
        let frame_type = if frame == 0 { FrameType::Key } else { FrameType::Inter };
        let params = FrameParams { frame_type, spatial_layer_id: 0, temporal_layer_id: temporal_layer };

        match rc.compute_qp(params) {
            Ok(FrameDropDecision::Drop) => {
                println!("frame {frame:3}: dropped");
                continue;
            }
            Ok(FrameDropDecision::Ok) => {}
            Err(e) => {
                log::error!("compute_qp failed: {e}");
                break;
            }
        }
        let qp = rc.get_qp().unwrap_or_default();
        let complexity = 1.0 + 0.5 * ((frame as f64) / 15.0).sin();
        let size = simulated_frame_size(qp, max_qp, frame_type, complexity);
        total_bytes += size;

        let filter = rc.get_loop_filter_level().map(|lf| lf.luma[0]).ok();
        println!("frame {frame:3}: tl {temporal_layer} qp {qp:3} filter {filter:?} size {size:6} B");

        if let Err(e) = rc.post_encode_update(size) {
            log::error!("post_encode_update failed: {e}");
            break;
        }
    }
    rc.release();

    let seconds = frames as f64 / config.frame_rate;
    println!("Average bitrate: {:.1} kbps (target {} kbps)", total_bytes as f64 * 8.0 / seconds / 1000.0, config.target_bandwidth_kbps);
    println!("Done in {:.3}s ", _time.elapsed().as_millis() as f64 / 1000.0);
    let _ = std::io::stdout().flush();
}
