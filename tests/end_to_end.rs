use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;

use vibration_kernel::{
    AggregationStage, CloseReason, CpuBackend, FileSource, Frame, ImageDirSink, OutputSink,
    PipelineConfig, PipelineController, StageConfig,
};

#[derive(Clone, Default)]
struct ShapeSink {
    shapes: Rc<RefCell<Vec<(u32, u32, u8)>>>,
}

impl OutputSink for ShapeSink {
    fn emit(&mut self, _label: &str, frame: &Frame) -> Result<()> {
        self.shapes.borrow_mut().push(frame.shape());
        Ok(())
    }
}

fn unpaced(subsample: bool) -> PipelineConfig {
    PipelineConfig {
        subsample,
        pacing: Duration::ZERO,
    }
}

#[test]
fn synthetic_stream_produces_one_vibration_map_per_full_window() {
    let sink = ShapeSink::default();
    let stage = AggregationStage::new(CpuBackend::new(), StageConfig::default()).unwrap();
    let ctl = PipelineController::<FileSource, _, _>::open(
        "stub://e2e?frames=19&width=640&height=360&channels=1",
        stage,
        sink.clone(),
        unpaced(false),
    )
    .unwrap();

    let summary = ctl.run();
    assert!(matches!(summary.close_reason, CloseReason::StreamEnd));
    assert_eq!(summary.stats.frames_read, 19);
    assert_eq!(summary.stats.frames_processed, 19);
    assert_eq!(summary.stats.aggregations, 10);
    assert_eq!(summary.stats.recovered_errors, 0);
    assert_eq!(summary.source.frames_captured, 19);

    let shapes = sink.shapes.borrow();
    assert_eq!(shapes.len(), 10);
    assert!(shapes.iter().all(|&shape| shape == (640, 360, 4)));
}

#[test]
fn first_aggregation_fires_on_the_tenth_frame() {
    let mut stage = AggregationStage::new(CpuBackend::new(), StageConfig::default()).unwrap();
    let mut source = <FileSource as vibration_kernel::FrameSource>::open(
        "stub://e2e?frames=19&width=640&height=360&channels=1",
    )
    .unwrap();

    let mut fired_at = Vec::new();
    let mut frame_number = 0;
    while let Some(frame) = vibration_kernel::FrameSource::read(&mut source).unwrap() {
        frame_number += 1;
        if let Some(out) = stage.process(&frame).unwrap() {
            assert_eq!(out.difference.shape(), (640, 360, 1));
            assert_eq!(out.vibration.shape(), (640, 360, 4));
            assert_eq!(out.sequence, fired_at.len() as u64 + 1);
            fired_at.push(frame_number);
        }
        assert!(stage.window().len() <= 10);
    }

    assert_eq!(frame_number, 19);
    assert_eq!(fired_at, (10..=19).collect::<Vec<_>>());
    assert_eq!(stage.aggregations(), 10);
}

#[test]
fn stage_outputs_have_expected_shapes_for_color_input() {
    let mut stage = AggregationStage::new(
        CpuBackend::new(),
        StageConfig {
            capacity: 3,
            ..StageConfig::default()
        },
    )
    .unwrap();
    let mut source = <FileSource as vibration_kernel::FrameSource>::open(
        "stub://shapes?frames=3&width=64&height=48&channels=3",
    )
    .unwrap();

    let mut last = None;
    while let Some(frame) = vibration_kernel::FrameSource::read(&mut source).unwrap() {
        last = stage.process(&frame).unwrap();
    }
    let out = last.expect("third frame fills the window");
    assert_eq!(out.difference.shape(), (64, 48, 1));
    assert_eq!(out.vibration.shape(), (64, 48, 4));
    assert_eq!(out.sequence, 1);
    assert!(out.difference_level >= 0.0 && out.difference_level <= 255.0);
}

#[test]
fn subsampled_run_writes_pngs_for_each_aggregation() {
    let dir = tempfile::tempdir().unwrap();
    let sink = ImageDirSink::new(dir.path()).unwrap();
    let stage = AggregationStage::new(
        CpuBackend::new(),
        StageConfig {
            capacity: 2,
            ..StageConfig::default()
        },
    )
    .unwrap();
    let summary = PipelineController::<FileSource, _, _>::open(
        "stub://pngs?frames=8&width=32&height=24&channels=3",
        stage,
        sink,
        unpaced(true),
    )
    .unwrap()
    .run();

    // Indices 0, 2, 4, 6 are processed; the window fills on the second.
    assert_eq!(summary.stats.frames_processed, 4);
    assert_eq!(summary.stats.aggregations, 3);
    for seq in 0..3 {
        let path = dir.path().join(format!("vibration_{seq:06}.png"));
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (32, 24));
    }
    assert!(!dir.path().join("vibration_000003.png").exists());
}

#[test]
fn image_directory_drives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..4u32 {
        let img = image::RgbImage::from_fn(16, 16, |x, _| {
            if x == 4 + i {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        img.save(dir.path().join(format!("frame_{i}.png"))).unwrap();
    }

    let sink = ShapeSink::default();
    let stage = AggregationStage::new(
        CpuBackend::new(),
        StageConfig {
            capacity: 2,
            ..StageConfig::default()
        },
    )
    .unwrap();
    let summary = PipelineController::<FileSource, _, _>::open(
        dir.path().to_str().unwrap(),
        stage,
        sink.clone(),
        unpaced(false),
    )
    .unwrap()
    .run();

    assert!(summary.into_result().is_ok());
    assert_eq!(sink.shapes.borrow().len(), 3);
}

#[test]
fn remote_urls_are_refused() {
    let stage = AggregationStage::new(CpuBackend::new(), StageConfig::default()).unwrap();
    let result = PipelineController::<FileSource, _, _>::open(
        "rtsp://camera/stream",
        stage,
        ShapeSink::default(),
        unpaced(true),
    );
    assert!(result.is_err());
}
