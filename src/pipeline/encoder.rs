//! GStreamer-backed WebM/VP8 encoder.

use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info};

use crate::error::EncoderError;
use crate::pipeline::assemble::VideoEncoder;

/// Live encode pipeline: canvas snapshots in, a muxed WebM blob out.
pub struct GstEncoder {
    live: Option<EncodePipeline>,
}

struct EncodePipeline {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    width: u32,
    height: u32,
    frame_duration: gst::ClockTime,
    pushed: u64,
}

impl GstEncoder {
    pub fn new() -> Result<Self, EncoderError> {
        gst::init()
            .map_err(|e| EncoderError::Init(format!("failed to initialize GStreamer: {}", e)))?;
        Ok(Self { live: None })
    }
}

impl VideoEncoder for GstEncoder {
    fn begin(&mut self, width: u32, height: u32, fps: u32) -> Result<(), EncoderError> {
        // Raw RGB canvas snapshots in, VP8-in-WebM out
        let pipeline_str = format!(
            "appsrc name=src caps=video/x-raw,format=RGB,width={},height={},framerate={}/1 ! \
             videoconvert ! \
             vp8enc deadline=1 ! \
             webmmux ! \
             appsink name=sink",
            width, height, fps
        );
        info!("encode pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| EncoderError::Init(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| EncoderError::Init("failed to create pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| EncoderError::Init("failed to find appsrc element".into()))?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| EncoderError::Init("failed to cast to AppSrc".into()))?;

        // Paced by the replay loop, not by a live clock
        appsrc.set_property("is-live", false);
        appsrc.set_property("block", true);
        appsrc.set_property("format", gst::Format::Time);

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| EncoderError::Init("failed to find appsink element".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| EncoderError::Init("failed to cast to AppSink".into()))?;

        appsink.set_property("emit-signals", false);
        appsink.set_property("max-buffers", 0u32); // unbounded; drained on finish
        appsink.set_property("sync", false);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncoderError::Init(format!("failed to start pipeline: {:?}", e)))?;

        self.live = Some(EncodePipeline {
            pipeline,
            appsrc,
            appsink,
            width,
            height,
            frame_duration: gst::ClockTime::from_nseconds(1_000_000_000 / u64::from(fps.max(1))),
            pushed: 0,
        });
        Ok(())
    }

    fn push(&mut self, rgb: &[u8]) -> Result<(), EncoderError> {
        let live = self
            .live
            .as_mut()
            .ok_or_else(|| EncoderError::Push("encoder not started".into()))?;

        let expected = (live.width * live.height * 3) as usize;
        if rgb.len() != expected {
            return Err(EncoderError::Push(format!(
                "expected {} bytes, got {}",
                expected,
                rgb.len()
            )));
        }

        let mut buffer = gst::Buffer::with_size(expected)
            .map_err(|_| EncoderError::Push("failed to allocate buffer".into()))?;
        {
            let buffer_ref = buffer.make_mut();
            buffer_ref
                .copy_from_slice(0, rgb)
                .map_err(|_| EncoderError::Push("failed to copy data to buffer".into()))?;
            buffer_ref.set_pts(live.frame_duration * live.pushed);
            buffer_ref.set_duration(live.frame_duration);
        }

        live.appsrc
            .push_buffer(buffer)
            .map_err(|e| EncoderError::Push(format!("appsrc rejected buffer: {:?}", e)))?;
        live.pushed += 1;
        debug!(frame = live.pushed, "pushed canvas snapshot");
        Ok(())
    }

    fn finish(&mut self) -> Result<Bytes, EncoderError> {
        let live = self
            .live
            .take()
            .ok_or_else(|| EncoderError::Finalize("encoder not started".into()))?;

        live.appsrc
            .end_of_stream()
            .map_err(|e| EncoderError::Finalize(format!("end of stream rejected: {:?}", e)))?;

        // Drain the muxed stream until EOS
        let mut out = Vec::new();
        while let Ok(sample) = live.appsink.pull_sample() {
            let buffer = sample
                .buffer()
                .ok_or_else(|| EncoderError::Finalize("sample contains no buffer".into()))?;
            let map = buffer
                .map_readable()
                .map_err(|_| EncoderError::Finalize("failed to map buffer".into()))?;
            out.extend_from_slice(map.as_slice());
        }

        // Surface any error the pipeline posted before treating the
        // drain end as EOS
        if let Some(bus) = live.pipeline.bus() {
            while let Some(msg) = bus.pop() {
                if let gst::MessageView::Error(err) = msg.view() {
                    let _ = live.pipeline.set_state(gst::State::Null);
                    return Err(EncoderError::Finalize(format!(
                        "{} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
            }
        }

        let _ = live.pipeline.set_state(gst::State::Null);

        if out.is_empty() {
            return Err(EncoderError::Finalize("encoder produced no output".into()));
        }
        info!(bytes = out.len(), frames = live.pushed, "encode finished");
        Ok(Bytes::from(out))
    }

    fn abort(&mut self) {
        if let Some(live) = self.live.take() {
            let _ = live.pipeline.set_state(gst::State::Null);
            debug!("encode pipeline discarded");
        }
    }

    fn mime_type(&self) -> &'static str {
        "video/webm"
    }
}

impl Drop for GstEncoder {
    fn drop(&mut self) {
        self.abort();
    }
}
