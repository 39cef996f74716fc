//! Wormcam: headless timelapse recorder. Captures stills from a V4L2
//! camera at a fixed interval, assembles them into a WebM clip on stop,
//! and optionally publishes the result.

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing::{info, warn};

use wormcam::capture::camera::V4l2Camera;
use wormcam::pipeline::{Assembler, VideoEncoder};
use wormcam::publish::PublishClient;
use wormcam::session::SessionController;
use wormcam::{utils, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("wormcam=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("wormcam starting");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = Config::load(config_path.as_deref())?;

    // Auto-detect capture device if needed
    if config.capture.device.path.is_empty() {
        config.capture.device = utils::auto_detect_device()?;
    }
    info!("using capture device: {:?}", config.capture.device);
    wormcam::CONFIG.store(Arc::new(config.clone()));

    // Acquire the camera and wait for its first decodable frame
    let mut camera = V4l2Camera::new(config.capture.clone())?;
    camera.start_stream()?;
    camera.warm_up()?;

    let assembler = Assembler::new(build_encoder()?, config.assembly.target_fps);
    let mut session = SessionController::new(&config.session, assembler);
    session.attach_camera(camera);

    session.start()?;
    info!(
        interval_secs = config.session.interval_secs,
        "recording; press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;

    let video = session
        .stop()
        .await?
        .ok_or_else(|| eyre!("no recording was in progress"))?;
    info!(
        bytes = video.data.len(),
        duration = ?video.duration,
        "timelapse ready"
    );

    let out = PathBuf::from("timelapse.webm");
    std::fs::write(&out, &video.data)?;
    info!("wrote {}", out.display());

    if let Some(endpoint) = config.publish.endpoint.clone() {
        let client = PublishClient::new(endpoint);
        if let Err(e) = client.publish(&video, &config.publish).await {
            warn!("publish failed: {}", e);
        }
    }

    session.release_camera();
    info!("wormcam shutting down");
    Ok(())
}

#[cfg(feature = "gstreamer-pipeline")]
fn build_encoder() -> Result<Box<dyn VideoEncoder>> {
    Ok(Box::new(wormcam::pipeline::GstEncoder::new()?))
}

#[cfg(not(feature = "gstreamer-pipeline"))]
fn build_encoder() -> Result<Box<dyn VideoEncoder>> {
    Err(eyre!(
        "wormcam was built without the gstreamer-pipeline feature; no encoder available"
    ))
}
