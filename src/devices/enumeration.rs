// Capture device discovery

use gstreamer as gst;
use gstreamer::prelude::*;

/// Device paths to try when looking for a camera.
///
/// The configured device comes first, then `/dev/video0..count`. The sink device is never
/// offered, otherwise recovery could "find" our own loopback output.
pub fn candidate_devices(preferred: &str, exclude: &str, count: u32) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(count as usize + 1);
    let numbered = (0..count).map(|i| format!("/dev/video{}", i));

    for path in std::iter::once(preferred.to_string()).chain(numbered) {
        if path.is_empty() || path == exclude || out.contains(&path) {
            continue;
        }
        out.push(path);
    }
    out
}

/// V4L2 capture device paths currently known to GStreamer's device monitor.
///
/// Loopback devices also advertise as video sources, so callers still filter out the sink.
pub fn enumerate_capture_paths() -> Vec<String> {
    if let Err(e) = gst::init() {
        log::warn!("[Devices] GStreamer unavailable for enumeration: {}", e);
        return Vec::new();
    }

    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    if let Err(e) = monitor.start() {
        log::debug!("[Devices] Device monitor failed to start: {}", e);
        return Vec::new();
    }

    let mut paths = Vec::new();
    for device in monitor.devices() {
        let Some(props) = device.properties() else {
            continue;
        };
        let path = props
            .get::<String>("api.v4l2.path")
            .or_else(|_| props.get::<String>("device.path"));
        if let Ok(path) = path {
            log::debug!("[Devices] Found {} ({})", path, device.display_name());
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    monitor.stop();

    paths.sort();
    paths
}
