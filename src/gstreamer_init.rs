//! GStreamer initialization
//!
//! Both device backends call `init_gstreamer_env` before building pipelines; the first
//! call initializes the library and reports which plugins the appliance depends on.

use std::sync::Once;

static GSTREAMER_INIT: Once = Once::new();

/// Plugins the capture and virtual-camera pipelines are built from
const REQUIRED_PLUGINS: &[(&str, &str)] = &[
    ("video4linux2", "v4l2src / v4l2sink"),
    ("videoconvertscale", "videoconvert / videoscale"),
    ("videorate", "videorate"),
    ("app", "appsrc / appsink"),
    ("coreelements", "capsfilter"),
];

/// Initialize GStreamer once per process
pub fn init_gstreamer_env() {
    GSTREAMER_INIT.call_once(|| match gstreamer::init() {
        Ok(_) => {
            log::info!("GStreamer initialized successfully");
            log_gstreamer_version();
            check_plugins();
        }
        Err(e) => {
            log::error!("Failed to initialize GStreamer: {}", e);
            log::error!("Camera capture and the virtual camera will not be available");
        }
    });
}

fn log_gstreamer_version() {
    let (major, minor, micro, nano) = gstreamer::version();
    let nano_str = match nano {
        0 => String::new(),
        1 => " (CVS)".to_string(),
        2 => " (prerelease)".to_string(),
        _ => format!(" (nano: {})", nano),
    };
    log::info!("GStreamer version: {}.{}.{}{}", major, minor, micro, nano_str);
}

fn check_plugins() {
    let registry = gstreamer::Registry::get();
    for (plugin_name, provides) in REQUIRED_PLUGINS {
        match registry.find_plugin(plugin_name) {
            Some(plugin) => log::debug!("  {} v{} - OK ({})", plugin_name, plugin.version(), provides),
            None => log::warn!("  {} - MISSING ({})", plugin_name, provides),
        }
    }
}

/// Check if GStreamer is available and properly configured
pub fn is_gstreamer_available() -> bool {
    gstreamer::init().is_ok()
}
