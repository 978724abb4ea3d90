// Recording output formats and the external encoder process
//
// Encoding happens out of process: the encoder reads the virtual camera device and
// writes the container file. This module only knows how to launch and stop it.

pub mod encoder;

pub use encoder::{EncoderLauncher, EncoderProcess, FfmpegLauncher};

use serde::{Deserialize, Serialize};

/// Supported container formats for recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// AVI (.avi) - what the appliance has always written
    #[default]
    Avi,
    /// Matroska (.mkv) - survives an interrupted encoder better
    Mkv,
    /// MP4 (.mp4)
    Mp4,
}

impl ContainerFormat {
    /// Get the file extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Avi => "avi",
            ContainerFormat::Mkv => "mkv",
            ContainerFormat::Mp4 => "mp4",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_round_trip_through_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            container: ContainerFormat,
        }
        let w: Wrapper = toml::from_str("container = \"mkv\"").unwrap();
        assert_eq!(w.container, ContainerFormat::Mkv);
        assert_eq!(w.container.extension(), "mkv");
        assert_eq!(ContainerFormat::default().extension(), "avi");
    }
}
