// Output directory layout
//
// <root>/videos/<MonthName><Year>/<Day>__<HH_MM_SS_AMPM>.<ext>
// <root>/pictures/<MonthName><Year>/<Day>__<HH_MM_SS_AMPM>.jpg

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Videos,
    Pictures,
}

impl MediaCategory {
    pub fn dir_name(&self) -> &'static str {
        match self {
            MediaCategory::Videos => "videos",
            MediaCategory::Pictures => "pictures",
        }
    }
}

/// `March2025/07__09_05_03_PM.avi`
pub fn dated_file_name(at: NaiveDateTime, ext: &str) -> PathBuf {
    let folder = at.format("%B%Y").to_string();
    let file = format!("{}.{}", at.format("%d__%I_%M_%S_%p"), ext);
    PathBuf::from(folder).join(file)
}

/// Local scratch file the encoder writes to before relocation
pub fn staging_path(staging_root: &Path, unix_secs: i64, ext: &str) -> PathBuf {
    staging_root.join(format!("temp_{}.{}", unix_secs, ext))
}

/// Where finished recordings and pictures go
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `videos/` and `pictures/` under the root
    pub fn ensure_tree(&self) -> std::io::Result<()> {
        for category in [MediaCategory::Videos, MediaCategory::Pictures] {
            std::fs::create_dir_all(self.root.join(category.dir_name()))?;
        }
        Ok(())
    }

    pub fn path_at(&self, category: MediaCategory, at: NaiveDateTime, ext: &str) -> PathBuf {
        self.root
            .join(category.dir_name())
            .join(dated_file_name(at, ext))
    }

    /// Path for a recording started now, with its month folder created
    pub fn next_video_path(&self, ext: &str) -> std::io::Result<PathBuf> {
        self.next_path(MediaCategory::Videos, ext)
    }

    /// Path for a picture taken now, with its month folder created
    pub fn next_picture_path(&self) -> std::io::Result<PathBuf> {
        self.next_path(MediaCategory::Pictures, "jpg")
    }

    fn next_path(&self, category: MediaCategory, ext: &str) -> std::io::Result<PathBuf> {
        let path = self.path_at(category, Local::now().naive_local(), ext);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn afternoon_name() {
        let name = dated_file_name(at(2025, 3, 7, 21, 5, 3), "avi");
        assert_eq!(name, PathBuf::from("March2025/07__09_05_03_PM.avi"));
    }

    #[test]
    fn midnight_is_twelve_am() {
        let name = dated_file_name(at(2024, 12, 31, 0, 0, 59), "jpg");
        assert_eq!(name, PathBuf::from("December2024/31__12_00_59_AM.jpg"));
    }

    #[test]
    fn category_paths_and_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        layout.ensure_tree().unwrap();
        assert!(dir.path().join("videos").is_dir());
        assert!(dir.path().join("pictures").is_dir());

        let p = layout.path_at(MediaCategory::Pictures, at(2025, 1, 2, 12, 30, 0), "jpg");
        assert_eq!(p, dir.path().join("pictures/January2025/02__12_30_00_PM.jpg"));

        let v = layout.next_video_path("mkv").unwrap();
        assert!(v.starts_with(dir.path().join("videos")));
        assert!(v.parent().unwrap().is_dir());
        assert_eq!(v.extension().unwrap(), "mkv");
    }

    #[test]
    fn staging_name_uses_unix_seconds() {
        let p = staging_path(Path::new("/tmp/lenscast"), 1_700_000_000, "avi");
        assert_eq!(p, PathBuf::from("/tmp/lenscast/temp_1700000000.avi"));
    }
}
