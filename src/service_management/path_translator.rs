use regex::{Captures, Regex};
use std::path::Path;

const DRIVE_PREFIX: &str = r"^([A-Za-z]):[\\/]";

/// Converts host paths into the form the container runtime mounts.
///
/// On Windows the engine runs inside a Linux subsystem that exposes host drives
/// under `/mnt/<letter>`.
#[derive(Debug, Clone)]
pub struct PathTranslator {
    /// Drive prefix matcher; `None` leaves paths untouched.
    drive: Option<Regex>,
}

impl PathTranslator {
    pub fn new(windows: bool) -> Result<Self, regex::Error> {
        let drive = if windows {
            Some(Regex::new(DRIVE_PREFIX)?)
        } else {
            None
        };
        Ok(Self { drive })
    }

    pub fn for_host() -> Result<Self, regex::Error> {
        Self::new(cfg!(windows))
    }

    pub fn translate(&self, local: &str) -> String {
        let Some(drive) = &self.drive else {
            return local.to_string();
        };
        drive
            .replace(local, |caps: &Captures| {
                format!("/mnt/{}/", caps[1].to_lowercase())
            })
            .replace('\\', "/")
    }

    pub fn translate_path(&self, local: &Path) -> String {
        self.translate(&local.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_drive_paths_move_under_mnt() {
        let translator = PathTranslator::new(true).unwrap();
        assert_eq!(
            translator.translate("C:\\Users\\me\\f.txt"),
            "/mnt/c/Users/me/f.txt"
        );
        assert_eq!(translator.translate("d:\\data"), "/mnt/d/data");
    }

    #[test]
    fn forward_slash_drive_paths_are_translated() {
        let translator = PathTranslator::new(true).unwrap();
        assert_eq!(translator.translate("C:/a"), "/mnt/c/a");
        assert_eq!(translator.translate("E:/data\\init"), "/mnt/e/data/init");
    }

    #[test]
    fn windows_relative_paths_only_flip_separators() {
        let translator = PathTranslator::new(true).unwrap();
        assert_eq!(translator.translate("storage\\init"), "storage/init");
    }

    #[test]
    fn other_hosts_are_identity() {
        let translator = PathTranslator::new(false).unwrap();
        assert_eq!(
            translator.translate("C:\\Users\\me\\f.txt"),
            "C:\\Users\\me\\f.txt"
        );
        assert_eq!(translator.translate("/tmp/x"), "/tmp/x");
    }
}
