//! Photo selection from the uploads directory
//!
//! Precedence: the pinned photo, then shuffle (when on and the playlist
//! names at least one existing upload), then the most recent upload.

use crate::config::Config;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File extensions treated as photos (compared case-insensitively)
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Which rule picked the photo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSource {
    Pinned,
    Shuffle,
    Latest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub path: PathBuf,
    pub source: PhotoSource,
}

/// Choose the photo for this refresh, or `None` when there is nothing to show
pub fn select_photo<R: Rng + ?Sized>(config: &Config, uploads: &Path, rng: &mut R) -> Option<Selection> {
    if let Some(name) = config.pinned_photo() {
        match resolve_upload(uploads, name) {
            Some(path) => {
                return Some(Selection {
                    path,
                    source: PhotoSource::Pinned,
                })
            }
            None => tracing::warn!("Pinned photo {:?} not found, falling back", name),
        }
    }

    if config.shuffle_mode {
        let candidates: Vec<PathBuf> = config
            .shuffle_playlist
            .iter()
            .filter_map(|name| resolve_upload(uploads, name))
            .collect();

        if let Some(path) = candidates.choose(rng) {
            return Some(Selection {
                path: path.clone(),
                source: PhotoSource::Shuffle,
            });
        }
        tracing::debug!("Shuffle on but no playlist entry exists, falling back");
    }

    latest_photo(uploads).map(|path| Selection {
        path,
        source: PhotoSource::Latest,
    })
}

/// Resolve an upload name to an existing file. Names that are not a bare
/// file name (separators, `..`) are rejected.
fn resolve_upload(uploads: &Path, name: &str) -> Option<PathBuf> {
    let bare = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    if !bare || name == ".." {
        tracing::warn!("Ignoring photo name outside uploads: {:?}", name);
        return None;
    }

    let path = uploads.join(name);
    path.is_file().then_some(path)
}

/// Photo extension and not a dot-file (editor swaps, `._` resource forks)
fn is_photo(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'));
    if hidden {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PHOTO_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// All photo files in the uploads directory
pub fn list_photos(uploads: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(uploads) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot read uploads dir {}: {}", uploads.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_photo(path))
        .collect()
}

/// Most recently modified photo; ties go to the greater file name
fn latest_photo(uploads: &Path) -> Option<PathBuf> {
    list_photos(uploads)
        .into_iter()
        .map(|path| {
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .max()
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::fs::File;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_latest_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "old.jpg", 300);
        let newest = touch(dir.path(), "new.PNG", 10);
        touch(dir.path(), "notes.txt", 0);
        touch(dir.path(), "._new.jpg", 0);

        let selection = select_photo(&Config::default(), dir.path(), &mut rng()).unwrap();
        assert_eq!(selection.path, newest);
        assert_eq!(selection.source, PhotoSource::Latest);
    }

    #[test]
    fn test_empty_dir_selects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(select_photo(&Config::default(), dir.path(), &mut rng()), None);
        assert_eq!(
            select_photo(&Config::default(), &dir.path().join("missing"), &mut rng()),
            None
        );
    }

    #[test]
    fn test_pinned_wins_over_latest() {
        let dir = tempfile::tempdir().unwrap();
        let pinned = touch(dir.path(), "pinned.jpg", 500);
        touch(dir.path(), "new.jpg", 1);

        let config = Config {
            selected_photo: Some("pinned.jpg".to_string()),
            ..Config::default()
        };
        let selection = select_photo(&config, dir.path(), &mut rng()).unwrap();
        assert_eq!(selection.path, pinned);
        assert_eq!(selection.source, PhotoSource::Pinned);
    }

    #[test]
    fn test_missing_or_escaping_pin_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let latest = touch(dir.path(), "new.jpg", 1);

        for name in ["gone.jpg", "../new.jpg", "sub/new.jpg", ".."] {
            let config = Config {
                selected_photo: Some(name.to_string()),
                ..Config::default()
            };
            let selection = select_photo(&config, dir.path(), &mut rng()).unwrap();
            assert_eq!(selection.path, latest, "pin {:?}", name);
            assert_eq!(selection.source, PhotoSource::Latest);
        }
    }

    #[test]
    fn test_pin_overrides_shuffle() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.jpg", 30);
        let pinned = touch(dir.path(), "pinned.jpg", 300);

        let config = Config {
            shuffle_mode: true,
            shuffle_playlist: vec!["a.jpg".into()],
            selected_photo: Some("pinned.jpg".into()),
            ..Config::default()
        };

        let mut rng = rng();
        for _ in 0..10 {
            let selection = select_photo(&config, dir.path(), &mut rng).unwrap();
            assert_eq!(selection.path, pinned);
            assert_eq!(selection.source, PhotoSource::Pinned);
        }
    }

    #[test]
    fn test_shuffle_picks_from_existing_playlist_entries() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.jpg", 30);
        let b = touch(dir.path(), "b.jpg", 20);
        touch(dir.path(), "c.jpg", 10);

        let config = Config {
            shuffle_mode: true,
            shuffle_playlist: vec!["a.jpg".into(), "b.jpg".into(), "deleted.jpg".into()],
            ..Config::default()
        };

        let mut rng = rng();
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let selection = select_photo(&config, dir.path(), &mut rng).unwrap();
            assert_eq!(selection.source, PhotoSource::Shuffle);
            seen.insert(selection.path);
        }
        assert_eq!(seen, HashSet::from([a, b]));
    }

    #[test]
    fn test_missing_pin_falls_back_to_shuffle() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.jpg", 300);
        touch(dir.path(), "new.jpg", 1);

        let config = Config {
            shuffle_mode: true,
            shuffle_playlist: vec!["a.jpg".into()],
            selected_photo: Some("gone.jpg".into()),
            ..Config::default()
        };
        let selection = select_photo(&config, dir.path(), &mut rng()).unwrap();
        assert_eq!(selection.path, a);
        assert_eq!(selection.source, PhotoSource::Shuffle);
    }

    #[test]
    fn test_stale_playlist_without_pin_uses_latest() {
        let dir = tempfile::tempdir().unwrap();
        let latest = touch(dir.path(), "new.jpg", 1);

        let config = Config {
            shuffle_mode: true,
            shuffle_playlist: vec!["deleted.jpg".into()],
            ..Config::default()
        };
        let selection = select_photo(&config, dir.path(), &mut rng()).unwrap();
        assert_eq!(selection.path, latest);
        assert_eq!(selection.source, PhotoSource::Latest);
    }
}
