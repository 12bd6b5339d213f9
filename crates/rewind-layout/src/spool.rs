//! Spool directory scanning: picking the one preferred video and source
//! image out of whatever a download job left behind (§4.2 rules 2-3).

use std::path::{Path, PathBuf};

use crate::error::LayoutResult;

/// Index = priority rank, least preferred first. §4.2 rule 2 writes the
/// ordering as `mp4 < webm < mkv < mov < avi`, but §3's data model note is
/// explicit that mp4 is preferred ("mp4 preferred; others migrated to mp4
/// where possible") — so the list is reversed from its literal reading,
/// with mp4 ranked highest.
const VIDEO_EXT_PRIORITY: &[&str] = &["avi", "mov", "mkv", "webm", "mp4"];
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Clone)]
pub struct SpoolEntry {
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SpoolContents {
    pub video: Option<SpoolEntry>,
    pub discarded_videos: Vec<PathBuf>,
    pub image: Option<SpoolEntry>,
    pub discarded_images: Vec<PathBuf>,
    pub info_json: Option<PathBuf>,
    pub vtt_files: Vec<PathBuf>,
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

fn is_preview_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.contains(".preview.") || name == "preview.mp4"
}

fn video_priority(ext: &str) -> Option<usize> {
    VIDEO_EXT_PRIORITY.iter().position(|e| *e == ext)
}

/// Scan `spool_dir` top-level entries and classify them.
pub async fn scan_spool(spool_dir: &Path) -> LayoutResult<SpoolContents> {
    let mut contents = SpoolContents::default();
    let mut video_candidates: Vec<SpoolEntry> = Vec::new();
    let mut image_candidates: Vec<SpoolEntry> = Vec::new();

    let mut entries = tokio::fs::read_dir(spool_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let metadata = entry.metadata().await?;
        let size = metadata.len();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        if name.ends_with(".info.json") {
            contents.info_json = Some(path);
            continue;
        }
        if extension_lower(&path).as_deref() == Some("vtt") {
            contents.vtt_files.push(path);
            continue;
        }

        if let Some(ext) = extension_lower(&path) {
            if video_priority(&ext).is_some() && !is_preview_file(&path) {
                video_candidates.push(SpoolEntry { path, size });
                continue;
            }
            if IMAGE_EXTS.contains(&ext.as_str()) {
                image_candidates.push(SpoolEntry { path, size });
                continue;
            }
        }
    }

    let (video, discarded_videos) = pick_preferred_video(video_candidates);
    contents.video = video;
    contents.discarded_videos = discarded_videos;

    let (image, discarded_images) = pick_largest(image_candidates);
    contents.image = image;
    contents.discarded_images = discarded_images;

    Ok(contents)
}

/// Highest extension priority wins; ties broken by largest size (§4.2 rule 2).
fn pick_preferred_video(candidates: Vec<SpoolEntry>) -> (Option<SpoolEntry>, Vec<PathBuf>) {
    let mut best: Option<SpoolEntry> = None;
    let mut best_priority = None;
    let mut discarded = Vec::new();

    for candidate in candidates {
        let ext = extension_lower(&candidate.path).unwrap_or_default();
        let priority = video_priority(&ext).unwrap_or(0);

        let replace = match (&best, best_priority) {
            (None, _) => true,
            (Some(current), Some(current_priority)) => {
                priority > current_priority
                    || (priority == current_priority && candidate.size > current.size)
            }
            _ => false,
        };

        if replace {
            if let Some(prev) = best.take() {
                discarded.push(prev.path);
            }
            best_priority = Some(priority);
            best = Some(candidate);
        } else {
            discarded.push(candidate.path);
        }
    }

    (best, discarded)
}

fn pick_largest(candidates: Vec<SpoolEntry>) -> (Option<SpoolEntry>, Vec<PathBuf>) {
    let mut best: Option<SpoolEntry> = None;
    let mut discarded = Vec::new();

    for candidate in candidates {
        let replace = best.as_ref().map(|b| candidate.size > b.size).unwrap_or(true);
        if replace {
            if let Some(prev) = best.take() {
                discarded.push(prev.path);
            }
            best = Some(candidate);
        } else {
            discarded.push(candidate.path);
        }
    }

    (best, discarded)
}

/// Caption language tag: the second-to-last dot-component of the filename,
/// or `und` if there isn't one (§4.2 rule 4).
pub fn vtt_language_tag(path: &Path) -> String {
    let stem = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let parts: Vec<&str> = stem.split('.').collect();
    if parts.len() >= 3 {
        parts[parts.len() - 2].to_string()
    } else {
        "und".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_priority_orders_mp4_highest() {
        assert!(video_priority("mp4") > video_priority("webm"));
        assert!(video_priority("webm") > video_priority("mkv"));
        assert!(video_priority("mkv") > video_priority("mov"));
        assert!(video_priority("mov") > video_priority("avi"));
    }

    #[test]
    fn preview_files_are_excluded_from_video_candidacy() {
        assert!(is_preview_file(Path::new("/spool/yt_abc.preview.mp4")));
        assert!(is_preview_file(Path::new("/spool/preview.mp4")));
        assert!(!is_preview_file(Path::new("/spool/yt_abc.mp4")));
    }

    #[test]
    fn pick_preferred_video_prefers_higher_priority_extension() {
        let candidates = vec![
            SpoolEntry { path: PathBuf::from("a.mkv"), size: 1000 },
            SpoolEntry { path: PathBuf::from("b.mp4"), size: 10 },
        ];
        let (best, discarded) = pick_preferred_video(candidates);
        assert_eq!(best.unwrap().path, PathBuf::from("b.mp4"));
        assert_eq!(discarded, vec![PathBuf::from("a.mkv")]);
    }

    #[test]
    fn pick_preferred_video_breaks_ties_by_size() {
        let candidates = vec![
            SpoolEntry { path: PathBuf::from("small.mp4"), size: 10 },
            SpoolEntry { path: PathBuf::from("big.mp4"), size: 100 },
        ];
        let (best, _) = pick_preferred_video(candidates);
        assert_eq!(best.unwrap().path, PathBuf::from("big.mp4"));
    }

    #[test]
    fn vtt_language_tag_reads_second_to_last_component() {
        assert_eq!(vtt_language_tag(Path::new("yt_abc123.en.vtt")), "en");
        assert_eq!(vtt_language_tag(Path::new("captions.vtt")), "und");
    }
}
