//! Output file naming: safe base names from metadata, collision avoidance.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::model::{NamingOptions, VideoInfo};

const MAX_TITLE_LEN: usize = 120;

/// Reduces a title to ASCII letters, digits, `_`, `-` and single spaces.
///
/// Characters that are illegal in Windows paths become spaces; everything
/// else outside the allowed set is dropped.
pub fn clean_title(title: &str) -> String {
    let mapped: String = title
        .chars()
        .filter(char::is_ascii)
        .filter_map(|c| match c {
            '#' | '@' => None,
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => Some(' '),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c.is_ascii_whitespace() => {
                Some(c)
            }
            _ => None,
        })
        .collect();

    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_TITLE_LEN).collect();
    let truncated = truncated.trim_end();
    if truncated.is_empty() {
        "video".to_string()
    } else {
        truncated.to_string()
    }
}

/// Title, optionally followed by `_<uploader>` and `_<YYYYmmdd_HHMMSS>`
pub fn base_filename(info: &VideoInfo, naming: NamingOptions) -> String {
    let mut base = clean_title(info.display_title());
    if naming.append_uploader {
        if let Some(uploader) = info.uploader_name() {
            base.push('_');
            base.push_str(&clean_title(uploader));
        }
    }
    if naming.append_timestamp {
        base.push('_');
        base.push_str(&Local::now().format("%Y%m%d_%H%M%S").to_string());
    }
    base
}

/// First of `<base>.<ext>`, `<base>_<id>.<ext>`, `<base>_<n>.<ext>` that
/// does not exist yet
pub fn unique_path(dir: &Path, base: &str, ext: &str, fallback_id: Option<&str>) -> PathBuf {
    let candidate = dir.join(format!("{base}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    if let Some(id) = fallback_id.filter(|id| !id.is_empty()) {
        let candidate = dir.join(format!("{base}_{id}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    (1u32..)
        .map(|i| dir.join(format!("{base}_{i}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or_else(|| dir.join(format!("{base}.{ext}")))
}

/// True when any entry in `dir` is `<stem>.<anything>`, which covers
/// yt-dlp intermediates like `<stem>.f137.mp4` and `<stem>.m4a.part`
fn stem_taken(dir: &Path, stem: &str) -> bool {
    let prefix = format!("{stem}.");
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().starts_with(&prefix))
}

/// Stem for a download whose final extension is not known yet.
///
/// Same order as [`unique_path`], but a candidate is only free when no
/// file with that stem exists under any extension.
pub fn unique_stem(dir: &Path, base: &str, fallback_id: Option<&str>) -> String {
    if !stem_taken(dir, base) {
        return base.to_string();
    }
    if let Some(id) = fallback_id.filter(|id| !id.is_empty()) {
        let candidate = format!("{base}_{id}");
        if !stem_taken(dir, &candidate) {
            return candidate;
        }
    }
    (1u32..)
        .map(|i| format!("{base}_{i}"))
        .find(|s| !stem_taken(dir, s))
        .unwrap_or_else(|| base.to_string())
}

/// yt-dlp `-o` template that keeps the chosen stem and lets yt-dlp pick
/// the extension
pub fn output_template(dir: &Path, stem: &str) -> String {
    dir.join(format!("{stem}.%(ext)s")).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_title_strips_unsafe_characters() {
        assert_eq!(clean_title("My #Video: part 1/2 @home"), "My Video part 1 2 home");
        assert_eq!(clean_title("Café — déjà vu!"), "Caf dj vu");
        assert_eq!(clean_title("   "), "video");
        assert_eq!(clean_title("???"), "video");
        assert_eq!(clean_title("a_b-c"), "a_b-c");
    }

    #[test]
    fn clean_title_truncates() {
        let long = "x".repeat(300);
        assert_eq!(clean_title(&long).len(), MAX_TITLE_LEN);
    }

    #[test]
    fn base_filename_appends_uploader() {
        let info = VideoInfo {
            title: Some("Clip".into()),
            uploader: Some("Some One".into()),
            ..Default::default()
        };
        let naming = NamingOptions {
            append_uploader: true,
            append_timestamp: false,
        };
        assert_eq!(base_filename(&info, naming), "Clip_Some One");
        assert_eq!(base_filename(&info, NamingOptions::default()), "Clip");
    }

    #[test]
    fn base_filename_appends_timestamp() {
        let info = VideoInfo {
            title: Some("Clip".into()),
            ..Default::default()
        };
        let naming = NamingOptions {
            append_uploader: true,
            append_timestamp: true,
        };
        let name = base_filename(&info, naming);
        // no uploader known, so only the stamp is appended
        let stamp = name.strip_prefix("Clip_").unwrap();
        assert_eq!(stamp.len(), "20240101_120000".len());
    }

    #[test]
    fn unique_path_prefers_id_then_counter() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "Clip", "mp4", Some("abc"));
        assert_eq!(first, dir.path().join("Clip.mp4"));

        std::fs::write(&first, b"").unwrap();
        let second = unique_path(dir.path(), "Clip", "mp4", Some("abc"));
        assert_eq!(second, dir.path().join("Clip_abc.mp4"));

        std::fs::write(&second, b"").unwrap();
        let third = unique_path(dir.path(), "Clip", "mp4", Some("abc"));
        assert_eq!(third, dir.path().join("Clip_1.mp4"));

        assert_eq!(
            unique_path(dir.path(), "Clip", "mp4", None),
            dir.path().join("Clip_1.mp4")
        );
    }

    #[test]
    fn unique_stem_ignores_extension() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_stem(dir.path(), "Clip", Some("abc")), "Clip");

        // an mp3 alone blocks the stem, even if the next fetch lands as m4a
        std::fs::write(dir.path().join("Clip.mp3"), b"").unwrap();
        assert_eq!(unique_stem(dir.path(), "Clip", Some("abc")), "Clip_abc");

        std::fs::write(dir.path().join("Clip_abc.m4a.part"), b"").unwrap();
        assert_eq!(unique_stem(dir.path(), "Clip", Some("abc")), "Clip_1");

        // a longer title sharing the prefix does not count
        std::fs::write(dir.path().join("Clip_1 extended.mp4"), b"").unwrap();
        assert_eq!(unique_stem(dir.path(), "Clip", None), "Clip_1");
    }

    #[test]
    fn output_template_uses_stem() {
        let tmpl = output_template(Path::new("/tmp/out"), "Clip_1");
        assert_eq!(tmpl, "/tmp/out/Clip_1.%(ext)s");
    }
}
