use std::path::PathBuf;

/// Prefix of the progress lines requested via `--progress-template`
pub const PROGRESS_PREFIX: &str = "downloaded_bytes:";
pub const PATH_PREFIX: &str = "path=";
pub const HEIGHT_PREFIX: &str = "height=";

/// Parses `downloaded_bytes: 42.0%` into `0.42`
pub fn parse_progress_from_line(line: &str) -> Option<f32> {
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        let trimmed = rest.trim();
        if let Some(number) = trimmed.strip_suffix('%') {
            if let Ok(v) = number.trim().parse::<f32>() {
                return Some((v / 100.0).clamp(0.0, 1.0));
            }
        }
    }
    None
}

/// One of the `--print after_move:` lines emitted once the file is final
#[derive(Debug, PartialEq, Eq)]
pub enum PrintedField {
    Path(PathBuf),
    /// `None` when yt-dlp printed `NA`
    Height(Option<u32>),
}

pub fn parse_printed_field(line: &str) -> Option<PrintedField> {
    if let Some(path) = line.strip_prefix(PATH_PREFIX) {
        let path = path.trim();
        return (!path.is_empty() && path != "NA").then(|| PrintedField::Path(PathBuf::from(path)));
    }
    line.strip_prefix(HEIGHT_PREFIX)
        .map(|h| PrintedField::Height(h.trim().parse().ok().filter(|h| *h > 0)))
}

/// First numeric line of `ffprobe -show_entries stream=height -of csv=p=0`
pub fn parse_probe_height(output: &str) -> Option<u32> {
    output
        .lines()
        .map(|l| l.trim().trim_end_matches(','))
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse().ok())
        .filter(|h| *h > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_line() {
        assert_eq!(parse_progress_from_line("downloaded_bytes: 50.0%"), Some(0.5));
        assert_eq!(parse_progress_from_line("downloaded_bytes:100%"), Some(1.0));
        assert_eq!(parse_progress_from_line("downloaded_bytes:N/A"), None);
        assert_eq!(parse_progress_from_line("[download] 50.0%"), None);
    }

    #[test]
    fn printed_fields() {
        assert_eq!(
            parse_printed_field("path=/tmp/out/Clip.mp4"),
            Some(PrintedField::Path(PathBuf::from("/tmp/out/Clip.mp4")))
        );
        assert_eq!(parse_printed_field("height=1080"), Some(PrintedField::Height(Some(1080))));
        assert_eq!(parse_printed_field("height=NA"), Some(PrintedField::Height(None)));
        assert_eq!(parse_printed_field("path=NA"), None);
        assert_eq!(parse_printed_field("[info] something"), None);
    }

    #[test]
    fn probe_height_takes_first_line() {
        assert_eq!(parse_probe_height("720\n1080\n"), Some(720));
        assert_eq!(parse_probe_height("\n  1080 \n"), Some(1080));
        assert_eq!(parse_probe_height("1080,\n"), Some(1080));
        assert_eq!(parse_probe_height(""), None);
        assert_eq!(parse_probe_height("N/A"), None);
    }
}
