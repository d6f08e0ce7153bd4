use std::fs;
use std::path::{Path, PathBuf};

enum CoverPattern {
    Stem(&'static str),
    Extension(&'static str),
}

impl CoverPattern {
    /// `Stem` behaves like the glob `<stem>.*`, so `cover.front.png` is a `cover.*` match.
    fn matches(&self, file_name: &str) -> bool {
        match self {
            CoverPattern::Stem(wanted) => file_name
                .strip_prefix(wanted)
                .map_or(false, |rest| rest.starts_with('.')),
            CoverPattern::Extension(wanted) => file_name
                .rsplit_once('.')
                .map_or(false, |(_, extension)| extension == *wanted),
        }
    }
}

const COVER_PATTERNS: [CoverPattern; 4] = [
    CoverPattern::Stem("cover"),
    CoverPattern::Stem("folder"),
    CoverPattern::Extension("jpg"),
    CoverPattern::Extension("png"),
];

/// Picks the album art for a directory: `cover.*`, then `folder.*`, then any `*.jpg`, then
/// any `*.png`. Names are matched case-sensitively; ties within a pattern go to the
/// lexicographically smallest name.
pub fn resolve_cover_art(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with("._"))
        .collect();
    names.sort();

    COVER_PATTERNS.iter().find_map(|pattern| {
        names
            .iter()
            .find(|name| pattern.matches(name))
            .map(|name| dir.join(name))
    })
}
