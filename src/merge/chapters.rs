//! Chapter titles and the FFMETADATA chapter sidecar

use crate::core::{Chapter, ValidatedFile};

/// How many files at each end of the list may carry a special label
const BOUNDARY_WINDOW: usize = 3;

/// Labels recognised near the start, checked in order
const OPENING_LABELS: &[(&str, &str)] = &[
    ("opening credits", "Opening Credits"),
    ("opening credit", "Opening Credits"),
    ("opening", "Opening Credits"),
    ("prologue", "Prologue"),
    ("introduction", "Introduction"),
    ("intro", "Introduction"),
    ("preface", "Preface"),
    ("foreword", "Foreword"),
];

/// Labels recognised near the end, checked in order
const ENDING_LABELS: &[(&str, &str)] = &[
    ("end credits", "End Credits"),
    ("ending credits", "End Credits"),
    ("credits", "End Credits"),
    ("epilogue", "Epilogue"),
    ("afterword", "Afterword"),
    ("outro", "Outro"),
    ("the end", "The End"),
    ("conclusion", "Conclusion"),
];

const SIDECAR_HEADER: &str = ";FFMETADATA1";

/// Lower-cased name with any leading track number or separators removed
fn normalize_name(stem: &str) -> String {
    let lower = stem.to_lowercase();
    let stripped = lower
        .trim_start_matches(|c: char| c.is_ascii_digit() || c.is_whitespace() || ".-_".contains(c))
        .trim();
    if stripped.is_empty() {
        lower.trim().to_string()
    } else {
        stripped.to_string()
    }
}

/// `name` is `label`, or `label` followed only by punctuation/whitespace
fn matches_label(name: &str, label: &str) -> bool {
    match name.strip_prefix(label) {
        Some(rest) => !rest.chars().any(|c| c.is_alphanumeric()),
        None => false,
    }
}

fn lookup(name: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(label, _)| matches_label(name, label))
        .map(|(_, title)| *title)
}

/// Special title for the file at `index` of `total`, if its name calls for one
pub fn special_title(stem: &str, index: usize, total: usize) -> Option<&'static str> {
    let name = normalize_name(stem);

    if index < BOUNDARY_WINDOW {
        if let Some(title) = lookup(&name, OPENING_LABELS) {
            return Some(title);
        }
    }
    if index + BOUNDARY_WINDOW >= total {
        if let Some(title) = lookup(&name, ENDING_LABELS) {
            return Some(title);
        }
    }
    None
}

/// Title for every file; plain chapters are numbered without gaps
pub fn chapter_titles(stems: &[&str]) -> Vec<String> {
    let total = stems.len();
    let mut next_number = 1;
    stems
        .iter()
        .enumerate()
        .map(|(index, stem)| match special_title(stem, index, total) {
            Some(title) => title.to_string(),
            None => {
                let title = format!("Chapter {}", next_number);
                next_number += 1;
                title
            }
        })
        .collect()
}

/// Chapters laid end to end over the files' durations
pub fn build_chapters(files: &[ValidatedFile]) -> Vec<Chapter> {
    let stems: Vec<&str> = files.iter().map(|f| f.inferred_title.as_str()).collect();
    let titles = chapter_titles(&stems);

    let mut start = 0.0_f64;
    files
        .iter()
        .zip(titles)
        .map(|(file, title)| {
            let end = start + file.duration * 1000.0;
            let chapter = Chapter {
                start_ms: start.round() as u64,
                end_ms: end.round() as u64,
                title,
            };
            start = end;
            chapter
        })
        .collect()
}

/// Make a title safe for an FFMETADATA value
pub fn escape_title(title: &str) -> String {
    let mut collapsed = String::with_capacity(title.len());
    let mut in_break = false;
    for c in title.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                collapsed.push(' ');
            }
            in_break = true;
        } else {
            collapsed.push(c);
            in_break = false;
        }
    }

    let collapsed = collapsed.trim();
    if collapsed.is_empty() {
        return "Untitled".to_string();
    }

    let mut escaped = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        if matches!(c, '=' | ';' | '#' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Render chapters as an FFMETADATA document
pub fn encode_chapter_sidecar(chapters: &[Chapter]) -> String {
    let mut out = String::from(SIDECAR_HEADER);
    out.push('\n');
    for chapter in chapters {
        out.push_str("[CHAPTER]\n");
        out.push_str("TIMEBASE=1/1000\n");
        out.push_str(&format!("START={}\n", chapter.start_ms));
        out.push_str(&format!("END={}\n", chapter.end_ms));
        out.push_str(&format!("title={}\n\n", escape_title(&chapter.title)));
    }
    out
}

/// Read chapters back out of an FFMETADATA document
///
/// Only chapter blocks with a millisecond timebase are understood; global
/// keys and other sections are ignored.
#[cfg(test)]
pub fn parse_chapter_sidecar(text: &str) -> Result<Vec<Chapter>, String> {
    let mut lines = text.lines();
    if lines.next().map(str::trim) != Some(SIDECAR_HEADER) {
        return Err("Missing FFMETADATA header".to_string());
    }

    let mut chapters = Vec::new();
    let mut current: Option<Chapter> = None;

    for line in lines {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            if let Some(chapter) = current.take() {
                chapters.push(chapter);
            }
            if line == "[CHAPTER]" {
                current = Some(Chapter {
                    start_ms: 0,
                    end_ms: 0,
                    title: String::new(),
                });
            }
            continue;
        }

        let Some(chapter) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = line.split_once('=') else {
            return Err(format!("Malformed line: {}", line));
        };
        match key {
            "TIMEBASE" if value != "1/1000" => {
                return Err(format!("Unsupported timebase: {}", value));
            }
            "START" => {
                chapter.start_ms = value
                    .parse()
                    .map_err(|_| format!("Bad START value: {}", value))?;
            }
            "END" => {
                chapter.end_ms = value
                    .parse()
                    .map_err(|_| format!("Bad END value: {}", value))?;
            }
            "title" => chapter.title = unescape_value(value),
            _ => {}
        }
    }

    if let Some(chapter) = current {
        chapters.push(chapter);
    }
    Ok(chapters)
}
