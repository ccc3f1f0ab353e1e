//! Source preprocessing: splice `// include "..."` directives and literal
//! `require()` calls into one composite source before parsing.
//!
//! Scanning is textual, not syntactic. Inclusion sites are found
//! leftmost-first across both forms; the text of a site's line stays in the
//! segment of the file that contains it, the included file's text is spliced
//! in right after the line, and scanning resumes there. Every file is
//! spliced at most once per composition.

use crate::error::{JscopeError, Result};
use crate::source::SourceUnit;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

static INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^// include "([^"\n]+)""#).unwrap());
static REQUIRE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\s*\(\s*["']([^"'\n]+)["']\s*\)"#).unwrap());

/// Compose `file` and everything it includes into one source unit.
pub fn preprocess(file: &Path) -> Result<SourceUnit> {
    let mut unit = SourceUnit::new(file.to_path_buf());
    let mut visited = HashSet::new();
    process(file, &mut unit, &mut visited)?;
    blank_directives(&mut unit.code)?;
    Ok(unit)
}

struct InclusionSite {
    /// Scan position just past the site's line terminator.
    resume: usize,
    target: PathBuf,
}

fn process(file: &Path, unit: &mut SourceUnit, visited: &mut HashSet<PathBuf>) -> Result<()> {
    // the cycle guard works on canonical paths; segments keep the path as
    // referenced so they line up with daemon keys and watch registrations
    let canonical = fs::canonicalize(file).map_err(|source| JscopeError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    if !visited.insert(canonical) {
        return Ok(());
    }
    let text = fs::read_to_string(file).map_err(|source| JscopeError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut last = 0;
    while let Some(site) = next_inclusion(&text, last, &dir) {
        if site.resume > last {
            unit.push_segment(file.to_path_buf(), &text[last..site.resume]);
            last = site.resume;
        }
        process(&site.target, unit, visited)?;
    }
    if last < text.len() {
        unit.push_segment(file.to_path_buf(), &text[last..]);
    }
    Ok(())
}

/// Find the leftmost inclusion site at or after `from`. `require` arguments
/// that are not file paths (bare module specifiers) are skipped.
fn next_inclusion(text: &str, from: usize, dir: &Path) -> Option<InclusionSite> {
    let include = INCLUDE_RE.captures_at(text, from);

    let mut pos = from;
    let require = loop {
        match REQUIRE_RE.captures_at(text, pos) {
            Some(caps) if is_file_specifier(&caps[1]) => break Some(caps),
            Some(caps) => pos = caps.get(0).map(|m| m.end()).unwrap_or(text.len()),
            None => break None,
        }
    };

    let (caps, default_ext) = match (include, require) {
        (Some(inc), Some(req)) => {
            if inc.get(0)?.start() <= req.get(0)?.start() {
                (inc, false)
            } else {
                (req, true)
            }
        }
        (Some(inc), None) => (inc, false),
        (None, Some(req)) => (req, true),
        (None, None) => return None,
    };

    let mut target = dir.join(&caps[1]);
    if default_ext && target.extension().is_none() {
        target.set_extension("js");
    }
    let end = caps.get(0)?.end();
    let resume = text[end..]
        .find('\n')
        .map(|i| end + i + 1)
        .unwrap_or(text.len());
    Some(InclusionSite { resume, target })
}

fn is_file_specifier(arg: &str) -> bool {
    arg.starts_with("./") || arg.starts_with("../") || Path::new(arg).is_absolute()
}

/// Overwrite every include directive in the composite with spaces of equal
/// length, so offsets stay valid but the directive text is inert.
fn blank_directives(code: &mut String) -> Result<()> {
    let ranges: Vec<(usize, usize)> = INCLUDE_RE
        .find_iter(code)
        .map(|m| (m.start(), m.end()))
        .collect();
    if ranges.is_empty() {
        return Ok(());
    }
    let mut bytes = std::mem::take(code).into_bytes();
    for (start, end) in ranges {
        bytes[start..end].fill(b' ');
    }
    *code = String::from_utf8(bytes)
        .map_err(|e| JscopeError::Internal(format!("directive blanking broke encoding: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn plain_file_is_one_segment() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.js", "var a = 1;\n");
        let unit = preprocess(&main).unwrap();
        assert_eq!(unit.code, "var a = 1;\n");
        assert_eq!(unit.segments.len(), 1);
        assert_eq!(unit.main_file, main);
    }

    #[test]
    fn include_directive_splices_and_blanks() {
        let dir = TempDir::new().unwrap();
        write(&dir, "inc.js", "var b = 2;\n");
        let main = write(&dir, "main.js", "// include \"inc.js\"\nvar a = b;\n");
        let unit = preprocess(&main).unwrap();

        // directive line, included text, rest of main
        assert_eq!(unit.segments.len(), 3);
        assert_eq!(unit.segments[0].length, 20);
        assert_eq!(unit.segments[1].length, 11);
        assert!(unit.code.contains("var b = 2;"));
        assert!(!unit.code.contains("include"));
        assert_eq!(unit.code.len(), 20 + 11 + 11);

        let files = unit.all_files();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn resolve_round_trips_through_inclusion() {
        let dir = TempDir::new().unwrap();
        let inc_text = "var b = 2;\n";
        write(&dir, "inc.js", inc_text);
        let main_text = "// include \"inc.js\"\nvar a = b;\n";
        let main = write(&dir, "main.js", main_text);
        let unit = preprocess(&main).unwrap();

        let b_def = unit.code.find("var b").unwrap() + 4;
        let hit = unit.resolve(b_def).unwrap();
        assert!(hit.file.ends_with("inc.js"));
        let original = fs::read_to_string(&hit.file).unwrap();
        assert_eq!(&original[hit.offset..hit.offset + 1], "b");

        let a_def = unit.code.find("var a").unwrap() + 4;
        let hit = unit.resolve(a_def).unwrap();
        assert!(hit.file.ends_with("main.js"));
        assert_eq!(&main_text[hit.offset..hit.offset + 1], "a");
    }

    #[test]
    fn require_call_splices_relative_target() {
        let dir = TempDir::new().unwrap();
        write(&dir, "dep.js", "var d = 4;\n");
        let main = write(&dir, "main.js", "var d = require('./dep');\nuse(d);\n");
        let unit = preprocess(&main).unwrap();
        assert!(unit.code.contains("var d = 4;"));
        // require call is real code and stays
        assert!(unit.code.contains("require('./dep')"));
        assert_eq!(unit.segments.len(), 3);
    }

    #[test]
    fn bare_module_specifiers_are_ignored() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.js", "var fs = require('fs');\n");
        let unit = preprocess(&main).unwrap();
        assert_eq!(unit.segments.len(), 1);
        assert_eq!(unit.code, "var fs = require('fs');\n");
    }

    #[test]
    fn inclusion_cycles_splice_each_file_once() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.js", "// include \"b.js\"\nvar a = 1;\n");
        write(&dir, "b.js", "// include \"a.js\"\nvar b = 2;\n");
        let main = dir.path().join("a.js");
        let unit = preprocess(&main).unwrap();
        assert_eq!(unit.code.matches("var a = 1;").count(), 1);
        assert_eq!(unit.code.matches("var b = 2;").count(), 1);
    }

    #[test]
    fn missing_include_fails_the_composition() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.js", "// include \"ghost.js\"\n");
        let err = preprocess(&main).unwrap_err();
        assert!(matches!(err, JscopeError::Read { .. }));
    }

    #[test]
    fn mid_line_directive_is_not_an_inclusion() {
        let dir = TempDir::new().unwrap();
        let main = write(&dir, "main.js", "var x = 1; // include \"inc.js\"\n");
        let unit = preprocess(&main).unwrap();
        assert_eq!(unit.segments.len(), 1);
        assert!(unit.code.contains("include"));
    }
}
