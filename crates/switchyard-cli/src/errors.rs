//! Better error messages with actionable suggestions.

use std::path::Path;
use switchyard_core::{Catalog, Engine};

/// Build an error message for when format detection fails.
pub fn format_detection_error(path: &str, catalog: &Catalog) -> String {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let mut msg = String::from("Could not detect source format");

    if let Some(ref ext) = ext {
        let extensions = catalog.iter().map(|f| f.extension.as_str());
        if let Some(suggestion) = find_similar(ext, extensions) {
            msg.push_str(&format!(
                " for '{}'.\n\nDid you mean '.{}'? Use --from <format> to specify.",
                path, suggestion
            ));
            return msg;
        }
        msg.push_str(&format!(" for '{}'. Unknown extension '.{}'", path, ext));
    } else {
        msg.push_str(&format!(" for '{}'. No file extension found", path));
    }

    msg.push_str(".\n\nUse --from <format> to specify. Known formats: ");
    msg.push_str(&catalog.ids().collect::<Vec<_>>().join(", "));
    msg
}

/// Build an error message for an id that is not in the catalog.
pub fn unknown_format_error(id: &str, catalog: &Catalog) -> String {
    let mut msg = format!("Unknown format '{}'", id);
    if let Some(suggestion) = find_similar(&id.to_lowercase(), catalog.ids()) {
        msg.push_str(&format!(". Did you mean '{}'?", suggestion));
    } else if let Some(format) = catalog.by_extension(id) {
        msg.push_str(&format!(
            ". '{}' is the extension of '{}'",
            id, format.internal_id
        ));
    }
    msg.push_str("\n\nKnown formats: ");
    msg.push_str(&catalog.ids().collect::<Vec<_>>().join(", "));
    msg
}

/// Build an error message for when no conversion path is found.
pub fn no_path_error(source_format: &str, target_format: &str, engine: &Engine) -> String {
    let mut msg = format!(
        "No conversion path found from '{}' to '{}'.\n\n",
        source_format, target_format
    );
    let graph = engine.graph();

    // Find what the source can convert to
    let source_targets = graph.reachable_from(source_format);
    if source_targets.is_empty() {
        msg.push_str(&format!(
            "'{}' has no registered conversions.\n",
            source_format
        ));
    } else {
        msg.push_str(&format!(
            "'{}' can convert to: {}\n",
            source_format,
            source_targets.join(", ")
        ));
    }

    // Find what can convert to target
    let target_sources: Vec<&str> = engine
        .formats()
        .map(|f| f.internal_id.as_str())
        .filter(|id| *id != target_format && graph.reachable_from(id).contains(&target_format))
        .collect();
    if !target_sources.is_empty() {
        msg.push_str(&format!(
            "'{}' can be created from: {}",
            target_format,
            target_sources.join(", ")
        ));
    }

    msg.trim_end().to_string()
}

/// Build an error message for file read errors.
pub fn file_read_error(path: &str, err: &std::io::Error) -> String {
    use std::io::ErrorKind;

    let mut msg = format!("Failed to read '{}'", path);

    match err.kind() {
        ErrorKind::NotFound => msg.push_str(": file not found"),
        ErrorKind::PermissionDenied => {
            msg.push_str(": permission denied. Check file permissions.");
        }
        _ => msg.push_str(&format!(": {}", err)),
    }

    msg
}

/// Closest candidate within edit distance 2.
fn find_similar<'a>(input: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .filter(|c| *c != input)
        .map(|c| (levenshtein(input, c), c))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, c)| c)
}

/// Simple Levenshtein distance for short strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
