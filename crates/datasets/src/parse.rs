use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DataError, Result};
use crate::example::RawExample;
use crate::tree::{Tree, TreeError};

/// One example per tree line, or one per subtree when `subtrees` is set.
pub fn parse_line_tree(line: &str, subtrees: bool) -> std::result::Result<Vec<RawExample>, TreeError> {
    let tree = Tree::parse(line)?;
    let to_raw = |t: &Tree| RawExample::new(t.leaves().join(" "), t.label.clone());

    if subtrees {
        Ok(tree.subtrees().map(to_raw).collect())
    } else {
        Ok(vec![to_raw(&tree)])
    }
}

/// A whole line of text carrying a label decided by the file it came from.
pub fn parse_line_without_label(line: &str, label: &str) -> Vec<RawExample> {
    let text = line.split_whitespace().collect::<Vec<_>>().join(" ");
    vec![RawExample::new(text, label)]
}

/// Reads `path` line by line and collects whatever `parser` emits.
///
/// Bytes are decoded lossily: the MR release is not valid UTF-8.
/// Blank lines are skipped.
pub fn read_examples<P, F>(path: P, mut parser: F) -> Result<Vec<RawExample>>
where
    P: AsRef<Path>,
    F: FnMut(&str) -> std::result::Result<Vec<RawExample>, TreeError>,
{
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut examples = Vec::new();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let bytes = line?;
        let line = String::from_utf8_lossy(&bytes);
        if line.trim().is_empty() {
            continue;
        }
        let parsed = parser(&line).map_err(|e| DataError::TreeParse {
            line: idx + 1,
            msg: e.to_string(),
        })?;
        examples.extend(parsed);
    }

    log::debug!("Read {} raw examples from {:?}", examples.len(), path.as_ref());
    Ok(examples)
}
