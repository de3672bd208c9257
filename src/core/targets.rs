// NetGather - core/targets.rs
//
// Target list parsing. Newline-delimited identifiers; blank lines and
// `#` comment lines are ignored. Duplicates are kept: each occurrence is
// an independent target.

use crate::core::model::Target;
use std::io::BufRead;

/// Parse a target list from text.
pub fn parse_targets(text: &str) -> Vec<Target> {
    collect(text.lines().map(str::to_string))
}

/// Parse a target list from a reader, skipping lines that are not valid UTF-8.
pub fn read_targets<R: BufRead>(reader: R) -> Vec<Target> {
    collect(reader.lines().filter_map(|line| match line {
        Ok(l) => Some(l),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unreadable target line");
            None
        }
    }))
}

fn collect<I: Iterator<Item = String>>(lines: I) -> Vec<Target> {
    lines
        .filter_map(|line| {
            let host = line.trim();
            if host.is_empty() || host.starts_with('#') {
                None
            } else {
                Some(host.to_string())
            }
        })
        .enumerate()
        .map(|(index, host)| Target::new(index, host))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_blanks_and_comments() {
        let targets = parse_targets("r1\n\n# core routers\n  r2  \n\t\nr3\n");
        let hosts: Vec<_> = targets.iter().map(|t| t.host.as_str()).collect();
        assert_eq!(hosts, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_duplicates_are_distinct_targets() {
        let targets = parse_targets("r1\nr1\n");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].index, 0);
        assert_eq!(targets[1].index, 1);
        assert_ne!(targets[0], targets[1]);
    }

    #[test]
    fn test_indented_comment_is_ignored() {
        assert!(parse_targets("   # nothing here\n").is_empty());
    }

    #[test]
    fn test_read_targets_from_reader() {
        let input = std::io::Cursor::new("10.0.0.1\r\n10.0.0.2\r\n");
        let targets = read_targets(input);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].host, "10.0.0.2");
    }
}
