//! The operation trace grammar.
//!
//! One operation per line, keyword case-insensitive:
//!
//! ```text
//! new(pid, sizeBytes)
//! use(allocationId)
//! delete(allocationId)
//! kill(pid)
//! ```
//!
//! Blank lines and `//` comments are ignored. Lines that don't fit the
//! grammar are dropped by [`parse_trace`] rather than failing the replay.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::OnceLock;

use log::trace;
use regex::Regex;

use crate::error::{Error, Result};
use crate::page_table::{AllocationId, Pid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    New { pid: Pid, size: u64 },
    Use { allocation: AllocationId },
    Delete { allocation: AllocationId },
    Kill { pid: Pid },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::New { .. } => "new",
            Operation::Use { .. } => "use",
            Operation::Delete { .. } => "delete",
            Operation::Kill { .. } => "kill",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::New { pid, size } => write!(f, "new({}, {})", pid, size),
            Operation::Use { allocation } => write!(f, "use({})", allocation),
            Operation::Delete { allocation } => write!(f, "delete({})", allocation),
            Operation::Kill { pid } => write!(f, "kill({})", pid),
        }
    }
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(new|use|delete|kill)\s*\(([^)]*)\)\s*$").expect("operation pattern is valid")
    })
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let caps = line_pattern()
            .captures(line)
            .ok_or_else(|| Error::Parse(format!("{:?}", line.trim())))?;

        let keyword = caps[1].to_ascii_lowercase();
        let args: Vec<&str> = caps[2].split(',').map(str::trim).filter(|a| !a.is_empty()).collect();

        match (keyword.as_str(), args.as_slice()) {
            ("new", [pid, size]) => Ok(Operation::New { pid: pid.parse()?, size: size.parse()? }),
            ("use", [allocation]) => Ok(Operation::Use { allocation: allocation.parse()? }),
            ("delete", [allocation]) => Ok(Operation::Delete { allocation: allocation.parse()? }),
            ("kill", [pid]) => Ok(Operation::Kill { pid: pid.parse()? }),
            _ => Err(Error::Parse(format!("{:?}: wrong number of arguments", line.trim()))),
        }
    }
}

/// Parses a whole trace, silently skipping comments, blank and malformed
/// lines.
pub fn parse_trace(text: &str) -> Vec<Operation> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .filter_map(|line| match line.parse::<Operation>() {
            Ok(op) => Some(op),
            Err(err) => {
                trace!("trace: dropping line: {}", err);
                None
            }
        })
        .collect()
}

/// Renders operations one per line, newline terminated.
pub fn render_trace(ops: &[Operation]) -> String {
    ops.iter().map(|op| format!("{}\n", op)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_keyword() -> Result<()> {
        assert_eq!("new(1, 4096)".parse::<Operation>()?, Operation::New { pid: 1, size: 4096 });
        assert_eq!("USE(3)".parse::<Operation>()?, Operation::Use { allocation: 3 });
        assert_eq!("  Delete ( 2 ) ".parse::<Operation>()?, Operation::Delete { allocation: 2 });
        assert_eq!("kill(7)".parse::<Operation>()?, Operation::Kill { pid: 7 });
        Ok(())
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in ["new(1)", "use()", "free(1)", "kill(x)", "use(1", "new(-1, 10)"] {
            assert!(matches!(line.parse::<Operation>(), Err(Error::Parse(_))), "{}", line);
        }
    }

    #[test]
    fn trace_skips_noise() {
        let text = "// header\nnew(1, 100)\n\ngarbage\nuse(1)\r\nkill(1)\n";
        assert_eq!(
            parse_trace(text),
            vec![
                Operation::New { pid: 1, size: 100 },
                Operation::Use { allocation: 1 },
                Operation::Kill { pid: 1 },
            ]
        );
    }

    #[test]
    fn display_matches_grammar() {
        let ops = parse_trace("new(2,  512)\ndelete(4)\n");
        assert_eq!(render_trace(&ops), "new(2, 512)\ndelete(4)\n");
        assert_eq!(parse_trace(&render_trace(&ops)), ops);
    }
}
