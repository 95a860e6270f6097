//! Coverage profile parsing.
//!
//! A profile starts with a `mode: <name>` header followed by one record per
//! covered block:
//!
//! ```text
//! mode: set
//! example.com/pkg/file.go:10.2,12.16 3 1
//! ```
//!
//! The record fields are the module (source file), the start and end
//! positions as `line.column`, the statement count and the reached flag.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;

use tracing::debug;

use crate::ranges::LineRange;
use crate::{consts, Error, Result};

/// One parsed coverage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageBlock {
    pub module: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    /// Number of executable statements spanned by the block.
    pub statements: u64,
    /// Whether any execution reached the block.
    pub reached: bool,
}

impl CoverageBlock {
    /// Returns the inclusive line span of the block.
    pub fn line_range(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }
}

impl FromStr for CoverageBlock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_record(s)
    }
}

/// A fully parsed coverage profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    /// The coverage mode from the header, kept verbatim (`set`, `count`, `atomic`).
    pub mode: String,
    pub blocks: Vec<CoverageBlock>,
}

impl Profile {
    /// Validates the integrity of the profile.
    /// Checks that every block spans a forward line range, that the
    /// blocks of each module form a single contiguous run and that the
    /// statement total fits in a `u64`.
    pub fn validate(&self) -> Result<()> {
        let mut closed: HashSet<&str> = HashSet::new();
        let mut current: Option<&str> = None;
        let mut statements: u64 = 0;

        for block in &self.blocks {
            statements = statements.checked_add(block.statements).ok_or_else(|| {
                Error::MalformedRecord(format!(
                    "{}: statement total overflows a 64-bit count",
                    block.module
                ))
            })?;
            if block.start_line > block.end_line {
                return Err(Error::MalformedRecord(format!(
                    "{}: start line {} is after end line {}",
                    block.module, block.start_line, block.end_line
                )));
            }
            if current == Some(block.module.as_str()) {
                continue;
            }
            if let Some(previous) = current {
                closed.insert(previous);
            }
            if closed.contains(block.module.as_str()) {
                return Err(Error::NonContiguousModule(block.module.clone()));
            }
            current = Some(block.module.as_str());
        }
        Ok(())
    }

    /// Counts the distinct modules in the profile.
    pub fn module_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|block| block.module.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Parses the `mode: <name>` header line and returns the mode name.
pub fn parse_header(line: &str) -> Result<String> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mode = line
        .strip_prefix(consts::HEADER_PREFIX)
        .ok_or_else(|| {
            Error::MalformedHeader(format!(
                "expected prefix '{}', found '{line}'",
                consts::HEADER_PREFIX
            ))
        })?
        .trim();
    if mode.is_empty() {
        return Err(Error::MalformedHeader("empty coverage mode".to_string()));
    }
    Ok(mode.to_string())
}

/// Parses a single record line into a [`CoverageBlock`].
///
/// Any reached flag other than `0` counts as reached, since `count` and
/// `atomic` profiles store hit counts there.
pub fn parse_record(line: &str) -> Result<CoverageBlock> {
    let mut fields = line.split_whitespace();
    let (Some(location), Some(count), Some(flag)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(Error::MalformedRecord(format!(
            "expected '<file>:<span> <statements> <count>', found '{line}'"
        )));
    };

    // The last ':' splits module and span, so drive letters stay in the module.
    let (module, span) = location
        .rsplit_once(':')
        .ok_or_else(|| Error::MalformedRecord(format!("missing ':' in '{location}'")))?;
    if module.is_empty() {
        return Err(Error::MalformedRecord(format!(
            "empty module name in '{location}'"
        )));
    }

    let (start, end) = span
        .split_once(',')
        .ok_or_else(|| Error::MalformedRecord(format!("missing ',' in span '{span}'")))?;
    let (start_line, start_column) = parse_position(start)?;
    let (end_line, end_column) = parse_position(end)?;
    if start_line > end_line {
        return Err(Error::MalformedRecord(format!(
            "start line {start_line} is after end line {end_line}"
        )));
    }

    let statements = count
        .parse::<u64>()
        .map_err(|_| Error::MalformedRecord(format!("invalid statement count '{count}'")))?;

    Ok(CoverageBlock {
        module: module.to_string(),
        start_line,
        start_column,
        end_line,
        end_column,
        statements,
        reached: flag != consts::UNREACHED_FLAG,
    })
}

fn parse_position(field: &str) -> Result<(u32, u32)> {
    let (line, column) = field
        .split_once('.')
        .ok_or_else(|| Error::MalformedRecord(format!("missing '.' in position '{field}'")))?;
    let line = line
        .parse::<u32>()
        .map_err(|_| Error::MalformedRecord(format!("invalid line number '{line}'")))?;
    let column = column
        .parse::<u32>()
        .map_err(|_| Error::MalformedRecord(format!("invalid column number '{column}'")))?;
    Ok((line, column))
}

pub(crate) fn read_profile<R: Read>(reader: R) -> Result<Profile> {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    if reader.read_line(&mut line)? == 0 {
        return Err(Error::MalformedHeader(
            "expected 'mode: <name>' header, but found EOF".to_string(),
        ));
    }
    let mode = parse_header(&line)?;

    let mut blocks = Vec::new();
    let mut line_number = 1;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_number += 1;
        let record = line.trim();
        if record.is_empty() {
            continue;
        }
        blocks.push(parse_record(record).map_err(|e| e.at_line(line_number))?);
    }

    let profile = Profile { mode, blocks };
    profile.validate()?;
    debug!(
        mode = %profile.mode,
        blocks = profile.blocks.len(),
        "parsed coverage profile"
    );
    Ok(profile)
}
