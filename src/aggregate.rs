//! Per-file and global coverage aggregation.
//!
//! [`Aggregator`] is a left-to-right fold over blocks that are already
//! grouped by module. It keeps at most one open group; every group,
//! including the last one, is closed through the same `finalize` step, which
//! freezes the summary, adds it to the running totals and hands it to the
//! finalize sink (the render pool, when a report is being written).

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::profile::{CoverageBlock, Profile};
use crate::ranges::{LineKind, LineRange, RangeIndex};
use crate::{consts, Error, Result};

/// Returns `reached / statements` as a whole percentage, rounding to the
/// nearest integer with ties away from zero. Zero statements yield 0.
pub fn percentage(reached: u64, statements: u64) -> u32 {
    if statements == 0 {
        return 0;
    }
    let reached = u128::from(reached.min(statements));
    let statements = u128::from(statements);
    ((reached * 200 + statements) / (statements * 2)) as u32
}

/// Formats `numerator / denominator` as a percentage with `precision`
/// decimals. A precision of 0 uses the same rounding as [`percentage`].
pub fn format_percentage(numerator: u64, denominator: u64, precision: usize) -> String {
    if precision == 0 {
        return percentage(numerator, denominator).to_string();
    }
    let value = if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    };
    format!("{value:.precision$}")
}

/// Flattens a module path into a file name stem.
///
/// * `github.com/user/repo/file.go` -> `github_com_user_repo_file_go`
pub fn flatten_filename(module: &str) -> String {
    module.replace(['.', '/'], "_")
}

/// Reached/missed statement counts with their derived totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementCounts {
    pub reached: u64,
    pub missed: u64,
    /// `reached + missed`.
    pub statements: u64,
    /// 0-100, see [`percentage`].
    pub percentage: u32,
}

impl StatementCounts {
    /// Builds counts from reached and missed statements. The statement
    /// total saturates at `u64::MAX`; see [`StatementCounts::checked`].
    pub fn new(reached: u64, missed: u64) -> Self {
        Self::from_parts(reached, missed, reached.saturating_add(missed))
    }

    /// Like [`StatementCounts::new`], but `None` when the total overflows.
    pub fn checked(reached: u64, missed: u64) -> Option<Self> {
        reached
            .checked_add(missed)
            .map(|statements| Self::from_parts(reached, missed, statements))
    }

    fn from_parts(reached: u64, missed: u64, statements: u64) -> Self {
        Self {
            reached,
            missed,
            statements,
            percentage: percentage(reached, statements),
        }
    }
}

/// The finalized coverage summary of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSummary {
    /// The module identifier as it appears in the profile.
    pub display_file: String,
    /// File name of the rendered page, unique within one report.
    pub html_link: String,
    pub counts: StatementCounts,
    pub reached_ranges: RangeIndex,
    /// Missed lines, with every reached line carved out.
    pub missed_ranges: RangeIndex,
}

impl ModuleSummary {
    pub fn is_reached(&self, line: u32) -> bool {
        self.reached_ranges.contains(line)
    }

    pub fn is_missed(&self, line: u32) -> bool {
        self.missed_ranges.contains(line)
    }

    /// Classifies a 1-based source line.
    pub fn classify(&self, line: u32) -> LineKind {
        if self.is_reached(line) {
            LineKind::Reached
        } else if self.is_missed(line) {
            LineKind::Missed
        } else {
            LineKind::Plain
        }
    }
}

/// The global summary: pooled totals plus every module summary, sorted by
/// `display_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub mode: String,
    pub totals: StatementCounts,
    pub modules: Vec<Arc<ModuleSummary>>,
}

impl Report {
    /// Finds a module summary by its identifier.
    pub fn module(&self, id: &str) -> Option<&ModuleSummary> {
        self.modules
            .binary_search_by(|summary| summary.display_file.as_str().cmp(id))
            .ok()
            .map(|index| self.modules[index].as_ref())
    }
}

/// Blocks folded so far for the module being aggregated.
#[derive(Debug)]
struct Group {
    module: String,
    reached: u64,
    missed: u64,
    reached_ranges: Vec<LineRange>,
    missed_ranges: Vec<LineRange>,
}

impl Group {
    fn open(module: &str) -> Self {
        Self {
            module: module.to_string(),
            reached: 0,
            missed: 0,
            reached_ranges: Vec::new(),
            missed_ranges: Vec::new(),
        }
    }

    fn fold(&mut self, block: &CoverageBlock) -> Result<()> {
        let (total, ranges) = if block.reached {
            (&mut self.reached, &mut self.reached_ranges)
        } else {
            (&mut self.missed, &mut self.missed_ranges)
        };
        *total = total
            .checked_add(block.statements)
            .ok_or_else(|| count_overflow(&self.module))?;
        ranges.push(block.line_range());
        Ok(())
    }
}

fn count_overflow(module: &str) -> Error {
    Error::MalformedRecord(format!(
        "statement counts of '{module}' overflow a 64-bit total"
    ))
}

#[derive(Debug)]
enum State {
    Idle,
    InGroup(Group),
}

type Discard = fn(&Arc<ModuleSummary>) -> Result<()>;

fn discard(_: &Arc<ModuleSummary>) -> Result<()> {
    Ok(())
}

/// Folds a grouped block sequence into module summaries and global totals.
pub struct Aggregator<S> {
    mode: String,
    state: State,
    reached: u64,
    missed: u64,
    modules: Vec<Arc<ModuleSummary>>,
    finalized: HashSet<String>,
    links: HashSet<String>,
    sink: S,
}

impl Aggregator<Discard> {
    /// Creates an aggregator that only collects summaries.
    pub fn new(mode: impl Into<String>) -> Self {
        Aggregator::with_sink(mode, discard as Discard)
    }
}

impl<S> Aggregator<S>
where
    S: FnMut(&Arc<ModuleSummary>) -> Result<()>,
{
    /// Creates an aggregator that passes every finalized summary to `sink`.
    /// An error from the sink stops the fold.
    pub fn with_sink(mode: impl Into<String>, sink: S) -> Self {
        Self {
            mode: mode.into(),
            state: State::Idle,
            reached: 0,
            missed: 0,
            modules: Vec::new(),
            finalized: HashSet::new(),
            // Page names must never shadow the report index.
            links: HashSet::from([consts::INDEX_FILE.to_string()]),
            sink,
        }
    }

    /// Folds one block. A block of a new module closes the open group.
    pub fn push(&mut self, block: &CoverageBlock) -> Result<()> {
        if let State::InGroup(group) = &mut self.state {
            if group.module == block.module {
                return group.fold(block);
            }
        }
        if self.finalized.contains(&block.module) {
            return Err(Error::NonContiguousModule(block.module.clone()));
        }
        if let State::InGroup(group) = mem::replace(&mut self.state, State::Idle) {
            self.finalize(group)?;
        }

        let mut group = Group::open(&block.module);
        group.fold(block)?;
        self.state = State::InGroup(group);
        Ok(())
    }

    /// Closes the last group and returns the global summary.
    pub fn finish(mut self) -> Result<Report> {
        if let State::InGroup(group) = mem::replace(&mut self.state, State::Idle) {
            self.finalize(group)?;
        }

        let mut modules = self.modules;
        modules.sort_by(|a, b| a.display_file.cmp(&b.display_file));
        let totals = StatementCounts::new(self.reached, self.missed);
        debug!(
            modules = modules.len(),
            reached = totals.reached,
            missed = totals.missed,
            percentage = totals.percentage,
            "aggregated coverage"
        );

        Ok(Report {
            mode: self.mode,
            totals,
            modules,
        })
    }

    fn finalize(&mut self, group: Group) -> Result<()> {
        let counts = StatementCounts::checked(group.reached, group.missed)
            .ok_or_else(|| count_overflow(&group.module))?;
        // The pooled totals must stay representable too.
        let totals = self
            .reached
            .checked_add(counts.reached)
            .zip(self.missed.checked_add(counts.missed))
            .and_then(|(reached, missed)| StatementCounts::checked(reached, missed))
            .ok_or_else(|| count_overflow(&group.module))?;
        if counts.statements == 0 {
            warn!(module = %group.module, "module has no statements, reporting 0%");
        }

        let reached_ranges = RangeIndex::from_ranges(group.reached_ranges);
        let missed_ranges = RangeIndex::from_ranges(group.missed_ranges).subtract(&reached_ranges);
        let html_link = self.unique_link(&group.module);
        debug!(
            module = %group.module,
            reached = counts.reached,
            missed = counts.missed,
            percentage = counts.percentage,
            "finalized module"
        );

        self.reached = totals.reached;
        self.missed = totals.missed;
        self.finalized.insert(group.module.clone());

        let summary = Arc::new(ModuleSummary {
            display_file: group.module,
            html_link,
            counts,
            reached_ranges,
            missed_ranges,
        });
        (self.sink)(&summary)?;
        self.modules.push(summary);
        Ok(())
    }

    /// Flattened page name, suffixed with `_2`, `_3`, ... when two modules
    /// flatten to the same stem.
    fn unique_link(&mut self, module: &str) -> String {
        let stem = flatten_filename(module);
        let mut link = format!("{stem}{}", consts::HTML_EXTENSION);
        let mut suffix = 2;
        while self.links.contains(&link) {
            link = format!("{stem}_{suffix}{}", consts::HTML_EXTENSION);
            suffix += 1;
        }
        if suffix > 2 {
            warn!(module, link = %link, "page name collision, using suffixed name");
        }
        self.links.insert(link.clone());
        link
    }
}

/// Aggregates a parsed profile.
pub fn aggregate(profile: &Profile) -> Result<Report> {
    aggregate_with(profile, discard)
}

/// Aggregates a parsed profile, passing each finalized summary to `sink`.
pub fn aggregate_with<S>(profile: &Profile, sink: S) -> Result<Report>
where
    S: FnMut(&Arc<ModuleSummary>) -> Result<()>,
{
    let mut aggregator = Aggregator::with_sink(profile.mode.clone(), sink);
    for block in &profile.blocks {
        aggregator.push(block)?;
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn block(module: &str, start: u32, end: u32, statements: u64, reached: bool) -> CoverageBlock {
        CoverageBlock {
            module: module.to_string(),
            start_line: start,
            start_column: 1,
            end_line: end,
            end_column: 2,
            statements,
            reached,
        }
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(1, 8), 13); // 12.5 rounds away from zero
        assert_eq!(percentage(0, 5), 0);
        assert_eq!(percentage(5, 5), 100);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(2, 3, 0), "67");
        assert_eq!(format_percentage(2, 3, 1), "66.7");
        assert_eq!(format_percentage(1, 0, 2), "0.00");
    }

    #[test]
    fn test_flatten_filename() {
        assert_eq!(
            flatten_filename("github.com/user/repo/file.go"),
            "github_com_user_repo_file_go"
        );
    }

    #[test]
    fn test_single_module() {
        let profile = crate::from_reader(Cursor::new("mode: set\na:1.1,3.2 2 1\na:4.1,4.5 1 0\n"))
            .unwrap();
        let report = aggregate(&profile).unwrap();

        let a = report.module("a").unwrap();
        assert_eq!(a.counts, StatementCounts::new(2, 1));
        assert_eq!(a.counts.statements, 3);
        assert_eq!(a.counts.percentage, 67);
        assert_eq!(a.html_link, "a.html");
        assert_eq!(report.totals.percentage, 67);
        assert_eq!(report.mode, "set");
    }

    #[test]
    fn test_global_percentage_is_pooled() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("a", 1, 1, 1, true)).unwrap();
        aggregator.push(&block("b", 1, 2, 2, false)).unwrap();
        let report = aggregator.finish().unwrap();

        assert_eq!(report.totals.reached, 1);
        assert_eq!(report.totals.missed, 2);
        assert_eq!(report.totals.percentage, 33);
    }

    #[test]
    fn test_empty_input() {
        let report = Aggregator::new("set").finish().unwrap();
        assert!(report.modules.is_empty());
        assert_eq!(report.totals, StatementCounts::default());
    }

    #[test]
    fn test_zero_statement_module() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("empty.go", 1, 1, 0, false)).unwrap();
        let report = aggregator.finish().unwrap();
        assert_eq!(report.module("empty.go").unwrap().counts.percentage, 0);
    }

    #[test]
    fn test_reached_wins_on_shared_lines() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("a.go", 3, 5, 1, false)).unwrap();
        aggregator.push(&block("a.go", 5, 7, 1, true)).unwrap();
        let report = aggregator.finish().unwrap();
        let a = report.module("a.go").unwrap();

        assert_eq!(a.classify(4), LineKind::Missed);
        assert_eq!(a.classify(5), LineKind::Reached);
        assert_eq!(a.classify(8), LineKind::Plain);
        assert!(!a.reached_ranges.intersects(&a.missed_ranges));
    }

    #[test]
    fn test_non_contiguous_module_rejected() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("a", 1, 1, 1, true)).unwrap();
        aggregator.push(&block("b", 1, 1, 1, true)).unwrap();
        let err = aggregator.push(&block("a", 2, 2, 1, true)).unwrap_err();
        assert!(matches!(err, Error::NonContiguousModule(m) if m == "a"));
    }

    #[test]
    fn test_link_collisions_get_suffixes() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("a/b.go", 1, 1, 1, true)).unwrap();
        aggregator.push(&block("a.b/go", 1, 1, 1, true)).unwrap();
        aggregator.push(&block("a_b_go", 1, 1, 1, true)).unwrap();
        let report = aggregator.finish().unwrap();

        assert_eq!(report.module("a/b.go").unwrap().html_link, "a_b_go.html");
        assert_eq!(report.module("a.b/go").unwrap().html_link, "a_b_go_2.html");
        assert_eq!(report.module("a_b_go").unwrap().html_link, "a_b_go_3.html");
    }

    #[test]
    fn test_link_never_shadows_index() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("index", 1, 1, 1, true)).unwrap();
        aggregator.push(&block("z.go", 1, 1, 1, false)).unwrap();
        let report = aggregator.finish().unwrap();

        assert_eq!(report.module("index").unwrap().html_link, "index_2.html");
        assert!(report
            .modules
            .iter()
            .all(|m| m.html_link != consts::INDEX_FILE));
    }

    #[test]
    fn test_statement_overflow_is_an_error() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("a.go", 1, 1, u64::MAX, true)).unwrap();
        let err = aggregator.push(&block("a.go", 2, 2, 1, true)).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(msg) if msg.contains("a.go")));
    }

    #[test]
    fn test_reached_plus_missed_overflow_is_an_error() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("a.go", 1, 1, u64::MAX, true)).unwrap();
        aggregator.push(&block("a.go", 2, 2, 1, false)).unwrap();
        assert!(matches!(
            aggregator.finish(),
            Err(Error::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_global_total_overflow_is_an_error() {
        let mut aggregator = Aggregator::new("set");
        aggregator.push(&block("a.go", 1, 1, u64::MAX, true)).unwrap();
        aggregator.push(&block("b.go", 1, 1, 1, true)).unwrap();
        let err = aggregator.finish().unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(msg) if msg.contains("b.go")));
    }

    #[test]
    fn test_statement_counts_checked() {
        assert_eq!(StatementCounts::checked(2, 1), Some(StatementCounts::new(2, 1)));
        assert_eq!(StatementCounts::checked(u64::MAX, 1), None);
        assert_eq!(StatementCounts::new(u64::MAX, 1).statements, u64::MAX);
    }

    #[test]
    fn test_sink_sees_each_module_once_in_input_order() {
        let mut seen = Vec::new();
        let profile = crate::from_reader(Cursor::new(
            "mode: set\nz.go:1.1,1.2 1 1\nz.go:2.1,2.2 1 0\na.go:1.1,1.2 1 1\n",
        ))
        .unwrap();
        let report = aggregate_with(&profile, |summary| {
            seen.push(summary.display_file.clone());
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec!["z.go", "a.go"]);
        let order: Vec<_> = report.modules.iter().map(|m| m.display_file.as_str()).collect();
        assert_eq!(order, vec!["a.go", "z.go"]);
    }

    #[test]
    fn test_sink_error_stops_fold() {
        let profile = crate::from_reader(Cursor::new(
            "mode: set\na.go:1.1,1.2 1 1\nb.go:1.1,1.2 1 1\n",
        ))
        .unwrap();
        let mut calls = 0;
        let result = aggregate_with(&profile, |_| {
            calls += 1;
            Err(Error::PoolClosed)
        });
        assert!(matches!(result, Err(Error::PoolClosed)));
        assert_eq!(calls, 1);
    }
}
