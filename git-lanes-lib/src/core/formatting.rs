//! Formatting and output helpers.

use crate::core::graph::CellType;

/// Pluralize a quantity, as appropriate. Example:
///
/// ```
/// # use lanes::core::formatting::Pluralize;
/// let p = Pluralize {
///     determiner: None,
///     amount: 1,
///     unit: ("commit", "commits"),
/// };
/// assert_eq!(p.to_string(), "1 commit");
/// ```
pub struct Pluralize<'a> {
    /// The string to render before the amount, if any.
    pub determiner: Option<(&'a str, &'a str)>,

    /// The amount of the quantity.
    pub amount: usize,

    /// The string to render after the amount, singular then plural.
    pub unit: (&'a str, &'a str),
}

impl std::fmt::Display for Pluralize<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            determiner,
            amount,
            unit: (singular, plural),
        } = self;
        let unit = if *amount == 1 { singular } else { plural };
        match determiner {
            None => write!(f, "{amount} {unit}"),
            Some((singular_determiner, plural_determiner)) => {
                let determiner = if *amount == 1 {
                    singular_determiner
                } else {
                    plural_determiner
                };
                write!(f, "{determiner} {amount} {unit}")
            }
        }
    }
}

/// Characters used to draw a commit graph, one per [`CellType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Glyphs {
    /// Gap between lanes.
    pub empty: char,

    /// A commit with at most one parent.
    pub commit: char,

    /// A commit with several parents.
    pub merge_commit: char,

    /// A lane continuing straight down.
    pub vertical_line: char,

    /// Where a merge opens a lane for one of its additional parents.
    pub merge_corner: char,

    /// Horizontal connection across a row.
    pub horizontal_line: char,

    /// Where the last of several lanes ends at the commit it was waiting for.
    pub branch_off_corner: char,

    /// Where a lane ends at the commit it was waiting for, with more such
    /// lanes to its right.
    pub multi_branch_tee: char,

    /// Where a lane moves left into a gap.
    pub shift_in_corner: char,

    /// Where a lane moves down next to a gap.
    pub shift_down_corner: char,
}

impl Glyphs {
    /// Make the `Glyphs` object appropriate for `stdout`.
    pub fn detect() -> Self {
        if console::user_attended() {
            Glyphs::pretty()
        } else {
            Glyphs::text()
        }
    }

    /// Pick glyphs from the `lanes.graph.unicode` setting, detecting the
    /// terminal when it isn't set.
    pub fn from_unicode_setting(unicode: Option<bool>) -> Self {
        match unicode {
            Some(true) => Glyphs::pretty(),
            Some(false) => Glyphs::text(),
            None => Glyphs::detect(),
        }
    }

    /// Glyphs used for output to a text file or non-TTY.
    pub fn text() -> Self {
        Glyphs {
            empty: ' ',
            commit: 'o',
            merge_commit: 'M',
            vertical_line: '|',
            merge_corner: '.',
            horizontal_line: '-',
            branch_off_corner: '\'',
            multi_branch_tee: '+',
            shift_in_corner: '/',
            shift_down_corner: ',',
        }
    }

    /// Glyphs used for output to a TTY.
    pub fn pretty() -> Self {
        Glyphs {
            empty: ' ',
            commit: '●',
            merge_commit: '◉',
            vertical_line: '│',
            merge_corner: '╮',
            horizontal_line: '─',
            branch_off_corner: '╯',
            multi_branch_tee: '┴',
            shift_in_corner: '┘',
            shift_down_corner: '┐',
        }
    }

    /// The character for one cell.
    pub fn cell(&self, cell: CellType) -> char {
        match cell {
            CellType::Empty => self.empty,
            CellType::Commit => self.commit,
            CellType::MergeCommit => self.merge_commit,
            CellType::VerticalLine => self.vertical_line,
            CellType::MergeCorner => self.merge_corner,
            CellType::HorizontalLine => self.horizontal_line,
            CellType::BranchOffCorner => self.branch_off_corner,
            CellType::MultiBranchTee => self.multi_branch_tee,
            CellType::ShiftInCorner => self.shift_in_corner,
            CellType::ShiftDownCorner => self.shift_down_corner,
        }
    }
}
