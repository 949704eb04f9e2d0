//! Lane-based layout of a commit graph, like `git log --graph`.
//!
//! The layout is built one row per commit, in the order the commits are
//! listed (newest first). Between rows, the engine keeps a list of lanes;
//! each lane holds the OID of the commit it is waiting for, i.e. a parent of
//! some commit already drawn. A commit is drawn in the lane(s) waiting for it,
//! and then its parents take over those lanes.

use std::sync::Arc;

use tracing::trace;

use crate::core::formatting::Glyphs;
use crate::git::{Commit, NonZeroOid};

/// What to draw in one cell of a [`GraphRow`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellType {
    Empty,
    Commit,
    MergeCommit,
    VerticalLine,
    MergeCorner,
    HorizontalLine,
    BranchOffCorner,
    MultiBranchTee,
    ShiftInCorner,
    ShiftDownCorner,
}

impl CellType {
    /// Whether this cell bends a line.
    pub fn is_corner(self) -> bool {
        match self {
            CellType::MergeCorner
            | CellType::BranchOffCorner
            | CellType::MultiBranchTee
            | CellType::ShiftInCorner
            | CellType::ShiftDownCorner => true,
            CellType::Empty
            | CellType::Commit
            | CellType::MergeCommit
            | CellType::VerticalLine
            | CellType::HorizontalLine => false,
        }
    }
}

/// The cells drawn to the left of one commit, left to right. Lanes and the
/// separators between them each take one cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphRow {
    cells: Vec<CellType>,
}

impl GraphRow {
    /// The cells, left to right.
    pub fn cells(&self) -> &[CellType] {
        &self.cells
    }

    /// The number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Render one character per cell.
    pub fn render(&self, glyphs: &Glyphs) -> String {
        self.cells.iter().map(|cell| glyphs.cell(*cell)).collect()
    }
}

/// The layout of a whole history.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    lanes: Vec<Option<NonZeroOid>>,
    rows: Vec<GraphRow>,
}

impl Graph {
    /// Make an empty graph.
    pub fn new() -> Self {
        Default::default()
    }

    /// Lay out `commits`, which must be listed newest first.
    pub fn from_commits(commits: impl IntoIterator<Item = Arc<Commit>>) -> Self {
        let mut graph = Graph::new();
        for commit in commits {
            graph.push(&commit);
        }
        graph
    }

    /// The number of rows laid out so far.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The row of the commit pushed at `index`.
    pub fn row(&self, index: usize) -> Option<&GraphRow> {
        self.rows.get(index)
    }

    /// Every row, in push order.
    pub fn rows(&self) -> &[GraphRow] {
        &self.rows
    }

    /// How many lanes are open below the last row.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Lay out all of `commits` (newest first) but keep only the rows of
    /// those `is_visible` admits. Lanes follow every commit, so a hidden
    /// parent still joins the lines of the visible commits around it.
    pub fn from_visible_commits(
        commits: impl IntoIterator<Item = Arc<Commit>>,
        is_visible: impl Fn(&Commit) -> bool,
    ) -> Self {
        let mut graph = Graph::new();
        for commit in commits {
            graph.push(&commit);
            if !is_visible(&commit) {
                graph.rows.pop();
            }
        }
        graph
    }

    /// Lay out the next commit and return its row.
    pub fn push(&mut self, commit: &Commit) -> &GraphRow {
        normalize_lanes(&mut self.lanes);

        let oid = commit.get_oid();
        let commit_cell = if commit.is_merge() {
            CellType::MergeCommit
        } else {
            CellType::Commit
        };
        let resolved: Vec<usize> = self
            .lanes
            .iter()
            .enumerate()
            .filter(|(_, lane)| **lane == Some(oid))
            .map(|(index, _)| index)
            .collect();

        let mut cells = Vec::with_capacity(self.lanes.len() * 2 + 1);
        let mut resolved_drawn = 0;
        for (index, lane) in self.lanes.iter().enumerate() {
            let next_lane = self.lanes.get(index + 1);
            let next_is_empty = matches!(next_lane, Some(None));
            match lane {
                None => cells.push(if next_is_empty {
                    CellType::HorizontalLine
                } else {
                    CellType::ShiftInCorner
                }),
                Some(lane_oid) if *lane_oid == oid => {
                    resolved_drawn += 1;
                    cells.push(if resolved_drawn == 1 {
                        commit_cell
                    } else if resolved_drawn < resolved.len() {
                        CellType::MultiBranchTee
                    } else {
                        CellType::BranchOffCorner
                    });
                }
                Some(_) => cells.push(if next_is_empty {
                    CellType::ShiftDownCorner
                } else {
                    CellType::VerticalLine
                }),
            }

            if next_lane.is_some() {
                let joins_right = resolved_drawn > 0
                    && (commit.is_merge() || resolved_drawn < resolved.len());
                cells.push(if joins_right || next_is_empty {
                    CellType::HorizontalLine
                } else {
                    CellType::Empty
                });
            }
        }

        if resolved.is_empty() {
            if !cells.is_empty() {
                cells.push(CellType::Empty);
            }
            cells.push(commit_cell);
        }
        // Lines already bending into the last lane leave no room for a
        // merge corner.
        if commit.is_merge()
            && !matches!(
                cells.last(),
                Some(
                    CellType::BranchOffCorner
                        | CellType::MultiBranchTee
                        | CellType::ShiftInCorner
                        | CellType::HorizontalLine
                )
            )
        {
            cells.push(CellType::HorizontalLine);
            cells.push(CellType::MergeCorner);
        }

        let lane_index = match resolved.first() {
            Some(index) => *index,
            None => {
                self.lanes.push(None);
                self.lanes.len() - 1
            }
        };
        for index in resolved.iter().skip(1) {
            self.lanes[*index] = None;
        }
        while self.lanes.len() > lane_index + 1 && self.lanes.last() == Some(&None) {
            self.lanes.pop();
        }
        let mut parents = commit.get_parent_oids().iter().copied();
        self.lanes[lane_index] = parents.next();
        self.lanes.extend(parents.map(Some));
        while let Some(None) = self.lanes.last() {
            self.lanes.pop();
        }

        trace!(?oid, ?cells, lanes = ?self.lanes, "Laid out graph row");
        self.rows.push(GraphRow { cells });
        &self.rows[self.rows.len() - 1]
    }
}

/// Slide empty lanes to the right, in a single right-to-left pass.
fn normalize_lanes(lanes: &mut [Option<NonZeroOid>]) {
    for index in (0..lanes.len().saturating_sub(1)).rev() {
        if lanes[index].is_none() && lanes[index + 1].is_some() {
            lanes.swap(index, index + 1);
        }
    }
}
