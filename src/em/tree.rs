//! Dependency trees with sense choice sets.

use crate::em::conll::ConllRow;
use crate::em::logmath::LogProb;
use std::fmt;

/// Interned id of a function symbol, indexing the state's statistics table.
pub type FunId = usize;

/// Index of a `ProbCount` cell in the state's flat parameter arena.
pub(crate) type CellId = usize;

/// One candidate sense at a tree node.
///
/// `prob_counts` is aligned with the *parent's* choice set: entry `j` is the
/// bigram cell for (parent's j-th choice, this choice). The cells themselves
/// live in the state's arena and are shared with every other occurrence of
/// the same function pair.
pub struct SenseChoice {
    pub(crate) stats: FunId,
    pub(crate) prob: LogProb,
    pub(crate) prob_counts: Vec<CellId>,
}

impl SenseChoice {
    /// The function id of this candidate.
    pub fn fun(&self) -> FunId {
        self.stats
    }

    /// Inside estimate of this choice under the current parameters, log-neg.
    pub fn prob(&self) -> LogProb {
        self.prob
    }
}

/// A node of a dependency tree. A node with an empty choice set is a
/// pass-through: it contributes its children's masses and no counts of its
/// own.
pub struct DepTree {
    /// Zero-based position of the token in its sentence.
    pub index: usize,
    pub(crate) choices: Vec<SenseChoice>,
    pub children: Vec<DepTree>,
}

impl DepTree {
    pub fn choices(&self) -> &[SenseChoice] {
        &self.choices
    }
}

/// True iff the node's dependency label (field 7) equals `label`.
pub fn match_label(rows: &[ConllRow], node: &DepTree, label: &str) -> bool {
    rows.get(node.index).map_or(false, |row| row.label() == label)
}

/// True iff the node's POS tag (field 3) equals `pos`.
pub fn match_pos(rows: &[ConllRow], node: &DepTree, pos: &str) -> bool {
    rows.get(node.index).map_or(false, |row| row.pos() == pos)
}

/// True iff some candidate of `node` refers to the same function as
/// `choice`.
pub fn match_same_choice(choice: &SenseChoice, node: &DepTree) -> bool {
    node.choices.iter().any(|c| c.stats == choice.stats)
}

// Debug rendering: per-choice inside estimates and the child subtrees.
impl fmt::Display for DepTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "([")?;
        for (i, choice) in self.choices.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:e}", choice.prob)?;
        }
        write!(f, "]")?;
        for child in &self.children {
            write!(f, " {}", child)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(index: usize, funs: &[FunId]) -> DepTree {
        DepTree {
            index,
            choices: funs
                .iter()
                .map(|&stats| SenseChoice {
                    stats,
                    prob: 0.0,
                    prob_counts: Vec::new(),
                })
                .collect(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_match_helpers() {
        let rows: Vec<ConllRow> = vec![
            "1\tdogs\tdog\tNOUN\t_\t_\t2\tnsubj\t_\t_".parse().unwrap(),
            "2\trun\t_\tVERB\t_\t_\t0\troot\t_\t_".parse().unwrap(),
        ];
        let node = leaf(1, &[0]);
        assert!(match_label(&rows, &node, "root"));
        assert!(!match_label(&rows, &node, "nsubj"));
        assert!(match_pos(&rows, &node, "VERB"));
        assert!(!match_pos(&rows, &leaf(5, &[0]), "VERB"));
    }

    #[test]
    fn test_match_same_choice() {
        let node = leaf(0, &[1, 3]);
        let choice = SenseChoice {
            stats: 3,
            prob: 0.0,
            prob_counts: Vec::new(),
        };
        assert!(match_same_choice(&choice, &node));
        let other = SenseChoice {
            stats: 2,
            prob: 0.0,
            prob_counts: Vec::new(),
        };
        assert!(!match_same_choice(&other, &node));
    }

    #[test]
    fn test_display() {
        let mut node = leaf(0, &[0, 1]);
        node.children.push(leaf(1, &[]));
        assert_eq!(node.to_string(), "([0e0 0e0] ([]))");
    }
}
