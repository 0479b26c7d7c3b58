//! Inside estimates over dependency trees.
//!
//! All three routines are parameterised by the combiner: `log_add` yields
//! the EM sums, `log_max` the Viterbi maxima, from the same code path.

use crate::em::logmath::{LogProb, Oper};
use crate::em::tree::DepTree;
use crate::em::ProbCount;

/// Inside mass of a whole subtree: the combiner over the node's own choices,
/// or the product of the children's masses for a pass-through node.
pub(crate) fn tree_sum_estimation(dtree: &DepTree, oper: Oper) -> LogProb {
    if dtree.choices.is_empty() {
        let mut prob = 0.0;
        for child in &dtree.children {
            prob += tree_sum_estimation(child, oper);
        }
        prob
    } else {
        let mut prob = f64::INFINITY;
        for choice in &dtree.choices {
            prob = oper(prob, choice.prob);
        }
        prob
    }
}

/// Contribution of the subtree `modifier` under its head's choice `head_i`.
///
/// A pass-through modifier contributes its own inside mass; when even that
/// is empty the edge costs nothing.
pub(crate) fn tree_edge_estimation(
    head_i: usize,
    modifier: &DepTree,
    oper: Oper,
    pcs: &[ProbCount],
) -> LogProb {
    if modifier.choices.is_empty() {
        let edge_prob = tree_sum_estimation(modifier, oper);
        if edge_prob == f64::INFINITY {
            return 0.0;
        }
        return edge_prob;
    }

    let mut edge_prob = f64::INFINITY;
    for mod_choice in &modifier.choices {
        edge_prob = oper(
            edge_prob,
            pcs[mod_choice.prob_counts[head_i]].prob + mod_choice.prob,
        );
    }
    edge_prob
}

/// Post-order inside pass: every choice's inside estimate becomes the
/// product of its children's edge contributions.
pub(crate) fn tree_estimation(dtree: &mut DepTree, oper: Oper, pcs: &[ProbCount]) {
    for child in &mut dtree.children {
        tree_estimation(child, oper, pcs);
    }

    for i in 0..dtree.choices.len() {
        let mut prob = 0.0;
        for child in &dtree.children {
            prob += tree_edge_estimation(i, child, oper, pcs);
        }
        dtree.choices[i].prob = prob;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::em::logmath::{log_add, log_max};
    use crate::em::tree::SenseChoice;

    fn choice(stats: usize, prob_counts: Vec<usize>) -> SenseChoice {
        SenseChoice {
            stats,
            prob: 0.0,
            prob_counts,
        }
    }

    fn cell(prob: f64) -> ProbCount {
        ProbCount {
            prob: -prob.ln(),
            count: f64::INFINITY,
        }
    }

    /// A head with two choices over one modifier with two choices, with
    /// hand-picked bigram parameters.
    fn fixture() -> (DepTree, Vec<ProbCount>) {
        // (head 0, mod 0) .. (head 1, mod 1)
        let pcs = vec![cell(0.4), cell(0.1), cell(0.2), cell(0.3)];
        let modifier = DepTree {
            index: 0,
            choices: vec![choice(10, vec![0, 2]), choice(11, vec![1, 3])],
            children: Vec::new(),
        };
        let head = DepTree {
            index: 1,
            choices: vec![choice(20, Vec::new()), choice(21, Vec::new())],
            children: vec![modifier],
        };
        (head, pcs)
    }

    #[test]
    fn test_inside_sum() {
        let (mut head, pcs) = fixture();
        tree_estimation(&mut head, log_add, &pcs);
        // head choice 0 sums 0.4 + 0.1, head choice 1 sums 0.2 + 0.3
        assert!((head.choices[0].prob - -(0.5f64).ln()).abs() < 1e-12);
        assert!((head.choices[1].prob - -(0.5f64).ln()).abs() < 1e-12);
        let sum = tree_sum_estimation(&head, log_add);
        assert!((sum - -(1.0f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_inside_max() {
        let (mut head, pcs) = fixture();
        tree_estimation(&mut head, log_max, &pcs);
        assert!((head.choices[0].prob - -(0.4f64).ln()).abs() < 1e-12);
        assert!((head.choices[1].prob - -(0.3f64).ln()).abs() < 1e-12);
        let max = tree_sum_estimation(&head, log_max);
        assert!((max - -(0.4f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_pass_through_modifier_costs_nothing() {
        let pcs = Vec::new();
        let mut head = DepTree {
            index: 1,
            choices: vec![choice(20, Vec::new())],
            children: vec![DepTree {
                index: 0,
                choices: Vec::new(),
                children: Vec::new(),
            }],
        };
        tree_estimation(&mut head, log_add, &pcs);
        assert_eq!(head.choices[0].prob, 0.0);
        assert_eq!(tree_sum_estimation(&head, log_add), 0.0);
    }

    #[test]
    fn test_pass_through_forwards_grandchildren() {
        // head -> empty node -> grandchild -> leaf; the grandchild's inside
        // mass comes from its own bigram to the leaf and must pass through
        // the empty node unchanged
        let pcs = vec![cell(0.25)];
        let leaf = DepTree {
            index: 3,
            choices: vec![choice(30, vec![0])],
            children: Vec::new(),
        };
        let grandchild = DepTree {
            index: 2,
            // a child of a pass-through node has no bigram cells
            choices: vec![choice(10, Vec::new())],
            children: vec![leaf],
        };
        let empty = DepTree {
            index: 1,
            choices: Vec::new(),
            children: vec![grandchild],
        };
        let mut head = DepTree {
            index: 0,
            choices: vec![choice(20, Vec::new())],
            children: vec![empty],
        };
        tree_estimation(&mut head, log_add, &pcs);
        assert!((head.choices[0].prob - -(0.25f64).ln()).abs() < 1e-12);
    }
}
