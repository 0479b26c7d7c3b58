//! Viterbi annotation of dependency trees.
//!
//! Reuses the inside routines in max mode: per node, the outside weight of
//! each choice plus its inside estimate ranks the candidates, best first.
//! Candidates strictly worse than the best-tying group are set off with a
//! `" |"` marker in the emitted CoNLL column.

use crate::em::conll::ConllRow;
use crate::em::estimation::{tree_edge_estimation, tree_estimation, tree_sum_estimation};
use crate::em::grammar::Grammar;
use crate::em::logmath::{log_max, LogProb};
use crate::em::tree::DepTree;
use crate::em::{EMState, EmError, ParamStore, ProbCount};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// One ranked sense candidate of an annotated token.
#[derive(Debug, Clone, PartialEq)]
pub struct LemmaProb {
    /// Zero-based token position in the sentence.
    pub index: usize,
    pub fun: String,
    /// Outside weight plus inside estimate, log-neg.
    pub prob: LogProb,
}

impl<G: Grammar> EMState<G> {
    /// Writes the annotated treebank to `path`, stdout when `None`. The
    /// original CoNLL fields reappear if the state was set up to preserve
    /// them; otherwise they print as `_`.
    pub fn export_annotated_treebank(&mut self, path: Option<&Path>) -> Result<(), EmError> {
        let mut out: Box<dyn Write> = match path {
            None => Box::new(io::stdout()),
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        };

        let EMState {
            dtrees,
            params,
            fields,
            ..
        } = self;
        for (i, dtree) in dtrees.iter_mut().enumerate() {
            tree_estimation(dtree, log_max, &params.pcs);

            let max = tree_sum_estimation(dtree, log_max);
            let outside_probs = vec![-max; dtree.choices.len()];

            let rows = fields
                .as_ref()
                .and_then(|fields| fields.get(i))
                .map(|rows| rows.as_slice());
            print_annotated_conll_tree(&mut out, params, dtree, 0, &outside_probs, rows)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    /// Viterbi-annotates a tree, returning every node's candidates ranked
    /// best first.
    pub fn annotate_dep_tree(&self, dtree: &mut DepTree) -> Vec<LemmaProb> {
        tree_estimation(dtree, log_max, &self.params.pcs);

        let max = tree_sum_estimation(dtree, log_max);
        let outside_probs = vec![-max; dtree.choices.len()];

        let mut buf = Vec::new();
        annotate_dep_tree_rec(&self.params, dtree, &outside_probs, &mut buf);
        buf
    }
}

/// Outside weights of a child's choices under max semantics, mirroring the
/// counting pass of the EM step.
fn child_outside_probs(
    pcs: &[ProbCount],
    dtree: &DepTree,
    child: &DepTree,
    outside_probs: &[LogProb],
) -> Vec<LogProb> {
    let mut probs = vec![f64::INFINITY; child.choices.len()];

    if !dtree.choices.is_empty() {
        for (j, head_choice) in dtree.choices.iter().enumerate() {
            let prob = outside_probs[j] + head_choice.prob
                - tree_edge_estimation(j, child, log_max, pcs);

            for (k, mod_choice) in child.choices.iter().enumerate() {
                let p1 = prob + pcs[mod_choice.prob_counts[j]].prob;
                probs[k] = log_max(probs[k], p1);
            }
        }
    } else {
        let sum = tree_sum_estimation(child, log_max);
        for p in probs.iter_mut() {
            *p = -sum;
        }
    }
    probs
}

/// The node's candidates with their final scores, sorted ascending; the
/// sort is stable, so ties keep the choice-set order.
fn ranked_lemmas(params: &ParamStore, dtree: &DepTree, outside_probs: &[LogProb]) -> Vec<LemmaProb> {
    let mut lemmas: Vec<LemmaProb> = dtree
        .choices
        .iter()
        .enumerate()
        .map(|(j, choice)| LemmaProb {
            index: dtree.index,
            fun: params.name(choice.stats).to_string(),
            prob: outside_probs[j] + choice.prob,
        })
        .collect();
    lemmas.sort_by(|a, b| a.prob.partial_cmp(&b.prob).unwrap_or(Ordering::Equal));
    lemmas
}

fn print_annotated_head(
    out: &mut dyn Write,
    params: &ParamStore,
    dtree: &DepTree,
    parent_index: usize,
    outside_probs: &[LogProb],
    rows: Option<&[ConllRow]>,
) -> io::Result<()> {
    let row = rows.and_then(|rows| rows.get(dtree.index));
    let field = |i: usize| row.map_or("_", |row| row.field(i));
    write!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
        dtree.index + 1,
        field(1),
        field(2),
        field(3),
        field(4),
        field(5),
        parent_index,
        field(7),
        field(8),
        field(9)
    )?;

    let lemmas = ranked_lemmas(params, dtree, outside_probs);
    let best_prob = lemmas.first().map_or(f64::INFINITY, |lemma| lemma.prob);
    let mut marked = false;
    for (j, lemma) in lemmas.iter().enumerate() {
        if j > 0 {
            if !marked && lemma.prob > best_prob {
                out.write_all(b" |")?;
                marked = true;
            }
            out.write_all(b" ")?;
        }
        out.write_all(lemma.fun.as_bytes())?;
    }
    out.write_all(b"\n")
}

/// Emits the subtree in token order: the head row goes out right before the
/// first child whose index follows it.
fn print_annotated_conll_tree(
    out: &mut dyn Write,
    params: &ParamStore,
    dtree: &DepTree,
    parent_index: usize,
    outside_probs: &[LogProb],
    rows: Option<&[ConllRow]>,
) -> io::Result<()> {
    let mut print_head = true;
    for child in &dtree.children {
        if print_head && child.index > dtree.index {
            print_annotated_head(out, params, dtree, parent_index, outside_probs, rows)?;
            print_head = false;
        }

        let child_outside = child_outside_probs(&params.pcs, dtree, child, outside_probs);
        print_annotated_conll_tree(out, params, child, dtree.index + 1, &child_outside, rows)?;
    }

    if print_head {
        print_annotated_head(out, params, dtree, parent_index, outside_probs, rows)?;
    }
    Ok(())
}

fn annotate_dep_tree_rec(
    params: &ParamStore,
    dtree: &DepTree,
    outside_probs: &[LogProb],
    buf: &mut Vec<LemmaProb>,
) {
    if !dtree.choices.is_empty() {
        buf.extend(ranked_lemmas(params, dtree, outside_probs));
    }

    for child in &dtree.children {
        let child_outside = child_outside_probs(&params.pcs, dtree, child, outside_probs);
        annotate_dep_tree_rec(params, child, &child_outside, buf);
    }
}
