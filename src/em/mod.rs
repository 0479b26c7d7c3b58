//! The EM engine.
//!
//! An [`EMState`] owns a probabilistic grammar, a treebank of dependency
//! trees whose nodes carry sense choice sets, and the parameter store: one
//! `ProbCount` cell per function symbol (unigram) and per head/modifier
//! function pair (bigram). Every occurrence of a pair in every tree shares
//! one cell, so a single EM pass over the treebank accumulates all expected
//! counts in place. [`EMState::step`] runs one iteration and reports the
//! corpus log-probability.

mod annotate;
pub mod conll;
mod estimation;
pub mod grammar;
pub mod logmath;
mod model;
pub mod tree;

pub use self::annotate::LemmaProb;

use crate::em::conll::ConllRow;
use crate::em::estimation::{tree_edge_estimation, tree_estimation, tree_sum_estimation};
use crate::em::grammar::{grammar_prob, Grammar, Morphology};
use crate::em::logmath::{from_prob, log_add, log_max, LogProb};
use crate::em::tree::{CellId, DepTree, FunId, SenseChoice};
use integeriser::{HashIntegeriser, Integeriser};
use log_domain::LogDomain;
use std::collections::{BTreeMap, HashMap};
use std::error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::mem;
use std::path::Path;

/// Errors surfaced by the fallible engine operations.
#[derive(Debug)]
pub enum EmError {
    /// The requested language tag is absent from the grammar.
    UnknownLanguage(String),
    /// A function symbol the treebank or a model file refers to cannot be
    /// typed by the grammar.
    UnknownFunction(String),
    /// A CoNLL, model or grammar line that does not parse.
    MalformedLine(String),
    Io(io::Error),
}

impl fmt::Display for EmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EmError::UnknownLanguage(lang) => write!(f, "unknown language {}", lang),
            EmError::UnknownFunction(fun) => write!(f, "unknown function {}", fun),
            EmError::MalformedLine(line) => write!(f, "malformed line: {}", line),
            EmError::Io(err) => err.fmt(f),
        }
    }
}

impl error::Error for EmError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            EmError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for EmError {
    fn from(err: io::Error) -> EmError {
        EmError::Io(err)
    }
}

/// A mutable parameter cell: the current parameter and the expected count
/// accumulating for the next iteration, both log-neg.
pub(crate) struct ProbCount {
    pub(crate) prob: LogProb,
    pub(crate) count: LogProb,
}

/// Per-function record: the unigram cell and one bigram cell per modifier
/// function observed under this function as head.
pub(crate) struct FunStats {
    pub(crate) fun: FunId,
    pub(crate) pc: CellId,
    pub(crate) mods: BTreeMap<FunId, CellId>,
}

/// Owns every parameter cell in the state: the per-function records plus the
/// flat arena the driver iterates to turn counts into probabilities.
pub(crate) struct ParamStore {
    pub(crate) funs: HashIntegeriser<String>,
    pub(crate) stats: Vec<FunStats>,
    pub(crate) pcs: Vec<ProbCount>,
}

impl ParamStore {
    fn new() -> ParamStore {
        ParamStore {
            funs: HashIntegeriser::new(),
            stats: Vec::new(),
            pcs: Vec::new(),
        }
    }

    pub(crate) fn name(&self, fun: FunId) -> &str {
        self.funs.find_value(fun).unwrap()
    }

    /// Interns `fun`; a record created here gets the given initial unigram
    /// cell, an existing record is left untouched.
    fn fun_or_insert(&mut self, fun: &str, prob: LogProb, count: LogProb) -> FunId {
        let id = self.funs.integerise(fun.to_string());
        if id == self.stats.len() {
            let pc = self.pcs.len();
            self.pcs.push(ProbCount { prob, count });
            self.stats.push(FunStats {
                fun: id,
                pc,
                mods: BTreeMap::new(),
            });
        }
        id
    }

    /// The bigram cell for (head, modifier), created with parameter `prob`
    /// and an empty count if absent.
    fn bigram_or_insert(&mut self, head: FunId, modifier: FunId, prob: LogProb) -> CellId {
        if let Some(&pc) = self.stats[head].mods.get(&modifier) {
            return pc;
        }
        let pc = self.pcs.len();
        self.pcs.push(ProbCount {
            prob,
            count: f64::INFINITY,
        });
        self.stats[head].mods.insert(modifier, pc);
        pc
    }
}

/// Ranks one sense candidate of a node. The choice set keeps the candidates
/// whose pair is componentwise best: maximal primary, then minimal
/// secondary.
pub type RankingCallback = Box<dyn Fn(&SenseChoice, &[ConllRow], &DepTree) -> (i32, i32)>;

/// Componentwise best rank over a choice set.
fn best_pair(ranks: &[(i32, i32)]) -> (i32, i32) {
    let mut best = (i32::MIN, i32::MAX);
    for &(primary, secondary) in ranks {
        if primary > best.0 {
            best = (primary, secondary);
        } else if primary == best.0 && secondary < best.1 {
            best.1 = secondary;
        }
    }
    best
}

/// The EM trainer state: grammar, treebank, parameters, totals.
pub struct EMState<G> {
    grammar: G,
    dtrees: Vec<DepTree>,
    fields: Option<Vec<Vec<ConllRow>>>,
    params: ParamStore,
    bigram_total: f64,
    unigram_total: f64,
    bigram_smoothing: LogProb,
    unigram_smoothing: LogProb,
    #[allow(dead_code)]
    break_trees: bool,
    callbacks: HashMap<String, RankingCallback>,
}

impl<G: Grammar> EMState<G> {
    pub fn new(grammar: G) -> EMState<G> {
        EMState {
            grammar,
            dtrees: Vec::new(),
            fields: None,
            params: ParamStore::new(),
            bigram_total: 0.0,
            unigram_total: 0.0,
            bigram_smoothing: f64::INFINITY,
            unigram_smoothing: f64::INFINITY,
            break_trees: false,
            callbacks: HashMap::new(),
        }
    }

    pub fn grammar(&self) -> &G {
        &self.grammar
    }

    pub fn trees(&self) -> &[DepTree] {
        &self.dtrees
    }

    /// The symbol of an interned function id.
    pub fn fun_name(&self, fun: FunId) -> &str {
        self.params.name(fun)
    }

    pub(crate) fn fun_id(&self, fun: &str) -> Result<FunId, EmError> {
        self.params
            .funs
            .find_key(&fun.to_string())
            .ok_or_else(|| EmError::UnknownFunction(fun.to_string()))
    }

    /// Keeps the CoNLL fields of imported sentences for later annotation.
    /// Must be called before the treebank is imported.
    pub fn setup_preserve_trees(&mut self) {
        self.fields = Some(Vec::new());
    }

    /// Seeds every grammar function with a pseudocount for the next
    /// normalisation.
    pub fn setup_unigram_smoothing(&mut self, count: f64) {
        self.unigram_smoothing = -count.ln();

        let mut funs = Vec::new();
        self.grammar.iter_functions(&mut |fun| funs.push(fun.to_string()));
        for fun in funs {
            self.params.fun_or_insert(&fun, 0.0, self.unigram_smoothing);
            self.unigram_total += count;
        }
    }

    /// Sets the bigram smoothing mass. Takes effect in the back-off prior of
    /// bigram cells created afterwards and in model loading.
    pub fn setup_bigram_smoothing(&mut self, prob: LogDomain<f64>) {
        self.bigram_smoothing = from_prob(prob);
    }

    /// Records the break-trees request. The flag is kept on the state but no
    /// core operation consults it.
    pub fn setup_break_trees(&mut self) {
        self.break_trees = true;
    }

    /// Registers a ranking callback for one category.
    pub fn set_ranking_callback(&mut self, cat: &str, callback: RankingCallback) {
        self.callbacks.insert(cat.to_string(), callback);
    }

    /// Builds a single-candidate node programmatically and wires its bigram
    /// cell to the first choice of `parent` when given. Attaching the node
    /// to the parent's `children` is up to the caller.
    pub fn new_dep_tree(
        &mut self,
        parent: Option<&DepTree>,
        fun: &str,
        _lbl: &str,
        index: usize,
        n_children: usize,
    ) -> Result<DepTree, EmError> {
        let id = self.params.fun_or_insert(fun, 0.0, f64::INFINITY);

        let pc = self.params.stats[id].pc;
        self.params.pcs[pc].count = log_add(self.params.pcs[pc].count, 0.0);

        let mut prob_counts = Vec::new();
        if let Some(parent_choice) = parent.and_then(|p| p.choices.first()) {
            let pc = match self.params.stats[parent_choice.stats].mods.get(&id) {
                Some(&pc) => pc,
                None => {
                    let back_off =
                        grammar_prob(&self.grammar, self.params.name(parent_choice.stats))?
                            + grammar_prob(&self.grammar, fun)?;
                    self.params.bigram_or_insert(
                        parent_choice.stats,
                        id,
                        self.bigram_smoothing + back_off,
                    )
                }
            };
            prob_counts.push(pc);
            self.params.pcs[pc].count = log_add(self.params.pcs[pc].count, 0.0);
        }

        self.unigram_total += 1.0;
        self.bigram_total += n_children as f64;

        Ok(DepTree {
            index,
            choices: vec![SenseChoice {
                stats: id,
                prob: 0.0,
                prob_counts,
            }],
            children: Vec::with_capacity(n_children),
        })
    }

    /// Builds, filters and count-initialises the tree of one sentence given
    /// as parsed CoNLL records. The tree is returned, not added.
    pub fn new_conll_dep_tree(&mut self, lang: &str, rows: &[ConllRow]) -> Result<DepTree, EmError> {
        let EMState {
            grammar,
            params,
            callbacks,
            unigram_total,
            bigram_total,
            bigram_smoothing,
            ..
        } = self;
        let concr = grammar
            .language(lang)
            .ok_or_else(|| EmError::UnknownLanguage(lang.to_string()))?;
        let mut builder = Builder {
            grammar: &*grammar,
            concr,
            callbacks: &*callbacks,
            params,
            bigram_smoothing: *bigram_smoothing,
            unigram_total,
            bigram_total,
        };
        match builder.sentence(rows)? {
            Some(dtree) => Ok(dtree),
            None => Err(EmError::MalformedLine(
                "sentence without a root token".to_string(),
            )),
        }
    }

    pub fn add_dep_tree(&mut self, dtree: DepTree) {
        self.dtrees.push(dtree);
    }

    /// Imports a CoNLL treebank, stdin when `path` is `None`. Lines must be
    /// newline-terminated; `#` starts a comment, a blank line ends a
    /// sentence, and a sentence still pending at end of input is flushed.
    pub fn import_treebank(&mut self, path: Option<&Path>, lang: &str) -> Result<(), EmError> {
        let EMState {
            grammar,
            params,
            callbacks,
            dtrees,
            fields,
            unigram_total,
            bigram_total,
            bigram_smoothing,
            ..
        } = self;
        let concr = grammar
            .language(lang)
            .ok_or_else(|| EmError::UnknownLanguage(lang.to_string()))?;
        let mut builder = Builder {
            grammar: &*grammar,
            concr,
            callbacks: &*callbacks,
            params,
            bigram_smoothing: *bigram_smoothing,
            unigram_total,
            bigram_total,
        };

        let mut reader: Box<dyn BufRead> = match path {
            None => Box::new(BufReader::new(io::stdin())),
            Some(path) => Box::new(BufReader::new(File::open(path)?)),
        };

        let mut rows: Vec<ConllRow> = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if !line.ends_with('\n') {
                return Err(EmError::MalformedLine(line.clone()));
            }
            let text = &line[..line.len() - 1];
            if text.starts_with('#') {
                continue;
            }
            if text.is_empty() {
                let sentence = mem::replace(&mut rows, Vec::new());
                if let Some(dtree) = builder.sentence(&sentence)? {
                    dtrees.push(dtree);
                    if let Some(fields) = fields {
                        fields.push(sentence);
                    }
                }
                continue;
            }
            rows.push(text.parse().map_err(EmError::MalformedLine)?);
        }

        if let Some(dtree) = builder.sentence(&rows)? {
            dtrees.push(dtree);
            if let Some(fields) = fields {
                fields.push(rows);
            }
        }
        Ok(())
    }

    /// One EM iteration: the counts accumulated so far become the
    /// parameters, then the expected counts are re-estimated over every
    /// tree. Returns the corpus log-probability (log-neg, offset by
    /// `bigram_total * ln(bigram_total)`).
    pub fn step(&mut self) -> LogProb {
        let EMState {
            dtrees,
            params,
            bigram_total,
            ..
        } = self;

        for pc in params.pcs.iter_mut() {
            pc.prob = pc.count;
            pc.count = f64::INFINITY;
        }

        let mut corpus_prob = if *bigram_total > 0.0 {
            *bigram_total * bigram_total.ln()
        } else {
            0.0
        };
        for dtree in dtrees.iter_mut() {
            tree_estimation(dtree, log_max, &params.pcs);

            let sum = tree_sum_estimation(dtree, log_add);
            corpus_prob += sum;

            let outside_probs = vec![-sum; dtree.choices.len()];
            tree_counting(params, dtree, &outside_probs);
        }
        corpus_prob
    }

    /// Number of tokens seen (plus smoothing pseudocounts).
    pub fn unigram_count(&self) -> usize {
        self.unigram_total as usize
    }

    /// Number of head/modifier edges seen.
    pub fn bigram_count(&self) -> usize {
        self.bigram_total as usize
    }
}

/// Per-sentence tree construction: morphological lookup, ranking filter and
/// count initialisation, writing into the shared parameter store.
struct Builder<'a, G> {
    grammar: &'a G,
    concr: &'a dyn Morphology,
    callbacks: &'a HashMap<String, RankingCallback>,
    params: &'a mut ParamStore,
    bigram_smoothing: LogProb,
    unigram_total: &'a mut f64,
    bigram_total: &'a mut f64,
}

impl<'a, G: Grammar> Builder<'a, G> {
    /// Builds and filters the tree rooted at the row with head id "0", or
    /// returns `None` when the sentence has no such row.
    fn sentence(&mut self, rows: &[ConllRow]) -> Result<Option<DepTree>, EmError> {
        for (i, row) in rows.iter().enumerate() {
            if row.head() == "0" {
                let mut dtree = self.build(rows, i);
                self.filter(&mut dtree, rows, &[])?;
                return Ok(Some(dtree));
            }
        }
        Ok(None)
    }

    fn build(&mut self, rows: &[ConllRow], index: usize) -> DepTree {
        let id = rows[index].id();
        let n_children = rows.iter().filter(|row| row.head() == id).count();

        let mut choices = Vec::new();
        self.lookup(rows[index].form(), &mut choices);
        if choices.is_empty() {
            // retry with the surface form lowercased per code point
            let lower: String = rows[index]
                .form()
                .chars()
                .flat_map(char::to_lowercase)
                .collect();
            self.lookup(&lower, &mut choices);
        }
        *self.unigram_total += 1.0;

        let mut children = Vec::with_capacity(n_children);
        for (i, row) in rows.iter().enumerate() {
            if row.head() == id {
                children.push(self.build(rows, i));
                *self.bigram_total += 1.0;
            }
        }

        DepTree {
            index,
            choices,
            children,
        }
    }

    /// Appends one choice per analysis of `surface`, suppressing duplicate
    /// lemmas.
    fn lookup(&mut self, surface: &str, choices: &mut Vec<SenseChoice>) {
        let concr = self.concr;
        let params = &mut *self.params;
        concr.lookup_morpho(surface, &mut |lemma, _analysis, _prob| {
            let id = params.fun_or_insert(lemma, 0.0, f64::INFINITY);
            if !choices.iter().any(|choice| choice.stats == id) {
                choices.push(SenseChoice {
                    stats: id,
                    prob: 0.0,
                    prob_counts: Vec::new(),
                });
            }
        });
    }

    /// Top-down ranking filter followed by count initialisation. The filter
    /// runs before any bigram cell is linked, so the parent alignment of
    /// `prob_counts` is established once and never disturbed.
    fn filter(
        &mut self,
        dtree: &mut DepTree,
        rows: &[ConllRow],
        parent_choices: &[SenseChoice],
    ) -> Result<(), EmError> {
        let mut ranks = Vec::with_capacity(dtree.choices.len());
        for choice in &dtree.choices {
            let fun = self.params.name(choice.stats);
            let cat = self
                .grammar
                .function_type(fun)
                .ok_or_else(|| EmError::UnknownFunction(fun.to_string()))?;
            let rank = match self.callbacks.get(cat) {
                Some(callback) => callback(choice, rows, dtree),
                None => (0, 0),
            };
            ranks.push(rank);
        }
        let best = best_pair(&ranks);
        let mut i = 0;
        dtree.choices.retain(|_| {
            let keep = ranks[i] == best;
            i += 1;
            keep
        });

        self.init_counts(dtree, parent_choices)?;

        let DepTree {
            choices, children, ..
        } = dtree;
        for child in children.iter_mut() {
            self.filter(child, rows, choices)?;
        }
        Ok(())
    }

    /// Credits each choice with a uniform share of one observation and links
    /// its bigram cells to the parent's choices, creating missing cells with
    /// their back-off prior.
    fn init_counts(
        &mut self,
        dtree: &mut DepTree,
        parent_choices: &[SenseChoice],
    ) -> Result<(), EmError> {
        let n_choices = dtree.choices.len();
        let n_parent_choices = parent_choices.len();

        let p1 = (n_choices as f64).ln();
        let p2 = p1 + (n_parent_choices as f64).ln();

        for choice in &mut dtree.choices {
            choice.prob = 0.0;
            let pc = self.params.stats[choice.stats].pc;
            self.params.pcs[pc].count = log_add(self.params.pcs[pc].count, p1);

            choice.prob_counts = Vec::with_capacity(n_parent_choices);
            for parent_choice in parent_choices {
                let pc = match self.params.stats[parent_choice.stats].mods.get(&choice.stats) {
                    Some(&pc) => pc,
                    None => {
                        let back_off =
                            grammar_prob(self.grammar, self.params.name(parent_choice.stats))?
                                + grammar_prob(self.grammar, self.params.name(choice.stats))?;
                        self.params.bigram_or_insert(
                            parent_choice.stats,
                            choice.stats,
                            self.bigram_smoothing + back_off,
                        )
                    }
                };
                choice.prob_counts.push(pc);
                self.params.pcs[pc].count = log_add(self.params.pcs[pc].count, p2);
            }
        }
        Ok(())
    }
}

/// Top-down outside pass: adds each head choice's posterior into its unigram
/// cell and each (head choice, child choice) posterior into the shared
/// bigram cell, propagating outside weights to the children.
fn tree_counting(params: &mut ParamStore, dtree: &DepTree, outside_probs: &[LogProb]) {
    for (j, head_choice) in dtree.choices.iter().enumerate() {
        let prob = outside_probs[j] + head_choice.prob;
        let pc = params.stats[head_choice.stats].pc;
        params.pcs[pc].count = log_add(params.pcs[pc].count, prob);
    }

    for child in &dtree.children {
        let mut child_outside_probs = vec![f64::INFINITY; child.choices.len()];

        if !dtree.choices.is_empty() {
            for (j, head_choice) in dtree.choices.iter().enumerate() {
                if head_choice.prob < f64::INFINITY {
                    let prob = outside_probs[j] + head_choice.prob
                        - tree_edge_estimation(j, child, log_add, &params.pcs);

                    for (k, mod_choice) in child.choices.iter().enumerate() {
                        let pc = mod_choice.prob_counts[j];
                        let p1 = prob + params.pcs[pc].prob;
                        let p2 = p1 + mod_choice.prob;
                        child_outside_probs[k] = log_add(child_outside_probs[k], p1);
                        params.pcs[pc].count = log_add(params.pcs[pc].count, p2);
                    }
                }
            }
        } else {
            let sum = tree_sum_estimation(child, log_add);
            for p in child_outside_probs.iter_mut() {
                *p = -sum;
            }
        }

        tree_counting(params, child, &child_outside_probs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::em::grammar::TableGrammar;
    use crate::em::tree::match_label;
    use std::fs;

    const S1_TREEBANK: &str = "1\tdogs\tdog\t_\t_\t_\t2\tnsubj\t_\t_\n\
                               2\trun\t_\t_\t_\t_\t0\troot\t_\t_\n\
                               \n\
                               1\tthe\t_\t_\t_\t_\t2\tdet\t_\t_\n\
                               2\tdog\tdog\t_\t_\t_\t0\troot\t_\t_\n\
                               \n";

    fn toy_grammar() -> TableGrammar {
        "cat: C # 1.0
         fun: run_V -> C # 0.4
         fun: run_N -> C # 0.1
         fun: dog_N -> C # 0.5
         word: eng dogs -> dog_N
         word: eng run -> run_V
         word: eng run -> run_N
         word: eng dog -> dog_N"
            .parse()
            .unwrap()
    }

    fn import(treebank: &str) -> EMState<TableGrammar> {
        let mut state = EMState::new(toy_grammar());
        state.setup_preserve_trees();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treebank.conll");
        fs::write(&path, treebank).unwrap();
        state.import_treebank(Some(&path), "eng").unwrap();
        state
    }

    #[test]
    fn test_s1_import() {
        let state = import(S1_TREEBANK);
        assert_eq!(state.trees().len(), 2);
        assert_eq!(state.unigram_count(), 4);
        assert_eq!(state.bigram_count(), 2);

        let root = &state.trees()[0];
        let names: Vec<&str> = root
            .choices()
            .iter()
            .map(|choice| state.fun_name(choice.fun()))
            .collect();
        assert_eq!(names, vec!["run_V", "run_N"]);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].index, 0);
    }

    #[test]
    fn test_single_cell_sharing() {
        // the same corpus twice, so the pair cells recur across trees
        let state = import(&format!("{}{}", S1_TREEBANK, S1_TREEBANK));
        let run_v = state.fun_id("run_V").unwrap();
        let run_n = state.fun_id("run_N").unwrap();
        let dog_n = state.fun_id("dog_N").unwrap();

        let first = &state.trees()[0].children[0].choices()[0];
        let third = &state.trees()[2].children[0].choices()[0];
        assert_eq!(first.prob_counts, third.prob_counts);
        assert_eq!(first.prob_counts[0], state.params.stats[run_v].mods[&dog_n]);
        assert_eq!(first.prob_counts[1], state.params.stats[run_n].mods[&dog_n]);
    }

    #[test]
    fn test_monotone_likelihood() {
        let mut state = import(S1_TREEBANK);
        let mut prev = state.step();
        for _ in 0..7 {
            let next = state.step();
            assert!(next <= prev + 1e-9 * prev.abs().max(1.0));
            prev = next;
        }
    }

    #[test]
    fn test_normalization_discipline() {
        let mut state = import(S1_TREEBANK);
        let before: Vec<LogProb> = state.params.pcs.iter().map(|pc| pc.count).collect();
        state.step();
        for (pc, count) in state.params.pcs.iter().zip(before) {
            assert_eq!(pc.prob, count);
        }

        // without trees, nothing is counted back in
        let mut empty = EMState::new(toy_grammar());
        empty.setup_unigram_smoothing(0.5);
        let corpus_prob = empty.step();
        assert_eq!(corpus_prob, 0.0);
        assert!(empty.params.pcs.iter().all(|pc| pc.count == f64::INFINITY));
    }

    #[test]
    fn test_pass_through_modifier() {
        // S2: the modifier "the" has no candidates
        let mut state = import(
            "1\tthe\t_\t_\t_\t_\t2\tdet\t_\t_\n\
             2\tdog\tdog\t_\t_\t_\t0\troot\t_\t_\n\
             \n",
        );
        assert_eq!(state.trees().len(), 1);
        assert!(state.trees()[0].children[0].choices().is_empty());
        assert!(state.fun_id("the").is_err());
        assert_eq!(state.params.pcs.len(), 1);

        state.step();
        // still only the dog_N unigram cell, and the pass-through edge
        // carries no penalty
        assert_eq!(state.params.pcs.len(), 1);
        let dtree = &state.trees()[0];
        assert_eq!(tree_sum_estimation(dtree, log_add), 0.0);
        assert_eq!(dtree.choices()[0].prob(), 0.0);
    }

    #[test]
    fn test_case_fallback() {
        // S5: "Dogs" only analyses after lowercasing
        let state = import("1\tDogs\tdog\t_\t_\t_\t0\troot\t_\t_\n\n");
        let root = &state.trees()[0];
        assert_eq!(root.choices().len(), 1);
        assert_eq!(state.fun_name(root.choices()[0].fun()), "dog_N");
    }

    #[test]
    fn test_unigram_smoothing_seeds_all_functions() {
        let mut state = EMState::new(toy_grammar());
        state.setup_unigram_smoothing(0.25);
        assert_eq!(state.params.stats.len(), 3);
        assert_eq!(state.unigram_total, 0.75);
        let expected = -(0.25f64).ln();
        assert!(state
            .params
            .pcs
            .iter()
            .all(|pc| (pc.count - expected).abs() < 1e-12));
    }

    #[test]
    fn test_ranker_filter() {
        // S3: a "root" node with two V candidates and one N candidate
        let grammar: TableGrammar = "cat: V # 0.5
                                     cat: N # 0.5
                                     fun: shoot_V1 -> V # 0.3
                                     fun: shoot_V2 -> V # 0.3
                                     fun: shoot_N -> N # 0.4
                                     word: eng shoot -> shoot_V1
                                     word: eng shoot -> shoot_V2
                                     word: eng shoot -> shoot_N"
            .parse()
            .unwrap();
        let mut state = EMState::new(grammar);
        state.set_ranking_callback(
            "V",
            Box::new(|_choice, rows, node| {
                if match_label(rows, node, "root") {
                    (1, 0)
                } else {
                    (0, 0)
                }
            }),
        );

        let rows: Vec<ConllRow> = vec!["1\tshoot\t_\t_\t_\t_\t0\troot\t_\t_".parse().unwrap()];
        let dtree = state.new_conll_dep_tree("eng", &rows).unwrap();
        let names: Vec<&str> = dtree
            .choices()
            .iter()
            .map(|choice| state.fun_name(choice.fun()))
            .collect();
        assert_eq!(names, vec!["shoot_V1", "shoot_V2"]);

        // with no candidate ranked higher, everything survives
        let rows: Vec<ConllRow> = vec!["1\tshoot\t_\t_\t_\t_\t0\tdep\t_\t_".parse().unwrap()];
        let dtree = state.new_conll_dep_tree("eng", &rows).unwrap();
        assert_eq!(dtree.choices().len(), 3);
    }

    #[test]
    fn test_best_pair_is_idempotent() {
        let ranks = [(1, 5), (0, 0), (1, 3)];
        let best = best_pair(&ranks);
        assert_eq!(best, (1, 3));

        // filtering keeps the pairs equal to the best; a second application
        // over the survivors changes nothing
        let survivors: Vec<(i32, i32)> =
            ranks.iter().cloned().filter(|&rank| rank == best).collect();
        assert_eq!(best_pair(&survivors), best);
        assert!(survivors.iter().all(|&rank| rank == best));
    }

    #[test]
    fn test_new_dep_tree() {
        let mut state = EMState::new(toy_grammar());
        let mut root = state.new_dep_tree(None, "run_V", "root", 1, 1).unwrap();
        let child = state
            .new_dep_tree(Some(&root), "dog_N", "nsubj", 0, 0)
            .unwrap();
        root.children.push(child);

        assert_eq!(state.unigram_count(), 2);
        assert_eq!(state.bigram_count(), 1);
        let run_v = state.fun_id("run_V").unwrap();
        let dog_n = state.fun_id("dog_N").unwrap();
        assert_eq!(
            root.children[0].choices()[0].prob_counts,
            vec![state.params.stats[run_v].mods[&dog_n]]
        );

        // the root itself has no parent, so no bigram cells
        assert!(root.choices()[0].prob_counts.is_empty());

        let err = state.new_dep_tree(Some(&root), "zap_X", "dep", 2, 0);
        assert!(matches!(err, Err(EmError::UnknownFunction(_))));
    }

    #[test]
    fn test_import_errors() {
        let dir = tempfile::tempdir().unwrap();

        let unterminated = dir.path().join("unterminated.conll");
        fs::write(&unterminated, "1\tdog\tdog\t_\t_\t_\t0\troot\t_\t_").unwrap();
        let mut state = EMState::new(toy_grammar());
        assert!(matches!(
            state.import_treebank(Some(&unterminated), "eng"),
            Err(EmError::MalformedLine(_))
        ));

        let excess = dir.path().join("excess.conll");
        fs::write(&excess, "1\t2\t3\t4\t5\t6\t7\t8\t9\t10\t11\n\n").unwrap();
        let mut state = EMState::new(toy_grammar());
        assert!(matches!(
            state.import_treebank(Some(&excess), "eng"),
            Err(EmError::MalformedLine(_))
        ));

        let mut state = EMState::new(toy_grammar());
        assert!(matches!(
            state.import_treebank(Some(&excess), "swe"),
            Err(EmError::UnknownLanguage(_))
        ));

        let missing = dir.path().join("missing.conll");
        let mut state = EMState::new(toy_grammar());
        assert!(matches!(
            state.import_treebank(Some(&missing), "eng"),
            Err(EmError::Io(_))
        ));
    }

    #[test]
    fn test_import_comments_and_eof_flush() {
        // a comment line, and no blank line after the last sentence
        let state = import(
            "# sent_id = 1\n\
             1\tdog\tdog\t_\t_\t_\t0\troot\t_\t_\n",
        );
        assert_eq!(state.trees().len(), 1);
        assert_eq!(state.unigram_count(), 1);
    }
}
