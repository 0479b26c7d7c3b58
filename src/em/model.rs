//! Model files: dumped unigram/bigram tables and bigram reloading.

use crate::em::grammar::{grammar_prob, Grammar};
use crate::em::logmath::{log_add, LogProb};
use crate::em::{EMState, EmError};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

impl<G: Grammar> EMState<G> {
    /// Loads a previously dumped bigram file. Every grammar function is
    /// first seeded with its grammar prior; each `head\tmod\tprob` line then
    /// inserts a bigram cell whose parameter blends the back-off prior with
    /// the stored value through the bigram smoothing mass. Lines for cells
    /// that already exist are ignored.
    pub fn load_model(&mut self, path: &Path) -> Result<(), EmError> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut funs = Vec::new();
        self.grammar.iter_functions(&mut |fun| funs.push(fun.to_string()));
        for fun in funs {
            let prob = grammar_prob(&self.grammar, &fun)?;
            self.params.fun_or_insert(&fun, prob, f64::INFINITY);
        }

        let bigram_smoothing = self.bigram_smoothing;
        // complement of the smoothing mass
        let bigram_smoothing1m = -(-(-bigram_smoothing).exp()).ln_1p();

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
            let fields: Vec<&str> = text.split('\t').collect();
            if fields.len() != 3 {
                return Err(EmError::MalformedLine(text.to_string()));
            }

            let head = self.fun_id(fields[0])?;
            let modifier = self.fun_id(fields[1])?;
            if !self.params.stats[head].mods.contains_key(&modifier) {
                let back_off = grammar_prob(&self.grammar, fields[0])?
                    + grammar_prob(&self.grammar, fields[1])?;
                let value: f64 = fields[2]
                    .parse()
                    .map_err(|_| EmError::MalformedLine(text.to_string()))?;
                let prob = log_add(
                    bigram_smoothing + back_off,
                    bigram_smoothing1m + value,
                );
                self.params.bigram_or_insert(head, modifier, prob);
            }
        }
        Ok(())
    }

    /// Dumps the learned statistics: per-function and per-category lines to
    /// the unigram file, `head\tmod\tprob` lines to the bigram file. Bigram
    /// entries whose expected count has fallen below 1e-5 are dropped.
    pub fn dump(&self, unigram_path: &Path, bigram_path: &Path) -> Result<(), EmError> {
        // per-category mass of the smoothed unigram parameters
        let mut cat_probs: BTreeMap<String, LogProb> = BTreeMap::new();
        for stats in &self.params.stats {
            let fun = self.params.name(stats.fun);
            let cat = self
                .grammar
                .function_type(fun)
                .ok_or_else(|| EmError::UnknownFunction(fun.to_string()))?;
            let smoothed = log_add(self.params.pcs[stats.pc].prob, self.unigram_smoothing);
            let entry = cat_probs.entry(cat.to_string()).or_insert(f64::INFINITY);
            *entry = log_add(*entry, smoothed);
        }

        let mut funigram = BufWriter::new(File::create(unigram_path)?);
        let mut fbigram = BufWriter::new(File::create(bigram_path)?);

        for stats in &self.params.stats {
            let fun = self.params.name(stats.fun);
            let cat = self
                .grammar
                .function_type(fun)
                .ok_or_else(|| EmError::UnknownFunction(fun.to_string()))?;

            let smoothed = log_add(self.params.pcs[stats.pc].prob, self.unigram_smoothing);
            let val = if smoothed == f64::INFINITY {
                0.0
            } else {
                (cat_probs[cat] - smoothed).exp()
            };
            writeln!(funigram, "{}\t{:e}", fun, val)?;

            for (&modifier, &pc) in &stats.mods {
                let val = (-self.params.pcs[pc].prob).exp() / self.bigram_total;
                if val * self.bigram_total > 0.00001 {
                    writeln!(fbigram, "{}\t{}\t{:e}", fun, self.params.name(modifier), val)?;
                }
            }
        }

        for (cat, prob) in &cat_probs {
            writeln!(funigram, "{}\t{:e}", cat, (-prob).exp())?;
        }

        funigram.flush()?;
        fbigram.flush()?;
        Ok(())
    }
}
