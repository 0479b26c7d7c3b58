//! The grammar collaborator.
//!
//! The engine never analyses surface forms itself; it consults a grammar for
//! morphological lookup, for the result category of a function symbol and for
//! the category/function priors that make up the back-off of unseen bigrams.
//! [`TableGrammar`] is an in-memory implementation loaded from a small
//! line-oriented text format.

use crate::em::logmath::{from_prob, LogProb};
use crate::em::EmError;
use log_domain::LogDomain;
use num_traits::{One, Zero};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Morphological lookup of one concrete language.
pub trait Morphology {
    /// Invokes `callback` once per analysis of `surface`, with the lemma
    /// (an abstract function symbol), the analysis string and its
    /// probability.
    fn lookup_morpho(&self, surface: &str, callback: &mut dyn FnMut(&str, &str, LogDomain<f64>));
}

/// The abstract grammar: function typing, priors and concrete languages.
pub trait Grammar {
    /// The concrete language registered under `lang`, if any.
    fn language(&self, lang: &str) -> Option<&dyn Morphology>;

    /// The result category of `fun`, or `None` for symbols the grammar does
    /// not know.
    fn function_type(&self, fun: &str) -> Option<&str>;

    fn category_prob(&self, cat: &str) -> LogDomain<f64>;

    fn function_prob(&self, fun: &str) -> LogDomain<f64>;

    /// Enumerates every known function symbol.
    fn iter_functions(&self, callback: &mut dyn FnMut(&str));
}

/// Prior of a function as a log-neg value: category prior times function
/// prior. Fails if the grammar cannot type the symbol.
pub(crate) fn grammar_prob<G: Grammar>(grammar: &G, fun: &str) -> Result<LogProb, EmError> {
    let cat = grammar
        .function_type(fun)
        .ok_or_else(|| EmError::UnknownFunction(fun.to_string()))?;
    Ok(from_prob(grammar.category_prob(cat)) + from_prob(grammar.function_prob(fun)))
}

/// The lexicon of one concrete language: surface form to analyses.
#[derive(Debug, Default)]
pub struct Lexicon {
    entries: BTreeMap<String, Vec<(String, String, LogDomain<f64>)>>,
}

impl Morphology for Lexicon {
    fn lookup_morpho(&self, surface: &str, callback: &mut dyn FnMut(&str, &str, LogDomain<f64>)) {
        if let Some(analyses) = self.entries.get(surface) {
            for (fun, analysis, prob) in analyses {
                callback(fun, analysis, *prob);
            }
        }
    }
}

/// A grammar held in ordered tables, so that function enumeration and
/// everything derived from it is deterministic.
#[derive(Debug, Default)]
pub struct TableGrammar {
    cats: BTreeMap<String, LogDomain<f64>>,
    funs: BTreeMap<String, (String, LogDomain<f64>)>,
    langs: BTreeMap<String, Lexicon>,
}

impl TableGrammar {
    pub fn new() -> TableGrammar {
        TableGrammar::default()
    }

    pub fn add_category(&mut self, cat: &str, prob: LogDomain<f64>) {
        self.cats.insert(cat.to_string(), prob);
    }

    pub fn add_function(&mut self, fun: &str, cat: &str, prob: LogDomain<f64>) {
        self.funs
            .insert(fun.to_string(), (cat.to_string(), prob));
    }

    pub fn add_word(
        &mut self,
        lang: &str,
        surface: &str,
        fun: &str,
        analysis: &str,
        prob: LogDomain<f64>,
    ) {
        self.langs
            .entry(lang.to_string())
            .or_insert_with(Lexicon::default)
            .entries
            .entry(surface.to_string())
            .or_insert_with(Vec::new)
            .push((fun.to_string(), analysis.to_string(), prob));
    }

    /// Loads a grammar from a `cat:`/`fun:`/`word:` file.
    pub fn from_path(path: &Path) -> Result<TableGrammar, EmError> {
        let contents = fs::read_to_string(path)?;
        contents.parse().map_err(EmError::MalformedLine)
    }
}

impl Grammar for TableGrammar {
    fn language(&self, lang: &str) -> Option<&dyn Morphology> {
        self.langs.get(lang).map(|l| l as &dyn Morphology)
    }

    fn function_type(&self, fun: &str) -> Option<&str> {
        self.funs.get(fun).map(|(cat, _)| cat.as_str())
    }

    fn category_prob(&self, cat: &str) -> LogDomain<f64> {
        self.cats.get(cat).cloned().unwrap_or_else(LogDomain::zero)
    }

    fn function_prob(&self, fun: &str) -> LogDomain<f64> {
        self.funs
            .get(fun)
            .map(|(_, prob)| *prob)
            .unwrap_or_else(LogDomain::zero)
    }

    fn iter_functions(&self, callback: &mut dyn FnMut(&str)) {
        for fun in self.funs.keys() {
            callback(fun);
        }
    }
}

/// Splits a declaration into its body and its `# prob` suffix; a missing
/// suffix means probability 1.
fn split_prob(line: &str) -> Result<(&str, LogDomain<f64>), String> {
    let mut parts = line.splitn(2, '#');
    let body = parts.next().unwrap();
    match parts.next() {
        None => Ok((body, LogDomain::one())),
        Some(prob) => {
            let value: f64 = prob
                .trim()
                .parse()
                .map_err(|_| format!("Malformed probability in: {}", line))?;
            let prob = LogDomain::new(value)
                .map_err(|_| format!("Probability out of range in: {}", line))?;
            Ok((body, prob))
        }
    }
}

impl FromStr for TableGrammar {
    type Err = String;

    /// Parses declarations of the forms
    ///
    /// ```text
    /// cat: N # 0.5
    /// fun: dog_N -> N # 0.5
    /// word: eng dogs -> dog_N dog+PL # 1.0
    /// ```
    ///
    /// with `%` starting a comment line. The analysis field of a `word:`
    /// declaration is optional; every function a `word:` line refers to must
    /// be declared by a `fun:` line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut grammar = TableGrammar::new();

        for line in s.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') {
                continue;
            }

            let (body, prob) = split_prob(line)?;
            let tokens: Vec<&str> = body.split_whitespace().collect();
            match tokens.as_slice() {
                ["cat:", cat] => {
                    grammar.add_category(cat, prob);
                }
                ["fun:", fun, "->", cat] => {
                    grammar.add_function(fun, cat, prob);
                }
                ["word:", lang, surface, "->", fun] => {
                    grammar.add_word(lang, surface, fun, "", prob);
                }
                ["word:", lang, surface, "->", fun, analysis] => {
                    grammar.add_word(lang, surface, fun, analysis, prob);
                }
                _ => {
                    return Err(format!("Malformed declaration: {}", line));
                }
            }
        }

        for lexicon in grammar.langs.values() {
            for analyses in lexicon.entries.values() {
                for (fun, _, _) in analyses {
                    if !grammar.funs.contains_key(fun) {
                        return Err(format!("Undeclared function: {}", fun));
                    }
                }
            }
        }

        Ok(grammar)
    }
}
