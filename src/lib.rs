//! Lexical sense disambiguation trainer.
//!
//! Estimates unigram and bigram probabilities of abstract function symbols
//! ("senses") attached to the nodes of dependency trees by log-likelihood EM,
//! and decodes the best sense per token with a Viterbi pass over the same
//! data structure.

pub mod em;

pub use crate::em::conll::ConllRow;
pub use crate::em::grammar::{Grammar, Morphology, TableGrammar};
pub use crate::em::tree::{match_label, match_pos, match_same_choice, DepTree, FunId, SenseChoice};
pub use crate::em::{EMState, EmError, LemmaProb, RankingCallback};
