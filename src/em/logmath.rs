//! Log-space primitives.
//!
//! Every probability inside the engine is a *log-negative* value: `v` stands
//! for the probability `exp(-v)`, so `0.0` is certainty and `f64::INFINITY`
//! is probability 0. Adding log-neg values multiplies probabilities;
//! probability addition and maximum are the two combiners below. Outside
//! weights and expected counts may exceed probability 1, which is why the
//! engine works on raw `f64` rather than `LogDomain` and converts at the
//! public boundary with [`from_prob`].

use log_domain::LogDomain;

/// A log-negative probability: `v` represents `exp(-v)`.
pub type LogProb = f64;

/// Combiner over log-neg values. The estimation routines are parameterised
/// over this: [`log_add`] gives EM sums, [`log_max`] Viterbi maxima.
pub type Oper = fn(LogProb, LogProb) -> LogProb;

/// `-ln(exp(-x) + exp(-y))`, branching on the infinity sentinels before
/// anything is exponentiated so the argument of `ln_1p` stays in (-1, 0].
pub fn log_add(x: LogProb, y: LogProb) -> LogProb {
    if x == f64::INFINITY {
        return y;
    }
    if y == f64::INFINITY {
        return x;
    }
    if x < y {
        x - (x - y).exp().ln_1p()
    } else {
        y - (y - x).exp().ln_1p()
    }
}

/// The larger probability is the smaller log-neg value.
pub fn log_max(x: LogProb, y: LogProb) -> LogProb {
    if x < y {
        x
    } else {
        y
    }
}

/// Converts a linear-domain probability from the public boundary into the
/// engine's log-neg convention.
pub fn from_prob(p: LogDomain<f64>) -> LogProb {
    -p.ln()
}
