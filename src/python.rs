//! Python bindings, built with the `python` feature.
//!
//! ```python
//! from hinditok._hinditok import DevanagariTokenizer
//!
//! tok = DevanagariTokenizer()
//! tok.train(corpus, 1024, verbose=True)
//! tok.register_special_tokens({"<|endoftext|>": 1024})
//! ids = tok.encode("नमस्ते<|endoftext|>", allowed_special="all")
//! assert tok.decode(ids) == "नमस्ते<|endoftext|>"
//! ```

use std::collections::{HashMap, HashSet};

use pyo3::{exceptions::PyValueError, prelude::*};

use crate::{
    splitter::DEVANAGARI_SPLIT_PATTERN,
    tokenizer::{AllowedSpecial, DevanagariTokenizer},
    types::Token,
};

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// `allowed_special` as passed from Python: a policy name or a set of tokens.
#[derive(FromPyObject)]
enum PyAllowedSpecial {
    Policy(String),
    Tokens(HashSet<String>),
}

impl TryFrom<PyAllowedSpecial> for AllowedSpecial {
    type Error = PyErr;

    fn try_from(value: PyAllowedSpecial) -> Result<Self, Self::Error> {
        match value {
            PyAllowedSpecial::Policy(name) => name.parse().map_err(value_error),
            PyAllowedSpecial::Tokens(tokens) => Ok(AllowedSpecial::Subset(tokens)),
        }
    }
}

/// Python wrapper for [`DevanagariTokenizer`].
#[pyclass(name = "DevanagariTokenizer")]
pub struct PyDevanagariTokenizer {
    inner: DevanagariTokenizer,
}

#[pymethods]
impl PyDevanagariTokenizer {
    #[new]
    #[pyo3(signature = (pattern=None))]
    fn new(pattern: Option<&str>) -> PyResult<Self> {
        let inner = match pattern {
            Some(pattern) => DevanagariTokenizer::with_pattern(pattern),
            None => DevanagariTokenizer::new(),
        }
        .map_err(value_error)?;

        Ok(Self { inner })
    }

    /// Learns `vocab_size - 256` merges from `text`.
    #[pyo3(signature = (text, vocab_size, verbose=false))]
    fn train(&mut self, text: &str, vocab_size: usize, verbose: bool) -> PyResult<()> {
        self.inner
            .train(text, vocab_size, verbose)
            .map(|_summary| ())
            .map_err(value_error)
    }

    /// Replaces the special-token table.
    fn register_special_tokens(&mut self, special_tokens: HashMap<String, Token>) {
        self.inner.register_special_tokens(special_tokens);
    }

    fn encode_ordinary(&self, text: &str) -> PyResult<Vec<Token>> {
        self.inner.encode_ordinary(text).map_err(value_error)
    }

    /// Encodes `text`; `allowed_special` is "all", "none", "none_raise" or a
    /// set of special tokens.
    #[pyo3(signature = (text, allowed_special=None))]
    fn encode(&self, text: &str, allowed_special: Option<PyAllowedSpecial>) -> PyResult<Vec<Token>> {
        let allowed = match allowed_special {
            Some(value) => AllowedSpecial::try_from(value)?,
            None => AllowedSpecial::default(),
        };
        self.inner.encode(text, &allowed).map_err(value_error)
    }

    fn decode(&self, ids: Vec<Token>) -> PyResult<String> {
        self.inner.decode(&ids).map_err(value_error)
    }

    #[getter]
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    /// Merges as `((left, right), token)` in training order.
    #[getter]
    fn merges(&self) -> Vec<((Token, Token), Token)> {
        self.inner
            .merges()
            .iter()
            .map(|&(pair, tok)| ((pair.0, pair.1), tok))
            .collect()
    }

    #[getter]
    fn pattern(&self) -> &str {
        self.inner.pattern()
    }
}

#[pymodule]
fn _hinditok(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let _ = pyo3_log::init();
    m.add_class::<PyDevanagariTokenizer>()?;
    m.add("DEVANAGARI_SPLIT_PATTERN", DEVANAGARI_SPLIT_PATTERN)?;
    Ok(())
}
