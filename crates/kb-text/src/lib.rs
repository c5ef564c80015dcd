//! kb-text - Query normalization for lexical search
//!
//! Lexical backends index lemmatized, markup-free text, so queries have to
//! go through the same treatment before they are matched.
//!
//! - [`Normalizer`]: strips markdown/HTML markup, collapses whitespace,
//!   lowercases and lemmatizes.
//! - [`LemmaTable`]: form-to-lemma dictionary behind the [`Lemmatizer`]
//!   port, with a process-wide built-in French table.
//!
//! # Example
//!
//! ```rust
//! use kb_text::Normalizer;
//!
//! let normalizer = Normalizer::french();
//! assert_eq!(
//!     normalizer.normalize("## La **toiture** de l'immeuble"),
//!     "le toiture de le immeuble"
//! );
//! ```

mod lemma;
mod normalize;

pub use lemma::{LemmaTable, Lemmatizer};
pub use normalize::{clean_markup, Normalizer};
