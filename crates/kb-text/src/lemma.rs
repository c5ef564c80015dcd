//! Lemma dictionaries.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::OnceLock;

use kb_core::{KbError, Result};
use tracing::info;

/// Maps an inflected token to its dictionary form.
pub trait Lemmatizer: Send + Sync {
    /// Return the lemma of a lowercase token, or the token itself when unknown.
    fn lemmatize<'a>(&'a self, token: &'a str) -> &'a str;
}

/// Built-in French forms (form, lemma): articles, contractions, pronouns
/// and the auxiliaries that dominate user questions.
const BUILTIN_FR: &[(&str, &str)] = &[
    ("la", "le"),
    ("les", "le"),
    ("l'", "le"),
    ("l’", "le"),
    ("des", "de"),
    ("du", "de"),
    ("d'", "de"),
    ("d’", "de"),
    ("au", "à"),
    ("aux", "à"),
    ("une", "un"),
    ("qu'", "que"),
    ("qu’", "que"),
    ("c'", "ce"),
    ("c’", "ce"),
    ("cette", "ce"),
    ("ces", "ce"),
    ("cet", "ce"),
    ("j'", "je"),
    ("n'", "ne"),
    ("s'", "se"),
    ("m'", "me"),
    ("t'", "te"),
    ("quelle", "quel"),
    ("quels", "quel"),
    ("quelles", "quel"),
    ("est", "être"),
    ("sont", "être"),
    ("suis", "être"),
    ("es", "être"),
    ("sommes", "être"),
    ("êtes", "être"),
    ("était", "être"),
    ("étaient", "être"),
    ("sera", "être"),
    ("seront", "être"),
    ("soit", "être"),
    ("été", "être"),
    ("a", "avoir"),
    ("ai", "avoir"),
    ("as", "avoir"),
    ("avons", "avoir"),
    ("avez", "avoir"),
    ("ont", "avoir"),
    ("avait", "avoir"),
    ("aura", "avoir"),
    ("eu", "avoir"),
    ("peut", "pouvoir"),
    ("peuvent", "pouvoir"),
    ("doit", "devoir"),
    ("doivent", "devoir"),
    ("faut", "falloir"),
    ("fait", "faire"),
    ("font", "faire"),
    ("faites", "faire"),
];

static BUILTIN: OnceLock<LemmaTable> = OnceLock::new();

/// Form-to-lemma dictionary.
#[derive(Debug, Clone, Default)]
pub struct LemmaTable {
    forms: HashMap<String, String>,
}

impl LemmaTable {
    /// Create an empty table (every token is its own lemma).
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide built-in French table, built on first use.
    pub fn builtin() -> &'static LemmaTable {
        BUILTIN.get_or_init(|| {
            let mut table = Self::new();
            for (form, lemma) in BUILTIN_FR {
                table.insert(*form, *lemma);
            }
            info!("Built-in lemma table initialized with {} forms", table.len());
            table
        })
    }

    /// Load a table from a `lemma<TAB>form` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(std::io::BufReader::new(file))?;
        info!("Loaded {} lemma forms from {:?}", table.len(), path);
        Ok(table)
    }

    /// Parse `lemma<TAB>form` lines; blank lines and `#` comments are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut table = Self::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (lemma, form) = line.split_once('\t').ok_or_else(|| {
                KbError::config(format!(
                    "lemma table line {}: expected `lemma<TAB>form`",
                    line_no + 1
                ))
            })?;
            table.insert(form.trim(), lemma.trim());
        }
        Ok(table)
    }

    /// Register a form; forms are matched lowercase.
    pub fn insert(&mut self, form: impl AsRef<str>, lemma: impl Into<String>) {
        self.forms.insert(form.as_ref().to_lowercase(), lemma.into());
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl Lemmatizer for LemmaTable {
    fn lemmatize<'a>(&'a self, token: &'a str) -> &'a str {
        self.forms.get(token).map(String::as_str).unwrap_or(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_is_shared() {
        let a = LemmaTable::builtin() as *const LemmaTable;
        let b = LemmaTable::builtin() as *const LemmaTable;
        assert_eq!(a, b);
        assert_eq!(LemmaTable::builtin().lemmatize("sont"), "être");
        assert_eq!(LemmaTable::builtin().lemmatize("l'"), "le");
    }

    #[test]
    fn test_unknown_form_is_identity() {
        let table = LemmaTable::new();
        assert_eq!(table.lemmatize("poutre"), "poutre");
    }

    #[test]
    fn test_from_reader() {
        let input = "# comment\nmur\tmurs\n\nporteur\tporteurs\n";
        let table = LemmaTable::from_reader(input.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lemmatize("murs"), "mur");
        assert_eq!(table.lemmatize("porteurs"), "porteur");
    }

    #[test]
    fn test_from_reader_rejects_malformed_line() {
        let err = LemmaTable::from_reader("mur murs\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dalle\tDalles").unwrap();
        let table = LemmaTable::load(file.path()).unwrap();
        assert_eq!(table.lemmatize("dalles"), "dalle");
    }
}
