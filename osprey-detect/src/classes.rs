use tracing::warn;

use crate::{Error, Result};

/// The detector's class vocabulary, one label per line.
///
/// COCO-trained detectors ship 80 labels; the loader only insists the file is
/// nonempty so other vocabularies keep working.
#[derive(Debug, Clone)]
pub struct ClassVocabulary {
    names: Vec<String>,
}

impl ClassVocabulary {
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let names: Vec<String> = contents
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if names.is_empty() {
            return Err(Error::EmptyVocabulary);
        }
        if names.len() != 80 {
            warn!(count = names.len(), "class vocabulary is not 80 labels");
        }
        Ok(Self { names })
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
