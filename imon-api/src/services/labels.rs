//! Random label assignment for donors

use std::sync::Arc;

use imon_common::{RandomSource, Wordlist};

pub struct LabelService {
    wordlist: Arc<Wordlist>,
    random: Arc<dyn RandomSource>,
}

impl LabelService {
    pub fn new(wordlist: Arc<Wordlist>, random: Arc<dyn RandomSource>) -> Self {
        Self { wordlist, random }
    }

    /// One label drawn uniformly from the wordlist; `None` only if it is empty
    pub fn random_label(&self) -> Option<&str> {
        let index = self.random.pick(self.wordlist.len())?;
        self.wordlist.get(index)
    }
}
