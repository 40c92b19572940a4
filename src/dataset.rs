/// An instance is one training sentence: id sequences plus its gold tree
///
/// Position 0 always holds the artificial root in all three arrays; the
/// head entry at position 0 is a placeholder and never read.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Word ids, root included
    pub words: Vec<u32>,
    /// Tag ids, root included
    pub tags: Vec<u32>,
    /// Gold head position per modifier position
    pub heads: Vec<usize>,
}

impl Instance {
    pub fn new(words: Vec<u32>, tags: Vec<u32>, heads: Vec<usize>) -> Self {
        Self { words, tags, heads }
    }

    /// Sentence length, root included.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
