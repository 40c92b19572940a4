use std::collections::HashMap;

use crate::error::{Error, Result};

/// Reserved id of the artificial root token in both id spaces.
pub const ROOT_ID: u32 = 0;
/// Reserved id of the unknown-token placeholder in both id spaces.
pub const UNKNOWN_ID: u32 = 1;

/// Surface form stored for the root id.
pub const ROOT_TOKEN: &str = "<root>";
/// Surface form stored for the unknown id.
pub const UNKNOWN_TOKEN: &str = "<unk>";

/// A bidirectional dictionary for mapping between strings and integer IDs
#[derive(Debug, Clone)]
pub struct Dictionary {
    /// Map from string to ID
    str_to_id: HashMap<String, u32>,
    /// Map from ID to string
    id_to_str: Vec<String>,
}

impl Dictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        Self {
            str_to_id: HashMap::new(),
            id_to_str: Vec::new(),
        }
    }

    /// Get the number of entries in the dictionary
    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    /// Returns `true` if the dictionary contains no entries
    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }

    /// Get or create an ID for a string
    /// Returns the ID for the string, creating a new entry if it doesn't exist
    pub fn get_or_insert(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.str_to_id.get(s) {
            id
        } else {
            let id = self.id_to_str.len() as u32;
            self.str_to_id.insert(s.to_string(), id);
            self.id_to_str.push(s.to_string());
            id
        }
    }

    /// Look up the ID for a string without inserting
    pub fn get(&self, s: &str) -> Option<u32> {
        self.str_to_id.get(s).copied()
    }

    /// Look up the string for an ID
    pub fn name(&self, id: u32) -> Option<&str> {
        self.id_to_str.get(id as usize).map(|s| s.as_str())
    }

    /// Iterate over all (string, id) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.id_to_str
            .iter()
            .enumerate()
            .map(|(id, s)| (s.as_str(), id as u32))
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

/// Word and tag inventories of a parser, with per-word occurrence counts.
///
/// Ids 0 and 1 are reserved for the root and unknown placeholders in both
/// id spaces. The counts feed the frequency-sensitive word dropout rule;
/// nothing in a forward pass ever mutates them.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: Dictionary,
    tags: Dictionary,
    /// Occurrence count per word id; parallel to the word dictionary.
    word_counts: Vec<u64>,
}

impl Vocabulary {
    /// Create a vocabulary holding only the reserved entries.
    pub fn new() -> Self {
        let mut words = Dictionary::new();
        let mut tags = Dictionary::new();
        words.get_or_insert(ROOT_TOKEN);
        words.get_or_insert(UNKNOWN_TOKEN);
        tags.get_or_insert(ROOT_TOKEN);
        tags.get_or_insert(UNKNOWN_TOKEN);
        Self {
            words,
            tags,
            word_counts: vec![0, 0],
        }
    }

    /// Rebuild a vocabulary from stored entries (model loading).
    pub(crate) fn from_parts(
        words: Vec<String>,
        word_counts: Vec<u64>,
        tags: Vec<String>,
    ) -> Result<Self> {
        if words.len() != word_counts.len() {
            return Err(Error::invalid_model(
                "word entries and word counts differ in length",
            ));
        }
        if words.len() < 2 || tags.len() < 2 {
            return Err(Error::invalid_model("vocabulary misses reserved entries"));
        }
        if words[ROOT_ID as usize] != ROOT_TOKEN
            || words[UNKNOWN_ID as usize] != UNKNOWN_TOKEN
            || tags[ROOT_ID as usize] != ROOT_TOKEN
            || tags[UNKNOWN_ID as usize] != UNKNOWN_TOKEN
        {
            return Err(Error::invalid_model(
                "reserved vocabulary entries are not at ids 0 and 1",
            ));
        }
        let mut vocab = Self {
            words: Dictionary::new(),
            tags: Dictionary::new(),
            word_counts,
        };
        for w in &words {
            vocab.words.get_or_insert(w);
        }
        for t in &tags {
            vocab.tags.get_or_insert(t);
        }
        if vocab.words.len() != words.len() || vocab.tags.len() != tags.len() {
            return Err(Error::invalid_model("duplicate vocabulary entries"));
        }
        Ok(vocab)
    }

    /// Number of known words, reserved entries included.
    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    /// Number of known tags, reserved entries included.
    pub fn num_tags(&self) -> usize {
        self.tags.len()
    }

    /// Intern a word, counting the occurrence.
    pub fn intern_word(&mut self, word: &str) -> u32 {
        let id = self.words.get_or_insert(word);
        if id as usize == self.word_counts.len() {
            self.word_counts.push(0);
        }
        self.word_counts[id as usize] += 1;
        id
    }

    /// Intern a tag.
    pub fn intern_tag(&mut self, tag: &str) -> u32 {
        self.tags.get_or_insert(tag)
    }

    /// Resolve a word to its id, falling back to [`UNKNOWN_ID`].
    pub fn word_id(&self, word: &str) -> u32 {
        self.words.get(word).unwrap_or(UNKNOWN_ID)
    }

    /// Resolve a tag to its id, falling back to [`UNKNOWN_ID`].
    pub fn tag_id(&self, tag: &str) -> u32 {
        self.tags.get(tag).unwrap_or(UNKNOWN_ID)
    }

    /// Id of a word if it is in the vocabulary, without the unknown fallback.
    pub fn known_word(&self, word: &str) -> Option<u32> {
        self.words.get(word)
    }

    /// Id of a tag if it is in the vocabulary, without the unknown fallback.
    pub fn known_tag(&self, tag: &str) -> Option<u32> {
        self.tags.get(tag)
    }

    /// Surface form of a word id.
    pub fn word(&self, id: u32) -> Option<&str> {
        self.words.name(id)
    }

    /// Surface form of a tag id.
    pub fn tag(&self, id: u32) -> Option<&str> {
        self.tags.name(id)
    }

    /// How often a word id was seen while the vocabulary was built.
    pub fn word_frequency(&self, id: u32) -> u64 {
        self.word_counts.get(id as usize).copied().unwrap_or(0)
    }

    pub(crate) fn word_entries(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.words
            .iter()
            .map(move |(w, id)| (w, self.word_counts[id as usize]))
    }

    pub(crate) fn tag_entries(&self) -> impl Iterator<Item = &str> + '_ {
        self.tags.iter().map(|(t, _)| t)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}
