use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::vocab::{Vocabulary, ROOT_ID, UNKNOWN_ID};

/// Word and tag lookup tables.
///
/// Also used as the gradient buffer for itself: a zeroed clone accumulates
/// the scatter-added row gradients of one backward pass.
#[derive(Debug, Clone)]
pub(crate) struct Embeddings {
    /// V_w x D_w word table
    pub(crate) word: Array2<f64>,
    /// V_t x D_t tag table
    pub(crate) tag: Array2<f64>,
}

impl Embeddings {
    pub(crate) fn new(
        num_words: usize,
        word_dim: usize,
        num_tags: usize,
        tag_dim: usize,
        pretrained: Option<&Array2<f64>>,
        rng: &mut StdRng,
    ) -> Self {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let word = match pretrained {
            Some(table) => table.clone(),
            None => Array2::from_shape_fn((num_words, word_dim), |_| normal.sample(rng)),
        };
        let tag = Array2::from_shape_fn((num_tags, tag_dim), |_| normal.sample(rng));
        Self { word, tag }
    }

    pub(crate) fn zeros_like(&self) -> Self {
        Self {
            word: Array2::zeros(self.word.raw_dim()),
            tag: Array2::zeros(self.tag.raw_dim()),
        }
    }

    pub(crate) fn word_dim(&self) -> usize {
        self.word.ncols()
    }

    pub(crate) fn tag_dim(&self) -> usize {
        self.tag.ncols()
    }

    /// Gather and concatenate: row t is `[word_emb[w_t] | tag_emb[g_t]]`.
    pub(crate) fn forward(&self, words: &[u32], tags: &[u32]) -> Array2<f64> {
        let len = words.len();
        let word_dim = self.word_dim();
        let tag_dim = self.tag_dim();
        let mut out = Array2::zeros((len, word_dim + tag_dim));
        for t in 0..len {
            out.slice_mut(s![t, ..word_dim])
                .assign(&self.word.row(words[t] as usize));
            out.slice_mut(s![t, word_dim..])
                .assign(&self.tag.row(tags[t] as usize));
        }
        out
    }

    /// Scatter-add the output gradient back onto the table rows that were
    /// gathered in the forward pass (the post-dropout ids).
    pub(crate) fn backward(
        &self,
        words: &[u32],
        tags: &[u32],
        d_out: &Array2<f64>,
        grads: &mut Embeddings,
    ) {
        let word_dim = self.word_dim();
        for t in 0..words.len() {
            grads
                .word
                .row_mut(words[t] as usize)
                .scaled_add(1.0, &d_out.slice(s![t, ..word_dim]));
            grads
                .tag
                .row_mut(tags[t] as usize)
                .scaled_add(1.0, &d_out.slice(s![t, word_dim..]));
        }
    }
}

/// Frequency-sensitive word dropout.
///
/// Each token whose word id is neither the root nor the unknown id fires
/// with probability alpha / (alpha + freq(word)); a fired token has both its
/// word and tag id replaced by the unknown ids. Works on a copy: the
/// caller's slices and the vocabulary are left untouched, and outcomes are
/// resampled on every call.
pub(crate) fn apply_word_dropout(
    words: &[u32],
    tags: &[u32],
    vocab: &Vocabulary,
    alpha: f64,
    rng: &mut StdRng,
) -> (Vec<u32>, Vec<u32>) {
    let mut words = words.to_vec();
    let mut tags = tags.to_vec();
    for t in 0..words.len() {
        let id = words[t];
        if id == ROOT_ID || id == UNKNOWN_ID {
            continue;
        }
        let freq = vocab.word_frequency(id) as f64;
        let fire_prob = alpha / (alpha + freq);
        if rng.gen::<f64>() < fire_prob {
            words[t] = UNKNOWN_ID;
            tags[t] = UNKNOWN_ID;
        }
    }
    (words, tags)
}
