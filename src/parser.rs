use std::path::Path;

use ndarray::{Array2, ArrayViewD, ArrayViewMutD};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::decoder;
use crate::embed::{apply_word_dropout, Embeddings};
use crate::error::{Error, Result};
use crate::loss;
use crate::lstm::{BiLstm, LstmTrace};
use crate::scorer::{EdgeScorer, ScorerTrace};
use crate::train::model_writer::ModelWriter;
use crate::vocab::{Vocabulary, ROOT_ID};

/// Parser hyper-parameters with validating builder methods.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    word_dim: usize,
    tag_dim: usize,
    hidden_dim: Option<usize>,
    lstm_layers: usize,
    scorer_hidden_dim: usize,
    word_dropout: bool,
    dropout_alpha: f64,
    seed: Option<u64>,
    pretrained_word_embeddings: Option<Array2<f64>>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            word_dim: 100,
            tag_dim: 25,
            hidden_dim: None,
            lstm_layers: 2,
            scorer_hidden_dim: 100,
            word_dropout: true,
            dropout_alpha: 0.25,
            seed: None,
            pretrained_word_embeddings: None,
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn word_dim(&self) -> usize {
        self.word_dim
    }

    pub fn with_word_dim(mut self, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::invalid_parameter("word_dim must be at least 1"));
        }
        self.word_dim = dim;
        Ok(self)
    }

    pub fn tag_dim(&self) -> usize {
        self.tag_dim
    }

    pub fn with_tag_dim(mut self, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::invalid_parameter("tag_dim must be at least 1"));
        }
        self.tag_dim = dim;
        Ok(self)
    }

    /// Encoder state width per direction; defaults to word_dim + tag_dim.
    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim.unwrap_or(self.word_dim + self.tag_dim)
    }

    pub fn with_hidden_dim(mut self, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::invalid_parameter("hidden_dim must be at least 1"));
        }
        self.hidden_dim = Some(dim);
        Ok(self)
    }

    pub fn lstm_layers(&self) -> usize {
        self.lstm_layers
    }

    pub fn with_lstm_layers(mut self, layers: usize) -> Result<Self> {
        if layers == 0 {
            return Err(Error::invalid_parameter("lstm_layers must be at least 1"));
        }
        self.lstm_layers = layers;
        Ok(self)
    }

    pub fn scorer_hidden_dim(&self) -> usize {
        self.scorer_hidden_dim
    }

    pub fn with_scorer_hidden_dim(mut self, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::invalid_parameter(
                "scorer_hidden_dim must be at least 1",
            ));
        }
        self.scorer_hidden_dim = dim;
        Ok(self)
    }

    pub fn word_dropout(&self) -> bool {
        self.word_dropout
    }

    pub fn with_word_dropout(mut self, enabled: bool) -> Self {
        self.word_dropout = enabled;
        self
    }

    pub fn dropout_alpha(&self) -> f64 {
        self.dropout_alpha
    }

    pub fn with_dropout_alpha(mut self, alpha: f64) -> Result<Self> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(Error::invalid_parameter(
                "dropout_alpha must be finite and non-negative",
            ));
        }
        self.dropout_alpha = alpha;
        Ok(self)
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Fix the RNG seed for parameter initialization and dropout draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use a pretrained word table (V_w x word_dim) instead of random
    /// initialization; the table stays trainable.
    pub fn with_pretrained_word_embeddings(mut self, table: Array2<f64>) -> Self {
        self.pretrained_word_embeddings = Some(table);
        self
    }

    pub(crate) fn embedding_dim(&self) -> usize {
        self.word_dim + self.tag_dim
    }
}

/// Full parameter set of a parser.
///
/// Doubles as the gradient layout: one backward pass produces a zeroed
/// clone of this struct with the accumulated gradients in place of the
/// weights.
#[derive(Debug, Clone)]
pub struct ParserParams {
    pub(crate) embed: Embeddings,
    pub(crate) lstm: BiLstm,
    pub(crate) scorer: EdgeScorer,
}

impl ParserParams {
    pub(crate) fn zeros_like(&self) -> Self {
        Self {
            embed: self.embed.zeros_like(),
            lstm: self.lstm.zeros_like(),
            scorer: self.scorer.zeros_like(),
        }
    }

    /// All parameter tensors as dynamic views, in a fixed order shared with
    /// [`ParserParams::views_mut`]; optimizers zip these across parameter,
    /// gradient and moment sets.
    pub(crate) fn views(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut views = Vec::new();
        views.push(self.embed.word.view().into_dyn());
        views.push(self.embed.tag.view().into_dyn());
        for layer in &self.lstm.layers {
            views.push(layer.fwd.w_ih.view().into_dyn());
            views.push(layer.fwd.w_hh.view().into_dyn());
            views.push(layer.fwd.b_ih.view().into_dyn());
            views.push(layer.fwd.b_hh.view().into_dyn());
            views.push(layer.bwd.w_ih.view().into_dyn());
            views.push(layer.bwd.w_hh.view().into_dyn());
            views.push(layer.bwd.b_ih.view().into_dyn());
            views.push(layer.bwd.b_hh.view().into_dyn());
        }
        views.push(self.scorer.w_head.view().into_dyn());
        views.push(self.scorer.w_mod.view().into_dyn());
        views.push(self.scorer.b_hidden.view().into_dyn());
        views.push(self.scorer.w_out.view().into_dyn());
        views.push(self.scorer.b_out.view().into_dyn());
        views
    }

    pub(crate) fn views_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut views = Vec::new();
        views.push(self.embed.word.view_mut().into_dyn());
        views.push(self.embed.tag.view_mut().into_dyn());
        for layer in &mut self.lstm.layers {
            views.push(layer.fwd.w_ih.view_mut().into_dyn());
            views.push(layer.fwd.w_hh.view_mut().into_dyn());
            views.push(layer.fwd.b_ih.view_mut().into_dyn());
            views.push(layer.fwd.b_hh.view_mut().into_dyn());
            views.push(layer.bwd.w_ih.view_mut().into_dyn());
            views.push(layer.bwd.w_hh.view_mut().into_dyn());
            views.push(layer.bwd.b_ih.view_mut().into_dyn());
            views.push(layer.bwd.b_hh.view_mut().into_dyn());
        }
        views.push(self.scorer.w_head.view_mut().into_dyn());
        views.push(self.scorer.w_mod.view_mut().into_dyn());
        views.push(self.scorer.b_hidden.view_mut().into_dyn());
        views.push(self.scorer.w_out.view_mut().into_dyn());
        views.push(self.scorer.b_out.view_mut().into_dyn());
        views
    }
}

/// Result of one training forward pass.
#[derive(Debug)]
pub struct TrainOutput {
    /// Mean negative log-likelihood of the gold heads
    pub loss: f64,
    /// Decoded head per position, entry 0 unused
    pub heads: Vec<usize>,
    /// Everything the backward pass needs
    pub trace: ForwardTrace,
}

/// Intermediate activations of one training forward pass.
///
/// Holds the post-dropout ids that were actually embedded, so the backward
/// pass updates the rows the forward pass read.
#[derive(Debug)]
pub struct ForwardTrace {
    pub(crate) words: Vec<u32>,
    pub(crate) tags: Vec<u32>,
    pub(crate) lstm: LstmTrace,
    pub(crate) encoded: Array2<f64>,
    pub(crate) scorer: ScorerTrace,
    pub(crate) log_probs: Array2<f64>,
    pub(crate) gold: Vec<usize>,
}

/// Graph-based dependency parser over id sequences.
///
/// A sentence is two parallel id arrays with the reserved root ids at
/// position 0. Training forwards return the loss, the decoded tree and a
/// backprop trace; [`Parser::backward`] turns a trace into gradients, and
/// only the training optimizer mutates the parameters between passes.
/// Inference ([`Parser::parse`]) is deterministic and applies no dropout.
#[derive(Debug)]
pub struct Parser {
    config: ParserConfig,
    vocab: Vocabulary,
    pub(crate) params: ParserParams,
    rng: StdRng,
}

impl Parser {
    /// Initialize a parser for the given vocabulary.
    pub fn new(config: ParserConfig, vocab: Vocabulary) -> Result<Self> {
        if let Some(table) = &config.pretrained_word_embeddings {
            if table.dim() != (vocab.num_words(), config.word_dim()) {
                return Err(Error::invalid_parameter(format!(
                    "pretrained word embeddings must be {} x {}, got {} x {}",
                    vocab.num_words(),
                    config.word_dim(),
                    table.nrows(),
                    table.ncols()
                )));
            }
        }
        let mut rng = match config.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let embed = Embeddings::new(
            vocab.num_words(),
            config.word_dim(),
            vocab.num_tags(),
            config.tag_dim(),
            config.pretrained_word_embeddings.as_ref(),
            &mut rng,
        );
        let lstm = BiLstm::new(
            config.embedding_dim(),
            config.hidden_dim(),
            config.lstm_layers(),
            &mut rng,
        );
        let scorer = EdgeScorer::new(2 * config.hidden_dim(), config.scorer_hidden_dim(), &mut rng);
        Ok(Self {
            config,
            vocab,
            params: ParserParams {
                embed,
                lstm,
                scorer,
            },
            rng,
        })
    }

    /// Reassemble a parser from stored parts (model loading).
    pub(crate) fn from_parts(
        config: ParserConfig,
        vocab: Vocabulary,
        params: ParserParams,
    ) -> Result<Self> {
        let expected_word = (vocab.num_words(), config.word_dim());
        let expected_tag = (vocab.num_tags(), config.tag_dim());
        if params.embed.word.dim() != expected_word || params.embed.tag.dim() != expected_tag {
            return Err(Error::invalid_model(
                "embedding tables do not match the stored configuration",
            ));
        }
        if params.lstm.layers.len() != config.lstm_layers()
            || params.lstm.output_dim() != 2 * config.hidden_dim()
        {
            return Err(Error::invalid_model(
                "encoder weights do not match the stored configuration",
            ));
        }
        if params.scorer.b_hidden.len() != config.scorer_hidden_dim() {
            return Err(Error::invalid_model(
                "scorer weights do not match the stored configuration",
            ));
        }
        let rng = match config.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            vocab,
            params,
            rng,
        })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Parse a sentence of ids; returns one head per position, entry 0
    /// unused. Deterministic: no dropout, no internal randomness.
    pub fn parse(&self, words: &[u32], tags: &[u32]) -> Result<Vec<usize>> {
        self.validate_sentence(words, tags)?;
        let embedded = self.params.embed.forward(words, tags);
        let (encoded, _) = self.params.lstm.forward(&embedded);
        let (scores, _) = self.params.scorer.forward(&encoded);
        check_scores_finite(&scores)?;
        decoder::maximum_spanning_tree(&scores)
    }

    /// Parse raw tokens: maps unseen words and tags to the unknown ids,
    /// prepends the root internally and returns one head per token with
    /// 0 standing for the root.
    pub fn parse_tokens<W, T>(&self, words: &[W], tags: &[T]) -> Result<Vec<usize>>
    where
        W: AsRef<str>,
        T: AsRef<str>,
    {
        if words.len() != tags.len() {
            return Err(Error::invalid_input(
                "words and tags must have the same length",
            ));
        }
        if words.is_empty() {
            return Err(Error::invalid_input("empty sequences are not allowed"));
        }
        let mut word_ids = Vec::with_capacity(words.len() + 1);
        let mut tag_ids = Vec::with_capacity(tags.len() + 1);
        word_ids.push(ROOT_ID);
        tag_ids.push(ROOT_ID);
        for (word, tag) in words.iter().zip(tags.iter()) {
            word_ids.push(self.vocab.word_id(word.as_ref()));
            tag_ids.push(self.vocab.tag_id(tag.as_ref()));
        }
        let heads = self.parse(&word_ids, &tag_ids)?;
        Ok(heads[1..].to_vec())
    }

    /// One training forward pass: validate, apply word dropout when
    /// enabled, embed, encode, score, then decode a detached copy of the
    /// scores and compute the loss against the gold heads.
    pub fn forward(
        &mut self,
        words: &[u32],
        tags: &[u32],
        gold_heads: &[usize],
    ) -> Result<TrainOutput> {
        let len = self.validate_sentence(words, tags)?;
        self.validate_gold(gold_heads, len)?;
        let (words, tags) = if self.config.word_dropout {
            apply_word_dropout(
                words,
                tags,
                &self.vocab,
                self.config.dropout_alpha,
                &mut self.rng,
            )
        } else {
            (words.to_vec(), tags.to_vec())
        };
        let embedded = self.params.embed.forward(&words, &tags);
        let (encoded, lstm_trace) = self.params.lstm.forward(&embedded);
        let (scores, scorer_trace) = self.params.scorer.forward(&encoded);
        check_scores_finite(&scores)?;
        let heads = decoder::maximum_spanning_tree(&scores)?;
        let log_probs = loss::log_softmax_columns(&scores);
        let loss = loss::nll(&log_probs, gold_heads);
        Ok(TrainOutput {
            loss,
            heads,
            trace: ForwardTrace {
                words,
                tags,
                lstm: lstm_trace,
                encoded,
                scorer: scorer_trace,
                log_probs,
                gold: gold_heads.to_vec(),
            },
        })
    }

    /// Serialize the parser to the binary model format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        ModelWriter::to_bytes(self)
    }

    /// Write the model to a file; [`crate::Model::load`] reads it back.
    pub fn save(&self, filename: impl AsRef<Path>) -> Result<()> {
        ModelWriter::write(filename.as_ref(), self)
    }

    /// Backpropagate one trace into a fresh gradient set; the parameters
    /// themselves are left untouched.
    pub fn backward(&self, trace: &ForwardTrace) -> ParserParams {
        let mut grads = self.params.zeros_like();
        let d_scores = loss::nll_gradient(&trace.log_probs, &trace.gold);
        let d_encoded =
            self.params
                .scorer
                .backward(&trace.scorer, &trace.encoded, &d_scores, &mut grads.scorer);
        let d_embedded = self.params.lstm.backward(&trace.lstm, &d_encoded, &mut grads.lstm);
        self.params
            .embed
            .backward(&trace.words, &trace.tags, &d_embedded, &mut grads.embed);
        grads
    }

    fn validate_sentence(&self, words: &[u32], tags: &[u32]) -> Result<usize> {
        if words.len() != tags.len() {
            return Err(Error::invalid_input(
                "words and tags must have the same length",
            ));
        }
        if words.is_empty() {
            return Err(Error::invalid_input("empty sequences are not allowed"));
        }
        if words[0] != ROOT_ID || tags[0] != ROOT_ID {
            return Err(Error::invalid_input(
                "position 0 must hold the reserved root ids",
            ));
        }
        let num_words = self.vocab.num_words() as u32;
        let num_tags = self.vocab.num_tags() as u32;
        for (t, (&word, &tag)) in words.iter().zip(tags.iter()).enumerate() {
            if word >= num_words {
                return Err(Error::invalid_input(format!(
                    "word id {} at position {} is out of range",
                    word, t
                )));
            }
            if tag >= num_tags {
                return Err(Error::invalid_input(format!(
                    "tag id {} at position {} is out of range",
                    tag, t
                )));
            }
        }
        Ok(words.len())
    }

    fn validate_gold(&self, heads: &[usize], len: usize) -> Result<()> {
        if heads.len() != len {
            return Err(Error::invalid_input(
                "gold heads must match the sentence length",
            ));
        }
        for (m, &head) in heads.iter().enumerate().skip(1) {
            if head >= len {
                return Err(Error::invalid_input(format!(
                    "gold head {} at position {} is out of range",
                    head, m
                )));
            }
            if head == m {
                return Err(Error::invalid_input(format!(
                    "position {} cannot be its own gold head",
                    m
                )));
            }
        }
        // Every position must reach the root; entry 0 is ignored.
        for start in 1..len {
            let mut node = start;
            let mut steps = 0;
            while node != 0 {
                node = heads[node];
                steps += 1;
                if steps > len {
                    return Err(Error::invalid_input("gold heads contain a cycle"));
                }
            }
        }
        Ok(())
    }
}

/// Non-finite scores mean the parameters themselves have diverged; the
/// caller's input was already validated, so this is not an input error.
fn check_scores_finite(scores: &Array2<f64>) -> Result<()> {
    if scores.iter().any(|v| !v.is_finite()) {
        return Err(Error::internal(
            "edge scores are not finite; model parameters have diverged",
        ));
    }
    Ok(())
}
