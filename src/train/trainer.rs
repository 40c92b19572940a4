use crate::dataset::Instance;
use crate::error::{Error, Result};
use crate::parser::{Parser, ParserConfig};
use crate::vocab::{Vocabulary, ROOT_ID};

mod adam;
mod sgd;

pub use self::adam::AdamParams;
pub use self::sgd::SgdParams;

/// Training algorithm marker for plain stochastic gradient descent.
#[derive(Debug, Clone, Copy)]
pub struct Sgd;

/// Training algorithm marker for Adam.
#[derive(Debug, Clone, Copy)]
pub struct Adam;

/// Training algorithm interface.
pub trait TrainingAlgorithm {
    type Params: Default;

    fn train(trainer: &mut Trainer<Self>, parser: &mut Parser) -> Result<()>
    where
        Self: Sized;
}

/// Fraction of tokens whose predicted head matches the gold head.
///
/// Position 0 holds the artificial root in both slices and is skipped.
/// Slices of different lengths are rejected; a root-only tree has nothing
/// to score and yields 1.0.
pub fn unlabeled_attachment_score(predicted: &[usize], gold: &[usize]) -> Result<f64> {
    if predicted.len() != gold.len() {
        return Err(Error::invalid_input(
            "predicted and gold heads must have the same length",
        ));
    }
    if gold.len() < 2 {
        return Ok(1.0);
    }
    let correct = predicted
        .iter()
        .zip(gold.iter())
        .skip(1)
        .filter(|(p, g)| p == g)
        .count();
    Ok(correct as f64 / (gold.len() - 1) as f64)
}

/// Dependency parser trainer.
///
/// Collects gold sentences, builds the vocabulary as they arrive, then
/// fits a fresh [`Parser`] with the selected algorithm.
#[derive(Debug)]
pub struct Trainer<A: TrainingAlgorithm> {
    /// Training instances, root position included
    instances: Vec<Instance>,
    /// Word and tag inventories over the appended data
    vocab: Vocabulary,
    /// Parser hyper-parameters for the model to be trained
    config: ParserConfig,
    /// Enable verbose output
    verbose: bool,
    /// Training parameters
    params: A::Params,
}

impl<A: TrainingAlgorithm> Trainer<A> {
    /// Create a new trainer
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            vocab: Vocabulary::new(),
            config: ParserConfig::default(),
            verbose: false,
            params: A::Params::default(),
        }
    }

    /// Enable or disable verbose output
    pub fn verbose(&mut self, enabled: bool) -> &mut Self {
        self.verbose = enabled;
        self
    }

    /// Get training parameters
    pub fn params(&self) -> &A::Params {
        &self.params
    }

    /// Get training parameters for mutation
    pub fn params_mut(&mut self) -> &mut A::Params {
        &mut self.params
    }

    /// Get the parser configuration
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Set the parser configuration (builder pattern)
    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// Append one gold sentence.
    ///
    /// `heads` follows the treebank convention: 0 points at the root and
    /// positive values are 1-based token positions. The root position is
    /// prepended internally, so the three slices cover the real tokens
    /// only.
    pub fn append<W, T>(&mut self, words: &[W], tags: &[T], heads: &[usize]) -> Result<()>
    where
        W: AsRef<str>,
        T: AsRef<str>,
    {
        if words.len() != tags.len() || words.len() != heads.len() {
            return Err(Error::invalid_input(
                "words, tags and heads must have the same length",
            ));
        }
        if words.is_empty() {
            return Err(Error::invalid_input("empty sequences are not allowed"));
        }
        for (i, &head) in heads.iter().enumerate() {
            if head > words.len() {
                return Err(Error::invalid_input(format!(
                    "head {} of token {} is out of range",
                    head, i
                )));
            }
            if head == i + 1 {
                return Err(Error::invalid_input(format!(
                    "token {} cannot be its own head",
                    i
                )));
            }
        }
        // With the root at position 0 the treebank head values are already
        // internal positions; check that every token reaches the root.
        for start in 1..=heads.len() {
            let mut node = start;
            let mut steps = 0;
            while node != 0 {
                node = heads[node - 1];
                steps += 1;
                if steps > heads.len() {
                    return Err(Error::invalid_input("gold heads contain a cycle"));
                }
            }
        }

        let mut instance_words = Vec::with_capacity(words.len() + 1);
        let mut instance_tags = Vec::with_capacity(tags.len() + 1);
        let mut instance_heads = Vec::with_capacity(heads.len() + 1);
        instance_words.push(ROOT_ID);
        instance_tags.push(ROOT_ID);
        instance_heads.push(0);
        for (word, tag) in words.iter().zip(tags.iter()) {
            instance_words.push(self.vocab.intern_word(word.as_ref()));
            instance_tags.push(self.vocab.intern_tag(tag.as_ref()));
        }
        instance_heads.extend_from_slice(heads);

        self.instances
            .push(Instance::new(instance_words, instance_tags, instance_heads));
        Ok(())
    }

    /// Clear all training data
    pub fn clear(&mut self) {
        self.instances.clear();
        self.vocab = Vocabulary::new();
    }

    /// Train a parser on the appended data
    pub fn train(&mut self) -> Result<Parser> {
        if self.instances.is_empty() {
            return Err(Error::invalid_input("no training data"));
        }

        if self.verbose {
            println!("Number of instances: {}", self.instances.len());
            println!("Number of words: {}", self.vocab.num_words());
            println!("Number of tags: {}", self.vocab.num_tags());
        }

        let mut parser = Parser::new(self.config.clone(), self.vocab.clone())?;
        A::train(self, &mut parser)?;

        if self.verbose {
            println!("Training completed.");
        }

        Ok(parser)
    }
}

impl Trainer<Sgd> {
    /// Create a new SGD trainer
    pub fn sgd() -> Self {
        Self::new()
    }

    /// Set learning rate (builder pattern)
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Result<Self> {
        self.params.set_learning_rate(learning_rate)?;
        Ok(self)
    }

    /// Set maximum iterations (builder pattern)
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        self.params.set_max_iterations(max_iterations)?;
        Ok(self)
    }

    /// Set convergence check period (builder pattern)
    pub fn with_period(mut self, period: usize) -> Result<Self> {
        self.params.set_period(period)?;
        Ok(self)
    }

    /// Set convergence delta threshold (builder pattern)
    pub fn with_delta(mut self, delta: f64) -> Result<Self> {
        self.params.set_delta(delta)?;
        Ok(self)
    }

    /// Set instance shuffling seed (builder pattern)
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.params.set_shuffle_seed(Some(seed));
        self
    }
}

impl Trainer<Adam> {
    /// Create a new Adam trainer
    pub fn adam() -> Self {
        Self::new()
    }

    /// Set learning rate (builder pattern)
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Result<Self> {
        self.params.set_learning_rate(learning_rate)?;
        Ok(self)
    }

    /// Set first moment decay (builder pattern)
    pub fn with_beta1(mut self, beta1: f64) -> Result<Self> {
        self.params.set_beta1(beta1)?;
        Ok(self)
    }

    /// Set second moment decay (builder pattern)
    pub fn with_beta2(mut self, beta2: f64) -> Result<Self> {
        self.params.set_beta2(beta2)?;
        Ok(self)
    }

    /// Set denominator epsilon (builder pattern)
    pub fn with_epsilon(mut self, epsilon: f64) -> Result<Self> {
        self.params.set_epsilon(epsilon)?;
        Ok(self)
    }

    /// Set maximum iterations (builder pattern)
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        self.params.set_max_iterations(max_iterations)?;
        Ok(self)
    }

    /// Set convergence check period (builder pattern)
    pub fn with_period(mut self, period: usize) -> Result<Self> {
        self.params.set_period(period)?;
        Ok(self)
    }

    /// Set convergence delta threshold (builder pattern)
    pub fn with_delta(mut self, delta: f64) -> Result<Self> {
        self.params.set_delta(delta)?;
        Ok(self)
    }

    /// Set instance shuffling seed (builder pattern)
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.params.set_shuffle_seed(Some(seed));
        self
    }
}

impl<A: TrainingAlgorithm> Default for Trainer<A> {
    fn default() -> Self {
        Self::new()
    }
}
