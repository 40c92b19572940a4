use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::error::{Error, Result};
use crate::parser::Parser;

use super::{Sgd, Trainer, TrainingAlgorithm};

/// SGD training parameters.
#[derive(Debug, Clone)]
pub struct SgdParams {
    learning_rate: f64,
    max_iterations: usize,
    period: usize,
    delta: f64,
    shuffle_seed: Option<u64>,
}

impl Default for SgdParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            max_iterations: 100,
            period: 10,
            delta: 1e-6,
            shuffle_seed: None,
        }
    }
}

impl SgdParams {
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) -> Result<()> {
        if !learning_rate.is_finite() || learning_rate <= 0.0 {
            return Err(Error::invalid_parameter("learning_rate must be positive"));
        }
        self.learning_rate = learning_rate;
        Ok(())
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        if max_iterations < 1 {
            return Err(Error::invalid_parameter("max_iterations must be at least 1"));
        }
        self.max_iterations = max_iterations;
        Ok(())
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn set_period(&mut self, period: usize) -> Result<()> {
        if period == 0 {
            return Err(Error::invalid_parameter("period must be positive"));
        }
        self.period = period;
        Ok(())
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn set_delta(&mut self, delta: f64) -> Result<()> {
        if delta <= 0.0 {
            return Err(Error::invalid_parameter("delta must be positive"));
        }
        self.delta = delta;
        Ok(())
    }

    pub fn shuffle_seed(&self) -> Option<u64> {
        self.shuffle_seed
    }

    pub fn set_shuffle_seed(&mut self, seed: Option<u64>) {
        self.shuffle_seed = seed;
    }
}

impl TrainingAlgorithm for Sgd {
    type Params = SgdParams;

    fn train(trainer: &mut Trainer<Self>, parser: &mut Parser) -> Result<()> {
        trainer.train_sgd(parser)
    }
}

impl Trainer<Sgd> {
    /// Train using plain stochastic gradient descent
    pub(super) fn train_sgd(&mut self, parser: &mut Parser) -> Result<()> {
        let learning_rate = self.params.learning_rate();
        let max_iterations = self.params.max_iterations();
        let period = self.params.period();
        let delta = self.params.delta();
        let verbose = self.verbose;

        if verbose {
            println!("Training with SGD (learning_rate={})...", learning_rate);
        }

        let mut rng = match self.params.shuffle_seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut indices: Vec<usize> = (0..self.instances.len()).collect();
        let mut objective_history = vec![0.0; period];

        for epoch in 1..=max_iterations {
            indices.shuffle(&mut rng);

            let mut sum_loss = 0.0;
            let mut correct = 0usize;
            let mut total = 0usize;

            for &idx in &indices {
                let inst = &self.instances[idx];
                let out = parser.forward(&inst.words, &inst.tags, &inst.heads)?;
                let grads = parser.backward(&out.trace);

                for (mut param, grad) in parser.params.views_mut().into_iter().zip(grads.views())
                {
                    param.scaled_add(-learning_rate, &grad);
                }

                sum_loss += out.loss;
                for m in 1..inst.heads.len() {
                    if out.heads[m] == inst.heads[m] {
                        correct += 1;
                    }
                }
                total += inst.heads.len() - 1;
            }

            if !sum_loss.is_finite() {
                return Err(Error::internal("SGD overflow loss"));
            }

            let attachment = if total > 0 {
                correct as f64 / total as f64
            } else {
                0.0
            };

            if verbose {
                println!(
                    "Epoch {}: loss = {:.6}, attachment = {:.4}",
                    epoch, sum_loss, attachment
                );
            }

            let improvement = if epoch > period {
                let prev = objective_history[(epoch - 1) % period];
                (prev - sum_loss) / sum_loss
            } else {
                delta
            };

            objective_history[(epoch - 1) % period] = sum_loss;

            if verbose && epoch > period {
                println!("Improvement ratio: {:.6}", improvement);
            }

            if epoch > period && improvement < delta {
                if verbose {
                    println!("Converged at epoch {}", epoch);
                }
                break;
            }
        }

        Ok(())
    }
}
