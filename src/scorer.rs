use ndarray::{Array1, Array2, Array3};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

/// Feed-forward scorer over ordered (head, modifier) pairs.
///
/// Conceptually each pair's encoded vectors are concatenated and passed
/// through affine -> tanh -> affine -> scalar. The first affine layer is
/// stored as separate head/modifier projections, which is the same map but
/// lets the per-position products be computed once instead of L times.
#[derive(Debug, Clone)]
pub(crate) struct EdgeScorer {
    /// S x 2H head half of the first affine layer
    pub(crate) w_head: Array2<f64>,
    /// S x 2H modifier half of the first affine layer
    pub(crate) w_mod: Array2<f64>,
    pub(crate) b_hidden: Array1<f64>,
    pub(crate) w_out: Array1<f64>,
    /// Single output bias, kept as a length-1 array like the other tensors
    pub(crate) b_out: Array1<f64>,
}

/// Activations of one scoring pass.
#[derive(Debug, Clone)]
pub(crate) struct ScorerTrace {
    p_head: Array2<f64>,
    p_mod: Array2<f64>,
    /// L x L x S post-tanh hidden activations per ordered pair
    hidden: Array3<f64>,
}

impl EdgeScorer {
    pub(crate) fn new(encoded_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        // Bounds follow the fan-in of the layers the projections stand for:
        // the first layer sees both concatenated vectors.
        let bound_in = 1.0 / (2.0 * encoded_dim as f64).sqrt();
        let dist_in = Uniform::new(-bound_in, bound_in);
        let bound_out = 1.0 / (hidden_dim as f64).sqrt();
        let dist_out = Uniform::new(-bound_out, bound_out);
        Self {
            w_head: Array2::from_shape_fn((hidden_dim, encoded_dim), |_| dist_in.sample(rng)),
            w_mod: Array2::from_shape_fn((hidden_dim, encoded_dim), |_| dist_in.sample(rng)),
            b_hidden: Array1::from_shape_fn(hidden_dim, |_| dist_in.sample(rng)),
            w_out: Array1::from_shape_fn(hidden_dim, |_| dist_out.sample(rng)),
            b_out: Array1::from_shape_fn(1, |_| dist_out.sample(rng)),
        }
    }

    pub(crate) fn zeros_like(&self) -> Self {
        Self {
            w_head: Array2::zeros(self.w_head.raw_dim()),
            w_mod: Array2::zeros(self.w_mod.raw_dim()),
            b_hidden: Array1::zeros(self.b_hidden.raw_dim()),
            w_out: Array1::zeros(self.w_out.raw_dim()),
            b_out: Array1::zeros(1),
        }
    }

    /// Score every ordered pair, the structurally invalid ones included;
    /// exclusions are the decoder's business.
    pub(crate) fn forward(&self, encoded: &Array2<f64>) -> (Array2<f64>, ScorerTrace) {
        let len = encoded.nrows();
        let hidden_dim = self.b_hidden.len();
        let p_head = encoded.dot(&self.w_head.t());
        let p_mod = encoded.dot(&self.w_mod.t());
        let mut hidden = Array3::zeros((len, len, hidden_dim));
        let mut scores = Array2::zeros((len, len));
        for h in 0..len {
            for m in 0..len {
                let mut score = self.b_out[0];
                for k in 0..hidden_dim {
                    let act = (p_head[[h, k]] + p_mod[[m, k]] + self.b_hidden[k]).tanh();
                    hidden[[h, m, k]] = act;
                    score += self.w_out[k] * act;
                }
                scores[[h, m]] = score;
            }
        }
        (
            scores,
            ScorerTrace {
                p_head,
                p_mod,
                hidden,
            },
        )
    }

    /// Backpropagate a score-matrix gradient; returns the gradient with
    /// respect to the encoded vectors.
    pub(crate) fn backward(
        &self,
        trace: &ScorerTrace,
        encoded: &Array2<f64>,
        d_scores: &Array2<f64>,
        grads: &mut EdgeScorer,
    ) -> Array2<f64> {
        let len = encoded.nrows();
        let hidden_dim = self.b_hidden.len();
        let mut d_p_head = Array2::<f64>::zeros(trace.p_head.raw_dim());
        let mut d_p_mod = Array2::<f64>::zeros(trace.p_mod.raw_dim());
        for h in 0..len {
            for m in 0..len {
                let d_score = d_scores[[h, m]];
                if d_score == 0.0 {
                    continue;
                }
                grads.b_out[0] += d_score;
                for k in 0..hidden_dim {
                    let act = trace.hidden[[h, m, k]];
                    grads.w_out[k] += d_score * act;
                    let d_act = d_score * self.w_out[k] * (1.0 - act * act);
                    d_p_head[[h, k]] += d_act;
                    d_p_mod[[m, k]] += d_act;
                    grads.b_hidden[k] += d_act;
                }
            }
        }
        grads.w_head += &d_p_head.t().dot(encoded);
        grads.w_mod += &d_p_mod.t().dot(encoded);
        d_p_head.dot(&self.w_head) + d_p_mod.dot(&self.w_mod)
    }
}
