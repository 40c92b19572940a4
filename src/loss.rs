use ndarray::Array2;

/// Log-softmax over the head axis, independently for each modifier column.
///
/// `scores[h][m]` is the score of attaching modifier `m` to head `h`; the
/// result holds log P(h | m) with each column normalized on its own.
pub(crate) fn log_softmax_columns(scores: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = scores.dim();
    let mut out = Array2::zeros((rows, cols));
    for m in 0..cols {
        let column = scores.column(m);
        let max = column.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let log_z = column.iter().map(|&v| (v - max).exp()).sum::<f64>().ln() + max;
        for h in 0..rows {
            out[[h, m]] = scores[[h, m]] - log_z;
        }
    }
    out
}

/// Negative log-likelihood of the gold heads.
///
/// Sums -log P(gold head | m) over modifier positions m >= 1 and divides by
/// the full sentence length, root included. The root's own head entry is
/// never read.
pub(crate) fn nll(log_probs: &Array2<f64>, gold_heads: &[usize]) -> f64 {
    let len = gold_heads.len();
    let mut total = 0.0;
    for m in 1..len {
        total -= log_probs[[gold_heads[m], m]];
    }
    total / len as f64
}

/// Gradient of [`nll`] with respect to the raw scores.
///
/// Column m >= 1 gets (softmax(column) - one_hot(gold)) / L; column 0 is not
/// part of the loss and stays zero.
pub(crate) fn nll_gradient(log_probs: &Array2<f64>, gold_heads: &[usize]) -> Array2<f64> {
    let len = gold_heads.len();
    let mut grad = Array2::zeros((len, len));
    let inv_len = 1.0 / len as f64;
    for m in 1..len {
        for h in 0..len {
            grad[[h, m]] = log_probs[[h, m]].exp() * inv_len;
        }
        grad[[gold_heads[m], m]] -= inv_len;
    }
    grad
}
