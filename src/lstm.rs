use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// One direction of one encoder layer.
///
/// Gate layout in the stacked 4H dimension is input, forget, cell, output.
#[derive(Debug, Clone)]
pub(crate) struct LstmCell {
    /// 4H x I input weights
    pub(crate) w_ih: Array2<f64>,
    /// 4H x H recurrent weights
    pub(crate) w_hh: Array2<f64>,
    pub(crate) b_ih: Array1<f64>,
    pub(crate) b_hh: Array1<f64>,
}

impl LstmCell {
    fn new(input_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (hidden_dim as f64).sqrt();
        let dist = Uniform::new(-bound, bound);
        Self {
            w_ih: Array2::from_shape_fn((4 * hidden_dim, input_dim), |_| dist.sample(rng)),
            w_hh: Array2::from_shape_fn((4 * hidden_dim, hidden_dim), |_| dist.sample(rng)),
            b_ih: Array1::from_shape_fn(4 * hidden_dim, |_| dist.sample(rng)),
            b_hh: Array1::from_shape_fn(4 * hidden_dim, |_| dist.sample(rng)),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b_ih: Array1::zeros(self.b_ih.raw_dim()),
            b_hh: Array1::zeros(self.b_hh.raw_dim()),
        }
    }

    pub(crate) fn hidden_dim(&self) -> usize {
        self.w_hh.ncols()
    }

    /// One recurrence step; returns post-activation gates, cell state,
    /// tanh of the cell state and the hidden state.
    fn step(
        &self,
        x: ArrayView1<f64>,
        h_prev: ArrayView1<f64>,
        c_prev: ArrayView1<f64>,
    ) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        let h_dim = self.hidden_dim();
        let mut gates = self.w_ih.dot(&x) + &self.b_ih + self.w_hh.dot(&h_prev) + &self.b_hh;
        for k in 0..h_dim {
            gates[k] = sigmoid(gates[k]);
            gates[h_dim + k] = sigmoid(gates[h_dim + k]);
            gates[2 * h_dim + k] = gates[2 * h_dim + k].tanh();
            gates[3 * h_dim + k] = sigmoid(gates[3 * h_dim + k]);
        }
        let mut cell = Array1::zeros(h_dim);
        let mut cell_tanh = Array1::zeros(h_dim);
        let mut hidden = Array1::zeros(h_dim);
        for k in 0..h_dim {
            cell[k] = gates[h_dim + k] * c_prev[k] + gates[k] * gates[2 * h_dim + k];
            cell_tanh[k] = cell[k].tanh();
            hidden[k] = gates[3 * h_dim + k] * cell_tanh[k];
        }
        (gates, cell, cell_tanh, hidden)
    }
}

/// Per-position activations of one direction, indexed by original position
/// regardless of processing order.
#[derive(Debug, Clone)]
pub(crate) struct DirectionTrace {
    gates: Array2<f64>,
    cell: Array2<f64>,
    cell_tanh: Array2<f64>,
    hidden: Array2<f64>,
}

fn run_direction(cell: &LstmCell, input: &Array2<f64>, reverse: bool) -> DirectionTrace {
    let len = input.nrows();
    let h_dim = cell.hidden_dim();
    let mut trace = DirectionTrace {
        gates: Array2::zeros((len, 4 * h_dim)),
        cell: Array2::zeros((len, h_dim)),
        cell_tanh: Array2::zeros((len, h_dim)),
        hidden: Array2::zeros((len, h_dim)),
    };
    let mut h_prev = Array1::zeros(h_dim);
    let mut c_prev = Array1::zeros(h_dim);
    let order: Vec<usize> = if reverse {
        (0..len).rev().collect()
    } else {
        (0..len).collect()
    };
    for &t in &order {
        let (gates, cell_state, cell_tanh, hidden) =
            cell.step(input.row(t), h_prev.view(), c_prev.view());
        trace.gates.row_mut(t).assign(&gates);
        trace.cell.row_mut(t).assign(&cell_state);
        trace.cell_tanh.row_mut(t).assign(&cell_tanh);
        trace.hidden.row_mut(t).assign(&hidden);
        h_prev = hidden;
        c_prev = cell_state;
    }
    trace
}

/// Backpropagation through one direction. `d_hidden` carries the upstream
/// gradient per original position; parameter gradients accumulate into
/// `grads` and input gradients into `d_input`.
fn backward_direction(
    cell: &LstmCell,
    input: &Array2<f64>,
    trace: &DirectionTrace,
    d_hidden: &Array2<f64>,
    reverse: bool,
    grads: &mut LstmCell,
    d_input: &mut Array2<f64>,
) {
    let len = input.nrows();
    let h_dim = cell.hidden_dim();
    let mut dh_carry = Array1::<f64>::zeros(h_dim);
    let mut dc_carry = Array1::<f64>::zeros(h_dim);
    // Walk positions in the reverse of the processing order.
    let order: Vec<usize> = if reverse {
        (0..len).collect()
    } else {
        (0..len).rev().collect()
    };
    for &t in &order {
        let prev = if reverse {
            if t + 1 < len { Some(t + 1) } else { None }
        } else if t > 0 {
            Some(t - 1)
        } else {
            None
        };
        let gates = trace.gates.row(t);
        let dh = &d_hidden.row(t) + &dh_carry;
        let mut d_gates = Array1::<f64>::zeros(4 * h_dim);
        for k in 0..h_dim {
            let gate_i = gates[k];
            let gate_f = gates[h_dim + k];
            let gate_g = gates[2 * h_dim + k];
            let gate_o = gates[3 * h_dim + k];
            let tanh_c = trace.cell_tanh[[t, k]];
            let d_out = dh[k] * tanh_c;
            d_gates[3 * h_dim + k] = d_out * gate_o * (1.0 - gate_o);
            let dc = dc_carry[k] + dh[k] * gate_o * (1.0 - tanh_c * tanh_c);
            let c_prev = match prev {
                Some(p) => trace.cell[[p, k]],
                None => 0.0,
            };
            d_gates[k] = dc * gate_g * gate_i * (1.0 - gate_i);
            d_gates[h_dim + k] = dc * c_prev * gate_f * (1.0 - gate_f);
            d_gates[2 * h_dim + k] = dc * gate_i * (1.0 - gate_g * gate_g);
            dc_carry[k] = dc * gate_f;
        }
        let d_gates_col = d_gates.view().insert_axis(Axis(1));
        grads.w_ih += &d_gates_col.dot(&input.row(t).insert_axis(Axis(0)));
        if let Some(p) = prev {
            grads.w_hh += &d_gates_col.dot(&trace.hidden.row(p).insert_axis(Axis(0)));
        }
        grads.b_ih += &d_gates;
        grads.b_hh += &d_gates;
        d_input
            .row_mut(t)
            .scaled_add(1.0, &cell.w_ih.t().dot(&d_gates));
        dh_carry = cell.w_hh.t().dot(&d_gates);
    }
}

/// One bidirectional layer.
#[derive(Debug, Clone)]
pub(crate) struct LstmLayer {
    pub(crate) fwd: LstmCell,
    pub(crate) bwd: LstmCell,
}

/// Multi-layer bidirectional encoder. Layer l > 0 consumes the 2H-wide
/// concatenated output of layer l - 1; the overall output is L x 2H. Runs
/// a batch of one sentence and carries no internal randomness.
#[derive(Debug, Clone)]
pub(crate) struct BiLstm {
    pub(crate) layers: Vec<LstmLayer>,
}

/// All per-layer activations of one encoder pass.
#[derive(Debug, Clone)]
pub(crate) struct LstmTrace {
    layers: Vec<LayerTrace>,
}

#[derive(Debug, Clone)]
struct LayerTrace {
    input: Array2<f64>,
    fwd: DirectionTrace,
    bwd: DirectionTrace,
}

impl BiLstm {
    pub(crate) fn new(
        input_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut layers = Vec::with_capacity(num_layers);
        for layer_idx in 0..num_layers {
            let in_dim = if layer_idx == 0 { input_dim } else { 2 * hidden_dim };
            layers.push(LstmLayer {
                fwd: LstmCell::new(in_dim, hidden_dim, rng),
                bwd: LstmCell::new(in_dim, hidden_dim, rng),
            });
        }
        Self { layers }
    }

    pub(crate) fn zeros_like(&self) -> Self {
        Self {
            layers: self
                .layers
                .iter()
                .map(|layer| LstmLayer {
                    fwd: layer.fwd.zeros_like(),
                    bwd: layer.bwd.zeros_like(),
                })
                .collect(),
        }
    }

    pub(crate) fn output_dim(&self) -> usize {
        2 * self.layers[0].fwd.hidden_dim()
    }

    pub(crate) fn forward(&self, input: &Array2<f64>) -> (Array2<f64>, LstmTrace) {
        let mut layer_traces = Vec::with_capacity(self.layers.len());
        let mut current = input.clone();
        for layer in &self.layers {
            let fwd = run_direction(&layer.fwd, &current, false);
            let bwd = run_direction(&layer.bwd, &current, true);
            let len = current.nrows();
            let h_dim = layer.fwd.hidden_dim();
            let mut out = Array2::zeros((len, 2 * h_dim));
            for t in 0..len {
                out.slice_mut(s![t, ..h_dim]).assign(&fwd.hidden.row(t));
                out.slice_mut(s![t, h_dim..]).assign(&bwd.hidden.row(t));
            }
            layer_traces.push(LayerTrace {
                input: current,
                fwd,
                bwd,
            });
            current = out;
        }
        (current, LstmTrace { layers: layer_traces })
    }

    /// Backpropagate through every layer; returns the gradient with respect
    /// to the embedded input matrix.
    pub(crate) fn backward(
        &self,
        trace: &LstmTrace,
        d_out: &Array2<f64>,
        grads: &mut BiLstm,
    ) -> Array2<f64> {
        let mut d_current = d_out.clone();
        for (layer_idx, layer) in self.layers.iter().enumerate().rev() {
            let layer_trace = &trace.layers[layer_idx];
            let h_dim = layer.fwd.hidden_dim();
            let d_fwd = d_current.slice(s![.., ..h_dim]).to_owned();
            let d_bwd = d_current.slice(s![.., h_dim..]).to_owned();
            let mut d_input = Array2::zeros(layer_trace.input.raw_dim());
            backward_direction(
                &layer.fwd,
                &layer_trace.input,
                &layer_trace.fwd,
                &d_fwd,
                false,
                &mut grads.layers[layer_idx].fwd,
                &mut d_input,
            );
            backward_direction(
                &layer.bwd,
                &layer_trace.input,
                &layer_trace.bwd,
                &d_bwd,
                true,
                &mut grads.layers[layer_idx].bwd,
                &mut d_input,
            );
            d_current = d_input;
        }
        d_current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample_input(len: usize, dim: usize) -> Array2<f64> {
        Array2::from_shape_fn((len, dim), |(t, k)| ((t * 7 + k * 3) % 13) as f64 * 0.1 - 0.6)
    }

    #[test]
    fn test_output_shape_and_layer_stacking() {
        let mut rng = StdRng::seed_from_u64(42);
        let encoder = BiLstm::new(5, 4, 3, &mut rng);
        let (out, trace) = encoder.forward(&sample_input(6, 5));
        assert_eq!(out.dim(), (6, 8));
        assert_eq!(trace.layers.len(), 3);
        assert_eq!(trace.layers[0].input.dim(), (6, 5));
        assert_eq!(trace.layers[1].input.dim(), (6, 8));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(9);
        let encoder = BiLstm::new(4, 3, 2, &mut rng);
        let input = sample_input(5, 4);
        let (first, _) = encoder.forward(&input);
        let (second, _) = encoder.forward(&input);
        assert_eq!(first, second);
    }

    #[test]
    fn test_directions_differ() {
        // The backward direction must actually read the sentence reversed;
        // on an asymmetric input the two halves of the output differ.
        let mut rng = StdRng::seed_from_u64(17);
        let encoder = BiLstm::new(3, 3, 1, &mut rng);
        let (out, _) = encoder.forward(&sample_input(4, 3));
        let fwd_half = out.slice(s![.., ..3]).to_owned();
        let bwd_half = out.slice(s![.., 3..]).to_owned();
        assert_ne!(fwd_half, bwd_half);
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(23);
        let mut encoder = BiLstm::new(3, 2, 2, &mut rng);
        let input = sample_input(4, 3);
        // Scalar objective: weighted sum of all outputs.
        let weights = Array2::from_shape_fn((4, 4), |(t, k)| ((t + 2 * k) % 5) as f64 * 0.25 - 0.5);

        let (out, trace) = encoder.forward(&input);
        let mut grads = encoder.zeros_like();
        let d_input = encoder.backward(&trace, &weights, &mut grads);
        let objective = (&out * &weights).sum();

        let step = 1e-6;
        let tolerance = 1e-6;

        // Input gradient.
        let mut probe = input.clone();
        for t in 0..4 {
            for k in 0..3 {
                let original = probe[[t, k]];
                probe[[t, k]] = original + step;
                let (plus, _) = encoder.forward(&probe);
                probe[[t, k]] = original - step;
                let (minus, _) = encoder.forward(&probe);
                probe[[t, k]] = original;
                let numeric =
                    ((&plus * &weights).sum() - (&minus * &weights).sum()) / (2.0 * step);
                assert!(
                    (d_input[[t, k]] - numeric).abs() < tolerance,
                    "input grad mismatch at ({}, {})",
                    t,
                    k
                );
            }
        }

        // Parameter gradients, every entry of every tensor.
        for layer_idx in 0..encoder.layers.len() {
            for direction in 0..2 {
                for field in 0..4 {
                    let count = {
                        let cell = direction_cell(&encoder, layer_idx, direction);
                        field_len(cell, field)
                    };
                    for entry in 0..count {
                        let original = {
                            let cell = direction_cell_mut(&mut encoder, layer_idx, direction);
                            read_field(cell, field, entry)
                        };
                        write_field(
                            direction_cell_mut(&mut encoder, layer_idx, direction),
                            field,
                            entry,
                            original + step,
                        );
                        let (plus, _) = encoder.forward(&input);
                        write_field(
                            direction_cell_mut(&mut encoder, layer_idx, direction),
                            field,
                            entry,
                            original - step,
                        );
                        let (minus, _) = encoder.forward(&input);
                        write_field(
                            direction_cell_mut(&mut encoder, layer_idx, direction),
                            field,
                            entry,
                            original,
                        );
                        let numeric = ((&plus * &weights).sum() - (&minus * &weights).sum())
                            / (2.0 * step);
                        let analytic = {
                            let cell = direction_cell(&grads, layer_idx, direction);
                            read_field(cell, field, entry)
                        };
                        assert!(
                            (analytic - numeric).abs() < tolerance,
                            "layer {} dir {} field {} entry {}: analytic {} vs numeric {}",
                            layer_idx,
                            direction,
                            field,
                            entry,
                            analytic,
                            numeric
                        );
                    }
                }
            }
        }
        // Objective was finite to begin with.
        assert!(objective.is_finite());
    }

    fn direction_cell(encoder: &BiLstm, layer: usize, direction: usize) -> &LstmCell {
        if direction == 0 {
            &encoder.layers[layer].fwd
        } else {
            &encoder.layers[layer].bwd
        }
    }

    fn direction_cell_mut(encoder: &mut BiLstm, layer: usize, direction: usize) -> &mut LstmCell {
        if direction == 0 {
            &mut encoder.layers[layer].fwd
        } else {
            &mut encoder.layers[layer].bwd
        }
    }

    fn field_len(cell: &LstmCell, field: usize) -> usize {
        match field {
            0 => cell.w_ih.len(),
            1 => cell.w_hh.len(),
            2 => cell.b_ih.len(),
            _ => cell.b_hh.len(),
        }
    }

    fn read_field(cell: &LstmCell, field: usize, entry: usize) -> f64 {
        match field {
            0 => cell.w_ih.as_slice().unwrap()[entry],
            1 => cell.w_hh.as_slice().unwrap()[entry],
            2 => cell.b_ih.as_slice().unwrap()[entry],
            _ => cell.b_hh.as_slice().unwrap()[entry],
        }
    }

    fn write_field(cell: &mut LstmCell, field: usize, entry: usize, value: f64) {
        match field {
            0 => cell.w_ih.as_slice_mut().unwrap()[entry] = value,
            1 => cell.w_hh.as_slice_mut().unwrap()[entry] = value,
            2 => cell.b_ih.as_slice_mut().unwrap()[entry] = value,
            _ => cell.b_hh.as_slice_mut().unwrap()[entry] = value,
        }
    }
}
