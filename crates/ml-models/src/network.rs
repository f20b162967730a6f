use crate::classifier::Classifier;
use crate::error::{ArtifactError, ModelError};
use crate::sampling::stratified_split;
use candle_core::{D, DType, Device, Tensor, Var};
use candle_nn::{AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use configuration::NetworkParams;
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::path::Path;

/// Feed-forward ReLU network with a softmax output: the secondary classifier.
///
/// Expects standardized inputs; see [`crate::Standardized`]. Persisted as
/// safetensors with one `layer{i}.weight` / `layer{i}.bias` pair per layer,
/// so the architecture is recovered from the tensor shapes on load.
pub struct NeuralNetwork {
    layers: Vec<Linear>,
    n_features: usize,
    n_classes: usize,
    device: Device,
}

fn layer_name(index: usize) -> String {
    format!("layer{index}")
}

/// Narrows inputs to the network's f32 precision. Values beyond the f32
/// range would turn into infinities and poison every output.
fn narrow(values: impl Iterator<Item = f64>) -> Result<Vec<f32>, ModelError> {
    values
        .map(|v| {
            let narrowed = v as f32;
            if narrowed.is_finite() {
                Ok(narrowed)
            } else {
                Err(ModelError::InvalidInput(format!(
                    "value {v} does not fit the network's f32 inputs"
                )))
            }
        })
        .collect()
}

fn to_tensor(rows: &Array2<f64>, device: &Device) -> Result<Tensor, ModelError> {
    let data = narrow(rows.iter().copied())?;
    Ok(Tensor::from_vec(data, rows.dim(), device)?)
}

fn labels_tensor(y: &[usize], indices: &[usize], device: &Device) -> Result<Tensor, ModelError> {
    let labels: Vec<u32> = indices.iter().map(|&i| y[i] as u32).collect();
    Ok(Tensor::from_vec(labels, indices.len(), device)?)
}

type LayerState = Vec<(Tensor, Tensor)>;

impl NeuralNetwork {
    /// Trains with AdamW on cross-entropy, holding back
    /// `params.validation_fraction` of the samples (stratified) for early
    /// stopping. Training stops once the validation loss has not improved by
    /// more than `params.tolerance` for `params.patience` epochs; the weights
    /// from the best epoch are kept.
    ///
    /// A non-finite loss at any point is reported as [`ModelError::Fit`].
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &NetworkParams,
        seed: u64,
    ) -> Result<Self, ModelError> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(ModelError::DimensionMismatch {
                expected: n_samples,
                got: y.len(),
            });
        }
        if n_classes < 2 || n_features == 0 {
            return Err(ModelError::InvalidInput(format!(
                "network needs >= 1 feature and >= 2 classes, got {n_features} / {n_classes}"
            )));
        }
        if y.iter().any(|&label| label >= n_classes) {
            return Err(ModelError::InvalidInput("label index out of range".to_string()));
        }

        let device = Device::Cpu;
        let (train_idx, val_idx) =
            stratified_split(y, n_classes, params.validation_fraction, seed);
        if train_idx.is_empty() || val_idx.is_empty() {
            return Err(ModelError::Fit(
                "not enough samples for an early-stopping validation split".to_string(),
            ));
        }

        let x_train = to_tensor(&x.select(Axis(0), &train_idx), &device)?;
        let y_train = labels_tensor(y, &train_idx, &device)?;
        let x_val = to_tensor(&x.select(Axis(0), &val_idx), &device)?;
        let y_val = labels_tensor(y, &val_idx, &device)?;

        let dims: Vec<usize> = std::iter::once(n_features)
            .chain(params.hidden_layers.iter().copied())
            .chain(std::iter::once(n_classes))
            .collect();

        // Seeded Glorot-uniform weights and zero biases, inserted before the
        // layers are built so the VarBuilder picks them up instead of its own
        // unseeded initialisers.
        let varmap = VarMap::new();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        {
            let mut vars = varmap
                .data()
                .lock()
                .map_err(|_| ModelError::Fit("parameter store lock poisoned".to_string()))?;
            for (i, pair) in dims.windows(2).enumerate() {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let bound = (6.0 / (fan_in + fan_out) as f64).sqrt() as f32;
                let weights: Vec<f32> = (0..fan_in * fan_out)
                    .map(|_| rng.random_range(-bound..bound))
                    .collect();
                let weight = Tensor::from_vec(weights, (fan_out, fan_in), &device)?;
                let bias = Tensor::zeros(fan_out, DType::F32, &device)?;
                vars.insert(format!("{}.weight", layer_name(i)), Var::from_tensor(&weight)?);
                vars.insert(format!("{}.bias", layer_name(i)), Var::from_tensor(&bias)?);
            }
        }

        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, pair)| candle_nn::linear(pair[0], pair[1], vb.pp(layer_name(i))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let mut network = Self {
            layers,
            n_features,
            n_classes,
            device: device.clone(),
        };

        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: params.learning_rate,
                weight_decay: params.weight_decay,
                ..Default::default()
            },
        )?;

        let mut order: Vec<u32> = (0..train_idx.len() as u32).collect();
        let mut best_loss = f64::INFINITY;
        let mut best_epoch = 0;
        let mut best_state = network.snapshot()?;
        let mut stale_epochs = 0;

        for epoch in 1..=params.max_epochs {
            let mut shuffle_rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut shuffle_rng);

            let mut epoch_loss = 0.0;
            let mut batches = 0usize;
            for batch in order.chunks(params.batch_size.max(1)) {
                let idx = Tensor::new(batch, &device)?;
                let inputs = x_train.index_select(&idx, 0)?;
                let targets = y_train.index_select(&idx, 0)?;

                let logits = network.forward(&inputs)?;
                let loss = candle_nn::loss::cross_entropy(&logits, &targets)?;
                let loss_value = f64::from(loss.to_scalar::<f32>()?);
                if !loss_value.is_finite() {
                    return Err(ModelError::Fit(format!(
                        "training loss became non-finite at epoch {epoch}"
                    )));
                }
                optimizer.backward_step(&loss)?;
                epoch_loss += loss_value;
                batches += 1;
            }

            let val_logits = network.forward(&x_val)?;
            let val_loss =
                f64::from(candle_nn::loss::cross_entropy(&val_logits, &y_val)?.to_scalar::<f32>()?);
            if !val_loss.is_finite() {
                return Err(ModelError::Fit(format!(
                    "validation loss became non-finite at epoch {epoch}"
                )));
            }

            tracing::trace!(
                epoch,
                train_loss = epoch_loss / batches.max(1) as f64,
                val_loss,
                "Network epoch complete"
            );

            if val_loss < best_loss - params.tolerance {
                best_loss = val_loss;
                best_epoch = epoch;
                best_state = network.snapshot()?;
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs >= params.patience {
                    tracing::debug!(epoch, best_epoch, "Early stopping");
                    break;
                }
            }
        }

        tracing::info!(
            best_epoch,
            best_val_loss = best_loss,
            layers = ?dims,
            "Neural network training complete"
        );

        network.layers = best_state
            .into_iter()
            .map(|(weight, bias)| Linear::new(weight, Some(bias)))
            .collect();
        Ok(network)
    }

    /// Detached copies of every layer's parameters.
    fn snapshot(&self) -> Result<LayerState, ModelError> {
        self.layers
            .iter()
            .map(|layer| {
                let bias = layer
                    .bias()
                    .ok_or_else(|| ModelError::InvalidInput("layer without bias".to_string()))?;
                Ok((layer.weight().copy()?, bias.copy()?))
            })
            .collect()
    }

    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let last = self.layers.len().saturating_sub(1);
        let mut x = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = x.relu()?;
            }
        }
        Ok(x)
    }

    fn probabilities(&self, input: &Tensor) -> Result<Vec<Vec<f64>>, ModelError> {
        let logits = self.forward(input)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?.to_vec2::<f32>()?;
        // Renormalize in f64 so each row sums to one at double precision.
        probs
            .into_iter()
            .map(|row| {
                let row: Vec<f64> = row.into_iter().map(f64::from).collect();
                let sum: f64 = row.iter().sum();
                if !sum.is_finite() || sum <= 0.0 || row.iter().any(|p| !p.is_finite()) {
                    return Err(ModelError::InvalidInput(
                        "network produced non-finite probabilities".to_string(),
                    ));
                }
                Ok(row.into_iter().map(|p| p / sum).collect())
            })
            .collect()
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let mut tensors: HashMap<String, Tensor> = HashMap::new();
        for (i, layer) in self.layers.iter().enumerate() {
            tensors.insert(format!("{}.weight", layer_name(i)), layer.weight().clone());
            if let Some(bias) = layer.bias() {
                tensors.insert(format!("{}.bias", layer_name(i)), bias.clone());
            }
        }
        candle_core::safetensors::save(&tensors, path).map_err(|e| ArtifactError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(e.to_string()),
        })?;
        crate::artifacts::sync_file(path)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::NotFound(path.to_path_buf()));
        }
        let device = Device::Cpu;
        let mut tensors = candle_core::safetensors::load(path, &device)
            .map_err(|e| ArtifactError::corrupt(path, e))?;

        let mut layers = Vec::new();
        let mut dims: Vec<usize> = Vec::new();
        loop {
            let name = layer_name(layers.len());
            let Some(weight) = tensors.remove(&format!("{name}.weight")) else {
                break;
            };
            let bias = tensors
                .remove(&format!("{name}.bias"))
                .ok_or_else(|| ArtifactError::corrupt(path, format!("{name} has no bias")))?;

            let weight = weight
                .to_dtype(DType::F32)
                .map_err(|e| ArtifactError::corrupt(path, e))?;
            let bias = bias
                .to_dtype(DType::F32)
                .map_err(|e| ArtifactError::corrupt(path, e))?;
            let (fan_out, fan_in) = weight.dims2().map_err(|e| ArtifactError::corrupt(path, e))?;
            let bias_len = bias.dims1().map_err(|e| ArtifactError::corrupt(path, e))?;
            if bias_len != fan_out {
                return Err(ArtifactError::corrupt(
                    path,
                    format!("{name} bias has {bias_len} entries, expected {fan_out}"),
                ));
            }
            match dims.last() {
                Some(&prev_out) if prev_out != fan_in => {
                    return Err(ArtifactError::corrupt(
                        path,
                        format!("{name} expects {fan_in} inputs but previous layer emits {prev_out}"),
                    ));
                }
                Some(_) => {}
                None => dims.push(fan_in),
            }
            dims.push(fan_out);
            layers.push(Linear::new(weight, Some(bias)));
        }

        let (Some(&n_features), Some(&n_classes)) = (dims.first(), dims.last()) else {
            return Err(ArtifactError::corrupt(path, "no layers found"));
        };
        if n_classes < 2 {
            return Err(ArtifactError::corrupt(path, "output layer has fewer than 2 classes"));
        }

        Ok(Self {
            layers,
            n_features,
            n_classes,
            device,
        })
    }
}

impl Classifier for NeuralNetwork {
    fn name(&self) -> &str {
        "neural_network"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        if features.len() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: features.len(),
            });
        }
        let data = narrow(features.iter().copied())?;
        let input = Tensor::from_vec(data, (1, self.n_features), &self.device)?;
        self.probabilities(&input)?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidInput("empty network output".to_string()))
    }

    fn predict_proba_batch(&self, rows: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if rows.ncols() != self.n_features {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features,
                got: rows.ncols(),
            });
        }
        let mut out = Array2::zeros((rows.nrows(), self.n_classes));
        if rows.nrows() == 0 {
            return Ok(out);
        }
        let input = to_tensor(rows, &self.device)?;
        for (i, row) in self.probabilities(&input)?.into_iter().enumerate() {
            for (j, p) in row.into_iter().enumerate() {
                out[[i, j]] = p;
            }
        }
        Ok(out)
    }
}
