use candle_core::Result;
use candle_nn::{Activation, Sequential, VarBuilder, linear, seq};
use derive_more::Deref;

/// A plain MLP torso. The newtype keeps the candle `Sequential` out of public signatures.
#[derive(Deref)]
pub struct Mlp(Sequential);

/// Stacks linear layers with ReLU in between; the last layer stays linear so callers can put
/// their own head (softmax, tanh, chunked gaussian parameters) on top.
pub fn build_mlp(input_dim: usize, layers: &[usize], vb: &VarBuilder, prefix: &str) -> Result<Mlp> {
    let mut last_dim = input_dim;
    let mut nn = seq();
    let num_layers = layers.len();
    for (layer_idx, layer_size) in layers.iter().enumerate() {
        let layer_pp = format!("{prefix}{layer_idx}");
        if layer_idx == num_layers - 1 {
            nn = nn.add(linear(last_dim, *layer_size, vb.pp(layer_pp))?)
        } else {
            nn = nn
                .add(linear(last_dim, *layer_size, vb.pp(layer_pp))?)
                .add(Activation::Relu);
        }
        last_dim = *layer_size;
    }
    Ok(Mlp(nn))
}
