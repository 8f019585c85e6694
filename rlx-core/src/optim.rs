use candle_core::{DType, Result, Tensor, backprop::GradStore};
use candle_nn::{AdamW, Optimizer, VarMap};

fn clip_grad(loss: &Tensor, varmap: &VarMap, max_norm: f32) -> Result<GradStore> {
    let mut total_norm_squared = 0.0f32;
    let mut grad_store = loss.backward()?;
    let mut var_ids = vec![];
    let all_vars = varmap.all_vars();
    for var in all_vars.iter() {
        let id = var.id();
        if let Some(grad) = grad_store.get_id(id) {
            var_ids.push(id);
            let grad_norm_sq = grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
            total_norm_squared += grad_norm_sq;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = max_norm / (total_norm + 1e-6);
        for var_id in var_ids {
            let var = all_vars.iter().find(|t| t.id() == var_id).unwrap();
            let old_grad = grad_store.get_id(var_id).unwrap();
            let new_grad = old_grad.affine(clip_coef as f64, 0.)?;
            grad_store.insert(var.as_tensor(), new_grad);
        }
    }
    Ok(grad_store)
}

/// AdamW plus an optional gradient-norm clip over the owning varmap.
pub struct OptimizerWithMaxGrad {
    pub optimizer: AdamW,
    pub max_grad_norm: Option<f32>,
    pub varmap: VarMap,
}

impl OptimizerWithMaxGrad {
    pub fn new(optimizer: AdamW, max_grad_norm: Option<f32>, varmap: VarMap) -> Self {
        Self {
            optimizer,
            max_grad_norm,
            varmap,
        }
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = if let Some(max_norm) = self.max_grad_norm {
            clip_grad(loss, &self.varmap, max_norm)?
        } else {
            loss.backward()?
        };
        self.optimizer.step(&grads)?;
        Ok(())
    }
}

/// Polyak-averages `source` parameters into `target`, matching variables by name.
pub fn soft_update(target: &VarMap, source: &VarMap, tau: f64) -> Result<()> {
    let target_data = target.data().lock().unwrap();
    let source_data = source.data().lock().unwrap();
    for (name, target_var) in target_data.iter() {
        let Some(source_var) = source_data.get(name) else {
            continue;
        };
        let mixed = (target_var.as_tensor().affine(1. - tau, 0.)?
            + source_var.as_tensor().affine(tau, 0.)?)?;
        target_var.set(&mixed)?;
    }
    Ok(())
}

/// Copies `source` parameters into `target` wholesale.
pub fn hard_update(target: &VarMap, source: &VarMap) -> Result<()> {
    let target_data = target.data().lock().unwrap();
    let source_data = source.data().lock().unwrap();
    for (name, target_var) in target_data.iter() {
        if let Some(source_var) = source_data.get(name) {
            target_var.set(source_var.as_tensor())?;
        }
    }
    Ok(())
}

/// Element-wise huber loss of a TD-error tensor; quadratic inside the unit interval, linear
/// outside, which keeps single outlier transitions from dominating the update.
pub fn huber(td: &Tensor) -> Result<Tensor> {
    let abs = td.abs()?;
    let quadratic = td.sqr()?.affine(0.5, 0.)?;
    let linear = abs.affine(1., -0.5)?;
    let small = abs.le(1.0)?.to_dtype(DType::F32)?;
    let large = small.affine(-1., 1.)?;
    (small * quadratic)? + (large * linear)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn huber_is_quadratic_then_linear() -> Result<()> {
        let device = Device::Cpu;
        let td = Tensor::from_vec(vec![0.5f32, 2.0, -3.0], 3, &device)?;
        let loss = huber(&td)?.to_vec1::<f32>()?;
        assert!((loss[0] - 0.125).abs() < 1e-6);
        assert!((loss[1] - 1.5).abs() < 1e-6);
        assert!((loss[2] - 2.5).abs() < 1e-6);
        Ok(())
    }
}
