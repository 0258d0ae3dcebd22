use memmap2::MmapOptions;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::fs::File;
use std::path::Path;
use tch::{nn, Device, Kind, Tensor};

use crate::error::{ModelError, Result};

/// Writes every variable of `vs` as f32 into a safetensors file.
pub fn save_safetensors<P: AsRef<Path>>(vs: &nn::VarStore, path: P) -> Result<()> {
    let variables = vs.variables();
    let mut names: Vec<&String> = variables.keys().collect();
    names.sort();

    let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::with_capacity(names.len());
    for name in names {
        let tensor = variables[name]
            .detach()
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .contiguous();
        let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
        let values = Vec::<f32>::try_from(&tensor.flatten(0, -1))?;
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        buffers.push((name.clone(), shape, bytes));
    }

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        views.push((name.as_str(), TensorView::new(Dtype::F32, shape.clone(), bytes)?));
    }
    safetensors::serialize_to_file(views.iter().map(|(n, v)| (*n, v)), &None, path.as_ref())?;

    log::debug!("Saved {} tensors to {:?}", buffers.len(), path.as_ref());
    Ok(())
}

/// Copies matching tensors from a safetensors file into `vs`.
///
/// Tensors the model does not know are skipped with a warning; a known
/// tensor with the wrong shape is an error. Returns how many were loaded.
pub fn load_safetensors<P: AsRef<Path>>(vs: &mut nn::VarStore, path: P) -> Result<usize> {
    let file = File::open(path.as_ref())?;
    let buffer = unsafe { MmapOptions::new().map(&file)? };
    let tensors = SafeTensors::deserialize(&buffer)?;

    let mut variables = vs.variables();
    let device = vs.device();
    let mut loaded = 0;

    for (name, view) in tensors.tensors() {
        let Some(var) = variables.get_mut(&name) else {
            log::warn!("Tensor {} found in checkpoint but not in model", name);
            continue;
        };

        let shape: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
        if shape != var.size() {
            return Err(ModelError::ShapeMismatch {
                name,
                expected: var.size(),
                actual: shape,
            });
        }
        let kind = match view.dtype() {
            Dtype::F32 => Kind::Float,
            Dtype::F16 => Kind::Half,
            Dtype::BF16 => Kind::BFloat16,
            other => return Err(ModelError::UnsupportedDtype(format!("{other:?}"))),
        };

        let tensor = Tensor::from_data_size(view.data(), &shape, kind).to_device(device);
        tch::no_grad(|| {
            var.copy_(&tensor);
        });
        loaded += 1;
    }

    log::debug!("Loaded {} tensors from {:?}", loaded, path.as_ref());
    Ok(loaded)
}
