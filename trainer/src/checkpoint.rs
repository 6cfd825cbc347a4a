use std::{collections::HashMap, fs, path::Path, str::FromStr};

use log::info;
use reducenet::{
    arch::{NetConfig, NetState},
    gating::Gate,
};
use safetensors::{
    SafeTensors,
    tensor::{self, Dtype, TensorView},
};

use crate::error::{Result, TrainerErr};

const PARAMS: &str = "params";
const BUFFERS: &str = "buffers";
const GATE: &str = "gate";

/// The best model of a run, as saved to disk: the full network state plus the accuracy and
/// epoch it was reached at.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub state: NetState,
    pub acc: f32,
    pub epoch: usize,
    pub net_config: NetConfig,
}

impl Checkpoint {
    /// Writes the checkpoint as a safetensors file, creating the parent directory if needed.
    ///
    /// The params, buffers and gate are stored as `F32` tensors, the rest as metadata.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let gate = [self.state.gate.value()];
        let tensors: [(&str, &[f32]); 3] = [
            (PARAMS, &self.state.params),
            (BUFFERS, &self.state.buffers),
            (GATE, &gate),
        ];

        let mut views = Vec::with_capacity(tensors.len());
        for (name, data) in tensors {
            let view = TensorView::new(Dtype::F32, vec![data.len()], bytemuck::cast_slice(data))?;
            views.push((name, view));
        }

        let metadata = HashMap::from([
            ("acc".to_string(), self.acc.to_string()),
            ("epoch".to_string(), self.epoch.to_string()),
            (
                "net_config".to_string(),
                serde_json::to_string(&self.net_config)?,
            ),
        ]);

        tensor::serialize_to_file(views, &Some(metadata), path)?;
        info!("saved checkpoint at {}", path.display());
        Ok(())
    }

    /// Reads a checkpoint written by `save`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let tensors = SafeTensors::deserialize(&bytes)?;
        let (_, header) = SafeTensors::read_metadata(&bytes)?;

        let metadata = header
            .metadata()
            .as_ref()
            .ok_or_else(|| malformed("missing metadata"))?;

        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| malformed(&format!("missing {key}")))
        };

        let acc = parse(field("acc")?, "acc")?;
        let epoch = parse(field("epoch")?, "epoch")?;
        let net_config = serde_json::from_str(field("net_config")?)?;

        let read = |name: &str| -> Result<Vec<f32>> {
            let view = tensors.tensor(name)?;

            if view.dtype() != Dtype::F32 {
                return Err(malformed(&format!("{name} is not f32")));
            }

            let mut values = vec![0f32; view.data().len() / size_of::<f32>()];
            bytemuck::cast_slice_mut::<f32, u8>(&mut values).copy_from_slice(view.data());
            Ok(values)
        };

        let gate = match read(GATE)?.as_slice() {
            &[value] => Gate::new(value)?,
            other => return Err(malformed(&format!("gate has {} values", other.len()))),
        };

        Ok(Self {
            state: NetState {
                params: read(PARAMS)?,
                buffers: read(BUFFERS)?,
                gate,
            },
            acc,
            epoch,
            net_config,
        })
    }
}

fn malformed(msg: &str) -> TrainerErr {
    TrainerErr::MalformedCheckpoint(msg.to_string())
}

fn parse<T: FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| malformed(&format!("{what} is not a number: {value}")))
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    #[test]
    fn round_trip_keeps_the_gate() {
        let path = env::temp_dir()
            .join(format!("reducenet-ckpt-{}", std::process::id()))
            .join("unit.safetensors");

        let checkpoint = Checkpoint {
            state: NetState {
                params: vec![0.5, -1.25, 3.],
                buffers: vec![0., 1.],
                gate: Gate::new(0.375).unwrap(),
            },
            acc: 91.5,
            epoch: 17,
            net_config: NetConfig::reducenet20(10, 4),
        };

        checkpoint.save(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Checkpoint::load(Path::new("/nonexistent/reducenet.safetensors")).unwrap_err();
        assert!(matches!(err, TrainerErr::Io(_)));
    }
}
