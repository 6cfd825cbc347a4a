use std::{env, io};

use log::info;

use trainer::{
    TrainConfig, Trainer,
    data::cifar::{self, Split},
};

/// Read when no config path is given on the command line.
const CONFIG_ENV: &str = "REDUCENET_CONFIG";

fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var(CONFIG_ENV).ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("usage: trainer <config.json>, or set {CONFIG_ENV}"),
            )
        })?;

    let config = TrainConfig::from_path(&path)?;
    info!("loaded config from {path}: {config:?}");

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build_global()
        .map_err(io::Error::other)?;

    let train = cifar::load(config.dataset, &config.data_dir, Split::Train)?;
    let test = cifar::load(config.dataset, &config.data_dir, Split::Test)?;

    let mut trainer = Trainer::new(config, train, test)?;
    let best = trainer.run()?;
    info!("done, best accuracy {best:.3}%");

    Ok(())
}
