use std::{num::NonZeroUsize, time::Instant};

use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng};
use reducenet::{
    arch::{
        Mode, ReduceNet,
        loss::{CrossEntropy, LossFn},
    },
    gating::GateSchedule,
    optimization::{LrSchedule, Optimizer, Sgd},
};

use crate::{
    checkpoint::Checkpoint,
    config::TrainConfig,
    data::{DataLoader, InMemoryDataset},
    error::{Result, TrainerErr},
    metrics::EpochMetrics,
};

/// Drives a `ReduceNet` through a full run: every iteration writes the scheduled gate into
/// the network before its forward pass, every epoch sets the learning rate, evaluates and
/// keeps the best model on disk.
pub struct Trainer {
    config: TrainConfig,
    net: ReduceNet,
    optimizer: Sgd,
    loss_fn: CrossEntropy,
    lr_schedule: LrSchedule,
    gate_schedule: GateSchedule,
    train_loader: DataLoader,
    test_loader: DataLoader,
    start_epoch: usize,
    best_acc: f32,
}

impl Trainer {
    /// Builds the network, optimizer and loaders, resuming from the checkpoint if configured.
    ///
    /// # Arguments
    /// * `config` - The validated run configuration.
    /// * `train` - The training images, shuffled and augmented on every epoch.
    /// * `test` - The evaluation images.
    pub fn new(config: TrainConfig, train: InMemoryDataset, test: InMemoryDataset) -> Result<Self> {
        config.validate()?;

        let batch_size = |size: usize| {
            NonZeroUsize::new(size).ok_or_else(|| TrainerErr::InvalidConfig("empty batches".into()))
        };

        let mut rng = StdRng::seed_from_u64(config.seed);
        let net = ReduceNet::new(config.net_config(), StdRng::from_rng(&mut rng))?;
        info!("model summary:\n{}", net.summary());

        let train_loader = DataLoader::new(
            train,
            batch_size(config.train_batch_size)?,
            StdRng::from_rng(&mut rng),
        )
        .with_shuffle()
        .with_augmentation();
        info!(
            "training on {} images in {} batches per epoch",
            train_loader.num_samples(),
            train_loader.len()
        );
        let test_loader = DataLoader::new(
            test,
            batch_size(config.test_batch_size())?,
            StdRng::from_rng(&mut rng),
        );

        let (Some(epochs), Some(iters_per_epoch)) = (
            NonZeroUsize::new(config.epochs),
            NonZeroUsize::new(train_loader.len()),
        ) else {
            return Err(TrainerErr::InvalidConfig(
                "training needs at least one epoch and one image".into(),
            ));
        };

        let optimizer = Sgd::new(
            net.num_params(),
            config.lr,
            config.momentum,
            config.nesterov,
            config.weight_decay,
        );

        let mut trainer = Self {
            lr_schedule: config.lr_schedule(),
            gate_schedule: GateSchedule::new(epochs, iters_per_epoch),
            net,
            optimizer,
            loss_fn: CrossEntropy::new(),
            train_loader,
            test_loader,
            start_epoch: 1,
            best_acc: 0.,
            config,
        };

        if trainer.config.resume {
            trainer.resume()?;
        }

        Ok(trainer)
    }

    /// Restores the network, gate included, the best accuracy and the next epoch from the
    /// run's checkpoint.
    pub fn resume(&mut self) -> Result<()> {
        let path = self.config.checkpoint_path();
        let checkpoint = Checkpoint::load(&path)?;

        if &checkpoint.net_config != self.net.config() {
            return Err(TrainerErr::MalformedCheckpoint(format!(
                "{} holds a {:?} network, expected {:?}",
                path.display(),
                checkpoint.net_config,
                self.net.config()
            )));
        }

        self.net.load_state(&checkpoint.state)?;
        self.best_acc = checkpoint.acc;
        self.start_epoch = checkpoint.epoch + 1;

        info!(
            "resumed from {} at epoch {} (acc {:.3}%, gate {})",
            path.display(),
            checkpoint.epoch,
            checkpoint.acc,
            self.net.gate()
        );

        Ok(())
    }

    /// Trains from the start epoch up to the configured amount.
    ///
    /// # Returns
    /// The best test accuracy reached.
    pub fn run(&mut self) -> Result<f32> {
        let epochs = self.config.epochs;

        if self.start_epoch > epochs {
            warn!("the checkpoint already covers all {epochs} epochs");
        }

        for epoch in self.start_epoch..=epochs {
            let lr = self.lr_schedule.lr(self.config.lr, epoch - 1);
            self.optimizer.set_learning_rate(lr);

            let train = self.train_epoch(epoch)?;
            let test = self.test()?;

            info!(
                "epoch {epoch}/{epochs} | lr {lr:.5} | gate {} | train {train} | test {test}",
                self.net.gate()
            );

            if test.accuracy() > self.best_acc {
                self.best_acc = test.accuracy();
                self.save(epoch)?;
            }
        }

        info!("best test accuracy {:.3}%", self.best_acc);
        Ok(self.best_acc)
    }

    /// Runs one pass over the training set.
    ///
    /// # Arguments
    /// * `epoch` - The current epoch, starting at `1`.
    pub fn train_epoch(&mut self, epoch: usize) -> Result<EpochMetrics> {
        let start = Instant::now();
        let mut metrics = EpochMetrics::default();
        let num_batches = self.train_loader.len();

        self.train_loader.reset();
        let mut batch_idx = 0;

        while let Some(batch) = self.train_loader.next_batch()? {
            let gate = self.gate_schedule.gate(epoch, batch_idx)?;
            self.net.set_gate(gate.value())?;

            self.net.zero_grad();
            let logits = self.net.forward(batch.images.view(), Mode::Train)?;
            let loss = self.loss_fn.loss(logits.view(), &batch.labels)?;
            let d = self.loss_fn.loss_prime(logits.view(), &batch.labels)?;
            self.net.backward(d.view())?;

            let (params, grad) = self.net.params_and_grad_mut();
            self.optimizer.update_params(grad, params)?;

            metrics.record(loss, logits.view(), &batch.labels);
            batch_idx += 1;

            if batch_idx % self.config.log_every == 0 || batch_idx == num_batches {
                info!(
                    "epoch {epoch} [{batch_idx}/{num_batches}] loss {:.4} | acc {:.3}% | lr {:.5} | gate {gate}",
                    metrics.loss(),
                    metrics.accuracy(),
                    self.optimizer.learning_rate()
                );
            }
        }

        metrics.elapsed = start.elapsed();
        Ok(metrics)
    }

    /// Evaluates the network on the test set with the running batch norm statistics.
    pub fn test(&mut self) -> Result<EpochMetrics> {
        let start = Instant::now();
        let mut metrics = EpochMetrics::default();

        self.test_loader.reset();
        while let Some(batch) = self.test_loader.next_batch()? {
            let logits = self.net.forward(batch.images.view(), Mode::Eval)?;
            let loss = self.loss_fn.loss(logits.view(), &batch.labels)?;
            metrics.record(loss, logits.view(), &batch.labels);
        }

        metrics.elapsed = start.elapsed();
        Ok(metrics)
    }

    fn save(&self, epoch: usize) -> Result<()> {
        let checkpoint = Checkpoint {
            state: self.net.state(),
            acc: self.best_acc,
            epoch,
            net_config: self.net.config().clone(),
        };

        checkpoint.save(&self.config.checkpoint_path())
    }

    pub fn net(&self) -> &ReduceNet {
        &self.net
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn best_acc(&self) -> f32 {
        self.best_acc
    }

    pub fn learning_rate(&self) -> f32 {
        self.optimizer.learning_rate()
    }
}
