//! End-to-end tests of full training runs on disk

use std::fs;

use anyhow::Result;
use approx::assert_relative_eq;
use candle_core::Device;

use crate::training::checkpoints::BEST_WEIGHTS;
use crate::training::FusionTrainer;

use super::fixtures::DatasetFixture;

#[test]
fn test_full_training_run_writes_outputs() -> Result<()> {
    let fixture = DatasetFixture::new(4, 2)?;
    let mut config = fixture.config();
    config.hyperparams.epochs = 2;
    config.hyperparams.set_size = 18;
    config.hyperparams.lr = 0.001;
    config.data.shuffle = true;

    let result = FusionTrainer::with_device(config, Device::Cpu)?.run()?;
    assert_eq!(result.epochs_run(), 2);

    for epoch in &result.history {
        assert!(epoch.train.loss.is_finite());
        assert!(epoch.validation.loss.is_finite());
        assert_relative_eq!(epoch.validation.accuracy, 1.0 - epoch.validation.loss, epsilon = 1e-9);
    }

    let run_dir = result.run_dir.expect("run directory");
    assert!(run_dir.starts_with(&fixture.save_path));
    assert!(run_dir.join("hyperparams.json").exists());
    assert!(run_dir.join("epoch_001.safetensors").exists());
    assert!(run_dir.join("epoch_002.safetensors").exists());
    assert!(run_dir.join(BEST_WEIGHTS).exists());

    let log = fs::read_to_string(run_dir.join("log.txt"))?;
    assert!(log.contains("batchsize: 2"));
    assert!(log.contains("Epoch 2 - loss : "));
    Ok(())
}

#[test]
fn test_constant_validation_loss_stops_early() -> Result<()> {
    let fixture = DatasetFixture::new(2, 1)?;
    let mut config = fixture.config();
    config.hyperparams.epochs = 10;
    config.hyperparams.patience = 2;
    config.hyperparams.lr = 0.0;
    config.checkpointing.save_every_epoch = false;

    let result = FusionTrainer::with_device(config, Device::Cpu)?.run()?;

    // Epoch 1 improves on infinity, epochs 2 and 3 exhaust the patience
    assert!(result.early_stopped);
    assert_eq!(result.epochs_run(), 3);
    assert_eq!(result.best_val_loss, result.history[0].validation.loss);

    let run_dir = result.run_dir.expect("run directory");
    assert!(run_dir.join(BEST_WEIGHTS).exists());
    assert!(!run_dir.join("epoch_001.safetensors").exists());
    assert!(fs::read_to_string(run_dir.join("log.txt"))?.contains("Early stopping"));
    Ok(())
}

#[test]
fn test_set_size_truncates_both_splits() -> Result<()> {
    let fixture = DatasetFixture::new(20, 5)?;
    let mut config = fixture.config();
    config.hyperparams.set_size = 18;
    config.hyperparams.batch_size = 4;
    let trainer = FusionTrainer::with_device(config, Device::Cpu)?;

    let (train, valid) = trainer.prepare_data_loaders()?;
    assert_eq!(train.dataset_size(), 18);
    assert_eq!(train.len(), 5);
    assert_eq!(valid.dataset_size(), 2);
    assert_eq!(valid.len(), 1);
    Ok(())
}

#[test]
fn test_missing_dataset_runs_empty_epochs() -> Result<()> {
    let fixture = DatasetFixture::new(0, 0)?;
    let mut config = fixture.config();
    config.data_path = fixture.temp_dir.path().join("does-not-exist");

    let result = FusionTrainer::with_device(config, Device::Cpu)?.run()?;
    let epoch = &result.history[0];
    assert_eq!(epoch.train.loss, 0.0);
    assert_eq!(epoch.train.accuracy, 0.0);
    assert_eq!(epoch.validation.loss, 0.0);
    Ok(())
}

#[test]
fn test_strict_pairing_rejects_mismatched_stems() -> Result<()> {
    let fixture = DatasetFixture::new(2, 1)?;
    let dm_dir = fixture.data_path.join("train").join("decisionmap");
    fs::rename(dm_dir.join("001.png"), dm_dir.join("zzz.png"))?;

    let mut config = fixture.config();
    let lenient = FusionTrainer::with_device(config.clone(), Device::Cpu)?;
    assert!(lenient.prepare_data_loaders().is_ok());

    config.data.strict_pairing = true;
    let strict = FusionTrainer::with_device(config, Device::Cpu)?;
    assert!(strict.prepare_data_loaders().is_err());
    Ok(())
}

#[test]
fn test_gray_images_and_differentiable_ssim() -> Result<()> {
    let fixture = DatasetFixture::new(2, 1)?;
    let mut config = fixture.config();
    config.data.color = crate::training::ColorMode::Gray;
    config.data.resize = Some([6, 6]);
    config.loss.ssim_gradient = true;

    let result = FusionTrainer::with_device(config, Device::Cpu)?.run()?;
    assert_eq!(result.epochs_run(), 1);
    assert!(result.history[0].train.loss.is_finite());
    Ok(())
}
