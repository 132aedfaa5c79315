//! # NCDM 模型封装
//!
//! `NCDM` 独占一个诊断网络，负责训练循环、评估和参数持久化。
//!
//! ## 训练循环
//!
//! ```text
//! for epoch in 0..epochs:
//!     for batch in train_data:
//!         p    = net.forward(batch)           // 训练模式，Dropout 生效
//!         loss = BCE(p, y)
//!         net.backward((p - y) / batch_size)  // 计算梯度并立即执行 Adam 更新
//!     打印平均损失
//!     if test_data: 评估并打印 AUC / 准确率
//! ```
//!
//! 每次调用 `train` 都从全新的 Adam 状态开始。训练中途失败会丢失当前 epoch 的进度，
//! 调用方可以从上一次 `save` 的参数重新开始。

use std::path::Path;

use ndarray::Array1;

use crate::{
    ACCURACY_THRESHOLD, DEFAULT_EPOCHS, DEFAULT_LR,
    batch::Batch,
    cdm::Cdm,
    device::Device,
    error::Result,
    metrics::{accuracy_score, binary_cross_entropy, roc_auc_score},
    model_serialization::{load_params, save_params},
    net::{Net, NetConfig},
    training_record::{EpochRecord, TrainingRecord},
};

/// **训练配置**
#[derive(Clone, Debug, PartialEq)]
pub struct TrainConfig {
    pub epoch: usize,
    pub lr: f32,
    pub device: String,
    /// 为 true 时不打印每个 epoch 的结果（日志仍然输出）
    pub silence: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_EPOCHS,
            lr: DEFAULT_LR,
            device: Device::Cpu.to_string(),
            silence: false,
        }
    }
}

/// **神经认知诊断模型**
#[allow(clippy::upper_case_acronyms)]
pub struct NCDM {
    pub ncdm_net: Net,
    device: Device,
    silence: bool,
}

impl NCDM {
    /// 使用默认隐藏层宽度和 Dropout 构造
    pub fn new(
        knowledge_n: usize,
        exer_n: usize,
        student_n: usize,
        cognitive_n: usize,
    ) -> Result<Self> {
        Self::with_config(&NetConfig::new(knowledge_n, exer_n, student_n, cognitive_n))
    }

    pub fn with_config(config: &NetConfig) -> Result<Self> {
        Ok(Self {
            ncdm_net: Net::new(config)?,
            device: Device::Cpu,
            silence: false,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn set_silence(&mut self, silence: bool) {
        self.silence = silence;
    }

    /// 解析设备标识并把网络"放到"该设备上
    fn to_device(&mut self, device: &str) -> Result<()> {
        self.device = Device::resolve(device)?;
        Ok(())
    }

    /// 按 `TrainConfig` 训练
    pub fn train_with_config(
        &mut self,
        train_data: &[Batch],
        test_data: Option<&[Batch]>,
        config: &TrainConfig,
    ) -> Result<TrainingRecord> {
        let previous = self.silence;
        self.silence = config.silence;
        let result = self.train(train_data, test_data, config.epoch, &config.device, config.lr);
        self.silence = previous;
        result
    }

    /// **单个 minibatch 的优化步**，返回该批的 BCE 损失
    fn train_step(&mut self, batch: &Batch, lr: f32) -> Result<f32> {
        let pred = self.ncdm_net.forward(
            &batch.student_ids,
            &batch.exercise_ids,
            batch.knowledge_emb.view(),
            batch.cognitive_emb.view(),
        )?;
        let loss = binary_cross_entropy(&pred, &batch.labels);

        // BCE(σ(z)) 对 z 的梯度为 (p - y)，取批均值
        let grad_logits = (&pred - &batch.labels) / pred.len() as f32;
        self.ncdm_net.backward(&grad_logits, lr)?;

        Ok(loss)
    }

    /// **推理模式预测一个批次**，返回每条记录的答对概率
    pub fn predict(&mut self, batch: &Batch) -> Result<Array1<f32>> {
        self.ncdm_net.set_training_mode(false);
        self.ncdm_net.predict(
            &batch.student_ids,
            &batch.exercise_ids,
            batch.knowledge_emb.view(),
            batch.cognitive_emb.view(),
        )
    }

    /// 学生在知识点 / 认知维度上的掌握度，见 [`Net::student_mastery`]
    pub fn student_mastery(&self) -> (ndarray::Array2<f32>, ndarray::Array2<f32>) {
        self.ncdm_net.student_mastery()
    }
}

impl Cdm for NCDM {
    fn train(
        &mut self,
        train_data: &[Batch],
        test_data: Option<&[Batch]>,
        epoch: usize,
        device: &str,
        lr: f32,
    ) -> Result<TrainingRecord> {
        self.to_device(device)?;
        self.ncdm_net.reset_optimizers();

        log::info!(
            "开始训练: epochs={}, lr={}, batches={}, device={}, 参数量={}",
            epoch,
            lr,
            train_data.len(),
            self.device,
            self.ncdm_net.total_parameters()
        );

        let mut record = TrainingRecord::new();
        let mut global_step = 0;

        for epoch_i in 0..epoch {
            // 上一轮评估会切到推理模式
            self.ncdm_net.set_training_mode(true);

            let mut epoch_losses = Vec::with_capacity(train_data.len());
            for batch in train_data {
                let loss = self.train_step(batch, lr)?;
                global_step += 1;
                if !loss.is_finite() {
                    log::warn!("第 {} 步损失非有限值: {}", global_step, loss);
                }
                log::debug!("[Epoch {}] step {}: loss = {:.6}", epoch_i, global_step, loss);
                epoch_losses.push(loss);
                record.push_step(global_step, loss);
            }

            let mean_loss = if epoch_losses.is_empty() {
                log::warn!("[Epoch {}] 训练数据为空，没有执行任何更新", epoch_i);
                f32::NAN
            } else {
                epoch_losses.iter().sum::<f32>() / epoch_losses.len() as f32
            };
            if !self.silence {
                println!("[Epoch {}] average loss: {:.6}", epoch_i, mean_loss);
            }

            let (auc, accuracy) = match test_data {
                Some(test_data) => {
                    let (auc, accuracy) = self.eval(test_data, device)?;
                    if !self.silence {
                        println!("[Epoch {}] auc: {:.6}, accuracy: {:.6}", epoch_i, auc, accuracy);
                    }
                    (Some(auc), Some(accuracy))
                }
                None => (None, None),
            };

            record.push_epoch(EpochRecord {
                epoch: epoch_i,
                mean_loss,
                auc,
                accuracy,
            });
        }

        self.ncdm_net.set_training_mode(false);
        Ok(record)
    }

    /// **评估**
    ///
    /// 切换到推理模式，对所有批次做前向预测，不计算梯度、不修改任何参数。
    /// 空数据集或单一类别时返回错误。
    fn eval(&mut self, test_data: &[Batch], device: &str) -> Result<(f32, f32)> {
        self.to_device(device)?;
        self.ncdm_net.set_training_mode(false);

        let mut y_true: Vec<f32> = Vec::new();
        let mut y_pred: Vec<f32> = Vec::new();
        for batch in test_data {
            let pred = self.ncdm_net.predict(
                &batch.student_ids,
                &batch.exercise_ids,
                batch.knowledge_emb.view(),
                batch.cognitive_emb.view(),
            )?;
            y_pred.extend(pred.iter());
            y_true.extend(batch.labels.iter());
        }

        let auc = roc_auc_score(&y_true, &y_pred)?;
        let accuracy = accuracy_score(&y_true, &y_pred, ACCURACY_THRESHOLD)?;
        Ok((auc, accuracy))
    }

    fn save<P: AsRef<Path>>(&self, filepath: P) -> Result<()> {
        save_params(&self.ncdm_net, filepath.as_ref())?;
        log::info!("save parameters to {}", filepath.as_ref().display());
        Ok(())
    }

    fn load<P: AsRef<Path>>(&mut self, filepath: P) -> Result<()> {
        load_params(&mut self.ncdm_net, filepath.as_ref())?;
        log::info!("load parameters from {}", filepath.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CdmError;
    use ndarray::Array2;

    fn tiny_model() -> NCDM {
        let config = NetConfig::new(3, 4, 4, 2).with_hidden(8, 4).with_seed(9);
        NCDM::with_config(&config).unwrap()
    }

    fn tiny_batch() -> Batch {
        Batch::new(
            vec![0, 1, 2, 3],
            vec![0, 1, 2, 3],
            Array2::ones((4, 3)),
            Array2::ones((4, 2)),
            Array1::from(vec![1.0, 0.0, 1.0, 0.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_default_train_config() {
        let config = TrainConfig::default();
        assert_eq!(config.epoch, 10);
        assert!((config.lr - 0.002).abs() < 1e-9);
        assert_eq!(config.device, "cpu");
    }

    #[test]
    fn test_train_records_every_step_and_epoch() {
        let mut model = tiny_model();
        model.set_silence(true);
        let data = vec![tiny_batch(), tiny_batch()];

        let record = model.train(&data, Some(&data), 3, "cpu", 0.01).unwrap();
        assert_eq!(model.device(), Device::Cpu);

        assert_eq!(record.steps.len(), 6);
        assert_eq!(record.steps.last().map(|s| s.step), Some(6));
        assert_eq!(record.epochs.len(), 3);
        assert!(record.epochs.iter().all(|e| e.auc.is_some() && e.accuracy.is_some()));
        assert!(!model.ncdm_net.is_training());
    }

    #[test]
    fn test_accelerator_device_rejected() {
        let mut model = tiny_model();
        let data = vec![tiny_batch()];
        assert!(matches!(
            model.train(&data, None, 1, "cuda:0", 0.01),
            Err(CdmError::UnsupportedDevice(_))
        ));
        assert!(matches!(model.eval(&data, "mps"), Err(CdmError::UnsupportedDevice(_))));
    }

    #[test]
    fn test_eval_empty_is_error() {
        let mut model = tiny_model();
        assert!(matches!(model.eval(&[], "cpu"), Err(CdmError::EmptyEvaluation)));
    }

    #[test]
    fn test_eval_does_not_touch_parameters() {
        let mut model = tiny_model();
        let before: Vec<Array2<f32>> = model
            .ncdm_net
            .named_parameters()
            .into_iter()
            .map(|(_, p)| p.clone())
            .collect();

        model.eval(&[tiny_batch()], "cpu").unwrap();

        for ((name, after), before) in model.ncdm_net.named_parameters().into_iter().zip(before) {
            assert_eq!(after, &before, "{} changed during eval", name);
        }
    }
}
