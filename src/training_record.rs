//! 训练过程记录
//!
//! 每个优化步记录一次损失，每个 epoch 记录平均损失和（如果提供了测试集）
//! AUC / 准确率。记录只供外部绘图或日志使用，不影响模型本身。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 单个优化步
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 全局步数，从 1 开始，跨 epoch 连续
    pub step: usize,
    pub loss: f32,
}

/// 单个 epoch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub mean_loss: f32,
    pub auc: Option<f32>,
    pub accuracy: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub steps: Vec<StepRecord>,
    pub epochs: Vec<EpochRecord>,
}

impl TrainingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_step(&mut self, step: usize, loss: f32) {
        self.steps.push(StepRecord { step, loss });
    }

    pub fn push_epoch(&mut self, record: EpochRecord) {
        self.epochs.push(record);
    }

    pub fn last_epoch(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    /// 各 epoch 的平均损失
    pub fn epoch_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.mean_loss).collect()
    }

    /// 以 JSON 保存，方便用其他工具画图
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::info!("训练记录已保存: {}", path.as_ref().display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
