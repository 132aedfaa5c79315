//! 认知诊断模型的通用接口
//!
//! 所有诊断模型都提供同样的四个操作：训练、评估、保存参数、加载参数。

use std::path::Path;

use crate::{batch::Batch, error::Result, training_record::TrainingRecord};

pub trait Cdm {
    /// 在 `train_data` 上训练 `epoch` 轮；提供 `test_data` 时每轮结束后评估一次
    fn train(
        &mut self,
        train_data: &[Batch],
        test_data: Option<&[Batch]>,
        epoch: usize,
        device: &str,
        lr: f32,
    ) -> Result<TrainingRecord>;

    /// 返回 `(auc, accuracy)`
    fn eval(&mut self, test_data: &[Batch], device: &str) -> Result<(f32, f32)>;

    fn save<P: AsRef<Path>>(&self, filepath: P) -> Result<()>;

    fn load<P: AsRef<Path>>(&mut self, filepath: P) -> Result<()>;
}
