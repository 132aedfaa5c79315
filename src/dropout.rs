//! # Dropout 正则化层
//!
//! 诊断网络在两层隐藏层之后各接一个 p=0.5 的 Dropout。
//!
//! 本实现使用 **Inverted Dropout**，训练时进行缩放：
//!
//! ```text
//! 训练时: output = input * mask / (1 - p)
//! 推理时: output = input
//! ```
//!
//! 训练/推理模式是层上的显式标志，由网络统一切换，而不是根据调用方推断。

use ndarray::Array2;
use rand::{Rng, rngs::StdRng};

use crate::net::Layer;

/// **Dropout 正则化层**
pub struct Dropout {
    /// **丢弃率**: 0.0-1.0，表示神经元被丢弃的概率
    pub dropout_rate: f32,

    /// **掩码矩阵**: 1 表示保留，0 表示丢弃；前向生成，反向复用
    mask: Option<Array2<f32>>,

    /// **训练模式标志**
    training: bool,

    rng: StdRng,
}

impl Dropout {
    /// 使用给定随机源创建，便于复现
    pub fn with_rng(dropout_rate: f32, rng: StdRng) -> Self {
        Self {
            dropout_rate,
            mask: None,
            training: true,
            rng,
        }
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// 保留概率为 1 - dropout_rate 的 0/1 掩码
    fn create_mask(&mut self, shape: (usize, usize)) -> Array2<f32> {
        let rate = self.dropout_rate;
        let rng = &mut self.rng;
        Array2::from_shape_fn(shape, |_| {
            let random_val: f32 = rng.random();
            if random_val >= rate { 1.0 } else { 0.0 }
        })
    }

    fn active(&self) -> bool {
        self.training && self.dropout_rate > 0.0
    }
}

impl Layer for Dropout {
    fn layer_type(&self) -> &str {
        "Dropout"
    }

    fn forward(&mut self, input: &Array2<f32>) -> Array2<f32> {
        if !self.active() {
            self.mask = None;
            return input.clone();
        }

        let mask = self.create_mask(input.dim());
        let scale_factor = 1.0 / (1.0 - self.dropout_rate);
        let mut result = input * &mask;
        result *= scale_factor;
        self.mask = Some(mask);
        result
    }

    fn backward(&mut self, grads: &Array2<f32>, _lr: f32) -> Array2<f32> {
        if !self.active() {
            return grads.clone();
        }
        let Some(mask) = self.mask.as_ref() else {
            log::warn!("Dropout.backward 在未执行 forward 的情况下被调用，直接传递梯度");
            return grads.clone();
        };

        let scale_factor = 1.0 / (1.0 - self.dropout_rate);
        let mut result = grads * mask;
        result *= scale_factor;
        result
    }

    fn parameters(&self) -> usize {
        0
    }

    fn set_training_mode(&mut self, training: bool) {
        self.training = training;
    }
}
