//! # Adam 优化器
//!
//! 每个可训练参数矩阵各自持有一个 `Adam`，在层的 `backward` 中直接完成更新，
//! 因此不存在需要手动清零的梯度缓冲区：梯度在每个 minibatch 内计算一次、
//! 使用一次后即被丢弃。
//!
//! ```text
//! m = β₁·m + (1-β₁)·g
//! v = β₂·v + (1-β₂)·g²
//! m̂ = m / (1-β₁ᵗ)
//! v̂ = v / (1-β₂ᵗ)
//! θ = θ - lr · m̂ / (√v̂ + ε)
//! ```
//!
//! 默认超参数与常用实现一致：β₁=0.9, β₂=0.999, ε=1e-8，无权重衰减。

use ndarray::{Array2, Zip};

pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// 已执行的更新步数（用于偏差修正）
    pub timestep: usize,
    /// 一阶矩估计
    pub m: Array2<f32>,
    /// 二阶矩估计
    pub v: Array2<f32>,
}

impl Adam {
    /// **为给定形状的参数创建优化器状态**
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            timestep: 0,
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    /// **执行一步参数更新**
    ///
    /// `params` 与 `grads` 的形状必须与创建时一致，由调用层保证。
    pub fn step(&mut self, params: &mut Array2<f32>, grads: &Array2<f32>, lr: f32) {
        debug_assert_eq!(params.dim(), self.m.dim());
        debug_assert_eq!(grads.dim(), self.m.dim());

        self.timestep += 1;
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(self.timestep as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.timestep as i32);

        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grads)
            .for_each(|p, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
            });
    }

    /// 清空动量和步数
    pub fn reset(&mut self) {
        self.timestep = 0;
        self.m.fill(0.0);
        self.v.fill(0.0);
    }
}
