//! # 单调线性层（Positive Linear）
//!
//! 诊断网络要求"掌握度越高 / 题目越容易，预测的答对概率不会下降"。
//! 只要网络中每个线性层的有效权重都非负，而激活函数单调递增，整个网络就对
//! 输入的每个坐标单调不减。
//!
//! 本层不对存储的权重做裁剪，而是在前向时重新参数化：
//!
//! ```text
//! W_eff = 2 · relu(-W) + W      // 逐元素，等价于 |W|
//! y     = x · W_effᵀ + b
//! ```
//!
//! 存储的 `W` 可以自由取任意符号，梯度穿过重新参数化回到 `W`：
//!
//! ```text
//! ∂W_eff/∂W = -1   (W < 0)
//!            = +1   (W ≥ 0)
//! ```

use ndarray::{Array2, Axis, Zip};
use rand::Rng;

use crate::{adam::Adam, net::Layer, utils::xavier_normal};

/// **单调线性层**
pub struct PosLinear {
    /// **存储权重** (out_dim × in_dim)，自由训练
    pub weight: Array2<f32>,

    /// **偏置** (1 × out_dim)，初始化为 0
    pub bias: Array2<f32>,

    pub optimizer_weight: Adam,
    pub optimizer_bias: Adam,

    /// 缓存的输入 (batch × in_dim)
    cached_input: Option<Array2<f32>>,
}

impl PosLinear {
    /// **创建单调线性层**
    ///
    /// 权重使用 Xavier 正态初始化，偏置全零。
    pub fn new<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        PosLinear {
            weight: xavier_normal(rng, (out_dim, in_dim)),
            bias: Array2::zeros((1, out_dim)),
            optimizer_weight: Adam::new((out_dim, in_dim)),
            optimizer_bias: Adam::new((1, out_dim)),
            cached_input: None,
        }
    }

    pub fn in_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_dim(&self) -> usize {
        self.weight.nrows()
    }

    /// 有效权重 `2·relu(-W) + W`，每个元素都 ≥ 0
    pub fn effective_weight(&self) -> Array2<f32> {
        self.weight.mapv(|w| 2.0 * (-w).max(0.0) + w)
    }

    /// 不缓存输入的前向计算，推理路径使用
    pub fn apply(&self, input: &Array2<f32>) -> Array2<f32> {
        input.dot(&self.effective_weight().t()) + &self.bias
    }
}

impl Layer for PosLinear {
    fn layer_type(&self) -> &str {
        "PosLinear"
    }

    fn forward(&mut self, input: &Array2<f32>) -> Array2<f32> {
        let output = self.apply(input);
        self.cached_input = Some(input.clone());
        output
    }

    /// **反向传播**
    ///
    /// ```text
    /// grad_W_eff = gradsᵀ · x
    /// grad_W     = grad_W_eff ⊙ sign(W)      // W = 0 处取 +1
    /// grad_b     = sum(grads, axis=0)
    /// grad_x     = grads · W_eff
    /// ```
    ///
    /// 输入梯度用更新前的权重计算。
    fn backward(&mut self, grads: &Array2<f32>, lr: f32) -> Array2<f32> {
        let Some(input) = self.cached_input.take() else {
            log::warn!("PosLinear.backward 在未执行 forward 的情况下被调用，返回零梯度");
            return Array2::zeros((grads.nrows(), self.in_dim()));
        };

        let effective = self.effective_weight();
        let grad_input = grads.dot(&effective);

        let mut grad_weight = grads.t().dot(&input);
        Zip::from(&mut grad_weight)
            .and(&self.weight)
            .for_each(|g, &w| {
                if w < 0.0 {
                    *g = -*g;
                }
            });
        let grad_bias = grads.sum_axis(Axis(0)).insert_axis(Axis(0));

        self.optimizer_weight.step(&mut self.weight, &grad_weight, lr);
        self.optimizer_bias.step(&mut self.bias, &grad_bias, lr);

        grad_input
    }

    fn parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_effective_weight_is_non_negative() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut layer = PosLinear::new(6, 4, &mut rng);
        layer.weight[[0, 0]] = -3.5;
        layer.weight[[1, 1]] = 2.0;

        let effective = layer.effective_weight();
        assert!(effective.iter().all(|&w| w >= 0.0));
        assert_eq!(effective[[0, 0]], 3.5);
        assert_eq!(effective[[1, 1]], 2.0);
    }

    #[test]
    fn test_forward_uses_absolute_weights() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut layer = PosLinear::new(2, 1, &mut rng);
        layer.weight = Array2::from_shape_vec((1, 2), vec![-1.0, 2.0]).unwrap();
        layer.bias = Array2::from_shape_vec((1, 1), vec![0.5]).unwrap();

        let input = Array2::from_shape_vec((1, 2), vec![1.0, 1.0]).unwrap();
        let output = layer.forward(&input);
        assert!((output[[0, 0]] - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_weight_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut layer = PosLinear::new(3, 2, &mut rng);
        layer.weight = Array2::from_shape_vec((2, 3), vec![-0.4, 0.3, 0.9, 0.2, -0.7, -0.1]).unwrap();
        let input = Array2::from_shape_vec((2, 3), vec![0.5, -1.0, 2.0, 1.5, 0.25, -0.5]).unwrap();

        // 损失 L = sum(y)，所以 grads 全为 1
        let loss = |layer: &PosLinear| -> f32 {
            (input.dot(&layer.effective_weight().t()) + &layer.bias).sum()
        };

        let eps = 1e-3;
        let mut numeric = Array2::<f32>::zeros((2, 3));
        for i in 0..2 {
            for j in 0..3 {
                let mut plus = PosLinear::new(3, 2, &mut rng);
                plus.weight = layer.weight.clone();
                plus.weight[[i, j]] += eps;
                let mut minus = PosLinear::new(3, 2, &mut rng);
                minus.weight = layer.weight.clone();
                minus.weight[[i, j]] -= eps;
                numeric[[i, j]] = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            }
        }

        // lr 极小，用更新方向反推梯度符号
        let before = layer.weight.clone();
        layer.forward(&input);
        layer.backward(&Array2::ones((2, 2)), 1e-3);
        for ((&b, &a), &g) in before.iter().zip(layer.weight.iter()).zip(numeric.iter()) {
            assert_eq!((b - a) > 0.0, g > 0.0, "gradient sign mismatch: numeric {}", g);
        }
    }

    #[test]
    fn test_backward_without_forward_returns_input_shaped_zeros() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut layer = PosLinear::new(5, 3, &mut rng);
        let before = layer.weight.clone();

        let grads = layer.backward(&Array2::ones((2, layer.out_dim())), 0.1);

        assert_eq!(grads.dim(), (2, layer.in_dim()));
        assert!(grads.iter().all(|&g| g == 0.0));
        assert_eq!(layer.weight, before);
    }
}
