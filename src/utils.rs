/// 工具函数模块
///
/// 激活函数与参数初始化等通用工具
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// 标量 sigmoid，对大幅值输入保持数值稳定
#[inline]
pub fn sigmoid_scalar(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// 逐元素 sigmoid
pub fn sigmoid(x: &Array2<f32>) -> Array2<f32> {
    let mut result = x.clone();
    result.par_map_inplace(|v| *v = sigmoid_scalar(*v));
    result
}

/// 由 sigmoid 的输出 s 计算导数 s·(1-s)
pub fn sigmoid_grad_from_output(output: &Array2<f32>) -> Array2<f32> {
    output.mapv(|s| s * (1.0 - s))
}

/// **Xavier/Glorot 正态初始化**
///
/// 对形状为 (rows, cols) 的二维参数：
/// ```text
/// fan_in  = cols
/// fan_out = rows
/// std     = sqrt(2 / (fan_in + fan_out))
/// ```
/// 线性层权重按 (out, in) 存放，嵌入表按 (num, dim) 存放，两者都适用这一约定。
pub fn xavier_normal<R: Rng + ?Sized>(rng: &mut R, shape: (usize, usize)) -> Array2<f32> {
    let (rows, cols) = shape;
    let std = (2.0 / (rows + cols).max(1) as f32).sqrt();
    match Normal::new(0.0, std) {
        Ok(normal) => Array2::from_shape_fn(shape, |_| normal.sample(rng)),
        Err(e) => {
            log::warn!("Xavier 初始化: 正态分布构造失败 ({})，改用均匀分布", e);
            let limit = std * 3f32.sqrt();
            Array2::from_shape_fn(shape, |_| rng.random_range(-limit..limit))
        }
    }
}
