//! # NCDM - 神经认知诊断模型
//!
//! 认知诊断要回答的问题是：一个学生在各个知识点上掌握得怎么样？
//! 模型从"学生-题目-作答结果"记录中学习学生的潜在掌握度和题目的难度、区分度，
//! 并预测学生答对某道题的概率。
//!
//! 本实现在经典的知识点空间之外增加了一个并行的**认知维度**空间，两个空间的
//! 交互特征拼接后送入单调神经网络。
//!
//! ## 核心设计
//!
//! 1. **纯 Rust 实现**：只依赖 `ndarray` 做矩阵运算，手写前向/反向传播
//! 2. **单调性约束**：所有线性层的有效权重非负，掌握度越高预测概率不会越低
//! 3. **显式模式**：训练 / 推理模式是网络上的显式标志，只影响 Dropout
//! 4. **显式优化器**：每个参数矩阵持有自己的 Adam 状态
//!
//! ## 模块组织
//!
//! ### 模型
//! - `pos_linear`: 单调线性层（有效权重非负）
//! - `embeddings`: 学生 / 题目嵌入表
//! - `dropout`: Dropout 正则化层
//! - `net`: 诊断网络，组合上述组件
//! - `ncdm`: 模型封装，训练 / 评估 / 保存 / 加载
//! - `cdm`: 认知诊断模型的通用接口
//!
//! ### 工具
//! - `adam`: Adam 优化器
//! - `batch`: 训练批次
//! - `dataset_loader`: 作答记录读取与分批
//! - `device`: 计算设备标识
//! - `metrics`: AUC、准确率与 BCE 损失
//! - `model_serialization`: 参数持久化
//! - `training_record`: 训练过程记录
//! - `utils`: 激活函数与初始化

pub mod adam; // Adam 优化器
pub mod batch; // 训练批次：学生ID、题目ID、知识点掩码、认知维度掩码、标签
pub mod cdm; // 认知诊断模型接口：train / eval / save / load
pub mod dataset_loader; // 作答记录 JSON 读取与分批
pub mod device; // 计算设备标识
pub mod dropout; // Dropout 层
pub mod embeddings; // 嵌入表
pub mod error; // 错误类型
pub mod metrics; // 评估指标
pub mod model_serialization; // 参数保存与加载
pub mod ncdm; // 模型封装与训练循环
pub mod net; // 诊断网络
pub mod pos_linear; // 单调线性层
pub mod training_record; // 训练记录
pub mod utils; // 工具函数

// ============================================================================
// 重导出核心类型
// ============================================================================

pub use batch::Batch;
pub use cdm::Cdm;
pub use dataset_loader::{
    DatasetDimensions, ResponseLog, infer_dimensions, into_batches, load_response_logs,
};
pub use device::Device;
pub use error::{CdmError, Result};
pub use metrics::{accuracy_score, binary_cross_entropy, roc_auc_score};
pub use model_serialization::{load_params, save_params};
pub use ncdm::{NCDM, TrainConfig};
pub use net::{Layer, Net, NetConfig};
pub use training_record::{EpochRecord, StepRecord, TrainingRecord};

// ============================================================================
// 网络超参数
// ============================================================================

/// **第一层隐藏层宽度**
///
/// 交互特征 (K+C) 先被映射到 512 维。
pub const PREDNET_LEN1: usize = 512;

/// **第二层隐藏层宽度**
pub const PREDNET_LEN2: usize = 256;

/// **Dropout 丢弃率**
///
/// 两个隐藏层之后各一个，只在训练模式下生效。
pub const DROPOUT_RATE: f32 = 0.5;

// ============================================================================
// 训练默认值
// ============================================================================

/// 默认训练轮数
pub const DEFAULT_EPOCHS: usize = 10;

/// 默认学习率（Adam）
pub const DEFAULT_LR: f32 = 0.002;

/// 默认批大小，供数据分批使用
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// 准确率的判定阈值：预测概率 ≥ 0.5 视为答对
pub const ACCURACY_THRESHOLD: f32 = 0.5;

// ============================================================================
// 数值稳定性常量
// ============================================================================

/// **BCE 损失的对数下限**
///
/// `ln(p)` 在 p→0 时发散，损失计算中把对数截断到 -100。
pub const BCE_LOG_FLOOR: f32 = -100.0;

/// **预测概率的边界**
///
/// f32 的 σ(z) 在 z 超过约 17 时舍入为 1.0，输出截断到
/// `[PROB_EPS, 1 - PROB_EPS]`，保证预测严格落在 (0,1) 内。
pub const PROB_EPS: f32 = f32::EPSILON;
