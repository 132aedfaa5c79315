//! 错误类型
//!
//! 所有失败都直接返回给调用方，不做重试：形状不匹配、ID 越界、
//! 评估数据为空或只含单一类别、参数文件与网络结构不一致等。

use thiserror::Error;

/// **诊断模型的统一错误类型**
#[derive(Debug, Error)]
pub enum CdmError {
    /// 张量形状与预期不一致（批次宽度、加载的参数矩阵等）
    #[error("形状不匹配 ({context}): 期望 {expected:?}, 实际 {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// 嵌入查表时 ID 超出构造时声明的范围
    #[error("{table} 索引越界: id={index}, 表大小={size}")]
    IndexOutOfRange {
        table: &'static str,
        index: usize,
        size: usize,
    },

    /// 构造参数非法（维度为 0、dropout 比例越界等）
    #[error("非法维度 {name}={value}")]
    InvalidDimension { name: &'static str, value: String },

    /// 在空数据集上评估，AUC 无定义
    #[error("评估数据为空，无法计算 AUC")]
    EmptyEvaluation,

    /// 标签只有一个类别，AUC 无定义
    #[error("标签中只有一个类别 ({label})，AUC 无定义")]
    UndefinedAuc { label: f32 },

    /// 标签不是 0/1
    #[error("非法标签 {0}，只接受 0 或 1")]
    InvalidLabel(f32),

    /// 反向传播前没有可用的前向缓存
    #[error("backward 之前必须先执行 forward")]
    MissingForwardCache,

    /// 当前只有 CPU 后端
    #[error("不支持的计算设备: {0}")]
    UnsupportedDevice(String),

    /// 参数文件中缺少某个参数
    #[error("参数文件缺少 {0}")]
    MissingParameter(String),

    /// 参数文件格式版本不兼容
    #[error("不支持的参数文件版本 {0}")]
    UnsupportedVersion(u32),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("二进制编码失败: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("二进制解码失败: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("JSON 处理失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl CdmError {
    pub fn shape_mismatch(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        CdmError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CdmError>;
