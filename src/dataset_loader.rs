//! # 作答记录加载
//!
//! 数据文件是一个 JSON 数组，每个元素是一条作答记录：
//!
//! ```json
//! {"user_id": 1, "item_id": 3, "knowledge_code": [2, 5], "cognitive_code": [1], "score": 1}
//! ```
//!
//! `user_id` / `item_id` / 知识点编码 / 认知编码都从 1 开始编号，
//! 转换成批次时减 1 变成表下标，编码展开为 one-hot 掩码。

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{
    batch::Batch,
    error::{CdmError, Result},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseLog {
    pub user_id: usize,
    pub item_id: usize,
    pub knowledge_code: Vec<usize>,
    #[serde(default)]
    pub cognitive_code: Vec<usize>,
    pub score: f32,
}

/// 数据集中出现的最大编号：`(student_n, exer_n, knowledge_n, cognitive_n)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatasetDimensions {
    pub student_n: usize,
    pub exer_n: usize,
    pub knowledge_n: usize,
    pub cognitive_n: usize,
}

/// 从 JSON 文件读取全部作答记录
pub fn load_response_logs<P: AsRef<Path>>(path: P) -> Result<Vec<ResponseLog>> {
    let json = fs::read_to_string(path.as_ref())?;
    let logs: Vec<ResponseLog> = serde_json::from_str(&json)?;
    log::info!("读取 {} 条作答记录: {}", logs.len(), path.as_ref().display());
    Ok(logs)
}

/// 按最大编号推断各维度大小
pub fn infer_dimensions(logs: &[ResponseLog]) -> DatasetDimensions {
    logs.iter().fold(DatasetDimensions::default(), |dims, log| DatasetDimensions {
        student_n: dims.student_n.max(log.user_id),
        exer_n: dims.exer_n.max(log.item_id),
        knowledge_n: log
            .knowledge_code
            .iter()
            .copied()
            .fold(dims.knowledge_n, usize::max),
        cognitive_n: log
            .cognitive_code
            .iter()
            .copied()
            .fold(dims.cognitive_n, usize::max),
    })
}

/// 1 起始编号转 0 起始下标
fn to_index(table: &'static str, code: usize, size: usize) -> Result<usize> {
    if code == 0 || code > size {
        return Err(CdmError::IndexOutOfRange {
            table,
            index: code,
            size,
        });
    }
    Ok(code - 1)
}

/// **把作答记录切成批次**
///
/// 最后一个批次可能不满 `batch_size`。编码为 0 或超过维度时报错。
pub fn into_batches(
    logs: &[ResponseLog],
    batch_size: usize,
    knowledge_n: usize,
    cognitive_n: usize,
) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(CdmError::InvalidDimension {
            name: "batch_size",
            value: "0".to_string(),
        });
    }

    let mut batches = Vec::with_capacity(logs.len().div_ceil(batch_size));
    for chunk in logs.chunks(batch_size) {
        let n = chunk.len();
        let mut student_ids = Vec::with_capacity(n);
        let mut exercise_ids = Vec::with_capacity(n);
        let mut knowledge_emb = Array2::<f32>::zeros((n, knowledge_n));
        let mut cognitive_emb = Array2::<f32>::zeros((n, cognitive_n));
        let mut labels = Array1::<f32>::zeros(n);

        for (row, log) in chunk.iter().enumerate() {
            // 学生 / 题目范围由网络在查表时检查
            student_ids.push(log.user_id.checked_sub(1).ok_or(CdmError::IndexOutOfRange {
                table: "user_id",
                index: 0,
                size: 0,
            })?);
            exercise_ids.push(log.item_id.checked_sub(1).ok_or(CdmError::IndexOutOfRange {
                table: "item_id",
                index: 0,
                size: 0,
            })?);
            for &code in &log.knowledge_code {
                knowledge_emb[[row, to_index("knowledge_code", code, knowledge_n)?]] = 1.0;
            }
            for &code in &log.cognitive_code {
                cognitive_emb[[row, to_index("cognitive_code", code, cognitive_n)?]] = 1.0;
            }
            labels[row] = log.score;
        }

        batches.push(Batch::new(
            student_ids,
            exercise_ids,
            knowledge_emb,
            cognitive_emb,
            labels,
        )?);
    }

    log::debug!("{} 条记录切分为 {} 个批次", logs.len(), batches.len());
    Ok(batches)
}
