//! 训练 / 评估批次
//!
//! 一个批次就是一组作答记录的列式表示：
//!
//! ```text
//! student_ids     [batch]
//! exercise_ids    [batch]
//! knowledge_emb   [batch × K]   题目考察的知识点 one-hot 掩码
//! cognitive_emb   [batch × C]   题目对应的认知维度掩码
//! labels          [batch]       0 = 答错, 1 = 答对
//! ```
//!
//! 掩码宽度是否等于网络的 K / C 由网络在查表前检查。

use ndarray::{Array1, Array2};

use crate::error::{CdmError, Result};

#[derive(Clone, Debug)]
pub struct Batch {
    pub student_ids: Vec<usize>,
    pub exercise_ids: Vec<usize>,
    pub knowledge_emb: Array2<f32>,
    pub cognitive_emb: Array2<f32>,
    pub labels: Array1<f32>,
}

impl Batch {
    /// **创建批次并检查行数一致、标签只含 0/1**
    pub fn new(
        student_ids: Vec<usize>,
        exercise_ids: Vec<usize>,
        knowledge_emb: Array2<f32>,
        cognitive_emb: Array2<f32>,
        labels: Array1<f32>,
    ) -> Result<Self> {
        let n = student_ids.len();
        if n == 0 {
            return Err(CdmError::InvalidDimension {
                name: "batch_size",
                value: "0".to_string(),
            });
        }

        let rows = [
            ("exercise_ids", exercise_ids.len()),
            ("knowledge_emb", knowledge_emb.nrows()),
            ("cognitive_emb", cognitive_emb.nrows()),
            ("labels", labels.len()),
        ];
        for (context, len) in rows {
            if len != n {
                return Err(CdmError::shape_mismatch(context, &[n], &[len]));
            }
        }

        if let Some(&bad) = labels.iter().find(|&&y| y != 0.0 && y != 1.0) {
            return Err(CdmError::InvalidLabel(bad));
        }

        Ok(Self {
            student_ids,
            exercise_ids,
            knowledge_emb,
            cognitive_emb,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.student_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.student_ids.is_empty()
    }
}
