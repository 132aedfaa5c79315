//! # 嵌入表（Embedding Table）
//!
//! 诊断网络的所有"潜在特质"都保存在嵌入表里，每行对应一个学生或一道题：
//!
//! | 表 | 形状 | 含义 |
//! |----|------|------|
//! | `student_emb`   | student_n × K | 学生在各知识点上的掌握度 logit |
//! | `student_emb2`  | student_n × C | 学生在各认知维度上的掌握度 logit |
//! | `k_difficulty`  | exer_n × K    | 题目在各知识点上的难度 logit |
//! | `k_difficulty2` | exer_n × C    | 题目在各认知维度上的难度 logit |
//! | `e_difficulty`  | exer_n × 1    | 题目区分度 logit（知识空间） |
//! | `e_difficulty2` | exer_n × 1    | 题目区分度 logit（认知空间） |
//!
//! 表中存放的是未经 sigmoid 的原始值，压缩到 [0,1] 由网络负责。
//!
//! ## 梯度
//!
//! 查表的反向传播是一次 scatter-add：批次中第 i 行的梯度累加到 `ids[i]` 对应的行。
//! 同一个 ID 在批次中出现多次时梯度会叠加。得到的是整张表大小的稠密梯度，
//! 未出现的行梯度为 0，但 Adam 的动量仍会推动这些行，这与稠密嵌入的常规训练行为一致。

use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;

use crate::{
    adam::Adam,
    error::{CdmError, Result},
    utils::xavier_normal,
};

/// **嵌入表结构体**
pub struct Embedding {
    /// 表名，用于错误信息和参数文件
    pub name: &'static str,

    /// **嵌入矩阵** (num_embeddings × embedding_dim)，可训练
    pub weight: Array2<f32>,

    /// 该表专属的 Adam 状态
    pub optimizer: Adam,

    /// 前向时查询的 ID，反向时据此回写梯度
    cached_ids: Option<Vec<usize>>,
}

impl Embedding {
    /// **创建嵌入表并做 Xavier 正态初始化**
    pub fn new<R: Rng + ?Sized>(
        name: &'static str,
        num_embeddings: usize,
        embedding_dim: usize,
        rng: &mut R,
    ) -> Self {
        let shape = (num_embeddings, embedding_dim);
        Self {
            name,
            weight: xavier_normal(rng, shape),
            optimizer: Adam::new(shape),
            cached_ids: None,
        }
    }

    pub fn num_embeddings(&self) -> usize {
        self.weight.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.weight.ncols()
    }

    /// 检查所有 ID 都落在表范围内
    pub fn check_ids(&self, ids: &[usize]) -> Result<()> {
        let size = self.num_embeddings();
        match ids.iter().find(|&&id| id >= size) {
            Some(&index) => Err(CdmError::IndexOutOfRange {
                table: self.name,
                index,
                size,
            }),
            None => Ok(()),
        }
    }

    /// **按 ID 查表**
    ///
    /// 返回 (batch, embedding_dim)。越界 ID 直接报错，不做回退。
    pub fn lookup(&self, ids: &[usize]) -> Result<Array2<f32>> {
        self.check_ids(ids)?;
        Ok(self.weight.select(Axis(0), ids))
    }

    /// 查表并缓存 ID，供 `backward` 使用
    pub fn forward(&mut self, ids: &[usize]) -> Result<Array2<f32>> {
        let rows = self.lookup(ids)?;
        self.cached_ids = Some(ids.to_vec());
        Ok(rows)
    }

    /// **反向传播：scatter-add 梯度并更新**
    ///
    /// `grads` 形状为 (batch, embedding_dim)，行顺序与前向时的 ID 一致。
    pub fn backward(&mut self, grads: ArrayView2<f32>, lr: f32) {
        let Some(ids) = self.cached_ids.take() else {
            log::warn!("{}.backward 在未执行 forward 的情况下被调用，跳过参数更新", self.name);
            return;
        };

        let mut grad_table = Array2::<f32>::zeros(self.weight.dim());
        for (row, &id) in grads.rows().into_iter().zip(ids.iter()) {
            let mut target = grad_table.row_mut(id);
            target += &row;
        }

        self.optimizer.step(&mut self.weight, &grad_table, lr);
    }

    pub fn parameters(&self) -> usize {
        self.weight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn table() -> Embedding {
        let mut rng = StdRng::seed_from_u64(11);
        Embedding::new("test_emb", 5, 3, &mut rng)
    }

    #[test]
    fn test_lookup_returns_rows_in_order() {
        let emb = table();
        let rows = emb.lookup(&[4, 0, 4]).unwrap();

        assert_eq!(rows.dim(), (3, emb.embedding_dim()));
        assert_eq!(rows.row(0), emb.weight.row(4));
        assert_eq!(rows.row(1), emb.weight.row(0));
        assert_eq!(rows.row(2), emb.weight.row(4));
    }

    #[test]
    fn test_out_of_range_id_fails() {
        let emb = table();
        match emb.lookup(&[1, 5]) {
            Err(CdmError::IndexOutOfRange { index, size, .. }) => {
                assert_eq!(index, 5);
                assert_eq!(size, 5);
            }
            other => panic!("expected IndexOutOfRange, got {:?}", other.map(|a| a.dim())),
        }
    }

    #[test]
    fn test_backward_only_touches_looked_up_rows_on_first_step() {
        let mut emb = table();
        let before = emb.weight.clone();

        emb.forward(&[2]).unwrap();
        emb.backward(Array2::<f32>::ones((1, 3)).view(), 0.01);

        for id in 0..5 {
            let changed = emb.weight.row(id) != before.row(id);
            assert_eq!(changed, id == 2, "row {} changed = {}", id, changed);
        }
        // 正梯度 => 参数减小
        assert!(emb.weight.row(2).iter().zip(before.row(2)).all(|(a, b)| a < b));
    }
}
