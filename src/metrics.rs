//! # 评估指标与损失
//!
//! - **AUC**：正样本得分高于负样本得分的概率，基于排名计算，相同得分取平均排名
//! - **准确率**：预测概率 ≥ 阈值视为答对，与真实标签比较
//! - **BCE**：二元交叉熵，训练目标
//!
//! ## AUC 的秩和公式（Mann–Whitney U）
//!
//! ```text
//! AUC = (R₊ - n₊(n₊+1)/2) / (n₊ · n₋)
//! ```
//! 其中 R₊ 为所有正样本的排名之和（排名从 1 开始，并列取平均）。
//!
//! ## 未定义的情形
//!
//! 空数据或只含一个类别时 AUC 没有意义，这里直接返回错误，不返回哨兵值。

use ndarray::Array1;

use crate::{
    BCE_LOG_FLOOR,
    error::{CdmError, Result},
};

fn check_labels(y_true: &[f32]) -> Result<()> {
    match y_true.iter().find(|&&y| y != 0.0 && y != 1.0) {
        Some(&bad) => Err(CdmError::InvalidLabel(bad)),
        None => Ok(()),
    }
}

fn check_lengths(y_true: &[f32], y_score: &[f32]) -> Result<()> {
    if y_true.is_empty() {
        return Err(CdmError::EmptyEvaluation);
    }
    if y_true.len() != y_score.len() {
        return Err(CdmError::shape_mismatch(
            "y_score",
            &[y_true.len()],
            &[y_score.len()],
        ));
    }
    Ok(())
}

/// **ROC-AUC**
pub fn roc_auc_score(y_true: &[f32], y_score: &[f32]) -> Result<f32> {
    check_lengths(y_true, y_score)?;
    check_labels(y_true)?;

    let n_pos = y_true.iter().filter(|&&y| y == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(CdmError::UndefinedAuc { label: y_true[0] });
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    // 并列得分取平均排名
    let mut rank_sum_pos = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && y_score[order[end]] == y_score[order[start]] {
            end += 1;
        }
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end]
            .iter()
            .filter(|&&i| y_true[i] == 1.0)
            .count();
        rank_sum_pos += avg_rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    let auc = (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg);
    Ok(auc as f32)
}

/// **准确率**：`y_pred >= threshold` 与标签一致的比例
pub fn accuracy_score(y_true: &[f32], y_pred: &[f32], threshold: f32) -> Result<f32> {
    check_lengths(y_true, y_pred)?;
    check_labels(y_true)?;

    let correct = y_true
        .iter()
        .zip(y_pred)
        .filter(|&(&y, &p)| (p >= threshold) == (y == 1.0))
        .count();
    Ok(correct as f32 / y_true.len() as f32)
}

/// **二元交叉熵（批均值）**
///
/// ```text
/// L = -mean( y·ln(p) + (1-y)·ln(1-p) )
/// ```
/// 对数截断到 `BCE_LOG_FLOOR`，p 恰好为 0 或 1 时损失仍有限。
pub fn binary_cross_entropy(pred: &Array1<f32>, labels: &Array1<f32>) -> f32 {
    let n = pred.len().max(1) as f32;
    let total: f32 = pred
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| {
            let log_p = p.ln().max(BCE_LOG_FLOOR);
            let log_not_p = (1.0 - p).ln().max(BCE_LOG_FLOOR);
            -(y * log_p + (1.0 - y) * log_not_p)
        })
        .sum();
    total / n
}
