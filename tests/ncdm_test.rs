// NCDM 端到端测试：单调性、输出范围、推理确定性、训练收敛、错误处理

use ncdm::{Batch, Cdm, CdmError, DEFAULT_EPOCHS, NCDM, NetConfig, TrainConfig};
use ndarray::{Array1, Array2};

const K: usize = 4;
const C: usize = 2;
const STUDENTS: usize = 20;
const EXERCISES: usize = 10;

fn small_config() -> NetConfig {
    NetConfig::new(K, EXERCISES, STUDENTS, C)
        .with_hidden(16, 8)
        .with_seed(2024)
}

/// 前一半学生全部答对，后一半全部答错
fn separable_batches(batch_size: usize) -> Vec<Batch> {
    let mut records = Vec::new();
    for s in 0..STUDENTS {
        for e in 0..EXERCISES {
            let label = if s < STUDENTS / 2 { 1.0 } else { 0.0 };
            records.push((s, e, label));
        }
    }

    records
        .chunks(batch_size)
        .map(|chunk| {
            let n = chunk.len();
            let mut kmask = Array2::<f32>::zeros((n, K));
            let mut cmask = Array2::<f32>::zeros((n, C));
            for (row, &(_, e, _)) in chunk.iter().enumerate() {
                kmask[[row, e % K]] = 1.0;
                kmask[[row, (e + 1) % K]] = 1.0;
                cmask[[row, e % C]] = 1.0;
            }
            Batch::new(
                chunk.iter().map(|r| r.0).collect(),
                chunk.iter().map(|r| r.1).collect(),
                kmask,
                cmask,
                chunk.iter().map(|r| r.2).collect::<Array1<f32>>(),
            )
            .unwrap()
        })
        .collect()
}

fn single_batch(student: usize, exercise: usize) -> Batch {
    Batch::new(
        vec![student],
        vec![exercise],
        Array2::ones((1, K)),
        Array2::ones((1, C)),
        Array1::from(vec![1.0]),
    )
    .unwrap()
}

#[test]
fn test_predictions_are_probabilities() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    for batch in separable_batches(32) {
        let pred = model.predict(&batch).unwrap();
        assert_eq!(pred.len(), batch.len());
        assert!(pred.iter().all(|&p| 0.0 < p && p < 1.0), "{:?}", pred);
    }
}

#[test]
fn test_saturated_output_stays_inside_unit_interval() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let batches = separable_batches(3);
    let batch = &batches[0];

    model.ncdm_net.prednet_full3.bias.fill(20.0);
    let high = model.predict(batch).unwrap();
    assert!(high.iter().all(|&p| p < 1.0), "{:?}", high);

    model.ncdm_net.prednet_full3.bias.fill(-1000.0);
    let low = model.predict(batch).unwrap();
    assert!(low.iter().all(|&p| p > 0.0), "{:?}", low);

    // 训练路径同样不会输出 0 或 1
    model.ncdm_net.set_training_mode(true);
    let forward = model
        .ncdm_net
        .forward(
            &batch.student_ids,
            &batch.exercise_ids,
            batch.knowledge_emb.view(),
            batch.cognitive_emb.view(),
        )
        .unwrap();
    assert!(forward.iter().all(|&p| 0.0 < p && p < 1.0), "{:?}", forward);
}

/// 逐个知识点提高学生 0 的掌握度 logit，其余坐标保持不变
fn assert_monotone_per_coordinate(model: &mut NCDM) {
    let kmask = Array2::from_shape_vec((1, K), vec![1.0, 0.0, 1.0, 1.0]).unwrap();
    let batch = Batch::new(
        vec![0],
        vec![2],
        kmask.clone(),
        Array2::from_shape_vec((1, C), vec![0.0, 1.0]).unwrap(),
        Array1::from(vec![1.0]),
    )
    .unwrap();
    let original = model.ncdm_net.student_emb.weight.row(0).to_owned();

    for j in 0..K {
        let mut previous: Option<f32> = None;
        for level in [-6.0f32, -2.0, -0.5, 0.0, 0.5, 2.0, 6.0] {
            model.ncdm_net.student_emb.weight[[0, j]] = level;
            let p = model.predict(&batch).unwrap()[0];
            if let Some(prev) = previous {
                assert!(p >= prev - 1e-6, "coordinate {}: {} -> {} decreased", j, prev, p);
                if kmask[[0, j]] == 0.0 {
                    assert_eq!(p, prev, "masked coordinate {} changed the prediction", j);
                }
            }
            previous = Some(p);
        }
        model.ncdm_net.student_emb.weight.row_mut(0).assign(&original);
    }
}

#[test]
fn test_single_coordinate_monotone_before_and_after_training() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    assert_monotone_per_coordinate(&mut model);

    model.set_silence(true);
    model
        .train(&separable_batches(32), None, 3, "cpu", 0.02)
        .unwrap();
    assert_monotone_per_coordinate(&mut model);
}

#[test]
fn test_prediction_monotone_in_mastery() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let batch = single_batch(0, 0);

    let mut previous = f32::NEG_INFINITY;
    for level in [-4.0f32, -1.0, 0.0, 1.0, 4.0] {
        model.ncdm_net.student_emb.weight.row_mut(0).fill(level);
        model.ncdm_net.student_emb2.weight.row_mut(0).fill(level);
        let p = model.predict(&batch).unwrap()[0];
        assert!(
            p >= previous - 1e-6,
            "mastery {} gave {} < {}",
            level,
            p,
            previous
        );
        previous = p;
    }
}

#[test]
fn test_inference_is_deterministic() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let batches = separable_batches(50);

    let first = model.predict(&batches[0]).unwrap();
    let second = model.predict(&batches[0]).unwrap();
    assert_eq!(first, second);

    let (auc_a, acc_a) = model.eval(&batches, "cpu").unwrap();
    let (auc_b, acc_b) = model.eval(&batches, "cpu").unwrap();
    assert_eq!(auc_a, auc_b);
    assert_eq!(acc_a, acc_b);
}

#[test]
fn test_zero_mask_gives_zero_interaction() {
    let model = NCDM::with_config(&small_config()).unwrap();
    let (x1, x2) = model
        .ncdm_net
        .interactions(
            &[3, 4],
            &[1, 2],
            Array2::<f32>::zeros((2, K)).view(),
            Array2::<f32>::zeros((2, C)).view(),
        )
        .unwrap();
    assert!(x1.iter().all(|&v| v == 0.0));
    assert!(x2.iter().all(|&v| v == 0.0));
}

#[test]
fn test_zero_knowledge_mask_leaves_only_cognitive_term() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let (student, exercise) = (7, 4);
    let batch = Batch::new(
        vec![student],
        vec![exercise],
        Array2::zeros((1, K)),
        Array2::ones((1, C)),
        Array1::from(vec![1.0]),
    )
    .unwrap();
    let base = model.predict(&batch).unwrap()[0];

    // 知识点空间的参数对预测没有任何影响
    let net = &mut model.ncdm_net;
    net.student_emb.weight.row_mut(student).mapv_inplace(|v| v + 3.0);
    net.k_difficulty.weight.row_mut(exercise).mapv_inplace(|v| v - 2.0);
    net.e_difficulty.weight.row_mut(exercise).mapv_inplace(|v| v + 5.0);
    let (x1, _) = net
        .interactions(
            &batch.student_ids,
            &batch.exercise_ids,
            batch.knowledge_emb.view(),
            batch.cognitive_emb.view(),
        )
        .unwrap();
    assert!(x1.iter().all(|&v| v == 0.0));
    assert_eq!(model.predict(&batch).unwrap()[0].to_bits(), base.to_bits());

    // 认知维度的掌握度仍然起作用
    model
        .ncdm_net
        .student_emb2
        .weight
        .row_mut(student)
        .mapv_inplace(|v| v + 3.0);
    let changed = model.predict(&batch).unwrap()[0];
    assert!(changed > base, "base {} changed {}", base, changed);
}

#[test]
fn test_training_reduces_loss_and_separates_students() {
    let config = small_config().with_dropout(0.0);
    let mut model = NCDM::with_config(&config).unwrap();
    let train_data = separable_batches(32);

    let train_config = TrainConfig {
        epoch: 20,
        lr: 0.02,
        silence: true,
        ..TrainConfig::default()
    };
    let record = model
        .train_with_config(&train_data, Some(&train_data), &train_config)
        .unwrap();

    let losses = record.epoch_losses();
    assert_eq!(losses.len(), 20);
    assert!(
        losses[losses.len() - 1] < losses[0],
        "loss did not decrease: {:?}",
        losses
    );

    let (auc, accuracy) = model.eval(&train_data, "cpu").unwrap();
    assert!(auc > 0.5, "auc = {}", auc);
    assert!(accuracy > 0.5, "accuracy = {}", accuracy);

    let (mastery, _) = model.student_mastery();
    let strong = mastery.row(0).mean().unwrap_or(0.0);
    let weak = mastery.row(STUDENTS - 1).mean().unwrap_or(0.0);
    assert!(strong > weak, "strong {} <= weak {}", strong, weak);
}

#[test]
fn test_default_network_learns_with_dropout() {
    // 默认隐藏层宽度和 Dropout，默认轮数
    let config = NetConfig::new(K, EXERCISES, STUDENTS, C).with_seed(7);
    let mut model = NCDM::with_config(&config).unwrap();
    let train_data = separable_batches(32);

    let train_config = TrainConfig {
        lr: 0.02,
        silence: true,
        ..TrainConfig::default()
    };
    let record = model
        .train_with_config(&train_data, Some(&train_data), &train_config)
        .unwrap();

    assert_eq!(record.epochs.len(), DEFAULT_EPOCHS);
    let losses = record.epoch_losses();
    // Dropout 使损失有噪声，只要求没有明显变差
    assert!(
        losses[losses.len() - 1] < losses[0] + 0.05,
        "loss went up: {:?}",
        losses
    );
    let auc = record.last_epoch().and_then(|e| e.auc).unwrap();
    assert!(auc > 0.5, "auc = {}", auc);
}

#[test]
fn test_student_id_out_of_range() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let batch = single_batch(STUDENTS, 0);
    assert!(matches!(
        model.predict(&batch),
        Err(CdmError::IndexOutOfRange { index, size, .. }) if index == STUDENTS && size == STUDENTS
    ));
}

#[test]
fn test_wrong_mask_width() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let batch = Batch::new(
        vec![0],
        vec![0],
        Array2::ones((1, K + 1)),
        Array2::ones((1, C)),
        Array1::from(vec![0.0]),
    )
    .unwrap();
    assert!(matches!(
        model.eval(&[batch], "cpu"),
        Err(CdmError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_eval_single_class_is_undefined() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let batch = single_batch(0, 0);
    assert!(matches!(
        model.eval(&[batch], "cpu"),
        Err(CdmError::UndefinedAuc { .. })
    ));
}

#[test]
fn test_unsupported_device() {
    let mut model = NCDM::with_config(&small_config()).unwrap();
    let data = separable_batches(64);
    assert!(matches!(
        model.train(&data, None, 1, "cuda", 0.01),
        Err(CdmError::UnsupportedDevice(_))
    ));
}

#[test]
fn test_zero_dimension_rejected() {
    assert!(matches!(
        NCDM::new(0, EXERCISES, STUDENTS, C),
        Err(CdmError::InvalidDimension { name: "knowledge_n", .. })
    ));
}
