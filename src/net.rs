//! # 诊断网络（Diagnosis Network）
//!
//! 网络把学生和题目在两个因子空间（知识点 K 维、认知维度 C 维）上的嵌入组合成
//! 交互特征，再经过三层单调线性层得到答对概率。
//!
//! ## 前向流程
//!
//! ```text
//! 对每个因子空间 (知识点 / 认知维度):
//!   mastery        = σ(student_emb[stu_id])          (batch × K)
//!   difficulty     = σ(k_difficulty[exer_id])        (batch × K)
//!   discrimination = σ(e_difficulty[exer_id])        (batch × 1)
//!   x              = discrimination · (mastery - difficulty) · mask
//!
//! concat(x₁, x₂)                                     (batch × (K+C))
//!   → PosLinear(K+C → 512) → σ → Dropout(0.5)
//!   → PosLinear(512 → 256) → σ → Dropout(0.5)
//!   → PosLinear(256 → 1)   → σ                       (batch)
//! ```
//!
//! ## 单调性
//!
//! 三层线性层的有效权重都非负，σ 单调递增，Dropout 只做非负缩放，因此输出对
//! 每个交互特征单调不减；交互特征对 mastery 的偏导是 `discrimination · mask ≥ 0`，
//! 所以提高任意一个知识点的掌握度都不会降低预测概率。
//!
//! ## 反向传播
//!
//! 没有自动微分引擎。每一层在前向时缓存所需的中间结果，`backward` 沿相反顺序
//! 逐层计算梯度，并由各参数自己的 Adam 立即完成更新。

use ndarray::{Array1, Array2, ArrayView2, Axis, concatenate, s};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    DROPOUT_RATE, PREDNET_LEN1, PREDNET_LEN2, PROB_EPS,
    dropout::Dropout,
    embeddings::Embedding,
    error::{CdmError, Result},
    pos_linear::PosLinear,
    utils::{sigmoid, sigmoid_grad_from_output, sigmoid_scalar},
};

/// 网络层的前向/反向接口
pub trait Layer {
    fn layer_type(&self) -> &str;

    fn forward(&mut self, input: &Array2<f32>) -> Array2<f32>;

    fn backward(&mut self, grads: &Array2<f32>, lr: f32) -> Array2<f32>;

    fn parameters(&self) -> usize;

    fn set_training_mode(&mut self, _training: bool) {}
}

/// **网络结构配置**
///
/// 维度在构造时确定，之后不再改变。
#[derive(Clone, Debug, PartialEq)]
pub struct NetConfig {
    pub knowledge_n: usize,
    pub exer_n: usize,
    pub student_n: usize,
    pub cognitive_n: usize,
    pub prednet_len1: usize,
    pub prednet_len2: usize,
    pub dropout_rate: f32,
    /// 初始化和 Dropout 的随机种子；`None` 时由操作系统播种
    pub seed: Option<u64>,
}

impl NetConfig {
    pub fn new(knowledge_n: usize, exer_n: usize, student_n: usize, cognitive_n: usize) -> Self {
        Self {
            knowledge_n,
            exer_n,
            student_n,
            cognitive_n,
            prednet_len1: PREDNET_LEN1,
            prednet_len2: PREDNET_LEN2,
            dropout_rate: DROPOUT_RATE,
            seed: None,
        }
    }

    pub fn with_hidden(mut self, prednet_len1: usize, prednet_len2: usize) -> Self {
        self.prednet_len1 = prednet_len1;
        self.prednet_len2 = prednet_len2;
        self
    }

    pub fn with_dropout(mut self, dropout_rate: f32) -> Self {
        self.dropout_rate = dropout_rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("knowledge_n", self.knowledge_n),
            ("exer_n", self.exer_n),
            ("student_n", self.student_n),
            ("cognitive_n", self.cognitive_n),
            ("prednet_len1", self.prednet_len1),
            ("prednet_len2", self.prednet_len2),
        ];
        if let Some((name, value)) = dims.into_iter().find(|&(_, v)| v == 0) {
            return Err(CdmError::InvalidDimension {
                name,
                value: value.to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(CdmError::InvalidDimension {
                name: "dropout_rate",
                value: self.dropout_rate.to_string(),
            });
        }
        Ok(())
    }
}

/// 单个因子空间在一次前向中的中间量
struct FactorState {
    mastery: Array2<f32>,
    difficulty: Array2<f32>,
    discrimination: Array2<f32>,
    mask: Array2<f32>,
}

impl FactorState {
    fn new(
        student_logits: &Array2<f32>,
        difficulty_logits: &Array2<f32>,
        discrimination_logits: &Array2<f32>,
        mask: ArrayView2<f32>,
    ) -> Self {
        Self {
            mastery: sigmoid(student_logits),
            difficulty: sigmoid(difficulty_logits),
            discrimination: sigmoid(discrimination_logits),
            mask: mask.to_owned(),
        }
    }

    /// `discrimination · (mastery - difficulty) · mask`
    fn interaction(&self) -> Array2<f32> {
        &self.discrimination * &(&self.mastery - &self.difficulty) * &self.mask
    }

    /// 从交互特征的梯度求三张表 logit 的梯度
    ///
    /// ```text
    /// ∂x/∂mastery        =  disc · mask
    /// ∂x/∂difficulty     = -disc · mask
    /// ∂x/∂discrimination =  Σ_j (mastery - difficulty) · mask
    /// ```
    /// 再各自乘以 σ'。
    fn backward(&self, grad_x: ArrayView2<f32>) -> (Array2<f32>, Array2<f32>, Array2<f32>) {
        let gated = &grad_x * &self.mask;
        let grad_mastery = &gated * &self.discrimination;
        let grad_discrimination = (&gated * &(&self.mastery - &self.difficulty))
            .sum_axis(Axis(1))
            .insert_axis(Axis(1));

        let grad_student = &grad_mastery * &sigmoid_grad_from_output(&self.mastery);
        let grad_difficulty = -(&grad_mastery * &sigmoid_grad_from_output(&self.difficulty));
        let grad_disc_logit = grad_discrimination * sigmoid_grad_from_output(&self.discrimination);

        (grad_student, grad_difficulty, grad_disc_logit)
    }
}

/// 拼接两个因子空间的交互特征 (batch × (K+C))
fn concat_interactions(knowledge: &FactorState, cognitive: &FactorState) -> Result<Array2<f32>> {
    let x1 = knowledge.interaction();
    let x2 = cognitive.interaction();
    concatenate(Axis(1), &[x1.view(), x2.view()])
        .map_err(|_| CdmError::shape_mismatch("interaction concat", &[x1.nrows()], &[x2.nrows()]))
}

/// 最后一层 logit (batch × 1) 转为严格位于 (0,1) 的概率
fn to_probability(logits: &Array2<f32>) -> Array1<f32> {
    logits
        .column(0)
        .mapv(|z| sigmoid_scalar(z).clamp(PROB_EPS, 1.0 - PROB_EPS))
}

/// 反向传播需要的前向缓存
struct ForwardCache {
    knowledge: FactorState,
    cognitive: FactorState,
    /// 第一层隐藏层 σ 输出（Dropout 之前）
    hidden1: Array2<f32>,
    hidden2: Array2<f32>,
}

/// **诊断网络**
pub struct Net {
    knowledge_dim: usize,
    exer_n: usize,
    emb_num: usize,
    cognitive_dim: usize,

    // 知识点空间
    pub student_emb: Embedding,
    pub k_difficulty: Embedding,
    pub e_difficulty: Embedding,

    // 认知维度空间
    pub student_emb2: Embedding,
    pub k_difficulty2: Embedding,
    pub e_difficulty2: Embedding,

    pub prednet_full1: PosLinear,
    pub drop_1: Dropout,
    pub prednet_full2: PosLinear,
    pub drop_2: Dropout,
    pub prednet_full3: PosLinear,

    training: bool,
    cache: Option<ForwardCache>,
}

impl Net {
    /// **构造网络**
    ///
    /// 先确定所有维度，再依次创建嵌入表和线性层；每个权重矩阵在创建时完成
    /// Xavier 正态初始化，偏置为 0。新网络处于训练模式。
    pub fn new(config: &NetConfig) -> Result<Self> {
        config.validate()?;

        let knowledge_dim = config.knowledge_n;
        let cognitive_dim = config.cognitive_n;
        let exer_n = config.exer_n;
        let emb_num = config.student_n;
        let prednet_input_len = knowledge_dim + cognitive_dim;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let student_emb = Embedding::new("student_emb", emb_num, knowledge_dim, &mut rng);
        let k_difficulty = Embedding::new("k_difficulty", exer_n, knowledge_dim, &mut rng);
        let e_difficulty = Embedding::new("e_difficulty", exer_n, 1, &mut rng);
        let student_emb2 = Embedding::new("student_emb2", emb_num, cognitive_dim, &mut rng);
        let k_difficulty2 = Embedding::new("k_difficulty2", exer_n, cognitive_dim, &mut rng);
        let e_difficulty2 = Embedding::new("e_difficulty2", exer_n, 1, &mut rng);

        let prednet_full1 = PosLinear::new(prednet_input_len, config.prednet_len1, &mut rng);
        let prednet_full2 = PosLinear::new(config.prednet_len1, config.prednet_len2, &mut rng);
        let prednet_full3 = PosLinear::new(config.prednet_len2, 1, &mut rng);

        let drop_1 = Dropout::with_rng(config.dropout_rate, StdRng::seed_from_u64(rng.random()));
        let drop_2 = Dropout::with_rng(config.dropout_rate, StdRng::seed_from_u64(rng.random()));

        Ok(Self {
            knowledge_dim,
            exer_n,
            emb_num,
            cognitive_dim,
            student_emb,
            k_difficulty,
            e_difficulty,
            student_emb2,
            k_difficulty2,
            e_difficulty2,
            prednet_full1,
            drop_1,
            prednet_full2,
            drop_2,
            prednet_full3,
            training: true,
            cache: None,
        })
    }

    pub fn knowledge_dim(&self) -> usize {
        self.knowledge_dim
    }

    pub fn cognitive_dim(&self) -> usize {
        self.cognitive_dim
    }

    pub fn exer_n(&self) -> usize {
        self.exer_n
    }

    pub fn student_n(&self) -> usize {
        self.emb_num
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// **切换训练 / 推理模式**
    ///
    /// 只影响 Dropout：训练模式下随机丢弃，推理模式下为恒等映射。
    pub fn set_training_mode(&mut self, training: bool) {
        self.training = training;
        self.drop_1.set_training_mode(training);
        self.drop_2.set_training_mode(training);
    }

    pub fn total_parameters(&self) -> usize {
        [
            &self.student_emb,
            &self.k_difficulty,
            &self.e_difficulty,
            &self.student_emb2,
            &self.k_difficulty2,
            &self.e_difficulty2,
        ]
        .iter()
        .map(|emb| emb.parameters())
        .sum::<usize>()
            + self.prednet_full1.parameters()
            + self.prednet_full2.parameters()
            + self.prednet_full3.parameters()
    }

    fn check_inputs(
        &self,
        student_ids: &[usize],
        exercise_ids: &[usize],
        knowledge_mask: ArrayView2<f32>,
        cognitive_mask: ArrayView2<f32>,
    ) -> Result<()> {
        let n = student_ids.len();
        if exercise_ids.len() != n {
            return Err(CdmError::shape_mismatch("exercise_ids", &[n], &[exercise_ids.len()]));
        }
        let expected_k = [n, self.knowledge_dim];
        if knowledge_mask.shape() != expected_k {
            return Err(CdmError::shape_mismatch(
                "knowledge_mask",
                &expected_k,
                knowledge_mask.shape(),
            ));
        }
        let expected_c = [n, self.cognitive_dim];
        if cognitive_mask.shape() != expected_c {
            return Err(CdmError::shape_mismatch(
                "cognitive_mask",
                &expected_c,
                cognitive_mask.shape(),
            ));
        }
        Ok(())
    }

    /// 只查表、不缓存，得到两个因子空间的中间量
    fn factor_states(
        &self,
        student_ids: &[usize],
        exercise_ids: &[usize],
        knowledge_mask: ArrayView2<f32>,
        cognitive_mask: ArrayView2<f32>,
    ) -> Result<(FactorState, FactorState)> {
        self.check_inputs(student_ids, exercise_ids, knowledge_mask, cognitive_mask)?;

        let knowledge = FactorState::new(
            &self.student_emb.lookup(student_ids)?,
            &self.k_difficulty.lookup(exercise_ids)?,
            &self.e_difficulty.lookup(exercise_ids)?,
            knowledge_mask,
        );
        let cognitive = FactorState::new(
            &self.student_emb2.lookup(student_ids)?,
            &self.k_difficulty2.lookup(exercise_ids)?,
            &self.e_difficulty2.lookup(exercise_ids)?,
            cognitive_mask,
        );
        Ok((knowledge, cognitive))
    }

    /// **两个因子空间的交互特征**
    ///
    /// 返回 `(x₁, x₂)`，形状分别为 (batch × K) 与 (batch × C)。
    pub fn interactions(
        &self,
        student_ids: &[usize],
        exercise_ids: &[usize],
        knowledge_mask: ArrayView2<f32>,
        cognitive_mask: ArrayView2<f32>,
    ) -> Result<(Array2<f32>, Array2<f32>)> {
        let (knowledge, cognitive) =
            self.factor_states(student_ids, exercise_ids, knowledge_mask, cognitive_mask)?;
        Ok((knowledge.interaction(), cognitive.interaction()))
    }

    /// **推理模式预测**
    ///
    /// 不经过 Dropout、不缓存任何中间量，`&self` 保证不会修改参数。
    pub fn predict(
        &self,
        student_ids: &[usize],
        exercise_ids: &[usize],
        knowledge_mask: ArrayView2<f32>,
        cognitive_mask: ArrayView2<f32>,
    ) -> Result<Array1<f32>> {
        let (knowledge, cognitive) =
            self.factor_states(student_ids, exercise_ids, knowledge_mask, cognitive_mask)?;
        let input_x = concat_interactions(&knowledge, &cognitive)?;

        let hidden1 = sigmoid(&self.prednet_full1.apply(&input_x));
        let hidden2 = sigmoid(&self.prednet_full2.apply(&hidden1));
        let logits = self.prednet_full3.apply(&hidden2);

        Ok(to_probability(&logits))
    }

    /// **前向传播（可用于训练）**
    ///
    /// 按当前模式应用 Dropout，并缓存反向传播需要的中间结果。
    pub fn forward(
        &mut self,
        student_ids: &[usize],
        exercise_ids: &[usize],
        knowledge_mask: ArrayView2<f32>,
        cognitive_mask: ArrayView2<f32>,
    ) -> Result<Array1<f32>> {
        self.check_inputs(student_ids, exercise_ids, knowledge_mask, cognitive_mask)?;

        let knowledge = FactorState::new(
            &self.student_emb.forward(student_ids)?,
            &self.k_difficulty.forward(exercise_ids)?,
            &self.e_difficulty.forward(exercise_ids)?,
            knowledge_mask,
        );
        let cognitive = FactorState::new(
            &self.student_emb2.forward(student_ids)?,
            &self.k_difficulty2.forward(exercise_ids)?,
            &self.e_difficulty2.forward(exercise_ids)?,
            cognitive_mask,
        );

        let input_x = concat_interactions(&knowledge, &cognitive)?;

        let hidden1 = sigmoid(&self.prednet_full1.forward(&input_x));
        let dropped1 = self.drop_1.forward(&hidden1);
        let hidden2 = sigmoid(&self.prednet_full2.forward(&dropped1));
        let dropped2 = self.drop_2.forward(&hidden2);
        let logits = self.prednet_full3.forward(&dropped2);

        self.cache = Some(ForwardCache {
            knowledge,
            cognitive,
            hidden1,
            hidden2,
        });

        Ok(to_probability(&logits))
    }

    /// **反向传播并更新所有参数**
    ///
    /// `grad_logits` 是损失对最后一层 σ 之前的 logit 的梯度 (batch)。
    /// 对 BCE 损失取均值时即 `(p - y) / batch`。
    pub fn backward(&mut self, grad_logits: &Array1<f32>, lr: f32) -> Result<()> {
        let Some(cache) = self.cache.take() else {
            return Err(CdmError::MissingForwardCache);
        };

        let grad_z3 = grad_logits.view().insert_axis(Axis(1)).to_owned();
        let grad_d2 = self.prednet_full3.backward(&grad_z3, lr);
        let grad_h2 = self.drop_2.backward(&grad_d2, lr);
        let grad_z2 = grad_h2 * sigmoid_grad_from_output(&cache.hidden2);

        let grad_d1 = self.prednet_full2.backward(&grad_z2, lr);
        let grad_h1 = self.drop_1.backward(&grad_d1, lr);
        let grad_z1 = grad_h1 * sigmoid_grad_from_output(&cache.hidden1);

        let grad_x = self.prednet_full1.backward(&grad_z1, lr);
        let grad_x1 = grad_x.slice(s![.., ..self.knowledge_dim]);
        let grad_x2 = grad_x.slice(s![.., self.knowledge_dim..]);

        let (grad_stu, grad_kdiff, grad_edisc) = cache.knowledge.backward(grad_x1);
        self.student_emb.backward(grad_stu.view(), lr);
        self.k_difficulty.backward(grad_kdiff.view(), lr);
        self.e_difficulty.backward(grad_edisc.view(), lr);

        let (grad_stu2, grad_kdiff2, grad_edisc2) = cache.cognitive.backward(grad_x2);
        self.student_emb2.backward(grad_stu2.view(), lr);
        self.k_difficulty2.backward(grad_kdiff2.view(), lr);
        self.e_difficulty2.backward(grad_edisc2.view(), lr);

        Ok(())
    }

    /// 清空所有参数的 Adam 状态（每次新的训练调用都从全新的优化器开始）
    pub fn reset_optimizers(&mut self) {
        for emb in [
            &mut self.student_emb,
            &mut self.k_difficulty,
            &mut self.e_difficulty,
            &mut self.student_emb2,
            &mut self.k_difficulty2,
            &mut self.e_difficulty2,
        ] {
            emb.optimizer.reset();
        }
        for layer in [
            &mut self.prednet_full1,
            &mut self.prednet_full2,
            &mut self.prednet_full3,
        ] {
            layer.optimizer_weight.reset();
            layer.optimizer_bias.reset();
        }
        self.cache = None;
    }

    /// **学生掌握度诊断**
    ///
    /// 返回 σ(student_emb) 与 σ(student_emb2)，即每个学生在每个知识点 / 认知维度
    /// 上的掌握度，取值 [0,1]。
    pub fn student_mastery(&self) -> (Array2<f32>, Array2<f32>) {
        (sigmoid(&self.student_emb.weight), sigmoid(&self.student_emb2.weight))
    }

    /// 所有可训练参数，按固定顺序命名
    pub fn named_parameters(&self) -> Vec<(&'static str, &Array2<f32>)> {
        vec![
            ("student_emb.weight", &self.student_emb.weight),
            ("k_difficulty.weight", &self.k_difficulty.weight),
            ("e_difficulty.weight", &self.e_difficulty.weight),
            ("student_emb2.weight", &self.student_emb2.weight),
            ("k_difficulty2.weight", &self.k_difficulty2.weight),
            ("e_difficulty2.weight", &self.e_difficulty2.weight),
            ("prednet_full1.weight", &self.prednet_full1.weight),
            ("prednet_full1.bias", &self.prednet_full1.bias),
            ("prednet_full2.weight", &self.prednet_full2.weight),
            ("prednet_full2.bias", &self.prednet_full2.bias),
            ("prednet_full3.weight", &self.prednet_full3.weight),
            ("prednet_full3.bias", &self.prednet_full3.bias),
        ]
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(&'static str, &mut Array2<f32>)> {
        vec![
            ("student_emb.weight", &mut self.student_emb.weight),
            ("k_difficulty.weight", &mut self.k_difficulty.weight),
            ("e_difficulty.weight", &mut self.e_difficulty.weight),
            ("student_emb2.weight", &mut self.student_emb2.weight),
            ("k_difficulty2.weight", &mut self.k_difficulty2.weight),
            ("e_difficulty2.weight", &mut self.e_difficulty2.weight),
            ("prednet_full1.weight", &mut self.prednet_full1.weight),
            ("prednet_full1.bias", &mut self.prednet_full1.bias),
            ("prednet_full2.weight", &mut self.prednet_full2.weight),
            ("prednet_full2.bias", &mut self.prednet_full2.bias),
            ("prednet_full3.weight", &mut self.prednet_full3.weight),
            ("prednet_full3.bias", &mut self.prednet_full3.bias),
        ]
    }
}
