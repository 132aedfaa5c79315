// ============================================================================
// 参数序列化模块 - 支持二进制和 JSON 两种格式
// ============================================================================
//
// 只保存网络的可训练参数（6 张嵌入表 + 3 个单调线性层的权重和偏置），
// 不保存优化器状态、epoch 计数或训练记录：
//
// 1. **二进制格式** (默认):
//    - 使用 bincode 序列化,文件小、速度快
//
// 2. **JSON 格式** (扩展名为 .json 时):
//    - 人类可读,方便检查权重
//
// 加载时逐个核对参数名和形状，任何不一致都会在修改网络之前报错，
// 不会截断或补零。
//
// ============================================================================

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use bincode::{Decode, Encode};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CdmError, Result},
    net::Net,
};

/// 参数文件格式版本
pub const PARAMS_FORMAT_VERSION: u32 = 1;

/// 单个命名参数矩阵
#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct SerializableTensor {
    pub name: String,
    pub shape: (usize, usize),
    pub data: Vec<f32>,
}

/// 网络全部可训练参数
#[derive(Clone, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct SerializableParams {
    pub version: u32,
    pub tensors: Vec<SerializableTensor>,
}

impl SerializableParams {
    pub fn from_net(net: &Net) -> Self {
        let tensors = net
            .named_parameters()
            .into_iter()
            .map(|(name, param)| SerializableTensor {
                name: name.to_string(),
                shape: param.dim(),
                data: param.iter().copied().collect(),
            })
            .collect();

        Self {
            version: PARAMS_FORMAT_VERSION,
            tensors,
        }
    }

    fn find(&self, name: &str) -> Option<&SerializableTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// **把参数写回网络**
    ///
    /// 先校验并重建全部矩阵，全部成功后才替换网络中的参数。
    pub fn apply_to(&self, net: &mut Net) -> Result<()> {
        if self.version != PARAMS_FORMAT_VERSION {
            return Err(CdmError::UnsupportedVersion(self.version));
        }

        let expected: Vec<(&'static str, (usize, usize))> = net
            .named_parameters()
            .into_iter()
            .map(|(name, param)| (name, param.dim()))
            .collect();

        if self.tensors.len() != expected.len() {
            return Err(CdmError::shape_mismatch(
                "parameter count",
                &[expected.len()],
                &[self.tensors.len()],
            ));
        }

        let mut restored = Vec::with_capacity(expected.len());
        for (name, shape) in &expected {
            let tensor = self
                .find(name)
                .ok_or_else(|| CdmError::MissingParameter(name.to_string()))?;
            if tensor.shape != *shape {
                return Err(CdmError::shape_mismatch(
                    *name,
                    &[shape.0, shape.1],
                    &[tensor.shape.0, tensor.shape.1],
                ));
            }
            let array = Array2::from_shape_vec(tensor.shape, tensor.data.clone()).map_err(|_| {
                CdmError::shape_mismatch(*name, &[shape.0 * shape.1], &[tensor.data.len()])
            })?;
            restored.push(array);
        }

        for ((_, param), array) in net.named_parameters_mut().into_iter().zip(restored) {
            *param = array;
        }
        Ok(())
    }
}

// ============================================================================
// 主要 API
// ============================================================================

fn is_json_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// 保存参数到二进制文件
pub fn save_params_binary<P: AsRef<Path>>(net: &Net, path: P) -> Result<()> {
    let params = SerializableParams::from_net(net);
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    bincode::encode_into_std_write(&params, &mut writer, bincode::config::standard())?;
    Ok(())
}

/// 从二进制文件读取参数
pub fn load_params_binary<P: AsRef<Path>>(path: P) -> Result<SerializableParams> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::new(file);
    let params = bincode::decode_from_std_read(&mut reader, bincode::config::standard())?;
    Ok(params)
}

/// 保存参数到 JSON 文件
pub fn save_params_json<P: AsRef<Path>>(net: &Net, path: P) -> Result<()> {
    let params = SerializableParams::from_net(net);
    let file = File::create(path.as_ref())?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, &params)?;
    Ok(())
}

/// 从 JSON 文件读取参数
pub fn load_params_json<P: AsRef<Path>>(path: P) -> Result<SerializableParams> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// **保存网络参数**：`.json` 扩展名用 JSON，其余用二进制
pub fn save_params<P: AsRef<Path>>(net: &Net, path: P) -> Result<()> {
    let path = path.as_ref();
    if is_json_path(path) {
        save_params_json(net, path)
    } else {
        save_params_binary(net, path)
    }
}

/// **加载网络参数**：格式规则同 `save_params`，形状不符时报错且网络保持不变
pub fn load_params<P: AsRef<Path>>(net: &mut Net, path: P) -> Result<()> {
    let path = path.as_ref();
    let params = if is_json_path(path) {
        load_params_json(path)?
    } else {
        load_params_binary(path)?
    };
    params.apply_to(net)
}
