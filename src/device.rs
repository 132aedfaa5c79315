//! 计算设备标识
//!
//! 调用方用字符串指定设备（"cpu"、"cuda"、"cuda:1"、"mps"），训练和评估时统一
//! 传入。矩阵运算全部由 `ndarray` 在 CPU 上完成，其他设备在使用时直接报错。

use std::fmt;
use std::str::FromStr;

use crate::error::CdmError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
    Mps,
}

impl Device {
    /// 当前构建是否能在该设备上执行
    pub fn is_available(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// 解析并确认设备可用
    pub fn resolve(tag: &str) -> Result<Self, CdmError> {
        let device: Device = tag.parse()?;
        if !device.is_available() {
            return Err(CdmError::UnsupportedDevice(device.to_string()));
        }
        Ok(device)
    }
}

impl FromStr for Device {
    type Err = CdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        match tag.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            "mps" => Ok(Device::Mps),
            other => other
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| CdmError::UnsupportedDevice(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{}", index),
            Device::Mps => write!(f, "mps"),
        }
    }
}
