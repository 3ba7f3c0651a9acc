//! 姿态参数：按索引读取的有范围标量，驱动混合通道和分层窗口

use crate::math::EPSILON;

/// 参数描述
#[derive(Clone, Debug, PartialEq)]
pub struct PoseParamDesc {
    pub name: String,
    pub min: f32,
    pub max: f32,
    /// 超出范围时回绕而不是夹取
    pub wrap: bool,
}

impl PoseParamDesc {
    pub fn new(name: impl Into<String>, min: f32, max: f32) -> Self {
        Self {
            name: name.into(),
            min: min.min(max),
            max: max.max(min),
            wrap: false,
        }
    }

    pub fn wrapping(mut self) -> Self {
        self.wrap = true;
        self
    }

    fn span(&self) -> f32 {
        self.max - self.min
    }

    fn fit(&self, value: f32) -> f32 {
        let span = self.span();
        if span <= EPSILON {
            return self.min;
        }
        if self.wrap {
            self.min + (value - self.min).rem_euclid(span)
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// 一个角色的全部姿态参数
#[derive(Clone, Debug, Default)]
pub struct PoseParameters {
    descs: Vec<PoseParamDesc>,
    values: Vec<f32>,
}

impl PoseParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加参数，初值为 0 落入范围后的值
    pub fn add(&mut self, desc: PoseParamDesc) -> usize {
        let value = desc.fit(0.0);
        self.descs.push(desc);
        self.values.push(value);
        self.descs.len() - 1
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    pub fn desc(&self, index: usize) -> Option<&PoseParamDesc> {
        self.descs.get(index)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.descs.iter().position(|d| d.name == name)
    }

    pub fn set_value(&mut self, index: usize, value: f32) -> bool {
        let Some(desc) = self.descs.get(index) else {
            return false;
        };
        self.values[index] = desc.fit(value);
        true
    }

    /// 原始值，索引无效时为 0
    pub fn value(&self, index: usize) -> f32 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    /// 映射到 [0, 1] 的值
    pub fn normalized(&self, index: usize) -> f32 {
        let Some(desc) = self.descs.get(index) else {
            return 0.0;
        };
        let span = desc.span();
        if span <= EPSILON {
            return 0.0;
        }
        ((self.values[index] - desc.min) / span).clamp(0.0, 1.0)
    }

    pub fn set_normalized(&mut self, index: usize, t: f32) -> bool {
        let Some(desc) = self.descs.get(index) else {
            return false;
        };
        let value = desc.min + desc.span() * t;
        self.set_value(index, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_and_wrap() {
        let mut params = PoseParameters::new();
        let speed = params.add(PoseParamDesc::new("speed", 0.0, 10.0));
        let yaw = params.add(PoseParamDesc::new("yaw", -180.0, 180.0).wrapping());

        params.set_value(speed, 12.0);
        assert_eq!(params.value(speed), 10.0);
        params.set_value(yaw, 190.0);
        assert!((params.value(yaw) + 170.0).abs() < 1e-4);
        assert_eq!(params.find("yaw"), Some(yaw));
    }

    #[test]
    fn test_normalized_roundtrip() {
        let mut params = PoseParameters::new();
        let p = params.add(PoseParamDesc::new("lean", -1.0, 1.0));
        assert!((params.normalized(p) - 0.5).abs() < 1e-6);
        params.set_normalized(p, 0.25);
        assert!((params.value(p) + 0.5).abs() < 1e-6);
        assert_eq!(params.normalized(99), 0.0);
    }
}
