//! 关节节点

use super::JointTransform;

/// 关节
#[derive(Clone, Debug)]
pub struct Joint {
    pub name: String,
    /// 在骨架中的稳定索引
    pub index: usize,
    /// 父关节索引，根为 -1
    pub parent_index: i32,
    pub children: Vec<usize>,
    /// 绑定（默认）局部变换
    pub bind: JointTransform,
}

impl Joint {
    pub fn new(name: impl Into<String>, parent_index: i32, bind: JointTransform) -> Self {
        Self {
            name: name.into(),
            index: 0,
            parent_index,
            children: Vec::new(),
            bind,
        }
    }

    pub fn parent(&self) -> Option<usize> {
        if self.parent_index >= 0 {
            Some(self.parent_index as usize)
        } else {
            None
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }
}
