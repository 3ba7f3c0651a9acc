//! Pose Engine - 实时骨骼姿态求值引擎
//!
//! 每帧为角色的每个关节计算混合后的局部变换：
//! - SoA 批量姿态数学（W = 4）
//! - 通道树：关键帧表、程序姿态、一维/二维混合、分层窗口
//! - 多层动画调度（优先级、淡入淡出、延迟回收）
//! - 两骨解析 IK 后处理（锁定 / 接触）
//! - 关节合并的拓扑调度与并行更新

pub mod animation;
pub mod config;
pub mod math;
pub mod model;
pub mod skeleton;

#[cfg(test)]
pub(crate) mod test_util;

pub use animation::{
    AnimationLayer, AnimationLayerConfig, AnimationLayerManager, AnimationLayerState, Channel, ChannelFlags,
    ChannelKind, EvalContext, IkHelper, LayerId, PlayMode, Pose, PoseBuffer,
};
pub use config::{get_config, reset_config, set_config, AnimConfig, LegacyDeltaFixup};
pub use model::{Character, CharacterId, CharacterScheduler, PoseParamDesc, PoseParameters};
pub use skeleton::{IkChain, Joint, JointTransform, NetTransform, Skeleton};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnimError {
    #[error("Joint count {count} exceeds maximum {max}")]
    TooManyJoints { count: usize, max: usize },

    #[error("Skeleton error: {0}")]
    Skeleton(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Channel '{0}' cannot become its own descendant")]
    CyclicChannel(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("IK chain error: {0}")]
    IkChain(String),

    #[error("Merge error: {0}")]
    Merge(String),
}

pub type Result<T> = std::result::Result<T, AnimError>;
