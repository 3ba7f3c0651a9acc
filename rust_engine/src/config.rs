//! 求值配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。角色每次 `compute_pose`
//! 开始时读取一次快照，求值过程中不再访问全局状态。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 历史 delta 动画的根关节 90° 修正适用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyDeltaFixup {
    /// 从不修正
    Disabled,
    /// 只修正带 `LEGACY_DELTA` 标志的通道
    FlaggedOnly,
    /// 修正所有叠加通道
    AllDelta,
}

/// 求值配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct AnimConfig {
    // ========== 采样 ==========
    /// 关键帧之间是否插值，默认 true
    pub interpolate_frames: bool,
    /// 低于此值的权重视为零，跳过求值，默认 0.001
    pub negligible_weight: f32,

    // ========== IK ==========
    /// 是否运行 IK 后处理，默认 true
    pub ik_enabled: bool,

    // ========== 兼容模式 ==========
    /// 历史 delta 动画根关节修正的适用范围，默认 FlaggedOnly
    pub legacy_delta_fixup: LegacyDeltaFixup,
    /// 对需要修正的通道交换叠加旋转的乘法顺序，默认 false
    pub source_quat_order: bool,

    // ========== 资源 ==========
    /// 每个线程缓存的临时姿态缓冲区上限，默认 32
    pub max_pooled_poses: usize,
}

impl Default for AnimConfig {
    fn default() -> Self {
        Self {
            interpolate_frames: true,
            negligible_weight: 0.001,
            ik_enabled: true,
            legacy_delta_fixup: LegacyDeltaFixup::FlaggedOnly,
            source_quat_order: false,
            max_pooled_poses: 32,
        }
    }
}

/// 全局配置实例
static ANIM_CONFIG: Lazy<RwLock<AnimConfig>> = Lazy::new(|| RwLock::new(AnimConfig::default()));

/// 获取当前配置（克隆）
pub fn get_config() -> AnimConfig {
    ANIM_CONFIG
        .read()
        .map(|c| c.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
}

/// 设置配置
pub fn set_config(config: AnimConfig) {
    match ANIM_CONFIG.write() {
        Ok(mut c) => *c = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(AnimConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnimConfig::default();
        assert!(config.interpolate_frames);
        assert_eq!(config.legacy_delta_fixup, LegacyDeltaFixup::FlaggedOnly);
        assert!(!config.source_quat_order);
    }

    #[test]
    fn test_set_and_reset_pool_size() {
        let mut config = get_config();
        config.max_pooled_poses = 7;
        set_config(config);
        assert_eq!(get_config().max_pooled_poses, 7);
        reset_config();
        assert_eq!(get_config().max_pooled_poses, 32);
    }
}
