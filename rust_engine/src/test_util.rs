//! 测试用骨架与通道

use std::sync::Arc;

use glam::{Quat, Vec3};

use crate::animation::{Channel, EvalContext, ProceduralChannel};
use crate::config::AnimConfig;
use crate::model::{BindingTable, PoseParamDesc, PoseParameters};
use crate::skeleton::{IkChain, Joint, JointTransform, Skeleton};

fn offset(x: f32, y: f32, z: f32) -> JointTransform {
    JointTransform::from_translation_rotation(Vec3::new(x, y, z), Quat::IDENTITY)
}

/// root → thigh → knee → foot → toe，站立时脚在 y = 1
pub fn leg_skeleton() -> Skeleton {
    Skeleton::new(vec![
        Joint::new("root", -1, offset(0.0, 3.0, 0.0)),
        Joint::new("thigh", 0, JointTransform::IDENTITY),
        Joint::new("knee", 1, offset(0.0, -1.0, 0.0)),
        Joint::new("foot", 2, offset(0.0, -1.0, 0.0)),
        Joint::new("toe", 3, offset(0.0, -0.2, 0.0)),
    ])
    .unwrap()
}

pub fn joint_names(skeleton: &Skeleton) -> Vec<String> {
    skeleton.joints().iter().map(|j| j.name.clone()).collect()
}

/// 覆盖全部关节、初值为绑定姿态的程序通道
pub fn procedural_channel(name: &str, skeleton: &Skeleton) -> Channel {
    let pose = (0..skeleton.joint_count())
        .map(|i| skeleton.bind_transform(i))
        .collect();
    Channel::procedural(name, joint_names(skeleton), ProceduralChannel::new(pose)).unwrap()
}

/// 根沿 x 前进、膝盖逐帧弯曲的行走帧
pub fn walk_frames(skeleton: &Skeleton, count: usize) -> Vec<Vec<JointTransform>> {
    (0..count)
        .map(|k| {
            let k = k as f32;
            let mut frame: Vec<JointTransform> = (0..skeleton.joint_count())
                .map(|i| skeleton.bind_transform(i))
                .collect();
            frame[0].translation = Vec3::new(0.3 * k, 3.0, 0.0);
            frame[2].rotation = Quat::from_rotation_x(0.2 * k);
            frame
        })
        .collect()
}

/// 单角色求值所需的全部状态
pub struct TestRig {
    pub skeleton: Skeleton,
    pub bindings: BindingTable,
    pub params: PoseParameters,
    pub chains: Vec<IkChain>,
}

impl TestRig {
    pub fn new() -> Self {
        let skeleton = leg_skeleton();
        let mut params = PoseParameters::new();
        params.add(PoseParamDesc::new("x", 0.0, 1.0));
        params.add(PoseParamDesc::new("y", 0.0, 1.0));
        let chains = vec![IkChain::new(&skeleton, "leg", [1, 2, 3], Vec3::Z).unwrap()];
        Self {
            skeleton,
            bindings: BindingTable::new(),
            params,
            chains,
        }
    }

    pub fn bind(&mut self, channel: &Arc<Channel>) {
        self.bindings.bind_tree(&self.skeleton, &[], channel);
    }

    /// 使用默认配置，不读全局配置
    pub fn context(&self) -> EvalContext<'_> {
        EvalContext::new(
            &self.skeleton,
            &self.bindings,
            &self.params,
            &self.chains,
            &AnimConfig::default(),
        )
    }

    /// 帧数与帧率确定时长的程序通道
    pub fn timed_channel(&self, name: &str, frames: u32, rate: f32) -> Channel {
        let mut channel = procedural_channel(name, &self.skeleton);
        channel.header.frame_count = frames;
        channel.header.frame_rate = rate;
        channel
    }
}
