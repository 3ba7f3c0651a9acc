//! 角色：通道绑定、姿态参数、每帧运行时与多角色调度

mod binding;
mod pose_param;
mod runtime;
mod scheduler;

pub use binding::{BindingTable, ChannelBinding};
pub use pose_param::{PoseParamDesc, PoseParameters};
pub use runtime::Character;
pub use scheduler::{CharacterId, CharacterScheduler};
