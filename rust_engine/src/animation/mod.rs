//! 动画系统
//!
//! 提供通道树求值、姿态缓冲区、窗口权重、IK 事件与动画层调度。

mod animation_layer;
mod blend1d;
mod blend2d;
mod channel;
mod delaunay;
mod events;
mod ik_helper;
mod layered;
mod pose;
mod procedural;
mod table;
mod window;

pub use animation_layer::{
    AnimationLayer, AnimationLayerConfig, AnimationLayerManager, AnimationLayerState, FiredEvent, LayerId, MAX_LAYERS,
};
pub use blend1d::{Blend1D, Blend1DEntry, Blend1DSelection};
pub use blend2d::{Blend2D, Blend2DEntry};
pub use channel::{Channel, ChannelFlags, ChannelHeader, ChannelId, ChannelKind};
pub use delaunay::{blend_weights, triangulate, BlendWeights};
pub use events::{crossed_events, Activity, IkEvent, IkEventKind, TimelineEvent};
pub use ik_helper::{IkHelper, IkScope};
pub use layered::{Layered, LayeredEntry, WindowDriver};
pub use pose::{CycleWindow, EvalContext, PlayMode, Pose, PoseBuffer, MAX_GROUPS};
pub use procedural::ProceduralChannel;
pub use table::{decode_record, encode_transform, ComponentMask, FrameRecord, TableChannel, COMPONENT_COUNT};
pub use window::{Window, WindowPolicy};
