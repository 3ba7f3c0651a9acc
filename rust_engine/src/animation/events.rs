//! 通道上的静态数据：时间轴事件、活动标签、IK 事件

use super::Window;

/// 时间轴事件，在周期跨过 `cycle` 时触发
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineEvent {
    pub cycle: f32,
    pub kind: i32,
    pub payload: i32,
}

impl TimelineEvent {
    pub fn new(cycle: f32, kind: i32, payload: i32) -> Self {
        Self { cycle, kind, payload }
    }
}

/// 活动标签与选择权重
#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    pub name: String,
    pub weight: f32,
}

/// IK 事件类型
#[derive(Clone, Debug, PartialEq)]
pub enum IkEventKind {
    /// 锁定末端关节的净变换
    Lock,
    /// 让末端关节保持相对另一关节的位置
    Touch { joint: String },
}

/// 通道声明的 IK 事件
#[derive(Clone, Debug, PartialEq)]
pub struct IkEvent {
    pub kind: IkEventKind,
    /// 角色 IK 链索引
    pub chain: usize,
    pub window: Window,
}

impl IkEvent {
    pub fn lock(chain: usize, window: Window) -> Self {
        Self {
            kind: IkEventKind::Lock,
            chain,
            window,
        }
    }

    pub fn touch(chain: usize, joint: impl Into<String>, window: Window) -> Self {
        Self {
            kind: IkEventKind::Touch { joint: joint.into() },
            chain,
            window,
        }
    }

    pub fn is_lock(&self) -> bool {
        matches!(self.kind, IkEventKind::Lock)
    }
}

/// 周期从 `from` 前进到 `to` 时跨过的事件
///
/// `wrapped` 表示中途绕回过起点；`backward` 用于往返播放的回程。
pub fn crossed_events<'a>(
    events: &'a [TimelineEvent],
    from: f32,
    to: f32,
    wrapped: bool,
    backward: bool,
) -> impl Iterator<Item = &'a TimelineEvent> + 'a {
    events.iter().filter(move |e| {
        let c = e.cycle;
        match (wrapped, backward) {
            (false, false) => c > from && c <= to,
            (false, true) => c < from && c >= to,
            (true, false) => c > from || c <= to,
            (true, true) => c < from || c >= to,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Vec<TimelineEvent> {
        vec![
            TimelineEvent::new(0.1, 1, 0),
            TimelineEvent::new(0.5, 2, 0),
            TimelineEvent::new(0.9, 3, 0),
        ]
    }

    fn kinds<'a>(it: impl Iterator<Item = &'a TimelineEvent>) -> Vec<i32> {
        it.map(|e| e.kind).collect()
    }

    #[test]
    fn test_forward_window() {
        let ev = events();
        assert_eq!(kinds(crossed_events(&ev, 0.0, 0.5, false, false)), vec![1, 2]);
        assert_eq!(kinds(crossed_events(&ev, 0.5, 0.6, false, false)), Vec::<i32>::new());
    }

    #[test]
    fn test_wrapped_window() {
        let ev = events();
        assert_eq!(kinds(crossed_events(&ev, 0.8, 0.2, true, false)), vec![1, 3]);
    }

    #[test]
    fn test_backward_window() {
        let ev = events();
        assert_eq!(kinds(crossed_events(&ev, 0.6, 0.4, false, true)), vec![2]);
    }
}
