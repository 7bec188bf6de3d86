//! Run-loop bookkeeping for the host's per-frame callback.
//!
//! The scheduler never touches the host itself. Each transition reports
//! whether a frame callback must be requested or cancelled, and the engine
//! forwards that to its [`FrameHost`](crate::engine::FrameHost).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

#[derive(Debug)]
pub struct FrameScheduler {
    state: LoopState,
    tick_pending: bool,
    single_shot: bool,
    loop_started_at: Option<f64>,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
            tick_pending: false,
            single_shot: false,
            loop_started_at: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn tick_pending(&self) -> bool {
        self.tick_pending
    }

    pub fn loop_started_at(&self) -> Option<f64> {
        self.loop_started_at
    }

    /// Idle -> Running. Returns true when a frame must be requested.
    pub fn start(&mut self, now: f64) -> bool {
        if self.state == LoopState::Running {
            return false;
        }
        self.state = LoopState::Running;
        self.loop_started_at = Some(now);
        // A queued single-shot tick becomes the loop's first tick.
        self.single_shot = false;
        if self.tick_pending {
            return false;
        }
        self.tick_pending = true;
        true
    }

    /// Running -> Idle. Returns true when a pending frame must be cancelled.
    pub fn stop(&mut self) -> bool {
        if self.state == LoopState::Idle {
            return false;
        }
        self.state = LoopState::Idle;
        let cancel = self.tick_pending;
        self.tick_pending = false;
        cancel
    }

    /// Queues one tick while idle. Returns true when a frame must be requested.
    pub fn request_single(&mut self) -> bool {
        if self.state == LoopState::Running || self.tick_pending {
            return false;
        }
        self.tick_pending = true;
        self.single_shot = true;
        true
    }

    /// Called when the host fires the frame callback. Returns false for stale
    /// callbacks that arrive after `stop`.
    pub fn begin_tick(&mut self) -> bool {
        if !self.tick_pending {
            return false;
        }
        self.tick_pending = false;
        let active = self.state == LoopState::Running || self.single_shot;
        self.single_shot = false;
        active
    }

    pub fn end_tick(&mut self) -> bool {
        if self.state != LoopState::Running || self.tick_pending {
            return false;
        }
        self.tick_pending = true;
        true
    }

    /// The host could not schedule the frame we asked for. Nothing will tick
    /// until the next `start` or `request_single`.
    pub fn abandon_pending(&mut self) {
        self.state = LoopState::Idle;
        self.tick_pending = false;
        self.single_shot = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut scheduler = FrameScheduler::new();
        assert!(scheduler.start(10.0));
        assert!(!scheduler.start(20.0));
        assert_eq!(scheduler.loop_started_at(), Some(10.0));
        assert!(scheduler.is_running());

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert_eq!(scheduler.state(), LoopState::Idle);
        assert!(!scheduler.tick_pending());
    }

    #[test]
    fn running_loop_reschedules_every_tick() {
        let mut scheduler = FrameScheduler::new();
        scheduler.start(0.0);
        for _ in 0..3 {
            assert!(scheduler.begin_tick());
            assert!(scheduler.end_tick());
        }
    }

    #[test]
    fn single_shot_runs_once_without_entering_running() {
        let mut scheduler = FrameScheduler::new();
        assert!(scheduler.request_single());
        assert!(!scheduler.request_single());
        assert_eq!(scheduler.state(), LoopState::Idle);

        assert!(scheduler.begin_tick());
        assert!(!scheduler.end_tick());
        assert!(!scheduler.tick_pending());
    }

    #[test]
    fn single_shot_is_refused_while_running() {
        let mut scheduler = FrameScheduler::new();
        scheduler.start(0.0);
        assert!(!scheduler.request_single());
    }

    #[test]
    fn stale_callback_after_stop_is_ignored() {
        let mut scheduler = FrameScheduler::new();
        scheduler.start(0.0);
        scheduler.stop();
        assert!(!scheduler.begin_tick());
    }

    #[test]
    fn abandoned_frame_allows_restart() {
        let mut scheduler = FrameScheduler::new();
        assert!(scheduler.start(0.0));
        scheduler.abandon_pending();
        assert_eq!(scheduler.state(), LoopState::Idle);
        assert!(scheduler.request_single());
        scheduler.abandon_pending();
        assert!(scheduler.start(1.0));
        assert!(scheduler.begin_tick());
    }

    #[test]
    fn start_adopts_queued_single_shot() {
        let mut scheduler = FrameScheduler::new();
        assert!(scheduler.request_single());
        assert!(!scheduler.start(5.0));
        assert!(scheduler.begin_tick());
        assert!(scheduler.end_tick());
    }
}
