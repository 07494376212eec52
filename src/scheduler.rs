use std::time::{Duration, Instant};

/// Trailing-edge debounce: every `arm` pushes the deadline out again.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fired {
    pub preview: bool,
    pub autosave: bool,
}

#[derive(Debug, Clone)]
pub struct ChangeScheduler {
    preview: Debounce,
    autosave: Debounce,
}

impl ChangeScheduler {
    pub fn new(preview_delay: Duration, autosave_delay: Duration) -> Self {
        Self {
            preview: Debounce::new(preview_delay),
            autosave: Debounce::new(autosave_delay),
        }
    }

    pub fn on_change(&mut self, now: Instant) {
        self.preview.arm(now);
        self.autosave.arm(now);
    }

    pub fn poll(&mut self, now: Instant) -> Fired {
        Fired {
            preview: self.preview.fire_if_due(now),
            autosave: self.autosave.fire_if_due(now),
        }
    }

    pub fn cancel_autosave(&mut self) {
        self.autosave.cancel();
    }

    pub fn cancel_all(&mut self) {
        self.preview.cancel();
        self.autosave.cancel();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.preview.deadline(), self.autosave.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeScheduler, Debounce, Fired};
    use std::time::{Duration, Instant};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn debounce_fires_once_after_delay() {
        let start = Instant::now();
        let mut d = Debounce::new(ms(100));
        d.arm(start);
        assert!(!d.fire_if_due(start + ms(99)));
        assert!(d.fire_if_due(start + ms(100)));
        assert!(!d.fire_if_due(start + ms(500)));
    }

    #[test]
    fn rearming_pushes_deadline() {
        let start = Instant::now();
        let mut d = Debounce::new(ms(100));
        d.arm(start);
        d.arm(start + ms(80));
        assert!(!d.fire_if_due(start + ms(150)));
        assert!(d.fire_if_due(start + ms(180)));
    }

    #[test]
    fn burst_produces_one_firing_of_each_timer() {
        let start = Instant::now();
        let mut s = ChangeScheduler::new(ms(200), ms(1000));
        let mut previews = 0;
        let mut saves = 0;
        for i in 0..10u64 {
            let now = start + ms(i * 50);
            s.on_change(now);
            let fired = s.poll(now);
            previews += fired.preview as usize;
            saves += fired.autosave as usize;
        }
        let mut t = start + ms(450);
        while t <= start + ms(3000) {
            let fired = s.poll(t);
            previews += fired.preview as usize;
            saves += fired.autosave as usize;
            t += ms(10);
        }
        assert_eq!(previews, 1);
        assert_eq!(saves, 1);
    }

    #[test]
    fn timers_are_independent() {
        let start = Instant::now();
        let mut s = ChangeScheduler::new(ms(200), ms(1000));
        s.on_change(start);
        assert_eq!(
            s.poll(start + ms(200)),
            Fired {
                preview: true,
                autosave: false
            }
        );
        assert_eq!(s.next_deadline(), Some(start + ms(1000)));
        assert_eq!(
            s.poll(start + ms(1000)),
            Fired {
                preview: false,
                autosave: true
            }
        );
    }

    #[test]
    fn cancel_all_drops_pending_work() {
        let start = Instant::now();
        let mut s = ChangeScheduler::new(ms(200), ms(1000));
        s.on_change(start);
        s.cancel_all();
        assert_eq!(s.poll(start + ms(5000)), Fired::default());
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn next_deadline_is_earliest() {
        let start = Instant::now();
        let mut s = ChangeScheduler::new(ms(200), ms(1000));
        s.on_change(start);
        assert_eq!(s.next_deadline(), Some(start + ms(200)));
        s.poll(start + ms(200));
        assert_eq!(s.next_deadline(), Some(start + ms(1000)));
    }
}
