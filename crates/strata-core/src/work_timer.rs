use std::convert::TryInto;
use std::time::Duration;

/// Accumulates the wall time spent on individual work items, e.g. chunk loads.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkTimer {
    total_time: Duration,
    longest: Duration,
    items_completed: u32,
}

impl WorkTimer {
    pub fn start() -> Self {
        Self::default()
    }

    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    pub fn longest(&self) -> Duration {
        self.longest
    }

    pub fn items_completed(&self) -> u32 {
        self.items_completed
    }

    pub fn complete_item(&mut self, d: Duration) {
        self.total_time += d;
        self.longest = self.longest.max(d);
        self.items_completed = self.items_completed.saturating_add(1);
    }

    pub fn average_time_us(&self) -> u32 {
        let total_us: u32 = self.total_time.as_micros().try_into().unwrap_or(u32::MAX);

        total_us / self.items_completed.max(1)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn average_and_longest() {
        let mut timer = WorkTimer::start();
        assert_eq!(timer.average_time_us(), 0);

        timer.complete_item(Duration::from_micros(100));
        timer.complete_item(Duration::from_micros(300));
        assert_eq!(timer.items_completed(), 2);
        assert_eq!(timer.average_time_us(), 200);
        assert_eq!(timer.longest(), Duration::from_micros(300));

        timer.reset();
        assert_eq!(timer.items_completed(), 0);
        assert_eq!(timer.total_time(), Duration::ZERO);
    }
}
