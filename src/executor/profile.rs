use std::time::{Duration, Instant};

use tracing::info;

/// Receives timings for executed statements.
pub trait Profiler: Send + Sync {
    /// A statement completed; `elapsed` covers submission up to the first response.
    fn report(&self, benchmark: &Benchmark, elapsed: Duration);

    /// A statement failed and its benchmark was thrown away.
    fn discard(&self, _benchmark: &Benchmark) {}
}

/// One timed statement: started before submission, then either stopped
/// (reported) or deleted (never reported).
#[derive(Debug)]
pub struct Benchmark {
    group: String,
    sql: String,
    started: Instant,
}

impl Benchmark {
    #[must_use]
    pub fn start(group: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            sql: sql.into(),
            started: Instant::now(),
        }
    }

    /// `Database (<instance>)`
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn stop(self, profiler: &dyn Profiler) {
        let elapsed = self.started.elapsed();
        profiler.report(&self, elapsed);
    }

    pub fn delete(self, profiler: &dyn Profiler) {
        profiler.discard(&self);
    }
}

/// Logs each completed statement at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProfiler;

impl Profiler for TracingProfiler {
    fn report(&self, benchmark: &Benchmark, elapsed: Duration) {
        info!(
            group = benchmark.group(),
            sql = benchmark.sql(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "statement profiled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counting {
        reported: Mutex<Vec<String>>,
        discarded: Mutex<Vec<String>>,
    }

    impl Profiler for Counting {
        fn report(&self, benchmark: &Benchmark, _elapsed: Duration) {
            self.reported.lock().unwrap().push(benchmark.sql().to_string());
        }

        fn discard(&self, benchmark: &Benchmark) {
            self.discarded.lock().unwrap().push(benchmark.group().to_string());
        }
    }

    #[test]
    fn stop_reports_and_delete_discards() {
        let profiler = Counting::default();
        Benchmark::start("Database (default)", "select 1").stop(&profiler);
        Benchmark::start("Database (default)", "select 2").delete(&profiler);
        assert_eq!(*profiler.reported.lock().unwrap(), vec!["select 1"]);
        assert_eq!(*profiler.discarded.lock().unwrap(), vec!["Database (default)"]);
    }
}
