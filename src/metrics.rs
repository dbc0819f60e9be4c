use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::dispatch::language::RouteKind;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    dispatched_total: AtomicU64,
    succeeded_total: AtomicU64,
    failed_total: AtomicU64,
    timed_out_total: AtomicU64,
    in_flight: AtomicU64,
    by_route: DashMap<&'static str, AtomicU64>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a dispatch and holds the in-flight gauge until the returned
    /// guard drops, so a cancelled dispatch still releases it.
    pub fn started(&self, route: RouteKind) -> InFlight<'_> {
        self.dispatched_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        self.by_route
            .entry(route.as_str())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        InFlight { metrics: self }
    }

    pub fn finished(&self, success: bool, timed_out: bool) {
        if success {
            self.succeeded_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_total.fetch_add(1, Ordering::Relaxed);
        }
        if timed_out {
            self.timed_out_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[cfg(test)]
    pub fn route_count(&self, route: RouteKind) -> u64 {
        self.by_route
            .get(route.as_str())
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn render_prometheus(&self) -> String {
        let mut out = format!(
            concat!(
                "# TYPE dispatch_total counter\n",
                "dispatch_total {}\n",
                "# TYPE dispatch_succeeded_total counter\n",
                "dispatch_succeeded_total {}\n",
                "# TYPE dispatch_failed_total counter\n",
                "dispatch_failed_total {}\n",
                "# TYPE dispatch_timed_out_total counter\n",
                "dispatch_timed_out_total {}\n",
                "# TYPE dispatch_in_flight gauge\n",
                "dispatch_in_flight {}\n",
                "# TYPE dispatch_route_total counter\n",
            ),
            self.dispatched_total.load(Ordering::Relaxed),
            self.succeeded_total.load(Ordering::Relaxed),
            self.failed_total.load(Ordering::Relaxed),
            self.timed_out_total.load(Ordering::Relaxed),
            self.in_flight.load(Ordering::Relaxed),
        );

        let mut routes = self
            .by_route
            .iter()
            .map(|e| (*e.key(), e.value().load(Ordering::Relaxed)))
            .collect::<Vec<_>>();
        routes.sort_by_key(|(route, _)| *route);
        for (route, count) in routes {
            out.push_str(&format!("dispatch_route_total{{route=\"{route}\"}} {count}\n"));
        }
        out
    }

    fn decrement_in_flight(&self) {
        let mut current = self.in_flight.load(Ordering::Relaxed);
        while current > 0 {
            match self.in_flight.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

#[must_use = "dropping the guard ends the in-flight span"]
pub struct InFlight<'a> {
    metrics: &'a MetricsRegistry,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.metrics.decrement_in_flight();
    }
}
