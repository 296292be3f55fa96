//! Mirror × radius search plan
//!
//! Pure state machine deciding what the shelter search does next. It never
//! touches the network, so termination and escalation can be tested alone.

use crate::config::ShelterSearchConfig;

/// What the search should do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Query mirror `endpoint` at `radius_m`
    Query { endpoint: usize, radius_m: f64 },
    /// A mirror answered empty at the ceiling radius
    NoneFound { radius_m: f64 },
    /// Every mirror failed at the current radius
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct SearchPlan {
    endpoints: usize,
    radius_m: f64,
    ceiling_m: f64,
    growth: f64,
    cursor: usize,
    failures_at_radius: usize,
    attempts: usize,
}

impl SearchPlan {
    pub fn new(config: &ShelterSearchConfig) -> Self {
        Self {
            endpoints: config.endpoints.len(),
            radius_m: config.initial_radius_m.min(config.max_radius_m),
            ceiling_m: config.max_radius_m,
            growth: config.growth_factor,
            cursor: 0,
            failures_at_radius: 0,
            attempts: 0,
        }
    }

    /// The first query: mirror 0 at the initial radius
    pub fn start(&self) -> Step {
        if self.endpoints == 0 {
            return Step::Exhausted;
        }
        self.query()
    }

    /// The current mirror could not be reached; rotate, same radius
    pub fn on_transport_failure(&mut self) -> Step {
        self.attempts += 1;
        self.failures_at_radius += 1;

        if self.failures_at_radius >= self.endpoints {
            return Step::Exhausted;
        }
        self.advance();
        self.query()
    }

    /// The current mirror answered with nothing usable; widen and rotate
    pub fn on_empty(&mut self) -> Step {
        self.attempts += 1;

        if self.radius_m >= self.ceiling_m {
            return Step::NoneFound {
                radius_m: self.radius_m,
            };
        }

        self.radius_m = (self.radius_m * self.growth).min(self.ceiling_m);
        self.failures_at_radius = 0;
        self.advance();
        self.query()
    }

    /// Queries issued so far
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.endpoints;
    }

    fn query(&self) -> Step {
        Step::Query {
            endpoint: self.cursor,
            radius_m: self.radius_m,
        }
    }
}
